use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use mcp_router::config::{McpConfig, Provider, RouterFileConfig};
use mcp_router::llm::create_client;
use mcp_router::mcp::{ConnectOptions, McpConnector};
use mcp_router::router::{event_channel, EventReceiver, RouterEvent};
use mcp_router::Router;

#[derive(Parser)]
#[command(name = "mcp-router")]
#[command(about = "Route model tool calls across several MCP servers")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the MCP server config (default: nearest .mcp.json)
    #[arg(long, global = true)]
    mcp_config: Option<PathBuf>,

    /// Path to the router config (default: nearest .router.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Inference API dialect
    #[arg(long, env = "ROUTER_PROVIDER", global = true)]
    provider: Option<Provider>,

    /// Inference API base URL
    #[arg(long, env = "ROUTER_LLM_URL", global = true)]
    llm_url: Option<String>,

    /// Model to use
    #[arg(long, env = "ROUTER_MODEL", global = true)]
    model: Option<String>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with the model; tools are routed to the configured servers
    Chat {
        /// Single message (starts interactive mode if not provided)
        message: Option<String>,
        /// System prompt override
        #[arg(long, short)]
        system: Option<String>,
    },
    /// List the aggregated tool catalog
    Tools,
    /// Call a tool directly through the catalog
    Call {
        /// Tool name
        tool: String,
        /// Arguments as JSON
        #[arg(long, short)]
        args: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let mut file_config = match &cli.config {
        Some(path) => RouterFileConfig::load_from_path(path)?,
        None => RouterFileConfig::load()?,
    };
    if let Some(provider) = cli.provider {
        file_config.llm.provider = provider;
    }
    if let Some(ref url) = cli.llm_url {
        file_config.llm.url = url.clone();
    }
    if let Some(ref model) = cli.model {
        file_config.llm.model = model.clone();
    }

    let mcp_config = match &cli.mcp_config {
        Some(path) => McpConfig::load_from_path(path)?,
        None => McpConfig::load()?.context(
            "No .mcp.json found in current directory or parents. Create one to configure MCP servers.",
        )?,
    };

    match cli.command {
        Commands::Chat { message, system } => {
            if system.is_some() {
                file_config.agent.system_prompt = system;
            }
            run_chat(&file_config, &mcp_config, message).await
        }
        Commands::Tools => run_tools(&file_config, &mcp_config).await,
        Commands::Call { tool, args } => run_call_tool(&file_config, &mcp_config, &tool, args).await,
    }
}

/// Logs go to stderr so stdout carries only the conversation
fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

/// Connect to every configured server and report the outcome per server
async fn connect(file_config: &RouterFileConfig, mcp_config: &McpConfig) -> Result<Router> {
    let endpoints = mcp_config.endpoints()?;

    let api_key = std::env::var(&file_config.llm.api_key_env).ok();
    if api_key.is_none() && file_config.llm.provider == Provider::OpenAi {
        tracing::warn!("{} is not set", file_config.llm.api_key_env);
    }
    let model = create_client(&file_config.llm, api_key);

    let options = ConnectOptions {
        connect_timeout: file_config.router.connect_timeout(),
        call_timeout: file_config.router.call_timeout(),
    };

    println!("Connecting to MCP servers...");
    let router = Router::connect(&endpoints, &McpConnector, options, model)
        .await
        .with_system_prompt(file_config.agent.system_prompt.clone())
        .with_parallel_tools(file_config.router.parallel_tools)
        .with_answer_only(file_config.router.answer_only_without_tools);

    for connection in router.manager().connections() {
        let tools: Vec<_> = router
            .catalog()
            .tools()
            .iter()
            .filter(|t| t.server == connection.name())
            .map(|t| t.name())
            .collect();
        println!("   ✅ Connected to {}. Tools: {:?}", connection.name(), tools);
    }
    for failure in router.manager().failures() {
        println!("   ❌ Failed to connect to {}: {}", failure.endpoint, failure.kind);
    }

    Ok(router)
}

async fn run_chat(
    file_config: &RouterFileConfig,
    mcp_config: &McpConfig,
    message: Option<String>,
) -> Result<()> {
    let router = connect(file_config, mcp_config).await?;

    if router.catalog().is_empty() && !file_config.router.answer_only_without_tools {
        println!("❌ No tools available. Exiting.");
        let mut router = router;
        router.shutdown().await;
        return Ok(());
    }

    let (tx, rx) = event_channel();
    let printer = tokio::spawn(print_events(rx));
    let mut router = router.with_event_sender(tx);

    println!(
        "\n🤖 Agent ready with {} tools (model: {}).",
        router.catalog().len(),
        router.model()
    );

    let result = match message {
        Some(msg) => {
            tokio::select! {
                answer = router.handle_user_turn(&msg) => {
                    match answer {
                        Ok(text) => println!("Agent: {}", text),
                        Err(e) => println!("Runtime Error: {}", e),
                    }
                    Ok(())
                }
                _ = tokio::signal::ctrl_c() => Ok(()),
            }
        }
        None => interactive(&mut router).await,
    };

    router.shutdown().await;
    drop(router);
    let _ = printer.await;
    result
}

async fn interactive(router: &mut Router) -> Result<()> {
    println!("Type 'quit' to exit, 'clear' to start over.\n");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        stdout.write_all(b"User: ").await?;
        stdout.flush().await?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => break,
        };
        let Some(line) = line else { break };
        let input = line.trim();

        if input.is_empty() {
            continue;
        }
        if input.eq_ignore_ascii_case("quit") || input.eq_ignore_ascii_case("exit") {
            break;
        }
        if input == "clear" {
            router.clear_history();
            println!("History cleared.\n");
            continue;
        }

        tokio::select! {
            answer = router.handle_user_turn(input) => match answer {
                Ok(text) => println!("Agent: {}\n", text),
                Err(e) => println!("Runtime Error: {}\n", e),
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    Ok(())
}

async fn print_events(mut rx: EventReceiver) {
    while let Some(event) = rx.recv().await {
        match event {
            RouterEvent::ToolsRequested { names } => {
                println!("   (🛠️  Calling tools: {:?})", names);
            }
            RouterEvent::ToolComplete {
                name,
                result,
                is_error: true,
                ..
            } => {
                tracing::debug!("{} failed: {}", name, result);
            }
            _ => {}
        }
    }
}

async fn run_tools(file_config: &RouterFileConfig, mcp_config: &McpConfig) -> Result<()> {
    let mut router = connect(file_config, mcp_config).await?;

    if router.catalog().is_empty() {
        println!("\nNo tools found.");
    } else {
        println!("\n=== Catalog ({} tools) ===", router.catalog().len());
        for tool in router.catalog().tools() {
            let desc = tool
                .schema
                .description
                .lines()
                .next()
                .filter(|d| !d.is_empty())
                .unwrap_or("No description");
            println!("  {} [{}] - {}", tool.name(), tool.server, desc);
        }
    }

    router.shutdown().await;
    Ok(())
}

async fn run_call_tool(
    file_config: &RouterFileConfig,
    mcp_config: &McpConfig,
    tool_name: &str,
    args: Option<String>,
) -> Result<()> {
    let arguments = match args {
        Some(json) => serde_json::from_str(&json).context("--args must be valid JSON")?,
        None => serde_json::json!({}),
    };

    let mut router = connect(file_config, mcp_config).await?;

    println!("\nCalling tool: {}", tool_name);
    println!("Arguments: {}", serde_json::to_string_pretty(&arguments)?);
    println!();

    let result = router.dispatch(tool_name, arguments).await;
    router.shutdown().await;

    let text = result?;
    println!("Result:\n{}", text);
    Ok(())
}
