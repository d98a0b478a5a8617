//! Configuration loading

use anyhow::{bail, Context, Result};
use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::mcp::{ServerEndpoint, Transport, TransportKind};

/// Directory under the platform config dir holding global config files
const GLOBAL_CONFIG_DIR: &str = "mcp-router";

/// Find a config file by walking up the directory tree, then checking global config.
///
/// Search order:
/// 1. Current directory and parent directories (walking up to root)
/// 2. Global config at ~/.config/mcp-router/
///
/// Returns the path if found, None otherwise.
fn find_config_file(filename: &str) -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let candidate = current.join(filename);
        if candidate.exists() {
            return Some(candidate);
        }

        match current.parent() {
            Some(parent) => current = parent.to_path_buf(),
            None => break,
        }
    }

    if let Some(config_dir) = dirs::config_dir() {
        let global_path = config_dir.join(GLOBAL_CONFIG_DIR).join(filename);
        if global_path.exists() {
            return Some(global_path);
        }
    }

    None
}

// ============================================================================
// Tool servers (.mcp.json)
// ============================================================================

/// MCP server configuration (from .mcp.json)
///
/// Servers keep the order they are written in; that order decides which
/// server wins when two advertise the same tool name.
#[derive(Debug, Clone, Deserialize)]
pub struct McpConfig {
    #[serde(rename = "mcpServers", deserialize_with = "ordered_servers")]
    pub mcp_servers: Vec<(String, McpServerConfig)>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct McpServerConfig {
    /// Endpoint URL for HTTP servers
    #[serde(default)]
    pub url: Option<String>,
    /// Program to spawn for stdio servers
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Inferred from `url` / `command` when absent
    #[serde(default)]
    pub transport: Option<TransportKind>,
}

fn ordered_servers<'de, D>(deserializer: D) -> Result<Vec<(String, McpServerConfig)>, D::Error>
where
    D: Deserializer<'de>,
{
    struct OrderedServers;

    impl<'de> Visitor<'de> for OrderedServers {
        type Value = Vec<(String, McpServerConfig)>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a map of server name to server config")
        }

        fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
            let mut servers = Vec::with_capacity(map.size_hint().unwrap_or(0));
            while let Some((name, config)) = map.next_entry::<String, McpServerConfig>()? {
                if servers.iter().any(|(existing, _)| *existing == name) {
                    return Err(serde::de::Error::custom(format!(
                        "duplicate server name '{}'",
                        name
                    )));
                }
                servers.push((name, config));
            }
            Ok(servers)
        }
    }

    deserializer.deserialize_map(OrderedServers)
}

impl McpServerConfig {
    /// Resolve into an endpoint, expanding environment variables
    pub fn to_endpoint(&self, name: &str) -> Result<ServerEndpoint> {
        let kind = match (self.transport, &self.url, &self.command) {
            (Some(kind), _, _) => kind,
            (None, Some(_), _) => TransportKind::Http,
            (None, None, Some(_)) => TransportKind::Stdio,
            (None, None, None) => bail!("server '{}' needs either a url or a command", name),
        };

        let transport = match kind {
            TransportKind::Http => {
                let url = self
                    .url
                    .as_deref()
                    .with_context(|| format!("server '{}' uses http but has no url", name))?;
                Transport::Http {
                    url: expand(url),
                }
            }
            TransportKind::Stdio => {
                let command = self
                    .command
                    .as_deref()
                    .with_context(|| format!("server '{}' uses stdio but has no command", name))?;
                Transport::Stdio {
                    command: expand(command),
                    args: self.args.iter().map(|a| expand(a)).collect(),
                    env: self
                        .env
                        .iter()
                        .map(|(k, v)| (k.clone(), expand(v)))
                        .collect(),
                }
            }
        };

        Ok(ServerEndpoint::new(name, transport))
    }
}

fn expand(value: &str) -> String {
    shellexpand::env(value)
        .map(|v| v.into_owned())
        .unwrap_or_else(|_| value.to_string())
}

impl McpConfig {
    /// Load MCP config from .mcp.json
    ///
    /// Search order:
    /// 1. Walk up directory tree from cwd looking for .mcp.json
    /// 2. Check ~/.config/mcp-router/.mcp.json (global fallback)
    pub fn load() -> Result<Option<Self>> {
        if let Some(config_path) = find_config_file(".mcp.json") {
            tracing::debug!("Loading MCP config from: {}", config_path.display());
            return Self::load_from_path(&config_path).map(Some);
        }

        tracing::debug!("No .mcp.json found");
        Ok(None)
    }

    /// Load from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Invalid MCP config {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: McpConfig = serde_json::from_str(content)?;
        Ok(config)
    }

    /// Endpoints in configuration order
    pub fn endpoints(&self) -> Result<Vec<ServerEndpoint>> {
        self.mcp_servers
            .iter()
            .map(|(name, server)| server.to_endpoint(name))
            .collect()
    }
}

// ============================================================================
// Router configuration (.router.toml)
// ============================================================================

/// Top-level router configuration (from .router.toml)
#[derive(Debug, Default, Deserialize)]
pub struct RouterFileConfig {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub agent: AgentSectionConfig,
    #[serde(default)]
    pub router: RouterSectionConfig,
}

/// Which inference API to speak
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// OpenAI-compatible chat completions
    #[default]
    #[value(name = "openai")]
    OpenAi,
    /// Ollama native chat API
    Ollama,
}

/// LLM configuration section
#[derive(Debug, Deserialize)]
pub struct LlmConfig {
    #[serde(default)]
    pub provider: Provider,
    #[serde(default = "default_llm_url")]
    pub url: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

/// Agent configuration section
#[derive(Debug, Deserialize)]
pub struct AgentSectionConfig {
    #[serde(default = "default_system_prompt")]
    pub system_prompt: Option<String>,
}

/// Dispatch and transport tuning
#[derive(Debug, Deserialize)]
pub struct RouterSectionConfig {
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_call_timeout")]
    pub call_timeout_secs: u64,
    /// Run the tool calls of one reply concurrently
    #[serde(default = "default_parallel_tools")]
    pub parallel_tools: bool,
    /// Keep answering (without tools) when no server is reachable
    #[serde(default)]
    pub answer_only_without_tools: bool,
}

// Default value functions
fn default_llm_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta/openai/".to_string()
}

fn default_model() -> String {
    "gemini-2.0-flash".to_string()
}

fn default_api_key_env() -> String {
    "GOOGLE_API_KEY".to_string()
}

fn default_system_prompt() -> Option<String> {
    Some("You are a helpful assistant. Use the available tools when they help answer the question.".to_string())
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_call_timeout() -> u64 {
    60
}

fn default_parallel_tools() -> bool {
    true
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: Provider::default(),
            url: default_llm_url(),
            model: default_model(),
            api_key_env: default_api_key_env(),
        }
    }
}

impl Default for AgentSectionConfig {
    fn default() -> Self {
        Self {
            system_prompt: default_system_prompt(),
        }
    }
}

impl Default for RouterSectionConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout(),
            call_timeout_secs: default_call_timeout(),
            parallel_tools: default_parallel_tools(),
            answer_only_without_tools: false,
        }
    }
}

impl RouterSectionConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }
}

impl RouterFileConfig {
    /// Load config from .router.toml
    ///
    /// Search order:
    /// 1. Walk up directory tree from cwd looking for .router.toml
    /// 2. Check ~/.config/mcp-router/.router.toml (global fallback)
    /// 3. Fall back to defaults
    pub fn load() -> Result<Self> {
        if let Some(config_path) = find_config_file(".router.toml") {
            tracing::debug!("Loading config from: {}", config_path.display());
            return Self::load_from_path(&config_path);
        }

        tracing::debug!("No .router.toml found, using defaults");
        Ok(Self::default())
    }

    /// Load from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: RouterFileConfig = toml::from_str(&content)
            .with_context(|| format!("Invalid router config {}", path.display()))?;
        Ok(config)
    }
}
