//! Fake tool servers and a scripted model

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::{json, Map, Value};

use mcp_router::error::{ConnectionError, ConnectionErrorKind, ModelInvocationError};
use mcp_router::llm::{ModelClient, ModelReply, ModelRequest, ToolChoice};
use mcp_router::mcp::{ConnectOptions, Connector, McpTool, ServerEndpoint, ToolOutput, ToolSession};
use mcp_router::Router;

/// A server that knows a fixed set of tools
#[derive(Clone)]
pub struct FakeServer {
    tools: Vec<McpTool>,
    delay: Duration,
    failing: Vec<String>,
}

impl FakeServer {
    /// Integer arithmetic: add, subtract
    pub fn calc() -> Self {
        Self {
            tools: vec![
                McpTool::new(
                    "add",
                    "Adds two integer numbers together.",
                    json!({
                        "type": "object",
                        "properties": {"a": {"type": "integer"}, "b": {"type": "integer"}},
                        "required": ["a", "b"]
                    }),
                ),
                McpTool::new("subtract", "Subtracts b from a.", json!({"type": "object"})),
            ],
            delay: Duration::ZERO,
            failing: Vec::new(),
        }
    }

    pub fn with_tools(names: &[&str]) -> Self {
        Self {
            tools: names
                .iter()
                .map(|n| McpTool::new(*n, format!("{} tool", n), json!({"type": "object"})))
                .collect(),
            delay: Duration::ZERO,
            failing: Vec::new(),
        }
    }

    /// Every call sleeps this long before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Calls to `tool` come back flagged as errors
    pub fn failing(mut self, tool: &str) -> Self {
        self.failing.push(tool.to_string());
        self
    }
}

struct FakeSession {
    server: String,
    behavior: FakeServer,
    completed: Arc<Mutex<Vec<String>>>,
    closed: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl ToolSession for FakeSession {
    async fn list_tools(&self) -> Result<Vec<McpTool>> {
        Ok(self.behavior.tools.clone())
    }

    async fn call_tool(&self, name: &str, arguments: Option<Map<String, Value>>) -> Result<ToolOutput> {
        if !self.behavior.delay.is_zero() {
            tokio::time::sleep(self.behavior.delay).await;
        }
        self.completed.lock().unwrap().push(name.to_string());

        if self.behavior.failing.iter().any(|t| t == name) {
            return Ok(ToolOutput::error("boom"));
        }

        let args = arguments.unwrap_or_default();
        let a = args.get("a").and_then(Value::as_i64).unwrap_or(0);
        let b = args.get("b").and_then(Value::as_i64).unwrap_or(0);
        match name {
            "add" => Ok(ToolOutput::text((a + b).to_string())),
            "subtract" => Ok(ToolOutput::text((a - b).to_string())),
            other if self.behavior.tools.iter().any(|t| t.name == other) => {
                Ok(ToolOutput::text(format!("{} from {}", other, self.server)))
            }
            other => bail!("unknown tool {}", other),
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.closed.lock().unwrap().push(self.server.clone());
        Ok(())
    }
}

/// Connects to registered fake servers; every other endpoint is unreachable
#[derive(Default)]
pub struct FakeConnector {
    servers: HashMap<String, FakeServer>,
    completed: Arc<Mutex<Vec<String>>>,
    closed: Arc<Mutex<Vec<String>>>,
}

impl FakeConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn serve(mut self, name: &str, server: FakeServer) -> Self {
        self.servers.insert(name.to_string(), server);
        self
    }

    /// Names of tools whose calls finished, in completion order
    pub fn completed(&self) -> Vec<String> {
        self.completed.lock().unwrap().clone()
    }

    /// Names of closed sessions, in close order
    pub fn closed(&self) -> Vec<String> {
        self.closed.lock().unwrap().clone()
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn open(&self, endpoint: &ServerEndpoint) -> Result<Box<dyn ToolSession>, ConnectionError> {
        match self.servers.get(endpoint.name()) {
            Some(server) => Ok(Box::new(FakeSession {
                server: endpoint.name().to_string(),
                behavior: server.clone(),
                completed: self.completed.clone(),
                closed: self.closed.clone(),
            })),
            None => Err(ConnectionError::new(
                endpoint.name(),
                ConnectionErrorKind::Transport("connection refused".to_string()),
            )),
        }
    }
}

/// What the model saw on one round
#[derive(Debug, Clone)]
pub struct SeenRequest {
    pub turns: usize,
    pub tool_names: Vec<String>,
    pub tool_choice: ToolChoice,
}

/// Replays canned replies in order
#[derive(Clone, Default)]
pub struct ScriptedModel {
    replies: Arc<Mutex<VecDeque<Result<ModelReply, ModelInvocationError>>>>,
    seen: Arc<Mutex<Vec<SeenRequest>>>,
}

impl ScriptedModel {
    pub fn new(replies: Vec<Result<ModelReply, ModelInvocationError>>) -> Self {
        Self {
            replies: Arc::new(Mutex::new(replies.into())),
            seen: Arc::default(),
        }
    }

    pub fn seen(&self) -> Vec<SeenRequest> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelClient for ScriptedModel {
    async fn complete(&self, request: ModelRequest<'_>) -> Result<ModelReply, ModelInvocationError> {
        self.seen.lock().unwrap().push(SeenRequest {
            turns: request.turns.len(),
            tool_names: request.tools.iter().map(|t| t.name.clone()).collect(),
            tool_choice: request.tool_choice,
        });
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ModelInvocationError::Malformed("script exhausted".to_string())))
    }

    fn model(&self) -> &str {
        "scripted"
    }
}

pub fn endpoints(names: &[&str]) -> Vec<ServerEndpoint> {
    names
        .iter()
        .map(|n| ServerEndpoint::http(*n, format!("http://{}.local/mcp", n)))
        .collect()
}

pub async fn connect_router(names: &[&str], connector: &FakeConnector, model: &ScriptedModel) -> Router {
    Router::connect(
        &endpoints(names),
        connector,
        ConnectOptions::default(),
        Box::new(model.clone()),
    )
    .await
}
