//! Transport sessions
//!
//! `Connector` opens a session for an endpoint (transport + MCP handshake);
//! `ToolSession` is what a live connection talks through. The rmcp-backed
//! implementations live here; tests plug in in-memory ones.

use anyhow::{Context, Result};
use async_trait::async_trait;
use rmcp::{
    model::{CallToolRequestParam, CallToolResult, RawContent},
    service::RunningService,
    transport::{StreamableHttpClientTransport, TokioChildProcess},
    RoleClient, ServiceExt,
};
use serde_json::{Map, Value};
use tokio::process::Command;

use super::types::{McpTool, ServerEndpoint, ToolOutput, Transport};
use crate::error::{ConnectionError, ConnectionErrorKind};

/// An initialized protocol session with one tool server
#[async_trait]
pub trait ToolSession: Send + Sync {
    /// Tools the server advertises, in server order
    async fn list_tools(&self) -> Result<Vec<McpTool>>;

    /// Invoke a tool
    async fn call_tool(&self, name: &str, arguments: Option<Map<String, Value>>) -> Result<ToolOutput>;

    /// Close the transport
    async fn close(&mut self) -> Result<()>;
}

/// Opens sessions for endpoints
#[async_trait]
pub trait Connector: Send + Sync {
    async fn open(&self, endpoint: &ServerEndpoint) -> Result<Box<dyn ToolSession>, ConnectionError>;
}

// =============================================================================
// rmcp implementation
// =============================================================================

/// Connector speaking MCP through rmcp
#[derive(Debug, Default, Clone, Copy)]
pub struct McpConnector;

#[async_trait]
impl Connector for McpConnector {
    async fn open(&self, endpoint: &ServerEndpoint) -> Result<Box<dyn ToolSession>, ConnectionError> {
        let name = endpoint.name();
        let fail = |kind| ConnectionError::new(name, kind);

        let service = match endpoint.transport() {
            Transport::Http { url } => {
                url::Url::parse(url)
                    .map_err(|e| fail(ConnectionErrorKind::InvalidEndpoint(format!("{}: {}", url, e))))?;

                tracing::debug!("Connecting to MCP server '{}' at {}", name, url);
                let transport = StreamableHttpClientTransport::from_uri(url.as_str());
                ()
                    .serve(transport)
                    .await
                    .map_err(|e| fail(ConnectionErrorKind::Handshake(e.to_string())))?
            }
            Transport::Stdio { command, args, env } => {
                tracing::debug!("Spawning MCP server '{}': {}", name, command);
                let mut cmd = Command::new(command);
                if !args.is_empty() {
                    cmd.args(args);
                }
                for (key, value) in env {
                    cmd.env(key, value);
                }

                let transport = TokioChildProcess::new(cmd)
                    .map_err(|e| fail(ConnectionErrorKind::Transport(e.to_string())))?;
                ()
                    .serve(transport)
                    .await
                    .map_err(|e| fail(ConnectionErrorKind::Handshake(e.to_string())))?
            }
        };

        if let Some(info) = service.peer().peer_info() {
            tracing::debug!(
                "'{}' is {} {}",
                name,
                info.server_info.name,
                info.server_info.version
            );
        }

        Ok(Box::new(McpSession {
            name: name.to_string(),
            service: Some(service),
        }))
    }
}

/// A running rmcp client session
struct McpSession {
    name: String,
    service: Option<RunningService<RoleClient, ()>>,
}

impl McpSession {
    fn service(&self) -> Result<&RunningService<RoleClient, ()>> {
        self.service
            .as_ref()
            .with_context(|| format!("session with '{}' already closed", self.name))
    }
}

#[async_trait]
impl ToolSession for McpSession {
    async fn list_tools(&self) -> Result<Vec<McpTool>> {
        let tools = self
            .service()?
            .list_all_tools()
            .await
            .context("Failed to list tools")?;

        Ok(tools
            .into_iter()
            .map(|t| McpTool {
                name: t.name.to_string(),
                description: t.description.map(|d| d.to_string()),
                input_schema: Value::Object(t.input_schema.as_ref().clone()),
            })
            .collect())
    }

    async fn call_tool(&self, name: &str, arguments: Option<Map<String, Value>>) -> Result<ToolOutput> {
        let result = self
            .service()?
            .call_tool(CallToolRequestParam {
                name: name.to_string().into(),
                arguments,
                task: None,
            })
            .await
            .context("Failed to call tool")?;

        Ok(flatten_result(&result))
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(service) = self.service.take() {
            service.cancel().await?;
        }
        Ok(())
    }
}

/// Join text blocks with newlines; other blocks are rendered as JSON
fn flatten_result(result: &CallToolResult) -> ToolOutput {
    let mut output = String::new();
    for content in &result.content {
        if !output.is_empty() {
            output.push('\n');
        }
        match &content.raw {
            RawContent::Text(text) => output.push_str(&text.text),
            other => output.push_str(
                &serde_json::to_string(other).unwrap_or_else(|_| format!("{:?}", other)),
            ),
        }
    }

    ToolOutput {
        text: output,
        is_error: result.is_error.unwrap_or(false),
    }
}
