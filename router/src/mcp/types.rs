//! MCP type definitions
//!
//! Shared types used across the connection layer and the catalog.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;

/// How the router talks to a tool server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Streamable HTTP
    #[serde(alias = "streamable_http", alias = "streamable-http")]
    Http,
    /// Child process speaking MCP on stdin/stdout
    Stdio,
}

/// Transport details for one endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transport {
    Http {
        url: String,
    },
    Stdio {
        command: String,
        args: Vec<String>,
        env: HashMap<String, String>,
    },
}

/// A configured tool server. Never mutated after startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerEndpoint {
    name: String,
    transport: Transport,
}

impl ServerEndpoint {
    pub fn new(name: impl Into<String>, transport: Transport) -> Self {
        Self {
            name: name.into(),
            transport,
        }
    }

    /// Shorthand for an HTTP endpoint
    pub fn http(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self::new(name, Transport::Http { url: url.into() })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    pub fn kind(&self) -> TransportKind {
        match self.transport {
            Transport::Http { .. } => TransportKind::Http,
            Transport::Stdio { .. } => TransportKind::Stdio,
        }
    }

    /// URL for HTTP endpoints, program for stdio endpoints
    pub fn address(&self) -> &str {
        match &self.transport {
            Transport::Http { url } => url,
            Transport::Stdio { command, .. } => command,
        }
    }
}

/// A tool as advertised by a server
#[derive(Debug, Clone, PartialEq)]
pub struct McpTool {
    /// Tool name
    pub name: String,
    /// Tool description
    pub description: Option<String>,
    /// Input schema (JSON)
    pub input_schema: Value,
}

impl McpTool {
    pub fn new(name: impl Into<String>, description: impl Into<String>, input_schema: Value) -> Self {
        Self {
            name: name.into(),
            description: Some(description.into()),
            input_schema,
        }
    }
}

/// Flattened result of a tool call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    pub text: String,
    /// Set when the server flagged the result as an error
    pub is_error: bool,
}

impl ToolOutput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_error: false,
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_error: true,
        }
    }
}
