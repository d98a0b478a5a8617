//! Error taxonomy for the router
//!
//! Failures are split by how far they travel:
//! - connection and tool failures are recovered locally (logged, or folded
//!   into the conversation as tool results)
//! - an empty catalog and model failures are handed to the caller of
//!   `Router::handle_user_turn`

use std::time::Duration;

use thiserror::Error;

/// An endpoint could not be brought up
#[derive(Debug, Error)]
#[error("failed to connect to '{endpoint}': {kind}")]
pub struct ConnectionError {
    /// Name of the endpoint that failed
    pub endpoint: String,
    /// What went wrong
    pub kind: ConnectionErrorKind,
}

impl ConnectionError {
    pub fn new(endpoint: impl Into<String>, kind: ConnectionErrorKind) -> Self {
        Self {
            endpoint: endpoint.into(),
            kind,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConnectionErrorKind {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("handshake failed: {0}")]
    Handshake(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("connection is closed")]
    Closed,
}

/// A resolved tool call failed
#[derive(Debug, Error)]
pub enum ToolExecutionError {
    #[error("connection to '{server}' is closed")]
    ConnectionClosed { server: String },

    #[error("call to '{tool}' timed out after {after:?}")]
    Timeout { tool: String, after: Duration },

    #[error("transport failure while calling '{tool}': {message}")]
    Transport { tool: String, message: String },

    #[error("arguments for '{tool}' must be a JSON object: {reason}")]
    InvalidArguments { tool: String, reason: String },

    #[error("'{tool}' reported an error: {message}")]
    Reported { tool: String, message: String },
}

/// The model asked for a tool no live connection advertises
#[derive(Debug, Error)]
#[error("Tool {tool} not found in active sessions.")]
pub struct UnresolvedToolError {
    pub tool: String,
}

/// No tool server was reachable, so there is nothing to offer the model
#[derive(Debug, Error)]
#[error("no tools available: every configured tool server is unreachable")]
pub struct EmptyCatalog;

/// The inference backend failed or answered with something unusable
#[derive(Debug, Error)]
pub enum ModelInvocationError {
    #[error("request to model failed: {0}")]
    Http(String),

    #[error("model API error {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed model response: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for ModelInvocationError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ModelInvocationError::Malformed(e.to_string())
        } else {
            ModelInvocationError::Http(e.to_string())
        }
    }
}

/// Why a single dispatched call produced no result
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Unresolved(#[from] UnresolvedToolError),

    #[error(transparent)]
    Execution(#[from] ToolExecutionError),
}

impl DispatchError {
    /// Text recorded in the conversation in place of the tool's output
    pub fn to_tool_result(&self, tool: &str) -> String {
        match self {
            DispatchError::Unresolved(e) => format!("Error: {}", e),
            DispatchError::Execution(e) => format!("Error executing tool {}: {}", tool, e),
        }
    }
}

/// Errors that end a user turn without an answer
#[derive(Debug, Error)]
pub enum RouterError {
    #[error(transparent)]
    EmptyCatalog(#[from] EmptyCatalog),

    #[error(transparent)]
    Model(#[from] ModelInvocationError),
}
