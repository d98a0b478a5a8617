//! MCP Connection Manager
//!
//! Owns every live connection. Endpoints are opened concurrently and
//! independently; a failing endpoint is logged and left out. Connections are
//! torn down last-opened-first, either explicitly through `shutdown` or when
//! the manager is dropped.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use serde_json::Value;

use super::connection::Connection;
use super::session::Connector;
use super::types::ServerEndpoint;
use crate::error::{ConnectionError, ConnectionErrorKind, ToolExecutionError};

/// Default bound on transport setup plus handshake
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default bound on a single tool call
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(60);

/// Timeouts applied by the manager
#[derive(Debug, Clone, Copy)]
pub struct ConnectOptions {
    pub connect_timeout: Duration,
    pub call_timeout: Duration,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }
}

/// Connection manager for a set of tool servers
pub struct ConnectionManager {
    /// Live connections in acquisition order
    connections: Vec<Arc<Connection>>,
    failures: Vec<ConnectionError>,
    shut_down: bool,
}

impl ConnectionManager {
    /// Connect to every endpoint. Never fails as a whole: unreachable
    /// endpoints are recorded in `failures()` and skipped.
    pub async fn connect(
        endpoints: &[ServerEndpoint],
        connector: &dyn Connector,
        options: ConnectOptions,
    ) -> Self {
        tracing::info!("Connecting to {} MCP server(s)", endpoints.len());

        let attempts = endpoints.iter().map(|endpoint| async move {
            tracing::info!(
                "Attempting connection to {} at {}",
                endpoint.name(),
                endpoint.address()
            );
            match tokio::time::timeout(options.connect_timeout, connector.open(endpoint)).await {
                Ok(result) => result,
                Err(_) => Err(ConnectionError::new(
                    endpoint.name(),
                    ConnectionErrorKind::Timeout(options.connect_timeout),
                )),
            }
        });

        // join_all keeps input order, which fixes the acquisition order
        let results = join_all(attempts).await;

        let mut connections = Vec::new();
        let mut failures = Vec::new();
        for (endpoint, result) in endpoints.iter().zip(results) {
            match result {
                Ok(session) => {
                    tracing::info!("Connected to {}", endpoint.name());
                    connections.push(Arc::new(Connection::new(
                        endpoint.clone(),
                        session,
                        options.call_timeout,
                    )));
                }
                Err(e) => {
                    tracing::warn!("{}", e);
                    failures.push(e);
                }
            }
        }

        Self {
            connections,
            failures,
            shut_down: false,
        }
    }

    /// Live connections in the order they were opened
    pub fn connections(&self) -> &[Arc<Connection>] {
        &self.connections
    }

    /// Look up a connection by endpoint name
    pub fn get(&self, name: &str) -> Option<&Arc<Connection>> {
        self.connections.iter().find(|c| c.name() == name)
    }

    /// Names of connected servers
    pub fn server_names(&self) -> Vec<String> {
        self.connections.iter().map(|c| c.name().to_string()).collect()
    }

    /// Endpoints that could not be connected
    pub fn failures(&self) -> &[ConnectionError] {
        &self.failures
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Call a tool on a connection. Every failure, including transport
    /// faults and timeouts, comes back as a `ToolExecutionError`.
    pub async fn send_call(
        &self,
        connection: &Connection,
        tool_name: &str,
        arguments: Value,
    ) -> Result<String, ToolExecutionError> {
        if self.shut_down || !connection.is_open() {
            return Err(ToolExecutionError::ConnectionClosed {
                server: connection.name().to_string(),
            });
        }

        tracing::info!("Executing tool: {} on {}", tool_name, connection.name());
        tracing::debug!("Arguments for {}: {}", tool_name, arguments);

        let result = connection.call_tool(tool_name, arguments).await;
        match &result {
            Ok(text) => tracing::info!(
                "Tool {} returned: {}",
                tool_name,
                preview(text, 100)
            ),
            Err(e) => tracing::warn!("{}", e),
        }
        result
    }

    /// Close every connection, last-opened first
    pub async fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;

        tracing::info!("Shutting down {} connection(s)", self.connections.len());
        for connection in self.connections.iter().rev() {
            connection.close().await;
        }
        self.connections.clear();
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        while let Some(connection) = self.connections.pop() {
            connection.abort();
        }
    }
}

fn preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
