//! A live connection to one tool server

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::sync::Mutex;

use super::session::ToolSession;
use super::types::{McpTool, ServerEndpoint};
use crate::error::{ConnectionError, ConnectionErrorKind, ToolExecutionError};

/// One initialized session bound to an endpoint.
///
/// Usable between a successful handshake and teardown. Calls are serialized:
/// at most one request is in flight per connection.
pub struct Connection {
    endpoint: ServerEndpoint,
    session: Mutex<Option<Box<dyn ToolSession>>>,
    open: AtomicBool,
    call_timeout: Duration,
}

impl Connection {
    pub(crate) fn new(
        endpoint: ServerEndpoint,
        session: Box<dyn ToolSession>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            endpoint,
            session: Mutex::new(Some(session)),
            open: AtomicBool::new(true),
            call_timeout,
        }
    }

    pub fn name(&self) -> &str {
        self.endpoint.name()
    }

    pub fn endpoint(&self) -> &ServerEndpoint {
        &self.endpoint
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Tools advertised by the server
    pub async fn list_tools(&self) -> Result<Vec<McpTool>, ConnectionError> {
        let fail = |kind| ConnectionError::new(self.name(), kind);

        let guard = self.session.lock().await;
        let session = guard.as_deref().ok_or_else(|| fail(ConnectionErrorKind::Closed))?;

        tokio::time::timeout(self.call_timeout, session.list_tools())
            .await
            .map_err(|_| fail(ConnectionErrorKind::Timeout(self.call_timeout)))?
            .map_err(|e| fail(ConnectionErrorKind::Transport(format!("{:#}", e))))
    }

    /// Call a tool and return its flattened text
    pub async fn call_tool(&self, tool: &str, arguments: Value) -> Result<String, ToolExecutionError> {
        let arguments = match arguments {
            Value::Object(map) => Some(map),
            Value::Null => None,
            other => {
                return Err(ToolExecutionError::InvalidArguments {
                    tool: tool.to_string(),
                    reason: format!("got {}", other),
                })
            }
        };

        let guard = self.session.lock().await;
        let session = guard.as_deref().ok_or_else(|| ToolExecutionError::ConnectionClosed {
            server: self.name().to_string(),
        })?;

        let start = Instant::now();
        let output = tokio::time::timeout(self.call_timeout, session.call_tool(tool, arguments))
            .await
            .map_err(|_| ToolExecutionError::Timeout {
                tool: tool.to_string(),
                after: self.call_timeout,
            })?
            .map_err(|e| ToolExecutionError::Transport {
                tool: tool.to_string(),
                message: format!("{:#}", e),
            })?;

        tracing::debug!(
            "'{}' on '{}' finished in {}ms",
            tool,
            self.name(),
            start.elapsed().as_millis()
        );

        if output.is_error {
            return Err(ToolExecutionError::Reported {
                tool: tool.to_string(),
                message: output.text,
            });
        }
        Ok(output.text)
    }

    /// Close the transport. Later calls fail with `ConnectionClosed`.
    pub async fn close(&self) {
        self.open.store(false, Ordering::Release);
        let session = self.session.lock().await.take();
        if let Some(mut session) = session {
            tracing::info!("Closing connection to '{}'", self.name());
            if let Err(e) = session.close().await {
                tracing::warn!("Error closing connection to '{}': {:#}", self.name(), e);
            }
        }
    }

    /// Drop the session without the async close handshake
    pub(crate) fn abort(&self) {
        self.open.store(false, Ordering::Release);
        match self.session.try_lock() {
            Ok(mut guard) => {
                if guard.take().is_some() {
                    tracing::debug!("Aborted connection to '{}'", self.name());
                }
            }
            Err(_) => tracing::warn!("Connection to '{}' busy during abort", self.name()),
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("endpoint", &self.endpoint)
            .field("open", &self.is_open())
            .finish()
    }
}
