//! MCP (Model Context Protocol) connection layer
//!
//! Connects to the tool servers defined in .mcp.json and keeps the sessions
//! alive for the lifetime of the router.

mod connection;
mod manager;
mod session;
mod types;

pub use connection::Connection;
pub use manager::{ConnectOptions, ConnectionManager, DEFAULT_CALL_TIMEOUT, DEFAULT_CONNECT_TIMEOUT};
pub use session::{Connector, McpConnector, ToolSession};
pub use types::{McpTool, ServerEndpoint, ToolOutput, Transport, TransportKind};
