//! Multi-server MCP tool router
//!
//! Connects to several MCP tool servers, merges their tools into one catalog
//! for a language model, and routes each tool call the model makes to the
//! server that owns it.

pub mod catalog;
pub mod config;
pub mod conversation;
pub mod error;
pub mod llm;
pub mod mcp;
pub mod router;

pub use catalog::{Catalog, FunctionSchema, ToolDescriptor};
pub use conversation::{Conversation, ConversationTurn, ToolCallRequest};
pub use error::{
    ConnectionError, ConnectionErrorKind, DispatchError, EmptyCatalog, ModelInvocationError,
    RouterError, ToolExecutionError, UnresolvedToolError,
};
pub use router::Router;
