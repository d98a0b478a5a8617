//! LLM abstraction layer
//!
//! The router only needs one capability from a model: take the conversation
//! and an optional tool list, and answer with text or with tool calls.

mod ollama;
mod openai;

pub use ollama::OllamaClient;
pub use openai::OpenAiClient;

use async_trait::async_trait;

use crate::catalog::FunctionSchema;
use crate::config::{LlmConfig, Provider};
use crate::conversation::{ConversationTurn, ToolCallRequest};
use crate::error::ModelInvocationError;

/// Whether the model may request tools this round
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolChoice {
    Auto,
    None,
}

/// Everything submitted to the model for one round
#[derive(Debug, Clone, Copy)]
pub struct ModelRequest<'a> {
    pub system: Option<&'a str>,
    pub turns: &'a [ConversationTurn],
    pub tools: &'a [FunctionSchema],
    pub tool_choice: ToolChoice,
}

/// What the model answered
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelReply {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCallRequest>,
}

impl ModelReply {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            tool_calls: Vec::new(),
        }
    }

    pub fn tool_calls(calls: Vec<ToolCallRequest>) -> Self {
        Self {
            content: None,
            tool_calls: calls,
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// Trait for LLM backends
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn complete(&self, request: ModelRequest<'_>) -> Result<ModelReply, ModelInvocationError>;

    /// Get the model name
    fn model(&self) -> &str;
}

/// Build the backend selected in config
pub fn create_client(config: &LlmConfig, api_key: Option<String>) -> Box<dyn ModelClient> {
    match config.provider {
        Provider::OpenAi => Box::new(OpenAiClient::new(&config.url, &config.model, api_key)),
        Provider::Ollama => Box::new(OllamaClient::new(&config.url, &config.model)),
    }
}

/// Parse tool-call arguments delivered as a JSON string.
///
/// Empty strings mean "no arguments"; anything that is not valid JSON is
/// kept as a string value and rejected later, when the call is dispatched.
pub(crate) fn parse_arguments(raw: &str) -> serde_json::Value {
    if raw.trim().is_empty() {
        return serde_json::Value::Object(Default::default());
    }
    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_string()))
}

/// Inverse of `parse_arguments` for resubmitted history: a string kept from
/// an unparseable payload goes back exactly as the model sent it.
pub(crate) fn encode_arguments(arguments: &serde_json::Value) -> String {
    match arguments {
        serde_json::Value::String(raw) => raw.clone(),
        other => other.to_string(),
    }
}
