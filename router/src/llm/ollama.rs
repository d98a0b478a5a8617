//! Ollama LLM implementation
//!
//! Uses direct HTTP against `/api/chat` with streaming disabled.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{ModelClient, ModelReply, ModelRequest, ToolChoice};
use crate::catalog::FunctionSchema;
use crate::conversation::{ConversationTurn, ToolCallRequest};
use crate::error::ModelInvocationError;

/// Direct chat request for Ollama API
#[derive(Debug, Serialize)]
struct DirectChatRequest<'a> {
    model: &'a str,
    messages: Vec<DirectMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<DirectTool<'a>>,
    stream: bool,
}

/// A message in the conversation
#[derive(Debug, Serialize, Deserialize, Clone)]
struct DirectMessage {
    role: String,
    #[serde(default)]
    content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<DirectToolCall>,
}

impl DirectMessage {
    fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
            tool_calls: Vec::new(),
        }
    }
}

/// A tool definition for Ollama
#[derive(Debug, Serialize)]
struct DirectTool<'a> {
    #[serde(rename = "type")]
    tool_type: &'static str,
    function: &'a FunctionSchema,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
struct DirectToolCall {
    function: DirectToolFunction,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
struct DirectToolFunction {
    name: String,
    #[serde(default)]
    arguments: serde_json::Value,
}

/// Response from Ollama chat endpoint
#[derive(Debug, Deserialize)]
struct DirectChatResponse {
    message: DirectMessage,
}

/// Ollama client
pub struct OllamaClient {
    ollama_url: String,
    http_client: reqwest::Client,
    model: String,
}

impl OllamaClient {
    /// Create a new Ollama client
    pub fn new(url: &str, model: &str) -> Self {
        // Keep only scheme, host and port
        let base_url = match url::Url::parse(url) {
            Ok(parsed) => format!(
                "{}://{}:{}",
                parsed.scheme(),
                parsed.host_str().unwrap_or("localhost"),
                parsed.port_or_known_default().unwrap_or(11434)
            ),
            Err(_) => "http://localhost:11434".to_string(),
        };

        Self {
            ollama_url: base_url,
            http_client: reqwest::Client::new(),
            model: model.to_string(),
        }
    }

    /// Get the Ollama URL
    pub fn ollama_url(&self) -> &str {
        &self.ollama_url
    }

    fn build_request<'a>(&'a self, request: &ModelRequest<'a>) -> DirectChatRequest<'a> {
        let mut messages = Vec::with_capacity(request.turns.len() + 1);
        if let Some(system) = request.system {
            messages.push(DirectMessage::new("system", system));
        }
        messages.extend(request.turns.iter().map(to_direct_message));

        let tools = match request.tool_choice {
            ToolChoice::Auto => request
                .tools
                .iter()
                .map(|function| DirectTool {
                    tool_type: "function",
                    function,
                })
                .collect(),
            ToolChoice::None => Vec::new(),
        };

        DirectChatRequest {
            model: &self.model,
            messages,
            tools,
            stream: false,
        }
    }
}

fn to_direct_message(turn: &ConversationTurn) -> DirectMessage {
    match turn {
        ConversationTurn::User { content } => DirectMessage::new("user", content.clone()),
        ConversationTurn::Assistant { content, tool_calls } => DirectMessage {
            role: "assistant".to_string(),
            content: content.clone().unwrap_or_default(),
            tool_calls: tool_calls
                .iter()
                .map(|call| DirectToolCall {
                    function: DirectToolFunction {
                        name: call.name.clone(),
                        arguments: call.arguments.clone(),
                    },
                })
                .collect(),
        },
        // Ollama matches tool results to calls by position
        ConversationTurn::ToolResult { content, .. } => DirectMessage::new("tool", content.clone()),
    }
}

/// Ollama issues no call ids; number the calls instead
fn into_reply(message: DirectMessage) -> ModelReply {
    let tool_calls = message
        .tool_calls
        .into_iter()
        .enumerate()
        .map(|(i, call)| {
            ToolCallRequest::new(format!("call_{}", i), call.function.name, call.function.arguments)
        })
        .collect();

    ModelReply {
        content: (!message.content.is_empty()).then_some(message.content),
        tool_calls,
    }
}

#[async_trait]
impl ModelClient for OllamaClient {
    async fn complete(&self, request: ModelRequest<'_>) -> Result<ModelReply, ModelInvocationError> {
        let body = self.build_request(&request);

        tracing::info!("=== OLLAMA REQUEST ===");
        tracing::info!("Model: {}", self.model);
        tracing::info!("Messages count: {}", body.messages.len());
        tracing::info!("Tools count: {}", body.tools.len());

        let url = format!("{}/api/chat", self.ollama_url);
        let response = self.http_client.post(&url).json(&body).send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ModelInvocationError::Status { status, body });
        }

        let raw_body = response.text().await?;
        let parsed: DirectChatResponse = serde_json::from_str(&raw_body)
            .map_err(|e| ModelInvocationError::Malformed(e.to_string()))?;

        tracing::info!("=== OLLAMA RESPONSE ===");
        tracing::info!("Tool calls count: {}", parsed.message.tool_calls.len());

        Ok(into_reply(parsed.message))
    }

    fn model(&self) -> &str {
        &self.model
    }
}
