//! OpenAI-compatible chat completions
//!
//! Works against any endpoint speaking the `/chat/completions` dialect,
//! including Gemini's OpenAI compatibility layer.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{encode_arguments, parse_arguments, ModelClient, ModelReply, ModelRequest, ToolChoice};
use crate::catalog::FunctionSchema;
use crate::conversation::{ConversationTurn, ToolCallRequest};
use crate::error::ModelInvocationError;

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ToolDefinition<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'static str>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl ChatMessage {
    fn new(role: &'static str, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }
}

#[derive(Debug, Serialize)]
struct ToolDefinition<'a> {
    #[serde(rename = "type")]
    tool_type: &'static str,
    function: &'a FunctionSchema,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type", default = "function_type")]
    call_type: String,
    function: WireFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireFunction {
    name: String,
    /// JSON-encoded arguments
    #[serde(default)]
    arguments: String,
}

fn function_type() -> String {
    "function".to_string()
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCall>>,
}

/// Client for OpenAI-compatible APIs
pub struct OpenAiClient {
    http_client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
}

impl OpenAiClient {
    pub fn new(base_url: &str, model: &str, api_key: Option<String>) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            model: model.to_string(),
            api_key,
        }
    }

    fn build_request<'a>(&'a self, request: &ModelRequest<'a>) -> ChatRequest<'a> {
        let mut messages = Vec::with_capacity(request.turns.len() + 1);
        if let Some(system) = request.system {
            messages.push(ChatMessage::new("system", system));
        }
        messages.extend(request.turns.iter().map(to_wire_message));

        let tools: Vec<_> = if request.tool_choice == ToolChoice::None {
            Vec::new()
        } else {
            request
                .tools
                .iter()
                .map(|function| ToolDefinition {
                    tool_type: "function",
                    function,
                })
                .collect()
        };
        let tool_choice = if tools.is_empty() { None } else { Some("auto") };

        ChatRequest {
            model: &self.model,
            messages,
            tools,
            tool_choice,
        }
    }
}

fn to_wire_message(turn: &ConversationTurn) -> ChatMessage {
    match turn {
        ConversationTurn::User { content } => ChatMessage::new("user", content.clone()),
        ConversationTurn::Assistant { content, tool_calls } => ChatMessage {
            role: "assistant",
            content: content.clone(),
            tool_calls: (!tool_calls.is_empty()).then(|| {
                tool_calls
                    .iter()
                    .map(|call| WireToolCall {
                        id: call.call_id.clone(),
                        call_type: function_type(),
                        function: WireFunction {
                            name: call.name.clone(),
                            arguments: encode_arguments(&call.arguments),
                        },
                    })
                    .collect()
            }),
            tool_call_id: None,
        },
        ConversationTurn::ToolResult { call_id, content } => ChatMessage {
            role: "tool",
            content: Some(content.clone()),
            tool_calls: None,
            tool_call_id: Some(call_id.clone()),
        },
    }
}

fn parse_reply(response: ChatResponse) -> Result<ModelReply, ModelInvocationError> {
    let message = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ModelInvocationError::Malformed("response has no choices".to_string()))?
        .message;

    let tool_calls = message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|call| ToolCallRequest {
            call_id: call.id,
            arguments: parse_arguments(&call.function.arguments),
            name: call.function.name,
        })
        .collect();

    Ok(ModelReply {
        content: message.content,
        tool_calls,
    })
}

#[async_trait]
impl ModelClient for OpenAiClient {
    async fn complete(&self, request: ModelRequest<'_>) -> Result<ModelReply, ModelInvocationError> {
        let body = self.build_request(&request);

        tracing::info!(
            "Model request: {} ({} messages, {} tools)",
            self.model,
            body.messages.len(),
            body.tools.len()
        );

        let mut http = self.http_client.post(&self.endpoint).json(&body);
        if let Some(ref key) = self.api_key {
            http = http.bearer_auth(key);
        }

        let response = http.send().await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ModelInvocationError::Status { status, body });
        }

        let raw_body = response.text().await?;
        let parsed: ChatResponse = serde_json::from_str(&raw_body)
            .map_err(|e| ModelInvocationError::Malformed(e.to_string()))?;
        let reply = parse_reply(parsed)?;

        tracing::info!("Model reply: {} tool call(s)", reply.tool_calls.len());
        Ok(reply)
    }

    fn model(&self) -> &str {
        &self.model
    }
}
