//! Dispatch loop
//!
//! One user turn runs through a fixed sequence:
//! 1. the user message is appended and the model sees history + catalog
//! 2. a reply without tool calls is the answer
//! 3. otherwise every requested call is routed to its owning connection and
//!    each outcome, success or failure, becomes a tool-result turn
//! 4. the model is asked once more, with no tools offered, for the answer
//!
//! There is no further chaining: a turn makes at most two model calls.

use std::time::Instant;

use futures_util::future::join_all;
use serde_json::Value;

use crate::catalog::{Catalog, FunctionSchema};
use crate::conversation::{Conversation, ConversationTurn, ToolCallRequest};
use crate::error::{DispatchError, EmptyCatalog, RouterError, ToolExecutionError};
use crate::llm::{ModelClient, ModelReply, ModelRequest, ToolChoice};
use crate::mcp::{ConnectOptions, ConnectionManager, Connector, ServerEndpoint};

pub mod events;
pub use events::{event_channel, EventReceiver, EventSender, RouterEvent, RouterEventSender};

/// Routes one conversation's tool calls across several tool servers
pub struct Router {
    manager: ConnectionManager,
    catalog: Catalog,
    schemas: Vec<FunctionSchema>,
    model: Box<dyn ModelClient>,
    system_prompt: Option<String>,
    conversation: Conversation,
    parallel_tools: bool,
    answer_only: bool,
    event_sender: RouterEventSender,
}

impl Router {
    /// Create a router over already-connected servers
    pub fn new(manager: ConnectionManager, catalog: Catalog, model: Box<dyn ModelClient>) -> Self {
        let schemas = catalog.function_schemas();
        Self {
            manager,
            catalog,
            schemas,
            model,
            system_prompt: None,
            conversation: Conversation::new(),
            parallel_tools: true,
            answer_only: false,
            event_sender: RouterEventSender::none(),
        }
    }

    /// Connect to every endpoint, build the catalog and wrap both in a router
    pub async fn connect(
        endpoints: &[ServerEndpoint],
        connector: &dyn Connector,
        options: ConnectOptions,
        model: Box<dyn ModelClient>,
    ) -> Self {
        let manager = ConnectionManager::connect(endpoints, connector, options).await;
        let catalog = Catalog::build(manager.connections()).await;
        Self::new(manager, catalog, model)
    }

    /// Set the system prompt
    pub fn with_system_prompt(mut self, prompt: Option<String>) -> Self {
        self.system_prompt = prompt;
        self
    }

    /// Run the calls of one reply concurrently (results keep request order)
    pub fn with_parallel_tools(mut self, parallel: bool) -> Self {
        self.parallel_tools = parallel;
        self
    }

    /// Answer without tools instead of failing when the catalog is empty
    pub fn with_answer_only(mut self, answer_only: bool) -> Self {
        self.answer_only = answer_only;
        self
    }

    /// Set event sender for real-time event visibility
    pub fn with_event_sender(mut self, sender: EventSender) -> Self {
        self.event_sender = RouterEventSender::new(sender);
        self
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn manager(&self) -> &ConnectionManager {
        &self.manager
    }

    pub fn model(&self) -> &str {
        self.model.model()
    }

    /// Get current conversation history
    pub fn history(&self) -> &[ConversationTurn] {
        self.conversation.snapshot()
    }

    /// Start a new conversation; the previous one is discarded whole
    pub fn clear_history(&mut self) {
        self.conversation = Conversation::new();
    }

    /// Process one user message and return the assistant's answer.
    ///
    /// Tool failures never end the turn; they are recorded as tool results.
    /// An empty catalog (unless answer-only mode is on) fails before the
    /// model is called; model failures propagate. History up to the failure
    /// point is kept either way.
    pub async fn handle_user_turn(&mut self, text: &str) -> Result<String, RouterError> {
        if self.catalog.is_empty() && !self.answer_only {
            self.event_sender.error(&EmptyCatalog.to_string());
            return Err(EmptyCatalog.into());
        }

        let started = Instant::now();
        self.event_sender.turn_start(text);
        self.conversation.append(ConversationTurn::user(text));

        let reply = self.submit(ToolChoice::Auto).await?;

        if !reply.has_tool_calls() {
            tracing::info!("Model responded without tool calls");
            return Ok(self.finish(reply.content.unwrap_or_default(), started));
        }

        let ModelReply { content, tool_calls } = reply;
        let names: Vec<String> = tool_calls.iter().map(|c| c.name.clone()).collect();
        tracing::info!("Model requested {} tool call(s): {:?}", names.len(), names);
        self.event_sender.tools_requested(names);

        self.conversation.append(ConversationTurn::Assistant {
            content,
            tool_calls: tool_calls.clone(),
        });

        let results = self.execute_batch(&tool_calls).await;
        for (call, result) in tool_calls.iter().zip(results) {
            self.conversation
                .append(ConversationTurn::tool_result(call.call_id.clone(), result));
        }

        let follow_up = self.submit(ToolChoice::None).await?;
        if follow_up.has_tool_calls() {
            tracing::warn!(
                "Ignoring {} tool call(s) in the answer-only follow-up",
                follow_up.tool_calls.len()
            );
        }

        Ok(self.finish(follow_up.content.unwrap_or_default(), started))
    }

    /// Route a single call through the catalog
    pub async fn dispatch(&self, name: &str, arguments: Value) -> Result<String, DispatchError> {
        let descriptor = self.catalog.resolve(name)?;
        let connection = descriptor
            .connection()
            .ok_or_else(|| ToolExecutionError::ConnectionClosed {
                server: descriptor.server.clone(),
            })?;

        Ok(self.manager.send_call(&connection, name, arguments).await?)
    }

    /// Close every connection
    pub async fn shutdown(&mut self) {
        self.manager.shutdown().await;
    }

    async fn submit(&self, tool_choice: ToolChoice) -> Result<ModelReply, RouterError> {
        let tools: &[FunctionSchema] = match tool_choice {
            ToolChoice::Auto => &self.schemas,
            ToolChoice::None => &[],
        };

        let request = ModelRequest {
            system: self.system_prompt.as_deref(),
            turns: self.conversation.snapshot(),
            tools,
            tool_choice,
        };

        self.model.complete(request).await.map_err(|e| {
            tracing::warn!("Model call failed: {}", e);
            self.event_sender.error(&e.to_string());
            RouterError::from(e)
        })
    }

    fn finish(&mut self, content: String, started: Instant) -> String {
        self.conversation
            .append(ConversationTurn::assistant(content.clone()));
        self.event_sender.answered(&content, started.elapsed());
        content
    }

    /// One result string per call, in request order
    async fn execute_batch(&self, calls: &[ToolCallRequest]) -> Vec<String> {
        if self.parallel_tools {
            join_all(calls.iter().map(|call| self.execute(call))).await
        } else {
            let mut results = Vec::with_capacity(calls.len());
            for call in calls {
                results.push(self.execute(call).await);
            }
            results
        }
    }

    async fn execute(&self, call: &ToolCallRequest) -> String {
        self.event_sender.tool_start(&call.name, &call.arguments);
        let start = Instant::now();

        let (text, is_error) = match self.dispatch(&call.name, call.arguments.clone()).await {
            Ok(text) => (text, false),
            Err(e) => (e.to_tool_result(&call.name), true),
        };

        self.event_sender
            .tool_complete(&call.name, &text, start.elapsed(), is_error);
        text
    }
}
