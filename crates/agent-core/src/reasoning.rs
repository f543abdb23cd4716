//! Reasoning Loop
//!
//! Implements the tool-augmented conversation loop. Each user utterance is
//! appended to the session, then the model is queried repeatedly: tool calls it
//! requests are executed in order and their results appended, until it
//! produces a final answer, which is streamed to an [`OutputSink`].
//!
//! Only final answers reach the sink. Streamed text is held until the stream's
//! sentinel shows whether it belongs to an answer or to a tool call request.
//!
//! ```text
//! AwaitingInput ──user turn──▶ Querying ──answer──▶ Streaming ──▶ AwaitingInput
//!                                 ▲   │
//!                                 │   └─tool calls─▶ Dispatching
//!                                 └────────────────────┘
//! ```
//!
//! Any state can move to `Closed` through [`Agent::close`] or a fatal error.

use async_trait::async_trait;
use futures::StreamExt;
use std::sync::Arc;

use crate::error::{AgentError, Result};
use crate::message::{Conversation, Turn};
use crate::provider::{GenerationOptions, LlmProvider, ModelResponse, StreamEvent};
use crate::session::Session;
use crate::tool::{ToolCall, ToolDeclaration, ToolRegistry, ToolResult};

/// Where the loop currently is
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopState {
    AwaitingInput,
    Querying,
    Streaming,
    Dispatching,
    Closed,
}

/// Receiver of streamed answer text
#[async_trait]
pub trait OutputSink: Send {
    /// Forward one fragment, as soon as it arrives
    async fn write_chunk(&mut self, chunk: &str) -> Result<()>;

    /// Called once after the last fragment of an answer
    async fn end_answer(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Sink that drops everything
pub struct NullSink;

#[async_trait]
impl OutputSink for NullSink {
    async fn write_chunk(&mut self, _chunk: &str) -> Result<()> {
        Ok(())
    }
}

/// Collects fragments in arrival order
#[async_trait]
impl OutputSink for Vec<String> {
    async fn write_chunk(&mut self, chunk: &str) -> Result<()> {
        self.push(chunk.to_owned());
        Ok(())
    }
}

/// Agent configuration
#[derive(Clone, Debug)]
pub struct AgentConfig {
    /// Optional system prompt placed before the first user turn
    pub system_prompt: Option<String>,

    /// Maximum model queries per user utterance
    pub max_iterations: usize,

    /// Generation options
    pub generation: GenerationOptions,

    /// Stream answers chunk by chunk
    pub stream: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            system_prompt: None,
            max_iterations: 10,
            generation: GenerationOptions::default(),
            stream: true,
        }
    }
}

enum Step {
    Answer(String),
    ToolCalls { preamble: String, calls: Vec<ToolCall> },
}

/// One conversational session driven against a provider and a tool registry
pub struct Agent {
    provider: Arc<dyn LlmProvider>,
    tools: Arc<ToolRegistry>,
    config: AgentConfig,
    session: Session,
    state: LoopState,
}

impl Agent {
    /// Create a new agent
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        tools: Arc<ToolRegistry>,
        config: AgentConfig,
    ) -> Self {
        let session = config
            .system_prompt
            .as_ref()
            .map_or_else(Session::new, |prompt| Session::with_system_prompt(prompt.clone()));

        Self {
            provider,
            tools,
            config,
            session,
            state: LoopState::AwaitingInput,
        }
    }

    /// Create with default configuration
    pub fn with_defaults(provider: Arc<dyn LlmProvider>, tools: Arc<ToolRegistry>) -> Self {
        Self::new(provider, tools, AgentConfig::default())
    }

    pub const fn state(&self) -> LoopState {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        self.state == LoopState::Closed
    }

    pub const fn session(&self) -> &Session {
        &self.session
    }

    pub fn conversation(&self) -> &Conversation {
        self.session.conversation()
    }

    /// Get the tool registry
    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Get configuration
    pub const fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// End the session. No further queries are issued.
    pub fn close(&mut self) {
        if self.state != LoopState::Closed {
            tracing::info!(
                session = %self.session.id,
                turns = self.session.turn_count(),
                duration_secs = self.session.duration().num_seconds(),
                "Session closed"
            );
        }
        self.state = LoopState::Closed;
    }

    /// Process one user utterance, streaming the answer into `sink`
    ///
    /// Returns the full answer text. Transient model failures leave the session
    /// ready for another attempt; fatal ones close it.
    pub async fn handle_input<S>(&mut self, utterance: &str, sink: &mut S) -> Result<String>
    where
        S: OutputSink + ?Sized,
    {
        if self.state == LoopState::Closed {
            return Err(AgentError::SessionClosed);
        }

        self.session.append(Turn::user(utterance));
        let result = self.run_cycle(sink).await;

        match &result {
            Ok(_) => self.state = LoopState::AwaitingInput,
            Err(e) if e.is_fatal() => {
                tracing::error!(session = %self.session.id, error = %e, "Fatal error, closing session");
                self.close();
            }
            Err(e) => {
                tracing::warn!(session = %self.session.id, error = %e, "Utterance failed");
                self.state = LoopState::AwaitingInput;
            }
        }

        result
    }

    /// Run one utterance without streaming anywhere
    pub async fn ask(&mut self, question: &str) -> Result<String> {
        self.handle_input(question, &mut NullSink).await
    }

    async fn run_cycle<S>(&mut self, sink: &mut S) -> Result<String>
    where
        S: OutputSink + ?Sized,
    {
        let declarations = self.tools.describe_all();

        for iteration in 1..=self.config.max_iterations {
            self.state = LoopState::Querying;

            let unresolved = self.session.conversation().unresolved_tool_calls();
            if !unresolved.is_empty() {
                return Err(AgentError::ModelProtocol(format!(
                    "tool calls without results: {}",
                    unresolved.join(", ")
                )));
            }

            tracing::debug!(
                session = %self.session.id,
                iteration,
                turns = self.session.turn_count(),
                "Querying model"
            );

            let step = if self.config.stream {
                self.query_streaming(&declarations, sink).await?
            } else {
                self.query_blocking(&declarations, sink).await?
            };

            match step {
                Step::Answer(text) => {
                    self.session.append(Turn::assistant(text.clone()));
                    sink.end_answer().await?;
                    return Ok(text);
                }
                Step::ToolCalls { preamble, calls } => {
                    if calls.is_empty() {
                        return Err(AgentError::ModelProtocol(
                            "tool call request without any calls".into(),
                        ));
                    }

                    self.state = LoopState::Dispatching;
                    self.session.append(Turn::tool_request(preamble, calls.clone()));

                    for call in &calls {
                        let result = self.dispatch(call).await;
                        self.session.append(Turn::tool_result(&result));
                    }
                }
            }
        }

        Err(AgentError::MaxIterations(self.config.max_iterations))
    }

    async fn query_blocking<S>(
        &mut self,
        declarations: &[ToolDeclaration],
        sink: &mut S,
    ) -> Result<Step>
    where
        S: OutputSink + ?Sized,
    {
        let response = self
            .provider
            .query(
                self.session.conversation().turns(),
                declarations,
                &self.config.generation,
            )
            .await?;

        match response {
            ModelResponse::FinalAnswer(text) => {
                self.state = LoopState::Streaming;
                if !text.is_empty() {
                    sink.write_chunk(&text).await?;
                }
                Ok(Step::Answer(text))
            }
            ModelResponse::ToolCallsRequested { preamble, calls } => {
                Ok(Step::ToolCalls { preamble, calls })
            }
        }
    }

    async fn query_streaming<S>(
        &mut self,
        declarations: &[ToolDeclaration],
        sink: &mut S,
    ) -> Result<Step>
    where
        S: OutputSink + ?Sized,
    {
        let mut stream = self
            .provider
            .query_stream(
                self.session.conversation().turns(),
                declarations,
                &self.config.generation,
            )
            .await?;

        let mut pending: Vec<String> = Vec::new();
        while let Some(event) = stream.next().await {
            match event? {
                StreamEvent::Chunk(chunk) => pending.push(chunk.delta),
                StreamEvent::Completed => {
                    self.state = LoopState::Streaming;
                    for delta in &pending {
                        sink.write_chunk(delta).await?;
                    }
                    return Ok(Step::Answer(pending.concat()));
                }
                StreamEvent::ToolCallsRequested(calls) => {
                    return Ok(Step::ToolCalls {
                        preamble: pending.concat(),
                        calls,
                    });
                }
            }
        }

        Err(AgentError::ModelUnavailable(
            "response stream ended before completion".into(),
        ))
    }

    /// Execute a tool call; every outcome becomes a result for the model
    async fn dispatch(&self, call: &ToolCall) -> ToolResult {
        tracing::debug!(
            session = %self.session.id,
            tool = %call.name,
            call_id = %call.id,
            "Executing tool"
        );

        match self.tools.invoke(call).await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(tool = %call.name, error = %e, "Tool call rejected");
                ToolResult::failure(call, e.to_string())
            }
        }
    }
}

/// Builder for Agent configuration
pub struct AgentBuilder {
    provider: Option<Arc<dyn LlmProvider>>,
    tools: Arc<ToolRegistry>,
    config: AgentConfig,
}

impl Default for AgentBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentBuilder {
    pub fn new() -> Self {
        Self {
            provider: None,
            tools: Arc::new(ToolRegistry::new()),
            config: AgentConfig::default(),
        }
    }

    pub fn provider(mut self, provider: Arc<dyn LlmProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = Arc::new(tools);
        self
    }

    /// Use a registry shared with other sessions
    pub fn shared_tools(mut self, tools: Arc<ToolRegistry>) -> Self {
        self.tools = tools;
        self
    }

    pub fn config(mut self, config: AgentConfig) -> Self {
        self.config = config;
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.generation.model = model.into();
        self
    }

    pub fn temperature(mut self, temp: f32) -> Self {
        self.config.generation.temperature = temp;
        self
    }

    pub fn max_tokens(mut self, max_tokens: Option<u32>) -> Self {
        self.config.generation.max_tokens = max_tokens;
        self
    }

    pub fn max_iterations(mut self, max: usize) -> Self {
        self.config.max_iterations = max;
        self
    }

    pub fn streaming(mut self, stream: bool) -> Self {
        self.config.stream = stream;
        self
    }

    pub fn build(self) -> Result<Agent> {
        let provider = self
            .provider
            .ok_or_else(|| AgentError::Config("Provider is required".into()))?;

        if self.config.max_iterations == 0 {
            return Err(AgentError::Config("max_iterations must be at least 1".into()));
        }

        Ok(Agent::new(provider, self.tools, self.config))
    }
}
