//! LLM Provider Strategy Pattern
//!
//! Defines a common interface for all language-model backends (OpenAI-compatible
//! chat APIs, plain completion servers, test doubles) so the reasoning loop can
//! work with any of them without code changes.
//!
//! A provider answers a query in one of two ways: a final answer, or a batch of
//! tool calls that must be resolved before it is asked again. In streaming mode
//! the response text arrives as ordered [`StreamChunk`]s followed by exactly one
//! sentinel event; tool calls are never split across events. Text that comes
//! before a tool call sentinel is the request's preamble, not an answer.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use agent_core::provider::{LlmProvider, GenerationOptions};
//!
//! let provider = OpenAiProvider::from_env()?;
//! let response = provider.query(conversation.turns(), &tools, &options).await?;
//! ```

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::{AgentError, Result};
use crate::message::Turn;
use crate::tool::{ToolCall, ToolDeclaration};

/// Configuration for LLM generation
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GenerationOptions {
    /// Model identifier (e.g., "gpt-4o-mini", "llama3.2")
    pub model: String,

    /// Temperature for sampling (0.0 = deterministic)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens to generate (provider default when unset)
    #[serde(default)]
    pub max_tokens: Option<u32>,

    /// Stop sequences
    #[serde(default)]
    pub stop_sequences: Vec<String>,
}

const fn default_temperature() -> f32 {
    0.0
}

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.into(),
            temperature: default_temperature(),
            max_tokens: None,
            stop_sequences: Vec::new(),
        }
    }
}

/// What the model wants to happen next
#[derive(Clone, Debug, PartialEq)]
pub enum ModelResponse {
    /// User-facing text; no tool calls pending
    FinalAnswer(String),

    /// Tools to run before the model can be asked again
    ToolCallsRequested {
        /// Text the model produced alongside the calls, often empty
        preamble: String,
        calls: Vec<ToolCall>,
    },
}

impl ModelResponse {
    /// Tool calls with no accompanying text
    pub const fn tool_calls(calls: Vec<ToolCall>) -> Self {
        Self::ToolCallsRequested {
            preamble: String::new(),
            calls,
        }
    }
}

/// A fragment of streamed assistant text
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamChunk {
    /// The text delta
    pub delta: String,
}

impl StreamChunk {
    pub fn new(delta: impl Into<String>) -> Self {
        Self {
            delta: delta.into(),
        }
    }
}

/// One item of a streamed response
#[derive(Clone, Debug, PartialEq)]
pub enum StreamEvent {
    /// Incremental answer text
    Chunk(StreamChunk),

    /// Sentinel: the final answer is complete
    Completed,

    /// Sentinel: fully formed tool calls
    ToolCallsRequested(Vec<ToolCall>),
}

/// Stream type for streamed queries
pub type ResponseStream = Pin<Box<dyn Stream<Item = Result<StreamEvent>> + Send>>;

/// Provider metadata
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProviderInfo {
    /// Provider name (e.g., "openai", "vllm")
    pub name: String,

    /// Whether answers can be streamed incrementally
    pub supports_streaming: bool,

    /// Whether the provider can request tool calls
    pub supports_tools: bool,
}

/// Strategy trait for LLM providers
///
/// Implement this trait to add support for new LLM backends.
/// The agent works exclusively through this interface.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Get provider information and capabilities
    fn info(&self) -> ProviderInfo;

    /// Check if the provider is available and configured correctly
    async fn health_check(&self) -> Result<bool>;

    /// Submit the conversation and available tools
    async fn query(
        &self,
        turns: &[Turn],
        tools: &[ToolDeclaration],
        options: &GenerationOptions,
    ) -> Result<ModelResponse>;

    /// Streamed variant of [`LlmProvider::query`]
    ///
    /// The default delivers the whole answer as a single chunk.
    async fn query_stream(
        &self,
        turns: &[Turn],
        tools: &[ToolDeclaration],
        options: &GenerationOptions,
    ) -> Result<ResponseStream> {
        let response = self.query(turns, tools, options).await?;
        Ok(response_into_stream(response))
    }
}

/// Wrap a complete response as a stream
pub fn response_into_stream(response: ModelResponse) -> ResponseStream {
    let (text, sentinel) = match response {
        ModelResponse::FinalAnswer(text) => (text, StreamEvent::Completed),
        ModelResponse::ToolCallsRequested { preamble, calls } => {
            (preamble, StreamEvent::ToolCallsRequested(calls))
        }
    };

    let mut events = Vec::with_capacity(2);
    if !text.is_empty() {
        events.push(StreamEvent::Chunk(StreamChunk::new(text)));
    }
    events.push(sentinel);

    Box::pin(futures::stream::iter(
        events.into_iter().map(Ok::<StreamEvent, AgentError>),
    ))
}

/// Drain a stream into the equivalent non-streamed response
pub async fn collect_stream(mut stream: ResponseStream) -> Result<ModelResponse> {
    let mut text = String::new();

    while let Some(event) = stream.next().await {
        match event? {
            StreamEvent::Chunk(chunk) => text.push_str(&chunk.delta),
            StreamEvent::Completed => return Ok(ModelResponse::FinalAnswer(text)),
            StreamEvent::ToolCallsRequested(calls) => {
                return Ok(ModelResponse::ToolCallsRequested {
                    preamble: text,
                    calls,
                });
            }
        }
    }

    Err(AgentError::ModelUnavailable(
        "response stream ended before completion".into(),
    ))
}

/// Multi-provider wrapper with failover support
///
/// Every query starts at the first provider. A retryable failure moves on to
/// the next one and repeats the same query, so a primary that recovers is used
/// again from the following query on.
pub struct ProviderChain {
    providers: Vec<Arc<dyn LlmProvider>>,
    last_index: AtomicUsize,
}

impl ProviderChain {
    pub fn new(providers: Vec<Arc<dyn LlmProvider>>) -> Result<Self> {
        if providers.is_empty() {
            return Err(AgentError::Config(
                "provider chain needs at least one provider".into(),
            ));
        }

        Ok(Self {
            providers,
            last_index: AtomicUsize::new(0),
        })
    }

    /// Provider that answered the most recent query
    pub fn last_used(&self) -> &dyn LlmProvider {
        let idx = self.last_index.load(Ordering::SeqCst) % self.providers.len();
        self.providers[idx].as_ref()
    }

    async fn with_failover<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: Fn(Arc<dyn LlmProvider>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut last_error = None;

        for (idx, provider) in self.providers.iter().enumerate() {
            match op(provider.clone()).await {
                Ok(value) => {
                    if idx > 0 {
                        tracing::info!(provider = %provider.info().name, "Answered by fallback");
                    }
                    self.last_index.store(idx, Ordering::SeqCst);
                    return Ok(value);
                }
                Err(e) if e.is_retryable() => {
                    tracing::warn!(
                        provider = %provider.info().name,
                        error = %e,
                        "Provider failed, trying next"
                    );
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error
            .unwrap_or_else(|| AgentError::ModelUnavailable("no provider answered".into())))
    }
}

#[async_trait]
impl LlmProvider for ProviderChain {
    fn info(&self) -> ProviderInfo {
        let infos: Vec<ProviderInfo> = self.providers.iter().map(|p| p.info()).collect();

        ProviderInfo {
            name: infos
                .iter()
                .map(|i| i.name.as_str())
                .collect::<Vec<_>>()
                .join(" -> "),
            supports_streaming: infos.iter().all(|i| i.supports_streaming),
            supports_tools: infos.iter().any(|i| i.supports_tools),
        }
    }

    async fn health_check(&self) -> Result<bool> {
        for provider in &self.providers {
            if provider.health_check().await.unwrap_or(false) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn query(
        &self,
        turns: &[Turn],
        tools: &[ToolDeclaration],
        options: &GenerationOptions,
    ) -> Result<ModelResponse> {
        self.with_failover(|p| async move { p.query(turns, tools, options).await })
            .await
    }

    async fn query_stream(
        &self,
        turns: &[Turn],
        tools: &[ToolDeclaration],
        options: &GenerationOptions,
    ) -> Result<ResponseStream> {
        self.with_failover(|p| async move { p.query_stream(turns, tools, options).await })
            .await
    }
}
