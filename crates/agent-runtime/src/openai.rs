//! OpenAI-compatible chat completions provider
//!
//! Works with OpenAI itself and with servers exposing the same API, such as
//! Ollama (`http://localhost:11434/v1`) and vLLM's OpenAI endpoint. Tool calling
//! uses the native `tools` / `tool_calls` protocol; streaming reads the
//! server-sent event body.

use std::collections::BTreeMap;

use agent_core::{
    error::{AgentError, Result},
    message::{Role, Turn},
    provider::{
        GenerationOptions, LlmProvider, ModelResponse, ProviderInfo, ResponseStream, StreamChunk,
        StreamEvent,
    },
    tool::{ToolCall, ToolDeclaration},
};
use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::http::{build_client, check_status, parse_arguments, read_json, transport_error};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

const DONE_MARKER: &str = "[DONE]";

/// OpenAI provider configuration
#[derive(Clone, Debug)]
pub struct OpenAiConfig {
    /// API root, without the trailing `/chat/completions`
    pub base_url: String,

    /// Bearer token; local servers usually need none
    pub api_key: Option<String>,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.into(),
            api_key: None,
            timeout_secs: 60,
        }
    }
}

impl OpenAiConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let base_url = std::env::var("OPENAI_BASE_URL").unwrap_or(defaults.base_url);
        let api_key = std::env::var("OPENAI_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty());
        let timeout_secs = std::env::var("OPENAI_TIMEOUT_SECS")
            .ok()
            .and_then(|t| t.parse().ok())
            .unwrap_or(defaults.timeout_secs);

        Self {
            base_url,
            api_key,
            timeout_secs,
        }
    }
}

/// OpenAI-compatible LLM provider
pub struct OpenAiProvider {
    client: Client,
    config: OpenAiConfig,
}

impl OpenAiProvider {
    /// Create from configuration
    pub fn from_config(mut config: OpenAiConfig) -> Result<Self> {
        config.base_url = config.base_url.trim_end_matches('/').to_owned();
        Ok(Self {
            client: build_client(config.timeout_secs)?,
            config,
        })
    }

    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_config(OpenAiConfig::from_env())
    }

    pub const fn config(&self) -> &OpenAiConfig {
        &self.config
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.config.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    async fn send(&self, body: &ChatRequest) -> Result<reqwest::Response> {
        tracing::debug!(
            model = %body.model,
            messages = body.messages.len(),
            tools = body.tools.len(),
            stream = body.stream,
            "Sending chat completion request"
        );

        let request = self
            .client
            .post(format!("{}/chat/completions", self.config.base_url))
            .json(body);

        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(|e| transport_error(&e))?;

        check_status(response).await
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn info(&self) -> ProviderInfo {
        ProviderInfo {
            name: "openai".into(),
            supports_streaming: true,
            supports_tools: true,
        }
    }

    async fn health_check(&self) -> Result<bool> {
        let request = self
            .client
            .get(format!("{}/models", self.config.base_url));

        match self.authorized(request).send().await {
            Ok(response) => Ok(response.status().is_success()),
            Err(e) => {
                tracing::warn!("OpenAI health check failed: {}", e);
                Ok(false)
            }
        }
    }

    async fn query(
        &self,
        turns: &[Turn],
        tools: &[ToolDeclaration],
        options: &GenerationOptions,
    ) -> Result<ModelResponse> {
        let body = ChatRequest::new(turns, tools, options, false);
        let response: ChatResponse = read_json(self.send(&body).await?).await?;
        response.into_model_response()
    }

    async fn query_stream(
        &self,
        turns: &[Turn],
        tools: &[ToolDeclaration],
        options: &GenerationOptions,
    ) -> Result<ResponseStream> {
        let body = ChatRequest::new(turns, tools, options, true);
        let response = self.send(&body).await?;

        let stream = async_stream::stream! {
            let mut events = response.bytes_stream().eventsource();
            let mut accumulator = ToolCallAccumulator::default();
            let mut finished = false;

            while let Some(event) = events.next().await {
                let event = match event {
                    Ok(event) => event,
                    Err(e) => {
                        yield Err(AgentError::ModelUnavailable(format!("stream interrupted: {e}")));
                        return;
                    }
                };

                let data = event.data.trim();
                if data.is_empty() {
                    continue;
                }
                if data == DONE_MARKER {
                    finished = true;
                    break;
                }

                match parse_frame(data, &mut accumulator) {
                    Ok(frame) => {
                        finished |= frame.finished;
                        if let Some(delta) = frame.text {
                            yield Ok(StreamEvent::Chunk(StreamChunk::new(delta)));
                        }
                    }
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                }
            }

            if !finished {
                yield Err(AgentError::ModelUnavailable(
                    "stream ended before the model finished".into(),
                ));
                return;
            }

            if accumulator.is_empty() {
                yield Ok(StreamEvent::Completed);
            } else {
                yield accumulator.finish().map(StreamEvent::ToolCallsRequested);
            }
        };

        Ok(Box::pin(stream))
    }
}

struct Frame {
    text: Option<String>,
    finished: bool,
}

fn parse_frame(data: &str, accumulator: &mut ToolCallAccumulator) -> Result<Frame> {
    let chunk: StreamFrame = serde_json::from_str(data)
        .map_err(|e| AgentError::ModelProtocol(format!("unexpected stream frame: {e}")))?;

    let mut frame = Frame {
        text: None,
        finished: false,
    };

    if let Some(choice) = chunk.choices.into_iter().next() {
        if let Some(calls) = choice.delta.tool_calls {
            accumulator.process(calls);
        }
        frame.text = choice.delta.content.filter(|text| !text.is_empty());
        frame.finished = choice.finish_reason.is_some();
    }

    Ok(frame)
}

/// Collects tool call fragments by index until the stream ends
#[derive(Debug, Default)]
struct ToolCallAccumulator {
    calls: BTreeMap<usize, PartialToolCall>,
}

#[derive(Debug, Default)]
struct PartialToolCall {
    id: Option<String>,
    name: Option<String>,
    arguments: String,
}

impl ToolCallAccumulator {
    fn process(&mut self, deltas: Vec<ToolCallDelta>) {
        for delta in deltas {
            let entry = self.calls.entry(delta.index).or_default();
            if let Some(id) = delta.id {
                entry.id = Some(id);
            }
            if let Some(function) = delta.function {
                if let Some(name) = function.name {
                    entry.name = Some(name);
                }
                if let Some(arguments) = function.arguments {
                    entry.arguments.push_str(&arguments);
                }
            }
        }
    }

    fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// Complete calls in index order; a call missing its id or name is an error
    fn finish(self) -> Result<Vec<ToolCall>> {
        self.calls
            .into_iter()
            .map(|(index, partial)| {
                let id = partial.id.ok_or_else(|| {
                    AgentError::ModelProtocol(format!("streamed tool call {index} has no id"))
                })?;
                let name = partial.name.ok_or_else(|| {
                    AgentError::ModelProtocol(format!("streamed tool call {index} has no name"))
                })?;
                let arguments = parse_arguments(&name, &partial.arguments)?;
                Ok(ToolCall::new(id, name, arguments))
            })
            .collect()
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<WireMessage>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    stop: Vec<String>,
    stream: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool>,
}

impl ChatRequest {
    fn new(
        turns: &[Turn],
        tools: &[ToolDeclaration],
        options: &GenerationOptions,
        stream: bool,
    ) -> Self {
        Self {
            model: options.model.clone(),
            messages: turns.iter().map(WireMessage::from).collect(),
            temperature: options.temperature,
            max_tokens: options.max_tokens,
            stop: options.stop_sequences.clone(),
            stream,
            tools: tools.iter().map(WireTool::from).collect(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct WireMessage {
    role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl From<&Turn> for WireMessage {
    fn from(turn: &Turn) -> Self {
        let role = match turn.role {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        };

        let tool_calls = (!turn.tool_calls.is_empty())
            .then(|| turn.tool_calls.iter().map(WireToolCall::from).collect());

        // Assistant turns that only carry tool calls are sent with null content
        let content = if turn.content.is_empty() && tool_calls.is_some() {
            None
        } else {
            Some(turn.content.clone())
        };

        Self {
            role: role.into(),
            content,
            tool_calls,
            tool_call_id: turn.tool_call_id.clone(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type", default = "function_kind")]
    kind: String,
    function: WireFunctionCall,
}

fn function_kind() -> String {
    "function".into()
}

impl From<&ToolCall> for WireToolCall {
    fn from(call: &ToolCall) -> Self {
        Self {
            id: call.id.clone(),
            kind: function_kind(),
            function: WireFunctionCall {
                name: call.name.clone(),
                arguments: Value::Object(call.arguments.clone()).to_string(),
            },
        }
    }
}

impl WireToolCall {
    fn into_tool_call(self) -> Result<ToolCall> {
        let arguments = parse_arguments(&self.function.name, &self.function.arguments)?;
        Ok(ToolCall::new(self.id, self.function.name, arguments))
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct WireFunctionCall {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Serialize)]
struct WireTool {
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireFunction,
}

#[derive(Debug, Serialize)]
struct WireFunction {
    name: String,
    description: String,
    parameters: Value,
}

impl From<&ToolDeclaration> for WireTool {
    fn from(declaration: &ToolDeclaration) -> Self {
        Self {
            kind: "function",
            function: WireFunction {
                name: declaration.name.clone(),
                description: declaration.description.clone(),
                parameters: declaration.json_schema(),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: WireMessage,
}

impl ChatResponse {
    fn into_model_response(self) -> Result<ModelResponse> {
        let choice = self
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AgentError::ModelProtocol("response has no choices".into()))?;

        let content = choice.message.content.unwrap_or_default();
        match choice.message.tool_calls {
            Some(calls) if !calls.is_empty() => {
                let calls = calls
                    .into_iter()
                    .map(WireToolCall::into_tool_call)
                    .collect::<Result<Vec<_>>>()?;
                Ok(ModelResponse::ToolCallsRequested {
                    preamble: content,
                    calls,
                })
            }
            _ => Ok(ModelResponse::FinalAnswer(content)),
        }
    }
}

#[derive(Debug, Deserialize)]
struct StreamFrame {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    content: Option<String>,
    tool_calls: Option<Vec<ToolCallDelta>>,
}

#[derive(Debug, Deserialize)]
struct ToolCallDelta {
    index: usize,
    id: Option<String>,
    function: Option<FunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct FunctionDelta {
    name: Option<String>,
    arguments: Option<String>,
}
