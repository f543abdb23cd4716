//! Scripted provider used by unit tests

use async_trait::async_trait;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::Mutex;

use crate::error::{AgentError, Result};
use crate::message::Turn;
use crate::provider::{
    GenerationOptions, LlmProvider, ModelResponse, ProviderInfo, ResponseStream, StreamChunk,
    StreamEvent,
};
use crate::tool::{ToolCall, ToolDeclaration};

pub fn answer(text: &str) -> Result<ModelResponse> {
    Ok(ModelResponse::FinalAnswer(text.into()))
}

pub fn calls(calls: Vec<ToolCall>) -> Result<ModelResponse> {
    Ok(ModelResponse::tool_calls(calls))
}

pub fn calls_after(preamble: &str, calls: Vec<ToolCall>) -> Result<ModelResponse> {
    Ok(ModelResponse::ToolCallsRequested {
        preamble: preamble.into(),
        calls,
    })
}

pub fn calculator_call(id: &str, a: i64, b: i64) -> ToolCall {
    ToolCall::new(
        id,
        "calculator",
        json!({ "a": a, "b": b }).as_object().cloned().unwrap(),
    )
}

/// Replays a fixed list of responses and records every conversation it is sent.
/// Streamed text is split into word-sized chunks.
pub struct ScriptedProvider {
    name: String,
    script: Mutex<VecDeque<Result<ModelResponse>>>,
    seen: Mutex<Vec<Vec<Turn>>>,
    seen_tools: Mutex<Vec<Vec<ToolDeclaration>>>,
}

impl ScriptedProvider {
    pub fn new(script: Vec<Result<ModelResponse>>) -> Self {
        Self::named("scripted", script)
    }

    pub fn named(name: &str, script: Vec<Result<ModelResponse>>) -> Self {
        Self {
            name: name.into(),
            script: Mutex::new(script.into()),
            seen: Mutex::new(Vec::new()),
            seen_tools: Mutex::new(Vec::new()),
        }
    }

    /// Conversations as they were at each query
    pub fn queries(&self) -> Vec<Vec<Turn>> {
        self.seen.lock().unwrap().clone()
    }

    pub fn tools_seen(&self) -> Vec<Vec<ToolDeclaration>> {
        self.seen_tools.lock().unwrap().clone()
    }

    pub fn query_count(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    fn next(&self, turns: &[Turn], tools: &[ToolDeclaration]) -> Result<ModelResponse> {
        self.seen.lock().unwrap().push(turns.to_vec());
        self.seen_tools.lock().unwrap().push(tools.to_vec());
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(AgentError::ModelProtocol("script exhausted".into())))
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn info(&self) -> ProviderInfo {
        ProviderInfo {
            name: self.name.clone(),
            supports_streaming: true,
            supports_tools: true,
        }
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    async fn query(
        &self,
        turns: &[Turn],
        tools: &[ToolDeclaration],
        _options: &GenerationOptions,
    ) -> Result<ModelResponse> {
        self.next(turns, tools)
    }

    async fn query_stream(
        &self,
        turns: &[Turn],
        tools: &[ToolDeclaration],
        _options: &GenerationOptions,
    ) -> Result<ResponseStream> {
        let (text, sentinel) = match self.next(turns, tools)? {
            ModelResponse::FinalAnswer(text) => (text, StreamEvent::Completed),
            ModelResponse::ToolCallsRequested { preamble, calls } => {
                (preamble, StreamEvent::ToolCallsRequested(calls))
            }
        };
        let events: Vec<Result<StreamEvent>> = text
            .split_inclusive(' ')
            .map(|word| Ok(StreamEvent::Chunk(StreamChunk::new(word))))
            .chain(std::iter::once(Ok(sentinel)))
            .collect();

        Ok(Box::pin(futures::stream::iter(events)))
    }
}
