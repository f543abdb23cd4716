//! vLLM text-completions provider
//!
//! Fallback for servers that only expose the plain `/v1/completions` endpoint.
//! The conversation is flattened into a role-prefixed transcript and the model
//! continues it. No tool protocol is available, so this provider only ever
//! produces final answers.

use agent_core::{
    error::{AgentError, Result},
    message::{Role, Turn},
    provider::{GenerationOptions, LlmProvider, ModelResponse, ProviderInfo},
    tool::ToolDeclaration,
};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::http::{build_client, check_status, read_json, transport_error};

pub const DEFAULT_VLLM_URL: &str = "http://localhost:8000/v1/completions";
pub const DEFAULT_VLLM_MODEL: &str = "meta-llama/Llama-2-7b-hf";

/// Keeps the model from writing the user's next line
const TRANSCRIPT_STOP: &str = "\nUser:";

/// vLLM provider configuration
#[derive(Clone, Debug)]
pub struct VllmConfig {
    /// Full completions URL
    pub url: String,

    /// Model served by vLLM; used regardless of the requested model
    pub model: String,

    /// Request timeout in seconds
    pub timeout_secs: u64,

    /// Token limit when the request does not set one
    pub default_max_tokens: u32,
}

impl Default for VllmConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_VLLM_URL.into(),
            model: DEFAULT_VLLM_MODEL.into(),
            timeout_secs: 60,
            default_max_tokens: 128,
        }
    }
}

impl VllmConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            url: std::env::var("VLLM_URL").unwrap_or(defaults.url),
            model: std::env::var("VLLM_MODEL").unwrap_or(defaults.model),
            ..defaults
        }
    }
}

/// vLLM completions provider
pub struct VllmProvider {
    client: Client,
    config: VllmConfig,
}

impl VllmProvider {
    /// Create from configuration
    pub fn from_config(config: VllmConfig) -> Result<Self> {
        Ok(Self {
            client: build_client(config.timeout_secs)?,
            config,
        })
    }

    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_config(VllmConfig::from_env())
    }

    pub const fn config(&self) -> &VllmConfig {
        &self.config
    }

    /// Render turns as a transcript the model continues as the assistant
    fn render_prompt(turns: &[Turn]) -> String {
        let mut prompt = String::new();

        for turn in turns {
            let line = match turn.role {
                Role::System => format!("System: {}", turn.content),
                Role::User => format!("User: {}", turn.content),
                Role::Assistant if turn.has_tool_calls() => {
                    let names: Vec<&str> =
                        turn.tool_calls.iter().map(|c| c.name.as_str()).collect();
                    format!("Assistant: (used {})", names.join(", "))
                }
                Role::Assistant => format!("Assistant: {}", turn.content),
                Role::Tool => format!("Tool result: {}", turn.content),
            };
            prompt.push_str(&line);
            prompt.push('\n');
        }

        prompt.push_str("Assistant:");
        prompt
    }

    fn models_url(&self) -> String {
        let root = self
            .config
            .url
            .trim_end_matches('/')
            .trim_end_matches("/completions");
        format!("{root}/models")
    }
}

#[async_trait]
impl LlmProvider for VllmProvider {
    fn info(&self) -> ProviderInfo {
        ProviderInfo {
            name: "vllm".into(),
            supports_streaming: false,
            supports_tools: false,
        }
    }

    async fn health_check(&self) -> Result<bool> {
        match self.client.get(self.models_url()).send().await {
            Ok(response) => Ok(response.status().is_success()),
            Err(e) => {
                tracing::warn!("vLLM health check failed: {}", e);
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
        if !tools.is_empty() {
            tracing::debug!(tools = tools.len(), "vLLM completions ignore tool declarations");
        }

        let stop = if options.stop_sequences.is_empty() {
            vec![TRANSCRIPT_STOP.to_owned()]
        } else {
            options.stop_sequences.clone()
        };

        let body = CompletionRequest {
            model: &self.config.model,
            prompt: Self::render_prompt(turns),
            max_tokens: options.max_tokens.unwrap_or(self.config.default_max_tokens),
            temperature: options.temperature,
            stop,
        };

        tracing::debug!(model = %body.model, url = %self.config.url, "Sending completion request");

        let response = self
            .client
            .post(&self.config.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(&e))?;

        let completion: CompletionResponse = read_json(check_status(response).await?).await?;
        let text = completion
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.text)
            .ok_or_else(|| AgentError::ModelProtocol("completion has no choices".into()))?;

        Ok(ModelResponse::FinalAnswer(text.trim().to_owned()))
    }
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    prompt: String,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    stop: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    #[serde(default)]
    text: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_core::tool::{ToolCall, ToolResult};

    #[test]
    fn test_config_defaults() {
        let config = VllmConfig::default();
        assert_eq!(config.url, "http://localhost:8000/v1/completions");
        assert_eq!(config.model, "meta-llama/Llama-2-7b-hf");
        assert_eq!(config.default_max_tokens, 128);
    }

    #[test]
    fn test_prompt_rendering() {
        let call = ToolCall::new("c1", "calculator", agent_core::tool::Arguments::new());
        let result = ToolResult::success(&call, "The sum of 2 and 3 is 5");
        let turns = vec![
            Turn::system("Be brief."),
            Turn::user("What is 2 + 3?"),
            Turn::tool_request("", vec![call]),
            Turn::tool_result(&result),
        ];

        assert_eq!(
            VllmProvider::render_prompt(&turns),
            "System: Be brief.\n\
             User: What is 2 + 3?\n\
             Assistant: (used calculator)\n\
             Tool result: The sum of 2 and 3 is 5\n\
             Assistant:"
        );
    }

    #[test]
    fn test_models_url() {
        let provider = VllmProvider::from_config(VllmConfig::default()).unwrap();
        assert_eq!(provider.models_url(), "http://localhost:8000/v1/models");
        assert!(!provider.info().supports_tools);
    }
}
