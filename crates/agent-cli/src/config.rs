//! Command line and environment configuration

use std::sync::Arc;

use agent_core::provider::DEFAULT_MODEL;
use agent_core::{AgentConfig, GenerationOptions, LlmProvider, ProviderChain};
use agent_runtime::vllm::DEFAULT_VLLM_MODEL;
use agent_runtime::{OpenAiProvider, VllmConfig, VllmProvider};
use clap::{Parser, ValueEnum};

/// Which backend answers the conversation
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ProviderKind {
    /// OpenAI-compatible chat completions with tool calling
    Openai,
    /// vLLM text completions, no tools
    Vllm,
}

#[derive(Debug, Parser)]
#[command(name = "calc-agent")]
#[command(version, about = "Chat with an AI agent that can use a calculator")]
pub struct Cli {
    /// Language model backend
    #[arg(long, env = "AGENT_PROVIDER", value_enum, default_value_t = ProviderKind::Openai)]
    pub provider: ProviderKind,

    /// Model name (defaults depend on the provider)
    #[arg(long, env = "AGENT_MODEL")]
    pub model: Option<String>,

    /// Sampling temperature
    #[arg(long, env = "AGENT_TEMPERATURE", default_value_t = 0.0)]
    pub temperature: f32,

    /// Maximum tokens per answer
    #[arg(long, env = "AGENT_MAX_TOKENS")]
    pub max_tokens: Option<u32>,

    /// Maximum model queries per question
    #[arg(long, env = "AGENT_MAX_ITERATIONS", default_value_t = 10)]
    pub max_iterations: usize,

    /// System prompt placed before the conversation
    #[arg(long, env = "AGENT_SYSTEM_PROMPT")]
    pub system_prompt: Option<String>,

    /// Print answers only once they are complete
    #[arg(long)]
    pub no_stream: bool,

    /// Fall back to vLLM when the OpenAI endpoint is unavailable
    #[arg(long, env = "AGENT_FALLBACK_VLLM")]
    pub fallback_vllm: bool,

    /// Verbose logging on stderr
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    pub fn model(&self) -> String {
        self.model.clone().unwrap_or_else(|| {
            match self.provider {
                ProviderKind::Openai => DEFAULT_MODEL,
                ProviderKind::Vllm => DEFAULT_VLLM_MODEL,
            }
            .into()
        })
    }

    /// Default log filter when `RUST_LOG` is unset
    pub const fn log_filter(&self) -> &'static str {
        if self.verbose {
            "info,agent_core=debug,agent_runtime=debug"
        } else {
            "warn"
        }
    }

    pub fn agent_config(&self) -> AgentConfig {
        AgentConfig {
            system_prompt: self.system_prompt.clone(),
            max_iterations: self.max_iterations,
            generation: GenerationOptions {
                model: self.model(),
                temperature: self.temperature,
                max_tokens: self.max_tokens,
                stop_sequences: Vec::new(),
            },
            stream: !self.no_stream,
        }
    }

    fn vllm_config(&self) -> VllmConfig {
        let mut config = VllmConfig::from_env();
        if self.provider == ProviderKind::Vllm {
            config.model = self.model();
        }
        config
    }

    pub fn build_provider(&self) -> agent_core::Result<Arc<dyn LlmProvider>> {
        match self.provider {
            ProviderKind::Openai => {
                let openai: Arc<dyn LlmProvider> = Arc::new(OpenAiProvider::from_env()?);
                if !self.fallback_vllm {
                    return Ok(openai);
                }

                let vllm: Arc<dyn LlmProvider> =
                    Arc::new(VllmProvider::from_config(self.vllm_config())?);
                Ok(Arc::new(ProviderChain::new(vec![openai, vllm])?))
            }
            ProviderKind::Vllm => {
                if self.fallback_vllm {
                    tracing::warn!("--fallback-vllm has no effect with --provider vllm");
                }
                Ok(Arc::new(VllmProvider::from_config(self.vllm_config())?))
            }
        }
    }
}
