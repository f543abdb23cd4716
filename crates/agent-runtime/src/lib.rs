//! # agent-runtime
//!
//! Concrete language model providers for the agent loop.
//!
//! ## Providers
//!
//! - **OpenAI** (default): any OpenAI-compatible chat completions API, with
//!   native tool calling and streamed answers. Also covers Ollama and vLLM's
//!   OpenAI endpoint.
//! - **vLLM**: plain text completions fallback, answers only.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use agent_runtime::{OpenAiProvider, VllmProvider};
//!
//! let chain = ProviderChain::new(vec![
//!     Arc::new(OpenAiProvider::from_env()?),
//!     Arc::new(VllmProvider::from_env()?),
//! ])?;
//! let agent = AgentBuilder::new()
//!     .provider(Arc::new(chain))
//!     .build()?;
//! ```

mod http;
pub mod openai;
pub mod vllm;

pub use openai::{OpenAiConfig, OpenAiProvider};
pub use vllm::{VllmConfig, VllmProvider};

// Re-export core types for convenience
pub use agent_core::{
    Agent, AgentBuilder, AgentError, LlmProvider, ProviderChain, Result, Role, Session, Tool,
    ToolRegistry, Turn,
};
