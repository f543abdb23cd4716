//! # agent-core
//!
//! Tool-augmented conversation loop with a provider-agnostic model abstraction.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       SessionDriver                          │
//! │   stdin lines ──▶ ┌──────────────────────────────┐ ──▶ stdout │
//! │                   │            Agent             │           │
//! │                   │  ┌───────────┐ ┌───────────┐ │           │
//! │                   │  │ Reasoning │ │   Tool    │ │           │
//! │                   │  │   Loop    │─│ Registry  │ │           │
//! │                   │  └─────┬─────┘ └───────────┘ │           │
//! │                   └────────┼─────────────────────┘           │
//! │                            ▼                                 │
//! │                  LlmProvider (Strategy)                      │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The `LlmProvider` trait lets the loop run against any chat backend, or a
//! [`ProviderChain`] of them, without changing agent logic.

pub mod driver;
pub mod error;
pub mod message;
pub mod provider;
pub mod reasoning;
pub mod session;
pub mod tool;

#[cfg(test)]
mod test_support;

pub use driver::{DriverMessages, ExitReason, SessionDriver, SessionOutcome, WriterSink};
pub use error::{AgentError, InvalidArgument, Result};
pub use message::{Conversation, Role, Turn};
pub use provider::{
    GenerationOptions, LlmProvider, ModelResponse, ProviderChain, ProviderInfo, ResponseStream,
    StreamChunk, StreamEvent,
};
pub use reasoning::{Agent, AgentBuilder, AgentConfig, LoopState, NullSink, OutputSink};
pub use session::{Session, SessionId};
pub use tool::{
    Arguments, CalculatorTool, ParamType, ParameterSchema, Tool, ToolCall, ToolDeclaration,
    ToolRegistry, ToolResult,
};
