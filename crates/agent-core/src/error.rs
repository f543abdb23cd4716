//! Error Types

use thiserror::Error;

/// Result type alias for agent operations
pub type Result<T> = std::result::Result<T, AgentError>;

/// A single argument that failed schema validation
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InvalidArgument {
    /// Parameter name as declared by the tool
    pub parameter: String,

    /// What is wrong with it
    pub reason: String,
}

impl std::fmt::Display for InvalidArgument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "`{}` {}", self.parameter, self.reason)
    }
}

fn describe_issues(issues: &[InvalidArgument]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Agent error types
#[derive(Error, Debug)]
pub enum AgentError {
    /// A tool with this name is already registered
    #[error("Tool already registered: {0}")]
    DuplicateTool(String),

    /// Tool not found in registry
    #[error("Tool not found: {0}")]
    UnknownTool(String),

    /// Supplied arguments do not match the declared schema
    #[error("Invalid arguments for tool '{tool}': {}", describe_issues(.issues))]
    InvalidArguments {
        tool: String,
        issues: Vec<InvalidArgument>,
    },

    /// Tool handler failed
    #[error("Tool execution error: {0}")]
    ToolExecution(String),

    /// Transport failure talking to the model; may be transient
    #[error("Model unavailable: {0}")]
    ModelUnavailable(String),

    /// Rate limited by the model provider
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Malformed or unexpected response from the model
    #[error("Model protocol error: {0}")]
    ModelProtocol(String),

    /// Authentication failed
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Maximum query rounds reached for a single utterance
    #[error("Maximum iterations ({0}) reached")]
    MaxIterations(usize),

    /// The session has been closed
    #[error("Session closed")]
    SessionClosed,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Other/unknown error
    #[error("{0}")]
    Other(String),
}

impl AgentError {
    /// Check if error is retryable
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ModelUnavailable(_) | Self::RateLimited(_) | Self::Io(_)
        )
    }

    /// Whether the error ends the session it happened in.
    ///
    /// Once the model has answered with something we could not interpret, the
    /// conversation can no longer be trusted, so protocol errors are fatal.
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ModelProtocol(_) | Self::Auth(_) | Self::SessionClosed
        )
    }

    /// Convert to a user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            Self::DuplicateTool(name) => format!("The tool '{name}' is registered twice."),
            Self::UnknownTool(name) => format!("The tool '{name}' is not available."),
            Self::InvalidArguments { issues, .. } => {
                format!("Invalid tool input: {}", describe_issues(issues))
            }
            Self::ToolExecution(msg) => format!("Tool error: {msg}"),
            Self::ModelUnavailable(_) => {
                "The AI service is currently unavailable. Please try again.".into()
            }
            Self::RateLimited(_) => "You've made too many requests. Please wait a moment.".into(),
            Self::ModelProtocol(_) => {
                "The AI service returned a response that could not be understood. Ending the session."
                    .into()
            }
            Self::Auth(_) => "Authentication failed. Please check your credentials.".into(),
            Self::MaxIterations(_) => {
                "The request took too long to process. Please try a simpler query.".into()
            }
            Self::SessionClosed => "The session has ended.".into(),
            Self::Config(msg) => format!("Configuration problem: {msg}"),
            Self::Io(_) | Self::Other(_) => "An unexpected error occurred.".into(),
        }
    }
}

impl From<anyhow::Error> for AgentError {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(AgentError::ModelUnavailable("timeout".into()).is_retryable());
        assert!(!AgentError::ModelUnavailable("timeout".into()).is_fatal());
        assert!(AgentError::ModelProtocol("bad json".into()).is_fatal());
        assert!(!AgentError::ModelProtocol("bad json".into()).is_retryable());
        assert!(!AgentError::UnknownTool("x".into()).is_fatal());
        assert!(!AgentError::MaxIterations(3).is_fatal());
    }

    #[test]
    fn test_invalid_arguments_lists_every_parameter() {
        let err = AgentError::InvalidArguments {
            tool: "calculator".into(),
            issues: vec![
                InvalidArgument {
                    parameter: "a".into(),
                    reason: "is required".into(),
                },
                InvalidArgument {
                    parameter: "b".into(),
                    reason: "expected number, got string".into(),
                },
            ],
        };

        assert_eq!(
            err.to_string(),
            "Invalid arguments for tool 'calculator': `a` is required; `b` expected number, got string"
        );
    }
}
