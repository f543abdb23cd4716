//! HTTP plumbing shared by the providers

use std::time::Duration;

use agent_core::error::AgentError;
use agent_core::tool::Arguments;
use reqwest::{Client, Response, StatusCode};
use serde_json::Value;

pub(crate) fn build_client(timeout_secs: u64) -> Result<Client, AgentError> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| AgentError::Config(format!("failed to create HTTP client: {e}")))
}

/// Transport failures never reached a model, so they are worth retrying
pub(crate) fn transport_error(err: &reqwest::Error) -> AgentError {
    if err.is_timeout() {
        AgentError::ModelUnavailable(format!("request timed out: {err}"))
    } else {
        AgentError::ModelUnavailable(err.to_string())
    }
}

pub(crate) fn status_error(status: StatusCode, body: &str) -> AgentError {
    let detail = if body.is_empty() {
        status.to_string()
    } else {
        format!("{status}: {body}")
    };

    match status.as_u16() {
        429 => AgentError::RateLimited(detail),
        401 | 403 => AgentError::Auth(detail),
        408 | 500.. => AgentError::ModelUnavailable(detail),
        _ => AgentError::ModelProtocol(format!("request rejected ({detail})")),
    }
}

/// Pass successful responses through, classify the rest
pub(crate) async fn check_status(response: Response) -> Result<Response, AgentError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    tracing::warn!(%status, body = %body, "Model endpoint returned an error");
    Err(status_error(status, &body))
}

/// Read the body and decode it, treating undecodable bodies as protocol errors
pub(crate) async fn read_json<T>(response: Response) -> Result<T, AgentError>
where
    T: serde::de::DeserializeOwned,
{
    let body = response.text().await.map_err(|e| transport_error(&e))?;
    serde_json::from_str(&body)
        .map_err(|e| AgentError::ModelProtocol(format!("unexpected response body: {e}")))
}

/// Decode the JSON-encoded argument string of a tool call
pub(crate) fn parse_arguments(tool: &str, raw: &str) -> Result<Arguments, AgentError> {
    if raw.trim().is_empty() {
        return Ok(Arguments::new());
    }

    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(arguments)) => Ok(arguments),
        Ok(other) => Err(AgentError::ModelProtocol(format!(
            "arguments for '{tool}' are not a JSON object: {other}"
        ))),
        Err(e) => Err(AgentError::ModelProtocol(format!(
            "unparseable arguments for '{tool}': {e}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(matches!(
            status_error(StatusCode::TOO_MANY_REQUESTS, ""),
            AgentError::RateLimited(_)
        ));
        assert!(matches!(
            status_error(StatusCode::UNAUTHORIZED, "bad key"),
            AgentError::Auth(_)
        ));
        assert!(matches!(
            status_error(StatusCode::FORBIDDEN, ""),
            AgentError::Auth(_)
        ));
        assert!(matches!(
            status_error(StatusCode::BAD_GATEWAY, ""),
            AgentError::ModelUnavailable(_)
        ));
        assert!(matches!(
            status_error(StatusCode::REQUEST_TIMEOUT, ""),
            AgentError::ModelUnavailable(_)
        ));
        assert!(matches!(
            status_error(StatusCode::BAD_REQUEST, "unknown model"),
            AgentError::ModelProtocol(msg) if msg.contains("unknown model")
        ));
    }

    #[test]
    fn test_parse_arguments() {
        let args = parse_arguments("calculator", r#"{"a": 2, "b": 3}"#).unwrap();
        assert_eq!(args["a"], 2);
        assert_eq!(args["b"], 3);

        assert!(parse_arguments("calculator", "  ").unwrap().is_empty());
        assert!(matches!(
            parse_arguments("calculator", "[1, 2]"),
            Err(AgentError::ModelProtocol(_))
        ));
        assert!(matches!(
            parse_arguments("calculator", r#"{"a": 2"#),
            Err(AgentError::ModelProtocol(_))
        ));
    }
}
