//! Shared error types for the REST collaborator.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error body returned by the API, e.g. `{"type":"NotFound"}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorBody {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Attempt to parse an API error body into a user-facing message.
/// Prefers `detail`, falls back to `type`.
pub fn try_error_detail(body: &str) -> Option<String> {
    let parsed = serde_json::from_str::<ErrorBody>(body).ok()?;
    if let Some(detail) = parsed.detail {
        if !detail.trim().is_empty() {
            return Some(detail);
        }
    }
    if !parsed.kind.trim().is_empty() {
        return Some(parsed.kind);
    }
    None
}

/// API error type for client-side use.
///
/// `Clone` so a single in-flight request can hand its result to every waiter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("network error: {0}")]
    Network(String),
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("deserialization error: {0}")]
    Deserialize(String),
    #[error("no session token")]
    Unauthenticated,
}

impl ApiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detail_preferred_over_type() {
        let body = r#"{"type":"InvalidSession","detail":"session expired"}"#;
        assert_eq!(try_error_detail(body).as_deref(), Some("session expired"));
    }

    #[test]
    fn type_used_when_detail_missing() {
        assert_eq!(
            try_error_detail(r#"{"type":"NotFound"}"#).as_deref(),
            Some("NotFound")
        );
        assert_eq!(try_error_detail("not json"), None);
    }

    #[test]
    fn http_error_display() {
        let err = ApiError::Http {
            status: 404,
            body: "missing".into(),
        };
        assert_eq!(err.to_string(), "HTTP 404: missing");
        assert_eq!(err.status(), Some(404));
    }
}
