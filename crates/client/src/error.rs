//! Client error types.

use chatsync_shared::{ApiError, EntityKind};
use thiserror::Error;

/// Errors from cache and sync operations.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The entity is neither cached nor fetchable.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Kind of the missing entity.
        kind: EntityKind,
        /// Identifier that was looked up.
        id: String,
    },

    /// A request was attempted before a session was established.
    #[error("not authenticated")]
    Unauthenticated,

    /// An event or record is missing fields required for its kind.
    #[error("malformed {} payload: {reason}", .kind.map_or("event", |k| k.as_str()))]
    MalformedPayload {
        /// Kind of the record, when known.
        kind: Option<EntityKind>,
        /// Description of the decoding failure.
        reason: String,
    },

    /// The event channel failed or was closed.
    #[error("transport error: {reason}")]
    Transport {
        /// Description of the transport failure.
        reason: String,
    },

    /// The REST collaborator failed.
    #[error("api error: {0}")]
    Api(ApiError),
}

impl ClientError {
    pub(crate) fn malformed(kind: EntityKind, err: impl std::fmt::Display) -> Self {
        Self::MalformedPayload {
            kind: Some(kind),
            reason: err.to_string(),
        }
    }

    pub(crate) fn transport(reason: impl Into<String>) -> Self {
        Self::Transport {
            reason: reason.into(),
        }
    }

    /// Returns true if this error is fatal to the event stream.
    ///
    /// A malformed event is dropped and the stream continues; only loss of
    /// the transport is surfaced for the reconnection policy to handle.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Transport { .. } => true,

            Self::NotFound { .. }
            | Self::Unauthenticated
            | Self::MalformedPayload { .. }
            | Self::Api(_) => false,
        }
    }
}

impl From<ApiError> for ClientError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Unauthenticated | ApiError::Http { status: 401, .. } => Self::Unauthenticated,
            other => Self::Api(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_payload_is_transient() {
        let err = ClientError::malformed(EntityKind::User, "missing field `_id`");
        assert!(!err.is_fatal());
        assert_eq!(
            err.to_string(),
            "malformed user payload: missing field `_id`"
        );
    }

    #[test]
    fn transport_is_fatal() {
        assert!(ClientError::transport("connection reset").is_fatal());
    }

    #[test]
    fn unauthorized_maps_to_unauthenticated() {
        let err = ClientError::from(ApiError::Http {
            status: 401,
            body: String::new(),
        });
        assert!(matches!(err, ClientError::Unauthenticated));

        let err = ClientError::from(ApiError::Unauthenticated);
        assert!(matches!(err, ClientError::Unauthenticated));
    }

    #[test]
    fn other_api_errors_are_wrapped() {
        let err = ClientError::from(ApiError::Network("refused".into()));
        assert!(matches!(err, ClientError::Api(ApiError::Network(_))));
        assert_eq!(err.to_string(), "api error: network error: refused");
    }

    #[test]
    fn not_found_display() {
        let err = ClientError::NotFound {
            kind: EntityKind::Server,
            id: "S1".into(),
        };
        assert_eq!(err.to_string(), "server not found: S1");
    }
}
