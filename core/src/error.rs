//! Error taxonomy shared by the gateway, the sagas and the session store.
//!
//! Every failure a caller can observe is one of these variants. Gateway code
//! produces them from HTTP statuses; coordinators wrap step failures into
//! [`SyncError::PartialRename`] or report [`SyncError::PartialBatchFailure`].

use serde::Serialize;

/// Synchronization layer error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    /// Missing, malformed or revoked credential
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    /// Well-formed credential whose expiry claim has passed
    #[error("session expired")]
    Expired,

    /// Remote path or repository absent
    #[error("not found: {0}")]
    NotFound(String),

    /// Stale or missing prior content hash on a mutation
    #[error("conflict: {0}")]
    Conflict(String),

    /// Outbound call exceeded its timeout
    #[error("upstream timeout: {0}")]
    UpstreamTimeout(String),

    /// Non-2xx from an upstream service
    #[error("upstream unavailable ({status}): {message}")]
    UpstreamUnavailable { status: u16, message: String },

    /// One or more batch entries failed; the batch itself completed
    #[error("{failed} of {total} batch entries failed")]
    PartialBatchFailure { failed: usize, total: usize },

    /// Rename created the new path but could not delete the old one
    #[error("partial rename: {new_path} created but {old_path} was not deleted ({reason})")]
    PartialRename {
        old_path: String,
        new_path: String,
        new_sha: String,
        reason: String,
    },

    /// Request rejected before any remote call was made
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Unexpected local failure (serialization, malformed upstream payload)
    #[error("internal error: {0}")]
    Internal(String),
}

/// Stable machine-readable error code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Unauthenticated,
    Expired,
    NotFound,
    Conflict,
    UpstreamTimeout,
    UpstreamUnavailable,
    PartialBatchFailure,
    PartialRename,
    InvalidRequest,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Unauthenticated => "unauthenticated",
            ErrorKind::Expired => "expired",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::UpstreamTimeout => "upstream_timeout",
            ErrorKind::UpstreamUnavailable => "upstream_unavailable",
            ErrorKind::PartialBatchFailure => "partial_batch_failure",
            ErrorKind::PartialRename => "partial_rename",
            ErrorKind::InvalidRequest => "invalid_request",
            ErrorKind::Internal => "internal",
        }
    }
}

impl SyncError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::Unauthenticated(_) => ErrorKind::Unauthenticated,
            SyncError::Expired => ErrorKind::Expired,
            SyncError::NotFound(_) => ErrorKind::NotFound,
            SyncError::Conflict(_) => ErrorKind::Conflict,
            SyncError::UpstreamTimeout(_) => ErrorKind::UpstreamTimeout,
            SyncError::UpstreamUnavailable { .. } => ErrorKind::UpstreamUnavailable,
            SyncError::PartialBatchFailure { .. } => ErrorKind::PartialBatchFailure,
            SyncError::PartialRename { .. } => ErrorKind::PartialRename,
            SyncError::InvalidRequest(_) => ErrorKind::InvalidRequest,
            SyncError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// True for failures of the caller's credential (log in again)
    pub fn is_auth(&self) -> bool {
        matches!(self, SyncError::Unauthenticated(_) | SyncError::Expired)
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Internal(format!("JSON error: {}", err))
    }
}

/// Result type for synchronization operations
pub type Result<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_codes_are_snake_case() {
        let err = SyncError::UpstreamUnavailable {
            status: 502,
            message: "bad gateway".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::UpstreamUnavailable);
        assert_eq!(err.kind().as_str(), "upstream_unavailable");
        assert_eq!(
            serde_json::to_string(&ErrorKind::PartialRename).unwrap(),
            "\"partial_rename\""
        );
    }

    #[test]
    fn test_expired_is_distinct_from_unauthenticated() {
        assert_ne!(
            SyncError::Expired.kind(),
            SyncError::Unauthenticated("bad".into()).kind()
        );
        assert!(SyncError::Expired.is_auth());
        assert!(!SyncError::NotFound("x".into()).is_auth());
    }

    #[test]
    fn test_partial_rename_message_names_both_paths() {
        let err = SyncError::PartialRename {
            old_path: "a.txt".into(),
            new_path: "b.txt".into(),
            new_sha: "abc".into(),
            reason: "conflict".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("a.txt"));
        assert!(msg.contains("b.txt"));
    }
}
