//! Error-to-response mapping

use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::{error, warn};

use codeatease_core::SyncError;

/// Handler error; wraps the core taxonomy
#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct ApiError(#[from] pub SyncError);

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            SyncError::Unauthenticated(_) | SyncError::Expired => StatusCode::UNAUTHORIZED,
            SyncError::NotFound(_) => StatusCode::NOT_FOUND,
            SyncError::Conflict(_) => StatusCode::CONFLICT,
            SyncError::UpstreamTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            SyncError::UpstreamUnavailable { .. } => StatusCode::BAD_GATEWAY,
            SyncError::PartialRename { .. } | SyncError::PartialBatchFailure { .. } => {
                StatusCode::MULTI_STATUS
            }
            SyncError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            SyncError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(status = status.as_u16(), error = %self.0, "Request failed");
        } else {
            warn!(status = status.as_u16(), error = %self.0, "Request rejected");
        }

        let mut body = json!({
            "error": self.0.kind().as_str(),
            "message": self.0.to_string(),
        });
        if let SyncError::PartialRename {
            old_path,
            new_path,
            new_sha,
            ..
        } = &self.0
        {
            body["oldPath"] = json!(old_path);
            body["newPath"] = json!(new_path);
            body["sha"] = json!(new_sha);
        }

        (status, Json(body)).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError(SyncError::InvalidRequest(rejection.body_text()))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError(SyncError::InvalidRequest(rejection.body_text()))
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (SyncError::Expired, StatusCode::UNAUTHORIZED),
            (SyncError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (SyncError::Conflict("x".into()), StatusCode::CONFLICT),
            (SyncError::UpstreamTimeout("x".into()), StatusCode::GATEWAY_TIMEOUT),
            (
                SyncError::UpstreamUnavailable {
                    status: 500,
                    message: "x".into(),
                },
                StatusCode::BAD_GATEWAY,
            ),
            (SyncError::InvalidRequest("x".into()), StatusCode::BAD_REQUEST),
            (SyncError::Internal("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError(err).status(), status);
        }
    }

    #[test]
    fn test_partial_rename_is_multi_status() {
        let err = ApiError(SyncError::PartialRename {
            old_path: "a".into(),
            new_path: "b".into(),
            new_sha: "s".into(),
            reason: "conflict".into(),
        });
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::MULTI_STATUS);
    }
}
