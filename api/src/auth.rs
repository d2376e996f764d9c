//! Bearer credential extraction

use async_trait::async_trait;
use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
};
use std::sync::Arc;

use codeatease_core::{Session, SyncError};

use crate::error::ApiError;
use crate::handlers::ApiState;

/// Opaque credential from `Authorization: Bearer <token>`
pub fn bearer_token(headers: &HeaderMap) -> Result<String, SyncError> {
    let value = headers
        .get(AUTHORIZATION)
        .ok_or_else(|| SyncError::Unauthenticated("token missing".to_string()))?
        .to_str()
        .map_err(|_| SyncError::Unauthenticated("malformed authorization header".to_string()))?;

    let (scheme, token) = value
        .split_once(' ')
        .ok_or_else(|| SyncError::Unauthenticated("malformed authorization header".to_string()))?;
    if !scheme.eq_ignore_ascii_case("bearer") || token.trim().is_empty() {
        return Err(SyncError::Unauthenticated(
            "expected a bearer token".to_string(),
        ));
    }
    Ok(token.trim().to_string())
}

/// Resolved session of the caller
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub session: Session,
}

#[async_trait]
impl FromRequestParts<Arc<ApiState>> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<ApiState>,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers)?;
        let session = state.sessions.resolve(&token).await?;
        Ok(Self { session })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_bearer_token_parsing() {
        let mut headers = HeaderMap::new();
        assert!(bearer_token(&headers).is_err());

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(bearer_token(&headers).unwrap(), "abc.def");

        headers.insert(AUTHORIZATION, HeaderValue::from_static("bearer xyz"));
        assert_eq!(bearer_token(&headers).unwrap(), "xyz");

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic dXNlcg=="));
        assert!(bearer_token(&headers).is_err());

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert!(bearer_token(&headers).is_err());
    }
}
