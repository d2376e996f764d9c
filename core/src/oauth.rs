//! OAuth collaborator
//!
//! The web-flow exchange with the provider: build the authorize redirect,
//! trade the callback code for an access token, then read the user profile
//! that seeds a session.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{Result, SyncError};
use crate::gateway::NO_RESPONSE_STATUS;
use crate::session::{RemoteToken, SubjectProfile};
use crate::transport::TransportError;

/// Scopes requested at login
pub const OAUTH_SCOPES: &str = "repo,user";

#[async_trait]
pub trait OAuthProvider: Send + Sync {
    /// Provider URL the browser is redirected to
    fn authorize_url(&self, redirect_uri: &str) -> Result<String>;

    /// Exchange the callback code for an access token
    async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<RemoteToken>;

    /// Profile of the token's owner
    async fn fetch_profile(&self, token: &RemoteToken) -> Result<SubjectProfile>;
}

#[derive(Debug, Clone)]
pub struct GithubOAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    /// e.g. `https://github.com`
    pub oauth_base: String,
    /// e.g. `https://api.github.com`
    pub api_base: String,
    pub timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct TokenPayload {
    access_token: Option<String>,
    error_description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UserPayload {
    id: serde_json::Value,
    login: String,
    name: Option<String>,
    email: Option<String>,
}

fn upstream(err: reqwest::Error) -> SyncError {
    match TransportError::from(err) {
        TransportError::Timeout(msg) => SyncError::UpstreamTimeout(msg),
        TransportError::Network(message) => SyncError::UpstreamUnavailable {
            status: NO_RESPONSE_STATUS,
            message,
        },
    }
}

/// GitHub web-flow OAuth over reqwest
#[derive(Debug, Clone)]
pub struct GithubOAuth {
    client: reqwest::Client,
    config: GithubOAuthConfig,
}

impl GithubOAuth {
    pub fn new(config: GithubOAuthConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent("CodeAtEase")
            .build()
            .map_err(|e| SyncError::Internal(format!("HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }

    fn oauth_url(&self, path: &str) -> String {
        format!("{}{}", self.config.oauth_base.trim_end_matches('/'), path)
    }
}

#[async_trait]
impl OAuthProvider for GithubOAuth {
    fn authorize_url(&self, redirect_uri: &str) -> Result<String> {
        let url = reqwest::Url::parse_with_params(
            &self.oauth_url("/login/oauth/authorize"),
            &[
                ("client_id", self.config.client_id.as_str()),
                ("redirect_uri", redirect_uri),
                ("scope", OAUTH_SCOPES),
            ],
        )
        .map_err(|e| SyncError::Internal(format!("invalid OAuth base URL: {}", e)))?;
        Ok(url.to_string())
    }

    async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<RemoteToken> {
        if code.is_empty() {
            return Err(SyncError::InvalidRequest("no code provided".to_string()));
        }
        debug!("Exchanging OAuth code");

        let response = self
            .client
            .post(self.oauth_url("/login/oauth/access_token"))
            .header("Accept", "application/json")
            .form(&[
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("code", code),
                ("redirect_uri", redirect_uri),
            ])
            .send()
            .await
            .map_err(upstream)?;

        let status = response.status().as_u16();
        let payload: TokenPayload = response.json().await.map_err(upstream)?;
        match payload.access_token {
            Some(token) if !token.is_empty() => Ok(RemoteToken::new(token)),
            _ if status >= 500 => Err(SyncError::UpstreamUnavailable {
                status,
                message: "token exchange failed".to_string(),
            }),
            _ => Err(SyncError::Unauthenticated(
                payload
                    .error_description
                    .unwrap_or_else(|| "failed to get access token".to_string()),
            )),
        }
    }

    async fn fetch_profile(&self, token: &RemoteToken) -> Result<SubjectProfile> {
        let response = self
            .client
            .get(format!("{}/user", self.config.api_base.trim_end_matches('/')))
            .header("Authorization", format!("token {}", token.secret()))
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(upstream)?;

        let status = response.status().as_u16();
        match status {
            200 => {}
            401 | 403 => {
                return Err(SyncError::Unauthenticated(
                    "provider rejected the access token".to_string(),
                ))
            }
            _ => {
                return Err(SyncError::UpstreamUnavailable {
                    status,
                    message: "could not read user profile".to_string(),
                })
            }
        }

        let user: UserPayload = response.json().await.map_err(upstream)?;
        let subject_id = match user.id {
            serde_json::Value::String(id) => id,
            other => other.to_string(),
        };
        info!(subject = %subject_id, handle = %user.login, "OAuth login");

        Ok(SubjectProfile {
            subject_id,
            handle: user.login,
            display_name: user.name,
            email: user.email,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> GithubOAuth {
        GithubOAuth::new(GithubOAuthConfig {
            client_id: "client123".into(),
            client_secret: "secret".into(),
            oauth_base: "https://github.com/".into(),
            api_base: "https://api.github.com".into(),
            timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    #[test]
    fn test_authorize_url_encodes_redirect() {
        let url = provider()
            .authorize_url("http://localhost:8000/auth/github/callback")
            .unwrap();
        assert!(url.starts_with("https://github.com/login/oauth/authorize?"));
        assert!(url.contains("client_id=client123"));
        assert!(url.contains("redirect_uri=http%3A%2F%2Flocalhost%3A8000%2Fauth%2Fgithub%2Fcallback"));
        assert!(url.contains("scope=repo%2Cuser"));
    }

    #[tokio::test]
    async fn test_empty_code_rejected_without_network() {
        let err = provider().exchange_code("", "http://x").await.unwrap_err();
        assert!(matches!(err, SyncError::InvalidRequest(_)));
    }
}
