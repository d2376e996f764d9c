//! CodeAtEase API Module
//!
//! The API module provides the HTTP endpoints used by the browser editor:
//! OAuth login, repository browsing and file mutation, and chat.

pub mod auth;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod models;
pub mod server;

pub use error::{ApiError, ApiResult};
pub use handlers::ApiState;
pub use models::*;
pub use server::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_api_config_creation() {
        let config = ApiConfig {
            host: "127.0.0.1".to_string(),
            port: 8080,
            ..ApiConfig::default()
        };

        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 8080);
        assert_eq!(config.base_url, LOCAL_BASE_URL);
    }
}
