//! API Server Module
//!
//! Router construction and the listener loop.

use anyhow::Result;
use axum::{
    routing::{get, post, put},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::handlers::{
    chat, chat_history, clear_chat_history, client_config, create_file, current_user,
    delete_file, get_file, github_callback, github_login, health_check, list_repositories,
    logout, push_changes, rename_file, repository_tree, update_file, ApiState,
};

/// Build the application router over shared state
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        // Auth
        .route("/auth/github", get(github_login))
        .route("/auth/github/callback", get(github_callback))
        .route("/auth/user", get(current_user))
        .route("/auth/logout", post(logout))
        // Repositories
        .route("/api/repositories", get(list_repositories))
        .route("/api/repository/tree/:owner/:repo", get(repository_tree))
        .route("/api/repository/file/:owner/:repo", get(get_file))
        .route("/api/repository/file/update", put(update_file))
        .route("/api/repository/file/create", post(create_file))
        .route(
            "/api/repository/file/delete",
            axum::routing::delete(delete_file),
        )
        .route("/api/repository/file/rename", put(rename_file))
        .route("/api/repository/push", post(push_changes))
        // Chat
        .route("/api/chat", post(chat))
        .route(
            "/api/chat/history",
            get(chat_history).delete(clear_chat_history),
        )
        // Misc
        .route("/api/config", get(client_config))
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Main API server
pub struct ApiServer {
    /// Shared state
    state: Arc<ApiState>,
}

impl ApiServer {
    /// Create a new API server
    pub fn new(state: ApiState) -> Self {
        Self {
            state: Arc::new(state),
        }
    }

    /// Start the API server
    pub async fn start(&self) -> Result<()> {
        let config = &self.state.config;
        let addr: SocketAddr = format!("{}:{}", config.host, config.port)
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid listen address {}:{}: {}", config.host, config.port, e))?;

        let app = router(self.state.clone());

        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!(
            "CodeAtEase API server v{} listening on {}",
            config.version, addr
        );
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| anyhow::anyhow!("Failed to start API server: {}", e))?;

        info!("CodeAtEase API server stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutdown signal received");
    }
}
