//! Builds the server state from settings

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use codeatease_api::{ApiConfig, ApiState};
use codeatease_core::chat::ReqwestCompletionTransport;
use codeatease_core::{
    ChatHistoryStore, ChatService, GithubOAuth, GithubOAuthConfig, LanguageModel,
    MemorySessionStore, ReqwestTransport, RouterChatModel, Settings, SyncEngine,
};

use crate::cli::Result;

/// Chat model for the configured router, `None` without an API token
pub fn language_model(settings: &Settings) -> Result<Option<Arc<dyn LanguageModel>>> {
    let Some(token) = settings.llm_token() else {
        warn!("llm.api_token is not set; chat will answer from templates");
        return Ok(None);
    };

    let transport = ReqwestCompletionTransport::new(
        &settings.llm.base_url,
        token,
        Duration::from_secs(settings.llm.timeout_secs),
    )?;
    let model = RouterChatModel::new(Arc::new(transport), settings.llm.model.as_str())
        .with_max_tokens(settings.llm.max_tokens)
        .with_cold_start_delay(Duration::from_secs(settings.llm.cold_start_delay_secs));
    info!(model = %settings.llm.model, "Chat model configured");
    Ok(Some(Arc::new(model)))
}

pub fn api_config(settings: &Settings) -> ApiConfig {
    ApiConfig {
        host: settings.server.host.clone(),
        port: settings.server.port,
        base_url: settings.server.base_url.clone(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    }
}

/// Wire the engine, session store, chat service and OAuth provider
pub fn build_state(settings: &Settings) -> Result<ApiState> {
    let transport =
        ReqwestTransport::with_timeout(&settings.github.api_base, settings.github.timeout())?;
    let sessions = MemorySessionStore::with_ttl(
        &settings.session.secret,
        chrono::Duration::minutes(settings.session.ttl_minutes),
    );
    let oauth = GithubOAuth::new(GithubOAuthConfig {
        client_id: settings.github.client_id.clone(),
        client_secret: settings.github.client_secret.clone(),
        oauth_base: settings.github.oauth_base.clone(),
        api_base: settings.github.api_base.clone(),
        timeout: settings.github.timeout(),
    })?;
    let chat = ChatService::new(language_model(settings)?, Arc::new(ChatHistoryStore::new()));

    Ok(ApiState {
        engine: SyncEngine::new(Arc::new(transport)),
        sessions: Arc::new(sessions),
        chat,
        oauth: Arc::new(oauth),
        config: api_config(settings),
    })
}

/// One-screen summary of effective settings, secrets omitted
pub fn summary(settings: &Settings) -> String {
    format!(
        "listen:        {}:{}\n\
         base url:      {}\n\
         github api:    {}\n\
         oauth client:  {}\n\
         session ttl:   {} min\n\
         chat model:    {} ({})",
        settings.server.host,
        settings.server.port,
        settings.server.base_url,
        settings.github.api_base,
        if settings.github.client_id.is_empty() {
            "<unset>"
        } else {
            settings.github.client_id.as_str()
        },
        settings.session.ttl_minutes,
        settings.llm.model,
        if settings.llm_token().is_some() {
            "enabled"
        } else {
            "fallback only"
        },
    )
}
