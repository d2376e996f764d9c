//! API Handlers Module
//!
//! Request handlers. Each authenticated handler resolves the caller through
//! [`CurrentUser`] and addresses the provider with the caller's remote token.

use axum::{
    debug_handler,
    extract::{Path, State},
    http::{header::HOST, HeaderMap},
    response::{Json, Redirect},
};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info};

use codeatease_core::{
    ChatReply, ChatRequest, ChatService, FileDeletion, FileUpdate, NewFile, OAuthProvider,
    PushRequest, RemoteFile, RenameRequest, RepoContext, RepositorySummary, RepositoryTree,
    SessionStore, SyncEngine, SyncError, UserProfile,
};

use crate::auth::{bearer_token, CurrentUser};
use crate::error::ApiResult;
use crate::extract::{ApiJson, ApiQuery};
use crate::models::{
    ApiConfig, CallbackQuery, ClientConfigResponse, CreateFileRequest, DeleteFileRequest,
    DeleteResponse, FileQuery, HealthResponse, HistoryResponse, MessageResponse,
    PushChangesRequest, PushResponse, RenameFileRequest, RenameResponse, UpdateFileRequest,
    WriteResponse, LOCAL_BASE_URL,
};

/// Represents the state of the API server
pub struct ApiState {
    /// Repository operations against the provider
    pub engine: SyncEngine,
    /// Opaque credential to session mapping
    pub sessions: Arc<dyn SessionStore>,
    /// Chat relay and per-user history
    pub chat: ChatService,
    /// Provider login flow
    pub oauth: Arc<dyn OAuthProvider>,
    pub config: ApiConfig,
}

/// Public URL of this service as seen by the browser
pub fn resolve_base_url(config: &ApiConfig, headers: &HeaderMap) -> String {
    if config.base_url != LOCAL_BASE_URL {
        return config.base_url.trim_end_matches('/').to_string();
    }
    let host = headers.get(HOST).and_then(|h| h.to_str().ok());
    let scheme = headers
        .get("x-forwarded-proto")
        .and_then(|h| h.to_str().ok())
        .unwrap_or("http");
    match host {
        Some(host) => format!("{}://{}", scheme, host),
        None => config.base_url.clone(),
    }
}

fn callback_url(base_url: &str) -> String {
    format!("{}/auth/github/callback", base_url)
}

fn repo_context(user: &CurrentUser, owner: String, repo: String) -> RepoContext {
    RepoContext::new(owner, repo, user.session.remote_token.clone())
}

/// Health check endpoint
#[debug_handler]
pub async fn health_check(State(state): State<Arc<ApiState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        timestamp: Utc::now().to_rfc3339(),
        ai_available: state.chat.model_available(),
        version: state.config.version.clone(),
    })
}

/// Client configuration for the editor pages
#[debug_handler]
pub async fn client_config(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
) -> Json<ClientConfigResponse> {
    let base_url = resolve_base_url(&state.config, &headers);
    let environment = if base_url.contains("localhost") || base_url.contains("127.0.0.1") {
        "development"
    } else {
        "production"
    };
    Json(ClientConfigResponse {
        base_url,
        environment,
    })
}

/// Redirect the browser to the provider's consent page
#[debug_handler]
pub async fn github_login(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
) -> ApiResult<Redirect> {
    let base_url = resolve_base_url(&state.config, &headers);
    let url = state.oauth.authorize_url(&callback_url(&base_url))?;
    Ok(Redirect::to(&url))
}

/// Finish the login: exchange the code, create a session, hand the token to the editor
#[debug_handler]
pub async fn github_callback(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    ApiQuery(query): ApiQuery<CallbackQuery>,
) -> ApiResult<Redirect> {
    let code = query
        .code
        .filter(|c| !c.is_empty())
        .ok_or_else(|| SyncError::InvalidRequest("no code provided".to_string()))?;

    let base_url = resolve_base_url(&state.config, &headers);
    let remote_token = state
        .oauth
        .exchange_code(&code, &callback_url(&base_url))
        .await?;
    let profile = state.oauth.fetch_profile(&remote_token).await?;
    let issued = state.sessions.create(profile, remote_token).await?;

    Ok(Redirect::to(&format!(
        "{}/repo.html?access_token={}",
        base_url, issued.token
    )))
}

/// Profile of the caller
#[debug_handler(state = Arc<ApiState>)]
pub async fn current_user(user: CurrentUser) -> Json<UserProfile> {
    Json(user.session.profile())
}

/// Destroy the caller's session and forget their chat history
#[debug_handler]
pub async fn logout(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
) -> ApiResult<Json<MessageResponse>> {
    let token = bearer_token(&headers)?;
    if let Some(subject) = state.sessions.destroy(&token).await {
        state.chat.history().clear(&subject);
    }
    Ok(Json(MessageResponse::new("Logged out successfully")))
}

/// Repositories visible to the caller
#[debug_handler]
pub async fn list_repositories(
    State(state): State<Arc<ApiState>>,
    user: CurrentUser,
) -> ApiResult<Json<Vec<RepositorySummary>>> {
    let repos = state
        .engine
        .gateway()
        .list_repositories(&user.session.remote_token)
        .await?;
    Ok(Json(repos))
}

/// Hierarchical listing of a repository's default branch
#[debug_handler]
pub async fn repository_tree(
    State(state): State<Arc<ApiState>>,
    user: CurrentUser,
    Path((owner, repo)): Path<(String, String)>,
) -> ApiResult<Json<RepositoryTree>> {
    let ctx = repo_context(&user, owner, repo);
    let tree = state.engine.gateway().repository_tree(&ctx).await?;
    Ok(Json(tree))
}

/// Read one file
#[debug_handler]
pub async fn get_file(
    State(state): State<Arc<ApiState>>,
    user: CurrentUser,
    Path((owner, repo)): Path<(String, String)>,
    ApiQuery(query): ApiQuery<FileQuery>,
) -> ApiResult<Json<RemoteFile>> {
    let ctx = repo_context(&user, owner, repo);
    let file = state.engine.gateway().fetch(&ctx, &query.path).await?;
    Ok(Json(file))
}

/// Replace a file's content
#[debug_handler]
pub async fn update_file(
    State(state): State<Arc<ApiState>>,
    user: CurrentUser,
    ApiJson(request): ApiJson<UpdateFileRequest>,
) -> ApiResult<Json<WriteResponse>> {
    let ctx = repo_context(&user, request.owner, request.repo);
    let receipt = state
        .engine
        .gateway()
        .update(
            &ctx,
            &FileUpdate {
                path: request.path,
                content: request.content,
                message: request.message,
                prior_sha: request.sha,
                branch: request.branch,
            },
        )
        .await?;

    Ok(Json(WriteResponse {
        message: "File updated successfully",
        path: receipt.path,
        sha: receipt.sha,
        commit: receipt.commit,
    }))
}

/// Create a new file
#[debug_handler]
pub async fn create_file(
    State(state): State<Arc<ApiState>>,
    user: CurrentUser,
    ApiJson(request): ApiJson<CreateFileRequest>,
) -> ApiResult<Json<WriteResponse>> {
    let ctx = repo_context(&user, request.owner, request.repo);
    let receipt = state
        .engine
        .gateway()
        .create(
            &ctx,
            &NewFile {
                path: request.path,
                content: request.content,
                message: request.message,
                branch: request.branch,
            },
        )
        .await?;

    Ok(Json(WriteResponse {
        message: "File created successfully",
        path: receipt.path,
        sha: receipt.sha,
        commit: receipt.commit,
    }))
}

/// Delete a file
#[debug_handler]
pub async fn delete_file(
    State(state): State<Arc<ApiState>>,
    user: CurrentUser,
    ApiJson(request): ApiJson<DeleteFileRequest>,
) -> ApiResult<Json<DeleteResponse>> {
    let ctx = repo_context(&user, request.owner, request.repo);
    let receipt = state
        .engine
        .gateway()
        .delete(
            &ctx,
            &FileDeletion {
                path: request.path,
                message: request.message,
                prior_sha: request.sha,
                branch: request.branch,
            },
        )
        .await?;

    Ok(Json(DeleteResponse {
        message: "File deleted successfully",
        path: receipt.path,
        commit: receipt.commit,
    }))
}

/// Rename a file (fetch, create, delete)
#[debug_handler]
pub async fn rename_file(
    State(state): State<Arc<ApiState>>,
    user: CurrentUser,
    ApiJson(request): ApiJson<RenameFileRequest>,
) -> ApiResult<Json<RenameResponse>> {
    let ctx = repo_context(&user, request.owner, request.repo);
    let receipt = state
        .engine
        .rename(
            &ctx,
            &RenameRequest {
                old_path: request.old_path,
                new_path: request.new_path,
                message: request.message,
                prior_sha: request.sha,
                branch: request.branch,
            },
        )
        .await?;
    Ok(Json(receipt.into()))
}

/// Apply several updates in order
#[debug_handler]
pub async fn push_changes(
    State(state): State<Arc<ApiState>>,
    user: CurrentUser,
    ApiJson(request): ApiJson<PushChangesRequest>,
) -> ApiResult<Json<PushResponse>> {
    if request.changes.is_empty() {
        return Err(SyncError::InvalidRequest("no changes to push".to_string()).into());
    }
    let ctx = repo_context(&user, request.owner, request.repo);
    debug!(files = request.changes.len(), "Pushing changes");

    let report = state
        .engine
        .push(
            &ctx,
            &PushRequest {
                files: request.changes,
                message: request.commit_message,
                branch: request.branch,
            },
        )
        .await;
    Ok(Json(report.into()))
}

/// One chat turn; degrades to a templated answer instead of failing
#[debug_handler]
pub async fn chat(
    State(state): State<Arc<ApiState>>,
    user: CurrentUser,
    ApiJson(request): ApiJson<ChatRequest>,
) -> ApiResult<Json<ChatReply>> {
    let reply = state.chat.reply(&user.session.subject_id, &request).await?;
    if reply.fallback {
        info!(subject = %user.session.subject_id, "Chat answered from template");
    }
    Ok(Json(reply))
}

#[debug_handler]
pub async fn chat_history(
    State(state): State<Arc<ApiState>>,
    user: CurrentUser,
) -> Json<HistoryResponse> {
    Json(HistoryResponse {
        history: state.chat.history().get(&user.session.subject_id),
    })
}

#[debug_handler]
pub async fn clear_chat_history(
    State(state): State<Arc<ApiState>>,
    user: CurrentUser,
) -> Json<MessageResponse> {
    state.chat.history().clear(&user.session.subject_id);
    Json(MessageResponse::new("Chat history cleared"))
}
