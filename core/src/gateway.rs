//! Remote file gateway
//!
//! Single-file operations against the provider's contents API. Each call is
//! one HTTP exchange through a [`ContentTransport`]; this module owns the
//! translation of HTTP statuses into [`SyncError`] variants:
//!
//! | Status | Read | Create | Update / Delete |
//! |--------|------|--------|-----------------|
//! | 401, 403 | Unauthenticated | Unauthenticated | Unauthenticated |
//! | 404 | NotFound | NotFound | NotFound |
//! | 409, 422 | NotFound (empty repository) | Conflict (path exists) | Conflict (stale sha) |
//! | other non-2xx | UpstreamUnavailable | UpstreamUnavailable | UpstreamUnavailable |
//!
//! Transport timeouts become `UpstreamTimeout`.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{Result, SyncError};
use crate::session::RemoteToken;
use crate::transport::{ApiRequest, ApiResponse, ContentTransport, TransportError};
use crate::tree::{build_tree, TreeEntry, TreeNode};

/// Content shown for payloads that are not valid UTF-8 text
pub const BINARY_PLACEHOLDER: &str = "[Binary file - cannot display]";

/// Branch used when a request does not name one
pub const DEFAULT_BRANCH: &str = "main";

/// Page size for the repository listing
pub const REPOS_PER_PAGE: usize = 100;

/// Status reported when no HTTP response was received at all
pub const NO_RESPONSE_STATUS: u16 = 0;

const MAX_ERROR_MESSAGE: usize = 200;

/// Authenticated addressing for one repository
#[derive(Debug, Clone)]
pub struct RepoContext {
    pub owner: String,
    pub repo: String,
    pub token: RemoteToken,
}

impl RepoContext {
    pub fn new(owner: impl Into<String>, repo: impl Into<String>, token: RemoteToken) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
            token,
        }
    }

    fn repo_path(&self) -> String {
        format!("/repos/{}/{}", self.owner, self.repo)
    }

    fn contents_path(&self, path: &str) -> String {
        format!("/repos/{}/{}/contents/{}", self.owner, self.repo, path)
    }

    fn blob_path(&self, sha: &str) -> String {
        format!("/repos/{}/{}/git/blobs/{}", self.owner, self.repo, sha)
    }
}

/// A file read from the remote side
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RemoteFile {
    pub path: String,
    pub name: String,
    /// Decoded text, or [`BINARY_PLACEHOLDER`]
    pub content: String,
    pub sha: String,
    pub size: u64,
    pub binary: bool,
    /// Transport encoding as received, reused verbatim when copying the file
    #[serde(skip)]
    pub(crate) encoded: String,
}

/// Create request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewFile {
    pub path: String,
    pub content: String,
    pub message: String,
    pub branch: String,
}

/// Update request; `prior_sha` must be the hash of the last read or write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileUpdate {
    pub path: String,
    pub content: String,
    pub message: String,
    pub prior_sha: String,
    pub branch: String,
}

/// Delete request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDeletion {
    pub path: String,
    pub message: String,
    pub prior_sha: String,
    pub branch: String,
}

/// Result of a successful create or update
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WriteReceipt {
    pub path: String,
    /// New content hash of the file
    pub sha: String,
    /// Commit that recorded the change
    pub commit: String,
}

/// Result of a successful delete
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeleteReceipt {
    pub path: String,
    pub commit: Option<String>,
}

/// Repository as presented to the editor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositorySummary {
    pub id: u64,
    pub name: String,
    pub full_name: String,
    pub owner: String,
    pub description: Option<String>,
    pub private: bool,
    pub url: String,
    pub clone_url: String,
    pub default_branch: String,
    pub language: Option<String>,
    pub stargazers_count: u64,
    pub forks_count: u64,
    pub updated_at: String,
    pub created_at: String,
    pub size: u64,
}

/// Hierarchical listing of a repository's default branch
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RepositoryTree {
    pub owner: String,
    pub repo: String,
    pub default_branch: String,
    pub tree: Vec<TreeNode>,
    /// Entries left out because their parent was missing from the listing
    pub dropped: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ContentsPayload {
    path: String,
    name: String,
    sha: String,
    #[serde(default)]
    size: u64,
    #[serde(default)]
    content: String,
    /// `base64` for inline content, `none` when the file is too large to inline
    #[serde(default)]
    encoding: Option<String>,
}

impl ContentsPayload {
    fn has_inline_content(&self) -> bool {
        let base64 = self.encoding.as_deref().map_or(true, |e| e == "base64");
        base64 && !(self.content.trim().is_empty() && self.size > 0)
    }
}

#[derive(Debug, Deserialize)]
struct BlobPayload {
    #[serde(default)]
    content: String,
    encoding: String,
    #[serde(default)]
    size: u64,
}

#[derive(Debug, Deserialize)]
struct WritePayload {
    content: Option<WrittenContent>,
    commit: CommitRef,
}

#[derive(Debug, Deserialize)]
struct WrittenContent {
    path: String,
    sha: String,
}

#[derive(Debug, Deserialize)]
struct CommitRef {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct OwnerRef {
    login: String,
}

#[derive(Debug, Deserialize)]
struct RepoPayload {
    id: u64,
    name: String,
    full_name: String,
    owner: OwnerRef,
    description: Option<String>,
    #[serde(default)]
    private: bool,
    html_url: String,
    clone_url: String,
    default_branch: Option<String>,
    language: Option<String>,
    #[serde(default)]
    stargazers_count: u64,
    #[serde(default)]
    forks_count: u64,
    updated_at: String,
    created_at: String,
    #[serde(default)]
    size: u64,
}

impl From<RepoPayload> for RepositorySummary {
    fn from(repo: RepoPayload) -> Self {
        Self {
            id: repo.id,
            name: repo.name,
            full_name: repo.full_name,
            owner: repo.owner.login,
            description: repo.description,
            private: repo.private,
            url: repo.html_url,
            clone_url: repo.clone_url,
            default_branch: repo
                .default_branch
                .unwrap_or_else(|| DEFAULT_BRANCH.to_string()),
            language: repo.language,
            stargazers_count: repo.stargazers_count,
            forks_count: repo.forks_count,
            updated_at: repo.updated_at,
            created_at: repo.created_at,
            size: repo.size,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TreePayload {
    tree: Vec<TreeEntry>,
    #[serde(default)]
    truncated: bool,
}

/// Which operation a response belongs to; decides how 409/422 are read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Read,
    Create,
    Mutate,
}

fn upstream_message(body: &str) -> String {
    let message = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
        .unwrap_or_else(|| body.to_string());
    message.chars().take(MAX_ERROR_MESSAGE).collect()
}

fn classify(op: Op, subject: &str, response: &ApiResponse) -> SyncError {
    match (response.status, op) {
        (401 | 403, _) => {
            SyncError::Unauthenticated("provider rejected the access token".to_string())
        }
        (404, _) | (409, Op::Read) => SyncError::NotFound(subject.to_string()),
        (409 | 422, Op::Create) => SyncError::Conflict(format!("{} already exists", subject)),
        (409 | 422, Op::Mutate) => {
            SyncError::Conflict(format!("content hash for {} is stale or missing", subject))
        }
        (status, _) => SyncError::UpstreamUnavailable {
            status,
            message: upstream_message(&response.body),
        },
    }
}

impl From<TransportError> for SyncError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Timeout(msg) => SyncError::UpstreamTimeout(msg),
            TransportError::Network(message) => SyncError::UpstreamUnavailable {
                status: NO_RESPONSE_STATUS,
                message,
            },
        }
    }
}

fn parse<T: DeserializeOwned>(response: &ApiResponse) -> Result<T> {
    serde_json::from_str(&response.body)
        .map_err(|e| SyncError::Internal(format!("unexpected provider payload: {}", e)))
}

/// Reject paths that cannot address a single file in the repository
pub fn validate_path(path: &str) -> Result<()> {
    if path.is_empty()
        || path.starts_with('/')
        || path.ends_with('/')
        || path.split('/').any(|seg| seg.is_empty() || seg == "." || seg == "..")
    {
        return Err(SyncError::InvalidRequest(format!("invalid path: {:?}", path)));
    }
    Ok(())
}

/// Decode a base64 payload; `None` when it is not UTF-8 text
fn decode_text(encoded: &str) -> Option<String> {
    let bytes = STANDARD.decode(encoded).ok()?;
    String::from_utf8(bytes).ok()
}

/// Gateway over the provider's contents API
#[derive(Clone)]
pub struct FileGateway {
    transport: Arc<dyn ContentTransport>,
}

impl std::fmt::Debug for FileGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileGateway").finish_non_exhaustive()
    }
}

impl FileGateway {
    pub fn new(transport: Arc<dyn ContentTransport>) -> Self {
        Self { transport }
    }

    async fn exchange(&self, request: ApiRequest) -> Result<ApiResponse> {
        Ok(self.transport.send(request).await?)
    }

    /// Read a file and its current content hash
    pub async fn fetch(&self, ctx: &RepoContext, path: &str) -> Result<RemoteFile> {
        validate_path(path)?;
        debug!(owner = %ctx.owner, repo = %ctx.repo, path, "Fetching file");

        let response = self
            .exchange(ApiRequest::get(ctx.contents_path(path), ctx.token.secret()))
            .await?;
        if !response.is_success() {
            return Err(classify(Op::Read, path, &response));
        }

        if response.body.trim_start().starts_with('[') {
            return Err(SyncError::InvalidRequest(format!("{} is a directory", path)));
        }

        let payload: ContentsPayload = parse(&response)?;
        let raw = if payload.has_inline_content() {
            payload.content.clone()
        } else {
            self.fetch_blob(ctx, path, &payload).await?
        };
        let encoded: String = raw.chars().filter(|c| !c.is_whitespace()).collect();

        let (content, binary) = match decode_text(&encoded) {
            Some(text) => (text, false),
            None => (BINARY_PLACEHOLDER.to_string(), true),
        };

        Ok(RemoteFile {
            path: payload.path,
            name: payload.name,
            content,
            sha: payload.sha,
            size: payload.size,
            binary,
            encoded,
        })
    }

    /// Content of a file too large for the contents endpoint, via the git blob API
    async fn fetch_blob(
        &self,
        ctx: &RepoContext,
        path: &str,
        payload: &ContentsPayload,
    ) -> Result<String> {
        debug!(path, size = payload.size, "Contents not inlined, reading blob");

        let response = self
            .exchange(ApiRequest::get(ctx.blob_path(&payload.sha), ctx.token.secret()))
            .await?;
        if !response.is_success() {
            return Err(classify(Op::Read, path, &response));
        }

        let blob: BlobPayload = parse(&response)?;
        if blob.encoding != "base64" || (blob.content.trim().is_empty() && blob.size > 0) {
            return Err(SyncError::UpstreamUnavailable {
                status: response.status,
                message: format!(
                    "provider returned no content for {} ({} bytes, encoding {})",
                    path, payload.size, blob.encoding
                ),
            });
        }
        Ok(blob.content)
    }

    /// Create a file that must not exist yet
    pub async fn create(&self, ctx: &RepoContext, file: &NewFile) -> Result<WriteReceipt> {
        validate_path(&file.path)?;
        let encoded = STANDARD.encode(file.content.as_bytes());
        self.create_encoded(ctx, &file.path, encoded, &file.message, &file.branch)
            .await
    }

    /// Create a file from an already-encoded payload (binary safe)
    pub(crate) async fn create_encoded(
        &self,
        ctx: &RepoContext,
        path: &str,
        encoded: String,
        message: &str,
        branch: &str,
    ) -> Result<WriteReceipt> {
        validate_path(path)?;
        let body = serde_json::json!({
            "message": message,
            "content": encoded,
            "branch": branch,
        });
        self.put(ctx, path, body, Op::Create).await
    }

    /// Replace a file's content, guarded by its prior content hash
    pub async fn update(&self, ctx: &RepoContext, update: &FileUpdate) -> Result<WriteReceipt> {
        validate_path(&update.path)?;
        if update.prior_sha.trim().is_empty() {
            return Err(SyncError::Conflict(format!(
                "content hash for {} is stale or missing",
                update.path
            )));
        }
        let body = serde_json::json!({
            "message": update.message,
            "content": STANDARD.encode(update.content.as_bytes()),
            "sha": update.prior_sha,
            "branch": update.branch,
        });
        self.put(ctx, &update.path, body, Op::Mutate).await
    }

    async fn put(
        &self,
        ctx: &RepoContext,
        path: &str,
        body: serde_json::Value,
        op: Op,
    ) -> Result<WriteReceipt> {
        debug!(owner = %ctx.owner, repo = %ctx.repo, path, ?op, "Writing file");

        let request = ApiRequest::put(ctx.contents_path(path), ctx.token.secret(), body);
        let response = self.exchange(request).await?;
        if !response.is_success() {
            return Err(classify(op, path, &response));
        }

        let payload: WritePayload = parse(&response)?;
        let content = payload.content.ok_or_else(|| {
            SyncError::Internal("write response carried no content".to_string())
        })?;

        info!(path = %content.path, sha = %content.sha, "File written");
        Ok(WriteReceipt {
            path: content.path,
            sha: content.sha,
            commit: payload.commit.sha,
        })
    }

    /// Delete a file, guarded by its prior content hash
    pub async fn delete(&self, ctx: &RepoContext, deletion: &FileDeletion) -> Result<DeleteReceipt> {
        validate_path(&deletion.path)?;
        debug!(owner = %ctx.owner, repo = %ctx.repo, path = %deletion.path, "Deleting file");

        let body = serde_json::json!({
            "message": deletion.message,
            "sha": deletion.prior_sha,
            "branch": deletion.branch,
        });
        let request = ApiRequest::delete(ctx.contents_path(&deletion.path), ctx.token.secret(), body);
        let response = self.exchange(request).await?;
        if !response.is_success() {
            return Err(classify(Op::Mutate, &deletion.path, &response));
        }

        // 204 carries no body
        let commit = serde_json::from_str::<WritePayload>(&response.body)
            .ok()
            .map(|p| p.commit.sha);

        info!(path = %deletion.path, "File deleted");
        Ok(DeleteReceipt {
            path: deletion.path.clone(),
            commit,
        })
    }

    /// All repositories visible to the token, following pagination
    pub async fn list_repositories(&self, token: &RemoteToken) -> Result<Vec<RepositorySummary>> {
        let mut repositories = Vec::new();
        let mut page = 1usize;

        loop {
            let request = ApiRequest::get("/user/repos", token.secret())
                .with_query("per_page", REPOS_PER_PAGE)
                .with_query("page", page)
                .with_query("sort", "updated")
                .with_query("affiliation", "owner,collaborator,organization_member");
            let response = self.exchange(request).await?;
            if !response.is_success() {
                return Err(classify(Op::Read, "repository list", &response));
            }

            let batch: Vec<RepoPayload> = parse(&response)?;
            let count = batch.len();
            repositories.extend(batch.into_iter().map(RepositorySummary::from));

            if count < REPOS_PER_PAGE {
                break;
            }
            page += 1;
        }

        debug!(total = repositories.len(), pages = page, "Listed repositories");
        Ok(repositories)
    }

    /// Recursive listing of the default branch, as a tree
    pub async fn repository_tree(&self, ctx: &RepoContext) -> Result<RepositoryTree> {
        let subject = format!("{}/{}", ctx.owner, ctx.repo);

        let response = self
            .exchange(ApiRequest::get(ctx.repo_path(), ctx.token.secret()))
            .await?;
        if !response.is_success() {
            return Err(classify(Op::Read, &subject, &response));
        }
        let repo: serde_json::Value = parse(&response)?;
        let default_branch = repo
            .get("default_branch")
            .and_then(|b| b.as_str())
            .unwrap_or(DEFAULT_BRANCH)
            .to_string();

        let request = ApiRequest::get(
            format!("{}/git/trees/{}", ctx.repo_path(), default_branch),
            ctx.token.secret(),
        )
        .with_query("recursive", 1);
        let response = self.exchange(request).await?;
        if !response.is_success() {
            return Err(classify(Op::Read, &subject, &response));
        }

        let payload: TreePayload = parse(&response)?;
        if payload.truncated {
            warn!(repo = %subject, "Provider truncated the recursive tree listing");
        }

        let listing = build_tree(&payload.tree);
        Ok(RepositoryTree {
            owner: ctx.owner.clone(),
            repo: ctx.repo.clone(),
            default_branch,
            tree: listing.roots,
            dropped: listing.dropped,
        })
    }
}
