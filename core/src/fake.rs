//! In-memory contents host for testing
//!
//! Emulates the parts of the provider's REST API the gateway uses: the
//! contents endpoints with content-hash checking, repository metadata, the
//! recursive tree listing and the paginated repository list. Faults can be
//! queued per request to exercise failure paths.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use blake2::{Blake2s256, Digest};
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};

use crate::transport::{ApiRequest, ApiResponse, ContentTransport, Method, TransportError};
use crate::tree::TreeEntry;

/// Injected failure for one matching request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    Status(u16),
    Timeout,
}

#[derive(Debug, Clone)]
struct StoredFile {
    encoded: String,
    sha: String,
}

#[derive(Debug, Clone)]
struct HostedRepo {
    id: u64,
    default_branch: String,
    files: BTreeMap<String, StoredFile>,
    /// Listing returned instead of the derived one, for malformed-listing tests
    raw_tree: Option<Vec<TreeEntry>>,
    /// Paths whose contents are served without inline content, like files over 1 MB
    not_inlined: BTreeSet<String>,
}

#[derive(Debug, Default)]
struct HostState {
    repos: BTreeMap<(String, String), HostedRepo>,
    faults: Vec<(Method, String, Fault)>,
    log: Vec<(Method, String)>,
    accepted_token: Option<String>,
    commits: u64,
}

/// Fake provider for gateway, saga and router tests
#[derive(Debug, Default)]
pub struct MemoryContentHost {
    state: Mutex<HostState>,
}

fn content_sha(encoded: &str) -> String {
    let digest = Blake2s256::digest(encoded.as_bytes());
    digest
        .iter()
        .take(20)
        .map(|b| format!("{:02x}", b))
        .collect()
}

fn not_found() -> ApiResponse {
    ApiResponse::json(404, &json!({"message": "Not Found"}))
}

/// Wrap base64 at 60 columns, as the provider does
fn wrap_lines(encoded: &str) -> String {
    encoded
        .as_bytes()
        .chunks(60)
        .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
        .collect::<Vec<_>>()
        .join("\n")
}

fn decoded_len(encoded: &str) -> usize {
    STANDARD.decode(encoded).map(|b| b.len()).unwrap_or_default()
}

fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

impl MemoryContentHost {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HostState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Only accept requests carrying this token; others get 401
    pub fn accept_only(&self, token: &str) {
        self.lock().accepted_token = Some(token.to_string());
    }

    pub fn add_repository(&self, owner: &str, repo: &str, default_branch: &str) {
        let mut state = self.lock();
        let id = state.repos.len() as u64 + 1;
        state.repos.insert(
            (owner.to_string(), repo.to_string()),
            HostedRepo {
                id,
                default_branch: default_branch.to_string(),
                files: BTreeMap::new(),
                raw_tree: None,
                not_inlined: BTreeSet::new(),
            },
        );
    }

    /// Seed a text file, creating the repository when needed; returns its sha
    pub fn put_text(&self, owner: &str, repo: &str, path: &str, text: &str) -> String {
        self.put_bytes(owner, repo, path, text.as_bytes())
    }

    /// Seed a file with arbitrary bytes; returns its sha
    pub fn put_bytes(&self, owner: &str, repo: &str, path: &str, bytes: &[u8]) -> String {
        let key = (owner.to_string(), repo.to_string());
        if !self.lock().repos.contains_key(&key) {
            self.add_repository(owner, repo, "main");
        }
        let encoded = STANDARD.encode(bytes);
        let sha = content_sha(&encoded);
        let mut state = self.lock();
        if let Some(hosted) = state.repos.get_mut(&key) {
            hosted.files.insert(
                path.to_string(),
                StoredFile {
                    encoded,
                    sha: sha.clone(),
                },
            );
        }
        sha
    }

    /// Serve this listing from the tree endpoint instead of the derived one
    pub fn set_raw_tree(&self, owner: &str, repo: &str, entries: Vec<TreeEntry>) {
        let mut state = self.lock();
        if let Some(hosted) = state
            .repos
            .get_mut(&(owner.to_string(), repo.to_string()))
        {
            hosted.raw_tree = Some(entries);
        }
    }

    /// Serve this file the way the provider serves large files: empty
    /// `content` with encoding `none`, bytes only through the blob endpoint
    pub fn serve_without_inline_content(&self, owner: &str, repo: &str, path: &str) {
        let mut state = self.lock();
        if let Some(hosted) = state
            .repos
            .get_mut(&(owner.to_string(), repo.to_string()))
        {
            hosted.not_inlined.insert(path.to_string());
        }
    }

    /// Fail the next request with this method and path
    pub fn fail_next(&self, method: Method, path: &str, status: u16) {
        self.lock()
            .faults
            .push((method, path.to_string(), Fault::Status(status)));
    }

    /// Time out the next request with this method and path
    pub fn time_out_next(&self, method: Method, path: &str) {
        self.lock()
            .faults
            .push((method, path.to_string(), Fault::Timeout));
    }

    pub fn file_exists(&self, owner: &str, repo: &str, path: &str) -> bool {
        self.file_sha(owner, repo, path).is_some()
    }

    pub fn file_sha(&self, owner: &str, repo: &str, path: &str) -> Option<String> {
        self.lock()
            .repos
            .get(&(owner.to_string(), repo.to_string()))
            .and_then(|hosted| hosted.files.get(path))
            .map(|file| file.sha.clone())
    }

    pub fn file_bytes(&self, owner: &str, repo: &str, path: &str) -> Option<Vec<u8>> {
        let encoded = self
            .lock()
            .repos
            .get(&(owner.to_string(), repo.to_string()))
            .and_then(|hosted| hosted.files.get(path))
            .map(|file| file.encoded.clone())?;
        STANDARD.decode(encoded).ok()
    }

    pub fn file_text(&self, owner: &str, repo: &str, path: &str) -> Option<String> {
        self.file_bytes(owner, repo, path)
            .and_then(|bytes| String::from_utf8(bytes).ok())
    }

    /// Every request received so far, in order
    pub fn requests(&self) -> Vec<(Method, String)> {
        self.lock().log.clone()
    }

    fn route(state: &mut HostState, request: &ApiRequest) -> ApiResponse {
        if request.path == "/user/repos" {
            return Self::list_repos(state, request);
        }

        let segments: Vec<&str> = request.path.trim_start_matches('/').splitn(5, '/').collect();
        match segments.as_slice() {
            ["repos", owner, repo] if request.method == Method::Get => {
                match state.repos.get(&(owner.to_string(), repo.to_string())) {
                    Some(hosted) => ApiResponse::json(
                        200,
                        &json!({
                            "id": hosted.id,
                            "name": repo,
                            "full_name": format!("{}/{}", owner, repo),
                            "default_branch": hosted.default_branch,
                        }),
                    ),
                    None => not_found(),
                }
            }
            ["repos", owner, repo, "git", rest] if request.method == Method::Get => {
                let Some(hosted) = state.repos.get(&(owner.to_string(), repo.to_string())) else {
                    return not_found();
                };
                if let Some(sha) = rest.strip_prefix("blobs/") {
                    return Self::blob(hosted, sha);
                }
                match rest.strip_prefix("trees/") {
                    Some(branch) if hosted.default_branch == branch => Self::tree_listing(hosted),
                    _ => not_found(),
                }
            }
            ["repos", owner, repo, "contents", path] => {
                let key = (owner.to_string(), repo.to_string());
                if !state.repos.contains_key(&key) {
                    return not_found();
                }
                let commit = match request.method {
                    Method::Get => String::new(),
                    Method::Put | Method::Delete => {
                        state.commits += 1;
                        format!("commit-{}", state.commits)
                    }
                };
                match (state.repos.get_mut(&key), request.method) {
                    (Some(hosted), Method::Get) => Self::read(hosted, path),
                    (Some(hosted), Method::Put) => Self::write(hosted, path, request, &commit),
                    (Some(hosted), Method::Delete) => Self::remove(hosted, path, request, &commit),
                    (None, _) => not_found(),
                }
            }
            _ => not_found(),
        }
    }

    fn list_repos(state: &HostState, request: &ApiRequest) -> ApiResponse {
        let per_page: usize = request
            .query_param("per_page")
            .and_then(|v| v.parse().ok())
            .unwrap_or(30);
        let page: usize = request
            .query_param("page")
            .and_then(|v| v.parse().ok())
            .unwrap_or(1)
            .max(1);

        let listed: Vec<Value> = state
            .repos
            .iter()
            .skip((page - 1) * per_page)
            .take(per_page)
            .map(|((owner, repo), hosted)| {
                json!({
                    "id": hosted.id,
                    "name": repo,
                    "full_name": format!("{}/{}", owner, repo),
                    "owner": {"login": owner},
                    "description": null,
                    "private": false,
                    "html_url": format!("https://github.com/{}/{}", owner, repo),
                    "clone_url": format!("https://github.com/{}/{}.git", owner, repo),
                    "default_branch": hosted.default_branch,
                    "language": null,
                    "stargazers_count": 0,
                    "forks_count": 0,
                    "updated_at": "2024-01-01T00:00:00Z",
                    "created_at": "2024-01-01T00:00:00Z",
                    "size": hosted.files.len(),
                })
            })
            .collect();
        ApiResponse::json(200, &Value::Array(listed))
    }

    fn tree_listing(hosted: &HostedRepo) -> ApiResponse {
        let entries: Vec<Value> = match &hosted.raw_tree {
            Some(raw) => raw
                .iter()
                .map(|e| serde_json::to_value(e).unwrap_or(Value::Null))
                .collect(),
            None => {
                let mut folders = BTreeSet::new();
                for path in hosted.files.keys() {
                    let mut prefix = path.as_str();
                    while let Some(idx) = prefix.rfind('/') {
                        prefix = &prefix[..idx];
                        folders.insert(prefix.to_string());
                    }
                }
                folders
                    .iter()
                    .map(|p| json!({"path": p, "type": "tree"}))
                    .chain(
                        hosted
                            .files
                            .iter()
                            .map(|(p, f)| json!({"path": p, "type": "blob", "sha": f.sha})),
                    )
                    .collect()
            }
        };
        ApiResponse::json(200, &json!({"tree": entries, "truncated": false}))
    }

    fn blob(hosted: &HostedRepo, sha: &str) -> ApiResponse {
        match hosted.files.values().find(|f| f.sha == sha) {
            Some(file) => ApiResponse::json(
                200,
                &json!({
                    "sha": file.sha,
                    "size": decoded_len(&file.encoded),
                    "encoding": "base64",
                    "content": wrap_lines(&file.encoded),
                }),
            ),
            None => not_found(),
        }
    }

    fn read(hosted: &HostedRepo, path: &str) -> ApiResponse {
        if let Some(file) = hosted.files.get(path) {
            let (encoding, content) = if hosted.not_inlined.contains(path) {
                ("none", String::new())
            } else {
                ("base64", wrap_lines(&file.encoded))
            };
            return ApiResponse::json(
                200,
                &json!({
                    "type": "file",
                    "encoding": encoding,
                    "path": path,
                    "name": file_name(path),
                    "sha": file.sha,
                    "size": decoded_len(&file.encoded),
                    "content": content,
                }),
            );
        }

        let prefix = format!("{}/", path);
        let children: Vec<Value> = hosted
            .files
            .keys()
            .filter(|p| p.starts_with(&prefix))
            .map(|p| json!({"path": p, "name": file_name(p), "type": "file"}))
            .collect();
        if children.is_empty() {
            not_found()
        } else {
            ApiResponse::json(200, &Value::Array(children))
        }
    }

    fn write(hosted: &mut HostedRepo, path: &str, request: &ApiRequest, commit: &str) -> ApiResponse {
        let body = request.body.clone().unwrap_or(Value::Null);
        let Some(encoded) = body.get("content").and_then(Value::as_str) else {
            return ApiResponse::json(422, &json!({"message": "content is required"}));
        };
        let prior = body.get("sha").and_then(Value::as_str);

        let status = match (hosted.files.get(path), prior) {
            (Some(_), None) => {
                return ApiResponse::json(
                    422,
                    &json!({"message": "Invalid request.\n\n\"sha\" wasn't supplied."}),
                )
            }
            (Some(existing), Some(sha)) if existing.sha != sha => {
                return ApiResponse::json(
                    409,
                    &json!({"message": format!("{} does not match {}", path, sha)}),
                )
            }
            (Some(_), Some(_)) => 200,
            (None, Some(_)) => return not_found(),
            (None, None) => 201,
        };

        let encoded: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
        let sha = content_sha(&encoded);
        hosted.files.insert(
            path.to_string(),
            StoredFile {
                encoded,
                sha: sha.clone(),
            },
        );
        ApiResponse::json(
            status,
            &json!({
                "content": {"path": path, "name": file_name(path), "sha": sha},
                "commit": {"sha": commit},
            }),
        )
    }

    fn remove(hosted: &mut HostedRepo, path: &str, request: &ApiRequest, commit: &str) -> ApiResponse {
        let prior = request
            .body
            .as_ref()
            .and_then(|b| b.get("sha"))
            .and_then(Value::as_str);

        match (hosted.files.get(path), prior) {
            (None, _) => not_found(),
            (Some(_), None) => ApiResponse::json(422, &json!({"message": "\"sha\" wasn't supplied."})),
            (Some(existing), Some(sha)) if existing.sha != sha => ApiResponse::json(
                409,
                &json!({"message": format!("{} does not match {}", path, sha)}),
            ),
            (Some(_), Some(_)) => {
                hosted.files.remove(path);
                ApiResponse::json(200, &json!({"content": null, "commit": {"sha": commit}}))
            }
        }
    }
}

#[async_trait]
impl ContentTransport for MemoryContentHost {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
        let mut state = self.lock();
        state.log.push((request.method, request.path.clone()));

        if let Some(idx) = state
            .faults
            .iter()
            .position(|(m, p, _)| *m == request.method && *p == request.path)
        {
            let (_, _, fault) = state.faults.remove(idx);
            return match fault {
                Fault::Status(status) => Ok(ApiResponse::json(
                    status,
                    &json!({"message": format!("injected {}", status)}),
                )),
                Fault::Timeout => Err(TransportError::Timeout(format!(
                    "{} {} timed out",
                    request.method.as_str(),
                    request.path
                ))),
            };
        }

        if let Some(accepted) = &state.accepted_token {
            if *accepted != request.token {
                return Ok(ApiResponse::json(401, &json!({"message": "Bad credentials"})));
            }
        }

        Ok(Self::route(&mut state, &request))
    }
}
