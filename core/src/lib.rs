//! CodeAtEase Core Module
//!
//! Repository tree and file synchronization for the CodeAtEase editor backend:
//! the path tree builder, the gateway over the provider's contents API, the
//! rename and batch-push sagas, the session store and the chat collaborator.

use std::sync::Arc;

pub mod batch;
pub mod chat;
pub mod error;
pub mod fake;
pub mod gateway;
pub mod oauth;
pub mod rename;
pub mod saga;
pub mod session;
pub mod settings;
pub mod transport;
pub mod tree;

pub use batch::{BatchPushCoordinator, BatchReport, ChangeStatus, FileChange, FileChangeResult, PushRequest};
pub use chat::{ChatHistoryStore, ChatReply, ChatRequest, ChatService, ChatTurn, LanguageModel, RouterChatModel};
pub use error::{ErrorKind, Result, SyncError};
pub use gateway::{
    DeleteReceipt, FileDeletion, FileGateway, FileUpdate, NewFile, RemoteFile, RepoContext,
    RepositorySummary, RepositoryTree, WriteReceipt, DEFAULT_BRANCH,
};
pub use oauth::{GithubOAuth, GithubOAuthConfig, OAuthProvider};
pub use rename::{RenameCoordinator, RenameReceipt, RenameRequest};
pub use session::{IssuedToken, MemorySessionStore, RemoteToken, Session, SessionStore, SubjectProfile, UserProfile};
pub use settings::Settings;
pub use transport::{ContentTransport, ReqwestTransport};
pub use tree::{build_tree, NodeKind, TreeEntry, TreeListing, TreeNode};

/// Repository operations over one content transport
///
/// Bundles the single-file gateway with the two sagas built on it so callers
/// hold one handle.
#[derive(Debug, Clone)]
pub struct SyncEngine {
    gateway: FileGateway,
    rename: RenameCoordinator,
    batch: BatchPushCoordinator,
}

impl SyncEngine {
    pub fn new(transport: Arc<dyn ContentTransport>) -> Self {
        let gateway = FileGateway::new(transport);
        Self {
            rename: RenameCoordinator::new(gateway.clone()),
            batch: BatchPushCoordinator::new(gateway.clone()),
            gateway,
        }
    }

    pub fn gateway(&self) -> &FileGateway {
        &self.gateway
    }

    pub async fn rename(&self, ctx: &RepoContext, request: &RenameRequest) -> Result<RenameReceipt> {
        self.rename.rename(ctx, request).await
    }

    pub async fn push(&self, ctx: &RepoContext, request: &PushRequest) -> BatchReport {
        self.batch.push(ctx, request).await
    }
}
