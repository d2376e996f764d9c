//! Rename saga: fetch source, create target, delete source
//!
//! The provider has no move operation, so a rename is three calls. Between the
//! create and the delete both paths exist. If the delete fails the caller gets
//! [`SyncError::PartialRename`] naming both paths; the target is left in place.

use serde::Serialize;
use tracing::{info, warn};

use crate::error::{Result, SyncError};
use crate::gateway::{FileDeletion, FileGateway, RepoContext};
use crate::saga::{Saga, Step, StepOutcome, StepRecord};

const FETCH_SOURCE: &str = "fetch_source";
const CREATE_TARGET: &str = "create_target";
const DELETE_SOURCE: &str = "delete_source";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenameRequest {
    pub old_path: String,
    pub new_path: String,
    pub message: String,
    /// Content hash of `old_path` as last seen by the caller
    pub prior_sha: String,
    pub branch: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenameReceipt {
    pub old_path: String,
    pub new_path: String,
    /// Content hash of the file at `new_path`
    pub sha: String,
    /// Commit of the delete step
    pub commit: Option<String>,
    pub steps: Vec<StepRecord>,
}

#[derive(Debug, Clone)]
pub struct RenameCoordinator {
    gateway: FileGateway,
}

impl RenameCoordinator {
    pub fn new(gateway: FileGateway) -> Self {
        Self { gateway }
    }

    fn plan() -> Vec<Step> {
        vec![
            Step::abort(FETCH_SOURCE),
            Step::abort(CREATE_TARGET),
            Step::abort(DELETE_SOURCE),
        ]
    }

    pub async fn rename(&self, ctx: &RepoContext, request: &RenameRequest) -> Result<RenameReceipt> {
        if request.old_path == request.new_path {
            return Err(SyncError::InvalidRequest(
                "old and new path are the same".to_string(),
            ));
        }

        let mut saga = Saga::new("rename", Self::plan());

        let source = match saga.record(self.gateway.fetch(ctx, &request.old_path).await) {
            StepOutcome::Done(file) => file,
            StepOutcome::Continued(err) | StepOutcome::Aborted(err) => return Err(err),
        };

        // The encoded payload is copied as received so binary files survive
        let created = self
            .gateway
            .create_encoded(
                ctx,
                &request.new_path,
                source.encoded,
                &request.message,
                &request.branch,
            )
            .await;
        let created = match saga.record(created) {
            StepOutcome::Done(receipt) => receipt,
            StepOutcome::Continued(err) | StepOutcome::Aborted(err) => return Err(err),
        };

        let deletion = FileDeletion {
            path: request.old_path.clone(),
            message: request.message.clone(),
            prior_sha: request.prior_sha.clone(),
            branch: request.branch.clone(),
        };
        let deleted = match saga.record(self.gateway.delete(ctx, &deletion).await) {
            StepOutcome::Done(receipt) => receipt,
            StepOutcome::Continued(err) | StepOutcome::Aborted(err) => {
                warn!(
                    old_path = %request.old_path,
                    new_path = %request.new_path,
                    error = %err,
                    "Rename left both paths in place"
                );
                return Err(SyncError::PartialRename {
                    old_path: request.old_path.clone(),
                    new_path: request.new_path.clone(),
                    new_sha: created.sha,
                    reason: err.to_string(),
                });
            }
        };

        info!(old_path = %request.old_path, new_path = %request.new_path, "File renamed");
        Ok(RenameReceipt {
            old_path: request.old_path.clone(),
            new_path: request.new_path.clone(),
            sha: created.sha,
            commit: deleted.commit,
            steps: saga.records().to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::MemoryContentHost;
    use crate::session::RemoteToken;
    use crate::transport::Method;
    use std::sync::Arc;

    fn setup() -> (Arc<MemoryContentHost>, RenameCoordinator, RepoContext) {
        let host = Arc::new(MemoryContentHost::new());
        let gateway = FileGateway::new(host.clone());
        let ctx = RepoContext::new("octo", "demo", RemoteToken::new("tok"));
        (host, RenameCoordinator::new(gateway), ctx)
    }

    fn request(prior_sha: &str) -> RenameRequest {
        RenameRequest {
            old_path: "old.txt".into(),
            new_path: "new.txt".into(),
            message: "Rename old.txt to new.txt".into(),
            prior_sha: prior_sha.into(),
            branch: "main".into(),
        }
    }

    #[tokio::test]
    async fn test_rename_moves_content() {
        let (host, coordinator, ctx) = setup();
        let sha = host.put_text("octo", "demo", "old.txt", "hello");

        let receipt = coordinator.rename(&ctx, &request(&sha)).await.unwrap();
        assert_eq!(receipt.new_path, "new.txt");
        assert!(!host.file_exists("octo", "demo", "old.txt"));
        assert_eq!(host.file_text("octo", "demo", "new.txt").as_deref(), Some("hello"));
        assert_eq!(receipt.steps.len(), 3);
    }

    #[tokio::test]
    async fn test_rename_keeps_binary_bytes() {
        let (host, coordinator, ctx) = setup();
        let bytes = [0x89u8, b'P', b'N', b'G', 0x00, 0xff];
        let sha = host.put_bytes("octo", "demo", "old.txt", &bytes);

        coordinator.rename(&ctx, &request(&sha)).await.unwrap();
        assert_eq!(host.file_bytes("octo", "demo", "new.txt"), Some(bytes.to_vec()));
    }

    #[tokio::test]
    async fn test_missing_source_aborts_before_create() {
        let (host, coordinator, ctx) = setup();
        host.add_repository("octo", "demo", "main");

        let err = coordinator.rename(&ctx, &request("abc")).await.unwrap_err();
        assert!(matches!(err, SyncError::NotFound(_)));
        assert!(!host.file_exists("octo", "demo", "new.txt"));
    }

    #[tokio::test]
    async fn test_existing_target_aborts_without_delete() {
        let (host, coordinator, ctx) = setup();
        let sha = host.put_text("octo", "demo", "old.txt", "a");
        host.put_text("octo", "demo", "new.txt", "b");

        let err = coordinator.rename(&ctx, &request(&sha)).await.unwrap_err();
        assert!(matches!(err, SyncError::Conflict(_)));
        assert!(host.file_exists("octo", "demo", "old.txt"));
        assert!(!host
            .requests()
            .iter()
            .any(|(method, _)| *method == Method::Delete));
    }

    #[tokio::test]
    async fn test_stale_sha_reports_partial_rename() {
        let (host, coordinator, ctx) = setup();
        host.put_text("octo", "demo", "old.txt", "hello");

        let err = coordinator.rename(&ctx, &request("stale")).await.unwrap_err();
        match err {
            SyncError::PartialRename {
                old_path,
                new_path,
                new_sha,
                ..
            } => {
                assert_eq!(old_path, "old.txt");
                assert_eq!(new_path, "new.txt");
                assert_eq!(host.file_sha("octo", "demo", "new.txt"), Some(new_sha));
            }
            other => panic!("expected PartialRename, got {:?}", other),
        }
        assert!(host.file_exists("octo", "demo", "old.txt"));
    }

    #[tokio::test]
    async fn test_same_path_is_rejected() {
        let (_host, coordinator, ctx) = setup();
        let mut req = request("abc");
        req.new_path = req.old_path.clone();
        assert!(matches!(
            coordinator.rename(&ctx, &req).await,
            Err(SyncError::InvalidRequest(_))
        ));
    }
}
