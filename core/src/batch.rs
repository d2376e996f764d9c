//! Batch push: sequential updates with per-entry results
//!
//! Entries are applied strictly in order, one request at a time. A failed
//! entry is recorded and the next one still runs; nothing is rolled back.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{ErrorKind, SyncError};
use crate::gateway::{FileGateway, FileUpdate, RepoContext};
use crate::saga::{Saga, Step, StepOutcome};

/// One file to update
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FileChange {
    pub path: String,
    pub content: String,
    /// Content hash the caller last saw for `path`
    pub sha: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushRequest {
    pub files: Vec<FileChange>,
    pub message: String,
    pub branch: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeStatus {
    Success,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileChangeResult {
    pub path: String,
    pub status: ChangeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}

impl FileChangeResult {
    fn success(path: &str, sha: String) -> Self {
        Self {
            path: path.to_string(),
            status: ChangeStatus::Success,
            sha: Some(sha),
            error: None,
            error_kind: None,
        }
    }

    fn failed(path: &str, err: &SyncError) -> Self {
        Self {
            path: path.to_string(),
            status: ChangeStatus::Failed,
            sha: None,
            error: Some(err.to_string()),
            error_kind: Some(err.kind()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ChangeStatus::Success
    }
}

/// Outcome of a whole batch, one result per entry in input order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub results: Vec<FileChangeResult>,
    pub total: usize,
    pub success_count: usize,
}

impl BatchReport {
    pub fn failed_count(&self) -> usize {
        self.total - self.success_count
    }

    pub fn is_partial(&self) -> bool {
        self.failed_count() > 0
    }

    /// `PartialBatchFailure` when at least one entry failed
    pub fn partial_failure(&self) -> Option<SyncError> {
        self.is_partial().then(|| SyncError::PartialBatchFailure {
            failed: self.failed_count(),
            total: self.total,
        })
    }
}

#[derive(Debug, Clone)]
pub struct BatchPushCoordinator {
    gateway: FileGateway,
}

impl BatchPushCoordinator {
    pub fn new(gateway: FileGateway) -> Self {
        Self { gateway }
    }

    pub async fn push(&self, ctx: &RepoContext, request: &PushRequest) -> BatchReport {
        let plan = request
            .files
            .iter()
            .map(|change| Step::continue_on_failure(format!("update:{}", change.path)))
            .collect();
        let mut saga = Saga::new("batch_push", plan);
        let mut results = Vec::with_capacity(request.files.len());

        for change in &request.files {
            let update = FileUpdate {
                path: change.path.clone(),
                content: change.content.clone(),
                message: request.message.clone(),
                prior_sha: change.sha.clone(),
                branch: request.branch.clone(),
            };
            let result = match saga.record(self.gateway.update(ctx, &update).await) {
                StepOutcome::Done(receipt) => FileChangeResult::success(&change.path, receipt.sha),
                StepOutcome::Continued(err) | StepOutcome::Aborted(err) => {
                    FileChangeResult::failed(&change.path, &err)
                }
            };
            results.push(result);
        }

        let success_count = results.iter().filter(|r| r.is_success()).count();
        let report = BatchReport {
            total: results.len(),
            success_count,
            results,
        };

        match report.partial_failure() {
            Some(err) => warn!(owner = %ctx.owner, repo = %ctx.repo, "{}", err),
            None => info!(
                owner = %ctx.owner,
                repo = %ctx.repo,
                files = report.total,
                "Batch pushed"
            ),
        }
        report
    }
}
