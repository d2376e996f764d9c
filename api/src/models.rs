//! API Models Module
//!
//! Request and response bodies. Field names follow the editor's JavaScript
//! client, so most bodies are camelCase.

use serde::{Deserialize, Serialize};

use codeatease_core::{
    BatchReport, ChatTurn, FileChange, FileChangeResult, RenameReceipt, DEFAULT_BRANCH,
};

/// Server configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    /// Public URL used for OAuth redirects; the request's Host header is
    /// used instead while this is the local default
    pub base_url: String,
    pub version: String,
}

pub const LOCAL_BASE_URL: &str = "http://localhost:8000";

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            base_url: LOCAL_BASE_URL.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

fn default_branch() -> String {
    DEFAULT_BRANCH.to_string()
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: String,
    pub ai_available: bool,
    pub version: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfigResponse {
    pub base_url: String,
    pub environment: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FileQuery {
    pub path: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateFileRequest {
    pub owner: String,
    pub repo: String,
    pub path: String,
    pub content: String,
    pub message: String,
    pub sha: String,
    #[serde(default = "default_branch")]
    pub branch: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateFileRequest {
    pub owner: String,
    pub repo: String,
    pub path: String,
    pub content: String,
    pub message: String,
    #[serde(default = "default_branch")]
    pub branch: String,
}

#[derive(Debug, Deserialize)]
pub struct DeleteFileRequest {
    pub owner: String,
    pub repo: String,
    pub path: String,
    pub message: String,
    pub sha: String,
    #[serde(default = "default_branch")]
    pub branch: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenameFileRequest {
    pub owner: String,
    pub repo: String,
    pub old_path: String,
    pub new_path: String,
    pub message: String,
    pub sha: String,
    #[serde(default = "default_branch")]
    pub branch: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushChangesRequest {
    pub owner: String,
    pub repo: String,
    pub changes: Vec<FileChange>,
    pub commit_message: String,
    #[serde(default = "default_branch")]
    pub branch: String,
}

#[derive(Debug, Serialize)]
pub struct WriteResponse {
    pub message: &'static str,
    pub path: String,
    pub sha: String,
    pub commit: String,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub message: &'static str,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenameResponse {
    pub message: &'static str,
    pub old_path: String,
    pub new_path: String,
    pub sha: String,
    /// Commit of the delete step
    pub commit: Option<String>,
    pub steps: Vec<codeatease_core::saga::StepRecord>,
}

impl From<RenameReceipt> for RenameResponse {
    fn from(receipt: RenameReceipt) -> Self {
        Self {
            message: "File renamed successfully",
            old_path: receipt.old_path,
            new_path: receipt.new_path,
            sha: receipt.sha,
            commit: receipt.commit,
            steps: receipt.steps,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PushResponse {
    pub message: String,
    pub results: Vec<FileChangeResult>,
    pub total_files: usize,
    pub success_count: usize,
    /// At least one entry failed; the push itself still completed
    pub partial: bool,
}

impl From<BatchReport> for PushResponse {
    fn from(report: BatchReport) -> Self {
        let message = match report.partial_failure() {
            Some(err) => format!("Push completed: {}", err),
            None => "Push completed".to_string(),
        };
        Self {
            message,
            partial: report.is_partial(),
            total_files: report.total,
            success_count: report.success_count,
            results: report.results,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub history: Vec<ChatTurn>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rename_body_uses_camel_case_and_default_branch() {
        let body: RenameFileRequest = serde_json::from_str(
            r#"{"owner":"o","repo":"r","oldPath":"a","newPath":"b","message":"m","sha":"s"}"#,
        )
        .unwrap();
        assert_eq!(body.old_path, "a");
        assert_eq!(body.branch, "main");
    }

    #[test]
    fn test_push_body_parses_changes() {
        let body: PushChangesRequest = serde_json::from_str(
            r#"{"owner":"o","repo":"r","commitMessage":"c","branch":"dev",
                "changes":[{"path":"a.txt","content":"x","sha":"1"}]}"#,
        )
        .unwrap();
        assert_eq!(body.changes.len(), 1);
        assert_eq!(body.branch, "dev");
    }

    #[test]
    fn test_push_response_flags_partial() {
        let report = BatchReport {
            results: Vec::new(),
            total: 3,
            success_count: 2,
        };
        let response = PushResponse::from(report);
        assert!(response.partial);
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["totalFiles"], 3);
        assert_eq!(json["successCount"], 2);
    }
}
