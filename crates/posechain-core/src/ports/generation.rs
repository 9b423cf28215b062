//! GenerationClient port - リモート生成サービス
//!
//! The service is job based: submit, poll until terminal, download the result.
//! Submission and polling are separate calls so the driver in `app::remote`
//! owns the polling cadence and timeout.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::domain::{PipelineError, RemoteJobId};

/// Image job: restyle a reference image into a pose.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageJobRequest {
    pub reference_image: PathBuf,
    pub prompt: String,
    pub negative_prompt: String,
    pub model: String,
    pub aspect_ratio: String,
}

/// Video job: animate from a start frame, optionally pinned to an end frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoJobRequest {
    pub start_image: PathBuf,
    pub end_image: Option<PathBuf>,
    pub prompt: String,
    pub negative_prompt: String,
    pub model: String,
    /// `std` (720p) or `pro` (1080p).
    pub mode: String,
    pub duration_secs: u32,
    pub aspect_ratio: String,
}

/// Normalised remote job state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteJobState {
    Pending,
    Succeeded,
    Failed,
}

impl RemoteJobState {
    /// Map the service's raw status string. The service is inconsistent about
    /// casing (`SUCCEED` vs `succeed`), so matching ignores case. Anything we
    /// do not recognise is a protocol mismatch.
    pub fn from_remote(raw: &str) -> Result<Self, PipelineError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "succeed" | "succeeded" | "success" | "completed" | "done" | "finished" => {
                Ok(RemoteJobState::Succeeded)
            }
            "failed" | "failure" | "error" => Ok(RemoteJobState::Failed),
            "submitted" | "pending" | "processing" | "queued" | "running" => {
                Ok(RemoteJobState::Pending)
            }
            _ => Err(PipelineError::Protocol(format!(
                "unrecognised job status {raw:?}"
            ))),
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, RemoteJobState::Pending)
    }
}

/// One poll answer, already normalised.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteJobStatus {
    pub state: RemoteJobState,
    pub result_url: Option<String>,
    pub error_message: Option<String>,
}

impl RemoteJobStatus {
    pub fn pending() -> Self {
        Self {
            state: RemoteJobState::Pending,
            result_url: None,
            error_message: None,
        }
    }

    pub fn succeeded(url: impl Into<String>) -> Self {
        Self {
            state: RemoteJobState::Succeeded,
            result_url: Some(url.into()),
            error_message: None,
        }
    }

    pub fn failed(message: Option<String>) -> Self {
        Self {
            state: RemoteJobState::Failed,
            result_url: None,
            error_message: message,
        }
    }
}

/// GenerationClient は生成サービスへのインターフェース
///
/// # エラー
/// - network / timeout / 5xx: `PipelineError::Transient`
/// - response missing required fields: `PipelineError::Protocol`
#[async_trait::async_trait]
pub trait GenerationClient: Send + Sync {
    async fn submit_image_job(&self, request: &ImageJobRequest)
    -> Result<RemoteJobId, PipelineError>;

    async fn submit_video_job(&self, request: &VideoJobRequest)
    -> Result<RemoteJobId, PipelineError>;

    async fn poll_status(&self, job_id: &RemoteJobId) -> Result<RemoteJobStatus, PipelineError>;

    /// Fetch `url` into `destination` and return the written path.
    async fn download(&self, url: &str, destination: &Path) -> Result<PathBuf, PipelineError>;
}
