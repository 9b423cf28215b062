//! Remote job driver: submit -> poll -> download.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::domain::{PipelineError, RemoteJobId};
use crate::ports::{GenerationClient, ImageJobRequest, RemoteJobState, VideoJobRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollPolicy {
    pub interval: Duration,
    /// Overall wait for one job, from the first poll.
    pub timeout: Duration,
}

impl PollPolicy {
    pub fn image() -> Self {
        Self {
            interval: Duration::from_secs(5),
            timeout: Duration::from_secs(300),
        }
    }

    pub fn video() -> Self {
        Self {
            interval: Duration::from_secs(10),
            timeout: Duration::from_secs(600),
        }
    }
}

/// Drives one remote job to completion. Retrying is the caller's business;
/// a timeout surfaces as a retryable [`PipelineError::Transient`].
pub struct RemoteJobDriver {
    client: Arc<dyn GenerationClient>,
    image_poll: PollPolicy,
    video_poll: PollPolicy,
}

impl RemoteJobDriver {
    pub fn new(
        client: Arc<dyn GenerationClient>,
        image_poll: PollPolicy,
        video_poll: PollPolicy,
    ) -> Self {
        Self {
            client,
            image_poll,
            video_poll,
        }
    }

    pub async fn generate_image(
        &self,
        request: &ImageJobRequest,
        destination: &Path,
    ) -> Result<PathBuf, PipelineError> {
        let job_id = self.client.submit_image_job(request).await?;
        tracing::debug!(job_id = %job_id, "image job submitted");
        let url = self.wait_for(&job_id, self.image_poll).await?;
        self.client.download(&url, destination).await
    }

    pub async fn generate_video(
        &self,
        request: &VideoJobRequest,
        destination: &Path,
    ) -> Result<PathBuf, PipelineError> {
        let job_id = self.client.submit_video_job(request).await?;
        tracing::debug!(job_id = %job_id, "video job submitted");
        let url = self.wait_for(&job_id, self.video_poll).await?;
        self.client.download(&url, destination).await
    }

    /// Poll until the job is terminal. Returns the result URL.
    pub async fn wait_for(
        &self,
        job_id: &RemoteJobId,
        poll: PollPolicy,
    ) -> Result<String, PipelineError> {
        let deadline = Instant::now() + poll.timeout;
        let mut polls: u32 = 0;

        loop {
            polls += 1;
            let status = self.client.poll_status(job_id).await?;
            tracing::debug!(job_id = %job_id, polls, state = ?status.state, "polled remote job");

            match status.state {
                RemoteJobState::Succeeded => {
                    return status
                        .result_url
                        .filter(|url| !url.trim().is_empty())
                        .ok_or_else(|| {
                            PipelineError::Protocol(format!(
                                "job {job_id} succeeded without a result url"
                            ))
                        });
                }
                RemoteJobState::Failed => {
                    return Err(PipelineError::RemoteJobFailed(failure_reason(
                        job_id,
                        status.error_message,
                    )));
                }
                RemoteJobState::Pending => {}
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(PipelineError::Transient(format!(
                    "timed out after {}s waiting for job {job_id}",
                    poll.timeout.as_secs()
                )));
            }
            tokio::time::sleep(poll.interval.min(deadline - now)).await;
        }
    }
}

/// The service sometimes puts a status word where the reason should be.
fn failure_reason(job_id: &RemoteJobId, message: Option<String>) -> String {
    let message = message.map(|m| m.trim().to_string()).unwrap_or_default();
    let looks_like_status = matches!(
        message.to_ascii_uppercase().as_str(),
        "" | "SUCCEED" | "SUCCESS" | "COMPLETED" | "DONE"
    );
    if looks_like_status {
        format!("job {job_id} failed without a reason")
    } else {
        format!("job {job_id}: {message}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::RemoteJobStatus;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Answers polls from a script; the last answer repeats.
    struct Scripted {
        answers: Mutex<VecDeque<RemoteJobStatus>>,
        polls: Mutex<u32>,
    }

    impl Scripted {
        fn new(answers: Vec<RemoteJobStatus>) -> Arc<Self> {
            Arc::new(Self {
                answers: Mutex::new(answers.into()),
                polls: Mutex::new(0),
            })
        }
    }

    #[async_trait::async_trait]
    impl GenerationClient for Scripted {
        async fn submit_image_job(
            &self,
            _: &ImageJobRequest,
        ) -> Result<RemoteJobId, PipelineError> {
            Ok(RemoteJobId::new("job-1"))
        }

        async fn submit_video_job(
            &self,
            _: &VideoJobRequest,
        ) -> Result<RemoteJobId, PipelineError> {
            Ok(RemoteJobId::new("job-2"))
        }

        async fn poll_status(&self, _: &RemoteJobId) -> Result<RemoteJobStatus, PipelineError> {
            *self.polls.lock().unwrap() += 1;
            let mut answers = self.answers.lock().unwrap();
            if answers.len() > 1 {
                Ok(answers.pop_front().unwrap())
            } else {
                Ok(answers.front().cloned().unwrap())
            }
        }

        async fn download(&self, _: &str, destination: &Path) -> Result<PathBuf, PipelineError> {
            Ok(destination.to_path_buf())
        }
    }

    fn request() -> ImageJobRequest {
        ImageJobRequest {
            reference_image: PathBuf::from("in.png"),
            prompt: "sit".into(),
            negative_prompt: String::new(),
            model: "m".into(),
            aspect_ratio: "1:1".into(),
        }
    }

    fn driver(client: Arc<Scripted>) -> RemoteJobDriver {
        RemoteJobDriver::new(client, PollPolicy::image(), PollPolicy::video())
    }

    #[tokio::test(start_paused = true)]
    async fn polls_until_success_then_downloads() {
        let client = Scripted::new(vec![
            RemoteJobStatus::pending(),
            RemoteJobStatus::pending(),
            RemoteJobStatus::succeeded("https://cdn/x.png"),
        ]);
        let path = driver(client.clone())
            .generate_image(&request(), Path::new("out/sit.png"))
            .await
            .unwrap();

        assert_eq!(path, PathBuf::from("out/sit.png"));
        assert_eq!(*client.polls.lock().unwrap(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_is_transient() {
        let client = Scripted::new(vec![RemoteJobStatus::pending()]);
        let err = driver(client.clone())
            .generate_image(&request(), Path::new("out/sit.png"))
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::Transient(ref m) if m.contains("timed out")));
        assert!(err.is_retryable());
        // 300s / 5s plus the poll at t=0
        assert_eq!(*client.polls.lock().unwrap(), 61);
    }

    #[tokio::test(start_paused = true)]
    async fn status_word_as_reason_is_replaced() {
        let client = Scripted::new(vec![RemoteJobStatus::failed(Some("SUCCEED".into()))]);
        let err = driver(client)
            .generate_image(&request(), Path::new("x"))
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "remote job failed: job job-1 failed without a reason"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn real_reason_is_kept() {
        let client = Scripted::new(vec![RemoteJobStatus::failed(Some(
            "content policy".into(),
        ))]);
        let err = driver(client)
            .generate_image(&request(), Path::new("x"))
            .await
            .unwrap_err();
        assert!(
            matches!(err, PipelineError::RemoteJobFailed(ref m) if m.ends_with("content policy"))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn success_without_url_is_protocol_error() {
        let client = Scripted::new(vec![RemoteJobStatus {
            state: RemoteJobState::Succeeded,
            result_url: None,
            error_message: None,
        }]);
        let err = driver(client)
            .generate_image(&request(), Path::new("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Protocol(_)));
    }
}
