//! SimulatedGenerationClient - ネットワークを使わない生成サービス
//!
//! Jobs stay pending for a configurable number of polls, then succeed or
//! fail. Status strings are produced in the service's inconsistent casing
//! and normalised through [`RemoteJobState::from_remote`] like a real client
//! would. A job is dropped once its final status has been reported.
//! Downloads write a small placeholder file.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::domain::{PipelineError, RemoteJobId};
use crate::ports::{
    GenerationClient, ImageJobRequest, RemoteJobState, RemoteJobStatus, VideoJobRequest,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationProfile {
    /// Polls answered with a pending status before the job settles.
    pub pending_polls: u32,
    /// Probability that a job fails, 0.0..=1.0.
    pub failure_rate: f64,
    /// Seed for the failure dice. `None` seeds from entropy.
    pub seed: Option<u64>,
    /// Jobs whose prompt contains one of these fragments always fail.
    pub fail_matching: Vec<String>,
}

impl Default for SimulationProfile {
    fn default() -> Self {
        Self {
            pending_polls: 2,
            failure_rate: 0.0,
            seed: None,
            fail_matching: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JobKind {
    Image,
    Video,
}

#[derive(Debug)]
struct SimJob {
    kind: JobKind,
    polls_left: u32,
    fails: bool,
}

pub struct SimulatedGenerationClient {
    profile: SimulationProfile,
    rng: Mutex<StdRng>,
    jobs: Mutex<HashMap<RemoteJobId, SimJob>>,
}

impl SimulatedGenerationClient {
    pub fn new(profile: SimulationProfile) -> Self {
        let rng = match profile.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            profile,
            rng: Mutex::new(rng),
            jobs: Mutex::new(HashMap::new()),
        }
    }

    fn submit(&self, kind: JobKind, prompt: &str) -> RemoteJobId {
        let forced = self
            .profile
            .fail_matching
            .iter()
            .any(|fragment| !fragment.is_empty() && prompt.contains(fragment.as_str()));
        let fails = forced || {
            let rate = self.profile.failure_rate.clamp(0.0, 1.0);
            let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
            rng.gen_bool(rate)
        };

        let job_id = RemoteJobId::from_ulid(Ulid::new());
        self.jobs.lock().unwrap_or_else(|e| e.into_inner()).insert(
            job_id.clone(),
            SimJob {
                kind,
                polls_left: self.profile.pending_polls,
                fails,
            },
        );
        tracing::debug!(job_id = %job_id, ?kind, fails, "simulated job submitted");
        job_id
    }

    /// Raw wire status for a job, advancing its poll counter.
    fn raw_status(&self, job_id: &RemoteJobId) -> Result<(&'static str, JobKind), PipelineError> {
        let mut jobs = self.jobs.lock().unwrap_or_else(|e| e.into_inner());
        let job = jobs
            .get_mut(job_id)
            .ok_or_else(|| PipelineError::NotFound(format!("remote job {job_id}")))?;
        if job.polls_left > 0 {
            let raw = if job.polls_left == self.profile.pending_polls {
                "SUBMITTED"
            } else {
                "processing"
            };
            job.polls_left -= 1;
            return Ok((raw, job.kind));
        }
        Ok((if job.fails { "FAILED" } else { "SUCCEED" }, job.kind))
    }
}

impl Default for SimulatedGenerationClient {
    fn default() -> Self {
        Self::new(SimulationProfile::default())
    }
}

#[async_trait::async_trait]
impl GenerationClient for SimulatedGenerationClient {
    async fn submit_image_job(
        &self,
        request: &ImageJobRequest,
    ) -> Result<RemoteJobId, PipelineError> {
        if request.prompt.trim().is_empty() {
            return Err(PipelineError::Validation("image prompt is empty".into()));
        }
        Ok(self.submit(JobKind::Image, &request.prompt))
    }

    async fn submit_video_job(
        &self,
        request: &VideoJobRequest,
    ) -> Result<RemoteJobId, PipelineError> {
        if request.prompt.trim().is_empty() {
            return Err(PipelineError::Validation("video prompt is empty".into()));
        }
        Ok(self.submit(JobKind::Video, &request.prompt))
    }

    async fn poll_status(&self, job_id: &RemoteJobId) -> Result<RemoteJobStatus, PipelineError> {
        let (raw, kind) = self.raw_status(job_id)?;
        let state = RemoteJobState::from_remote(raw)?;
        if state.is_terminal() {
            // settled jobs report once, then are forgotten
            self.jobs
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .remove(job_id);
        }
        Ok(match state {
            RemoteJobState::Pending => RemoteJobStatus::pending(),
            RemoteJobState::Succeeded => {
                let ext = match kind {
                    JobKind::Image => "png",
                    JobKind::Video => "mp4",
                };
                RemoteJobStatus::succeeded(format!("sim://{job_id}.{ext}"))
            }
            RemoteJobState::Failed => {
                RemoteJobStatus::failed(Some("simulated generation failure".to_string()))
            }
        })
    }

    async fn download(&self, url: &str, destination: &Path) -> Result<PathBuf, PipelineError> {
        if !url.starts_with("sim://") {
            return Err(PipelineError::Protocol(format!(
                "not a simulated result url: {url}"
            )));
        }
        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(destination, url.as_bytes()).await?;
        Ok(destination.to_path_buf())
    }
}
