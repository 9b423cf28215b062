//! Step pipeline: one task through [`Step::ORDER`], persisted after every
//! step.
//!
//! States: `initialized -> processing(step 1..N) -> completed`, and any
//! processing state -> `failed`.
//!
//! - Single-job steps are always fatal.
//! - Batch steps tolerate partial failure unless listed in
//!   [`PipelineConfig::fatal_partial_steps`]. A fatal partial batch still
//!   records what it produced before the task is marked failed.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use crate::batch::BatchPolicy;
use crate::domain::{PetProfile, PipelineError, Step, TaskId, TaskRecord};
use crate::ports::{Clock, GifOptions, MediaToolkit, TaskIdGenerator, TaskStore};
use crate::retry::RetryPolicy;

use super::layout::ArtifactLayout;
use super::remote::{PollPolicy, RemoteJobDriver};
use super::status::StatusBoard;
use super::steps::StepRun;

/// Model parameters sent with every generation job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationSettings {
    pub image_model: String,
    pub image_aspect_ratio: String,
    pub video_model: String,
    pub video_mode: String,
    pub video_duration_secs: u32,
    pub video_aspect_ratio: String,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            image_model: "kling-v2".to_string(),
            image_aspect_ratio: "1:1".to_string(),
            video_model: "kling-v2-1-master".to_string(),
            video_mode: "pro".to_string(),
            video_duration_secs: 5,
            video_aspect_ratio: "16:9".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub output_root: PathBuf,
    /// Single remote jobs (base image, seed transitions).
    pub retry: RetryPolicy,
    pub batch: BatchPolicy,
    pub image_poll: PollPolicy,
    pub video_poll: PollPolicy,
    pub generation: GenerationSettings,
    pub gif: GifOptions,
    pub resize_to_first: bool,
    /// Batch steps that fail the task when any job is left unfinished.
    pub fatal_partial_steps: BTreeSet<Step>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            output_root: PathBuf::from("output"),
            retry: RetryPolicy::default(),
            batch: BatchPolicy::default(),
            image_poll: PollPolicy::image(),
            video_poll: PollPolicy::video(),
            generation: GenerationSettings::default(),
            gif: GifOptions::default(),
            resize_to_first: true,
            fatal_partial_steps: BTreeSet::new(),
        }
    }
}

impl PipelineConfig {
    pub fn is_fatal_on_partial_failure(&self, step: Step) -> bool {
        !step.is_batch() || self.fatal_partial_steps.contains(&step)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRequest {
    pub source_image: PathBuf,
    pub profile: PetProfile,
    /// The source already has a transparent background; use it as is.
    #[serde(default)]
    pub skip_background_removal: bool,
}

pub struct StepPipeline {
    pub(crate) store: Arc<dyn TaskStore>,
    pub(crate) driver: Arc<RemoteJobDriver>,
    pub(crate) media: Arc<dyn MediaToolkit>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) ids: Arc<dyn TaskIdGenerator>,
    pub(crate) config: PipelineConfig,
}

impl StepPipeline {
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn store(&self) -> Arc<dyn TaskStore> {
        Arc::clone(&self.store)
    }

    pub fn new_task_id(&self) -> TaskId {
        self.ids.generate_task_id()
    }

    /// Run in the background. Progress is visible through the task store.
    pub fn spawn(
        self: &Arc<Self>,
        task_id: TaskId,
        request: PipelineRequest,
    ) -> JoinHandle<Result<TaskRecord, PipelineError>> {
        let pipeline = Arc::clone(self);
        tokio::spawn(async move { pipeline.run(task_id, request).await })
    }

    /// Run every step. Re-running an existing task id starts it over.
    ///
    /// On a fatal failure the task is persisted as failed (partial results
    /// kept) and the error is returned.
    #[tracing::instrument(skip_all, fields(task_id = %task_id))]
    pub async fn run(
        &self,
        task_id: TaskId,
        request: PipelineRequest,
    ) -> Result<TaskRecord, PipelineError> {
        let record = TaskRecord::new(task_id.clone(), request.profile.clone(), self.clock.now());
        self.store.create(&record).await?;

        let board = Arc::new(StatusBoard::new(
            task_id.clone(),
            Arc::clone(&self.store),
            Arc::clone(&self.clock),
        ));
        board.begin().await?;
        tracing::info!(source = %request.source_image.display(), "pipeline started");

        let layout = ArtifactLayout::new(&self.config.output_root, &task_id);
        match self.run_steps(&board, &layout, &request).await {
            Ok(()) => {
                board.complete().await?;
                tracing::info!("pipeline completed");
            }
            Err(error) => {
                tracing::error!(error = %error, "pipeline failed");
                board.fail(&error).await?;
                return Err(error);
            }
        }

        self.store
            .get(&task_id)
            .await?
            .ok_or_else(|| PipelineError::NotFound(format!("task {task_id}")))
    }

    async fn run_steps(
        &self,
        board: &Arc<StatusBoard>,
        layout: &ArtifactLayout,
        request: &PipelineRequest,
    ) -> Result<(), PipelineError> {
        layout.create_dirs().await?;
        let mut run = StepRun::new(self, Arc::clone(board), layout, request);

        for step in Step::ORDER {
            board.enter_step(step).await?;
            tracing::info!(step = %step, number = step.number(), "step started");

            let outcome = run.execute(step).await?;
            if !outcome.failed.is_empty() {
                if self.config.is_fatal_on_partial_failure(step) {
                    board.record_result(step, outcome.value).await?;
                    return Err(PipelineError::BatchIncomplete {
                        step,
                        failed: outcome.failed,
                    });
                }
                tracing::warn!(
                    step = %step,
                    failed = ?outcome.failed,
                    "continuing past failed jobs"
                );
            }
            board.complete_step(step, outcome.value).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::app::{PipelineBuilder, prompts};
    use crate::domain::{Pose, TaskStatus};
    use crate::impls::{
        InMemoryTaskStore, SimulatedGenerationClient, SimulatedMediaToolkit, SimulationProfile,
    };

    fn fast_config(root: &Path, fatal: &[Step]) -> PipelineConfig {
        let poll = PollPolicy {
            interval: Duration::from_millis(1),
            timeout: Duration::from_secs(5),
        };
        PipelineConfig {
            output_root: root.to_path_buf(),
            retry: RetryPolicy::immediate(1),
            batch: BatchPolicy {
                max_concurrency: 3,
                max_rounds: 2,
                retry_delay: Duration::ZERO,
                job_retry: RetryPolicy::immediate(1),
            },
            image_poll: poll,
            video_poll: poll,
            fatal_partial_steps: fatal.iter().copied().collect(),
            ..PipelineConfig::default()
        }
    }

    struct Harness {
        _dir: tempfile::TempDir,
        pipeline: StepPipeline,
        store: Arc<InMemoryTaskStore>,
        request: PipelineRequest,
    }

    fn profile() -> PetProfile {
        PetProfile::new("shiba", "red", "dog")
    }

    async fn harness(fail_matching: Vec<String>, fatal: &[Step]) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("upload.png");
        tokio::fs::write(&source, b"png").await.unwrap();

        let store = Arc::new(InMemoryTaskStore::new());
        let generation = SimulatedGenerationClient::new(SimulationProfile {
            pending_polls: 1,
            fail_matching,
            ..SimulationProfile::default()
        });
        let pipeline = PipelineBuilder::new()
            .store(store.clone())
            .generation(Arc::new(generation))
            .media(Arc::new(SimulatedMediaToolkit::new()))
            .config(fast_config(&dir.path().join("output"), fatal))
            .build()
            .unwrap();

        Harness {
            _dir: dir,
            pipeline,
            store,
            request: PipelineRequest {
                source_image: source,
                profile: profile(),
                skip_background_removal: false,
            },
        }
    }

    async fn stored(store: &InMemoryTaskStore, id: &TaskId) -> TaskRecord {
        store.get(id).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn full_run_completes_with_every_step_result() {
        let h = harness(Vec::new(), &[]).await;
        let id = TaskId::new("pet_1");

        let record = h.pipeline.run(id.clone(), h.request.clone()).await.unwrap();

        assert_eq!(record.status, TaskStatus::Completed);
        assert_eq!(record.progress, 100);
        assert!(record.completed_at.is_some());
        for step in Step::ORDER {
            assert!(record.results.contains_key(step.name()), "{step} missing");
        }
        assert_eq!(record.results["remaining_transitions"]["failed"], json!([]));
        assert_eq!(
            record.results["gifs"]["transitions"].as_object().unwrap().len(),
            12
        );

        let concat = &record.results["concatenate"];
        assert_eq!(concat["closed_loop"], json!(true));
        let order = concat["order"].as_array().unwrap();
        assert_eq!(order.len(), 12);
        assert!(order[0].as_str().unwrap().starts_with("sit2"));
        let video = concat["video"].as_str().unwrap();
        assert!(Path::new(video).is_file());
    }

    #[tokio::test]
    async fn base_image_failure_fails_the_task_and_keeps_earlier_results() {
        let fragment = prompts::base_pose(Pose::Sit, &profile());
        let h = harness(vec![fragment], &[]).await;
        let id = TaskId::new("pet_2");

        let err = h.pipeline.run(id.clone(), h.request.clone()).await.unwrap_err();
        assert!(matches!(err, PipelineError::RetriesExhausted { attempts: 2, .. }));

        let record = stored(&h.store, &id).await;
        assert_eq!(record.status, TaskStatus::Failed);
        assert_eq!(record.current_step, Some(Step::BaseImage));
        assert!(record.message.starts_with("generating base sit image failed"));
        assert!(record.results.contains_key("remove_background"));
        assert!(!record.results.contains_key("base_image"));
    }

    #[tokio::test]
    async fn failed_loop_clip_is_tolerated_by_default() {
        let fragment = prompts::loop_clip(Pose::Sleep, &profile());
        let h = harness(vec![fragment], &[]).await;
        let id = TaskId::new("pet_3");

        let record = h.pipeline.run(id.clone(), h.request.clone()).await.unwrap();

        assert_eq!(record.status, TaskStatus::Completed);
        assert_eq!(record.results["loop_videos"]["failed"], json!(["sleep"]));
        let loops = record.results["gifs"]["loops"].as_object().unwrap();
        assert_eq!(loops.len(), 3);
        assert!(!loops.contains_key("sleep"));
    }

    #[tokio::test]
    async fn fatal_partial_step_fails_after_recording_its_output() {
        let fragment = prompts::loop_clip(Pose::Sleep, &profile());
        let h = harness(vec![fragment], &[Step::LoopVideos]).await;
        let id = TaskId::new("pet_4");

        let err = h.pipeline.run(id.clone(), h.request.clone()).await.unwrap_err();
        match err {
            PipelineError::BatchIncomplete { step, failed } => {
                assert_eq!(step, Step::LoopVideos);
                assert_eq!(failed, vec!["sleep".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }

        let record = stored(&h.store, &id).await;
        assert_eq!(record.status, TaskStatus::Failed);
        assert!(record.progress >= Step::LoopVideos.progress_on_start());
        assert!(record.progress < Step::LoopVideos.progress_on_completion());
        assert_eq!(
            record.results["loop_videos"]["videos"].as_object().unwrap().len(),
            3
        );
        assert!(!record.results.contains_key("gifs"));
    }

    #[tokio::test]
    async fn spawned_run_without_background_removal() {
        let h = harness(Vec::new(), &[]).await;
        let pipeline = Arc::new(h.pipeline);
        let id = pipeline.new_task_id();
        assert!(id.as_str().starts_with("pet-"));

        let request = PipelineRequest {
            skip_background_removal: true,
            ..h.request.clone()
        };
        let record = pipeline.spawn(id, request).await.unwrap().unwrap();

        assert_eq!(record.status, TaskStatus::Completed);
        assert_eq!(
            record.results["remove_background"],
            json!(h.request.source_image.display().to_string())
        );
    }
}
