//! Step bodies and the batch jobs they fan out to.
//!
//! Pose images are the dependency chain between steps:
//! - `BaseImage` produces `sit`.
//! - `SeedTransitions` turns `sit` into `walk` / `rest` via the last frames
//!   of `sit2walk` / `sit2rest`, then `rest` into `sleep` via `rest2sleep`.
//! - Everything after that may use any pose.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};

use crate::batch::{BatchJob, BatchObserver, BatchPolicy, BatchReport, BatchRunner};
use crate::domain::{PipelineError, Pose, Step, Transition};
use crate::ports::{FrameIndex, GifOptions, ImageJobRequest, MediaToolkit, VideoJobRequest};
use crate::retry::{self, RetryPolicy};
use crate::sequence;

use super::layout::ArtifactLayout;
use super::pipeline::{PipelineRequest, StepPipeline};
use super::prompts;
use super::remote::RemoteJobDriver;
use super::status::{BatchProgress, StatusBoard};

/// What a step hands back to the pipeline.
#[derive(Debug)]
pub(crate) struct StepOutcome {
    pub value: Value,
    /// Keys of batch jobs that never succeeded.
    pub failed: Vec<String>,
}

impl StepOutcome {
    fn done(value: Value) -> Self {
        Self {
            value,
            failed: Vec::new(),
        }
    }
}

fn path_str(path: &Path) -> String {
    path.display().to_string()
}

fn path_map<K: ToString>(paths: &BTreeMap<K, PathBuf>) -> BTreeMap<String, String> {
    paths
        .iter()
        .map(|(k, p)| (k.to_string(), path_str(p)))
        .collect()
}

/// Remote video job: one transition or loop clip.
pub struct VideoJob {
    key: String,
    driver: Arc<RemoteJobDriver>,
    request: VideoJobRequest,
    destination: PathBuf,
}

#[async_trait::async_trait]
impl BatchJob for VideoJob {
    type Output = PathBuf;

    fn key(&self) -> &str {
        &self.key
    }

    async fn run(&self) -> Result<PathBuf, PipelineError> {
        self.driver
            .generate_video(&self.request, &self.destination)
            .await
    }
}

/// Local GIF encode of one clip.
pub struct GifJob {
    key: String,
    media: Arc<dyn MediaToolkit>,
    video: PathBuf,
    destination: PathBuf,
    options: GifOptions,
}

#[async_trait::async_trait]
impl BatchJob for GifJob {
    type Output = PathBuf;

    fn key(&self) -> &str {
        &self.key
    }

    async fn run(&self) -> Result<PathBuf, PipelineError> {
        self.media
            .encode_gif(&self.video, self.options, &self.destination)
            .await
    }
}

const GIF_TRANSITION_PREFIX: &str = "transitions/";
const GIF_LOOP_PREFIX: &str = "loops/";

/// Clip name behind a gif job key.
fn gif_clip_name(key: &str) -> &str {
    key.strip_prefix(GIF_TRANSITION_PREFIX)
        .or_else(|| key.strip_prefix(GIF_LOOP_PREFIX))
        .unwrap_or(key)
}

/// Mutable state of one pipeline run, threaded from step to step.
pub(crate) struct StepRun<'a> {
    pipeline: &'a StepPipeline,
    board: Arc<StatusBoard>,
    layout: &'a ArtifactLayout,
    request: &'a PipelineRequest,
    reference_image: Option<PathBuf>,
    poses: BTreeMap<Pose, PathBuf>,
    transitions: BTreeMap<String, PathBuf>,
    loops: BTreeMap<String, PathBuf>,
}

impl<'a> StepRun<'a> {
    pub fn new(
        pipeline: &'a StepPipeline,
        board: Arc<StatusBoard>,
        layout: &'a ArtifactLayout,
        request: &'a PipelineRequest,
    ) -> Self {
        Self {
            pipeline,
            board,
            layout,
            request,
            reference_image: None,
            poses: BTreeMap::new(),
            transitions: BTreeMap::new(),
            loops: BTreeMap::new(),
        }
    }

    pub async fn execute(&mut self, step: Step) -> Result<StepOutcome, PipelineError> {
        match step {
            Step::RemoveBackground => self.remove_background().await,
            Step::BaseImage => self.base_image().await,
            Step::SeedTransitions => self.seed_transitions().await,
            Step::RemainingTransitions => self.remaining_transitions().await,
            Step::LoopVideos => self.loop_videos().await,
            Step::Gifs => self.gifs().await,
            Step::Concatenate => self.concatenate().await,
        }
    }

    fn pose_image(&self, pose: Pose, needed_by: &str) -> Result<PathBuf, PipelineError> {
        self.poses.get(&pose).cloned().ok_or_else(|| {
            PipelineError::Validation(format!("{needed_by} needs the {pose} pose image"))
        })
    }

    fn video_request(
        &self,
        start: PathBuf,
        end: Option<PathBuf>,
        prompt: String,
    ) -> VideoJobRequest {
        let settings = &self.pipeline.config.generation;
        VideoJobRequest {
            start_image: start,
            end_image: end,
            prompt,
            negative_prompt: prompts::NEGATIVE_PROMPT.to_string(),
            model: settings.video_model.clone(),
            mode: settings.video_mode.clone(),
            duration_secs: settings.video_duration_secs,
            aspect_ratio: settings.video_aspect_ratio.clone(),
        }
    }

    async fn run_batch<J: BatchJob>(
        &self,
        step: Step,
        policy: BatchPolicy,
        jobs: Vec<J>,
    ) -> BatchReport<J::Output> {
        let observer: Arc<dyn BatchObserver> =
            Arc::new(BatchProgress::new(Arc::clone(&self.board), step, jobs.len()));
        BatchRunner::new(policy).run(jobs, Some(observer)).await
    }

    async fn remove_background(&mut self) -> Result<StepOutcome, PipelineError> {
        let source = &self.request.source_image;
        let image = if self.request.skip_background_removal {
            tracing::info!("background removal skipped, using source image");
            source.clone()
        } else {
            self.pipeline
                .media
                .remove_background(source, &self.layout.transparent_image())
                .await?
        };
        let value = json!(path_str(&image));
        self.reference_image = Some(image);
        Ok(StepOutcome::done(value))
    }

    async fn base_image(&mut self) -> Result<StepOutcome, PipelineError> {
        let reference = self.reference_image.clone().ok_or_else(|| {
            PipelineError::Validation("base image needs the background-free source".into())
        })?;
        let settings = &self.pipeline.config.generation;
        let request = ImageJobRequest {
            reference_image: reference,
            prompt: prompts::base_pose(Pose::REST_POSE, &self.request.profile),
            negative_prompt: prompts::NEGATIVE_PROMPT.to_string(),
            model: settings.image_model.clone(),
            aspect_ratio: settings.image_aspect_ratio.clone(),
        };
        let destination = self.layout.pose_image(Pose::REST_POSE);
        let driver = &self.pipeline.driver;

        let image = retry::execute(
            &self.pipeline.config.retry,
            || driver.generate_image(&request, &destination),
            None,
        )
        .await?;

        self.poses.insert(Pose::REST_POSE, image.clone());
        Ok(StepOutcome::done(json!(path_str(&image))))
    }

    async fn seed_transitions(&mut self) -> Result<StepOutcome, PipelineError> {
        let mut videos = BTreeMap::new();
        let mut poses = BTreeMap::new();
        let mut first_frames = BTreeMap::new();
        let mut last_frames = BTreeMap::new();
        let media = Arc::clone(&self.pipeline.media);
        let total = Transition::SEEDS.len();

        for (i, transition) in Transition::SEEDS.into_iter().enumerate() {
            let start = self.pose_image(transition.start(), &transition.name())?;
            let request = self.video_request(
                start,
                None,
                prompts::transition(transition, &self.request.profile),
            );
            let destination = self.layout.transition_video(transition);
            let driver = &self.pipeline.driver;

            let video = retry::execute(
                &self.pipeline.config.retry,
                || driver.generate_video(&request, &destination),
                None,
            )
            .await?;

            let first = media
                .extract_frame(&video, FrameIndex::First, &self.layout.first_frame(transition))
                .await?;
            let last = media
                .extract_frame(&video, FrameIndex::Last, &self.layout.last_frame(transition))
                .await?;
            let pose = media
                .extract_frame(
                    &video,
                    FrameIndex::Last,
                    &self.layout.pose_image(transition.end()),
                )
                .await?;

            tracing::info!(
                transition = %transition,
                pose = %transition.end(),
                "seed transition ready"
            );
            self.poses.insert(transition.end(), pose.clone());
            self.transitions.insert(transition.name(), video.clone());
            videos.insert(transition.name(), video);
            poses.insert(transition.end().to_string(), pose);
            first_frames.insert(transition.name(), first);
            last_frames.insert(transition.name(), last);

            let done = i + 1;
            let start = Step::SeedTransitions.progress_on_start();
            let span = Step::SeedTransitions.progress_on_completion() - start;
            // u8 math: span * done stays below 256
            let progress = start + span * done as u8 / total as u8;
            let message = format!("{}: {done}/{total}", Step::SeedTransitions.label());
            self.board.report(progress, message).await?;
        }

        Ok(StepOutcome::done(json!({
            "videos": path_map(&videos),
            "poses": path_map(&poses),
            "first_frames": path_map(&first_frames),
            "last_frames": path_map(&last_frames),
        })))
    }

    async fn remaining_transitions(&mut self) -> Result<StepOutcome, PipelineError> {
        let mut jobs = Vec::new();
        for transition in Transition::remaining() {
            let name = transition.name();
            let start = self.pose_image(transition.start(), &name)?;
            let end = self.pose_image(transition.end(), &name)?;
            jobs.push(VideoJob {
                key: name,
                driver: Arc::clone(&self.pipeline.driver),
                request: self.video_request(
                    start,
                    Some(end),
                    prompts::transition(transition, &self.request.profile),
                ),
                destination: self.layout.transition_video(transition),
            });
        }

        let report = self
            .run_batch(Step::RemainingTransitions, self.pipeline.config.batch.clone(), jobs)
            .await;
        let failed = report.failed_keys();
        let value = json!({
            "videos": path_map(&report.succeeded),
            "failed": failed,
        });
        self.transitions.extend(report.succeeded);
        Ok(StepOutcome { value, failed })
    }

    async fn loop_videos(&mut self) -> Result<StepOutcome, PipelineError> {
        let mut jobs = Vec::new();
        for pose in Pose::ALL {
            let image = self.pose_image(pose, &format!("{pose} loop"))?;
            jobs.push(VideoJob {
                key: pose.to_string(),
                driver: Arc::clone(&self.pipeline.driver),
                request: self.video_request(
                    image.clone(),
                    Some(image),
                    prompts::loop_clip(pose, &self.request.profile),
                ),
                destination: self.layout.loop_video(pose),
            });
        }

        let report = self
            .run_batch(Step::LoopVideos, self.pipeline.config.batch.clone(), jobs)
            .await;
        let failed = report.failed_keys();
        let value = json!({
            "videos": path_map(&report.succeeded),
            "failed": failed,
        });
        self.loops.extend(report.succeeded);
        Ok(StepOutcome { value, failed })
    }

    async fn gifs(&mut self) -> Result<StepOutcome, PipelineError> {
        let options = self.pipeline.config.gif;
        let media = &self.pipeline.media;
        let mut jobs = Vec::new();
        for (name, video) in &self.transitions {
            jobs.push(GifJob {
                key: format!("{GIF_TRANSITION_PREFIX}{name}"),
                media: Arc::clone(media),
                video: video.clone(),
                destination: self.layout.transition_gif(name),
                options,
            });
        }
        for (name, video) in &self.loops {
            jobs.push(GifJob {
                key: format!("{GIF_LOOP_PREFIX}{name}"),
                media: Arc::clone(media),
                video: video.clone(),
                destination: self.layout.loop_gif(name),
                options,
            });
        }

        // Encoding is local: one round, no backoff.
        let policy = BatchPolicy {
            max_rounds: 1,
            retry_delay: Duration::ZERO,
            job_retry: RetryPolicy::none(),
            ..self.pipeline.config.batch.clone()
        };
        let report = self.run_batch(Step::Gifs, policy, jobs).await;

        let mut transitions = BTreeMap::new();
        let mut loops = BTreeMap::new();
        for (key, gif) in &report.succeeded {
            if let Some(name) = key.strip_prefix(GIF_TRANSITION_PREFIX) {
                transitions.insert(name.to_string(), path_str(gif));
            } else if let Some(name) = key.strip_prefix(GIF_LOOP_PREFIX) {
                loops.insert(name.to_string(), path_str(gif));
            }
        }
        let failed: Vec<String> = report
            .failed_keys()
            .iter()
            .map(|key| gif_clip_name(key).to_string())
            .collect();
        Ok(StepOutcome {
            value: json!({
                "transitions": transitions,
                "loops": loops,
                "failed": failed,
            }),
            failed,
        })
    }

    async fn concatenate(&mut self) -> Result<StepOutcome, PipelineError> {
        let playlist = sequence::sequence(&self.transitions);
        if playlist.is_empty() {
            return Err(PipelineError::Validation(
                "no transition clips to concatenate".into(),
            ));
        }
        if !playlist.leftovers.is_empty() {
            tracing::warn!(
                chained = playlist.chained.len(),
                leftovers = playlist.leftovers.len(),
                "transition clips do not form one chain, appending the rest"
            );
        }
        let order: Vec<String> = playlist.keys().into_iter().map(String::from).collect();
        let closed_loop = playlist.is_closed_loop();
        let videos = playlist.into_ordered();

        let video = self
            .pipeline
            .media
            .concatenate(
                &videos,
                self.pipeline.config.resize_to_first,
                &self.layout.concatenated_video(),
            )
            .await?;

        Ok(StepOutcome::done(json!({
            "video": path_str(&video),
            "order": order,
            "closed_loop": closed_loop,
        })))
    }
}
