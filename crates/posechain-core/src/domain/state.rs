//! Task status and pipeline steps.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Task status.
///
/// State transitions:
/// - Initialized -> Processing -> Completed
/// - Initialized -> Processing -> Failed
///
/// Completed / Failed are terminal: nothing but deletion (or re-creating the
/// task from scratch) may change them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Initialized,
    Processing,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Initialized => "initialized",
            TaskStatus::Processing => "processing",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "initialized" => Ok(TaskStatus::Initialized),
            "processing" => Ok(TaskStatus::Processing),
            "completed" => Ok(TaskStatus::Completed),
            "failed" => Ok(TaskStatus::Failed),
            other => Err(format!("unknown task status: {other}")),
        }
    }
}

/// One step of the generation pipeline, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    RemoveBackground,
    BaseImage,
    SeedTransitions,
    RemainingTransitions,
    LoopVideos,
    Gifs,
    Concatenate,
}

impl Step {
    pub const ORDER: [Step; 7] = [
        Step::RemoveBackground,
        Step::BaseImage,
        Step::SeedTransitions,
        Step::RemainingTransitions,
        Step::LoopVideos,
        Step::Gifs,
        Step::Concatenate,
    ];

    /// Key under which the step's output lands in the results map.
    pub fn name(self) -> &'static str {
        match self {
            Step::RemoveBackground => "remove_background",
            Step::BaseImage => "base_image",
            Step::SeedTransitions => "seed_transitions",
            Step::RemainingTransitions => "remaining_transitions",
            Step::LoopVideos => "loop_videos",
            Step::Gifs => "gifs",
            Step::Concatenate => "concatenate",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Step::RemoveBackground => "removing background",
            Step::BaseImage => "generating base sit image",
            Step::SeedTransitions => "generating seed transitions",
            Step::RemainingTransitions => "generating remaining transitions",
            Step::LoopVideos => "generating loop clips",
            Step::Gifs => "encoding gifs",
            Step::Concatenate => "concatenating transitions",
        }
    }

    /// 1-based position in [`Step::ORDER`].
    pub fn number(self) -> usize {
        Step::ORDER
            .iter()
            .position(|s| *s == self)
            .map(|i| i + 1)
            .unwrap_or(0)
    }

    /// Progress checkpoint persisted once this step is done.
    pub fn progress_on_completion(self) -> u8 {
        match self {
            Step::RemoveBackground => 10,
            Step::BaseImage => 25,
            Step::SeedTransitions => 45,
            Step::RemainingTransitions => 70,
            Step::LoopVideos => 85,
            Step::Gifs => 95,
            Step::Concatenate => 100,
        }
    }

    /// Progress at the moment this step starts (the previous checkpoint).
    pub fn progress_on_start(self) -> u8 {
        match self.number() {
            0 | 1 => 0,
            n => Step::ORDER[n - 2].progress_on_completion(),
        }
    }

    /// Steps made of independent sub-jobs, run through the batch runner.
    pub fn is_batch(self) -> bool {
        matches!(
            self,
            Step::RemainingTransitions | Step::LoopVideos | Step::Gifs
        )
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Step {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Step::ORDER
            .into_iter()
            .find(|step| step.name() == s)
            .ok_or_else(|| format!("unknown step: {s}"))
    }
}
