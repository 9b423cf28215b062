//! Task record: the persisted view of one pipeline run.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::TaskId;
use super::state::{Step, TaskStatus};

/// Step output keyed by [`Step::name`].
pub type StepResults = BTreeMap<String, serde_json::Value>;

/// Descriptive metadata about the animated subject, fed into every prompt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PetProfile {
    pub breed: String,
    pub color: String,
    pub species: String,
}

impl PetProfile {
    pub fn new(
        breed: impl Into<String>,
        color: impl Into<String>,
        species: impl Into<String>,
    ) -> Self {
        Self {
            breed: breed.into(),
            color: color.into(),
            species: species.into(),
        }
    }
}

/// Metadata + progress for a task.
///
/// Design:
/// - This is what the task store persists, one row per task.
/// - All progress mutations go through [`TaskRecord::apply`], which enforces
///   the two invariants: progress never goes backwards while processing, and
///   terminal records are frozen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub task_id: TaskId,
    pub status: TaskStatus,

    /// 0..=100
    pub progress: u8,

    pub message: String,

    pub current_step: Option<Step>,

    #[serde(default)]
    pub results: StepResults,

    #[serde(default)]
    pub metadata: PetProfile,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl TaskRecord {
    pub fn new(task_id: TaskId, profile: PetProfile, now: DateTime<Utc>) -> Self {
        Self {
            task_id,
            status: TaskStatus::Initialized,
            progress: 0,
            message: "task created".to_string(),
            current_step: None,
            results: StepResults::new(),
            metadata: profile,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
        }
    }

    /// Apply a partial update.
    ///
    /// The patch is validated as a whole before anything is written, so a
    /// rejected patch leaves the record untouched.
    pub fn apply(&mut self, patch: TaskPatch, now: DateTime<Utc>) -> Result<(), PatchRejection> {
        if self.status.is_terminal() {
            return Err(PatchRejection::Terminal(self.status));
        }

        let next_status = patch.status.unwrap_or(self.status);
        let progress = patch.progress.map(|p| p.min(100));
        if let Some(requested) = progress
            && next_status == TaskStatus::Processing
            && requested < self.progress
        {
            return Err(PatchRejection::ProgressRegression {
                current: self.progress,
                requested,
            });
        }

        self.status = next_status;
        if let Some(progress) = progress {
            self.progress = progress;
        }
        if let Some(message) = patch.message {
            self.message = message;
        }
        if let Some(step) = patch.current_step {
            self.current_step = Some(step);
        }
        if let Some(results) = patch.results {
            self.results = results;
        }
        if let Some(started_at) = patch.started_at {
            self.started_at = Some(started_at);
        }
        if let Some(completed_at) = patch.completed_at {
            self.completed_at = Some(completed_at);
        }
        self.updated_at = now;
        Ok(())
    }
}

/// Why a patch was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PatchRejection {
    #[error("task is already {0}")]
    Terminal(TaskStatus),

    #[error("progress may not go backwards ({current} -> {requested})")]
    ProgressRegression { current: u8, requested: u8 },
}

/// Partial update of a [`TaskRecord`]. `None` means "leave as is".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskPatch {
    pub status: Option<TaskStatus>,
    pub progress: Option<u8>,
    pub message: Option<String>,
    pub current_step: Option<Step>,
    pub results: Option<StepResults>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl TaskPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(mut self, status: TaskStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn progress(mut self, progress: u8) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn current_step(mut self, step: Step) -> Self {
        self.current_step = Some(step);
        self
    }

    pub fn results(mut self, results: StepResults) -> Self {
        self.results = Some(results);
        self
    }

    pub fn started_at(mut self, at: DateTime<Utc>) -> Self {
        self.started_at = Some(at);
        self
    }

    pub fn completed_at(mut self, at: DateTime<Utc>) -> Self {
        self.completed_at = Some(at);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    fn processing_record(progress: u8) -> TaskRecord {
        let mut record = TaskRecord::new(TaskId::new("pet-1"), PetProfile::default(), now());
        record
            .apply(
                TaskPatch::new()
                    .status(TaskStatus::Processing)
                    .progress(progress),
                now(),
            )
            .unwrap();
        record
    }

    #[test]
    fn new_record_is_initialized() {
        let record = TaskRecord::new(TaskId::new("pet-1"), PetProfile::default(), now());
        assert_eq!(record.status, TaskStatus::Initialized);
        assert_eq!(record.progress, 0);
        assert!(record.results.is_empty());
    }

    #[test]
    fn progress_moves_forward() {
        let mut record = processing_record(10);
        record
            .apply(TaskPatch::new().progress(45).message("halfway"), now())
            .unwrap();
        assert_eq!(record.progress, 45);
        assert_eq!(record.message, "halfway");
    }

    #[test]
    fn progress_regression_is_rejected_and_record_untouched() {
        let mut record = processing_record(45);
        let before = record.clone();
        let err = record
            .apply(TaskPatch::new().progress(25).message("stale"), now())
            .unwrap_err();
        assert_eq!(
            err,
            PatchRejection::ProgressRegression {
                current: 45,
                requested: 25
            }
        );
        assert_eq!(record, before);
    }

    #[test]
    fn terminal_record_is_frozen() {
        let mut record = processing_record(100);
        record
            .apply(TaskPatch::new().status(TaskStatus::Completed), now())
            .unwrap();

        let late = TaskPatch::new()
            .status(TaskStatus::Processing)
            .progress(100)
            .message("late worker");
        assert_eq!(
            record.apply(late, now()),
            Err(PatchRejection::Terminal(TaskStatus::Completed))
        );
        assert_eq!(record.status, TaskStatus::Completed);
    }

    #[test]
    fn progress_is_clamped() {
        let mut record = processing_record(0);
        record.apply(TaskPatch::new().progress(250), now()).unwrap();
        assert_eq!(record.progress, 100);
    }
}
