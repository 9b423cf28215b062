//! StatusBoard - 実行中タスクの進捗ビュー
//!
//! Design:
//! - One board per pipeline run. It is the only writer of the task's
//!   progress, message and results while the run lasts.
//! - The lock is held across the store write, so concurrent batch workers
//!   land their updates in order.
//! - Updates that would move progress backwards are dropped here, before
//!   they reach the store. After `complete` / `fail` everything is dropped.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::Mutex;

use crate::batch::BatchObserver;
use crate::domain::{
    PipelineError, Step, StepResults, StoreError, TaskId, TaskPatch, TaskStatus,
};
use crate::ports::{Clock, TaskStore};

#[derive(Debug, Default)]
struct BoardState {
    progress: u8,
    message: String,
    current_step: Option<Step>,
    results: StepResults,
    finished: bool,
}

pub struct StatusBoard {
    task_id: TaskId,
    store: Arc<dyn TaskStore>,
    clock: Arc<dyn Clock>,
    state: Mutex<BoardState>,
}

impl StatusBoard {
    pub fn new(task_id: TaskId, store: Arc<dyn TaskStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            task_id,
            store,
            clock,
            state: Mutex::new(BoardState::default()),
        }
    }

    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    async fn write(&self, patch: TaskPatch) -> Result<(), StoreError> {
        let applied = self
            .store
            .update(&self.task_id, patch)
            .await?;
        if !applied {
            tracing::warn!(task_id = %self.task_id, "task store refused status update");
        }
        Ok(())
    }

    /// Mark the task as processing.
    pub async fn begin(&self) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        state.message = "pipeline started".to_string();
        self.write(
            TaskPatch::new()
                .status(TaskStatus::Processing)
                .progress(0)
                .message(state.message.clone())
                .started_at(self.clock.now()),
        )
        .await
    }

    pub async fn enter_step(&self, step: Step) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        if state.finished {
            return Ok(());
        }
        state.current_step = Some(step);
        state.progress = state.progress.max(step.progress_on_start());
        state.message = format!(
            "step {}/{}: {}",
            step.number(),
            Step::ORDER.len(),
            step.label()
        );
        self.write(
            TaskPatch::new()
                .current_step(step)
                .progress(state.progress)
                .message(state.message.clone()),
        )
        .await
    }

    /// Progress inside a step. Backwards moves are ignored.
    pub async fn report(&self, progress: u8, message: impl Into<String>) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let progress = progress.min(100);
        if state.finished || progress < state.progress {
            return Ok(());
        }
        state.progress = progress;
        state.message = message.into();
        self.write(
            TaskPatch::new()
                .progress(progress)
                .message(state.message.clone()),
        )
        .await
    }

    /// Store a step's output without moving progress.
    pub async fn record_result(
        &self,
        step: Step,
        value: serde_json::Value,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        if state.finished {
            return Ok(());
        }
        state.results.insert(step.name().to_string(), value);
        self.write(TaskPatch::new().results(state.results.clone()))
            .await
    }

    /// Store a step's output and move to its checkpoint.
    pub async fn complete_step(
        &self,
        step: Step,
        value: serde_json::Value,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        if state.finished {
            return Ok(());
        }
        state.results.insert(step.name().to_string(), value);
        state.progress = state.progress.max(step.progress_on_completion());
        state.message = format!("{} done", step.label());
        self.write(
            TaskPatch::new()
                .progress(state.progress)
                .message(state.message.clone())
                .results(state.results.clone()),
        )
        .await
    }

    pub async fn complete(&self) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        if state.finished {
            return Ok(());
        }
        state.finished = true;
        state.progress = 100;
        state.message = "all steps completed".to_string();
        self.write(
            TaskPatch::new()
                .status(TaskStatus::Completed)
                .progress(100)
                .message(state.message.clone())
                .results(state.results.clone())
                .completed_at(self.clock.now()),
        )
        .await
    }

    /// Mark the task failed. Results gathered so far stay on the record.
    pub async fn fail(&self, error: &PipelineError) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        if state.finished {
            return Ok(());
        }
        state.finished = true;
        state.message = match state.current_step {
            Some(step) => format!("{} failed: {error}", step.label()),
            None => format!("pipeline failed: {error}"),
        };
        self.write(
            TaskPatch::new()
                .status(TaskStatus::Failed)
                .message(state.message.clone())
                .results(state.results.clone()),
        )
        .await
    }
}

/// Moves the board proportionally between a batch step's start and
/// completion checkpoints as jobs succeed.
pub struct BatchProgress {
    board: Arc<StatusBoard>,
    step: Step,
    total: usize,
    done: AtomicUsize,
}

impl BatchProgress {
    pub fn new(board: Arc<StatusBoard>, step: Step, total: usize) -> Self {
        Self {
            board,
            step,
            total,
            done: AtomicUsize::new(0),
        }
    }

    fn progress_at(&self, done: usize) -> u8 {
        let from = usize::from(self.step.progress_on_start());
        let to = usize::from(self.step.progress_on_completion());
        if self.total == 0 {
            return to as u8;
        }
        let done = done.min(self.total);
        (from + (to - from) * done / self.total) as u8
    }
}

#[async_trait::async_trait]
impl BatchObserver for BatchProgress {
    async fn on_job_finished(&self, key: &str, round: u32, outcome: Result<(), &PipelineError>) {
        if outcome.is_err() {
            return;
        }
        let done = self.done.fetch_add(1, Ordering::SeqCst) + 1;
        let message = format!("{}: {done}/{} ({key})", self.step.label(), self.total);
        if let Err(e) = self.board.report(self.progress_at(done), message).await {
            tracing::warn!(key, round, error = %e, "could not persist batch progress");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{PetProfile, TaskRecord};
    use crate::impls::InMemoryTaskStore;
    use crate::ports::SystemClock;

    async fn board() -> (Arc<StatusBoard>, Arc<InMemoryTaskStore>) {
        let store = Arc::new(InMemoryTaskStore::new());
        let id = TaskId::new("pet-board");
        let record = TaskRecord::new(id.clone(), PetProfile::default(), SystemClock.now());
        store.create(&record).await.unwrap();
        let board = StatusBoard::new(id, store.clone(), Arc::new(SystemClock));
        board.begin().await.unwrap();
        (Arc::new(board), store)
    }

    #[tokio::test]
    async fn stale_progress_is_dropped() {
        let (board, store) = board().await;
        board.report(60, "ahead").await.unwrap();
        board.report(40, "stale").await.unwrap();

        let record = store.get(board.task_id()).await.unwrap().unwrap();
        assert_eq!(record.progress, 60);
        assert_eq!(record.message, "ahead");
    }

    #[tokio::test]
    async fn nothing_moves_after_completion() {
        let (board, store) = board().await;
        board.complete().await.unwrap();
        board.report(100, "late worker").await.unwrap();
        board
            .fail(&PipelineError::Transient("late".into()))
            .await
            .unwrap();

        let record = store.get(board.task_id()).await.unwrap().unwrap();
        assert_eq!(record.status, TaskStatus::Completed);
        assert_eq!(record.message, "all steps completed");
        assert!(record.completed_at.is_some());
    }

    #[tokio::test]
    async fn failure_keeps_results() {
        let (board, store) = board().await;
        board.enter_step(Step::RemoveBackground).await.unwrap();
        board
            .complete_step(Step::RemoveBackground, serde_json::json!("a.png"))
            .await
            .unwrap();
        board.enter_step(Step::BaseImage).await.unwrap();
        board
            .fail(&PipelineError::Validation("bad".into()))
            .await
            .unwrap();

        let record = store.get(board.task_id()).await.unwrap().unwrap();
        assert_eq!(record.status, TaskStatus::Failed);
        assert_eq!(record.progress, 10);
        assert_eq!(record.results["remove_background"], "a.png");
        assert!(record.message.starts_with("generating base sit image failed"));
    }

    #[tokio::test]
    async fn batch_progress_is_proportional() {
        let (board, store) = board().await;
        board.enter_step(Step::LoopVideos).await.unwrap();
        let progress = BatchProgress::new(board.clone(), Step::LoopVideos, 4);

        progress.on_job_finished("sit", 1, Ok(())).await;
        progress.on_job_finished("walk", 1, Ok(())).await;
        let err = PipelineError::Transient("x".into());
        progress.on_job_finished("rest", 1, Err(&err)).await;

        // 70 + (85 - 70) * 2 / 4
        let record = store.get(board.task_id()).await.unwrap().unwrap();
        assert_eq!(record.progress, 77);
        assert_eq!(progress.progress_at(4), 85);
    }
}
