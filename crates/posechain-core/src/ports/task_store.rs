//! TaskStore port - task record の正本（source of truth）
//!
//! # 設計原則
//! - `create` は upsert（同じ task id で再作成するとレコードを初期化する）
//! - `update` は [`TaskRecord::apply`] を通す。拒否されたパッチは `Ok(false)`
//! - 終端状態（completed / failed）は delete か再 create でしか変わらない

use serde::{Deserialize, Serialize};

use crate::domain::{StoreError, TaskId, TaskPatch, TaskRecord, TaskStatus};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskQuery {
    pub status: Option<TaskStatus>,
    /// 1-based.
    pub page: usize,
    pub page_size: usize,
}

impl Default for TaskQuery {
    fn default() -> Self {
        Self {
            status: None,
            page: 1,
            page_size: 20,
        }
    }
}

impl TaskQuery {
    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn page(mut self, page: usize, page_size: usize) -> Self {
        self.page = page;
        self.page_size = page_size;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskPage {
    pub items: Vec<TaskRecord>,
    /// Matching records across all pages.
    pub total: usize,
}

/// TaskStore はタスク状態の永続化
///
/// # Thread Safety
/// - パイプラインと batch の worker task から同時に呼ばれる
#[async_trait::async_trait]
pub trait TaskStore: Send + Sync {
    /// Insert or reset the record. Returns `true` when a record was written.
    async fn create(&self, record: &TaskRecord) -> Result<bool, StoreError>;

    /// Apply a patch. `Ok(false)` if the task is missing or the patch was
    /// rejected (terminal task, progress regression).
    async fn update(&self, task_id: &TaskId, patch: TaskPatch) -> Result<bool, StoreError>;

    async fn get(&self, task_id: &TaskId) -> Result<Option<TaskRecord>, StoreError>;

    /// Newest first by `created_at`.
    async fn list(&self, query: &TaskQuery) -> Result<TaskPage, StoreError>;

    async fn delete(&self, task_id: &TaskId) -> Result<bool, StoreError>;
}

/// Filter, sort newest first and cut one page out of `records`.
pub fn paginate<'a>(
    records: impl IntoIterator<Item = &'a TaskRecord>,
    query: &TaskQuery,
) -> TaskPage {
    let mut matching: Vec<&TaskRecord> = records
        .into_iter()
        .filter(|r| query.status.is_none_or(|s| r.status == s))
        .collect();
    matching.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| a.task_id.cmp(&b.task_id))
    });

    let total = matching.len();
    let page_size = query.page_size.max(1);
    let skip = query.page.saturating_sub(1).saturating_mul(page_size);
    let items = matching
        .into_iter()
        .skip(skip)
        .take(page_size)
        .cloned()
        .collect();
    TaskPage { items, total }
}
