//! Status views over the task store.

use serde::{Deserialize, Serialize};

use crate::domain::{StoreError, TaskRecord, TaskStatus};
use crate::ports::{TaskQuery, TaskStore};

const PAGE_SIZE: usize = 100;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskCounts {
    pub initialized: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
}

impl TaskCounts {
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a TaskRecord>) -> Self {
        let mut counts = Self::default();
        for record in records {
            counts.record(record.status);
        }
        counts
    }

    /// Count every task in the store, page by page.
    pub async fn collect(store: &dyn TaskStore) -> Result<Self, StoreError> {
        let mut counts = Self::default();
        let mut page = 1;
        loop {
            let batch = store
                .list(&TaskQuery::default().page(page, PAGE_SIZE))
                .await?;
            for record in &batch.items {
                counts.record(record.status);
            }
            if batch.items.is_empty() || page * PAGE_SIZE >= batch.total {
                return Ok(counts);
            }
            page += 1;
        }
    }

    pub fn total(&self) -> usize {
        self.initialized + self.processing + self.completed + self.failed
    }

    fn record(&mut self, status: TaskStatus) {
        match status {
            TaskStatus::Initialized => self.initialized += 1,
            TaskStatus::Processing => self.processing += 1,
            TaskStatus::Completed => self.completed += 1,
            TaskStatus::Failed => self.failed += 1,
        }
    }
}
