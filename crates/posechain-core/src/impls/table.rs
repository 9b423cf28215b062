//! Record table shared by the store implementations.

use std::collections::HashMap;

use crate::domain::{TaskId, TaskPatch, TaskRecord};
use crate::ports::task_store::{TaskPage, TaskQuery, paginate};

#[derive(Debug, Default, Clone)]
pub(crate) struct RecordTable {
    records: HashMap<TaskId, TaskRecord>,
}

impl RecordTable {
    pub fn from_records(records: impl IntoIterator<Item = TaskRecord>) -> Self {
        Self {
            records: records
                .into_iter()
                .map(|r| (r.task_id.clone(), r))
                .collect(),
        }
    }

    pub fn records(&self) -> impl Iterator<Item = &TaskRecord> {
        self.records.values()
    }

    /// Upsert. A re-created task starts over but keeps its `created_at`.
    pub fn create(&mut self, record: &TaskRecord) -> bool {
        let mut record = record.clone();
        if let Some(existing) = self.records.get(&record.task_id) {
            record.created_at = existing.created_at;
        }
        self.records.insert(record.task_id.clone(), record);
        true
    }

    pub fn update(
        &mut self,
        task_id: &TaskId,
        patch: TaskPatch,
        now: chrono::DateTime<chrono::Utc>,
    ) -> bool {
        let Some(record) = self.records.get_mut(task_id) else {
            return false;
        };
        match record.apply(patch, now) {
            Ok(()) => true,
            Err(rejection) => {
                tracing::debug!(task_id = %task_id, %rejection, "patch rejected");
                false
            }
        }
    }

    pub fn get(&self, task_id: &TaskId) -> Option<TaskRecord> {
        self.records.get(task_id).cloned()
    }

    pub fn list(&self, query: &TaskQuery) -> TaskPage {
        paginate(self.records.values(), query)
    }

    pub fn delete(&mut self, task_id: &TaskId) -> bool {
        self.records.remove(task_id).is_some()
    }
}
