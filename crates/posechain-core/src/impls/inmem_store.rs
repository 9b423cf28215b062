//! InMemoryTaskStore - 開発用の TaskStore
//!
//! # 実装詳細
//! - HashMap<TaskId, TaskRecord> を tokio RwLock で保護
//! - パッチの検証は TaskRecord::apply に任せる

use std::sync::Arc;

use tokio::sync::RwLock;

use crate::domain::{StoreError, TaskId, TaskPatch, TaskRecord};
use crate::ports::{Clock, SystemClock, TaskPage, TaskQuery, TaskStore};

use super::table::RecordTable;

pub struct InMemoryTaskStore {
    table: RwLock<RecordTable>,
    clock: Arc<dyn Clock>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            table: RwLock::new(RecordTable::default()),
            clock,
        }
    }
}

impl Default for InMemoryTaskStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn create(&self, record: &TaskRecord) -> Result<bool, StoreError> {
        Ok(self.table.write().await.create(record))
    }

    async fn update(&self, task_id: &TaskId, patch: TaskPatch) -> Result<bool, StoreError> {
        let now = self.clock.now();
        Ok(self.table.write().await.update(task_id, patch, now))
    }

    async fn get(&self, task_id: &TaskId) -> Result<Option<TaskRecord>, StoreError> {
        Ok(self.table.read().await.get(task_id))
    }

    async fn list(&self, query: &TaskQuery) -> Result<TaskPage, StoreError> {
        Ok(self.table.read().await.list(query))
    }

    async fn delete(&self, task_id: &TaskId) -> Result<bool, StoreError> {
        Ok(self.table.write().await.delete(task_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{PetProfile, TaskStatus};
    use crate::ports::FixedClock;
    use chrono::{Duration, TimeZone, Utc};

    fn record(id: &str, breed: &str, clock: &FixedClock) -> TaskRecord {
        TaskRecord::new(
            TaskId::new(id),
            PetProfile::new(breed, "white", "dog"),
            clock.now(),
        )
    }

    fn setup() -> (InMemoryTaskStore, FixedClock) {
        let clock = FixedClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap());
        (InMemoryTaskStore::with_clock(Arc::new(clock.clone())), clock)
    }

    #[tokio::test]
    async fn create_twice_acts_as_upsert() {
        let (store, clock) = setup();
        let id = TaskId::new("pet-1");

        assert!(store.create(&record("pet-1", "corgi", &clock)).await.unwrap());
        store
            .update(&id, TaskPatch::new().status(TaskStatus::Processing).progress(45))
            .await
            .unwrap();

        clock.advance(Duration::minutes(5));
        assert!(store.create(&record("pet-1", "shiba", &clock)).await.unwrap());

        let stored = store.get(&id).await.unwrap().unwrap();
        assert_eq!(stored.metadata.breed, "shiba");
        assert_eq!(stored.status, TaskStatus::Initialized);
        assert_eq!(stored.progress, 0);
        assert_eq!(stored.created_at, Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap());
        assert_eq!(store.list(&TaskQuery::default()).await.unwrap().total, 1);
    }

    #[tokio::test]
    async fn terminal_task_ignores_late_updates() {
        let (store, clock) = setup();
        let id = TaskId::new("pet-2");
        store.create(&record("pet-2", "corgi", &clock)).await.unwrap();
        store
            .update(&id, TaskPatch::new().status(TaskStatus::Processing))
            .await
            .unwrap();
        assert!(
            store
                .update(&id, TaskPatch::new().status(TaskStatus::Failed).message("boom"))
                .await
                .unwrap()
        );

        let late = TaskPatch::new()
            .status(TaskStatus::Processing)
            .progress(70)
            .message("late worker");
        assert!(!store.update(&id, late).await.unwrap());

        let stored = store.get(&id).await.unwrap().unwrap();
        assert_eq!(stored.status, TaskStatus::Failed);
        assert_eq!(stored.message, "boom");
    }

    #[tokio::test]
    async fn update_missing_task_returns_false() {
        let (store, _) = setup();
        let updated = store
            .update(&TaskId::new("ghost"), TaskPatch::new().progress(10))
            .await
            .unwrap();
        assert!(!updated);
    }

    #[tokio::test]
    async fn update_refreshes_updated_at() {
        let (store, clock) = setup();
        let id = TaskId::new("pet-3");
        store.create(&record("pet-3", "corgi", &clock)).await.unwrap();

        clock.advance(Duration::seconds(30));
        store
            .update(&id, TaskPatch::new().message("hello"))
            .await
            .unwrap();

        let stored = store.get(&id).await.unwrap().unwrap();
        assert_eq!(stored.updated_at - stored.created_at, Duration::seconds(30));
    }

    #[tokio::test]
    async fn list_pages_newest_first_and_delete() {
        let (store, clock) = setup();
        for i in 0..3 {
            store
                .create(&record(&format!("pet-{i}"), "corgi", &clock))
                .await
                .unwrap();
            clock.advance(Duration::seconds(1));
        }

        let page = store
            .list(&TaskQuery::default().page(1, 2))
            .await
            .unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.items[0].task_id.as_str(), "pet-2");

        assert!(store.delete(&TaskId::new("pet-2")).await.unwrap());
        assert!(!store.delete(&TaskId::new("pet-2")).await.unwrap());
        assert!(store.get(&TaskId::new("pet-2")).await.unwrap().is_none());
    }
}
