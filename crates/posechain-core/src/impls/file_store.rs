//! FileTaskStore - JSON ファイルに書き出す TaskStore
//!
//! The whole table lives in memory and is written through to one JSON file
//! after every mutation (write to `<file>.tmp`, then rename). A mutation is
//! applied to a copy of the table and only swapped in once the file write
//! succeeded. Single process only; there is no cross-process locking.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::domain::{StoreError, TaskId, TaskPatch, TaskRecord};
use crate::ports::{Clock, SystemClock, TaskPage, TaskQuery, TaskStore};

use super::table::RecordTable;

pub struct FileTaskStore {
    path: PathBuf,
    table: RwLock<RecordTable>,
    clock: Arc<dyn Clock>,
}

impl FileTaskStore {
    /// Open `path`, creating an empty store if the file does not exist.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        Self::open_with_clock(path, Arc::new(SystemClock)).await
    }

    pub async fn open_with_clock(
        path: impl Into<PathBuf>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, StoreError> {
        let path = path.into();
        let table = match tokio::fs::read(&path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => RecordTable::default(),
            Ok(bytes) => {
                let records: Vec<TaskRecord> = serde_json::from_slice(&bytes)?;
                let mut seen = HashSet::new();
                if let Some(dup) = records.iter().find(|r| !seen.insert(r.task_id.clone())) {
                    return Err(StoreError::Corrupt(format!(
                        "{} lists task {} twice",
                        path.display(),
                        dup.task_id
                    )));
                }
                RecordTable::from_records(records)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => RecordTable::default(),
            Err(e) => return Err(e.into()),
        };
        tracing::debug!(path = %path.display(), "opened task store file");
        Ok(Self {
            path,
            table: RwLock::new(table),
            clock,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, table: &RecordTable) -> Result<(), StoreError> {
        let mut records: Vec<&TaskRecord> = table.records().collect();
        records.sort_by(|a, b| a.task_id.cmp(&b.task_id));
        let json = serde_json::to_vec_pretty(&records)?;

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl TaskStore for FileTaskStore {
    async fn create(&self, record: &TaskRecord) -> Result<bool, StoreError> {
        let mut table = self.table.write().await;
        let mut next = table.clone();
        let created = next.create(record);
        self.persist(&next).await?;
        *table = next;
        Ok(created)
    }

    async fn update(&self, task_id: &TaskId, patch: TaskPatch) -> Result<bool, StoreError> {
        let now = self.clock.now();
        let mut table = self.table.write().await;
        let mut next = table.clone();
        let updated = next.update(task_id, patch, now);
        if updated {
            self.persist(&next).await?;
            *table = next;
        }
        Ok(updated)
    }

    async fn get(&self, task_id: &TaskId) -> Result<Option<TaskRecord>, StoreError> {
        Ok(self.table.read().await.get(task_id))
    }

    async fn list(&self, query: &TaskQuery) -> Result<TaskPage, StoreError> {
        Ok(self.table.read().await.list(query))
    }

    async fn delete(&self, task_id: &TaskId) -> Result<bool, StoreError> {
        let mut table = self.table.write().await;
        let mut next = table.clone();
        let deleted = next.delete(task_id);
        if deleted {
            self.persist(&next).await?;
            *table = next;
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{PetProfile, TaskStatus};

    fn record(id: &str) -> TaskRecord {
        TaskRecord::new(TaskId::new(id), PetProfile::new("corgi", "tan", "dog"), SystemClock.now())
    }

    #[tokio::test]
    async fn records_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("tasks.json");

        {
            let store = FileTaskStore::open(&path).await.unwrap();
            store.create(&record("pet-a")).await.unwrap();
            store.create(&record("pet-b")).await.unwrap();
            store
                .update(
                    &TaskId::new("pet-a"),
                    TaskPatch::new().status(TaskStatus::Processing).progress(25),
                )
                .await
                .unwrap();
            store.delete(&TaskId::new("pet-b")).await.unwrap();
        }

        let reopened = FileTaskStore::open(&path).await.unwrap();
        let a = reopened.get(&TaskId::new("pet-a")).await.unwrap().unwrap();
        assert_eq!(a.status, TaskStatus::Processing);
        assert_eq!(a.progress, 25);
        assert_eq!(a.metadata.breed, "corgi");
        assert!(reopened.get(&TaskId::new("pet-b")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn failed_write_leaves_memory_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let state = dir.path().join("state");
        let path = state.join("tasks.json");
        let store = FileTaskStore::open(&path).await.unwrap();
        store.create(&record("pet-kept")).await.unwrap();

        // The parent directory turns into a plain file: every write fails.
        tokio::fs::remove_dir_all(&state).await.unwrap();
        tokio::fs::write(&state, b"in the way").await.unwrap();

        assert!(store.create(&record("pet-new")).await.is_err());
        assert!(store.get(&TaskId::new("pet-new")).await.unwrap().is_none());

        let patch = TaskPatch::new().status(TaskStatus::Processing).progress(10);
        assert!(store.update(&TaskId::new("pet-kept"), patch).await.is_err());
        let kept = store.get(&TaskId::new("pet-kept")).await.unwrap().unwrap();
        assert_eq!(kept.status, TaskStatus::Initialized);

        assert!(store.delete(&TaskId::new("pet-kept")).await.is_err());
        assert!(store.get(&TaskId::new("pet-kept")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn missing_file_is_an_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTaskStore::open(dir.path().join("none.json")).await.unwrap();
        assert_eq!(store.list(&TaskQuery::default()).await.unwrap().total, 0);
    }

    #[tokio::test]
    async fn garbage_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tasks.json");
        tokio::fs::write(&path, b"{not json").await.unwrap();

        let err = FileTaskStore::open(&path).await.err().unwrap();
        assert!(matches!(err, StoreError::Serde(_)));
    }

    #[tokio::test]
    async fn duplicate_ids_are_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tasks.json");
        let json = serde_json::to_vec(&vec![record("pet-x"), record("pet-x")]).unwrap();
        tokio::fs::write(&path, json).await.unwrap();

        let err = FileTaskStore::open(&path).await.err().unwrap();
        assert!(matches!(err, StoreError::Corrupt(_)));
    }
}
