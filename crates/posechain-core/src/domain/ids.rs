//! Domain identifiers (strongly-typed IDs).
//!
//! Task ids are opaque strings: callers may bring their own (`pet_1712345678`
//! from an upload form, for example), and ids we generate ourselves are
//! `<prefix><ULID>` so they still sort by creation time.
//!
//! ## Phantom Type パターン
//! `Id<T>` で共通実装を持ち、`T` はマーカー型（実行時にはメモリを消費しない）。
//! TaskId と RemoteJobId はどちらも文字列だが、型としては混同できない。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use ulid::Ulid;

/// IdMarker は各 ID 型のマーカー trait
///
/// 生成 ID に付けるプレフィックス（"pet-", "job-"）を提供します。
pub trait IdMarker: Send + Sync + 'static {
    fn prefix() -> &'static str;
}

/// Generic string-backed id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id<T: IdMarker> {
    value: String,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    /// Wrap an existing identifier as-is.
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            _marker: PhantomData,
        }
    }

    /// ULID から Id を作成（プレフィックス付き）
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self::new(format!("{}{}", T::prefix(), ulid))
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }
}

impl<T: IdMarker> From<&str> for Id<T> {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl<T: IdMarker> From<String> for Id<T> {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

// ========================================
// マーカー型の定義
// ========================================

/// Task のマーカー型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Task {}

impl IdMarker for Task {
    fn prefix() -> &'static str {
        "pet-"
    }
}

/// Remote generation job のマーカー型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RemoteJob {}

impl IdMarker for RemoteJob {
    fn prefix() -> &'static str {
        "job-"
    }
}

/// Identifier of a pipeline task (one subject, one full animation set).
pub type TaskId = Id<Task>;

/// Identifier handed back by the generation service for one submitted job.
pub type RemoteJobId = Id<RemoteJob>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caller_supplied_ids_are_kept_verbatim() {
        let id = TaskId::new("pet_1712345678");
        assert_eq!(id.as_str(), "pet_1712345678");
        assert_eq!(id.to_string(), "pet_1712345678");
    }

    #[test]
    fn generated_ids_carry_prefix() {
        let task = TaskId::from_ulid(Ulid::new());
        let job = RemoteJobId::from_ulid(Ulid::new());
        assert!(task.as_str().starts_with("pet-"));
        assert!(job.as_str().starts_with("job-"));
    }

    #[test]
    fn ids_serialize_as_plain_strings() {
        let id = TaskId::new("pet-abc");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"pet-abc\"");

        let back: TaskId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn ulid_ids_are_sortable() {
        let id1 = TaskId::from_ulid(Ulid::new());
        std::thread::sleep(std::time::Duration::from_millis(2));
        let id2 = TaskId::from_ulid(Ulid::new());
        assert!(id1 < id2);
    }
}
