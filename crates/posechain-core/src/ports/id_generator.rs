//! TaskIdGenerator port - ID 生成の抽象化
//!
//! 呼び出し側が task id を指定しなかった場合だけ使われます。

use crate::domain::ids::TaskId;
use crate::ports::Clock;
use ulid::Ulid;

/// TaskIdGenerator は task id を生成
///
/// # Thread Safety
/// - `Send + Sync` を要求（複数スレッドから使える）
pub trait TaskIdGenerator: Send + Sync {
    fn generate_task_id(&self) -> TaskId;
}

/// UlidGenerator は Clock の時刻から `pet-<ULID>` を作る
///
/// FixedClock を渡せば timestamp 部分が固定される。
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }
}

impl<C: Clock> TaskIdGenerator for UlidGenerator<C> {
    fn generate_task_id(&self) -> TaskId {
        let timestamp_ms = self.clock.now().timestamp_millis() as u64;
        let ulid = Ulid::from_parts(timestamp_ms, rand::random());
        TaskId::from_ulid(ulid)
    }
}
