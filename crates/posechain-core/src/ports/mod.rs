//! Ports - 抽象化レイヤー
//!
//! 各 trait はパイプラインの外側（生成サービス、メディア処理、永続化、時刻）への
//! インターフェースを提供し、実装の詳細を隠蔽します。
//! `impls` に開発用の実装（in-memory / simulated）があります。

pub mod clock;
pub mod generation;
pub mod id_generator;
pub mod media;
pub mod task_store;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::generation::{
    GenerationClient, ImageJobRequest, RemoteJobState, RemoteJobStatus, VideoJobRequest,
};
pub use self::id_generator::{TaskIdGenerator, UlidGenerator};
pub use self::media::{FrameIndex, GifOptions, MediaToolkit};
pub use self::task_store::{TaskPage, TaskQuery, TaskStore};
