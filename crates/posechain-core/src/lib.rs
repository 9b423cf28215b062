//! posechain-core
//!
//! Pipeline orchestration for pose-animation generation: one source image
//! in, pose images, transition clips, loop clips and one continuous video
//! out.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, pose, state, task, errors）
//! - **ports**: 抽象化レイヤー（TaskStore, GenerationClient, MediaToolkit, Clock）
//! - **retry**: RetryPolicy + 非同期リトライ実行
//! - **batch**: 並行 batch 実行（失敗分だけ次の round へ）
//! - **sequence**: 遷移クリップの再生順（Hierholzer）
//! - **app**: builder, step pipeline, status board
//! - **impls**: 実装（InMemoryTaskStore, FileTaskStore, シミュレーション用 client / toolkit）
//! - **config** / **observability**: TOML 設定と状態集計

pub mod app;
pub mod batch;
pub mod config;
pub mod domain;
pub mod impls;
pub mod observability;
pub mod ports;
pub mod retry;
pub mod sequence;
