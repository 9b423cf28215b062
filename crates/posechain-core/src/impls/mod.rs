//! Impls - ポートの開発用実装
//!
//! - InMemoryTaskStore / FileTaskStore: TaskStore
//! - SimulatedGenerationClient: GenerationClient（ネットワークなし）
//! - SimulatedMediaToolkit: MediaToolkit（プレースホルダファイルを書く）

mod table;

pub mod file_store;
pub mod inmem_store;
pub mod simulated_generation;
pub mod simulated_media;

pub use self::file_store::FileTaskStore;
pub use self::inmem_store::InMemoryTaskStore;
pub use self::simulated_generation::{SimulatedGenerationClient, SimulationProfile};
pub use self::simulated_media::SimulatedMediaToolkit;
