//! PipelineBuilder - パイプラインの構築とワイヤリング
//!
//! # Fail-fast 設計
//! - store / generation / media は必須。欠けていれば build() が BuildError を返す
//! - clock と id generator は省略可（SystemClock / ULID）
//! - 明らかに動かない設定（並列度 0 など）も build() 時に弾く

use std::sync::Arc;

use crate::ports::{
    Clock, GenerationClient, MediaToolkit, SystemClock, TaskIdGenerator, TaskStore, UlidGenerator,
};

use super::pipeline::{PipelineConfig, StepPipeline};
use super::remote::RemoteJobDriver;

/// PipelineBuilder は StepPipeline を構築
///
/// # 使用例
/// ```ignore
/// let pipeline = PipelineBuilder::new()
///     .store(Arc::new(InMemoryTaskStore::new()))
///     .generation(Arc::new(SimulatedGenerationClient::default()))
///     .media(Arc::new(SimulatedMediaToolkit))
///     .config(config)
///     .build()?;
/// ```
#[derive(Default)]
pub struct PipelineBuilder {
    store: Option<Arc<dyn TaskStore>>,
    generation: Option<Arc<dyn GenerationClient>>,
    media: Option<Arc<dyn MediaToolkit>>,
    clock: Option<Arc<dyn Clock>>,
    ids: Option<Arc<dyn TaskIdGenerator>>,
    config: PipelineConfig,
}

/// BuildError はパイプライン構築時のエラー
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum BuildError {
    #[error("Missing collaborators: {0:?}. These must be set before build().")]
    Missing(Vec<&'static str>),

    #[error("Invalid pipeline config: {0}")]
    InvalidConfig(String),
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(mut self, store: Arc<dyn TaskStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn generation(mut self, client: Arc<dyn GenerationClient>) -> Self {
        self.generation = Some(client);
        self
    }

    pub fn media(mut self, media: Arc<dyn MediaToolkit>) -> Self {
        self.media = Some(media);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn id_generator(mut self, ids: Arc<dyn TaskIdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Result<StepPipeline, BuildError> {
        let mut missing = Vec::new();
        if self.store.is_none() {
            missing.push("store");
        }
        if self.generation.is_none() {
            missing.push("generation");
        }
        if self.media.is_none() {
            missing.push("media");
        }
        let (Some(store), Some(generation), Some(media)) =
            (self.store, self.generation, self.media)
        else {
            return Err(BuildError::Missing(missing));
        };

        let config = self.config;
        if config.batch.max_concurrency == 0 {
            return Err(BuildError::InvalidConfig(
                "batch.max_concurrency must be at least 1".into(),
            ));
        }
        if config.batch.max_rounds == 0 {
            return Err(BuildError::InvalidConfig(
                "batch.max_rounds must be at least 1".into(),
            ));
        }
        for policy in [&config.retry, &config.batch.job_retry] {
            policy.validate().map_err(BuildError::InvalidConfig)?;
        }
        if config.image_poll.interval.is_zero() || config.video_poll.interval.is_zero() {
            return Err(BuildError::InvalidConfig(
                "poll interval must be non-zero".into(),
            ));
        }

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let ids = self
            .ids
            .unwrap_or_else(|| Arc::new(UlidGenerator::new(Arc::clone(&clock))));
        let driver = RemoteJobDriver::new(generation, config.image_poll, config.video_poll);

        Ok(StepPipeline {
            store,
            driver: Arc::new(driver),
            media,
            clock,
            ids,
            config,
        })
    }
}
