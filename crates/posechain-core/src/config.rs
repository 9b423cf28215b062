//! Configuration loading.
//!
//! One TOML file, every section optional:
//!
//! ```toml
//! [pipeline]
//! output_dir = "output"
//! fatal_partial_steps = ["remaining_transitions"]
//!
//! [retry]
//! max_retries = 3
//! base_delay_secs = 60
//!
//! [batch]
//! max_concurrency = 3
//!
//! [store]
//! kind = "file"
//! path = "output/tasks.json"
//! ```

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::app::{GenerationSettings, PipelineConfig, PollPolicy};
use crate::batch::BatchPolicy;
use crate::domain::Step;
use crate::impls::SimulationProfile;
use crate::ports::GifOptions;
use crate::retry::RetryPolicy;

/// Overrides `[pipeline] output_dir`.
pub const OUTPUT_DIR_ENV: &str = "POSECHAIN_OUTPUT_DIR";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub pipeline: PipelineSection,
    pub retry: RetrySection,
    pub batch: BatchSection,
    pub polling: PollingSection,
    pub store: StoreSection,
    pub simulation: SimulationProfile,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PipelineSection {
    pub output_dir: PathBuf,
    pub resize_to_first: bool,
    pub fatal_partial_steps: Vec<Step>,
    pub gif_frame_skip: u32,
    pub gif_max_width: u32,
    pub generation: GenerationSettings,
}

impl Default for PipelineSection {
    fn default() -> Self {
        let gif = GifOptions::default();
        Self {
            output_dir: PathBuf::from("output"),
            resize_to_first: true,
            fatal_partial_steps: Vec::new(),
            gif_frame_skip: gif.frame_skip,
            gif_max_width: gif.max_width,
            generation: GenerationSettings::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RetrySection {
    pub max_retries: u32,
    pub base_delay_secs: u64,
    pub multiplier: f64,
    pub max_delay_secs: u64,
    pub jitter_secs: u64,
}

impl Default for RetrySection {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_retries: policy.max_retries,
            base_delay_secs: policy.base_delay.as_secs(),
            multiplier: policy.multiplier,
            max_delay_secs: policy.max_delay.as_secs(),
            jitter_secs: policy.jitter.as_secs(),
        }
    }
}

impl RetrySection {
    pub fn to_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_secs(self.base_delay_secs),
            multiplier: self.multiplier,
            max_delay: Duration::from_secs(self.max_delay_secs),
            jitter: Duration::from_secs(self.jitter_secs),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct BatchSection {
    pub max_concurrency: usize,
    pub max_rounds: u32,
    pub retry_delay_secs: u64,
}

impl Default for BatchSection {
    fn default() -> Self {
        let policy = BatchPolicy::default();
        Self {
            max_concurrency: policy.max_concurrency,
            max_rounds: policy.max_rounds,
            retry_delay_secs: policy.retry_delay.as_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PollingSection {
    pub image_interval_secs: u64,
    pub image_timeout_secs: u64,
    pub video_interval_secs: u64,
    pub video_timeout_secs: u64,
}

impl Default for PollingSection {
    fn default() -> Self {
        let (image, video) = (PollPolicy::image(), PollPolicy::video());
        Self {
            image_interval_secs: image.interval.as_secs(),
            image_timeout_secs: image.timeout.as_secs(),
            video_interval_secs: video.interval.as_secs(),
            video_timeout_secs: video.timeout.as_secs(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    #[default]
    Memory,
    File,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct StoreSection {
    pub kind: StoreKind,
    pub path: PathBuf,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            kind: StoreKind::Memory,
            path: PathBuf::from("output/tasks.json"),
        }
    }
}

impl Settings {
    /// Load from `path`, falling back to defaults when no file is given or
    /// the file does not exist, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut settings = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        settings.apply_overrides(|key| std::env::var(key).ok());
        Ok(settings)
    }

    fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "config file missing, using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        Self::from_toml(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml(raw: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }

    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(dir) = lookup(OUTPUT_DIR_ENV).filter(|d| !d.trim().is_empty()) {
            self.pipeline.output_dir = PathBuf::from(dir);
        }
    }

    pub fn to_pipeline_config(&self) -> PipelineConfig {
        let retry = self.retry.to_policy();
        let polling = &self.polling;
        PipelineConfig {
            output_root: self.pipeline.output_dir.clone(),
            retry: retry.clone(),
            batch: BatchPolicy {
                max_concurrency: self.batch.max_concurrency,
                max_rounds: self.batch.max_rounds,
                retry_delay: Duration::from_secs(self.batch.retry_delay_secs),
                job_retry: retry,
            },
            image_poll: PollPolicy {
                interval: Duration::from_secs(polling.image_interval_secs),
                timeout: Duration::from_secs(polling.image_timeout_secs),
            },
            video_poll: PollPolicy {
                interval: Duration::from_secs(polling.video_interval_secs),
                timeout: Duration::from_secs(polling.video_timeout_secs),
            },
            generation: self.pipeline.generation.clone(),
            gif: GifOptions {
                frame_skip: self.pipeline.gif_frame_skip,
                max_width: self.pipeline.gif_max_width,
            },
            resize_to_first: self.pipeline.resize_to_first,
            fatal_partial_steps: self
                .pipeline
                .fatal_partial_steps
                .iter()
                .copied()
                .collect::<BTreeSet<_>>(),
        }
    }
}
