//! MediaToolkit port - フレーム抽出 / GIF / 連結 / 背景除去
//!
//! Every operation writes its output to a caller-chosen path and returns it.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::domain::PipelineError;

/// Which frame of a clip to extract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrameIndex {
    First,
    Last,
    At(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GifOptions {
    /// Keep one frame out of every `frame_skip`.
    pub frame_skip: u32,
    pub max_width: u32,
}

impl Default for GifOptions {
    fn default() -> Self {
        Self {
            frame_skip: 2,
            max_width: 480,
        }
    }
}

#[async_trait::async_trait]
pub trait MediaToolkit: Send + Sync {
    /// Produce a copy of `image` with a transparent background.
    async fn remove_background(
        &self,
        image: &Path,
        destination: &Path,
    ) -> Result<PathBuf, PipelineError>;

    async fn extract_frame(
        &self,
        video: &Path,
        index: FrameIndex,
        destination: &Path,
    ) -> Result<PathBuf, PipelineError>;

    async fn encode_gif(
        &self,
        video: &Path,
        options: GifOptions,
        destination: &Path,
    ) -> Result<PathBuf, PipelineError>;

    /// Join `videos` in order. With `resize_to_first` every clip is scaled
    /// to the first clip's resolution.
    async fn concatenate(
        &self,
        videos: &[PathBuf],
        resize_to_first: bool,
        destination: &Path,
    ) -> Result<PathBuf, PipelineError>;
}
