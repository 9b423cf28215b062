//! SimulatedMediaToolkit - 実際のデコード/エンコードをしない MediaToolkit
//!
//! Checks that inputs exist and writes a short text placeholder describing
//! the operation to the destination.

use std::path::{Path, PathBuf};

use crate::domain::PipelineError;
use crate::ports::{FrameIndex, GifOptions, MediaToolkit};

#[derive(Debug, Clone, Copy, Default)]
pub struct SimulatedMediaToolkit;

impl SimulatedMediaToolkit {
    pub fn new() -> Self {
        Self
    }
}

async fn require(input: &Path) -> Result<(), PipelineError> {
    match tokio::fs::metadata(input).await {
        Ok(meta) if meta.is_file() => Ok(()),
        Ok(_) => Err(PipelineError::Validation(format!(
            "{} is not a file",
            input.display()
        ))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(PipelineError::NotFound(
            format!("media input {}", input.display()),
        )),
        Err(e) => Err(e.into()),
    }
}

async fn write_placeholder(destination: &Path, body: String) -> Result<PathBuf, PipelineError> {
    if let Some(parent) = destination.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(destination, body).await?;
    Ok(destination.to_path_buf())
}

#[async_trait::async_trait]
impl MediaToolkit for SimulatedMediaToolkit {
    async fn remove_background(
        &self,
        image: &Path,
        destination: &Path,
    ) -> Result<PathBuf, PipelineError> {
        require(image).await?;
        write_placeholder(destination, format!("transparent {}", image.display())).await
    }

    async fn extract_frame(
        &self,
        video: &Path,
        index: FrameIndex,
        destination: &Path,
    ) -> Result<PathBuf, PipelineError> {
        require(video).await?;
        write_placeholder(destination, format!("frame {index:?} of {}", video.display())).await
    }

    async fn encode_gif(
        &self,
        video: &Path,
        options: GifOptions,
        destination: &Path,
    ) -> Result<PathBuf, PipelineError> {
        require(video).await?;
        write_placeholder(
            destination,
            format!(
                "gif of {} (every {} frames, max width {})",
                video.display(),
                options.frame_skip,
                options.max_width
            ),
        )
        .await
    }

    async fn concatenate(
        &self,
        videos: &[PathBuf],
        resize_to_first: bool,
        destination: &Path,
    ) -> Result<PathBuf, PipelineError> {
        if videos.is_empty() {
            return Err(PipelineError::Validation("nothing to concatenate".into()));
        }
        let mut body = format!("concat resize_to_first={resize_to_first}\n");
        for video in videos {
            require(video).await?;
            body.push_str(&video.display().to_string());
            body.push('\n');
        }
        write_placeholder(destination, body).await
    }
}
