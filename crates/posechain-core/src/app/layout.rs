//! Artifact layout under the output root.
//!
//! ```text
//! <root>/<task_id>/
//!   base_images/        sit.png, walk.png, ..., <clip>_first_frame.png
//!   videos/transitions/ <start>2<end>.mp4
//!   videos/loops/       <pose>.mp4
//!   gifs/transitions/
//!   gifs/loops/
//! ```

use std::path::{Path, PathBuf};

use crate::domain::{Pose, PipelineError, TaskId, Transition};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactLayout {
    task_dir: PathBuf,
}

impl ArtifactLayout {
    pub fn new(output_root: &Path, task_id: &TaskId) -> Self {
        Self {
            task_dir: output_root.join(task_id.as_str()),
        }
    }

    pub fn task_dir(&self) -> &Path {
        &self.task_dir
    }

    pub fn base_images(&self) -> PathBuf {
        self.task_dir.join("base_images")
    }

    pub fn transition_videos(&self) -> PathBuf {
        self.task_dir.join("videos").join("transitions")
    }

    pub fn loop_videos(&self) -> PathBuf {
        self.task_dir.join("videos").join("loops")
    }

    pub fn transition_gifs(&self) -> PathBuf {
        self.task_dir.join("gifs").join("transitions")
    }

    pub fn loop_gifs(&self) -> PathBuf {
        self.task_dir.join("gifs").join("loops")
    }

    pub async fn create_dirs(&self) -> Result<(), PipelineError> {
        for dir in [
            self.base_images(),
            self.transition_videos(),
            self.loop_videos(),
            self.transition_gifs(),
            self.loop_gifs(),
        ] {
            tokio::fs::create_dir_all(&dir).await?;
        }
        Ok(())
    }

    pub fn transparent_image(&self) -> PathBuf {
        self.base_images().join("transparent.png")
    }

    pub fn pose_image(&self, pose: Pose) -> PathBuf {
        self.base_images().join(format!("{pose}.png"))
    }

    pub fn first_frame(&self, transition: Transition) -> PathBuf {
        self.base_images().join(format!("{transition}_first_frame.png"))
    }

    pub fn last_frame(&self, transition: Transition) -> PathBuf {
        self.base_images().join(format!("{transition}_last_frame.png"))
    }

    pub fn transition_video(&self, transition: Transition) -> PathBuf {
        self.transition_videos().join(format!("{transition}.mp4"))
    }

    pub fn loop_video(&self, pose: Pose) -> PathBuf {
        self.loop_videos().join(format!("{pose}.mp4"))
    }

    pub fn transition_gif(&self, name: &str) -> PathBuf {
        self.transition_gifs().join(format!("{name}.gif"))
    }

    pub fn loop_gif(&self, name: &str) -> PathBuf {
        self.loop_gifs().join(format!("{name}.gif"))
    }

    pub fn concatenated_video(&self) -> PathBuf {
        self.task_dir.join("videos").join("continuous.mp4")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_nest_under_task_dir() {
        let layout = ArtifactLayout::new(Path::new("/out"), &TaskId::new("pet-1"));
        let t = Transition::SEEDS[0];
        assert_eq!(
            layout.transition_video(t),
            PathBuf::from("/out/pet-1/videos/transitions/sit2walk.mp4")
        );
        assert_eq!(
            layout.pose_image(Pose::Rest),
            PathBuf::from("/out/pet-1/base_images/rest.png")
        );
        assert_eq!(
            layout.loop_gif("sleep"),
            PathBuf::from("/out/pet-1/gifs/loops/sleep.gif")
        );
    }
}
