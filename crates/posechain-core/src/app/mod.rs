//! App - パイプラインの組み立てと実行
//!
//! - builder: collaborators → StepPipeline（fail-fast）
//! - pipeline: step state machine
//! - steps: step bodies and their batch jobs
//! - remote: submit → poll → download
//! - status: shared progress board
//! - prompts / layout: prompt text and artifact paths

pub mod builder;
pub mod layout;
pub mod pipeline;
pub mod prompts;
pub mod remote;
pub mod status;
mod steps;

pub use self::builder::{BuildError, PipelineBuilder};
pub use self::layout::ArtifactLayout;
pub use self::pipeline::{GenerationSettings, PipelineConfig, PipelineRequest, StepPipeline};
pub use self::remote::{PollPolicy, RemoteJobDriver};
pub use self::status::{BatchProgress, StatusBoard};
