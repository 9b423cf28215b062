//! Domain model (ids, poses, steps, task records, errors).

pub mod errors;
pub mod ids;
pub mod pose;
pub mod state;
pub mod task;

pub use self::errors::{ErrorKind, PipelineError, StoreError};
pub use self::ids::{RemoteJobId, TaskId};
pub use self::pose::{Pose, PoseParseError, Transition};
pub use self::state::{Step, TaskStatus};
pub use self::task::{PatchRejection, PetProfile, StepResults, TaskPatch, TaskRecord};
