//! Retry executor: run one fallible async operation under a [`RetryPolicy`].

pub mod executor;
pub mod policy;

pub use self::executor::{RetryEvent, execute};
pub use self::policy::RetryPolicy;
