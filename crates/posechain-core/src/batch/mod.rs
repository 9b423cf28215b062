//! Concurrent batch runner: independent jobs, bounded concurrency, retry
//! rounds over the failed subset only.

pub mod runner;

pub use self::runner::{BatchJob, BatchObserver, BatchPolicy, BatchReport, BatchRunner};
