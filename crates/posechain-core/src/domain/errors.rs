//! Errors - エラー型と分類
//!
//! `PipelineError` is the one error every step, job and port call speaks.
//! The retry executor and the batch runner only look at [`ErrorKind`] to
//! decide what to do next.

use thiserror::Error;

use super::state::Step;

/// ErrorKind は実行エラーの分類
///
/// - Transient: 一時的なエラー（リトライ推奨）
/// - Permanent: 恒久的なエラー（リトライ無意味）
/// - Infrastructure: task store の障害
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transient,
    Permanent,
    Infrastructure,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("task store io: {0}")]
    Io(#[from] std::io::Error),

    #[error("task store serde: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("task store corrupt: {0}")]
    Corrupt(String),
}

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Network failure, timeout, 5xx.
    #[error("transient: {0}")]
    Transient(String),

    /// The generation service reported the job as failed.
    #[error("remote job failed: {0}")]
    RemoteJobFailed(String),

    /// The remote answered something we cannot interpret.
    #[error("protocol mismatch: {0}")]
    Protocol(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid input: {0}")]
    Validation(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("gave up after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        last: Box<PipelineError>,
    },

    #[error("step {step} left {} job(s) unfinished: {}", failed.len(), failed.join(", "))]
    BatchIncomplete { step: Step, failed: Vec<String> },
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::Transient(_)
            | PipelineError::RemoteJobFailed(_)
            | PipelineError::Io(_) => ErrorKind::Transient,
            PipelineError::Store(_) => ErrorKind::Infrastructure,
            PipelineError::Protocol(_)
            | PipelineError::NotFound(_)
            | PipelineError::Validation(_)
            | PipelineError::RetriesExhausted { .. }
            | PipelineError::BatchIncomplete { .. } => ErrorKind::Permanent,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }

    /// The innermost error, looking through `RetriesExhausted` wrappers.
    pub fn root_cause(&self) -> &PipelineError {
        let mut current = self;
        while let PipelineError::RetriesExhausted { last, .. } = current {
            current = last;
        }
        current
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::transient(PipelineError::Transient("503".into()), true)]
    #[case::remote_failed(PipelineError::RemoteJobFailed("nsfw".into()), true)]
    #[case::protocol(PipelineError::Protocol("no task_id".into()), false)]
    #[case::validation(PipelineError::Validation("missing rest pose".into()), false)]
    #[case::store(PipelineError::Store(StoreError::Corrupt("bad".into())), false)]
    fn retryable_classification(#[case] err: PipelineError, #[case] retryable: bool) {
        assert_eq!(err.is_retryable(), retryable);
    }

    #[test]
    fn root_cause_unwraps_exhaustion() {
        let err = PipelineError::RetriesExhausted {
            attempts: 4,
            last: Box::new(PipelineError::Transient("timeout".into())),
        };
        assert!(!err.is_retryable());
        assert!(matches!(err.root_cause(), PipelineError::Transient(m) if m == "timeout"));
        assert!(err.to_string().contains("4 attempts"));
    }

    #[test]
    fn batch_incomplete_lists_keys() {
        let err = PipelineError::BatchIncomplete {
            step: Step::LoopVideos,
            failed: vec!["sit".into(), "walk".into()],
        };
        assert_eq!(
            err.to_string(),
            "step loop_videos left 2 job(s) unfinished: sit, walk"
        );
    }
}
