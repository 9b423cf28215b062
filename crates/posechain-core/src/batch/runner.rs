//! Batch runner.
//!
//! Design:
//! - One round = every pending job spawned on a `JoinSet`, gated by a
//!   `Semaphore` with `concurrency` permits.
//! - Each job runs under the batch's per-job `RetryPolicy`.
//! - After a round only keys that failed with a retryable error stay
//!   pending; the rest are reported failed right away. The next round waits
//!   `retry_delay` and runs with one permit fewer (never below 1).
//! - Outcomes are keyed by job key; completion order never matters.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::domain::PipelineError;
use crate::retry::{self, RetryPolicy};

/// One independent unit of work in a batch.
///
/// A job owns its inputs (start image, prompt, ...) so it can be re-run in a
/// later round without the caller's help.
#[async_trait::async_trait]
pub trait BatchJob: Send + Sync + 'static {
    type Output: Send + 'static;

    /// Unique within one batch.
    fn key(&self) -> &str;

    async fn run(&self) -> Result<Self::Output, PipelineError>;
}

/// Notified from worker tasks whenever a job attempt settles.
#[async_trait::async_trait]
pub trait BatchObserver: Send + Sync {
    async fn on_job_finished(&self, key: &str, round: u32, outcome: Result<(), &PipelineError>);
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchPolicy {
    pub max_concurrency: usize,
    pub max_rounds: u32,
    pub retry_delay: Duration,
    /// Applied to every job inside a round.
    pub job_retry: RetryPolicy,
}

impl Default for BatchPolicy {
    fn default() -> Self {
        Self {
            max_concurrency: 3,
            max_rounds: 3,
            retry_delay: Duration::from_secs(30),
            job_retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug)]
pub struct BatchReport<T> {
    pub succeeded: BTreeMap<String, T>,
    /// Key -> last error message.
    pub failed: BTreeMap<String, String>,
    /// Rounds actually run.
    pub rounds: u32,
}

impl<T> BatchReport<T> {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn failed_keys(&self) -> Vec<String> {
        self.failed.keys().cloned().collect()
    }
}

/// Last failure of one job within a round.
#[derive(Debug)]
struct JobFailure {
    message: String,
    /// `false` keeps the key out of later rounds.
    retryable: bool,
}

#[derive(Debug, Clone, Default)]
pub struct BatchRunner {
    policy: BatchPolicy,
}

impl BatchRunner {
    pub fn new(policy: BatchPolicy) -> Self {
        Self { policy }
    }

    pub async fn run<J: BatchJob>(
        &self,
        jobs: Vec<J>,
        observer: Option<Arc<dyn BatchObserver>>,
    ) -> BatchReport<J::Output> {
        let mut pending: BTreeMap<String, Arc<J>> = BTreeMap::new();
        for job in jobs {
            let key = job.key().to_string();
            if pending.contains_key(&key) {
                tracing::warn!(key = %key, "duplicate batch key, keeping the first job");
                continue;
            }
            pending.insert(key, Arc::new(job));
        }

        let mut report = BatchReport {
            succeeded: BTreeMap::new(),
            failed: BTreeMap::new(),
            rounds: 0,
        };
        let mut concurrency = self.policy.max_concurrency.max(1);

        for round in 1..=self.policy.max_rounds.max(1) {
            if pending.is_empty() {
                break;
            }
            if round > 1 {
                concurrency = concurrency.saturating_sub(1).max(1);
                tracing::info!(
                    round,
                    pending = pending.len(),
                    delay_ms = self.policy.retry_delay.as_millis() as u64,
                    "retrying failed batch jobs"
                );
                tokio::time::sleep(self.policy.retry_delay).await;
            }
            report.rounds = round;

            let mut outcomes = self
                .run_round(round, concurrency, &pending, observer.clone())
                .await;

            for (key, job) in std::mem::take(&mut pending) {
                match outcomes.remove(&key) {
                    Some(Ok(output)) => {
                        report.failed.remove(&key);
                        report.succeeded.insert(key, output);
                    }
                    Some(Err(failure)) => {
                        report.failed.insert(key.clone(), failure.message);
                        if failure.retryable {
                            pending.insert(key, job);
                        } else {
                            tracing::warn!(key = %key, "non-retryable failure, not resubmitting");
                        }
                    }
                    None => {
                        report.failed.insert(key.clone(), "job panicked".to_string());
                        pending.insert(key, job);
                    }
                }
            }
        }

        tracing::info!(
            rounds = report.rounds,
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            "batch finished"
        );
        report
    }

    #[tracing::instrument(skip(self, pending, observer), fields(jobs = pending.len()))]
    async fn run_round<J: BatchJob>(
        &self,
        round: u32,
        concurrency: usize,
        pending: &BTreeMap<String, Arc<J>>,
        observer: Option<Arc<dyn BatchObserver>>,
    ) -> HashMap<String, Result<J::Output, JobFailure>> {
        let semaphore = Arc::new(Semaphore::new(concurrency));
        let mut set = JoinSet::new();

        for (key, job) in pending {
            let key = key.clone();
            let job = Arc::clone(job);
            let semaphore = Arc::clone(&semaphore);
            let policy = self.policy.job_retry.clone();
            let observer = observer.clone();

            set.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    let failure = JobFailure {
                        message: "batch semaphore closed".to_string(),
                        retryable: true,
                    };
                    return (key, Err(failure));
                };

                let result = retry::execute(&policy, || job.run(), None).await;

                if let Some(observer) = &observer {
                    observer
                        .on_job_finished(&key, round, result.as_ref().map(|_| ()))
                        .await;
                }
                match &result {
                    Ok(_) => tracing::debug!(key = %key, "batch job succeeded"),
                    Err(e) => tracing::warn!(key = %key, error = %e, "batch job failed"),
                }
                let result = result.map_err(|e| {
                    let cause = e.root_cause();
                    JobFailure {
                        message: cause.to_string(),
                        retryable: cause.is_retryable(),
                    }
                });
                (key, result)
            });
        }

        let mut outcomes = HashMap::with_capacity(pending.len());
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((key, result)) => {
                    outcomes.insert(key, result);
                }
                // The key is recovered by its absence from `outcomes`.
                Err(e) => tracing::error!(error = %e, "batch job task aborted"),
            }
        }
        outcomes
    }
}
