//! The concurrent retrieval engine: a bounded worker pool running the
//! fetch → backoff → extract pipeline for every job in one `run`.
//!
//! Generic over all external dependencies via traits, enabling dependency
//! injection and testability without real HTTP calls.

use std::sync::atomic::{AtomicUsize, Ordering};

use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::backoff::{BackoffController, ThrottleDecision};
use crate::batch;
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::models::{FailureKind, Job, JobOutcome};
use crate::traits::{Extractor, Fetcher, ProgressSink};

/// Drives all jobs for one input sequence under a bounded concurrency
/// limit, isolating failures per job.
pub struct Engine<F, X, P>
where
    F: Fetcher,
    X: Extractor,
    P: ProgressSink,
{
    fetcher: F,
    extractor: X,
    progress: P,
    config: EngineConfig,
}

impl<F, X, P> Engine<F, X, P>
where
    F: Fetcher,
    X: Extractor,
    P: ProgressSink,
{
    /// Build an engine, validating the configuration up front.
    pub fn new(
        fetcher: F,
        extractor: X,
        progress: P,
        config: EngineConfig,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self {
            fetcher,
            extractor,
            progress,
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run the pipeline for every identifier and collect one outcome per
    /// job, in completion order.
    ///
    /// At most `max_workers` jobs are in flight at a time. Per-job errors
    /// never abort siblings; the only mid-run abort is the opt-in
    /// `abort_on_rate_limit` policy, which cancels the remaining jobs and
    /// surfaces [`EngineError::RateLimited`]. Empty input returns
    /// immediately with no network calls and no progress events.
    pub async fn run(
        &self,
        identifiers: &[String],
        cancel: &CancellationToken,
    ) -> Result<Vec<JobOutcome>, EngineError> {
        let jobs = batch::split(identifiers, self.config.max_batch_size);
        let total = jobs.len();
        if total == 0 {
            return Ok(Vec::new());
        }

        tracing::info!(
            identifiers = identifiers.len(),
            jobs = total,
            workers = self.config.max_workers,
            "Starting run"
        );

        let completed = AtomicUsize::new(0);
        let stream = stream::iter(jobs)
            .map(|job| {
                let completed = &completed;
                async move {
                    let outcome = self.process_job(job, cancel).await;
                    let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                    self.progress.on_progress(done, total);
                    outcome
                }
            })
            .buffer_unordered(self.config.max_workers);
        futures::pin_mut!(stream);

        // Single collector task: outcomes accumulate here, never via
        // concurrent appends from the workers themselves.
        let mut outcomes: Vec<JobOutcome> = Vec::with_capacity(total);
        while let Some(outcome) = stream.next().await {
            let rate_limited = matches!(
                outcome,
                JobOutcome::Failure {
                    kind: FailureKind::RateLimited,
                    ..
                }
            );
            outcomes.push(outcome);

            if rate_limited && self.config.abort_on_rate_limit {
                tracing::error!("Rate limited and abort_on_rate_limit set, cancelling run");
                cancel.cancel();
                return Err(EngineError::RateLimited);
            }
        }

        let succeeded = outcomes.iter().filter(|o| o.is_success()).count();
        tracing::info!(succeeded, failed = total - succeeded, total, "Run complete");
        Ok(outcomes)
    }

    /// One job's pipeline: fetch, loop through throttle waits, extract.
    /// Every error is converted into a `Failure` outcome here.
    async fn process_job(&self, mut job: Job, cancel: &CancellationToken) -> JobOutcome {
        if cancel.is_cancelled() {
            return failure(&job, FailureKind::Cancelled, "run cancelled before dispatch");
        }

        let mut backoff = BackoffController::new(self.config.throttle.clone());

        loop {
            job.attempts += 1;
            let doc = match self.fetcher.fetch(&job).await {
                Ok(mut doc) => {
                    doc.identifiers = job.batch.identifiers().to_vec();
                    doc
                }
                Err(e) => {
                    tracing::warn!(
                        job = %job.describe(),
                        attempts = job.attempts,
                        error = %e,
                        "Fetch failed"
                    );
                    return failure(&job, FailureKind::Fetch, &e.to_string());
                }
            };

            match backoff.observe(&doc) {
                ThrottleDecision::Proceed => {
                    return match self.extractor.extract(&doc) {
                        Ok(records) => {
                            tracing::debug!(
                                job = %job.describe(),
                                records = records.len(),
                                "Job succeeded"
                            );
                            JobOutcome::Success {
                                index: job.index,
                                records,
                            }
                        }
                        Err(e) => {
                            tracing::warn!(job = %job.describe(), error = %e, "Extraction failed");
                            failure(&job, FailureKind::Extraction, &e.to_string())
                        }
                    };
                }
                ThrottleDecision::Wait(wait) => {
                    tracing::warn!(
                        job = %job.describe(),
                        wait_secs = wait.as_secs(),
                        retry = backoff.retries(),
                        "Rate limited, backing off"
                    );
                    tokio::select! {
                        () = tokio::time::sleep(wait) => {}
                        () = cancel.cancelled() => {
                            return failure(
                                &job,
                                FailureKind::Cancelled,
                                "run cancelled during throttle wait",
                            );
                        }
                    }
                }
                ThrottleDecision::GiveUp => {
                    tracing::warn!(job = %job.describe(), "Rate limited, giving up");
                    return failure(&job, FailureKind::RateLimited, "rate limit exceeded");
                }
            }
        }
    }
}

fn failure(job: &Job, kind: FailureKind, message: &str) -> JobOutcome {
    JobOutcome::Failure {
        index: job.index,
        identifiers: job.batch.identifiers().to_vec(),
        kind,
        message: message.to_string(),
    }
}
