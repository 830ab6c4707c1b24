use std::future::Future;

use crate::error::EngineError;
use crate::models::{ExtractedRecord, Job, RawDocument};

/// Performs the network round trip(s) for one job.
///
/// A source's fetch may be multi-step (acquire a token, submit, download a
/// result file); the steps run sequentially inside one `fetch` call and a
/// failure at any step surfaces as [`EngineError::Fetch`] with the stage
/// name. Implementations must be safe to call concurrently across jobs —
/// the injected HTTP client is the only shared state.
pub trait Fetcher: Send + Sync {
    fn fetch(&self, job: &Job) -> impl Future<Output = Result<RawDocument, EngineError>> + Send;
}

/// Turns a raw document into zero or more structured records.
///
/// Pure function of the document: no I/O, no shared state. A document that
/// indicates "no match" (rather than an error) yields an empty record set.
pub trait Extractor: Send + Sync {
    fn extract(&self, doc: &RawDocument) -> Result<Vec<ExtractedRecord>, EngineError>;
}

/// Receives one completion event per finished job. Observability only; has
/// no effect on engine correctness.
pub trait ProgressSink: Send + Sync {
    fn on_progress(&self, completed: usize, total: usize) {
        let _ = (completed, total);
    }
}

/// Progress sink that logs via the `tracing` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingProgress;

impl ProgressSink for TracingProgress {
    fn on_progress(&self, completed: usize, total: usize) {
        tracing::info!(completed, total, "Job finished");
    }
}

/// A no-op progress sink for callers that don't track progress.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullProgress;

impl ProgressSink for NullProgress {}
