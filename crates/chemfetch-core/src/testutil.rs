//! Test utilities: mock implementations of the core traits.
//!
//! Handwritten mocks for dependency injection in unit tests. All mocks use
//! `Arc<Mutex<_>>` for interior mutability, allowing test assertions on
//! recorded calls.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;

use crate::error::EngineError;
use crate::models::{ExtractedRecord, Job, RawDocument};
use crate::traits::{Extractor, Fetcher, ProgressSink};

// ---------------------------------------------------------------------------
// MockFetcher
// ---------------------------------------------------------------------------

type ResponseQueue = VecDeque<Result<RawDocument, EngineError>>;

/// Mock fetcher with per-identifier scripted responses.
///
/// By default every job succeeds with a document whose body echoes the
/// job's first identifier (which [`EchoExtractor`] turns back into a
/// record). Responses scripted for an identifier are consumed
/// front-to-back, then the default applies again — so "throttled twice,
/// then clean" is two scripted entries.
#[derive(Clone)]
pub struct MockFetcher {
    scripted: Arc<Mutex<HashMap<String, ResponseQueue>>>,
    calls: Arc<Mutex<Vec<String>>>,
    latency: Duration,
}

impl MockFetcher {
    /// Fetcher where every job succeeds.
    pub fn ok() -> Self {
        Self {
            scripted: Arc::new(Mutex::new(HashMap::new())),
            calls: Arc::new(Mutex::new(Vec::new())),
            latency: Duration::ZERO,
        }
    }

    /// Add a fixed per-call latency (for pool timing tests).
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Fail every fetch for `identifier` with the given error.
    pub fn failing_for(self, identifier: &str, error: EngineError) -> Self {
        self.scripted
            .lock()
            .unwrap()
            .entry(identifier.to_string())
            .or_default()
            .push_back(Err(error));
        self
    }

    /// Serve `count` throttled documents for `identifier` before falling
    /// back to the default clean response.
    pub fn throttled_for(self, identifier: &str, count: usize) -> Self {
        {
            let mut scripted = self.scripted.lock().unwrap();
            let queue = scripted.entry(identifier.to_string()).or_default();
            for _ in 0..count {
                queue.push_back(Ok(RawDocument::throttled(
                    "You reached the limit of allowed queries",
                )));
            }
        }
        self
    }

    /// Script an explicit response sequence for `identifier`.
    pub fn scripted_for(
        self,
        identifier: &str,
        responses: Vec<Result<RawDocument, EngineError>>,
    ) -> Self {
        self.scripted
            .lock()
            .unwrap()
            .entry(identifier.to_string())
            .or_default()
            .extend(responses);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// First identifier of every fetched job, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl Fetcher for MockFetcher {
    async fn fetch(&self, job: &Job) -> Result<RawDocument, EngineError> {
        let key = job.batch.identifiers()[0].clone();
        self.calls.lock().unwrap().push(key.clone());

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let response = {
            let mut scripted = self.scripted.lock().unwrap();
            scripted.get_mut(&key).and_then(|queue| queue.pop_front())
        };
        match response {
            Some(response) => response,
            None => Ok(RawDocument::ok(&key)),
        }
    }
}

// ---------------------------------------------------------------------------
// EchoExtractor
// ---------------------------------------------------------------------------

/// Extractor that turns a document body into one record keyed by the body.
///
/// Pairs with [`MockFetcher`]'s default response (body = identifier) so
/// engine tests can follow an identifier through the whole pipeline.
#[derive(Clone, Copy)]
pub struct EchoExtractor;

impl Extractor for EchoExtractor {
    fn extract(&self, doc: &RawDocument) -> Result<Vec<ExtractedRecord>, EngineError> {
        Ok(vec![
            ExtractedRecord::new(&doc.body).with_field("id", json!(doc.body)),
        ])
    }
}

// ---------------------------------------------------------------------------
// FailingExtractor
// ---------------------------------------------------------------------------

/// Extractor that always fails with an extraction error.
#[derive(Clone)]
pub struct FailingExtractor {
    message: String,
}

impl FailingExtractor {
    pub fn new(message: &str) -> Self {
        Self {
            message: message.to_string(),
        }
    }
}

impl Extractor for FailingExtractor {
    fn extract(&self, _doc: &RawDocument) -> Result<Vec<ExtractedRecord>, EngineError> {
        Err(EngineError::Extraction(self.message.clone()))
    }
}

// ---------------------------------------------------------------------------
// MockProgress
// ---------------------------------------------------------------------------

/// Progress sink that records every `(completed, total)` event.
#[derive(Clone, Default)]
pub struct MockProgress {
    events: Arc<Mutex<Vec<(usize, usize)>>>,
}

impl MockProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<(usize, usize)> {
        self.events.lock().unwrap().clone()
    }
}

impl ProgressSink for MockProgress {
    fn on_progress(&self, completed: usize, total: usize) {
        self.events.lock().unwrap().push((completed, total));
    }
}
