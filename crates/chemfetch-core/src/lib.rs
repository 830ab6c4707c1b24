pub mod aggregate;
pub mod backoff;
pub mod batch;
pub mod config;
pub mod engine;
pub mod error;
pub mod models;
pub mod testutil;
pub mod traits;

pub use aggregate::{aggregate, left_join, table_from_records};
pub use config::{EngineConfig, ThrottlePolicy};
pub use engine::Engine;
pub use error::EngineError;
pub use models::{
    Batch, ExtractedRecord, FailureKind, Job, JobOutcome, RawDocument, ResultTable, SummaryCounts,
};
pub use traits::{Extractor, Fetcher, NullProgress, ProgressSink, TracingProgress};
