use serde::Serialize;
use serde_json::Value;

/// An ordered, non-empty group of identifiers dispatched as one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Batch(Vec<String>);

impl Batch {
    /// Build a batch from a non-empty identifier slice.
    ///
    /// Panics in debug builds if `identifiers` is empty; the batcher never
    /// produces empty batches.
    pub fn new(identifiers: Vec<String>) -> Self {
        debug_assert!(!identifiers.is_empty(), "batches are non-empty");
        Self(identifiers)
    }

    pub fn identifiers(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The batch joined with CR/LF separators, the submission format the
    /// batched sources expect.
    pub fn joined(&self) -> String {
        self.0.join("\r\n")
    }
}

/// One unit of dispatch: a batch of identifiers plus its sequence index.
///
/// `index` fixes the job's position in the input sequence so aggregation
/// is deterministic regardless of completion order. `attempts` counts
/// fetch attempts including throttle retries.
#[derive(Debug, Clone)]
pub struct Job {
    pub index: usize,
    pub batch: Batch,
    pub attempts: u32,
}

impl Job {
    pub fn new(index: usize, batch: Batch) -> Self {
        Self {
            index,
            batch,
            attempts: 0,
        }
    }

    /// Short display form of the job's identifiers for logs.
    pub fn describe(&self) -> String {
        let ids = self.batch.identifiers();
        match ids {
            [only] => only.clone(),
            _ => format!("batch of {}", ids.len()),
        }
    }
}

/// The unparsed server response for one job.
#[derive(Debug, Clone)]
pub struct RawDocument {
    pub body: String,
    pub status: u16,
    /// Set by the fetcher when the source's rate-limit marker was detected.
    pub throttled: bool,
    /// The identifiers of the job this document answers. Stamped by the
    /// engine after a successful fetch so extractors can tag their records.
    pub identifiers: Vec<String>,
}

impl RawDocument {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            status: 200,
            throttled: false,
            identifiers: Vec::new(),
        }
    }

    pub fn throttled(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            status: 200,
            throttled: true,
            identifiers: Vec::new(),
        }
    }

    /// First originating identifier, for single-identifier jobs.
    pub fn identifier(&self) -> Option<&str> {
        self.identifiers.first().map(String::as_str)
    }
}

/// One structured record extracted from a document.
///
/// `key` ties the record back to its originating identifier (for joins and
/// failure reporting). `fields` carry the source's stable column order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractedRecord {
    pub key: String,
    pub fields: Vec<(String, Value)>,
}

impl ExtractedRecord {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            fields: Vec::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: Value) -> Self {
        self.fields.push((name.into(), value));
        self
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }
}

/// Classifies a per-job failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureKind {
    Fetch,
    Extraction,
    RateLimited,
    Cancelled,
}

/// Terminal result of one dispatched job. Exactly one per job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum JobOutcome {
    Success {
        index: usize,
        records: Vec<ExtractedRecord>,
    },
    Failure {
        index: usize,
        /// The identifiers the failed job carried, so callers can tell
        /// which inputs produced no rows.
        identifiers: Vec<String>,
        kind: FailureKind,
        message: String,
    },
}

impl JobOutcome {
    pub fn index(&self) -> usize {
        match self {
            JobOutcome::Success { index, .. } | JobOutcome::Failure { index, .. } => *index,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, JobOutcome::Success { .. })
    }
}

/// An ordered table of column-aligned rows, the final output of one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResultTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl ResultTable {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Cell value at (row, column name), if both exist.
    pub fn cell(&self, row: usize, column: &str) -> Option<&Value> {
        let col = self.column_index(column)?;
        self.rows.get(row)?.get(col)
    }
}

/// Per-run success/failure tally. Each job lands in exactly one bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SummaryCounts {
    pub succeeded: usize,
    pub failed: usize,
    pub total: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_batch_joined_uses_crlf() {
        let batch = Batch::new(vec!["CCO".into(), "C1CCCCC1".into()]);
        assert_eq!(batch.joined(), "CCO\r\nC1CCCCC1");
    }

    #[test]
    fn test_job_describe() {
        let single = Job::new(0, Batch::new(vec!["CCO".into()]));
        assert_eq!(single.describe(), "CCO");

        let many = Job::new(1, Batch::new(vec!["CCO".into(), "CCN".into()]));
        assert_eq!(many.describe(), "batch of 2");
    }

    #[test]
    fn test_record_field_lookup() {
        let record = ExtractedRecord::new("CCO")
            .with_field("SMILES", json!("CCO"))
            .with_field("LD50", json!(1500));

        assert_eq!(record.field("LD50"), Some(&json!(1500)));
        assert_eq!(record.field("missing"), None);
    }

    #[test]
    fn test_outcome_index() {
        let ok = JobOutcome::Success {
            index: 3,
            records: vec![],
        };
        let err = JobOutcome::Failure {
            index: 7,
            identifiers: vec!["CCO".into()],
            kind: FailureKind::Fetch,
            message: "HTTP 500".into(),
        };
        assert_eq!(ok.index(), 3);
        assert!(ok.is_success());
        assert_eq!(err.index(), 7);
        assert!(!err.is_success());
    }

    #[test]
    fn test_table_cell_lookup() {
        let table = ResultTable {
            columns: vec!["SMILES".into(), "LD50".into()],
            rows: vec![vec![json!("CCO"), json!(1500)]],
        };
        assert_eq!(table.cell(0, "LD50"), Some(&json!(1500)));
        assert_eq!(table.cell(0, "nope"), None);
        assert_eq!(table.cell(1, "LD50"), None);
    }
}
