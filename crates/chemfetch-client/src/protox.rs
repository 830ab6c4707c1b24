//! Acute-toxicity predictions from the ProTox similarity search.
//!
//! Per-identifier source. The server throttles by quota and answers
//! over-limit callers with a normal page carrying a marker text; the
//! fetcher flags it so the engine's backoff policy can wait it out (or
//! fail the job, per configuration).

use chemfetch_core::aggregate::aggregate;
use chemfetch_core::config::{EngineConfig, ThrottlePolicy};
use chemfetch_core::engine::Engine;
use chemfetch_core::error::EngineError;
use chemfetch_core::models::{ExtractedRecord, Job, RawDocument, ResultTable, SummaryCounts};
use chemfetch_core::traits::{Extractor, Fetcher, TracingProgress};
use scraper::{Html, Selector};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

use crate::encode::StructureEncoder;
use crate::http::HttpClient;

pub const BASE_URL: &str =
    "https://tox.charite.de/protox3/index.php?site=compound_search_similarity";

/// Marker text the server embeds when the query quota is exhausted.
pub const THROTTLE_MARKER: &str = "You reached the limit of allowed queries";

/// The `<h1>` labels carrying prediction values on the results page, with
/// the column each maps to.
const LABELS: [(&str, &str); 4] = [
    ("Predicted LD50", "Predicted LD50"),
    ("Predicted Toxicity Class", "Toxicity Class"),
    ("Average similarity", "Average Similarity"),
    ("Prediction accuracy", "Prediction Accuracy"),
];

/// Submits one compound to the similarity search.
#[derive(Clone)]
pub struct ProtoxFetcher<E: StructureEncoder> {
    http: HttpClient,
    encoder: E,
}

impl<E: StructureEncoder> ProtoxFetcher<E> {
    pub fn new(http: HttpClient, encoder: E) -> Self {
        Self { http, encoder }
    }
}

impl<E: StructureEncoder> Fetcher for ProtoxFetcher<E> {
    async fn fetch(&self, job: &Job) -> Result<RawDocument, EngineError> {
        let smiles = &job.batch.identifiers()[0];
        let molblock = self
            .encoder
            .molblock(smiles)
            .map_err(|e| EngineError::fetch("encode", e.to_string()))?;

        let mut doc = self
            .http
            .post_form(
                BASE_URL,
                &[
                    ("smilesString", molblock.as_str()),
                    ("defaultName", "Tamoxifen"),
                    ("smiles", smiles.as_str()),
                    ("pubchem_name", ""),
                ],
                &[],
                "submit",
            )
            .await?;

        if doc.body.contains(THROTTLE_MARKER) {
            tracing::warn!(smiles = %smiles, "Rate limit marker in response");
            doc.throttled = true;
        }
        Ok(doc)
    }
}

/// Reads the `<h1>` label/value pairs off a results page.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProtoxExtractor;

impl Extractor for ProtoxExtractor {
    fn extract(&self, doc: &RawDocument) -> Result<Vec<ExtractedRecord>, EngineError> {
        let smiles = doc.identifier().unwrap_or_default().to_string();
        let document = Html::parse_document(&doc.body);
        let h1 = Selector::parse("h1").map_err(|e| EngineError::Extraction(e.to_string()))?;

        let headings: Vec<String> = document
            .select(&h1)
            .map(|el| el.text().collect::<String>())
            .collect();

        let value_for = |label: &str| -> Value {
            headings
                .iter()
                .find(|text| text.contains(label))
                .and_then(|text| text.rsplit(':').next())
                .map(|raw| raw.trim())
                .filter(|raw| !raw.is_empty())
                .map_or(Value::Null, |raw| Value::String(raw.to_string()))
        };

        // No prediction headings at all means the compound wasn't matched;
        // that's an empty result, not an error.
        if LABELS
            .iter()
            .all(|(label, _)| !headings.iter().any(|text| text.contains(label)))
        {
            return Ok(Vec::new());
        }

        let mut record = ExtractedRecord::new(&smiles).with_field("SMILES", json!(smiles));
        for (label, column) in LABELS {
            record = record.with_field(column, value_for(label));
        }
        Ok(vec![record])
    }
}

/// ProTox source: per-compound retrieval with throttle backoff.
#[derive(Debug)]
pub struct Protox<E: StructureEncoder + Clone> {
    http: HttpClient,
    encoder: E,
    config: EngineConfig,
}

impl<E: StructureEncoder + Clone> Protox<E> {
    /// Defaults matching observed service behaviour: 4 workers, fail fast
    /// on throttle, 10 minute wait when auto-resume is enabled.
    pub fn new(encoder: E) -> Result<Self, EngineError> {
        Self::with_config(encoder, EngineConfig::default().with_max_workers(4))
    }

    pub fn with_config(encoder: E, config: EngineConfig) -> Result<Self, EngineError> {
        if config.max_batch_size != 1 {
            return Err(EngineError::Config(
                "ProTox accepts one compound per request".into(),
            ));
        }
        config.validate()?;
        Ok(Self {
            http: HttpClient::new()?,
            encoder,
            config,
        })
    }

    /// Switch on wait-and-resume throttle handling.
    pub fn with_auto_resume(mut self, policy: ThrottlePolicy) -> Self {
        self.config.throttle = policy.with_auto_resume(true);
        self
    }

    pub async fn run(
        &self,
        smiles: &[String],
    ) -> Result<(ResultTable, SummaryCounts), EngineError> {
        self.run_with_cancel(smiles, &CancellationToken::new())
            .await
    }

    pub async fn run_with_cancel(
        &self,
        smiles: &[String],
        cancel: &CancellationToken,
    ) -> Result<(ResultTable, SummaryCounts), EngineError> {
        let engine = Engine::new(
            ProtoxFetcher::new(self.http.clone(), self.encoder.clone()),
            ProtoxExtractor,
            TracingProgress,
            self.config.clone(),
        )?;
        let outcomes = engine.run(smiles, cancel).await?;
        Ok(aggregate(&outcomes))
    }
}
