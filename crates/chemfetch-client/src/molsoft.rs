//! Molecular property predictions from the Molsoft property calculator.
//!
//! Per-identifier source. The form takes a molblock and answers with an
//! HTML page of `<b>label</b> value` pairs; the extractor walks those and
//! picks the numeric parts out of the composite values.

use chemfetch_core::aggregate::aggregate;
use chemfetch_core::config::EngineConfig;
use chemfetch_core::engine::Engine;
use chemfetch_core::error::EngineError;
use chemfetch_core::models::{ExtractedRecord, Job, RawDocument, ResultTable, SummaryCounts};
use chemfetch_core::traits::{Extractor, Fetcher, TracingProgress};
use regex::Regex;
use scraper::{Html, Selector};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

use crate::encode::StructureEncoder;
use crate::http::HttpClient;

pub const BASE_URL: &str = "https://www.molsoft.com/mprop/";

/// Submits one compound to the property calculator form.
#[derive(Clone)]
pub struct MolsoftFetcher<E: StructureEncoder> {
    http: HttpClient,
    encoder: E,
}

impl<E: StructureEncoder> MolsoftFetcher<E> {
    pub fn new(http: HttpClient, encoder: E) -> Self {
        Self { http, encoder }
    }
}

impl<E: StructureEncoder> Fetcher for MolsoftFetcher<E> {
    async fn fetch(&self, job: &Job) -> Result<RawDocument, EngineError> {
        let smiles = &job.batch.identifiers()[0];
        let molblock = self
            .encoder
            .molblock(smiles)
            .map_err(|e| EngineError::fetch("encode", e.to_string()))?;

        self.http
            .post_form(
                BASE_URL,
                &[
                    ("p", ""),
                    ("sm", ""),
                    ("jme_mol", molblock.as_str()),
                    ("act", "Search"),
                    ("Calc", "Calculate Properties"),
                ],
                &[],
                "submit",
            )
            .await
    }
}

/// Reads the `<b>label</b> value` pairs off a property page.
#[derive(Debug, Clone, Copy, Default)]
pub struct MolsoftExtractor;

impl Extractor for MolsoftExtractor {
    fn extract(&self, doc: &RawDocument) -> Result<Vec<ExtractedRecord>, EngineError> {
        let smiles = doc.identifier().unwrap_or_default().to_string();
        let document = Html::parse_document(&doc.body);
        let bold = Selector::parse("b").map_err(|e| EngineError::Extraction(e.to_string()))?;

        // (label text, text node following the tag) for every <b>.
        let pairs: Vec<(String, Option<String>)> = document
            .select(&bold)
            .map(|el| {
                let label = el.text().collect::<String>();
                let value = el.next_sibling().and_then(|node| {
                    node.value()
                        .as_text()
                        .map(|text| text.text.trim().to_string())
                });
                (label, value)
            })
            .collect();

        let raw_value = |label: &str| -> Option<String> {
            pairs
                .iter()
                .find(|(text, _)| text.contains(label))
                .and_then(|(_, value)| value.clone())
                .filter(|value| !value.is_empty())
        };

        if pairs.is_empty() || raw_value("Molecular formula:").is_none() {
            // The form page itself (or an unmatched structure) carries no
            // property block.
            return Ok(Vec::new());
        }

        // MolLogS reads "-1.24 (in Log units)"; keep the number.
        let logs = raw_value("MolLogS :").and_then(|text| capture(&text, r"([-\d.]+)\s+\(in Log"));
        // BBB score reads "4.12 (high is good ...)"; keep the leading number.
        let bbb = raw_value("BBB Score :").and_then(|text| capture(&text, r"^\s*([-\d.]+)"));

        let record = ExtractedRecord::new(&smiles)
            .with_field("SMILES", json!(smiles))
            .with_field("Molecular formula", opt(raw_value("Molecular formula:")))
            .with_field("Molecular weight", opt(raw_value("Molecular weight:")))
            .with_field("HBA", opt(raw_value("Number of HBA:")))
            .with_field("HBD", opt(raw_value("Number of HBD:")))
            .with_field("MolLogP", opt(raw_value("MolLogP :")))
            .with_field("MolLogS", opt(logs))
            .with_field("MolPSA", opt(raw_value("MolPSA :")))
            .with_field("MolVol", opt(raw_value("MolVol :")))
            .with_field("pKa", opt(raw_value("pKa of most Basic/Acidic group :")))
            .with_field("BBB Score", opt(bbb))
            .with_field(
                "Number of stereo centers",
                opt(raw_value("Number of stereo centers:")),
            );
        Ok(vec![record])
    }
}

/// Molsoft source: per-compound property retrieval.
#[derive(Debug)]
pub struct Molsoft<E: StructureEncoder + Clone> {
    http: HttpClient,
    encoder: E,
    config: EngineConfig,
}

impl<E: StructureEncoder + Clone> Molsoft<E> {
    pub fn new(encoder: E) -> Result<Self, EngineError> {
        Self::with_config(encoder, EngineConfig::default().with_max_workers(4))
    }

    pub fn with_config(encoder: E, config: EngineConfig) -> Result<Self, EngineError> {
        if config.max_batch_size != 1 {
            return Err(EngineError::Config(
                "Molsoft accepts one compound per request".into(),
            ));
        }
        config.validate()?;
        Ok(Self {
            http: HttpClient::new()?,
            encoder,
            config,
        })
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
            MolsoftFetcher::new(self.http.clone(), self.encoder.clone()),
            MolsoftExtractor,
            TracingProgress,
            self.config.clone(),
        )?;
        let outcomes = engine.run(smiles, cancel).await?;
        Ok(aggregate(&outcomes))
    }
}

fn capture(text: &str, pattern: &str) -> Option<String> {
    Regex::new(pattern)
        .ok()?
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

fn opt(value: Option<String>) -> Value {
    value.map_or(Value::Null, Value::String)
}
