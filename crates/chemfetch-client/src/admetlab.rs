//! ADMET property predictions from the ADMETlab screening service.
//!
//! Batched source: up to 100 SMILES go out in one submission. The fetch is
//! a four-step protocol — load the screening page for a CSRF token, POST
//! the batch, locate the generated CSV link in the results page, download
//! the CSV. The extractor then reads one record per CSV row.

use chemfetch_core::aggregate::aggregate;
use chemfetch_core::config::EngineConfig;
use chemfetch_core::engine::Engine;
use chemfetch_core::error::EngineError;
use chemfetch_core::models::{ExtractedRecord, Job, RawDocument, ResultTable, SummaryCounts};
use chemfetch_core::traits::{Extractor, Fetcher, TracingProgress};
use regex::Regex;
use scraper::{Html, Selector};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::http::HttpClient;

pub const BASE_URL: &str = "https://admetlab3.scbdd.com";
const INDEX_URL: &str = "https://admetlab3.scbdd.com/server/screening";
const POST_URL: &str = "https://admetlab3.scbdd.com/server/screeningCal";

/// Counts reported on the results page after a batch submission.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub success_molecules: Option<u64>,
    pub invalid_molecules: Option<u64>,
    pub total_molecules: Option<u64>,
}

/// Fetcher for one SMILES batch against the screening endpoint.
#[derive(Clone)]
pub struct AdmetLabFetcher {
    http: HttpClient,
}

impl AdmetLabFetcher {
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }
}

impl Fetcher for AdmetLabFetcher {
    async fn fetch(&self, job: &Job) -> Result<RawDocument, EngineError> {
        // 1. The screening page carries the CSRF token the POST must echo.
        let index = self.http.get(INDEX_URL, "token").await?;
        let token = parse_csrf_token(&index.body)?;

        // 2. Submit the CR/LF-joined batch.
        let smiles_text = job.batch.joined();
        let results = self
            .http
            .post_form(
                POST_URL,
                &[
                    ("csrfmiddlewaretoken", token.as_str()),
                    ("smiles-list", smiles_text.as_str()),
                    ("method", "2"),
                ],
                &[("Referer", INDEX_URL), ("Origin", BASE_URL)],
                "submit",
            )
            .await?;

        let summary = parse_summary(&results.body);
        tracing::info!(
            batch = job.batch.len(),
            invalid = summary.invalid_molecules,
            "Batch submitted"
        );

        // 3+4. The results page opens the CSV via an inline script.
        let csv_url = parse_csv_url(&results.body)?;
        self.http.get(&csv_url, "download").await
    }
}

/// Parses the downloaded CSV into one record per molecule row.
#[derive(Debug, Clone, Copy, Default)]
pub struct AdmetLabExtractor;

impl Extractor for AdmetLabExtractor {
    fn extract(&self, doc: &RawDocument) -> Result<Vec<ExtractedRecord>, EngineError> {
        let mut reader = csv::Reader::from_reader(doc.body.as_bytes());
        let headers = reader
            .headers()
            .map_err(|e| EngineError::Extraction(format!("CSV header: {e}")))?
            .clone();

        // The server keys result rows by a `smiles` column; fall back to
        // the first column if the layout ever changes.
        let key_index = headers
            .iter()
            .position(|h| h.eq_ignore_ascii_case("smiles"))
            .unwrap_or(0);

        let mut records = Vec::new();
        for row in reader.records() {
            let row = row.map_err(|e| EngineError::Extraction(format!("CSV row: {e}")))?;
            let key = row.get(key_index).unwrap_or_default().to_string();

            let mut record = ExtractedRecord::new(key);
            for (name, raw) in headers.iter().zip(row.iter()) {
                record = record.with_field(name, parse_cell(raw));
            }
            records.push(record);
        }
        Ok(records)
    }
}

/// ADMETlab source: configured engine plus the site protocol.
pub struct AdmetLab {
    http: HttpClient,
    config: EngineConfig,
}

impl AdmetLab {
    /// Defaults observed to work well against the service: 4 workers,
    /// full-size batches.
    pub fn new() -> Result<Self, EngineError> {
        Self::with_config(
            EngineConfig::default()
                .with_max_workers(4)
                .with_max_batch_size(100),
        )
    }

    pub fn with_config(config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self {
            http: HttpClient::new()?,
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
            AdmetLabFetcher::new(self.http.clone()),
            AdmetLabExtractor,
            TracingProgress,
            self.config.clone(),
        )?;
        let outcomes = engine.run(smiles, cancel).await?;
        Ok(aggregate(&outcomes))
    }
}

/// Pull the hidden `csrfmiddlewaretoken` input out of the screening page.
pub fn parse_csrf_token(html: &str) -> Result<String, EngineError> {
    let document = Html::parse_document(html);
    let selector = Selector::parse(r#"input[name="csrfmiddlewaretoken"]"#)
        .map_err(|e| EngineError::fetch("token", e.to_string()))?;

    document
        .select(&selector)
        .find_map(|input| input.value().attr("value"))
        .map(str::to_string)
        .ok_or_else(|| EngineError::fetch("token", "CSRF token not found"))
}

/// Find the `window.open("....csv")` URL the results page uses to hand out
/// the CSV, resolved against the site base.
pub fn parse_csv_url(html: &str) -> Result<String, EngineError> {
    let pattern = Regex::new(r#"window\.open\(["'](.*?\.csv)["']\)"#)
        .map_err(|e| EngineError::Generic(e.to_string()))?;

    let path = pattern
        .captures(html)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .ok_or_else(|| EngineError::fetch("locate-csv", "no CSV link in results page"))?;

    let base =
        Url::parse(BASE_URL).map_err(|e| EngineError::fetch("locate-csv", e.to_string()))?;
    let resolved = base
        .join(path)
        .map_err(|e| EngineError::fetch("locate-csv", e.to_string()))?;
    Ok(resolved.into())
}

/// Read the success/invalid/total counts from the results page cards.
/// Purely informational; missing cards are fine.
pub fn parse_summary(html: &str) -> BatchSummary {
    let mut summary = BatchSummary::default();
    let document = Html::parse_document(html);

    let (Ok(card_sel), Ok(title_sel), Ok(count_sel)) = (
        Selector::parse("div.info-card"),
        Selector::parse("h5.card-title"),
        Selector::parse("h6"),
    ) else {
        return summary;
    };

    for card in document.select(&card_sel) {
        let Some(title) = card.select(&title_sel).next() else {
            continue;
        };
        let title_text = title.text().collect::<String>().to_lowercase();

        let count = card
            .select(&count_sel)
            .next()
            .and_then(|tag| tag.text().collect::<String>().trim().parse::<u64>().ok());
        let Some(count) = count else { continue };

        if title_text.contains("success") {
            summary.success_molecules = Some(count);
        } else if title_text.contains("invalid") {
            summary.invalid_molecules = Some(count);
        } else if title_text.contains("total") {
            summary.total_molecules = Some(count);
        }
    }

    summary
}

fn parse_cell(raw: &str) -> Value {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Value::Null;
    }
    if let Ok(number) = trimmed.parse::<f64>()
        && let Some(number) = serde_json::Number::from_f64(number)
    {
        return Value::Number(number);
    }
    Value::String(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_parse_csrf_token() {
        let html = r#"<html><form>
            <input type="hidden" name="csrfmiddlewaretoken" value="tok123abc">
        </form></html>"#;
        assert_eq!(parse_csrf_token(html).unwrap(), "tok123abc");
    }

    #[test]
    fn test_parse_csrf_token_missing() {
        let err = parse_csrf_token("<html><body>no form</body></html>").unwrap_err();
        assert!(err.to_string().contains("token"));
    }

    #[test]
    fn test_parse_csv_url_resolves_against_base() {
        let html = r#"<script>
            function download() { window.open("/static/results/task_42.csv") }
        </script>"#;
        assert_eq!(
            parse_csv_url(html).unwrap(),
            "https://admetlab3.scbdd.com/static/results/task_42.csv"
        );
    }

    #[test]
    fn test_parse_csv_url_missing_is_an_error() {
        let err = parse_csv_url("<script>nothing here</script>").unwrap_err();
        assert!(err.to_string().contains("locate-csv"));
    }

    #[test]
    fn test_parse_summary_reads_cards() {
        let html = r#"
            <div class="info-card"><h5 class="card-title">Success molecules</h5><h6>48</h6></div>
            <div class="info-card"><h5 class="card-title">Invalid molecules</h5><h6>2</h6></div>
            <div class="info-card"><h5 class="card-title">Total molecules</h5><h6>50</h6></div>
        "#;
        let summary = parse_summary(html);
        assert_eq!(summary.success_molecules, Some(48));
        assert_eq!(summary.invalid_molecules, Some(2));
        assert_eq!(summary.total_molecules, Some(50));
    }

    #[test]
    fn test_parse_summary_tolerates_missing_cards() {
        assert_eq!(parse_summary("<html/>"), BatchSummary::default());
    }

    #[test]
    fn test_extractor_parses_csv_rows() {
        let csv = "smiles,MW,LogP,note\nCCO,46.07,-0.31,ok\nC1CCCCC1,84.16,2.34,\n";
        let doc = RawDocument::ok(csv);

        let records = AdmetLabExtractor.extract(&doc).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].key, "CCO");
        assert_eq!(records[0].field("MW"), Some(&json!(46.07)));
        assert_eq!(records[0].field("smiles"), Some(&json!("CCO")));
        assert_eq!(records[1].key, "C1CCCCC1");
        assert_eq!(records[1].field("note"), Some(&Value::Null));
    }

    #[test]
    fn test_extractor_empty_csv_yields_no_records() {
        let records = AdmetLabExtractor.extract(&RawDocument::ok("")).unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn test_default_config_uses_full_batches() {
        let source = AdmetLab::new().unwrap();
        assert_eq!(source.config.max_batch_size, 100);
        assert_eq!(source.config.max_workers, 4);
    }
}
