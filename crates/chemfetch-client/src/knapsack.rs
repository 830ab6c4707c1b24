//! Metabolite search against the KNApSAcK core database.
//!
//! Two-phase source: one listing request returns the matching compounds,
//! then a bounded pool of detail lookups (one per compound id) enriches
//! each row. Detail results are left-joined onto the listing — a failed
//! lookup leaves that row's detail fields null instead of dropping it.

use std::fmt;
use std::str::FromStr;

use chemfetch_core::aggregate::{left_join, table_from_records};
use chemfetch_core::config::EngineConfig;
use chemfetch_core::engine::Engine;
use chemfetch_core::error::EngineError;
use chemfetch_core::models::{
    ExtractedRecord, Job, JobOutcome, RawDocument, ResultTable, SummaryCounts,
};
use chemfetch_core::traits::{Extractor, Fetcher, TracingProgress};
use scraper::{ElementRef, Html, Selector};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::http::HttpClient;

pub const SITE_URL: &str = "https://www.knapsackfamily.com";
const RESULT_URL: &str = "https://www.knapsackfamily.com/knapsack_core/result.php";
const DETAIL_URL: &str = "https://www.knapsackfamily.com/knapsack_core/information.php";

/// Listing columns, in table order.
const LISTING_COLUMNS: [&str; 6] = [
    "C_ID",
    "CAS_ID",
    "Metabolite",
    "Molecular_Formula",
    "Mw",
    "Organism",
];

/// Search criteria the result endpoint understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchType {
    #[default]
    All,
    Name,
    Formula,
    Mass,
    Cid,
}

impl SearchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchType::All => "all",
            SearchType::Name => "name",
            SearchType::Formula => "formula",
            SearchType::Mass => "mass",
            SearchType::Cid => "cid",
        }
    }
}

impl fmt::Display for SearchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SearchType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "all" => Ok(SearchType::All),
            "name" => Ok(SearchType::Name),
            "formula" => Ok(SearchType::Formula),
            "mass" => Ok(SearchType::Mass),
            "cid" => Ok(SearchType::Cid),
            _ => Err(format!("Unknown search type: {s}")),
        }
    }
}

/// Fetches one compound's information page.
#[derive(Clone)]
pub struct KnapsackDetailFetcher {
    http: HttpClient,
}

impl KnapsackDetailFetcher {
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }
}

impl Fetcher for KnapsackDetailFetcher {
    async fn fetch(&self, job: &Job) -> Result<RawDocument, EngineError> {
        let cid = &job.batch.identifiers()[0];
        let url = detail_url(cid)?;
        self.http.get(&url, "detail").await
    }
}

/// Reads the labelled information table off a compound detail page.
#[derive(Debug, Clone, Copy, Default)]
pub struct KnapsackDetailExtractor;

impl Extractor for KnapsackDetailExtractor {
    fn extract(&self, doc: &RawDocument) -> Result<Vec<ExtractedRecord>, EngineError> {
        let cid = doc.identifier().unwrap_or_default().to_string();
        let document = Html::parse_document(&doc.body);

        let info_sel = selector("table.d3 tr")?;
        let label_sel = selector("th.inf")?;
        let cell_sel = selector("td")?;

        let mut inchikey = Value::Null;
        let mut inchicode = Value::Null;
        let mut smiles = Value::Null;

        let mut found_any = false;
        for row in document.select(&info_sel) {
            let Some(header) = row.select(&label_sel).next() else {
                continue;
            };
            let label = text_of(&header);
            let value = row
                .select(&cell_sel)
                .next()
                .map(|td| text_of(&td))
                .filter(|text| !text.is_empty())
                .map_or(Value::Null, Value::String);

            match label.as_str() {
                "InChIKey" => {
                    inchikey = value;
                    found_any = true;
                }
                "InChICode" => {
                    inchicode = value;
                    found_any = true;
                }
                "SMILES" => {
                    smiles = value;
                    found_any = true;
                }
                _ => {}
            }
        }

        if !found_any {
            return Ok(Vec::new());
        }

        let record = ExtractedRecord::new(&cid)
            .with_field("InChIKey", inchikey)
            .with_field("InChICode", inchicode)
            .with_field("SMILES", smiles)
            .with_field("image_url", parse_image_url(&document)?)
            .with_field("Organism", parse_organisms(&document)?);
        Ok(vec![record])
    }
}

/// KNApSAcK source: keyword search plus per-compound detail retrieval.
pub struct Knapsack {
    http: HttpClient,
    search_type: SearchType,
    keyword: String,
    config: EngineConfig,
}

impl Knapsack {
    pub fn new(search_type: SearchType, keyword: impl Into<String>) -> Result<Self, EngineError> {
        Self::with_config(
            search_type,
            keyword,
            EngineConfig::default().with_max_workers(5),
        )
    }

    pub fn with_config(
        search_type: SearchType,
        keyword: impl Into<String>,
        config: EngineConfig,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self {
            http: HttpClient::new()?,
            search_type,
            keyword: keyword.into(),
            config,
        })
    }

    pub async fn search(&self) -> Result<(ResultTable, SummaryCounts), EngineError> {
        self.search_with_cancel(&CancellationToken::new()).await
    }

    /// Run the search and detail phases and join the results.
    pub async fn search_with_cancel(
        &self,
        cancel: &CancellationToken,
    ) -> Result<(ResultTable, SummaryCounts), EngineError> {
        let url = search_url(self.search_type, &self.keyword)?;
        tracing::info!(
            keyword = %self.keyword,
            search_type = %self.search_type,
            "Searching"
        );

        let listing = self.http.get(&url, "search").await?;
        let listing_records = parse_listing(&listing.body)?;
        if listing_records.is_empty() {
            tracing::warn!("No results found");
            return Ok((ResultTable::empty(), SummaryCounts::default()));
        }

        let base = table_from_records(&listing_records);
        tracing::info!(entries = base.len(), "Retrieving details");

        let cids: Vec<String> = listing_records
            .iter()
            .map(|record| record.key.clone())
            .collect();
        let engine = Engine::new(
            KnapsackDetailFetcher::new(self.http.clone()),
            KnapsackDetailExtractor,
            TracingProgress,
            self.config.clone(),
        )?;
        let outcomes = engine.run(&cids, cancel).await?;

        let mut counts = SummaryCounts {
            total: outcomes.len(),
            ..SummaryCounts::default()
        };
        let mut details: Vec<ExtractedRecord> = Vec::new();
        for outcome in &outcomes {
            match outcome {
                JobOutcome::Success { records, .. } => {
                    counts.succeeded += 1;
                    details.extend(records.iter().cloned());
                }
                JobOutcome::Failure { .. } => counts.failed += 1,
            }
        }

        let joined = left_join(&base, "C_ID", &details, &detail_columns());
        Ok((joined, counts))
    }
}

/// Detail-phase columns appended to the listing by the join.
pub fn detail_columns() -> Vec<String> {
    ["InChIKey", "InChICode", "SMILES", "image_url", "Organism"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// Build the listing URL for a search type and keyword (percent-encoded).
pub fn search_url(search_type: SearchType, keyword: &str) -> Result<String, EngineError> {
    let url = Url::parse_with_params(
        RESULT_URL,
        &[("sname", search_type.as_str()), ("word", keyword)],
    )
    .map_err(|e| EngineError::fetch("search", e.to_string()))?;
    Ok(url.into())
}

fn detail_url(cid: &str) -> Result<String, EngineError> {
    let url = Url::parse_with_params(DETAIL_URL, &[("word", cid)])
        .map_err(|e| EngineError::fetch("detail", e.to_string()))?;
    Ok(url.into())
}

/// Parse the search-result table into one record per compound row.
///
/// A page without the table (or with no data rows) is a miss, not an
/// error.
pub fn parse_listing(html: &str) -> Result<Vec<ExtractedRecord>, EngineError> {
    let document = Html::parse_document(html);
    let table_sel = selector("table")?;
    let row_sel = selector("tr")?;
    let cell_sel = selector("td")?;

    let Some(table) = document.select(&table_sel).next() else {
        tracing::warn!("Result table not found");
        return Ok(Vec::new());
    };

    let mut records = Vec::new();
    for row in table.select(&row_sel) {
        let cells: Vec<String> = row.select(&cell_sel).map(|td| text_of(&td)).collect();
        if cells.len() < LISTING_COLUMNS.len() {
            // Header rows use <th> and yield no <td> cells.
            continue;
        }

        let mut record = ExtractedRecord::new(&cells[0]);
        for (column, value) in LISTING_COLUMNS.iter().zip(cells.iter()) {
            let value = if value.is_empty() {
                Value::Null
            } else {
                Value::String(value.clone())
            };
            record = record.with_field(*column, value);
        }
        records.push(record);
    }
    Ok(records)
}

/// The structure image link, resolved against the site root.
fn parse_image_url(document: &Html) -> Result<Value, EngineError> {
    let image_sel = selector(r#"img[property="image"]"#)?;
    let Some(src) = document
        .select(&image_sel)
        .find_map(|img| img.value().attr("src"))
    else {
        return Ok(Value::Null);
    };

    let base = Url::parse(SITE_URL).map_err(|e| EngineError::Extraction(e.to_string()))?;
    let resolved = base
        .join(src)
        .map_err(|e| EngineError::Extraction(e.to_string()))?;
    Ok(json!(String::from(resolved)))
}

/// The organism table rows (kingdom / family / species / reference), as a
/// JSON array. The organism table is recognised by its header row.
fn parse_organisms(document: &Html) -> Result<Value, EngineError> {
    let table_sel = selector("table")?;
    let row_sel = selector("tr")?;
    let cell_sel = selector("td, th")?;
    let data_sel = selector("td")?;

    for table in document.select(&table_sel) {
        let Some(header) = table.select(&row_sel).next() else {
            continue;
        };
        let header_text = header
            .select(&cell_sel)
            .map(|cell| text_of(&cell))
            .collect::<Vec<_>>()
            .join(" ");
        if !header_text.contains("Kingdom") {
            continue;
        }

        let organisms: Vec<Value> = table
            .select(&row_sel)
            .skip(1)
            .filter_map(|row| {
                let cells: Vec<String> = row.select(&data_sel).map(|td| text_of(&td)).collect();
                (cells.len() >= 4).then(|| {
                    json!({
                        "kingdom": cells[0],
                        "family": cells[1],
                        "species": cells[2],
                        "reference": cells[3],
                    })
                })
            })
            .collect();

        return Ok(Value::Array(organisms));
    }

    Ok(Value::Null)
}

fn selector(css: &str) -> Result<Selector, EngineError> {
    Selector::parse(css).map_err(|e| EngineError::Extraction(e.to_string()))
}

fn text_of(el: &ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing_page() -> &'static str {
        r#"<html><body><table>
            <tr><th>C_ID</th><th>CAS ID</th><th>Metabolite</th><th>Formula</th><th>Mw</th><th>Organism</th></tr>
            <tr><td>C00002657</td><td>486-66-8</td><td>Daidzein</td><td>C15H10O4</td><td>254.06</td><td>Pueraria lobata</td></tr>
            <tr><td>C00002658</td><td></td><td>Genistein</td><td>C15H10O5</td><td>270.05</td><td>Glycine max</td></tr>
        </table></body></html>"#
    }

    fn detail_page() -> &'static str {
        r#"<html><body>
            <img property="image" src="/knapsack_core/image/C00002657.png">
            <table class="d3">
                <tr><th class="inf">Name</th><td>Daidzein</td></tr>
                <tr><th class="inf">InChIKey</th><td>ZQSIJRDFPHDXIC-UHFFFAOYSA-N</td></tr>
                <tr><th class="inf">InChICode</th><td>InChI=1S/C15H10O4</td></tr>
                <tr><th class="inf">SMILES</th><td>C1=CC(=CC=C1C2=COC3=CC(=CC=C3C2=O)O)O</td></tr>
            </table>
            <table>
                <tr><th>Kingdom</th><th>Family</th><th>Species</th><th>Reference</th></tr>
                <tr><td>Plantae</td><td>Fabaceae</td><td>Pueraria lobata</td><td>Ref 1</td></tr>
                <tr><td>Plantae</td><td>Fabaceae</td><td>Glycine max</td><td>Ref 2</td></tr>
            </table>
        </body></html>"#
    }

    fn doc_for(cid: &str, body: &str) -> RawDocument {
        let mut doc = RawDocument::ok(body);
        doc.identifiers = vec![cid.to_string()];
        doc
    }

    #[test]
    fn test_search_url_encodes_keyword() {
        let url = search_url(SearchType::All, "Ginkgo Biloba").unwrap();
        assert_eq!(
            url,
            "https://www.knapsackfamily.com/knapsack_core/result.php?sname=all&word=Ginkgo+Biloba"
        );
    }

    #[test]
    fn test_search_type_round_trip() {
        for ty in [
            SearchType::All,
            SearchType::Name,
            SearchType::Formula,
            SearchType::Mass,
            SearchType::Cid,
        ] {
            let parsed: SearchType = ty.as_str().parse().unwrap();
            assert_eq!(parsed, ty);
        }
        assert!("organism".parse::<SearchType>().is_err());
    }

    #[test]
    fn test_parse_listing_reads_data_rows() {
        let records = parse_listing(listing_page()).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].key, "C00002657");
        assert_eq!(records[0].field("Metabolite"), Some(&json!("Daidzein")));
        assert_eq!(records[1].field("CAS_ID"), Some(&Value::Null));
        assert_eq!(records[1].field("Mw"), Some(&json!("270.05")));
    }

    #[test]
    fn test_parse_listing_without_table_is_empty() {
        let records = parse_listing("<html><body>No hits</body></html>").unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn test_detail_extractor_reads_information() {
        let doc = doc_for("C00002657", detail_page());
        let records = KnapsackDetailExtractor.extract(&doc).unwrap();

        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.key, "C00002657");
        assert_eq!(
            record.field("InChIKey"),
            Some(&json!("ZQSIJRDFPHDXIC-UHFFFAOYSA-N"))
        );
        assert_eq!(
            record.field("image_url"),
            Some(&json!(
                "https://www.knapsackfamily.com/knapsack_core/image/C00002657.png"
            ))
        );

        let organisms = record.field("Organism").unwrap().as_array().unwrap();
        assert_eq!(organisms.len(), 2);
        assert_eq!(organisms[0]["species"], json!("Pueraria lobata"));
    }

    #[test]
    fn test_detail_extractor_no_information_table_is_empty() {
        let doc = doc_for("C99999999", "<html><body>not found</body></html>");
        let records = KnapsackDetailExtractor.extract(&doc).unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn test_listing_join_keeps_rows_without_details() {
        let listing = parse_listing(listing_page()).unwrap();
        let base = table_from_records(&listing);

        // Only the first compound's detail lookup succeeded.
        let doc = doc_for("C00002657", detail_page());
        let details = KnapsackDetailExtractor.extract(&doc).unwrap();

        let joined = left_join(&base, "C_ID", &details, &detail_columns());

        assert_eq!(joined.len(), 2);
        assert_eq!(
            joined.cell(0, "InChIKey"),
            Some(&json!("ZQSIJRDFPHDXIC-UHFFFAOYSA-N"))
        );
        assert_eq!(joined.cell(1, "InChIKey"), Some(&Value::Null));
        assert_eq!(joined.cell(1, "Metabolite"), Some(&json!("Genistein")));
    }
}
