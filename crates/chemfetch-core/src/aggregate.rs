//! Merges per-job outcomes into one ordered table.
//!
//! Job completion order is nondeterministic; aggregation restores a
//! deterministic result by replaying outcomes in job-index order. Failed
//! jobs contribute to the failure count and nothing else — their rows are
//! simply absent, never null-padded. Two-phase sources instead keep their
//! base rows and null the joined fields, via [`left_join`].

use std::collections::HashMap;

use serde_json::Value;

use crate::models::{ExtractedRecord, JobOutcome, ResultTable, SummaryCounts};

/// Concatenate all successful records into one table and tally outcomes.
///
/// Pure function of its input: calling it twice on the same outcomes
/// yields identical tables. Zero successes yield an empty, schema-less
/// table. Columns are the first-seen field order across records, so a
/// source emitting a fixed field order gets a stable schema.
pub fn aggregate(outcomes: &[JobOutcome]) -> (ResultTable, SummaryCounts) {
    let mut ordered: Vec<&JobOutcome> = outcomes.iter().collect();
    ordered.sort_by_key(|o| o.index());

    let mut table = ResultTable::empty();
    let mut counts = SummaryCounts {
        total: outcomes.len(),
        ..SummaryCounts::default()
    };

    for outcome in ordered {
        match outcome {
            JobOutcome::Success { records, .. } => {
                counts.succeeded += 1;
                for record in records {
                    push_record(&mut table, record);
                }
            }
            JobOutcome::Failure { .. } => {
                counts.failed += 1;
            }
        }
    }

    (table, counts)
}

/// Build a table directly from records, first-seen field order as columns.
///
/// Used by two-phase sources to materialise the listing phase before the
/// detail join.
pub fn table_from_records(records: &[ExtractedRecord]) -> ResultTable {
    let mut table = ResultTable::empty();
    for record in records {
        push_record(&mut table, record);
    }
    table
}

/// Join detail records onto a base table by key, keeping every base row.
///
/// A base row whose detail lookup failed (no record for its key) gets
/// nulls in all `detail_columns` — detail failure never drops the base
/// row. `detail_columns` is the caller's stable detail schema and must not
/// overlap the base columns.
pub fn left_join(
    base: &ResultTable,
    key_column: &str,
    details: &[ExtractedRecord],
    detail_columns: &[String],
) -> ResultTable {
    let by_key: HashMap<&str, &ExtractedRecord> = details
        .iter()
        .map(|record| (record.key.as_str(), record))
        .collect();

    let mut columns = base.columns.clone();
    columns.extend(detail_columns.iter().cloned());

    let key_index = base.column_index(key_column);
    let rows = base
        .rows
        .iter()
        .map(|row| {
            let mut joined = row.clone();
            let detail = key_index
                .and_then(|i| row.get(i))
                .and_then(|v| v.as_str())
                .and_then(|key| by_key.get(key));

            for column in detail_columns {
                let value = detail
                    .and_then(|record| record.field(column))
                    .cloned()
                    .unwrap_or(Value::Null);
                joined.push(value);
            }
            joined
        })
        .collect();

    ResultTable { columns, rows }
}

fn push_record(table: &mut ResultTable, record: &ExtractedRecord) {
    // Grow the schema for fields seen for the first time, backfilling
    // earlier rows with nulls.
    for (name, _) in &record.fields {
        if table.column_index(name).is_none() {
            table.columns.push(name.clone());
            for row in &mut table.rows {
                row.push(Value::Null);
            }
        }
    }

    let mut row = vec![Value::Null; table.columns.len()];
    for (name, value) in &record.fields {
        if let Some(i) = table.column_index(name) {
            row[i] = value.clone();
        }
    }
    table.rows.push(row);
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::models::FailureKind;

    fn record(key: &str, ld50: i64) -> ExtractedRecord {
        ExtractedRecord::new(key)
            .with_field("SMILES", json!(key))
            .with_field("LD50", json!(ld50))
    }

    fn success(index: usize, records: Vec<ExtractedRecord>) -> JobOutcome {
        JobOutcome::Success { index, records }
    }

    fn fetch_failure(index: usize, id: &str) -> JobOutcome {
        JobOutcome::Failure {
            index,
            identifiers: vec![id.to_string()],
            kind: FailureKind::Fetch,
            message: "HTTP 500".into(),
        }
    }

    #[test]
    fn test_concatenates_in_job_index_order() {
        // Outcomes arrive in completion order, not input order.
        let outcomes = vec![
            success(2, vec![record("C2", 30)]),
            success(0, vec![record("C0", 10)]),
            success(1, vec![record("C1", 20)]),
        ];

        let (table, counts) = aggregate(&outcomes);

        assert_eq!(counts, SummaryCounts { succeeded: 3, failed: 0, total: 3 });
        assert_eq!(table.columns, vec!["SMILES", "LD50"]);
        let keys: Vec<&Value> = table.rows.iter().map(|r| &r[0]).collect();
        assert_eq!(keys, vec![&json!("C0"), &json!("C1"), &json!("C2")]);
    }

    #[test]
    fn test_failed_jobs_contribute_no_rows() {
        let outcomes = vec![
            success(0, vec![record("C0", 10)]),
            fetch_failure(1, "C1"),
            success(2, vec![record("C2", 30)]),
            fetch_failure(3, "C3"),
        ];

        let (table, counts) = aggregate(&outcomes);

        assert_eq!(counts, SummaryCounts { succeeded: 2, failed: 2, total: 4 });
        assert_eq!(table.len(), 2);
        for row in &table.rows {
            let key = row[0].as_str().unwrap();
            assert!(key == "C0" || key == "C2");
        }
    }

    #[test]
    fn test_zero_successes_yield_empty_schemaless_table() {
        let outcomes = vec![fetch_failure(0, "C0")];
        let (table, counts) = aggregate(&outcomes);

        assert!(table.is_empty());
        assert!(table.columns.is_empty());
        assert_eq!(counts.failed, 1);

        let (table, counts) = aggregate(&[]);
        assert!(table.is_empty());
        assert_eq!(counts, SummaryCounts::default());
    }

    #[test]
    fn test_aggregate_is_idempotent() {
        let outcomes = vec![
            success(1, vec![record("C1", 20)]),
            fetch_failure(0, "C0"),
        ];

        let first = aggregate(&outcomes);
        let second = aggregate(&outcomes);
        assert_eq!(first, second);
    }

    #[test]
    fn test_ragged_records_grow_schema_with_null_backfill() {
        let outcomes = vec![
            success(0, vec![ExtractedRecord::new("C0").with_field("A", json!(1))]),
            success(
                1,
                vec![ExtractedRecord::new("C1")
                    .with_field("A", json!(2))
                    .with_field("B", json!("x"))],
            ),
        ];

        let (table, _) = aggregate(&outcomes);

        assert_eq!(table.columns, vec!["A", "B"]);
        assert_eq!(table.rows[0], vec![json!(1), Value::Null]);
        assert_eq!(table.rows[1], vec![json!(2), json!("x")]);
    }

    #[test]
    fn test_multi_row_batch_outcomes_keep_intra_batch_order() {
        let outcomes = vec![success(
            0,
            vec![record("C0", 1), record("C1", 2), record("C2", 3)],
        )];

        let (table, _) = aggregate(&outcomes);
        let keys: Vec<&str> = table
            .rows
            .iter()
            .map(|r| r[0].as_str().unwrap())
            .collect();
        assert_eq!(keys, vec!["C0", "C1", "C2"]);
    }

    #[test]
    fn test_left_join_keeps_base_row_on_detail_miss() {
        let base = ResultTable {
            columns: vec!["C_ID".into(), "Metabolite".into()],
            rows: vec![
                vec![json!("C00001"), json!("Gingerol")],
                vec![json!("C00002"), json!("Shogaol")],
            ],
        };
        let details = vec![ExtractedRecord::new("C00001")
            .with_field("InChIKey", json!("NLDDIKRKFXEWBK-AWEZNQCLSA-N"))
            .with_field("SMILES", json!("CCCCC..."))];
        let detail_columns = vec!["InChIKey".to_string(), "SMILES".to_string()];

        let joined = left_join(&base, "C_ID", &details, &detail_columns);

        assert_eq!(joined.len(), 2, "detail failure must not drop the base row");
        assert_eq!(
            joined.cell(0, "InChIKey"),
            Some(&json!("NLDDIKRKFXEWBK-AWEZNQCLSA-N"))
        );
        assert_eq!(joined.cell(1, "InChIKey"), Some(&Value::Null));
        assert_eq!(joined.cell(1, "SMILES"), Some(&Value::Null));
        assert_eq!(joined.cell(1, "Metabolite"), Some(&json!("Shogaol")));
    }

    #[test]
    fn test_left_join_on_empty_base_is_empty() {
        let base = ResultTable::empty();
        let joined = left_join(&base, "C_ID", &[], &["InChIKey".to_string()]);
        assert!(joined.is_empty());
        assert_eq!(joined.columns, vec!["InChIKey"]);
    }
}
