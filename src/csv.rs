use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;

use crate::model::RawTransaction;

/// Errors that can occur when reading csv rows
#[derive(Debug, Error)]
pub enum CsvError {
    #[error("failed to open {path}: {source}")]
    Open { path: String, source: csv::Error },

    #[error("line {line}: failed to parse row: {source}")]
    Parse { line: usize, source: csv::Error },

    #[error("line {line}: invalid timestamp '{value}'")]
    Timestamp { line: usize, value: String },
}

/// Columns of an input row; everything except the timestamp is passed through as-is
/// and judged when the record is folded.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InputRow {
    id: Option<String>,
    user_id: Option<String>,
    r#type: Option<String>,
    amount: Option<String>,
    created_at: Option<String>,
}

impl InputRow {
    fn into_raw(self, line: usize) -> Result<RawTransaction, CsvError> {
        let created_at = match self.created_at {
            Some(value) => Some(
                value
                    .parse::<DateTime<Utc>>()
                    .map_err(|_| CsvError::Timestamp { line, value })?,
            ),
            None => None,
        };

        Ok(RawTransaction {
            id: self.id,
            user_id: self.user_id,
            kind: self.r#type,
            amount: self.amount.map(parse_amount),
            created_at,
        })
    }
}

/// Numeric cells become JSON numbers, anything else stays a string so that
/// validation can reject it.
fn parse_amount(cell: String) -> serde_json::Value {
    match cell.parse::<f64>() {
        Ok(value) if value.is_finite() => serde_json::Value::from(value),
        _ => serde_json::Value::String(cell),
    }
}

/// Read transaction records from a csv file
pub fn read_transactions(
    path: impl AsRef<Path>,
) -> Result<impl Iterator<Item = Result<RawTransaction, CsvError>>, CsvError> {
    let path = path.as_ref();
    let reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|source| CsvError::Open {
            path: path.display().to_string(),
            source,
        })?;

    Ok(reader
        .into_deserialize::<InputRow>()
        .enumerate()
        .map(|(idx, result)| {
            let line = idx + 2; // 1-indexed, skip header
            let row = result.map_err(|source| CsvError::Parse { line, source })?;
            row.into_raw(line)
        }))
}
