// src/storage/table.rs

//! Tabular rendering of flattened player rows.

use indexmap::IndexSet;
use serde_json::Value;

use crate::error::{AppError, Result};
use crate::models::PlayerRecord;

/// Column names in first-seen order across all rows.
pub fn columns(records: &[PlayerRecord]) -> IndexSet<&str> {
    records.iter().flat_map(|r| r.keys()).collect()
}

/// Render rows as comma-separated UTF-8 with a header row.
///
/// Columns are the union of all row keys; a row without a key gets an
/// empty cell. No rows produces an empty document.
pub fn render_csv(records: &[PlayerRecord]) -> Result<Vec<u8>> {
    let columns = columns(records);
    if columns.is_empty() {
        return Ok(Vec::new());
    }

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(columns.iter())?;

    for record in records {
        writer.write_record(columns.iter().map(|col| cell(record.get(col))))?;
    }

    writer
        .into_inner()
        .map_err(|e| AppError::Io(e.into_error()))
}

fn cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Bool(true)) => "True".to_string(),
        Some(Value::Bool(false)) => "False".to_string(),
        Some(other) => other.to_string(),
    }
}
