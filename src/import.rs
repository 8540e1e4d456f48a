//! Record readers for tabular inventory exports.
//!
//! Readers only map columns onto [`RawRecord`] and normalize null-like date
//! cells; required-field checks happen in the metrics engine.

use crate::errors::{AppError, AppResult};
use crate::models::RawRecord;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Csv,
    Json,
}

impl SourceFormat {
    pub fn from_path(path: &Path) -> AppResult<Self> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);
        match extension.as_deref() {
            Some("csv") => Ok(Self::Csv),
            Some("json") => Ok(Self::Json),
            _ => Err(AppError::Import(format!(
                "unsupported record file '{}' (expected .csv or .json)",
                path.display()
            ))),
        }
    }
}

pub fn read_records(path: &Path) -> AppResult<Vec<RawRecord>> {
    let format = SourceFormat::from_path(path)?;
    let file = File::open(path)?;
    let records = match format {
        SourceFormat::Csv => read_csv(BufReader::new(file))?,
        SourceFormat::Json => read_json(BufReader::new(file))?,
    };
    tracing::info!(path = %path.display(), rows = records.len(), "read inventory records");
    Ok(records)
}

/// Reads a CSV export with a header row. Empty cells become missing values.
pub fn read_csv<R: Read>(reader: R) -> AppResult<Vec<RawRecord>> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut records = Vec::new();
    for (index, row) in csv_reader.deserialize::<RawRecord>().enumerate() {
        let record = row.map_err(|error| AppError::Import(format!("row {}: {}", index + 1, error)))?;
        records.push(record);
    }
    Ok(records)
}

/// Reads a JSON array of row objects.
pub fn read_json<R: Read>(reader: R) -> AppResult<Vec<RawRecord>> {
    serde_json::from_reader(reader).map_err(|error| AppError::Import(error.to_string()))
}
