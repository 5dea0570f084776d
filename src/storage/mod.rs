//! Persistence layer.
//!
//! Prediction cycles are appended to a CSV file. The header is written
//! once, when the file is new or empty; rows are never rewritten.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::path::Path;
use tracing::{debug, info};

/// Default CSV file path.
pub const DEFAULT_CSV_FILE: &str = "predictions.csv";

/// One persisted prediction, in CSV column order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRow {
    #[serde(rename = "Ticker")]
    pub ticker: String,
    #[serde(rename = "Type")]
    pub asset_type: String,
    #[serde(rename = "PredictionDate")]
    pub prediction_date: String,
    #[serde(rename = "TargetDate")]
    pub target_date: String,
    #[serde(rename = "TargetPrice")]
    pub target_price: Decimal,
    #[serde(rename = "PercentageChange")]
    pub percentage_change: Decimal,
    #[serde(rename = "CurrentPriceAtPrediction")]
    pub current_price_at_prediction: Decimal,
}

/// True when the file is absent or has no bytes.
pub fn is_empty(path: &str) -> bool {
    std::fs::metadata(path).map(|m| m.len() == 0).unwrap_or(true)
}

/// Append rows to the CSV at `path`. Returns the number of rows written.
pub fn append_predictions(path: &str, rows: &[PredictionRow]) -> Result<usize> {
    if rows.is_empty() {
        debug!(path, "No rows to append");
        return Ok(0);
    }

    let write_header = is_empty(path);
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .context(format!("Failed to open {path} for append"))?;

    let mut wtr = csv::WriterBuilder::new()
        .has_headers(write_header)
        .from_writer(file);
    for row in rows {
        wtr.serialize(row)
            .context(format!("Failed to write prediction row for {}", row.ticker))?;
    }
    wtr.flush().context(format!("Failed to flush {path}"))?;

    info!(path, rows = rows.len(), header = write_header, "Predictions appended");
    Ok(rows.len())
}

/// All rows, newest `PredictionDate` first. Empty if the file does not exist.
pub fn read_predictions(path: &str) -> Result<Vec<PredictionRow>> {
    if !Path::new(path).exists() {
        return Ok(Vec::new());
    }

    let mut rdr = csv::Reader::from_path(path).context(format!("Failed to open {path}"))?;
    let mut rows = Vec::new();
    for record in rdr.deserialize() {
        let row: PredictionRow = record.context(format!("Failed to parse row in {path}"))?;
        rows.push(row);
    }

    rows.sort_by(|a, b| b.prediction_date.cmp(&a.prediction_date));
    Ok(rows)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
