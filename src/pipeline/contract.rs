//! Output contracts.
//!
//! A contract ties together the prompts for one output shape and the
//! extraction of records from that shape, so the correction loop can be
//! written once for both the single-JSON and the line-batch modes.

use chrono::NaiveDate;
use serde_json::{Map, Value};

use super::parser::{extract_json_object, json_decimal, parse_quote_lines};
use super::validator::{Defect, Subject};
use crate::prompt::PromptBuilder;
use crate::types::{normalize_ticker, AssetClass, BatchQuote, PipelineError, PredictionRecord};

/// Records pulled out of one model response, plus what could not be.
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction<R> {
    pub records: Vec<R>,
    pub defects: Vec<Defect>,
}

impl<R> Default for Extraction<R> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            defects: Vec::new(),
        }
    }
}

pub trait OutputContract: Send + Sync {
    type Record: Subject + Clone + Send + Sync;

    fn initial_prompt(&self, subjects: &[String]) -> String;

    /// Prompt re-requesting only `missing`, listing `defects`.
    fn correction_prompt(&self, defects: &[Defect], missing: &[String]) -> String;

    fn extract(&self, raw: &str, elapsed_seconds: f64) -> Extraction<Self::Record>;
}

// ---------------------------------------------------------------------------
// Line batch
// ---------------------------------------------------------------------------

/// `TICKER|CURRENT_PRICE|TARGET_PRICE|PERCENTAGE_CHANGE`, one line per subject.
#[derive(Debug, Clone)]
pub struct LineBatch {
    prompts: PromptBuilder,
}

impl LineBatch {
    pub fn new(prompts: PromptBuilder) -> Self {
        Self { prompts }
    }
}

impl OutputContract for LineBatch {
    type Record = BatchQuote;

    fn initial_prompt(&self, subjects: &[String]) -> String {
        self.prompts.batch(subjects)
    }

    fn correction_prompt(&self, defects: &[Defect], missing: &[String]) -> String {
        self.prompts.batch_correction(defects, missing)
    }

    fn extract(&self, raw: &str, _elapsed_seconds: f64) -> Extraction<BatchQuote> {
        let parsed = parse_quote_lines(raw);
        Extraction {
            records: parsed.quotes,
            defects: parsed.defects,
        }
    }
}

// ---------------------------------------------------------------------------
// Single JSON
// ---------------------------------------------------------------------------

/// One JSON object describing one subject.
#[derive(Debug, Clone)]
pub struct SingleJson {
    prompts: PromptBuilder,
}

impl SingleJson {
    pub fn new(prompts: PromptBuilder) -> Self {
        Self { prompts }
    }
}

impl OutputContract for SingleJson {
    type Record = PredictionRecord;

    fn initial_prompt(&self, subjects: &[String]) -> String {
        self.prompts
            .single(subjects.first().map(String::as_str).unwrap_or_default())
    }

    fn correction_prompt(&self, defects: &[Defect], missing: &[String]) -> String {
        self.prompts
            .single_correction(defects, missing.first().map(String::as_str).unwrap_or_default())
    }

    fn extract(&self, raw: &str, elapsed_seconds: f64) -> Extraction<PredictionRecord> {
        let map = match extract_json_object(raw) {
            Ok(map) => map,
            Err(PipelineError::NoStructuredOutput) => {
                return Extraction {
                    records: Vec::new(),
                    defects: vec![Defect::NoStructuredOutput],
                }
            }
            Err(e) => {
                let msg = match e {
                    PipelineError::SchemaDefect(msg) => msg,
                    other => other.to_string(),
                };
                return Extraction {
                    records: Vec::new(),
                    defects: vec![Defect::MalformedJson(msg)],
                };
            }
        };

        match record_from_json(&map, elapsed_seconds) {
            Ok(record) => Extraction {
                records: vec![record],
                defects: Vec::new(),
            },
            Err(defects) => Extraction {
                records: Vec::new(),
                defects,
            },
        }
    }
}

/// Build a `PredictionRecord` from a parsed JSON object.
///
/// Every required field is checked; all problems are reported at once.
pub fn record_from_json(
    map: &Map<String, Value>,
    elapsed_seconds: f64,
) -> Result<PredictionRecord, Vec<Defect>> {
    let mut defects = Vec::new();

    let ticker = required_str(map, "ticker", &mut defects).and_then(|raw| {
        let t = normalize_ticker(raw);
        if t.is_none() {
            defects.push(invalid("ticker", raw));
        }
        t
    });

    let asset_type = required_str(map, "asset_type", &mut defects).and_then(|raw| {
        match raw.parse::<AssetClass>() {
            Ok(a) => Some(a),
            Err(_) => {
                defects.push(invalid("asset_type", raw));
                None
            }
        }
    });

    let current_price = required_decimal(map, "current_price", &mut defects);
    let predicted_price = required_decimal(map, "predicted_price", &mut defects);

    let target_date = required_str(map, "target_date", &mut defects).and_then(|raw| {
        match NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d") {
            Ok(d) => Some(d.format("%Y-%m-%d").to_string()),
            Err(_) => {
                defects.push(invalid("target_date", raw));
                None
            }
        }
    });

    let reasoning = required_str(map, "reasoning", &mut defects).and_then(|raw| {
        let paragraph = raw.split_whitespace().collect::<Vec<_>>().join(" ");
        if paragraph.is_empty() {
            defects.push(Defect::MissingField("reasoning".to_string()));
            None
        } else {
            Some(paragraph)
        }
    });

    let price_currency = map
        .get("price_currency")
        .and_then(Value::as_str)
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "USD".to_string());

    let price_timestamp = map
        .get("price_timestamp")
        .and_then(Value::as_str)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());

    match (ticker, asset_type, current_price, predicted_price, target_date, reasoning) {
        (Some(ticker), Some(asset_type), Some(current_price), Some(predicted_price), Some(target_date), Some(reasoning))
            if defects.is_empty() =>
        {
            Ok(PredictionRecord {
                ticker,
                asset_type,
                current_price,
                price_currency,
                price_timestamp,
                target_date,
                predicted_price,
                reasoning,
                elapsed_seconds,
            })
        }
        _ => Err(defects),
    }
}

fn invalid(field: &str, value: &str) -> Defect {
    Defect::InvalidField {
        field: field.to_string(),
        value: value.to_string(),
    }
}

fn required_str<'a>(map: &'a Map<String, Value>, field: &str, defects: &mut Vec<Defect>) -> Option<&'a str> {
    match map.get(field) {
        None | Some(Value::Null) => {
            defects.push(Defect::MissingField(field.to_string()));
            None
        }
        Some(Value::String(s)) => Some(s.as_str()),
        Some(other) => {
            defects.push(invalid(field, &other.to_string()));
            None
        }
    }
}

fn required_decimal(
    map: &Map<String, Value>,
    field: &str,
    defects: &mut Vec<Defect>,
) -> Option<rust_decimal::Decimal> {
    match map.get(field) {
        None | Some(Value::Null) => {
            defects.push(Defect::MissingField(field.to_string()));
            None
        }
        Some(value) => {
            let d = json_decimal(value);
            if d.is_none() {
                defects.push(Defect::NonNumericField(field.to_string()));
            }
            d
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
