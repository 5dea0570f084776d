//! Schema validation.
//!
//! Turns parsed records into a `ValidationReport`: the records that are
//! acceptable right now, plus a named defect for everything that is not.
//! Defects are values, not errors; the correction loop consumes them.

use std::collections::{HashMap, HashSet};
use std::fmt;

use rust_decimal::Decimal;

use crate::types::{BatchQuote, PredictionRecord};

/// A named validation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Defect {
    /// Response had no `{...}` span at all.
    NoStructuredOutput,
    MalformedJson(String),
    /// Batch line without exactly four `|`-separated fields.
    InvalidLine(String),
    /// Batch line whose numeric fields do not parse.
    NonNumericLine(String),
    MissingField(String),
    NonNumericField(String),
    InvalidField { field: String, value: String },
    NonPositive { ticker: String, field: String },
    Missing(Vec<String>),
    Unexpected(Vec<String>),
    /// A correction round's model call exhausted its transport retries.
    CallFailed(String),
}

impl fmt::Display for Defect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Defect::NoStructuredOutput => write!(f, "no structured output (expected one JSON object)"),
            Defect::MalformedJson(msg) => write!(f, "malformed JSON: {msg}"),
            Defect::InvalidLine(line) => write!(f, "invalid line: '{line}'"),
            Defect::NonNumericLine(line) => write!(f, "non-numeric price in line: '{line}'"),
            Defect::MissingField(field) => write!(f, "missing field: {field}"),
            Defect::NonNumericField(field) => write!(f, "non-numeric field: {field}"),
            Defect::InvalidField { field, value } => write!(f, "invalid {field}: '{value}'"),
            Defect::NonPositive { ticker, field } => write!(f, "non-positive {field} for {ticker}"),
            Defect::Missing(list) => write!(f, "missing tickers: {}", list.join(", ")),
            Defect::Unexpected(list) => write!(f, "unexpected tickers: {}", list.join(", ")),
            Defect::CallFailed(msg) => write!(f, "model call failed: {msg}"),
        }
    }
}

/// A parsed record that belongs to exactly one subject.
pub trait Subject {
    fn subject(&self) -> &str;

    /// Defects in numeric fields that must be positive.
    fn numeric_defects(&self) -> Vec<Defect>;
}

fn require_positive(ticker: &str, field: &str, value: Decimal, out: &mut Vec<Defect>) {
    if value <= Decimal::ZERO {
        out.push(Defect::NonPositive {
            ticker: ticker.to_string(),
            field: field.to_string(),
        });
    }
}

impl Subject for BatchQuote {
    fn subject(&self) -> &str {
        &self.ticker
    }

    fn numeric_defects(&self) -> Vec<Defect> {
        let mut out = Vec::new();
        require_positive(&self.ticker, "current price", self.current_price, &mut out);
        require_positive(&self.ticker, "target price", self.target_price, &mut out);
        out
    }
}

impl Subject for PredictionRecord {
    fn subject(&self) -> &str {
        &self.ticker
    }

    fn numeric_defects(&self) -> Vec<Defect> {
        let mut out = Vec::new();
        require_positive(&self.ticker, "current_price", self.current_price, &mut out);
        require_positive(&self.ticker, "predicted_price", self.predicted_price, &mut out);
        out
    }
}

/// Defects plus the records currently accepted, keyed by subject.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationReport<R> {
    pub defects: Vec<Defect>,
    pub accepted: HashMap<String, R>,
}

impl<R> ValidationReport<R> {
    pub fn is_clean(&self) -> bool {
        self.defects.is_empty()
    }
}

/// Validate `records` against the expected subject set.
///
/// Checks run in order: missing subjects, unexpected subjects, numeric
/// positivity. `parse_defects` are carried into the report first. When a
/// subject appears twice the first record wins.
pub fn validate<R, I>(records: I, parse_defects: Vec<Defect>, expected: &[String]) -> ValidationReport<R>
where
    R: Subject,
    I: IntoIterator<Item = R>,
{
    let expected_set: HashSet<&str> = expected.iter().map(String::as_str).collect();
    let mut present: HashMap<String, R> = HashMap::new();
    let mut unexpected: Vec<String> = Vec::new();

    for record in records {
        let subject = record.subject().to_string();
        if !expected_set.contains(subject.as_str()) {
            if !unexpected.contains(&subject) {
                unexpected.push(subject);
            }
            continue;
        }
        present.entry(subject).or_insert(record);
    }

    let mut defects = parse_defects;

    let missing: Vec<String> = expected
        .iter()
        .filter(|t| !present.contains_key(t.as_str()))
        .cloned()
        .collect();
    if !missing.is_empty() {
        defects.push(Defect::Missing(missing));
    }

    if !unexpected.is_empty() {
        unexpected.sort();
        defects.push(Defect::Unexpected(unexpected));
    }

    let mut accepted = HashMap::with_capacity(present.len());
    for ticker in expected {
        let Some(record) = present.remove(ticker.as_str()) else {
            continue;
        };
        let numeric = record.numeric_defects();
        if numeric.is_empty() {
            accepted.insert(ticker.clone(), record);
        } else {
            defects.extend(numeric);
        }
    }

    ValidationReport { defects, accepted }
}

/// Re-validate an accumulated map. Carries no parse defects.
pub fn validate_merged<R>(merged: &HashMap<String, R>, expected: &[String]) -> ValidationReport<R>
where
    R: Subject + Clone,
{
    validate(merged.values().cloned(), Vec::new(), expected)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
