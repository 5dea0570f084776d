//! Response parsing.
//!
//! Two lexical modes: a single JSON object, or one `|`-delimited line per
//! subject. Parsing never judges completeness; that is the validator's job.

use rust_decimal::Decimal;
use serde_json::{Map, Value};
use std::str::FromStr;

use super::validator::Defect;
use crate::types::{BatchQuote, PipelineError};

/// Fields per batch line: ticker, current, target, percentage.
pub const LINE_FIELDS: usize = 4;

/// Extract exactly one JSON object from raw model text.
///
/// Trimmed text that is itself `{...}` is parsed directly; otherwise the
/// span from the first `{` to the last `}` is parsed.
pub fn extract_json_object(raw: &str) -> Result<Map<String, Value>, PipelineError> {
    let trimmed = raw.trim();

    let snippet = if trimmed.starts_with('{') && trimmed.ends_with('}') {
        trimmed
    } else {
        match (trimmed.find('{'), trimmed.rfind('}')) {
            (Some(start), Some(end)) if end > start => &trimmed[start..=end],
            _ => return Err(PipelineError::NoStructuredOutput),
        }
    };

    match serde_json::from_str::<Value>(snippet) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(PipelineError::SchemaDefect("expected a JSON object".to_string())),
        Err(e) => Err(PipelineError::SchemaDefect(format!("malformed JSON: {e}"))),
    }
}

/// Lines accepted from a batch response, in response order, plus a defect
/// for every non-blank line that was rejected.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedLines {
    pub quotes: Vec<BatchQuote>,
    pub defects: Vec<Defect>,
}

/// Parse a line-delimited batch response. A bad line never stops the scan.
pub fn parse_quote_lines(raw: &str) -> ParsedLines {
    let mut parsed = ParsedLines::default();

    for line in raw.lines().map(str::trim).filter(|l| !l.is_empty()) {
        match parse_quote_line(line) {
            Ok(quote) => parsed.quotes.push(quote),
            Err(defect) => parsed.defects.push(defect),
        }
    }

    parsed
}

fn parse_quote_line(line: &str) -> Result<BatchQuote, Defect> {
    let parts: Vec<&str> = line.split('|').map(str::trim).collect();
    if parts.len() != LINE_FIELDS {
        return Err(Defect::InvalidLine(line.to_string()));
    }

    let numbers: Option<Vec<Decimal>> = parts[1..].iter().map(|p| parse_decimal(p)).collect();
    let Some(numbers) = numbers else {
        return Err(Defect::NonNumericLine(line.to_string()));
    };

    Ok(BatchQuote {
        ticker: parts[0].to_uppercase(),
        current_price: numbers[0],
        target_price: numbers[1],
        percentage_change: numbers[2],
    })
}

/// Plain or scientific decimal notation; nothing else.
pub fn parse_decimal(s: &str) -> Option<Decimal> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    Decimal::from_str(s)
        .ok()
        .or_else(|| Decimal::from_scientific(s).ok())
}

/// Numeric JSON value as a decimal. Strings are not coerced.
pub fn json_decimal(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => parse_decimal(&n.to_string()),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    // -- JSON extraction -------------------------------------------------

    #[test]
    fn test_extract_bare_object() {
        let map = extract_json_object("  {\"ticker\": \"TSLA\", \"current_price\": 396.1}\n").unwrap();
        assert_eq!(map["ticker"], "TSLA");
    }

    #[test]
    fn test_extract_object_wrapped_in_prose() {
        let raw = "Here is the prediction:\n```json\n{\"ticker\": \"ETH\", \"note\": {\"x\": 1}}\n```\nThanks!";
        let map = extract_json_object(raw).unwrap();
        assert_eq!(map["ticker"], "ETH");
        assert_eq!(map["note"]["x"], 1);
    }

    #[test]
    fn test_extract_no_braces_is_no_structured_output() {
        assert_eq!(
            extract_json_object("I cannot help with that."),
            Err(PipelineError::NoStructuredOutput)
        );
        assert_eq!(extract_json_object("} backwards {"), Err(PipelineError::NoStructuredOutput));
    }

    #[test]
    fn test_extract_malformed_json_is_schema_defect() {
        let err = extract_json_object("{\"ticker\": \"TSLA\",}").unwrap_err();
        assert!(matches!(err, PipelineError::SchemaDefect(msg) if msg.starts_with("malformed JSON")));
    }

    // -- Batch lines -------------------------------------------------------

    #[test]
    fn test_parse_lines_accepts_well_formed() {
        let parsed = parse_quote_lines("aaa|10|12|20\n\n  BBB | 5.5 | 6 | 9.09  \n");
        assert!(parsed.defects.is_empty());
        assert_eq!(parsed.quotes.len(), 2);
        assert_eq!(parsed.quotes[0].ticker, "AAA");
        assert_eq!(parsed.quotes[0].target_price, dec!(12));
        assert_eq!(parsed.quotes[1].current_price, dec!(5.5));
        assert_eq!(parsed.quotes[1].percentage_change, dec!(9.09));
    }

    #[test]
    fn test_parse_lines_wrong_field_count() {
        let parsed = parse_quote_lines("AAA|10|12\nBBB|1|2|3|4");
        assert!(parsed.quotes.is_empty());
        assert_eq!(
            parsed.defects,
            vec![
                Defect::InvalidLine("AAA|10|12".into()),
                Defect::InvalidLine("BBB|1|2|3|4".into()),
            ]
        );
    }

    #[test]
    fn test_parse_lines_non_numeric() {
        let parsed = parse_quote_lines("AAA|$10|12|20\nBBB|10|12|20%");
        assert!(parsed.quotes.is_empty());
        assert_eq!(parsed.defects.len(), 2);
        assert!(matches!(parsed.defects[0], Defect::NonNumericLine(_)));
    }

    #[test]
    fn test_malformed_line_does_not_corrupt_neighbours() {
        let parsed = parse_quote_lines("AAA|10|12|20\nBBB five dollars\nCCC|7|7|0");
        assert_eq!(parsed.quotes.len(), 2);
        assert_eq!(parsed.quotes[0].ticker, "AAA");
        assert_eq!(parsed.quotes[1].ticker, "CCC");
        assert_eq!(parsed.quotes[1].current_price, dec!(7));
        assert_eq!(parsed.defects, vec![Defect::InvalidLine("BBB five dollars".into())]);
    }

    #[test]
    fn test_parse_decimal_forms() {
        assert_eq!(parse_decimal("180.50"), Some(dec!(180.50)));
        assert_eq!(parse_decimal("-3.2"), Some(dec!(-3.2)));
        assert_eq!(parse_decimal("1e3"), Some(dec!(1000)));
        assert_eq!(parse_decimal("NaN"), None);
        assert_eq!(parse_decimal("inf"), None);
        assert_eq!(parse_decimal(""), None);
    }

    #[test]
    fn test_json_decimal_rejects_strings() {
        assert_eq!(json_decimal(&serde_json::json!(12.5)), Some(dec!(12.5)));
        assert_eq!(json_decimal(&serde_json::json!(7)), Some(dec!(7)));
        assert_eq!(json_decimal(&serde_json::json!("12.5")), None);
        assert_eq!(json_decimal(&Value::Null), None);
    }
}
