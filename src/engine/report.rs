//! Console and JSON rendering of prediction payloads for the CLI.

use serde_json::{json, Value};

use super::orchestrator::{PredictionPayload, ProviderResult};
use crate::types::{PredictionRecord, ProviderSelection};

fn round3(x: f64) -> f64 {
    (x * 1000.0).round() / 1000.0
}

fn money(v: rust_decimal::Decimal) -> String {
    format!("${v:.2}")
}

/// One JSON object: `{provider, ticker, target_date, overall_elapsed_seconds, results}`.
/// Every elapsed value is rounded to milliseconds.
pub fn render_json(selection: ProviderSelection, payload: &PredictionPayload, overall_elapsed: f64) -> Value {
    let mut results = serde_json::to_value(&payload.results).unwrap_or(Value::Null);
    if let Value::Object(map) = &mut results {
        for entry in map.values_mut() {
            if let Some(elapsed) = entry.get("_elapsed_seconds").and_then(Value::as_f64) {
                entry["_elapsed_seconds"] = json!(round3(elapsed));
            }
        }
    }

    json!({
        "provider": selection.key(),
        "ticker": payload.ticker,
        "target_date": payload.target_date,
        "overall_elapsed_seconds": round3(overall_elapsed),
        "results": results,
    })
}

/// Side-by-side table; `None` unless every provider produced a record and
/// there are at least two of them.
pub fn render_table(payload: &PredictionPayload) -> Option<String> {
    let columns: Vec<(&str, &PredictionRecord)> = payload
        .results
        .iter()
        .map(|(label, r)| r.record().map(|rec| (label.as_str(), rec)))
        .collect::<Option<Vec<_>>>()?;
    if columns.len() < 2 {
        return None;
    }

    let rows: Vec<(&str, Vec<String>)> = vec![
        ("Ticker", columns.iter().map(|(_, r)| r.ticker.clone()).collect()),
        ("Asset Type", columns.iter().map(|(_, r)| r.asset_type.to_string()).collect()),
        (
            "Current Price",
            columns
                .iter()
                .map(|(_, r)| format!("{} {}", money(r.current_price), r.price_currency))
                .collect(),
        ),
        (
            "Price Timestamp",
            columns
                .iter()
                .map(|(_, r)| r.price_timestamp.clone().unwrap_or_else(|| "N/A".into()))
                .collect(),
        ),
        ("Target Date", columns.iter().map(|(_, r)| r.target_date.clone()).collect()),
        ("Predicted Price", columns.iter().map(|(_, r)| money(r.predicted_price)).collect()),
        (
            "Elapsed (s)",
            columns.iter().map(|(_, r)| format!("{:.3}", r.elapsed_seconds)).collect(),
        ),
    ];

    let col1 = rows.iter().map(|(f, _)| f.len()).max().unwrap_or(0) + 2;
    let widths: Vec<usize> = (0..columns.len())
        .map(|i| {
            rows.iter()
                .map(|(_, vals)| vals[i].len())
                .chain(std::iter::once(columns[i].0.len()))
                .max()
                .unwrap_or(0)
                + 2
        })
        .collect();

    let mut out = String::from("--- Side-by-side Comparison ---\n");
    out.push_str(&format!("{:<col1$}", "Field"));
    for (i, (label, _)) in columns.iter().enumerate() {
        out.push_str(&format!("{:<w$}", label, w = widths[i]));
    }
    out.push('\n');
    out.push_str(&"-".repeat(col1 + widths.iter().sum::<usize>()));
    out.push('\n');
    for (field, vals) in &rows {
        out.push_str(&format!("{field:<col1$}"));
        for (i, v) in vals.iter().enumerate() {
            out.push_str(&format!("{:<w$}", v, w = widths[i]));
        }
        out.push('\n');
    }
    Some(out)
}

/// Per-provider detail block.
pub fn render_block(label: &str, result: &ProviderResult) -> String {
    let mut out = format!("=== {label} ===\n");
    match result {
        ProviderResult::Record(r) => {
            out.push_str(&format!("Ticker: {}\n", r.ticker));
            out.push_str(&format!("Asset Type: {}\n", r.asset_type));
            out.push_str(&format!("Current Price: {} ({})", money(r.current_price), r.price_currency));
            if let Some(ts) = &r.price_timestamp {
                out.push_str(&format!(" @ {ts}"));
            }
            out.push('\n');
            out.push_str(&format!(
                "Predicted Price for {}: {}\n",
                r.target_date,
                money(r.predicted_price)
            ));
            out.push_str(&format!("Reason: {}\n", r.reasoning));
        }
        ProviderResult::Failure(f) => {
            out.push_str(&format!("Status: ERROR: {}\n", f.error));
            for d in &f.defects {
                out.push_str(&format!("  - {d}\n"));
            }
        }
    }
    out.push_str(&format!("Elapsed (s): {:.3}\n", result.elapsed_seconds()));
    out
}

/// Full console report: optional table, one block per provider, total.
pub fn render_text(payload: &PredictionPayload, overall_elapsed: f64) -> String {
    let mut sections = Vec::new();
    if let Some(table) = render_table(payload) {
        sections.push(table);
    }
    for (label, result) in &payload.results {
        sections.push(render_block(label, result));
    }
    sections.push(format!("Total runtime (s): {overall_elapsed:.3}\n"));
    sections.join("\n")
}
