//! Prompt construction.
//!
//! Every prompt embeds the exact output contract, a worked example with
//! placeholder values and the formatting rules. `today` is captured once
//! when the builder is created and reused for every prompt it renders, so
//! an initial prompt and its corrections never disagree on the date.

use chrono::NaiveDate;

use crate::pipeline::validator::Defect;

/// Renders instruction payloads for one pipeline invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptBuilder {
    target_date: String,
    today: NaiveDate,
}

impl PromptBuilder {
    pub fn new(target_date: impl Into<String>, today: NaiveDate) -> Self {
        Self {
            target_date: target_date.into(),
            today,
        }
    }

    /// Builder dated with the local calendar day.
    pub fn for_today(target_date: impl Into<String>) -> Self {
        Self::new(target_date, chrono::Local::now().date_naive())
    }

    pub fn target_date(&self) -> &str {
        &self.target_date
    }

    pub fn today(&self) -> NaiveDate {
        self.today
    }

    /// Single-subject prompt: one JSON object.
    pub fn single(&self, ticker: &str) -> String {
        format!(
            "The user provides a single ticker that may be either a STOCK (e.g. a listed equity) \
             or a CRYPTO asset.\n\n\
             1) Determine the asset type (exactly \"stock\" or \"crypto\").\n\
             2) Fetch the current live price yourself using reliable sources. Include the currency \
             (ISO code, e.g. \"USD\") and an ISO 8601 timestamp for when that price was observed.\n\
             3) Provide a single, most-likely predicted price for {target}.\n\
             4) Provide a concise, single-paragraph reason summarizing the key drivers.\n\n\
             Ticker: {ticker}\n\
             Today: {today}\n\n\
             {schema}",
            target = self.target_date,
            ticker = ticker,
            today = self.today,
            schema = self.json_schema(ticker),
        )
    }

    /// Batch prompt: one delimited line per subject.
    pub fn batch(&self, tickers: &[String]) -> String {
        format!(
            "Analyze the following financial assets: {list}.\n\
             For each asset, provide the current live price and a realistic price target for {target}.\n\
             Today: {today}\n\n\
             {format}",
            list = tickers.join(", "),
            target = self.target_date,
            today = self.today,
            format = self.line_format("TICKR|123.45|130.00|5.31"),
        )
    }

    /// Correction prompt for batch mode, narrowed to `missing`.
    pub fn batch_correction(&self, defects: &[Defect], missing: &[String]) -> String {
        format!(
            "Your previous answer did not follow the required format.\n\
             Problems found:\n{problems}\n\
             Answer again ONLY for these assets: {list}.\n\
             Target date: {target}\n\
             Today: {today}\n\n\
             {format}",
            problems = render_defects(defects),
            list = missing.join(", "),
            target = self.target_date,
            today = self.today,
            format = self.line_format("ABCD|45.60|47.10|3.29"),
        )
    }

    /// Correction prompt for single-subject mode.
    pub fn single_correction(&self, defects: &[Defect], ticker: &str) -> String {
        format!(
            "Your previous answer for {ticker} could not be accepted.\n\
             Problems found:\n{problems}\n\
             Answer again for {ticker} only.\n\
             Today: {today}\n\n\
             {schema}",
            problems = render_defects(defects),
            today = self.today,
            schema = self.json_schema(ticker),
        )
    }

    fn json_schema(&self, ticker: &str) -> String {
        format!(
            "STRICT OUTPUT RULES: return ONLY one JSON object with this exact schema \
             (no markdown, no code fences, no citations, no extra text):\n\
             {{\n  \
               \"ticker\": \"{ticker}\",\n  \
               \"asset_type\": \"stock\" | \"crypto\",\n  \
               \"current_price\": <number>,\n  \
               \"price_currency\": \"<ISO code, e.g. USD>\",\n  \
               \"price_timestamp\": \"<ISO 8601 datetime>\",\n  \
               \"target_date\": \"{target}\",\n  \
               \"predicted_price\": <number>,\n  \
               \"reasoning\": \"<single paragraph>\"\n\
             }}\n\
             Example with placeholder values:\n\
             {{\"ticker\": \"TICKR\", \"asset_type\": \"stock\", \"current_price\": 123.45, \
             \"price_currency\": \"USD\", \"price_timestamp\": \"2000-01-01T00:00:00Z\", \
             \"target_date\": \"{target}\", \"predicted_price\": 130.00, \
             \"reasoning\": \"Placeholder reasoning in one paragraph.\"}}",
            ticker = ticker,
            target = self.target_date,
        )
    }

    fn line_format(&self, example: &str) -> String {
        format!(
            "The output MUST be in the following format, with each asset on a new line, and nothing else.\n\
             FORMAT: TICKER|CURRENT_PRICE|TARGET_PRICE|PERCENTAGE_CHANGE\n\
             Example with placeholder values (not real data): {example}\n\
             Rules:\n\
             - Exactly four fields per line, separated by '|', in that order.\n\
             - Prices and percentage are plain decimal numbers: no currency symbols, no '%', no thousands separators.\n\
             - No headers, no markdown, no bullet points, no citations, no blank commentary lines."
        )
    }
}

fn render_defects(defects: &[Defect]) -> String {
    if defects.is_empty() {
        return "- (none reported)".to_string();
    }
    defects
        .iter()
        .map(|d| format!("- {d}"))
        .collect::<Vec<_>>()
        .join("\n")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
