//! Turn a source body into raw symbol strings.
//!
//! Parsers only extract. Case folding, length limits and the fund filter
//! happen later in [`super::filter`].

use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use super::sources::SourceFormat;
use crate::error::PipelineError;

/// Header names that identify the ticker column in symbol directory files
pub const PIPE_SYMBOL_HEADERS: &[&str] = &["Symbol", "ACT Symbol", "NASDAQ Symbol", "CQS Symbol"];

pub fn parse(format: &SourceFormat, body: &str) -> Result<Vec<String>, PipelineError> {
    match format {
        SourceFormat::PipeDelimited => Ok(parse_pipe_delimited(body)),
        SourceFormat::Csv { columns } => parse_csv(body, columns),
        SourceFormat::HtmlTable => parse_html_table(body),
    }
}

/// nasdaqtrader layout: a `|` header row, data rows, a `File Creation Time` footer
pub fn parse_pipe_delimited(body: &str) -> Vec<String> {
    let mut lines = body.lines();
    let Some(header) = lines.next() else {
        return Vec::new();
    };
    let header: Vec<&str> = header.split('|').map(str::trim).collect();
    let idx = PIPE_SYMBOL_HEADERS
        .iter()
        .find_map(|candidate| header.iter().position(|h| h == candidate))
        .unwrap_or(0);

    lines
        .filter(|line| !line.is_empty() && !line.starts_with("File Creation") && !line.starts_with("NASDAQ"))
        .filter_map(|line| line.split('|').nth(idx))
        .map(str::trim)
        .filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case("symbol"))
        .map(str::to_string)
        .collect()
}

/// Take the first non-empty value among `columns`, in priority order
pub fn parse_csv(body: &str, columns: &[String]) -> Result<Vec<String>, PipelineError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(body.as_bytes());

    let headers = reader
        .headers()
        .map_err(|e| PipelineError::parse("csv header", e))?
        .clone();
    let indexes: Vec<usize> = columns
        .iter()
        .filter_map(|c| headers.iter().position(|h| h == c))
        .collect();
    if indexes.is_empty() {
        debug!("No symbol column among {:?} in {:?}", columns, headers);
        return Ok(Vec::new());
    }

    let mut symbols = Vec::new();
    for record in reader.records() {
        let record = match record {
            Ok(record) => record,
            Err(e) => {
                debug!("Skipping malformed csv row: {}", e);
                continue;
            }
        };
        if let Some(value) = indexes.iter().filter_map(|&i| record.get(i)).find(|v| !v.is_empty()) {
            symbols.push(value.to_string());
        }
    }
    Ok(symbols)
}

/// First `<table>` whose header row has a cell containing "symbol" or
/// "ticker"; returns that column's cell text.
pub fn parse_html_table(body: &str) -> Result<Vec<String>, PipelineError> {
    let document = Html::parse_document(body);
    let table_sel = selector("table")?;
    let row_sel = selector("tr")?;
    let cell_sel = selector("th, td")?;

    for table in document.select(&table_sel) {
        let mut rows = table.select(&row_sel);
        let Some(header) = rows.next() else {
            continue;
        };
        let Some(idx) = header.select(&cell_sel).position(|cell| {
            let text = cell_text(cell).to_lowercase();
            text.contains("symbol") || text.contains("ticker")
        }) else {
            continue;
        };

        let symbols: Vec<String> = rows
            .filter_map(|row| row.select(&cell_sel).nth(idx))
            .map(cell_text)
            .filter(|s| !s.is_empty())
            .collect();
        return Ok(symbols);
    }

    Ok(Vec::new())
}

fn selector(css: &str) -> Result<Selector, PipelineError> {
    Selector::parse(css).map_err(|e| PipelineError::parse("css selector", e))
}

/// Cell text with whitespace trimmed and trailing `[n]` citations removed
fn cell_text(cell: ElementRef<'_>) -> String {
    let text = cell.text().collect::<String>();
    strip_citations(text.trim()).to_string()
}

pub fn strip_citations(mut text: &str) -> &str {
    while text.ends_with(']') {
        match text.rfind('[') {
            Some(open) => text = text[..open].trim_end(),
            None => break,
        }
    }
    text
}
