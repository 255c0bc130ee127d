use crate::data::Record;
use anyhow::{Context, Result};
use serde_json::Value;
use std::io::{self, Read};

/// Raw CSV table: header row plus string cells.
#[derive(Debug, Clone)]
pub struct CsvData {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl CsvData {
    /// Convert rows into records, inferring a scalar type per cell.
    /// Short rows leave the trailing fields out of the record.
    pub fn into_records(self) -> Vec<Record> {
        let headers = self.headers;
        self.rows
            .into_iter()
            .map(|row| {
                headers
                    .iter()
                    .zip(row.iter())
                    .map(|(h, cell)| (h.clone(), infer_cell(cell)))
                    .collect()
            })
            .collect()
    }
}

/// Read CSV from stdin
pub fn read_csv_from_stdin() -> Result<CsvData> {
    read_csv(io::stdin().lock())
}

/// Read CSV with a header row from any reader.
pub fn read_csv<R: Read>(reader: R) -> Result<CsvData> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_reader(reader);

    let headers: Vec<String> = rdr
        .headers()
        .context("Failed to read CSV header row")?
        .iter()
        .map(|h| h.to_string())
        .collect();

    let mut rows = Vec::new();
    for (idx, result) in rdr.records().enumerate() {
        let record = result.with_context(|| format!("Failed to read CSV row {}", idx + 1))?;
        rows.push(record.iter().map(|c| c.to_string()).collect());
    }

    Ok(CsvData { headers, rows })
}

/// Infer a scalar from a CSV cell: empty → null, true/false → boolean,
/// integer or float → number, anything else stays text.
pub fn infer_cell(cell: &str) -> Value {
    let trimmed = cell.trim();
    if trimmed.is_empty() {
        return Value::Null;
    }
    if trimmed.eq_ignore_ascii_case("true") {
        return Value::Bool(true);
    }
    if trimmed.eq_ignore_ascii_case("false") {
        return Value::Bool(false);
    }
    if let Ok(i) = trimmed.parse::<i64>() {
        return Value::from(i);
    }
    if let Some(n) = trimmed
        .parse::<f64>()
        .ok()
        .filter(|f| f.is_finite())
        .and_then(serde_json::Number::from_f64)
    {
        return Value::Number(n);
    }
    Value::String(cell.to_string())
}
