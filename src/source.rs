use crate::csv_reader;
use crate::data::{field_label, records_from_json, Record};
use crate::ir::IndexFilter;
use anyhow::{bail, Context, Result};
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

/// A read against one table/collection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchQuery {
    pub table: String,
    pub filter: Option<IndexFilter>,
    /// Restrict to rows whose `key_field` label is one of `keys`.
    pub key_field: Option<String>,
    pub keys: Vec<String>,
    /// Projection; empty means every field.
    pub fields: Vec<String>,
}

impl FetchQuery {
    pub fn table(table: &str) -> Self {
        Self {
            table: table.to_string(),
            ..Self::default()
        }
    }

    pub fn with_filter(mut self, filter: Option<IndexFilter>) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_keys(mut self, key_field: &str, keys: Vec<String>) -> Self {
        self.key_field = Some(key_field.to_string());
        self.keys = keys;
        self
    }

    pub fn with_fields(mut self, fields: Vec<String>) -> Self {
        self.fields = fields;
        self
    }
}

/// Backend the engine reads auxiliary and per-series records from.
///
/// Implementations may block; the engine issues one fetch at a time and
/// never retries.
pub trait RecordSource: Send + Sync {
    fn fetch(&self, query: &FetchQuery) -> Result<Vec<Record>>;

    /// Whether `fetch` honors `key_field`/`keys`. When it does not, the
    /// caller receives the full table and matches keys itself.
    fn supports_key_pushdown(&self) -> bool {
        false
    }
}

fn select(records: Vec<Record>, query: &FetchQuery, pushdown: bool) -> Vec<Record> {
    let keys: Option<(&str, HashSet<&str>)> = match (&query.key_field, pushdown) {
        (Some(field), true) => Some((field.as_str(), query.keys.iter().map(String::as_str).collect())),
        _ => None,
    };

    records
        .into_iter()
        .filter(|r| query.filter.as_ref().map_or(true, |f| f.matches(r)))
        .filter(|r| match &keys {
            Some((field, wanted)) => field_label(r, field).map_or(false, |k| wanted.contains(k.as_str())),
            None => true,
        })
        .map(|r| project(r, query))
        .collect()
}

fn project(record: Record, query: &FetchQuery) -> Record {
    if query.fields.is_empty() {
        return record;
    }
    record
        .into_iter()
        .filter(|(k, _)| query.fields.contains(k) || query.key_field.as_deref() == Some(k.as_str()))
        .collect()
}

/// Tables held in memory. Honors filters, key push-down and projection.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    tables: HashMap<String, Vec<Record>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, name: &str, records: Vec<Record>) -> Self {
        self.insert(name, records);
        self
    }

    pub fn insert(&mut self, name: &str, records: Vec<Record>) {
        self.tables.insert(name.to_string(), records);
    }
}

impl RecordSource for MemorySource {
    fn fetch(&self, query: &FetchQuery) -> Result<Vec<Record>> {
        let Some(records) = self.tables.get(&query.table) else {
            bail!("Unknown table '{}'", query.table);
        };
        Ok(select(records.clone(), query, true))
    }

    fn supports_key_pushdown(&self) -> bool {
        true
    }
}

/// A directory of `<table>.json` (array of objects) or `<table>.csv`
/// files. Every fetch scans the whole file.
#[derive(Debug, Clone)]
pub struct FileSource {
    dir: PathBuf,
}

impl FileSource {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    fn load_table(&self, table: &str) -> Result<Vec<Record>> {
        if table.is_empty() || table.contains(['/', '\\']) || table.starts_with('.') {
            bail!("Invalid table name '{}'", table);
        }

        let json_path = self.dir.join(format!("{}.json", table));
        if json_path.is_file() {
            let file = File::open(&json_path)
                .with_context(|| format!("Failed to open {}", json_path.display()))?;
            let value: serde_json::Value = serde_json::from_reader(BufReader::new(file))
                .with_context(|| format!("Failed to parse {}", json_path.display()))?;
            return records_from_json(&value)
                .with_context(|| format!("Invalid records in {}", json_path.display()));
        }

        let csv_path = self.dir.join(format!("{}.csv", table));
        if csv_path.is_file() {
            let file = File::open(&csv_path)
                .with_context(|| format!("Failed to open {}", csv_path.display()))?;
            return Ok(csv_reader::read_csv(BufReader::new(file))
                .with_context(|| format!("Failed to read {}", csv_path.display()))?
                .into_records());
        }

        bail!("No table '{}' in {}", table, self.dir.display())
    }
}

impl RecordSource for FileSource {
    fn fetch(&self, query: &FetchQuery) -> Result<Vec<Record>> {
        let records = self.load_table(&query.table)?;
        tracing::debug!(table = %query.table, rows = records.len(), "scanned table file");
        Ok(select(records, query, false))
    }
}
