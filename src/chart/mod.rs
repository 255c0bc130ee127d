//! Chart strategies: one module per chart type, each turning records into
//! its chart-shaped result. Every strategy returns the zero-value shape for
//! an empty record set.

pub mod bar;
pub mod breakdown;
pub mod heatmap;
pub mod line;
pub mod period;
pub mod pie;
pub mod ranking;
pub mod scatter;

use crate::data::{field_label, numeric, sort_labels, Record};
use crate::enrich::Enricher;
use crate::error::Result;
use crate::ir::{ChartRequest, ChartResult, ChartType, SortOrder};
use crate::stats::finite_or_zero;
use serde_json::Value;
use std::collections::HashMap;

/// Ranking match value used when a request names none.
pub const DEFAULT_MATCH_VALUE: &str = "出勤";

/// Per-call parameters shared by the strategies.
#[derive(Clone)]
pub struct ChartParams<'a> {
    pub x_field: &'a str,
    pub y_field: &'a str,
    pub x_table: Option<&'a str>,
    pub y_table: Option<&'a str>,
    pub series_field: Option<&'a str>,
    pub group_by: Option<&'a str>,
    pub group_by_fields: Vec<String>,
    pub limit: Option<usize>,
    pub order: SortOrder,
    pub match_value: Value,
    pub enricher: Option<&'a Enricher>,
}

impl<'a> ChartParams<'a> {
    pub fn new(x_field: &'a str, y_field: &'a str) -> Self {
        Self {
            x_field,
            y_field,
            x_table: None,
            y_table: None,
            series_field: None,
            group_by: None,
            group_by_fields: Vec::new(),
            limit: None,
            order: SortOrder::Descending,
            match_value: Value::from(DEFAULT_MATCH_VALUE),
            enricher: None,
        }
    }

    /// Single-series view of `request`, reading the first y field.
    pub fn from_request(request: &'a ChartRequest) -> Self {
        Self {
            x_field: &request.x_field,
            y_field: request.primary_y_field(),
            x_table: request.x_table.as_deref(),
            y_table: request.y_table.first().map(String::as_str),
            series_field: request.series_field.as_deref().filter(|s| !s.is_empty()),
            group_by: request.group_by.as_deref().filter(|s| !s.is_empty()),
            group_by_fields: request.group_by_fields.to_vec(),
            limit: request.row_limit(),
            order: request.order,
            match_value: request
                .match_value
                .clone()
                .unwrap_or_else(|| Value::from(DEFAULT_MATCH_VALUE)),
            enricher: None,
        }
    }

    pub fn with_enricher(mut self, enricher: Option<&'a Enricher>) -> Self {
        self.enricher = enricher;
        self
    }

    pub fn title(&self) -> String {
        provenance_title(self.y_table, self.y_field)
    }
}

/// Run the strategy for `chart_type` over one record set.
pub fn calculate(chart_type: ChartType, records: &[Record], params: &ChartParams) -> Result<ChartResult> {
    let result = match chart_type {
        ChartType::Bar => bar::calculate(records, params),
        ChartType::Line => line::calculate(records, params),
        ChartType::Pie => pie::calculate(records, params),
        ChartType::Scatter => scatter::calculate(records, params),
        ChartType::Heatmap => heatmap::calculate(records, params),
        ChartType::PeriodOverPeriod => period::calculate(records, params)?,
        ChartType::Breakdown => breakdown::calculate(records, params)?,
        ChartType::Ranking => ranking::calculate(records, params)?,
    };
    Ok(result)
}

/// `table.field`, or just `field` without a table.
pub fn provenance_title(table: Option<&str>, field: &str) -> String {
    match table {
        Some(t) if !t.is_empty() => format!("{}.{}", t, field),
        _ => field.to_string(),
    }
}

/// Contribution of one record: its numeric y value (booleans as 0 or 1),
/// or 1 when y is absent or not a number (so the total becomes a record
/// count).
pub fn record_value(record: &Record, y_field: &str) -> f64 {
    match record.get(y_field) {
        Some(Value::Bool(b)) => f64::from(u8::from(*b)),
        Some(value) => numeric(value).unwrap_or(1.0),
        None => 1.0,
    }
}

/// Per-category totals over `x_field`, with categories in sorted order.
/// Records without an x value are dropped. A total that overflows reads 0.
pub fn category_totals<'r, I>(records: I, x_field: &str, y_field: &str) -> (Vec<String>, Vec<f64>)
where
    I: IntoIterator<Item = &'r Record>,
{
    let mut totals: HashMap<String, f64> = HashMap::new();
    for record in records {
        if let Some(category) = field_label(record, x_field) {
            *totals.entry(category).or_default() += record_value(record, y_field);
        }
    }
    let mut categories: Vec<String> = totals.keys().cloned().collect();
    sort_labels(&mut categories);
    let values = categories
        .iter()
        .map(|c| totals.get(c).copied().map_or(0.0, finite_or_zero))
        .collect();
    (categories, values)
}

/// Totals of `records` laid onto `domain`; slots with no record are 0.
pub fn align_to_domain<'r, I>(records: I, x_field: &str, y_field: &str, domain: &[String]) -> Vec<f64>
where
    I: IntoIterator<Item = &'r Record>,
{
    let (categories, values) = category_totals(records, x_field, y_field);
    let lookup: HashMap<&str, f64> = categories
        .iter()
        .map(String::as_str)
        .zip(values)
        .collect();
    domain
        .iter()
        .map(|x| lookup.get(x.as_str()).copied().unwrap_or(0.0))
        .collect()
}

/// Split `records` by the label of `field`, series names sorted.
/// Records without the field are dropped.
pub fn split_by<'r>(records: &'r [Record], field: &str) -> Vec<(String, Vec<&'r Record>)> {
    let mut groups: HashMap<String, Vec<&Record>> = HashMap::new();
    for record in records {
        if let Some(key) = field_label(record, field) {
            groups.entry(key).or_default().push(record);
        }
    }
    let mut names: Vec<String> = groups.keys().cloned().collect();
    sort_labels(&mut names);
    names
        .into_iter()
        .map(|name| {
            let members = groups.remove(&name).unwrap_or_default();
            (name, members)
        })
        .collect()
}
