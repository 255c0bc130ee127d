use crate::data::{compare_values, Record};
use crate::error::ChartError;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

// =============================================================================
// Request
// =============================================================================

/// Default number of rows a ranking returns.
pub const DEFAULT_LIMIT: i64 = 5;

/// A parameter that is either a single value (broadcast to every series)
/// or one value per series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> Default for OneOrMany<T> {
    fn default() -> Self {
        OneOrMany::Many(Vec::new())
    }
}

impl<T: Clone> OneOrMany<T> {
    pub fn len(&self) -> usize {
        match self {
            OneOrMany::One(_) => 1,
            OneOrMany::Many(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn first(&self) -> Option<&T> {
        match self {
            OneOrMany::One(v) => Some(v),
            OneOrMany::Many(v) => v.first(),
        }
    }

    pub fn to_vec(&self) -> Vec<T> {
        match self {
            OneOrMany::One(v) => vec![v.clone()],
            OneOrMany::Many(v) => v.clone(),
        }
    }

    /// Spread over `n` series. A single value is broadcast; a list shorter
    /// than `n` repeats its last element; an empty list yields `None`s.
    /// Lists longer than `n` are cut to `n`.
    pub fn padded(&self, n: usize) -> Vec<Option<T>> {
        let values = self.to_vec();
        (0..n)
            .map(|i| values.get(i).or_else(|| values.last()).cloned())
            .collect()
    }
}

impl<T> From<T> for OneOrMany<T> {
    fn from(value: T) -> Self {
        OneOrMany::One(value)
    }
}

impl<T> From<Vec<T>> for OneOrMany<T> {
    fn from(values: Vec<T>) -> Self {
        OneOrMany::Many(values)
    }
}

fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn default_limit() -> i64 {
    DEFAULT_LIMIT
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Ascending,
    #[default]
    Descending,
}

/// An already-resolved chart request.
///
/// Table names are provenance tags only: they label output and select the
/// table a series is fetched from, but never influence aggregation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartRequest {
    /// Chart type tag; validated at dispatch so unknown tags surface as
    /// `UnsupportedChartType` rather than a parse failure.
    pub chart_type: String,
    #[serde(default)]
    pub x_field: String,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "OneOrMany::is_empty")]
    pub y_field: OneOrMany<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x_table: Option<String>,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "OneOrMany::is_empty")]
    pub y_table: OneOrMany<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x_index_field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x_start: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x_end: Option<Value>,

    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "OneOrMany::is_empty")]
    pub y_index_field: OneOrMany<String>,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "OneOrMany::is_empty")]
    pub y_start: OneOrMany<Value>,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "OneOrMany::is_empty")]
    pub y_end: OneOrMany<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_by: Option<String>,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "OneOrMany::is_empty")]
    pub group_by_fields: OneOrMany<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub series_field: Option<String>,

    /// Ranking row limit; zero or negative means unlimited.
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub order: SortOrder,

    /// Derived variable in assignment form, e.g. `total = a + b`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub derived_expression: Option<String>,
    /// Value a ranking row must hold to count as a match.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_value: Option<Value>,
}

impl ChartRequest {
    pub fn new(chart_type: &str, x_field: &str, y_field: &str) -> Self {
        Self {
            chart_type: chart_type.to_string(),
            x_field: x_field.to_string(),
            y_field: OneOrMany::One(y_field.to_string()),
            x_table: None,
            y_table: OneOrMany::default(),
            x_index_field: None,
            x_start: None,
            x_end: None,
            y_index_field: OneOrMany::default(),
            y_start: OneOrMany::default(),
            y_end: OneOrMany::default(),
            group_by: None,
            group_by_fields: OneOrMany::default(),
            series_field: None,
            limit: DEFAULT_LIMIT,
            order: SortOrder::Descending,
            derived_expression: None,
            match_value: None,
        }
    }

    pub fn chart_type(&self) -> Result<ChartType, ChartError> {
        self.chart_type.parse()
    }

    /// The first y field; the value field of single-series charts.
    pub fn primary_y_field(&self) -> &str {
        self.y_field.first().map(String::as_str).unwrap_or("")
    }

    /// Row limit for rankings; `None` means unlimited.
    pub fn row_limit(&self) -> Option<usize> {
        if self.limit > 0 {
            Some(self.limit as usize)
        } else {
            None
        }
    }

    pub fn x_filter(&self) -> Option<IndexFilter> {
        self.x_index_field
            .as_ref()
            .map(|f| IndexFilter::new(f, self.x_start.clone(), self.x_end.clone()))
            .filter(IndexFilter::is_bounded)
    }
}

/// Inclusive `[start, end]` window over one field. Missing bounds are open.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexFilter {
    pub field: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<Value>,
}

impl IndexFilter {
    pub fn new(field: &str, start: Option<Value>, end: Option<Value>) -> Self {
        let bound = |v: Option<Value>| v.filter(|v| !v.is_null() && v.as_str() != Some(""));
        Self {
            field: field.to_string(),
            start: bound(start),
            end: bound(end),
        }
    }

    pub fn is_bounded(&self) -> bool {
        self.start.is_some() || self.end.is_some()
    }

    /// Records lacking the field never match a bounded window.
    pub fn matches(&self, record: &Record) -> bool {
        if !self.is_bounded() {
            return true;
        }
        let value = match record.get(&self.field) {
            Some(v) if !v.is_null() => v,
            _ => return false,
        };
        let above = self
            .start
            .as_ref()
            .map_or(true, |s| compare_values(value, s) != Ordering::Less);
        let below = self
            .end
            .as_ref()
            .map_or(true, |e| compare_values(value, e) != Ordering::Greater);
        above && below
    }
}

// =============================================================================
// Chart types
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartType {
    Bar,
    Line,
    Pie,
    Scatter,
    Heatmap,
    #[serde(rename = "yoy_mom")]
    PeriodOverPeriod,
    #[serde(rename = "multi_field")]
    Breakdown,
    Ranking,
}

impl ChartType {
    pub const ALL: [ChartType; 8] = [
        ChartType::Bar,
        ChartType::Line,
        ChartType::Pie,
        ChartType::Scatter,
        ChartType::Heatmap,
        ChartType::PeriodOverPeriod,
        ChartType::Breakdown,
        ChartType::Ranking,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ChartType::Bar => "bar",
            ChartType::Line => "line",
            ChartType::Pie => "pie",
            ChartType::Scatter => "scatter",
            ChartType::Heatmap => "heatmap",
            ChartType::PeriodOverPeriod => "yoy_mom",
            ChartType::Breakdown => "multi_field",
            ChartType::Ranking => "ranking",
        }
    }
}

impl fmt::Display for ChartType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChartType {
    type Err = ChartError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bar" => Ok(ChartType::Bar),
            "line" => Ok(ChartType::Line),
            "pie" => Ok(ChartType::Pie),
            "scatter" => Ok(ChartType::Scatter),
            "heatmap" => Ok(ChartType::Heatmap),
            "yoy_mom" | "period_over_period" => Ok(ChartType::PeriodOverPeriod),
            "multi_field" | "breakdown" => Ok(ChartType::Breakdown),
            "ranking" => Ok(ChartType::Ranking),
            _ => Err(ChartError::UnsupportedChartType(s.to_string())),
        }
    }
}

/// Provenance of a record set belonging to the i-th y field of a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeriesTag {
    pub series_index: usize,
    pub series_field: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub series_table: Option<String>,
}

// =============================================================================
// Results
// =============================================================================

/// Chart payload, tagged by chart type. Every number is finite.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "chart_type", rename_all = "snake_case")]
pub enum ChartResult {
    Bar(BarResult),
    Line(LineResult),
    Pie(PieResult),
    Scatter(ScatterResult),
    Heatmap(HeatmapResult),
    #[serde(rename = "yoy_mom")]
    PeriodOverPeriod(PeriodResult),
    #[serde(rename = "multi_field")]
    Breakdown(BreakdownResult),
    Ranking(RankingResult),
}

impl ChartResult {
    pub fn chart_type(&self) -> ChartType {
        match self {
            ChartResult::Bar(_) => ChartType::Bar,
            ChartResult::Line(_) => ChartType::Line,
            ChartResult::Pie(_) => ChartType::Pie,
            ChartResult::Scatter(_) => ChartType::Scatter,
            ChartResult::Heatmap(_) => ChartType::Heatmap,
            ChartResult::PeriodOverPeriod(_) => ChartType::PeriodOverPeriod,
            ChartResult::Breakdown(_) => ChartType::Breakdown,
            ChartResult::Ranking(_) => ChartType::Ranking,
        }
    }
}

/// One value per shared category / x-axis slot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NamedSeries {
    pub name: String,
    pub values: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct SeriesStatistics {
    pub name: String,
    pub mean: f64,
    pub median: f64,
    pub max: f64,
    pub min: f64,
    pub sum: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BarResult {
    pub categories: Vec<String>,
    /// Per-category total across all series.
    pub values: Vec<f64>,
    pub series: Vec<NamedSeries>,
    pub statistics: Vec<SeriesStatistics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub series_field: Option<String>,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct TrendSummary {
    pub slope: f64,
    pub intercept: f64,
    pub forecast_next: f64,
    pub moving_average: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineResult {
    pub x_axis: Vec<String>,
    pub series: Vec<NamedSeries>,
    /// Present for single-series lines only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trend: Option<TrendSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub series_field: Option<String>,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PieResult {
    pub categories: Vec<String>,
    pub values: Vec<f64>,
    pub percentages: Vec<f64>,
    pub total: f64,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Regression {
    pub slope: f64,
    pub intercept: f64,
    /// Fitted y for every input x, in input order.
    pub line: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScatterSeries {
    pub name: String,
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub correlation: f64,
    pub regression: Regression,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScatterResult {
    pub x_field: String,
    pub y_field: String,
    pub series: Vec<ScatterSeries>,
    /// Correlation of the first series (0 with no series).
    pub correlation: f64,
    pub regression: Regression,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub series_field: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeatmapResult {
    pub x_field: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_field: Option<String>,
    pub value_field: String,
    pub x_labels: Vec<String>,
    pub y_labels: Vec<String>,
    /// `matrix[row][col]`, rows follow `y_labels`, columns follow `x_labels`.
    pub matrix: Vec<Vec<f64>>,
    pub max_value: f64,
    pub min_value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodValue {
    /// `YYYY-MM`
    pub period: String,
    pub value: f64,
    pub avg: f64,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodChange {
    pub absolute: f64,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_field: Option<String>,
    pub value_field: String,
    pub periods: Vec<PeriodValue>,
    pub current: Option<PeriodValue>,
    pub previous_period: Option<PeriodValue>,
    pub previous_year: Option<PeriodValue>,
    pub mom_change: Option<PeriodChange>,
    pub yoy_change: Option<PeriodChange>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BreakdownRow {
    /// One key per dimension, aligned with `BreakdownResult::dimensions`.
    pub keys: Vec<String>,
    pub count: usize,
    pub sum: f64,
    pub avg: f64,
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct BreakdownSummary {
    pub total_groups: usize,
    pub total_records: usize,
    pub total_sum: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BreakdownResult {
    pub dimensions: Vec<String>,
    pub value_field: String,
    pub groups: Vec<BreakdownRow>,
    pub summary: BreakdownSummary,
    pub dimension_values: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankRow {
    pub group: String,
    pub total: f64,
    pub matches: f64,
    pub percentage: f64,
    pub rank: usize,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct RankingStats {
    pub average_percentage: f64,
    pub max_percentage: f64,
    pub min_percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankingResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_by: Option<String>,
    pub value_field: String,
    pub order: SortOrder,
    pub ranks: Vec<RankRow>,
    pub stats: RankingStats,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_padded_repeats_last() {
        let many: OneOrMany<String> = vec!["a".to_string(), "b".to_string()].into();
        assert_eq!(
            many.padded(4),
            vec![Some("a".into()), Some("b".into()), Some("b".into()), Some("b".into())]
        );
        let one: OneOrMany<String> = "t".to_string().into();
        assert_eq!(one.padded(2), vec![Some("t".into()), Some("t".into())]);
        let none: OneOrMany<String> = OneOrMany::default();
        assert_eq!(none.padded(2), vec![None, None]);
    }

    #[test]
    fn test_request_deserializes_one_or_many() {
        let request: ChartRequest = serde_json::from_value(json!({
            "chart_type": "bar",
            "x_field": "lasttime",
            "y_field": ["totaltime", "totaltime"],
            "y_table": "sign_daytask",
            "y_index_field": ["jlugroup"],
            "y_start": ["电控组", "机械组"],
            "y_end": null,
        }))
        .unwrap();
        assert_eq!(request.y_field.len(), 2);
        assert_eq!(request.y_table, OneOrMany::One("sign_daytask".to_string()));
        assert_eq!(request.y_start.len(), 2);
        assert!(request.y_end.is_empty());
        assert_eq!(request.limit, DEFAULT_LIMIT);
        assert_eq!(request.order, SortOrder::Descending);
    }

    #[test]
    fn test_chart_type_tags() {
        assert_eq!("BAR".parse::<ChartType>().unwrap(), ChartType::Bar);
        assert_eq!("yoy_mom".parse::<ChartType>().unwrap(), ChartType::PeriodOverPeriod);
        assert_eq!("breakdown".parse::<ChartType>().unwrap(), ChartType::Breakdown);
        for t in ChartType::ALL {
            assert_eq!(t.as_str().parse::<ChartType>().unwrap(), t);
        }
        assert!(matches!(
            "radar".parse::<ChartType>(),
            Err(ChartError::UnsupportedChartType(_))
        ));
    }

    #[test]
    fn test_index_filter_inclusive() {
        let filter = IndexFilter::new("d", Some(json!("2024-01-01")), Some(json!("2024-01-31")));
        let rec = |v: Value| -> Record { [("d".to_string(), v)].into_iter().collect() };
        assert!(filter.matches(&rec(json!("2024-01-01"))));
        assert!(filter.matches(&rec(json!("2024-01-31"))));
        assert!(!filter.matches(&rec(json!("2024-02-01"))));
        assert!(!filter.matches(&Record::new()));

        let group = IndexFilter::new("g", Some(json!("电控组")), Some(json!("电控组")));
        assert!(group.matches(&[("g".to_string(), json!("电控组"))].into_iter().collect()));
        assert!(!group.matches(&[("g".to_string(), json!("机械组"))].into_iter().collect()));
    }

    #[test]
    fn test_result_is_tagged() {
        let result = ChartResult::Pie(PieResult {
            categories: vec![],
            values: vec![],
            percentages: vec![],
            total: 0.0,
            title: String::new(),
        });
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["chart_type"], "pie");
        assert_eq!(result.chart_type(), ChartType::Pie);
    }
}
