//! Multi-series reshaping.
//!
//! Each y field of a request arrives as its own tagged record set. Bar and
//! line charts are laid onto one sorted x domain shared by every series, so
//! all value arrays have the domain's length. Scatter keeps one fit per
//! series. The remaining chart types run over the pooled records, with each
//! series' value moved under the first y field's name.

use crate::chart::{self, align_to_domain, bar, line, provenance_title, scatter, ChartParams};
use crate::data::{distinct_labels, Record};
use crate::enrich::Enricher;
use crate::error::Result;
use crate::formula::DerivedVariable;
use crate::ir::{ChartRequest, ChartResult, ChartType, IndexFilter, NamedSeries, SeriesTag};
use crate::resolve::series_name;
use serde_json::Value;
use tracing::debug;

/// Records of one series and where they came from.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesData {
    pub tag: SeriesTag,
    /// Window the records were selected with, used to name the series.
    pub filter: Option<IndexFilter>,
    pub records: Vec<Record>,
}

impl SeriesData {
    pub fn new(tag: SeriesTag, records: Vec<Record>) -> Self {
        Self {
            tag,
            filter: None,
            records,
        }
    }

    pub fn with_filter(mut self, filter: Option<IndexFilter>) -> Self {
        self.filter = filter;
        self
    }

    fn field(&self) -> &str {
        &self.tag.series_field
    }
}

/// Compute `chart_type` over the tagged series of `request`.
///
/// A `derived_expression` is parsed before any record is read; it then
/// folds the pooled records into one derived field and the chart runs in
/// single-series mode over that field.
pub fn combine(
    chart_type: ChartType,
    request: &ChartRequest,
    series: Vec<SeriesData>,
    enricher: Option<&Enricher>,
) -> Result<ChartResult> {
    let derived = match request.derived_expression.as_deref() {
        Some(source) if !source.trim().is_empty() => Some(DerivedVariable::parse(source)?),
        _ => None,
    };

    if let Some(derived) = derived {
        let pool: Vec<Record> = series.into_iter().flat_map(|s| s.records).collect();
        let records = derived.apply(&pool)?;
        let mut params = ChartParams::from_request(request).with_enricher(enricher);
        params.y_field = &derived.output;
        params.y_table = None;
        return chart::calculate(chart_type, &records, &params);
    }

    if series.len() <= 1 {
        let single = series.into_iter().next();
        let (tag, records) = match single {
            Some(s) => (Some(s.tag), s.records),
            None => (None, Vec::new()),
        };
        let mut params = ChartParams::from_request(request).with_enricher(enricher);
        if let Some(tag) = &tag {
            params.y_field = &tag.series_field;
            params.y_table = tag.series_table.as_deref();
        }
        return chart::calculate(chart_type, &records, &params);
    }

    debug!(chart_type = %chart_type, series = series.len(), "combining series");
    match chart_type {
        ChartType::Bar | ChartType::Line => Ok(shared_domain(chart_type, &request.x_field, &series)),
        ChartType::Scatter => {
            let names = names(&series);
            let fits = series
                .iter()
                .zip(&names)
                .map(|(s, name)| scatter::series(name, &s.records, &request.x_field, s.field()))
                .collect();
            Ok(ChartResult::Scatter(scatter::assemble(
                &request.x_field,
                series[0].field(),
                fits,
                None,
            )))
        }
        ChartType::Pie
        | ChartType::Heatmap
        | ChartType::PeriodOverPeriod
        | ChartType::Breakdown
        | ChartType::Ranking => {
            let value_field = series[0].field().to_string();
            let pool = pool_under(&value_field, series);
            let mut params = ChartParams::from_request(request).with_enricher(enricher);
            params.y_field = &value_field;
            chart::calculate(chart_type, &pool, &params)
        }
    }
}

fn names(series: &[SeriesData]) -> Vec<String> {
    let all: Vec<(&SeriesTag, Option<&IndexFilter>)> =
        series.iter().map(|s| (&s.tag, s.filter.as_ref())).collect();
    series
        .iter()
        .map(|s| series_name(&s.tag, s.filter.as_ref(), &all))
        .collect()
}

/// Lay every series onto the sorted union of x values. A slot a series
/// has no record for holds 0.
fn shared_domain(chart_type: ChartType, x_field: &str, series: &[SeriesData]) -> ChartResult {
    let domain = distinct_labels(series.iter().flat_map(|s| &s.records), x_field);
    let named: Vec<NamedSeries> = series
        .iter()
        .zip(names(series))
        .map(|(s, name)| NamedSeries {
            name,
            values: align_to_domain(&s.records, x_field, s.field(), &domain),
        })
        .collect();
    debug!(domain = domain.len(), series = named.len(), "shared x domain built");

    let mut titles: Vec<String> = Vec::new();
    for s in series {
        let title = provenance_title(s.tag.series_table.as_deref(), s.field());
        if !titles.contains(&title) {
            titles.push(title);
        }
    }
    let title = titles.join(", ");

    if chart_type == ChartType::Line {
        ChartResult::Line(line::assemble(domain, named, None, title))
    } else {
        ChartResult::Bar(bar::assemble(domain, named, None, title))
    }
}

/// Concatenate the series, each record's own value field copied under
/// `value_field`.
fn pool_under(value_field: &str, series: Vec<SeriesData>) -> Vec<Record> {
    let mut pool = Vec::new();
    for SeriesData { tag, records, .. } in series {
        let field = tag.series_field;
        if field == value_field {
            pool.extend(records);
            continue;
        }
        for mut record in records {
            let value = record.get(&field).cloned().unwrap_or(Value::Null);
            record.insert(value_field.to_string(), value);
            pool.push(record);
        }
    }
    pool
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::records_from_json;
    use crate::error::ChartError;
    use crate::ir::OneOrMany;
    use serde_json::json;

    fn tag(i: usize, field: &str) -> SeriesTag {
        SeriesTag {
            series_index: i,
            series_field: field.to_string(),
            series_table: None,
        }
    }

    fn request(chart_type: &str, fields: &[&str]) -> ChartRequest {
        let mut request = ChartRequest::new(chart_type, "month", fields[0]);
        request.y_field = OneOrMany::Many(fields.iter().map(|f| f.to_string()).collect());
        request
    }

    fn two_series() -> Vec<SeriesData> {
        let a = records_from_json(&json!([
            {"month": "1", "a": 2}, {"month": "2", "a": 3}
        ]))
        .unwrap();
        let b = records_from_json(&json!([
            {"month": "2", "b": 10}, {"month": "3", "b": 20}, {"month": "3", "b": 5}
        ]))
        .unwrap();
        vec![SeriesData::new(tag(0, "a"), a), SeriesData::new(tag(1, "b"), b)]
    }

    #[test]
    fn test_bar_disjoint_domains_keep_parity() {
        let result = combine(ChartType::Bar, &request("bar", &["a", "b"]), two_series(), None).unwrap();
        let ChartResult::Bar(bar) = result else {
            panic!("Expected bar");
        };
        assert_eq!(bar.categories, vec!["1", "2", "3"]);
        assert_eq!(bar.series[0].name, "a");
        assert_eq!(bar.series[0].values, vec![2.0, 3.0, 0.0]);
        assert_eq!(bar.series[1].values, vec![0.0, 10.0, 25.0]);
        assert_eq!(bar.values, vec![2.0, 13.0, 25.0]);
        assert_eq!(bar.title, "a, b");
        for s in &bar.series {
            assert_eq!(s.values.len(), bar.categories.len());
        }
    }

    #[test]
    fn test_line_shares_x_axis() {
        let result = combine(ChartType::Line, &request("line", &["a", "b"]), two_series(), None).unwrap();
        let ChartResult::Line(line) = result else {
            panic!("Expected line");
        };
        assert_eq!(line.x_axis.len(), 3);
        assert!(line.trend.is_none());
        assert!(line.series.iter().all(|s| s.values.len() == 3));
    }

    #[test]
    fn test_same_field_series_named_by_window() {
        let records = records_from_json(&json!([{"month": "1", "v": 1}])).unwrap();
        let window = |g: &str| Some(IndexFilter::new("group", Some(json!(g)), Some(json!(g))));
        let series = vec![
            SeriesData::new(tag(0, "v"), records.clone()).with_filter(window("电控组")),
            SeriesData::new(tag(1, "v"), records).with_filter(window("机械组")),
        ];
        let result = combine(ChartType::Bar, &request("bar", &["v", "v"]), series, None).unwrap();
        let ChartResult::Bar(bar) = result else {
            panic!("Expected bar");
        };
        assert_eq!(bar.series[0].name, "v(电控组)");
        assert_eq!(bar.series[1].name, "v(机械组)");
    }

    #[test]
    fn test_scatter_fits_each_series() {
        let a = records_from_json(&json!([{"x": 1, "a": 1}, {"x": 2, "a": 2}, {"x": 3, "a": 3}])).unwrap();
        let b = records_from_json(&json!([{"x": 1, "b": 3}, {"x": 2, "b": 2}, {"x": 3, "b": 1}])).unwrap();
        let mut req = request("scatter", &["a", "b"]);
        req.x_field = "x".to_string();
        let series = vec![SeriesData::new(tag(0, "a"), a), SeriesData::new(tag(1, "b"), b)];
        let ChartResult::Scatter(scatter) = combine(ChartType::Scatter, &req, series, None).unwrap() else {
            panic!("Expected scatter");
        };
        assert_eq!(scatter.series.len(), 2);
        assert!((scatter.series[0].correlation - 1.0).abs() < 1e-9);
        assert!((scatter.series[1].correlation + 1.0).abs() < 1e-9);
        assert_eq!(scatter.correlation, scatter.series[0].correlation);
    }

    #[test]
    fn test_pie_pools_under_first_field() {
        let ChartResult::Pie(pie) = combine(ChartType::Pie, &request("pie", &["a", "b"]), two_series(), None).unwrap()
        else {
            panic!("Expected pie");
        };
        assert_eq!(pie.categories, vec!["1", "2", "3"]);
        assert_eq!(pie.values, vec![2.0, 13.0, 25.0]);
        assert_eq!(pie.total, 40.0);
    }

    #[test]
    fn test_ranking_pools_other_fields() {
        let a = records_from_json(&json!([{"month": "1", "a": "出勤"}, {"month": "2", "a": "出勤"}])).unwrap();
        let b = records_from_json(&json!([{"month": "1", "b": "缺勤"}, {"month": "2"}])).unwrap();
        let series = vec![SeriesData::new(tag(0, "a"), a), SeriesData::new(tag(1, "b"), b)];
        let ChartResult::Ranking(ranking) =
            combine(ChartType::Ranking, &request("ranking", &["a", "b"]), series, None).unwrap()
        else {
            panic!("Expected ranking");
        };
        assert_eq!(ranking.ranks.len(), 2);
        assert!(ranking.ranks.iter().all(|r| r.percentage == 50.0));
    }

    #[test]
    fn test_derived_expression_collapses_series() {
        let mut req = request("bar", &["a", "b"]);
        req.derived_expression = Some("total = a * 10".to_string());
        let ChartResult::Bar(bar) = combine(ChartType::Bar, &req, two_series(), None).unwrap() else {
            panic!("Expected bar");
        };
        // records of the "b" series have no "a": they contribute 0
        assert_eq!(bar.series.len(), 1);
        assert_eq!(bar.series[0].name, "total");
        assert_eq!(bar.categories, vec!["1", "2", "3"]);
        assert_eq!(bar.values, vec![20.0, 30.0, 0.0]);
    }

    #[test]
    fn test_invalid_derived_expression_fails_first() {
        let mut req = request("bar", &["a", "b"]);
        req.derived_expression = Some("x = exec(a)".to_string());
        assert!(matches!(
            combine(ChartType::Bar, &req, two_series(), None),
            Err(ChartError::InvalidFormula { .. })
        ));
    }

    #[test]
    fn test_single_series_uses_its_tag() {
        let records = records_from_json(&json!([{"month": "1", "b": 4}])).unwrap();
        let series = vec![SeriesData::new(
            SeriesTag {
                series_index: 0,
                series_field: "b".into(),
                series_table: Some("sales".into()),
            },
            records,
        )];
        let ChartResult::Bar(bar) = combine(ChartType::Bar, &request("bar", &["a"]), series, None).unwrap() else {
            panic!("Expected bar");
        };
        assert_eq!(bar.values, vec![4.0]);
        assert_eq!(bar.title, "sales.b");
    }
}
