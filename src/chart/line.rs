use super::{align_to_domain, category_totals, split_by, ChartParams};
use crate::data::Record;
use crate::ir::{ChartResult, LineResult, NamedSeries};
use crate::stats::trend;

/// Ordered x-axis (numeric when every label parses, else lexicographic).
/// A single series also gets a trend, forecast and moving average.
pub fn calculate(records: &[Record], params: &ChartParams) -> ChartResult {
    let (x_axis, values) = category_totals(records, params.x_field, params.y_field);

    let Some(series_field) = params.series_field else {
        let summary = trend(&values);
        return ChartResult::Line(LineResult {
            x_axis,
            series: vec![NamedSeries {
                name: params.y_field.to_string(),
                values,
            }],
            trend: Some(summary),
            series_field: None,
            title: params.title(),
        });
    };

    let series = split_by(records, series_field)
        .into_iter()
        .map(|(name, members)| NamedSeries {
            values: align_to_domain(members, params.x_field, params.y_field, &x_axis),
            name,
        })
        .collect();
    ChartResult::Line(assemble(x_axis, series, Some(series_field.to_string()), params.title()))
}

/// Multi-series line over an already shared x-axis; no trend block.
pub fn assemble(
    x_axis: Vec<String>,
    series: Vec<NamedSeries>,
    series_field: Option<String>,
    title: String,
) -> LineResult {
    LineResult {
        x_axis,
        series,
        trend: None,
        series_field,
        title,
    }
}
