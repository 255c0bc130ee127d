use super::{align_to_domain, category_totals, split_by, ChartParams};
use crate::data::Record;
use crate::ir::{BarResult, ChartResult, NamedSeries};
use crate::stats::{describe, finite_or_zero};

/// Categories over `x_field`, one value per category. With a
/// `series_field` every distinct series value gets its own array aligned
/// to the shared category domain.
pub fn calculate(records: &[Record], params: &ChartParams) -> ChartResult {
    let title = params.title();

    let Some(series_field) = params.series_field else {
        let (categories, values) = category_totals(records, params.x_field, params.y_field);
        let series = vec![NamedSeries {
            name: params.y_field.to_string(),
            values,
        }];
        return ChartResult::Bar(assemble(categories, series, None, title));
    };

    let (categories, _) = category_totals(records, params.x_field, params.y_field);
    let series = split_by(records, series_field)
        .into_iter()
        .map(|(name, members)| NamedSeries {
            values: align_to_domain(members, params.x_field, params.y_field, &categories),
            name,
        })
        .collect();
    ChartResult::Bar(assemble(categories, series, Some(series_field.to_string()), title))
}

/// Build the bar payload from series already aligned to `categories`.
pub fn assemble(
    categories: Vec<String>,
    series: Vec<NamedSeries>,
    series_field: Option<String>,
    title: String,
) -> BarResult {
    let values = (0..categories.len())
        .map(|i| finite_or_zero(series.iter().map(|s| s.values.get(i).copied().unwrap_or(0.0)).sum::<f64>()))
        .collect();
    let statistics = series.iter().map(|s| describe(&s.name, &s.values)).collect();
    BarResult {
        categories,
        values,
        series,
        statistics,
        series_field,
        title,
    }
}
