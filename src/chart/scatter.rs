use super::{split_by, ChartParams};
use crate::data::{coerce_number, Record};
use crate::ir::{ChartResult, Regression, ScatterResult, ScatterSeries};
use crate::stats::{pearson, regression};

/// Numeric (x, y) pairs; a record is dropped when either side fails to coerce.
fn points<'r, I>(records: I, x_field: &str, y_field: &str) -> (Vec<f64>, Vec<f64>)
where
    I: IntoIterator<Item = &'r Record>,
{
    records
        .into_iter()
        .filter_map(|r| {
            let x = r.get(x_field).and_then(coerce_number)?;
            let y = r.get(y_field).and_then(coerce_number)?;
            Some((x, y))
        })
        .unzip()
}

/// Correlation and least-squares fit of one series.
pub fn series<'r, I>(name: &str, records: I, x_field: &str, y_field: &str) -> ScatterSeries
where
    I: IntoIterator<Item = &'r Record>,
{
    let (x, y) = points(records, x_field, y_field);
    ScatterSeries {
        name: name.to_string(),
        correlation: pearson(&x, &y),
        regression: regression(&x, &y),
        x,
        y,
    }
}

pub fn calculate(records: &[Record], params: &ChartParams) -> ChartResult {
    let all = match params.series_field {
        Some(field) => split_by(records, field)
            .into_iter()
            .map(|(name, members)| series(&name, members, params.x_field, params.y_field))
            .collect(),
        None => vec![series(params.y_field, records, params.x_field, params.y_field)],
    };
    ChartResult::Scatter(assemble(
        params.x_field,
        params.y_field,
        all,
        params.series_field.map(str::to_string),
    ))
}

/// Top-level correlation/regression mirror the first series.
pub fn assemble(
    x_field: &str,
    y_field: &str,
    series: Vec<ScatterSeries>,
    series_field: Option<String>,
) -> ScatterResult {
    let (correlation, regression) = series
        .first()
        .map(|s| (s.correlation, s.regression.clone()))
        .unwrap_or((0.0, Regression::default()));
    ScatterResult {
        x_field: x_field.to_string(),
        y_field: y_field.to_string(),
        series,
        correlation,
        regression,
        series_field,
    }
}
