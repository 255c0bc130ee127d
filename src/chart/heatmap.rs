use super::{record_value, ChartParams};
use crate::data::{distinct_labels, field_label, Record};
use crate::detect::{date_field_candidates, is_id_like};
use crate::ir::{ChartResult, HeatmapResult};
use crate::stats::{finite_or_zero, max, min};
use std::collections::HashMap;

/// Second axis: the first field of the first record that is not the x or
/// value field (identifiers skipped), else a date-like field, else the
/// value field itself.
pub fn select_row_field(records: &[Record], x_field: &str, y_field: &str) -> Option<String> {
    let first = records.first()?;
    let usable = |f: &str| f != x_field && f != y_field;
    first
        .keys()
        .find(|f| usable(f.as_str()) && !is_id_like(f.as_str()))
        .cloned()
        .or_else(|| {
            date_field_candidates(records)
                .into_iter()
                .find(|f| usable(f.as_str()))
        })
        .or_else(|| (!y_field.is_empty()).then(|| y_field.to_string()))
}

pub fn calculate(records: &[Record], params: &ChartParams) -> ChartResult {
    let (x_field, y_field) = (params.x_field, params.y_field);

    let Some(row_field) = select_row_field(records, x_field, y_field) else {
        return ChartResult::Heatmap(HeatmapResult {
            x_field: x_field.to_string(),
            row_field: None,
            value_field: y_field.to_string(),
            x_labels: Vec::new(),
            y_labels: Vec::new(),
            matrix: Vec::new(),
            max_value: 0.0,
            min_value: 0.0,
        });
    };

    let x_labels = distinct_labels(records, x_field);
    let y_labels = distinct_labels(records, &row_field);
    let col_of: HashMap<&str, usize> = x_labels.iter().enumerate().map(|(i, l)| (l.as_str(), i)).collect();
    let row_of: HashMap<&str, usize> = y_labels.iter().enumerate().map(|(i, l)| (l.as_str(), i)).collect();

    let mut matrix = vec![vec![0.0; x_labels.len()]; y_labels.len()];
    for record in records {
        let (Some(col), Some(row)) = (field_label(record, x_field), field_label(record, &row_field)) else {
            continue;
        };
        if let (Some(&c), Some(&r)) = (col_of.get(col.as_str()), row_of.get(row.as_str())) {
            matrix[r][c] += record_value(record, y_field);
        }
    }

    for cell in matrix.iter_mut().flatten() {
        *cell = finite_or_zero(*cell);
    }

    let cells: Vec<f64> = matrix.iter().flatten().copied().collect();
    ChartResult::Heatmap(HeatmapResult {
        x_field: x_field.to_string(),
        row_field: Some(row_field),
        value_field: y_field.to_string(),
        x_labels,
        y_labels,
        max_value: max(&cells),
        min_value: min(&cells),
        matrix,
    })
}
