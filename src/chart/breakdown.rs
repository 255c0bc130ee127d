use super::ChartParams;
use crate::data::{field_label, has_field, numeric, sort_labels, Record};
use crate::detect::breakdown_fields;
use crate::error::{ChartError, Result};
use crate::ir::{BreakdownResult, BreakdownRow, BreakdownSummary, ChartResult};
use crate::stats::{finite_or_zero, max, min};
use std::collections::{BTreeMap, BTreeSet};
use tracing::warn;

/// Most dimensions a breakdown groups by, and the number picked
/// automatically when the caller names none.
const MAX_DIMENSIONS: usize = 2;

#[derive(Default)]
struct Cell {
    count: usize,
    values: Vec<f64>,
}

/// Caller-supplied dimensions win (`group_by_fields`, then `group_by`, then
/// `x_field` when records carry it); otherwise up to two non-identifier,
/// non-date fields are chosen. Caller lists are cut to the first two.
fn dimensions(records: &[Record], params: &ChartParams) -> Vec<String> {
    if !params.group_by_fields.is_empty() {
        let fields = &params.group_by_fields;
        if fields.len() > MAX_DIMENSIONS {
            warn!(
                requested = fields.len(),
                kept = MAX_DIMENSIONS,
                "breakdown dimensions truncated"
            );
        }
        return fields.iter().take(MAX_DIMENSIONS).cloned().collect();
    }
    if let Some(field) = params.group_by {
        return vec![field.to_string()];
    }
    if !params.x_field.is_empty() && has_field(records, params.x_field) {
        return vec![params.x_field.to_string()];
    }
    breakdown_fields(records, params.y_field, MAX_DIMENSIONS)
}

pub fn calculate(records: &[Record], params: &ChartParams) -> Result<ChartResult> {
    let dims = dimensions(records, params);
    if dims.is_empty() && !records.is_empty() {
        return Err(ChartError::UnresolvableGroupingField(
            "no field is suitable as a breakdown dimension".to_string(),
        ));
    }

    let mut cells: BTreeMap<Vec<String>, Cell> = BTreeMap::new();
    let mut seen: Vec<BTreeSet<String>> = vec![BTreeSet::new(); dims.len()];
    for record in records {
        let Some(key) = dims
            .iter()
            .map(|d| field_label(record, d))
            .collect::<Option<Vec<String>>>()
        else {
            continue;
        };
        for (set, k) in seen.iter_mut().zip(&key) {
            set.insert(k.clone());
        }
        let cell = cells.entry(key).or_default();
        cell.count += 1;
        if let Some(v) = record.get(params.y_field).and_then(numeric) {
            cell.values.push(v);
        }
    }

    let groups: Vec<BreakdownRow> = cells
        .into_iter()
        .map(|(keys, cell)| {
            let sum = finite_or_zero(cell.values.iter().sum());
            BreakdownRow {
                keys,
                count: cell.count,
                avg: if cell.values.is_empty() {
                    0.0
                } else {
                    finite_or_zero(sum / cell.values.len() as f64)
                },
                min: min(&cell.values),
                max: max(&cell.values),
                sum,
            }
        })
        .collect();

    let summary = BreakdownSummary {
        total_groups: groups.len(),
        total_records: groups.iter().map(|g| g.count).sum(),
        total_sum: finite_or_zero(groups.iter().map(|g| g.sum).sum()),
    };
    let dimension_values = dims
        .iter()
        .zip(seen)
        .map(|(d, set)| {
            let mut values: Vec<String> = set.into_iter().collect();
            sort_labels(&mut values);
            (d.clone(), values)
        })
        .collect();

    Ok(ChartResult::Breakdown(BreakdownResult {
        dimensions: dims,
        value_field: params.y_field.to_string(),
        groups,
        summary,
        dimension_values,
    }))
}
