use super::ChartParams;
use crate::aggregate::{aggregate, Aggregation, AggregationSpec, Condition};
use crate::data::{coerce_number, field_label, has_field, Record};
use crate::detect::fallback_group_field;
use crate::enrich::Enricher;
use crate::error::{ChartError, Result};
use crate::ir::{ChartResult, RankRow, RankingResult, RankingStats, SortOrder};
use crate::metric::{self, MetricFormat, MetricSpec};
use crate::stats::{max, mean, min, round2};
use std::borrow::Cow;
use tracing::{debug, warn};

const TOTAL: &str = "total";
const MATCHES: &str = "matches";
const PERCENTAGE: &str = "percentage";

/// Find the grouping field, enriching the records when the wanted field
/// lives in another collection. Falls back to the first non-identifier,
/// non-date field.
fn resolve_group_field<'r>(
    records: &'r [Record],
    wanted: Option<&str>,
    value_field: &str,
    enricher: Option<&Enricher>,
) -> Result<(String, Cow<'r, [Record]>)> {
    if let Some(field) = wanted {
        if has_field(records, field) {
            return Ok((field.to_string(), Cow::Borrowed(records)));
        }
        if let Some(enriched) = enricher.and_then(|e| try_enrich(e, records, field)) {
            if has_field(&enriched, field) {
                return Ok((field.to_string(), Cow::Owned(enriched)));
            }
        }
    }

    match fallback_group_field(records, value_field) {
        Some(field) => {
            warn!(wanted = ?wanted, fallback = %field, "grouping field unavailable, using fallback");
            Ok((field, Cow::Borrowed(records)))
        }
        None => Err(ChartError::UnresolvableGroupingField(format!(
            "'{}' is not in the records and no fallback field exists",
            wanted.unwrap_or_default()
        ))),
    }
}

/// Enrichment failures degrade to the un-enriched records.
fn try_enrich(enricher: &Enricher, records: &[Record], field: &str) -> Option<Vec<Record>> {
    let plan = enricher.plan_for_field(records, field)?;
    match enricher.enrich(records, &plan) {
        Ok(enriched) => Some(enriched),
        Err(err) => {
            warn!(error = %err, "enrichment failed, continuing without it");
            None
        }
    }
}

fn empty(params: &ChartParams, group_by: Option<String>) -> ChartResult {
    ChartResult::Ranking(RankingResult {
        group_by,
        value_field: params.y_field.to_string(),
        order: params.order,
        ranks: Vec::new(),
        stats: RankingStats::default(),
    })
}

/// Share of records per group whose value equals the match value, ranked.
///
/// Sorting is stable, so equal percentages keep their group order (first
/// appearance in the input). Ranks are assigned after truncation.
pub fn calculate(records: &[Record], params: &ChartParams) -> Result<ChartResult> {
    if records.is_empty() {
        return Ok(empty(params, params.group_by.map(str::to_string)));
    }

    let wanted = params
        .group_by
        .or_else(|| (!params.x_field.is_empty()).then_some(params.x_field));
    let (group_by, records) =
        resolve_group_field(records, wanted, params.y_field, params.enricher)?;

    let specs = [
        AggregationSpec::new(Aggregation::Count, params.y_field, TOTAL),
        AggregationSpec::new(Aggregation::Count, params.y_field, MATCHES)
            .when(Condition::new(params.y_field, params.match_value.clone())),
    ];
    let grouped = aggregate(&records, &group_by, &specs);
    let metrics = [MetricSpec::new(
        PERCENTAGE,
        &format!("{}/{}*100", MATCHES, TOTAL),
        MetricFormat::Percentage,
    )];
    let scored = metric::apply(&grouped, &metrics)?;

    let read = |r: &Record, f: &str| r.get(f).and_then(coerce_number).unwrap_or(0.0);
    let mut rows: Vec<RankRow> = scored
        .iter()
        .map(|r| RankRow {
            group: field_label(r, &group_by).unwrap_or_default(),
            total: read(r, TOTAL),
            matches: read(r, MATCHES),
            percentage: read(r, PERCENTAGE),
            rank: 0,
        })
        .collect();

    match params.order {
        SortOrder::Descending => rows.sort_by(|a, b| b.percentage.total_cmp(&a.percentage)),
        SortOrder::Ascending => rows.sort_by(|a, b| a.percentage.total_cmp(&b.percentage)),
    }
    if let Some(limit) = params.limit {
        rows.truncate(limit);
    }
    for (i, row) in rows.iter_mut().enumerate() {
        row.rank = i + 1;
    }

    let percentages: Vec<f64> = rows.iter().map(|r| r.percentage).collect();
    let stats = RankingStats {
        average_percentage: round2(mean(&percentages)),
        max_percentage: max(&percentages),
        min_percentage: min(&percentages),
    };
    debug!(group_by = %group_by, groups = scored.len(), returned = rows.len(), "ranked groups");

    Ok(ChartResult::Ranking(RankingResult {
        group_by: Some(group_by),
        value_field: params.y_field.to_string(),
        order: params.order,
        ranks: rows,
        stats,
    }))
}
