use super::ChartParams;
use crate::data::{label, numeric, Record};
use crate::detect::date_field_candidates;
use crate::error::{ChartError, Result};
use crate::ir::{ChartResult, PeriodChange, PeriodResult, PeriodValue};
use crate::stats::{finite_or_zero, round2};
use chrono::{Datelike, NaiveDate};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::warn;

/// First day of the month a date-like value falls in. Accepts
/// `YYYY-MM-DD`, `YYYY/M/D`, `YYYY-MM` and ISO timestamps.
pub fn year_month(value: &Value) -> Option<NaiveDate> {
    let text = label(value)?;
    let mut parts = text.trim().split(['-', '/']);
    let year = parts.next()?;
    if year.len() != 4 {
        return None;
    }
    let year: i32 = year.parse().ok()?;
    let month: String = parts.next()?.chars().take_while(|c| c.is_ascii_digit()).collect();
    if month.is_empty() || month.len() > 2 {
        return None;
    }
    NaiveDate::from_ymd_opt(year, month.parse().ok()?, 1)
}

/// The date field to bucket on: `x_field` when it holds dates, otherwise
/// the single date-like field that does. No candidate, or more than one,
/// is an error rather than a guess.
pub fn select_date_field(records: &[Record], x_field: &str) -> Result<String> {
    let holds_dates = |field: &str| records.iter().any(|r| r.get(field).and_then(year_month).is_some());

    if !x_field.is_empty() && holds_dates(x_field) {
        return Ok(x_field.to_string());
    }
    let mut candidates: Vec<String> = date_field_candidates(records)
        .into_iter()
        .filter(|f| holds_dates(f))
        .collect();
    match candidates.len() {
        0 => Err(ChartError::UnresolvableGroupingField(
            "no field holds YYYY-MM dates".to_string(),
        )),
        1 => Ok(candidates.remove(0)),
        _ => Err(ChartError::UnresolvableGroupingField(format!(
            "several date fields ({}); name one as x_field",
            candidates.join(", ")
        ))),
    }
}

#[derive(Default)]
struct Bucket {
    count: usize,
    numeric_count: usize,
    sum: f64,
}

impl Bucket {
    /// Sum when the bucket holds numbers, record count otherwise.
    fn value(&self) -> f64 {
        if self.numeric_count > 0 {
            finite_or_zero(self.sum)
        } else {
            self.count as f64
        }
    }

    fn summary(&self, month: NaiveDate) -> PeriodValue {
        PeriodValue {
            period: month.format("%Y-%m").to_string(),
            value: self.value(),
            avg: if self.numeric_count > 0 {
                finite_or_zero(self.sum / self.numeric_count as f64)
            } else {
                0.0
            },
            count: self.count,
        }
    }
}

/// Delta against `base`; a zero base reports the current value and 100%.
pub fn change(current: f64, base: f64) -> PeriodChange {
    if base == 0.0 {
        PeriodChange {
            absolute: current,
            percentage: 100.0,
        }
    } else {
        PeriodChange {
            absolute: finite_or_zero(current - base),
            percentage: round2((current - base) / base * 100.0),
        }
    }
}

pub fn calculate(records: &[Record], params: &ChartParams) -> Result<ChartResult> {
    let value_field = params.y_field.to_string();
    if records.is_empty() {
        return Ok(ChartResult::PeriodOverPeriod(PeriodResult {
            date_field: None,
            value_field,
            periods: Vec::new(),
            current: None,
            previous_period: None,
            previous_year: None,
            mom_change: None,
            yoy_change: None,
        }));
    }

    let date_field = select_date_field(records, params.x_field)?;

    let mut buckets: BTreeMap<NaiveDate, Bucket> = BTreeMap::new();
    let mut skipped = 0usize;
    for record in records {
        let Some(month) = record.get(&date_field).and_then(year_month) else {
            skipped += 1;
            continue;
        };
        let bucket = buckets.entry(month).or_default();
        bucket.count += 1;
        if let Some(v) = record.get(params.y_field).and_then(numeric) {
            bucket.numeric_count += 1;
            bucket.sum += v;
        }
    }
    if skipped > 0 {
        warn!(date_field = %date_field, skipped, "records without a usable date skipped");
    }

    let periods: Vec<PeriodValue> = buckets.iter().map(|(m, b)| b.summary(*m)).collect();

    let latest = buckets.iter().next_back();
    let current = latest.map(|(m, b)| b.summary(*m));
    let previous_period = buckets.iter().rev().nth(1).map(|(m, b)| b.summary(*m));
    let previous_year = latest
        .and_then(|(m, _)| m.with_year(m.year() - 1))
        .and_then(|prev| buckets.get(&prev).map(|b| b.summary(prev)));

    let mom_change = match (&current, &previous_period) {
        (Some(c), Some(p)) => Some(change(c.value, p.value)),
        _ => None,
    };
    let yoy_change = match (&current, &previous_year) {
        (Some(c), Some(p)) => Some(change(c.value, p.value)),
        _ => None,
    };

    Ok(ChartResult::PeriodOverPeriod(PeriodResult {
        date_field: Some(date_field),
        value_field,
        periods,
        current,
        previous_period,
        previous_year,
        mom_change,
        yoy_change,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::records_from_json;
    use serde_json::json;

    fn period(result: ChartResult) -> PeriodResult {
        match result {
            ChartResult::PeriodOverPeriod(p) => p,
            other => panic!("Expected period-over-period, got {:?}", other),
        }
    }

    #[test]
    fn test_year_month() {
        assert_eq!(year_month(&json!("2024-03-05")), NaiveDate::from_ymd_opt(2024, 3, 1));
        assert_eq!(year_month(&json!("2024/3/5")), NaiveDate::from_ymd_opt(2024, 3, 1));
        assert_eq!(year_month(&json!("2024-03-05T10:00:00Z")), NaiveDate::from_ymd_opt(2024, 3, 1));
        assert_eq!(year_month(&json!("2024-13-01")), None);
        assert_eq!(year_month(&json!("05/03/2024")), None);
        assert_eq!(year_month(&json!(20240305)), None);
    }

    #[test]
    fn test_mom_and_yoy() {
        let records = records_from_json(&json!([
            {"日期": "2023-03-10", "v": 50},
            {"日期": "2024-02-01", "v": 80},
            {"日期": "2024-03-01", "v": 60},
            {"日期": "2024-03-15", "v": 40},
            {"日期": "bad", "v": 999}
        ]))
        .unwrap();
        let result = period(calculate(&records, &ChartParams::new("", "v")).unwrap());
        assert_eq!(result.date_field.as_deref(), Some("日期"));
        assert_eq!(result.periods.len(), 3);

        let current = result.current.unwrap();
        assert_eq!(current.period, "2024-03");
        assert_eq!(current.value, 100.0);
        assert_eq!(current.avg, 50.0);

        assert_eq!(result.previous_period.unwrap().period, "2024-02");
        let mom = result.mom_change.unwrap();
        assert_eq!(mom.absolute, 20.0);
        assert_eq!(mom.percentage, 25.0);

        let yoy = result.yoy_change.unwrap();
        assert_eq!(yoy.absolute, 50.0);
        assert_eq!(yoy.percentage, 100.0);
    }

    #[test]
    fn test_counts_without_numbers_and_zero_base() {
        assert_eq!(change(5.0, 0.0), PeriodChange { absolute: 5.0, percentage: 100.0 });

        let records = records_from_json(&json!([
            {"date": "2024-01-02", "status": "出勤"},
            {"date": "2024-01-03", "status": "出勤"},
            {"date": "2024-02-01", "status": "缺勤"}
        ]))
        .unwrap();
        let result = period(calculate(&records, &ChartParams::new("date", "status")).unwrap());
        assert_eq!(result.current.unwrap().value, 1.0);
        assert_eq!(result.mom_change.unwrap().percentage, -50.0);
        assert!(result.yoy_change.is_none());
    }

    #[test]
    fn test_ambiguous_or_missing_date_field() {
        let records = records_from_json(&json!([
            {"start_date": "2024-01-02", "end_date": "2024-02-02", "v": 1}
        ]))
        .unwrap();
        assert!(matches!(
            calculate(&records, &ChartParams::new("", "v")),
            Err(ChartError::UnresolvableGroupingField(_))
        ));
        // naming one resolves it
        assert!(calculate(&records, &ChartParams::new("end_date", "v")).is_ok());

        let records = records_from_json(&json!([{"name": "a", "v": 1}])).unwrap();
        assert!(calculate(&records, &ChartParams::new("", "v")).is_err());
    }

    #[test]
    fn test_empty() {
        let result = period(calculate(&[], &ChartParams::new("", "v")).unwrap());
        assert!(result.periods.is_empty());
        assert!(result.current.is_none());
    }
}
