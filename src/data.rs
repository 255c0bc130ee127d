use anyhow::{anyhow, Result};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::BTreeSet;

/// One row/document as fetched from a store: field name → scalar value,
/// kept in source field order.
pub type Record = Map<String, Value>;

/// Strict numeric read. Only JSON numbers qualify; numeric-looking text does not.
///
/// Aggregations (sum/avg/min/max, bar and pie values) use this so that
/// categorical codes stored as text are counted rather than summed.
pub fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|f| f.is_finite()),
        _ => None,
    }
}

/// Best-effort numeric coercion: numbers, numeric text and booleans.
pub fn coerce_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|f| f.is_finite()),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

/// Text label of a scalar used as a category / axis key. Null has no label.
pub fn label(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}

/// Label of `record[field]`, `None` when the field is missing or null.
pub fn field_label(record: &Record, field: &str) -> Option<String> {
    record.get(field).and_then(label)
}

fn label_number(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok().filter(|f| f.is_finite())
}

/// Sort axis labels: numerically when every label parses as a number,
/// lexicographically otherwise. Ties fall back to text order so the
/// result never depends on the input order.
pub fn sort_labels(labels: &mut [String]) {
    let all_numeric = labels.iter().all(|s| label_number(s).is_some());
    if all_numeric {
        labels.sort_by(|a, b| match (label_number(a), label_number(b)) {
            (Some(fa), Some(fb)) => fa.total_cmp(&fb).then_with(|| a.cmp(b)),
            _ => a.cmp(b),
        });
    } else {
        labels.sort();
    }
}

/// Sorted distinct labels of `field` across `records`.
pub fn distinct_labels<'a, I>(records: I, field: &str) -> Vec<String>
where
    I: IntoIterator<Item = &'a Record>,
{
    let set: BTreeSet<String> = records
        .into_iter()
        .filter_map(|r| field_label(r, field))
        .collect();
    let mut labels: Vec<String> = set.into_iter().collect();
    sort_labels(&mut labels);
    labels
}

/// Order two scalars for range filtering: numerically when both coerce,
/// otherwise by their text labels (ISO dates compare correctly as text).
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (coerce_number(a), coerce_number(b)) {
        (Some(fa), Some(fb)) => fa.total_cmp(&fb),
        _ => label(a).unwrap_or_default().cmp(&label(b).unwrap_or_default()),
    }
}

/// Field names in the order they first appear across `records`.
pub fn field_names(records: &[Record]) -> Vec<String> {
    let mut seen = BTreeSet::new();
    let mut names = Vec::new();
    for record in records {
        for key in record.keys() {
            if seen.insert(key.clone()) {
                names.push(key.clone());
            }
        }
    }
    names
}

/// True when at least one record carries a non-null value for `field`.
pub fn has_field(records: &[Record], field: &str) -> bool {
    records.iter().any(|r| r.get(field).map_or(false, |v| !v.is_null()))
}

/// Build records from a JSON array of objects.
///
/// Extended-JSON wrappers produced by document stores (`{"$oid": ..}`,
/// `{"$date": ..}`, `{"$numberLong": ..}`) are flattened to plain scalars.
pub fn records_from_json(value: &Value) -> Result<Vec<Record>> {
    let array = value
        .as_array()
        .ok_or_else(|| anyhow!("Input data must be a JSON array of objects"))?;

    let mut records = Vec::with_capacity(array.len());
    for (idx, item) in array.iter().enumerate() {
        let obj = item
            .as_object()
            .ok_or_else(|| anyhow!("Item {} in array is not an object", idx))?;
        let record: Record = obj
            .iter()
            .map(|(k, v)| (k.clone(), flatten_extended(v)))
            .collect();
        records.push(record);
    }
    Ok(records)
}

fn flatten_extended(value: &Value) -> Value {
    if let Value::Object(obj) = value {
        if obj.len() == 1 {
            if let Some(inner) = obj.get("$oid").or_else(|| obj.get("$date")) {
                return match inner {
                    Value::String(s) => Value::String(s.clone()),
                    other => flatten_extended(other),
                };
            }
            if let Some(Value::String(s)) = obj.get("$numberLong").or_else(|| obj.get("$numberInt")) {
                if let Ok(n) = s.parse::<i64>() {
                    return Value::from(n);
                }
            }
            if let Some(Value::String(s)) = obj.get("$numberDouble") {
                if let Some(n) = s.parse::<f64>().ok().and_then(serde_json::Number::from_f64) {
                    return Value::Number(n);
                }
            }
        }
    }
    value.clone()
}
