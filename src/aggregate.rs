use crate::data::{field_label, numeric, Record};
use crate::stats::finite_or_zero;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

/// Exact-match predicate `field == value`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub field: String,
    pub value: Value,
}

impl Condition {
    pub fn new(field: &str, value: Value) -> Self {
        Self {
            field: field.to_string(),
            value,
        }
    }

    /// A missing field never matches. Numbers compare by value, so `1`
    /// matches `1.0`.
    pub fn matches(&self, record: &Record) -> bool {
        match record.get(&self.field) {
            Some(v) if v == &self.value => true,
            Some(Value::Number(a)) => match &self.value {
                Value::Number(b) => a.as_f64() == b.as_f64(),
                _ => false,
            },
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationSpec {
    #[serde(rename = "type")]
    pub kind: Aggregation,
    pub field: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Condition>,
    pub output: String,
}

impl AggregationSpec {
    pub fn new(kind: Aggregation, field: &str, output: &str) -> Self {
        Self {
            kind,
            field: field.to_string(),
            condition: None,
            output: output.to_string(),
        }
    }

    pub fn when(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }
}

#[derive(Debug, Default, Clone)]
struct Accumulator {
    count: usize,
    numeric_count: usize,
    sum: f64,
    min: Option<f64>,
    max: Option<f64>,
}

impl Accumulator {
    fn push(&mut self, value: Option<f64>) {
        self.count += 1;
        if let Some(v) = value {
            self.numeric_count += 1;
            self.sum += v;
            self.min = Some(self.min.map_or(v, |m| m.min(v)));
            self.max = Some(self.max.map_or(v, |m| m.max(v)));
        }
    }

    fn finish(&self, kind: Aggregation) -> f64 {
        let value = match kind {
            Aggregation::Count => self.count as f64,
            Aggregation::Sum => self.sum,
            Aggregation::Avg if self.numeric_count == 0 => 0.0,
            Aggregation::Avg => self.sum / self.numeric_count as f64,
            Aggregation::Min => self.min.unwrap_or(0.0),
            Aggregation::Max => self.max.unwrap_or(0.0),
        };
        finite_or_zero(value)
    }
}

struct Group {
    key: Value,
    accumulators: Vec<Accumulator>,
}

/// Group `records` by `group_by` and evaluate every spec per group.
///
/// Each output record holds the group key under `group_by` plus one field
/// per spec output. Groups keep the order in which their key first appears.
/// Records without the key are dropped.
pub fn aggregate(records: &[Record], group_by: &str, specs: &[AggregationSpec]) -> Vec<Record> {
    let mut groups: Vec<Group> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for record in records {
        let Some(label) = field_label(record, group_by) else {
            continue;
        };
        let slot = *index.entry(label).or_insert_with(|| {
            groups.push(Group {
                key: record.get(group_by).cloned().unwrap_or(Value::Null),
                accumulators: vec![Accumulator::default(); specs.len()],
            });
            groups.len() - 1
        });
        let group = &mut groups[slot];
        for (spec, acc) in specs.iter().zip(group.accumulators.iter_mut()) {
            if spec.condition.as_ref().map_or(true, |c| c.matches(record)) {
                acc.push(record.get(&spec.field).and_then(numeric));
            }
        }
    }

    tracing::debug!(group_by, groups = groups.len(), "aggregated records");

    groups
        .into_iter()
        .map(|group| {
            let mut out = Record::new();
            out.insert(group_by.to_string(), group.key);
            for (spec, acc) in specs.iter().zip(&group.accumulators) {
                out.insert(spec.output.clone(), Value::from(acc.finish(spec.kind)));
            }
            out
        })
        .collect()
}
