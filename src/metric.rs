use crate::data::{coerce_number, Record};
use crate::error::{ChartError, Result};
use crate::parser::{parse_ratio_complete, Operand, Ratio};
use crate::stats::{finite_or_zero, round2};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricFormat {
    /// Rounded to 2 decimal places.
    Percentage,
    #[default]
    Number,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSpec {
    pub output_field: String,
    pub formula: String,
    #[serde(default)]
    pub format: MetricFormat,
}

impl MetricSpec {
    pub fn new(output_field: &str, formula: &str, format: MetricFormat) -> Self {
        Self {
            output_field: output_field.to_string(),
            formula: formula.to_string(),
            format,
        }
    }
}

struct CompiledMetric<'a> {
    spec: &'a MetricSpec,
    ratio: Ratio,
}

fn operand_value(operand: &Operand, record: &Record) -> f64 {
    match operand {
        Operand::Literal(v) => *v,
        Operand::Field(f) => record.get(f).and_then(coerce_number).unwrap_or(0.0),
    }
}

impl CompiledMetric<'_> {
    fn evaluate(&self, record: &Record) -> f64 {
        let numerator = operand_value(&self.ratio.numerator, record);
        let denominator = operand_value(&self.ratio.denominator, record);
        if denominator == 0.0 {
            return 0.0;
        }
        let multiplier = self
            .ratio
            .multiplier
            .as_ref()
            .map_or(1.0, |k| operand_value(k, record));
        let value = finite_or_zero(numerator / denominator * multiplier);
        match self.spec.format {
            MetricFormat::Percentage => round2(value),
            MetricFormat::Number => value,
        }
    }
}

/// Add one field per spec to copies of `records`.
///
/// Every formula is parsed before any record is touched; a malformed one
/// fails the whole call with `InvalidFormula`.
pub fn apply(records: &[Record], specs: &[MetricSpec]) -> Result<Vec<Record>> {
    let compiled = specs
        .iter()
        .map(|spec| {
            parse_ratio_complete(&spec.formula)
                .map(|ratio| CompiledMetric { spec, ratio })
                .map_err(|reason| ChartError::invalid_formula(&spec.formula, reason))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(records
        .iter()
        .map(|record| {
            let mut out = record.clone();
            for metric in &compiled {
                out.insert(
                    metric.spec.output_field.clone(),
                    Value::from(metric.evaluate(record)),
                );
            }
            out
        })
        .collect())
}
