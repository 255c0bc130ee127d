use super::{category_totals, ChartParams};
use crate::data::Record;
use crate::ir::{ChartResult, PieResult};
use crate::stats::{percentage, round2, sum};

pub fn calculate(records: &[Record], params: &ChartParams) -> ChartResult {
    let (categories, values) = category_totals(records, params.x_field, params.y_field);
    let total = sum(&values);
    let percentages = values.iter().map(|v| round2(percentage(*v, total))).collect();
    ChartResult::Pie(PieResult {
        categories,
        values,
        percentages,
        total,
        title: params.title(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::records_from_json;
    use serde_json::json;

    fn pie(result: ChartResult) -> PieResult {
        match result {
            ChartResult::Pie(p) => p,
            other => panic!("Expected pie, got {:?}", other),
        }
    }

    #[test]
    fn test_percentages() {
        let records = records_from_json(&json!([
            {"c": "a"}, {"c": "b"}, {"c": "b"}, {"c": "c"}
        ]))
        .unwrap();
        let result = pie(calculate(&records, &ChartParams::new("c", "")));
        assert_eq!(result.values, vec![1.0, 2.0, 1.0]);
        assert_eq!(result.percentages, vec![25.0, 50.0, 25.0]);
        assert_eq!(result.total, 4.0);
    }

    #[test]
    fn test_zero_total() {
        let records = records_from_json(&json!([{"c": "a", "v": 0}, {"c": "b", "v": 0}])).unwrap();
        let result = pie(calculate(&records, &ChartParams::new("c", "v")));
        assert_eq!(result.percentages, vec![0.0, 0.0]);
    }

    #[test]
    fn test_empty() {
        let result = pie(calculate(&[], &ChartParams::new("c", "v")));
        assert!(result.categories.is_empty());
        assert_eq!(result.total, 0.0);
    }
}
