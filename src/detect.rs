//! Field-name heuristics.
//!
//! Every heuristic walks an explicit, ordered candidate list and reports
//! `None` when nothing qualifies instead of falling back to whichever field
//! happens to come first.

use crate::data::{field_names, has_field, Record};

/// Substrings marking a date/time field, matched case-insensitively.
pub const DATE_KEYWORDS: [&str; 4] = ["日期", "date", "时间", "time"];

/// Field names that identify a person, in priority order.
pub const IDENTITY_CANDIDATES: [&str; 6] = ["姓名", "名字", "学生", "员工", "用户", "name"];

pub fn is_date_like(field: &str) -> bool {
    let lower = field.to_lowercase();
    DATE_KEYWORDS.iter().any(|k| lower.contains(k))
}

/// `id`, `_id`, `student_id`, ...
pub fn is_id_like(field: &str) -> bool {
    let lower = field.to_lowercase();
    lower == "id" || lower.contains("_id")
}

/// Date-like fields present in `records`, in first-seen order.
pub fn date_field_candidates(records: &[Record]) -> Vec<String> {
    field_names(records)
        .into_iter()
        .filter(|f| is_date_like(f) && has_field(records, f))
        .collect()
}

pub fn detect_date_field(records: &[Record]) -> Option<String> {
    date_field_candidates(records).into_iter().next()
}

/// First identity candidate carried by at least one record.
pub fn detect_identity_field(records: &[Record]) -> Option<&'static str> {
    IDENTITY_CANDIDATES
        .iter()
        .copied()
        .find(|candidate| has_field(records, candidate))
}

/// First field that is neither `value_field` nor identifier/date-like.
pub fn fallback_group_field(records: &[Record], value_field: &str) -> Option<String> {
    dimension_candidates(records, value_field).into_iter().next()
}

/// Up to `max` grouping dimensions, skipping `value_field` and
/// identifier/date-like fields.
pub fn breakdown_fields(records: &[Record], value_field: &str, max: usize) -> Vec<String> {
    dimension_candidates(records, value_field)
        .into_iter()
        .take(max)
        .collect()
}

fn dimension_candidates(records: &[Record], value_field: &str) -> Vec<String> {
    field_names(records)
        .into_iter()
        .filter(|f| f != value_field && !is_id_like(f) && !is_date_like(f))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::records_from_json;
    use serde_json::json;

    #[test]
    fn test_keyword_matching() {
        assert!(is_date_like("签到日期"));
        assert!(is_date_like("CreateTime"));
        assert!(!is_date_like("姓名"));
        assert!(is_id_like("_id"));
        assert!(is_id_like("Student_ID"));
        assert!(is_id_like("id"));
        assert!(!is_id_like("idea"));
    }

    #[test]
    fn test_detect_fields() {
        let records = records_from_json(&json!([
            {"_id": "1", "签到日期": "2024-01-02", "name": "A", "状态": "出勤"},
            {"_id": "2", "签到日期": "2024-01-03", "姓名": "B", "状态": "缺勤"}
        ]))
        .unwrap();
        assert_eq!(detect_date_field(&records).as_deref(), Some("签到日期"));
        assert_eq!(detect_identity_field(&records), Some("姓名"));
        assert_eq!(fallback_group_field(&records, "状态").as_deref(), Some("name"));
        assert_eq!(breakdown_fields(&records, "状态", 2), vec!["name", "姓名"]);
    }

    #[test]
    fn test_nothing_found() {
        let records = records_from_json(&json!([{"_id": "1", "v": 3}])).unwrap();
        assert_eq!(detect_date_field(&records), None);
        assert_eq!(detect_identity_field(&records), None);
        assert_eq!(fallback_group_field(&records, "v"), None);
    }
}
