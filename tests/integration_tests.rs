use chartcalc::csv_reader;
use chartcalc::data::records_from_json;
use chartcalc::{
    ChartEngine, ChartError, ChartRequest, ChartResult, EngineConfig, FileSource, Record,
};
use serde_json::{json, Value};
use std::fs;
use std::io::Write;
use std::process::{Command, Stdio};
use std::sync::Arc;

fn attendance() -> Vec<Record> {
    let text = fs::read_to_string("test/attendance.json").expect("Failed to read test JSON");
    let value: Value = serde_json::from_str(&text).unwrap();
    records_from_json(&value).unwrap()
}

fn sales() -> Vec<Record> {
    let file = fs::File::open("test/sales.csv").expect("Failed to read test CSV");
    csv_reader::read_csv(file).unwrap().into_records()
}

fn request(value: Value) -> ChartRequest {
    serde_json::from_value(value).unwrap()
}

/// Run chartcalc with `args`, feeding `stdin`. Returns the exit status and
/// stdout parsed as JSON.
fn run_chartcalc(args: &[&str], stdin: &str) -> Result<(bool, Value), String> {
    let mut child = Command::new(env!("CARGO_BIN_EXE_chartcalc"))
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| format!("Failed to spawn process: {}", e))?;

    if let Some(mut input) = child.stdin.take() {
        input
            .write_all(stdin.as_bytes())
            .map_err(|e| format!("Failed to write to stdin: {}", e))?;
    }

    let output = child
        .wait_with_output()
        .map_err(|e| format!("Failed to wait for process: {}", e))?;
    let stdout = String::from_utf8_lossy(&output.stdout);
    let value = serde_json::from_str(stdout.trim()).map_err(|e| {
        format!(
            "stdout is not JSON ({}): {} / stderr: {}",
            e,
            stdout,
            String::from_utf8_lossy(&output.stderr)
        )
    })?;
    Ok((output.status.success(), value))
}

// =============================================================================
// Library
// =============================================================================

#[test]
fn test_bar_sums_csv_amounts() {
    let engine = ChartEngine::default();
    let req = request(json!({"chart_type": "bar", "x_field": "region", "y_field": "amount"}));
    let ChartResult::Bar(bar) = engine.compute_records(&req, sales()).unwrap() else {
        panic!("Expected bar");
    };
    assert_eq!(bar.categories, vec!["north", "south"]);
    assert_eq!(bar.values, vec![60.0, 20.0]);
    assert_eq!(bar.statistics[0].max, 60.0);
}

#[test]
fn test_pie_shares() {
    let engine = ChartEngine::default();
    let req = request(json!({"chart_type": "PIE", "x_field": "product", "y_field": "amount"}));
    let ChartResult::Pie(pie) = engine.compute_records(&req, sales()).unwrap() else {
        panic!("Expected pie");
    };
    assert_eq!(pie.total, 80.0);
    assert_eq!(pie.percentages, vec![56.25, 43.75]);
}

#[test]
fn test_breakdown_two_dimensions() {
    let engine = ChartEngine::default();
    let req = request(json!({
        "chart_type": "multi_field",
        "y_field": "amount",
        "group_by_fields": ["region", "product"]
    }));
    let ChartResult::Breakdown(breakdown) = engine.compute_records(&req, sales()).unwrap() else {
        panic!("Expected breakdown");
    };
    assert_eq!(breakdown.groups.len(), 4);
    assert_eq!(breakdown.groups[0].keys, vec!["north", "a"]);
    assert_eq!(breakdown.groups[0].count, 2);
    assert_eq!(breakdown.groups[0].avg, 20.0);
    assert_eq!(breakdown.summary.total_records, 5);
    assert_eq!(breakdown.summary.total_sum, 80.0);
}

#[test]
fn test_derived_expression_feeds_the_chart() {
    let engine = ChartEngine::default();
    let req = request(json!({
        "chart_type": "bar",
        "x_field": "region",
        "y_field": "amount",
        "derived_expression": "margin = amount - cost"
    }));
    let ChartResult::Bar(bar) = engine.compute_records(&req, sales()).unwrap() else {
        panic!("Expected bar");
    };
    assert_eq!(bar.series[0].name, "margin");
    assert_eq!(bar.values, vec![35.0, 12.0]);
}

#[test]
fn test_scatter_amount_against_cost() {
    let engine = ChartEngine::default();
    let req = request(json!({"chart_type": "scatter", "x_field": "cost", "y_field": "amount"}));
    let ChartResult::Scatter(scatter) = engine.compute_records(&req, sales()).unwrap() else {
        panic!("Expected scatter");
    };
    assert_eq!(scatter.series[0].x.len(), 5);
    assert!(scatter.correlation > 0.9 && scatter.correlation <= 1.0);
    assert_eq!(scatter.regression.line.len(), 5);
}

#[test]
fn test_ranking_attendance() {
    let engine = ChartEngine::default();
    let req = request(json!({"chart_type": "ranking", "x_field": "姓名", "y_field": "状态"}));
    let ChartResult::Ranking(ranking) = engine.compute_records(&req, attendance()).unwrap() else {
        panic!("Expected ranking");
    };
    let groups: Vec<&str> = ranking.ranks.iter().map(|r| r.group.as_str()).collect();
    assert_eq!(groups, vec!["张三", "赵六", "李四", "王五"]);
    let ranks: Vec<usize> = ranking.ranks.iter().map(|r| r.rank).collect();
    assert_eq!(ranks, vec![1, 2, 3, 4]);
    assert_eq!(ranking.stats.average_percentage, 75.0);
}

#[test]
fn test_ranking_enriched_from_file_source() {
    let config = EngineConfig::load("test/config.json").unwrap();
    let engine = ChartEngine::new(Arc::new(config)).with_source(Arc::new(FileSource::new("test")));
    let req = request(json!({"chart_type": "ranking", "group_by": "班级", "y_field": "状态"}));
    let ChartResult::Ranking(ranking) = engine.compute_records(&req, attendance()).unwrap() else {
        panic!("Expected ranking");
    };
    assert_eq!(ranking.group_by.as_deref(), Some("班级"));
    assert_eq!(ranking.ranks[0].group, "一班");
    assert_eq!(ranking.ranks[0].percentage, 75.0);
    assert_eq!(ranking.ranks[1].group, "二班");
    assert_eq!(ranking.ranks[1].percentage, 66.67);
}

#[test]
fn test_period_over_period_counts() {
    let engine = ChartEngine::default();
    let req = request(json!({"chart_type": "yoy_mom", "y_field": "状态"}));
    let ChartResult::PeriodOverPeriod(period) = engine.compute_records(&req, attendance()).unwrap() else {
        panic!("Expected period-over-period");
    };
    assert_eq!(period.date_field.as_deref(), Some("日期"));
    assert_eq!(period.periods.len(), 3);
    assert_eq!(period.current.as_ref().unwrap().value, 3.0);
    let mom = period.mom_change.unwrap();
    assert_eq!(mom.absolute, 0.0);
    assert_eq!(mom.percentage, 0.0);
    let yoy = period.yoy_change.unwrap();
    assert_eq!(yoy.absolute, 2.0);
    assert_eq!(yoy.percentage, 200.0);
}

#[test]
fn test_heatmap_skips_identifier_axis() {
    let engine = ChartEngine::default();
    let req = request(json!({"chart_type": "heatmap", "x_field": "日期", "y_field": "状态"}));
    let ChartResult::Heatmap(heatmap) = engine.compute_records(&req, attendance()).unwrap() else {
        panic!("Expected heatmap");
    };
    assert_eq!(heatmap.row_field.as_deref(), Some("姓名"));
    assert_eq!(heatmap.x_labels.len(), 3);
    assert_eq!(heatmap.y_labels.len(), 4);
}

#[test]
fn test_unknown_chart_type_is_reported() {
    let engine = ChartEngine::default();
    let req = request(json!({"chart_type": "radar", "x_field": "region", "y_field": "amount"}));
    let err = engine.compute_records(&req, sales()).unwrap_err();
    assert!(matches!(err, ChartError::UnsupportedChartType(_)));
}

// =============================================================================
// CLI
// =============================================================================

#[test]
fn test_cli_bar_from_stdin() {
    let records = fs::read_to_string("test/attendance.json").unwrap();
    let result = run_chartcalc(
        &["--request", r#"{"chart_type": "bar", "x_field": "姓名", "y_field": "状态"}"#],
        &records,
    );
    let (ok, value) = result.unwrap();
    assert!(ok);
    assert_eq!(value["chart_type"], "bar");
    assert_eq!(value["categories"].as_array().unwrap().len(), 4);
}

#[test]
fn test_cli_csv_input_file() {
    let (ok, value) = run_chartcalc(
        &[
            "--request",
            r#"{"chart_type": "pie", "x_field": "region", "y_field": "amount"}"#,
            "--input",
            "test/sales.csv",
        ],
        "",
    )
    .unwrap();
    assert!(ok);
    assert_eq!(value["total"], 80.0);
    assert_eq!(value["percentages"], json!([75.0, 25.0]));
}

#[test]
fn test_cli_request_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, r#"{{"chart_type": "line", "x_field": "date", "y_field": "amount"}}"#).unwrap();
    let arg = format!("@{}", file.path().display());

    let (ok, value) = run_chartcalc(&["-r", &arg, "-i", "test/sales.csv"], "").unwrap();
    assert!(ok);
    assert_eq!(value["chart_type"], "line");
    assert_eq!(value["x_axis"].as_array().unwrap().len(), 5);
    assert!(value["trend"].is_object());
}

#[test]
fn test_cli_unsupported_chart_type_fails_with_payload() {
    let (ok, value) = run_chartcalc(
        &["--request", r#"{"chart_type": "radar", "x_field": "region", "y_field": "amount"}"#],
        "[]",
    )
    .unwrap();
    assert!(!ok);
    assert_eq!(value["kind"], "unsupported_chart_type");
    assert_eq!(value["request"]["chart_type"], "radar");
}

#[test]
fn test_cli_invalid_formula() {
    let (ok, value) = run_chartcalc(
        &[
            "--request",
            r#"{"chart_type": "bar", "x_field": "region", "y_field": "amount", "derived_expression": "x = __import__(os)"}"#,
            "--input",
            "test/sales.csv",
        ],
        "",
    )
    .unwrap();
    assert!(!ok);
    assert_eq!(value["kind"], "invalid_formula");
}

#[test]
fn test_cli_fetch_and_enrich_from_data_dir() {
    let (ok, value) = run_chartcalc(
        &[
            "--request",
            r#"{"chart_type": "ranking", "group_by": "班级", "y_field": "状态", "y_table": "attendance"}"#,
            "--config",
            "test/config.json",
            "--data-dir",
            "test",
            "--fetch",
        ],
        "",
    )
    .unwrap();
    assert!(ok);
    assert_eq!(value["group_by"], "班级");
    assert_eq!(value["ranks"][0]["group"], "一班");
    assert_eq!(value["ranks"][0]["rank"], 1);
}
