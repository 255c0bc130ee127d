use crate::data::label;
use crate::ir::{ChartRequest, IndexFilter, SeriesTag};

/// One series of a request, with its parameter lists already padded.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesPlan {
    pub tag: SeriesTag,
    pub filter: Option<IndexFilter>,
}

impl SeriesPlan {
    pub fn field(&self) -> &str {
        &self.tag.series_field
    }

    pub fn table(&self) -> Option<&str> {
        self.tag.series_table.as_deref()
    }
}

/// Resolve every y field of `request` into its own series.
///
/// `y_table`, `y_index_field`, `y_start` and `y_end` are broadcast when
/// single and padded with their last element when shorter than `y_field`.
/// A request without y fields yields one series over an empty field (a
/// plain record count).
pub fn series_plan(request: &ChartRequest) -> Vec<SeriesPlan> {
    let mut fields = request.y_field.to_vec();
    if fields.is_empty() {
        fields.push(String::new());
    }
    let n = fields.len();
    let tables = request.y_table.padded(n);
    let index_fields = request.y_index_field.padded(n);
    let starts = request.y_start.padded(n);
    let ends = request.y_end.padded(n);

    fields
        .into_iter()
        .enumerate()
        .map(|(i, field)| {
            let filter = index_fields[i]
                .as_ref()
                .filter(|f| !f.is_empty())
                .map(|f| IndexFilter::new(f, starts[i].clone(), ends[i].clone()))
                .filter(IndexFilter::is_bounded);
            SeriesPlan {
                tag: SeriesTag {
                    series_index: i,
                    series_field: field,
                    series_table: tables[i].clone().filter(|t| !t.is_empty()),
                },
                filter,
            }
        })
        .collect()
}

fn describe_window(filter: &IndexFilter) -> String {
    let start = filter.start.as_ref().and_then(label).unwrap_or_default();
    let end = filter.end.as_ref().and_then(label).unwrap_or_default();
    if start == end {
        start
    } else {
        format!("{}~{}", start, end)
    }
}

/// Display name of the series described by `tag`/`filter`: the field,
/// disambiguated when several series share it, by filter window, then
/// table, then position. Each step applies only when it leaves the name
/// unique among `all`.
pub fn series_name(
    tag: &SeriesTag,
    filter: Option<&IndexFilter>,
    all: &[(&SeriesTag, Option<&IndexFilter>)],
) -> String {
    let field = &tag.series_field;
    let same_field: Vec<&(&SeriesTag, Option<&IndexFilter>)> =
        all.iter().filter(|(t, _)| &t.series_field == field).collect();
    if same_field.len() <= 1 {
        return field.clone();
    }
    if let Some(filter) = filter {
        let window = describe_window(filter);
        let same_window = same_field
            .iter()
            .filter(|(_, f)| f.map(describe_window).as_deref() == Some(window.as_str()))
            .count();
        if same_window == 1 {
            return format!("{}({})", field, window);
        }
    }
    if let Some(table) = &tag.series_table {
        let same_table = same_field
            .iter()
            .filter(|(t, _)| t.series_table.as_ref() == Some(table))
            .count();
        if same_table == 1 {
            return format!("{}.{}", table, field);
        }
    }
    format!("{}#{}", field, tag.series_index + 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::OneOrMany;
    use serde_json::json;

    fn request() -> ChartRequest {
        let mut request = ChartRequest::new("bar", "lasttime", "totaltime");
        request.y_field = vec!["totaltime".to_string(); 3].into();
        request.y_table = "sign_daytask".to_string().into();
        request.y_index_field = "jlugroup".to_string().into();
        request.y_start = vec![json!("电控组"), json!("机械组")].into();
        request.y_end = vec![json!("电控组"), json!("机械组")].into();
        request
    }

    #[test]
    fn test_plan_pads_lists() {
        let plans = series_plan(&request());
        assert_eq!(plans.len(), 3);
        assert_eq!(plans[2].table(), Some("sign_daytask"));
        assert_eq!(plans[2].filter.as_ref().unwrap().start, Some(json!("机械组")));
        assert_eq!(plans[1].tag.series_index, 1);
    }

    #[test]
    fn test_plan_without_filters() {
        let mut request = ChartRequest::new("bar", "g", "a");
        request.y_field = OneOrMany::Many(vec!["a".into(), "b".into()]);
        let plans = series_plan(&request);
        assert!(plans.iter().all(|p| p.filter.is_none() && p.table().is_none()));
        assert_eq!(plans[1].field(), "b");

        let empty = ChartRequest {
            y_field: OneOrMany::default(),
            ..ChartRequest::new("bar", "g", "")
        };
        assert_eq!(series_plan(&empty).len(), 1);
    }

    #[test]
    fn test_series_names() {
        let plans = series_plan(&request());
        let all: Vec<(&SeriesTag, Option<&IndexFilter>)> =
            plans.iter().map(|p| (&p.tag, p.filter.as_ref())).collect();
        assert_eq!(series_name(&plans[0].tag, plans[0].filter.as_ref(), &all), "totaltime(电控组)");

        let range = IndexFilter::new("d", Some(json!("2024-01")), Some(json!("2024-03")));
        assert_eq!(series_name(&plans[0].tag, Some(&range), &all), "totaltime(2024-01~2024-03)");

        let unfiltered: Vec<(&SeriesTag, Option<&IndexFilter>)> = plans.iter().map(|p| (&p.tag, None)).collect();
        assert_eq!(series_name(&plans[1].tag, None, &unfiltered), "totaltime#2");

        let single = vec![(&plans[0].tag, None)];
        assert_eq!(series_name(&plans[0].tag, None, &single), "totaltime");
    }

    #[test]
    fn test_shared_window_falls_through_to_position() {
        // series 2 and 3 both select 机械组
        let plans = series_plan(&request());
        let all: Vec<(&SeriesTag, Option<&IndexFilter>)> =
            plans.iter().map(|p| (&p.tag, p.filter.as_ref())).collect();
        let names: Vec<String> = plans
            .iter()
            .map(|p| series_name(&p.tag, p.filter.as_ref(), &all))
            .collect();
        assert_eq!(names, vec!["totaltime(电控组)", "totaltime#2", "totaltime#3"]);
    }
}
