use crate::config::EngineConfig;
use crate::data::Record;
use crate::enrich::Enricher;
use crate::error::Result;
use crate::ir::{ChartRequest, ChartResult, IndexFilter};
use crate::resolve::series_plan;
use crate::series::{self, SeriesData};
use crate::source::{FetchQuery, RecordSource};
use anyhow::{anyhow, Context};
use std::sync::Arc;
use tracing::info;

/// Records handed to the engine: one already-fetched set, or one set per
/// y field.
#[derive(Debug, Clone)]
pub enum ChartInput {
    Records(Vec<Record>),
    Series(Vec<SeriesData>),
}

/// Dispatch facade. Cheap to clone and safe to share across threads; it
/// holds only the read-only config and, optionally, the backend the
/// enricher reads auxiliary collections from.
#[derive(Clone, Default)]
pub struct ChartEngine {
    config: Arc<EngineConfig>,
    enricher: Option<Enricher>,
}

impl ChartEngine {
    pub fn new(config: Arc<EngineConfig>) -> Self {
        Self {
            config,
            enricher: None,
        }
    }

    /// Enable enrichment against `source`.
    pub fn with_source(mut self, source: Arc<dyn RecordSource>) -> Self {
        self.enricher = Some(Enricher::new(self.config.clone(), source));
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Compute the chart `request` asks for. The chart type is checked
    /// before any record is looked at.
    pub fn compute(&self, request: &ChartRequest, input: ChartInput) -> Result<ChartResult> {
        let chart_type = request.chart_type()?;
        let series = match input {
            ChartInput::Records(records) => split_records(request, records),
            ChartInput::Series(series) => series,
        };
        let total: usize = series.iter().map(|s| s.records.len()).sum();
        info!(chart_type = %chart_type, series = series.len(), records = total, "computing chart");

        let result = series::combine(chart_type, request, series, self.enricher.as_ref())?;
        info!(chart_type = %chart_type, "chart computed");
        Ok(result)
    }

    pub fn compute_records(&self, request: &ChartRequest, records: Vec<Record>) -> Result<ChartResult> {
        self.compute(request, ChartInput::Records(records))
    }

    /// Fetch every series of `request` from `source` (its own table and
    /// window, plus the x window) and compute the chart over them.
    pub fn compute_from_source(
        &self,
        request: &ChartRequest,
        source: &dyn RecordSource,
    ) -> anyhow::Result<ChartResult> {
        request.chart_type()?;
        let x_filter = request.x_filter();

        let mut series = Vec::new();
        for plan in series_plan(request) {
            let table = plan
                .table()
                .or(request.x_table.as_deref())
                .filter(|t| !t.is_empty())
                .ok_or_else(|| anyhow!("Series '{}' names no table to fetch from", plan.field()))?
                .to_string();
            let query = FetchQuery::table(&table).with_filter(plan.filter.clone());
            let records = source
                .fetch(&query)
                .with_context(|| format!("Failed to fetch series '{}' from '{}'", plan.field(), table))?;
            let records = retain(records, x_filter.as_ref());
            series.push(SeriesData::new(plan.tag, records).with_filter(plan.filter));
        }

        Ok(self.compute(request, ChartInput::Series(series))?)
    }
}

fn retain(mut records: Vec<Record>, filter: Option<&IndexFilter>) -> Vec<Record> {
    if let Some(filter) = filter {
        records.retain(|r| filter.matches(r));
    }
    records
}

/// One series per y field over a single record set, each narrowed by the
/// x window and its own y window.
fn split_records(request: &ChartRequest, records: Vec<Record>) -> Vec<SeriesData> {
    let records = retain(records, request.x_filter().as_ref());
    let mut plans = series_plan(request);
    if plans.len() == 1 {
        let plan = plans.remove(0);
        let records = retain(records, plan.filter.as_ref());
        return vec![SeriesData::new(plan.tag, records).with_filter(plan.filter)];
    }
    plans
        .into_iter()
        .map(|plan| {
            let selected = records
                .iter()
                .filter(|r| plan.filter.as_ref().map_or(true, |f| f.matches(r)))
                .cloned()
                .collect();
            SeriesData::new(plan.tag, selected).with_filter(plan.filter)
        })
        .collect()
}
