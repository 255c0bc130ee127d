use crate::ir::ChartRequest;
use serde::Serialize;
use thiserror::Error;

/// Whole-request failures. Per-record problems (bad numbers, missing
/// fields, zero denominators) never surface here; they are absorbed
/// where they occur.
#[derive(Error, Debug)]
pub enum ChartError {
    #[error("Unsupported chart type: '{0}'")]
    UnsupportedChartType(String),

    #[error("Unable to determine a grouping field: {0}")]
    UnresolvableGroupingField(String),

    #[error("Invalid formula '{formula}': {reason}")]
    InvalidFormula { formula: String, reason: String },

    #[error("Formula '{formula}' produced no usable value for any of {records} records")]
    DegradedFormula { formula: String, records: usize },

    #[error("Enrichment from '{collection}' unavailable: {source}")]
    EnrichmentUnavailable {
        collection: String,
        source: anyhow::Error,
    },
}

pub type Result<T> = std::result::Result<T, ChartError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    UnsupportedChartType,
    UnresolvableGroupingField,
    InvalidFormula,
    DegradedFormula,
    EnrichmentUnavailable,
}

/// Structured failure handed back to the caller, who turns it into
/// user-facing text.
#[derive(Debug, Clone, Serialize)]
pub struct ChartFailure {
    pub kind: ErrorKind,
    pub message: String,
    pub request: ChartRequest,
}

impl ChartError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ChartError::UnsupportedChartType(_) => ErrorKind::UnsupportedChartType,
            ChartError::UnresolvableGroupingField(_) => ErrorKind::UnresolvableGroupingField,
            ChartError::InvalidFormula { .. } => ErrorKind::InvalidFormula,
            ChartError::DegradedFormula { .. } => ErrorKind::DegradedFormula,
            ChartError::EnrichmentUnavailable { .. } => ErrorKind::EnrichmentUnavailable,
        }
    }

    pub(crate) fn invalid_formula(formula: &str, reason: impl Into<String>) -> Self {
        ChartError::InvalidFormula {
            formula: formula.to_string(),
            reason: reason.into(),
        }
    }

    /// Pair the error with the request parameters that produced it.
    pub fn into_failure(self, request: &ChartRequest) -> ChartFailure {
        ChartFailure {
            kind: self.kind(),
            message: self.to_string(),
            request: request.clone(),
        }
    }
}
