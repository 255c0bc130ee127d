// Library exports for chartcalc

pub mod csv_reader;
pub mod data;
pub mod error;
pub mod config;
pub mod ir;
pub mod parser;

// Computation
pub mod aggregate;
pub mod chart;
pub mod detect;
pub mod enrich;
pub mod formula;
pub mod metric;
pub mod resolve;
pub mod runtime;
pub mod series;
pub mod source;
pub mod stats;

pub use config::EngineConfig;
pub use data::Record;
pub use error::{ChartError, ChartFailure, ErrorKind};
pub use ir::{ChartRequest, ChartResult, ChartType};
pub use runtime::{ChartEngine, ChartInput};
pub use source::{FileSource, MemorySource, RecordSource};
