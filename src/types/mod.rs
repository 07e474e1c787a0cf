//! Core domain types for the analysis engine
//!
//! - [`timeseries`]: the loaded data every backend operates on
//! - [`job`]: analysis job entity and its state machine
//! - [`records`]: persisted results, parameter sets and data files

pub mod job;
pub mod records;
pub mod timeseries;

pub use job::{
    AnalysisJob, AnalysisType, BackendKind, InvalidTransition, JobStatus, JobStatusView,
    Parameters, CANCELLED_MESSAGE,
};
pub use records::{AnalysisResult, DataFile, FileType, ParameterSet, ResultType};
pub use timeseries::{MetaValue, Metadata, TimeSeries};
