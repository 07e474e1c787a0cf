//! VAST Engine: analysis execution for astronomical time series
//!
//! Runs timing and variability analyses (power spectra, Fourier transforms,
//! Lomb-Scargle periodograms, rebinning, PDS simulation) as background jobs
//! against uploaded light curves and event lists.
//!
//! ## Architecture
//!
//! - **Backends**: three adapters with a shared contract (read, analyze, plot)
//! - **Schema Registry**: declarative parameter definitions per analysis type
//! - **Dispatcher**: job state machine, task queue and worker pool
//! - **Result Materializer**: persists plot, data and stats rows per job

pub mod backends;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod io;
pub mod plot;
pub mod processing;
pub mod results;
pub mod schema;
pub mod storage;
pub mod types;

// Re-export the job-facing API
pub use dispatcher::{Dispatcher, Engine, ExecutionOutcome, JobExecutor, TaskQueue, WorkerPool};
pub use error::{EngineError, EngineResult};

// Re-export commonly used types
pub use types::{
    AnalysisJob, AnalysisResult, AnalysisType, BackendKind, DataFile, JobStatus, JobStatusView,
    ParameterSet, Parameters, ResultType, TimeSeries,
};

// Re-export backend components
pub use backends::{get_backend, AnalysisBackend, PlotArtifact, RawResult};

// Re-export storage
pub use storage::{InMemoryStore, Persistence, PersistenceError, SledStore};

// Re-export configuration
pub use config::EngineConfig;
