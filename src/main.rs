//! VAST Engine - analysis execution for astronomical time series
//!
//! Command-line front end over the in-process engine: submit an analysis
//! of a local file, poll or cancel jobs, list results and inspect the
//! parameter schemas.
//!
//! # Usage
//!
//! ```bash
//! # Rebin a light curve into 2 s bins and wait for the result
//! vast-engine run --file lc.csv --analysis rebin --backend astropy \
//!     --params '{"bin_time": 2.0, "method": "mean"}' --wait
//!
//! # Inspect a job and its results
//! vast-engine status <JOB_ID>
//! vast-engine results <JOB_ID>
//!
//! # Parameter schemas
//! vast-engine schema power_spectrum
//! ```
//!
//! # Environment Variables
//!
//! - `VAST_CONFIG`: Path to the engine TOML config (default: ./vast.toml)
//! - `VAST_USER`: User id jobs are submitted as (default: the nil UUID)
//! - `RUST_LOG`: Logging level (default: info)

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

use vast_engine::backends::all_backends;
use vast_engine::config::{self, EngineConfig};
use vast_engine::plot::theme::{self, PlotTheme};
use vast_engine::schema;
use vast_engine::types::AnalysisType;
use vast_engine::Engine;

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "vast-engine")]
#[command(about = "Analysis execution engine for astronomical time series")]
#[command(version)]
struct CliArgs {
    /// Engine config file (overrides VAST_CONFIG and ./vast.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// User id to act as
    #[arg(long, global = true, env = "VAST_USER", default_value_t = Uuid::nil())]
    user: Uuid,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: SubCommand,
}

#[derive(clap::Subcommand, Debug)]
enum SubCommand {
    /// Register a local file and submit an analysis job for it
    Run {
        /// Path to the data file (FITS, CSV or text)
        #[arg(long)]
        file: PathBuf,
        /// Analysis type (e.g. power_spectrum, rebin, lomb_scargle)
        #[arg(long)]
        analysis: String,
        /// Backend name (stingray, lightkurve, astropy)
        #[arg(long, default_value = "stingray")]
        backend: String,
        /// Parameters as a JSON object
        #[arg(long)]
        params: Option<String>,
        /// Block until the job is terminal and print its results
        #[arg(long)]
        wait: bool,
        /// Polling interval while waiting, in milliseconds
        #[arg(long, default_value = "200")]
        poll_ms: u64,
    },

    /// Show a job's status
    Status { job_id: Uuid },

    /// Cancel a pending or running job
    Cancel { job_id: Uuid },

    /// List a job's results
    Results { job_id: Uuid },

    /// Print the parameter schema of one analysis type, or all of them
    Schema { analysis: Option<String> },

    /// List backends and the analyses each supports
    Backends,
}

// ============================================================================
// Output
// ============================================================================

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{text}");
    Ok(())
}

#[derive(Serialize)]
struct BackendSummary {
    name: &'static str,
    supports: Vec<&'static str>,
}

fn backend_summaries() -> Vec<BackendSummary> {
    all_backends()
        .iter()
        .map(|backend| BackendSummary {
            name: backend.name(),
            supports: AnalysisType::ALL
                .iter()
                .filter(|t| backend.supports(**t))
                .map(|t| t.as_str())
                .collect(),
        })
        .collect()
}

// ============================================================================
// Startup
// ============================================================================

fn init_logging(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<EngineConfig> {
    match path {
        Some(p) => EngineConfig::load_from_file(p)
            .with_context(|| format!("Failed to load config from {}", p.display())),
        None => Ok(EngineConfig::load()),
    }
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();
    init_logging(args.json_logs);

    // Commands that need no store.
    match &args.command {
        SubCommand::Schema { analysis } => {
            return match analysis {
                Some(name) => print_json(&schema::get_schema_by_name(name)?),
                None => print_json(&schema::list_schemas()),
            };
        }
        SubCommand::Backends => return print_json(&backend_summaries()),
        _ => {}
    }

    let engine_config = load_config(args.config.as_ref())?;
    config::init(engine_config.clone());
    theme::init(PlotTheme::from(&engine_config.plot));

    let engine = Engine::start(&engine_config).context("Failed to start engine")?;
    let dispatcher = engine.dispatcher();

    let user = args.user;
    // Run inside a block so the workers are shut down on every exit path.
    let outcome: Result<()> = async move {
        match args.command {
            SubCommand::Run {
                file,
                analysis,
                backend,
                params,
                wait,
                poll_ms,
            } => {
                let params: serde_json::Value = match params {
                    Some(text) => serde_json::from_str(&text).context("--params is not valid JSON")?,
                    None => serde_json::Value::Null,
                };
                let data_file = dispatcher
                    .register_data_file(user, &file, false)
                    .with_context(|| format!("Failed to register {}", file.display()))?;
                let job = dispatcher
                    .create_job(user, data_file.id, &analysis, &backend, params)
                    .await?;
                info!("Submitted job {} ({})", job.id, job.analysis_type.label());

                if wait {
                    let job = dispatcher
                        .wait_until_terminal(job.id, Duration::from_millis(poll_ms.max(1)))
                        .await?;
                    print_json(&job)?;
                    print_json(&dispatcher.list_results(job.id)?)
                } else {
                    warn!("Not waiting: queued jobs stop when this process exits");
                    print_json(&job)
                }
            }
            SubCommand::Status { job_id } => print_json(&dispatcher.get_status(job_id)?),
            SubCommand::Cancel { job_id } => print_json(&dispatcher.cancel(job_id)?),
            SubCommand::Results { job_id } => {
                let results = dispatcher.list_results(job_id)?;
                for result in results.iter().filter(|r| r.file_path.is_some()) {
                    let bytes = dispatcher.read_result_file(result.id).map(|b| b.len()).unwrap_or(0);
                    info!("{} result {} -> {} bytes on disk", result.result_type, result.id, bytes);
                }
                print_json(&results)
            }
            SubCommand::Schema { .. } | SubCommand::Backends => Ok(()),
        }
    }
    .await;

    engine.shutdown().await;
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_run() {
        let args = CliArgs::parse_from([
            "vast-engine",
            "run",
            "--file",
            "lc.csv",
            "--analysis",
            "rebin",
            "--params",
            "{\"bin_time\": 2.0}",
            "--wait",
        ]);
        match args.command {
            SubCommand::Run { backend, wait, .. } => {
                assert_eq!(backend, "stingray");
                assert!(wait);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_backend_summaries_cover_registry() {
        let summaries = backend_summaries();
        assert_eq!(summaries.len(), 3);
        let stingray = summaries.iter().find(|s| s.name == "stingray").unwrap();
        assert!(stingray.supports.contains(&"pds_simulation"));
    }
}
