//! churnlens: customer churn analytics service
//!
//! Serves the analysis endpoint over HTTP, or with `--report` runs the full
//! analysis once and writes the JSON response to a file.

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use churnlens::{dispatch, run_server, AnalysisRequest, AnalysisSession, Args};
use tracing::info;

fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| args.log_filter().into()),
        )
        .init();

    let config = args.analysis_config();
    let source = args.data_source(&config);
    let session = Arc::new(AnalysisSession::new(config, source));

    match &args.report {
        Some(path) => {
            let start = Instant::now();
            let response = dispatch(&session, &AnalysisRequest::default())?;
            let json = serde_json::to_string_pretty(&response)?;
            std::fs::write(path, json)
                .with_context(|| format!("failed to write report to {}", path.display()))?;
            info!(
                path = %path.display(),
                elapsed_secs = start.elapsed().as_secs_f64(),
                "Report written"
            );
            Ok(())
        }
        None => {
            // blocking object-storage fetches must stay off the runtime threads
            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(run_server(args.server_config(), session))
        }
    }
}
