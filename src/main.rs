//! Change-aware PostgreSQL restore
//!
//! Restores a database from a gzipped dump in object storage, skipping all
//! work when the dump has not changed since the last successful download.

// pgrestore-sync/src/main.rs
mod config;
mod errors;
mod restore;
mod utils;

use config::Settings;
use restore::RunOutcome;
use std::process::ExitCode;
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env file is fine; real deployments use env vars or secrets.
    dotenv::dotenv().ok();
    utils::logging::init();

    match run_app().await {
        Ok(RunOutcome::UpToDate) => ExitCode::SUCCESS,
        Ok(RunOutcome::Restored { etag, steps }) => {
            let steps: Vec<String> = steps.iter().map(ToString::to_string).collect();
            info!(etag = %etag, steps = ?steps, "Restore completed successfully");
            ExitCode::SUCCESS
        }
        Err(e) => {
            let report = anyhow::Error::from(e);
            error!(error = %format!("{report:#}"), "Restore failed");
            ExitCode::FAILURE
        }
    }
}

async fn run_app() -> errors::Result<RunOutcome> {
    let settings = Settings::from_env()?;
    info!(
        source = %settings.storage.location,
        download_file = %settings.download_file.display(),
        host = %settings.database.host,
        database = %settings.database.database,
        "Starting restore run"
    );
    restore::run_restore_flow(&settings).await
}
