mod logic;
pub(crate) mod change_detection;
pub(crate) mod db_restore;
pub(crate) mod decompress;
pub(crate) mod fingerprint;
pub(crate) mod object_store;
pub(crate) mod s3_download;

pub use logic::{RestoreJob, RestoreOrchestrator, RunOutcome};

use crate::config::Settings;
use crate::errors::Result;
use db_restore::PsqlRunner;
use s3_download::S3ObjectStore;
use tracing::debug;

impl RestoreJob {
    pub fn from_settings(settings: &Settings) -> Self {
        RestoreJob {
            location: settings.storage.location.clone(),
            download_file: settings.download_file.clone(),
            pre_processing_sql: settings.pre_processing_sql.clone(),
            post_processing_sql: settings.post_processing_sql.clone(),
            database: settings.database.clone(),
        }
    }
}

/// Public entry point for the restore process: wires the S3 store and psql
/// into the orchestrator and runs one job.
pub async fn run_restore_flow(settings: &Settings) -> Result<RunOutcome> {
    let job = RestoreJob::from_settings(settings);
    let store = S3ObjectStore::connect(&settings.storage).await;
    let runner = PsqlRunner;

    let mut orchestrator = RestoreOrchestrator::new(&job, &store, &runner);
    debug!(fingerprint = %orchestrator.fingerprint_path().display(), "Using fingerprint file");
    let result = orchestrator.run().await;
    debug!(state = %orchestrator.state(), "Restore run finished");
    result
}
