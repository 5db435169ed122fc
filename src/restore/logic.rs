// pgrestore-sync/src/restore/logic.rs
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::config::{DatabaseConfig, ObjectLocation};
use crate::errors::Result;
use crate::restore::change_detection::detect_change;
use crate::restore::db_restore::{SqlRunner, StepLabel, execute_steps, plan_steps};
use crate::restore::decompress::decompress_artifact;
use crate::restore::fingerprint::{FingerprintRecord, MetadataStore};
use crate::restore::object_store::ObjectStore;
use crate::restore::s3_download::fetch_artifact;

/// Parameters of one run.
#[derive(Debug, Clone)]
pub struct RestoreJob {
    pub location: ObjectLocation,
    pub download_file: PathBuf,
    pub pre_processing_sql: Option<PathBuf>,
    pub post_processing_sql: Option<PathBuf>,
    pub database: DatabaseConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    CheckingChange,
    UpToDate,
    Fetching,
    PersistingFingerprint,
    Decompressing,
    Restoring,
    Done,
    Failed,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    UpToDate,
    Restored { etag: String, steps: Vec<StepLabel> },
}

/// Sequences change detection, download, fingerprinting, decompression and
/// the SQL steps for one job.
pub struct RestoreOrchestrator<'a> {
    job: &'a RestoreJob,
    store: &'a dyn ObjectStore,
    runner: &'a dyn SqlRunner,
    metadata: MetadataStore,
    state: RunState,
}

impl<'a> RestoreOrchestrator<'a> {
    pub fn new(job: &'a RestoreJob, store: &'a dyn ObjectStore, runner: &'a dyn SqlRunner) -> Self {
        RestoreOrchestrator {
            job,
            store,
            runner,
            metadata: MetadataStore::for_artifact(&job.download_file),
            state: RunState::Idle,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    fn transition(&mut self, next: RunState) {
        debug!(from = %self.state, to = %next, "Restore state transition");
        self.state = next;
    }

    pub async fn run(&mut self) -> Result<RunOutcome> {
        match self.run_stages().await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                self.transition(RunState::Failed);
                Err(e)
            }
        }
    }

    async fn run_stages(&mut self) -> Result<RunOutcome> {
        let job = self.job;
        let previous = self.metadata.load();
        self.transition(RunState::CheckingChange);

        let Some(remote) = detect_change(
            self.store,
            &job.location,
            previous.previous_etag(),
            previous.previous_sha256(),
        )
        .await?
        else {
            self.transition(RunState::UpToDate);
            info!(
                bucket = %job.location.bucket,
                key = %job.location.key,
                "Remote dump unchanged, nothing to restore"
            );
            return Ok(RunOutcome::UpToDate);
        };

        info!(
            key = %job.location.key,
            previous_etag = %previous.etag,
            etag = %remote.etag,
            "Remote dump changed"
        );

        self.transition(RunState::Fetching);
        fetch_artifact(self.store, &job.location, &job.download_file).await?;

        // Persisted before decompression: a crash past this point skips the
        // re-download next run even though the restore did not complete.
        self.transition(RunState::PersistingFingerprint);
        self.metadata.save(&FingerprintRecord {
            etag: remote.etag.clone(),
            uncompressed_sha256: remote.uncompressed_sha256.clone(),
            file_path: job.download_file.display().to_string(),
        })?;

        self.transition(RunState::Decompressing);
        let dump = decompress_artifact(&job.download_file).await?;

        self.transition(RunState::Restoring);
        let steps = plan_steps(
            job.pre_processing_sql.as_deref(),
            &dump,
            job.post_processing_sql.as_deref(),
        );
        execute_steps(self.runner, &job.database, &steps).await?;

        self.transition(RunState::Done);
        Ok(RunOutcome::Restored {
            etag: remote.etag,
            steps: steps.iter().map(|s| s.label).collect(),
        })
    }

    pub fn fingerprint_path(&self) -> &Path {
        self.metadata.path()
    }
}
