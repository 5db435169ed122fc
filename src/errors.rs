use std::path::PathBuf;
use thiserror::Error;

use crate::restore::db_restore::StepLabel;

#[derive(Error, Debug)]
pub enum RestoreError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Metadata query failed for s3://{bucket}/{key}")]
    MetadataQuery {
        bucket: String,
        key: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Download of s3://{bucket}/{key} to {} failed", .path.display())]
    Download {
        bucket: String,
        key: String,
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("Decompression of {} failed", .path.display())]
    Decompression {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("Writing fingerprint {} failed", .path.display())]
    Fingerprint {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("{step} script {} failed (exit status: {})", .script.display(), exit_status(.exit_code))]
    SqlExecution {
        step: StepLabel,
        script: PathBuf,
        exit_code: Option<i32>,
        #[source]
        source: anyhow::Error,
    },
}

fn exit_status(code: &Option<i32>) -> String {
    match code {
        Some(code) => code.to_string(),
        None => "none".to_string(),
    }
}

pub type Result<T> = std::result::Result<T, RestoreError>;
