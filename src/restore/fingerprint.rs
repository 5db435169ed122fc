// pgrestore-sync/src/restore/fingerprint.rs
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{info, warn};

use crate::errors::{RestoreError, Result};

const FINGERPRINT_SUFFIX: &str = ".metadata.json";

/// What was last downloaded successfully.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FingerprintRecord {
    #[serde(default)]
    pub etag: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uncompressed_sha256: Option<String>,
    #[serde(default)]
    pub file_path: String,
}

impl FingerprintRecord {
    pub fn previous_etag(&self) -> Option<&str> {
        Some(self.etag.as_str()).filter(|e| !e.is_empty())
    }

    pub fn previous_sha256(&self) -> Option<&str> {
        self.uncompressed_sha256.as_deref().filter(|h| !h.is_empty())
    }
}

/// Persists the fingerprint next to the downloaded artifact.
#[derive(Debug, Clone)]
pub struct MetadataStore {
    path: PathBuf,
}

impl MetadataStore {
    pub fn for_artifact(artifact_path: &Path) -> Self {
        let mut name = OsString::from(artifact_path.as_os_str());
        name.push(FINGERPRINT_SUFFIX);
        MetadataStore {
            path: PathBuf::from(name),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Missing or unreadable records load as the empty fingerprint, which
    /// forces a fetch.
    pub fn load(&self) -> FingerprintRecord {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %self.path.display(), "No fingerprint found, treating as first run");
                return FingerprintRecord::default();
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Fingerprint unreadable, ignoring it");
                return FingerprintRecord::default();
            }
        };

        match serde_json::from_str(&raw) {
            Ok(record) => record,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Fingerprint is not valid JSON, ignoring it");
                FingerprintRecord::default()
            }
        }
    }

    /// Replaces the stored record atomically (temp file + rename).
    pub fn save(&self, record: &FingerprintRecord) -> Result<()> {
        self.write_atomically(record)
            .map_err(|source| RestoreError::Fingerprint {
                path: self.path.clone(),
                source,
            })?;
        info!(path = %self.path.display(), etag = %record.etag, "Fingerprint saved");
        Ok(())
    }

    fn write_atomically(&self, record: &FingerprintRecord) -> anyhow::Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create directory {}", dir.display()))?;

        let body = serde_json::to_string(record).context("Failed to encode fingerprint")?;
        let mut tmp = NamedTempFile::new_in(&dir)
            .with_context(|| format!("Failed to create temp file in {}", dir.display()))?;
        tmp.write_all(body.as_bytes())
            .context("Failed to write fingerprint temp file")?;
        tmp.as_file()
            .sync_all()
            .context("Failed to flush fingerprint temp file")?;
        tmp.persist(&self.path)
            .with_context(|| format!("Failed to move fingerprint into place at {}", self.path.display()))?;
        Ok(())
    }
}
