// pgrestore-sync/src/restore/change_detection.rs
use anyhow::anyhow;
use tracing::debug;

use crate::config::ObjectLocation;
use crate::errors::{RestoreError, Result};
use crate::restore::object_store::{HeadObjectResponse, ObjectStore};

/// Object metadata keys the producer may use for the decompressed content hash.
pub const SHA256_METADATA_KEYS: &[&str] = &["uncompressed_sha256", "uncompressed-sha256"];

/// Identity of the remote artifact at query time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteObjectMetadata {
    pub etag: String,
    pub uncompressed_sha256: Option<String>,
}

/// First tier: the store itself answered the conditional request with 304.
pub fn store_reports_unchanged(response: &HeadObjectResponse) -> bool {
    response.not_modified
}

/// Second tier: the producer-supplied content hash equals the one we restored.
pub fn content_hash_matches(previous: Option<&str>, remote: Option<&str>) -> bool {
    match (previous, remote) {
        (Some(previous), Some(remote)) => !previous.is_empty() && previous == remote,
        _ => false,
    }
}

fn remote_sha256(response: &HeadObjectResponse) -> Option<String> {
    SHA256_METADATA_KEYS
        .iter()
        .find_map(|key| response.metadata.get(*key))
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Returns `None` when the remote artifact is confirmed unchanged, otherwise
/// its current metadata.
pub async fn detect_change(
    store: &dyn ObjectStore,
    location: &ObjectLocation,
    previous_etag: Option<&str>,
    previous_sha256: Option<&str>,
) -> Result<Option<RemoteObjectMetadata>> {
    let query_error = |source: anyhow::Error| RestoreError::MetadataQuery {
        bucket: location.bucket.clone(),
        key: location.key.clone(),
        source,
    };

    debug!(
        bucket = %location.bucket,
        key = %location.key,
        if_none_match = previous_etag.unwrap_or(""),
        "Querying object metadata"
    );
    let response = store
        .head_object(location, previous_etag)
        .await
        .map_err(query_error)?;

    if store_reports_unchanged(&response) {
        debug!(key = %location.key, "Store reported not modified");
        return Ok(None);
    }

    let uncompressed_sha256 = remote_sha256(&response);
    if content_hash_matches(previous_sha256, uncompressed_sha256.as_deref()) {
        debug!(
            key = %location.key,
            etag = response.etag.as_deref().unwrap_or(""),
            "Etag changed but content hash matches"
        );
        return Ok(None);
    }

    let etag = response
        .etag
        .filter(|e| !e.is_empty())
        .ok_or_else(|| query_error(anyhow!("object metadata has no ETag")))?;

    Ok(Some(RemoteObjectMetadata {
        etag,
        uncompressed_sha256,
    }))
}
