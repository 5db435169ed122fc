// pgrestore-sync/src/restore/s3_download.rs
use anyhow::{Context, anyhow};
use async_trait::async_trait;
use aws_sdk_s3 as s3;
use s3::config::Region;
use std::path::Path;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::config::{ObjectLocation, StorageConfig};
use crate::errors::{RestoreError, Result};
use crate::restore::object_store::{HeadObjectResponse, ObjectStore};

const HTTP_NOT_MODIFIED: u16 = 304;

/// `ObjectStore` backed by an S3-compatible service.
pub struct S3ObjectStore {
    client: s3::Client,
}

impl S3ObjectStore {
    pub async fn connect(storage: &StorageConfig) -> Self {
        let mut loader = aws_config::defaults(s3::config::BehaviorVersion::latest())
            .region(Region::new(storage.region.clone()))
            .credentials_provider(s3::config::Credentials::new(
                &storage.access_key_id,
                &storage.secret_access_key,
                None, // session_token
                None, // expiry
                "Static",
            ));
        if let Some(endpoint) = &storage.endpoint_url {
            loader = loader.endpoint_url(endpoint);
        }
        let sdk_config = loader.load().await;

        let s3_config = s3::config::Builder::from(&sdk_config)
            .force_path_style(storage.force_path_style)
            .build();

        S3ObjectStore {
            client: s3::Client::from_conf(s3_config),
        }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn head_object(
        &self,
        location: &ObjectLocation,
        if_none_match: Option<&str>,
    ) -> anyhow::Result<HeadObjectResponse> {
        let result = self
            .client
            .head_object()
            .bucket(&location.bucket)
            .key(&location.key)
            .set_if_none_match(if_none_match.map(str::to_string))
            .send()
            .await;

        match result {
            Ok(head) => Ok(HeadObjectResponse {
                etag: head.e_tag().map(str::to_string),
                metadata: head.metadata().cloned().unwrap_or_default(),
                not_modified: false,
            }),
            Err(err)
                if err.raw_response().map(|r| r.status().as_u16()) == Some(HTTP_NOT_MODIFIED) =>
            {
                Ok(HeadObjectResponse::not_modified())
            }
            Err(err) => Err(anyhow!(err).context(format!("HeadObject {} failed", location))),
        }
    }

    async fn get_object(&self, location: &ObjectLocation, destination: &Path) -> anyhow::Result<u64> {
        let mut object = self
            .client
            .get_object()
            .bucket(&location.bucket)
            .key(&location.key)
            .send()
            .await
            .with_context(|| format!("Failed to get object {}", location))?;

        let mut output_file = File::create(destination)
            .await
            .with_context(|| format!("Failed to create destination file: {}", destination.display()))?;

        let mut total_bytes_downloaded: u64 = 0;
        while let Some(bytes_chunk) = object
            .body
            .try_next()
            .await
            .with_context(|| format!("Failed reading body of {}", location))?
        {
            output_file
                .write_all(&bytes_chunk)
                .await
                .with_context(|| format!("Failed to write to destination file: {}", destination.display()))?;
            total_bytes_downloaded += bytes_chunk.len() as u64;
        }
        output_file
            .flush()
            .await
            .with_context(|| format!("Failed to flush destination file: {}", destination.display()))?;

        Ok(total_bytes_downloaded)
    }
}

/// Downloads the artifact to `destination`, creating parent directories.
///
/// After a failure the destination may hold a partial file; callers must not
/// use it.
pub async fn fetch_artifact(
    store: &dyn ObjectStore,
    location: &ObjectLocation,
    destination: &Path,
) -> Result<u64> {
    info!(
        bucket = %location.bucket,
        key = %location.key,
        path = %destination.display(),
        "Downloading artifact"
    );

    let download_error = |source: anyhow::Error| RestoreError::Download {
        bucket: location.bucket.clone(),
        key: location.key.clone(),
        path: destination.to_path_buf(),
        source,
    };

    if let Some(parent_dir) = destination.parent() {
        if !parent_dir.as_os_str().is_empty() && !parent_dir.exists() {
            debug!(dir = %parent_dir.display(), "Creating download directory");
            tokio::fs::create_dir_all(parent_dir)
                .await
                .with_context(|| format!("Failed to create directory for download: {}", parent_dir.display()))
                .map_err(download_error)?;
        }
    }

    let bytes = store
        .get_object(location, destination)
        .await
        .map_err(download_error)?;

    info!(
        bucket = %location.bucket,
        key = %location.key,
        path = %destination.display(),
        bytes,
        "Artifact downloaded"
    );
    Ok(bytes)
}
