//! Object storage capability used by the restore pipeline

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;

use crate::config::ObjectLocation;

/// Result of a metadata-only query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeadObjectResponse {
    pub etag: Option<String>,
    pub metadata: HashMap<String, String>,
    /// The store answered the `If-None-Match` precondition with 304.
    pub not_modified: bool,
}

impl HeadObjectResponse {
    pub fn not_modified() -> Self {
        HeadObjectResponse {
            not_modified: true,
            ..Default::default()
        }
    }
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch object metadata, optionally conditional on the etag differing.
    async fn head_object(
        &self,
        location: &ObjectLocation,
        if_none_match: Option<&str>,
    ) -> anyhow::Result<HeadObjectResponse>;

    /// Download the whole object to `destination`, replacing any existing file.
    async fn get_object(&self, location: &ObjectLocation, destination: &Path) -> anyhow::Result<u64>;
}
