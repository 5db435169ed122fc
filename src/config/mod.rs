// pgrestore-sync/src/config/mod.rs
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::errors::{RestoreError, Result};

const DEFAULT_SECRETS_DIR: &str = "/run/secrets";
const DEFAULT_DOWNLOAD_FILE: &str = "./data/dl/s3_file.sql.gz";
const DEFAULT_REGION: &str = "us-east-1";

/// Bucket and key of the dump object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectLocation {
    pub bucket: String,
    pub key: String,
}

impl fmt::Display for ObjectLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.key)
    }
}

#[derive(Clone)]
pub struct StorageConfig {
    pub location: ObjectLocation,
    pub region: String,
    pub endpoint_url: Option<String>,
    pub force_path_style: bool,
    pub access_key_id: String,
    pub secret_access_key: String,
}

impl fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageConfig")
            .field("location", &self.location)
            .field("region", &self.region)
            .field("endpoint_url", &self.endpoint_url)
            .field("force_path_style", &self.force_path_style)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .finish()
    }
}

#[derive(Clone)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Everything one restore run needs, built once at startup.
#[derive(Debug, Clone)]
pub struct Settings {
    pub storage: StorageConfig,
    pub download_file: PathBuf,
    pub pre_processing_sql: Option<PathBuf>,
    pub post_processing_sql: Option<PathBuf>,
    pub database: DatabaseConfig,
}

impl Settings {
    /// Reads settings from the process environment, falling back to one file
    /// per key in the secrets directory.
    pub fn from_env() -> Result<Self> {
        let secrets_dir = std::env::var("SECRETS_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_SECRETS_DIR));
        let secrets = if secrets_dir.is_dir() {
            Some(secrets_dir)
        } else {
            None
        };

        Self::from_lookup(layered_lookup(
            |key| std::env::var(key).ok(),
            secrets.as_deref(),
        ))
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let require = |key: &str| {
            get(key).ok_or_else(|| RestoreError::Config(format!("{} must be set", key)))
        };

        let location = match get("S3_URI") {
            Some(uri) => parse_s3_uri(&uri)?,
            None => ObjectLocation {
                bucket: require("S3_BUCKET_NAME")?,
                key: require("S3_KEY")?,
            },
        };

        let storage = StorageConfig {
            location,
            region: get("AWS_REGION").unwrap_or_else(|| DEFAULT_REGION.to_string()),
            endpoint_url: get("S3_ENDPOINT_URL"),
            force_path_style: match get("S3_FORCE_PATH_STYLE") {
                Some(raw) => parse_bool("S3_FORCE_PATH_STYLE", &raw)?,
                None => false,
            },
            access_key_id: require("AWS_ACCESS_KEY_ID")?,
            secret_access_key: require("AWS_SECRET_ACCESS_KEY")?,
        };

        let port = match get("POSTGRES_PORT") {
            Some(raw) => raw.parse::<u16>().map_err(|e| {
                RestoreError::Config(format!("POSTGRES_PORT '{}' is not a valid port: {}", raw, e))
            })?,
            None => 5432,
        };

        let database = DatabaseConfig {
            host: get("POSTGRES_HOST").unwrap_or_else(|| "localhost".to_string()),
            port,
            database: get("POSTGRES_DB").unwrap_or_else(|| "postgres".to_string()),
            user: get("POSTGRES_USER").unwrap_or_else(|| "postgres".to_string()),
            password: require("POSTGRES_PASSWORD")?,
        };

        Ok(Settings {
            storage,
            download_file: get("DOWNLOAD_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DOWNLOAD_FILE)),
            pre_processing_sql: get("PRE_PROCESSING_SQL").map(PathBuf::from),
            post_processing_sql: get("POST_PROCESSING_SQL").map(PathBuf::from),
            database,
        })
    }
}

/// Environment first (`.env` is already merged into it), then the secrets dir.
fn layered_lookup<'a, E>(env: E, secrets: Option<&'a Path>) -> impl Fn(&str) -> Option<String> + 'a
where
    E: Fn(&str) -> Option<String> + 'a,
{
    move |key| {
        env(key)
            .filter(|v| !v.trim().is_empty())
            .or_else(|| secrets.and_then(|dir| read_secret(dir, key)))
    }
}

fn read_secret(dir: &Path, key: &str) -> Option<String> {
    fs::read_to_string(dir.join(key)).ok()
}

fn parse_bool(key: &str, raw: &str) -> Result<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(RestoreError::Config(format!("{} '{}' is not a boolean", key, raw))),
    }
}

/// Parses an S3 URI (s3://bucket/key) into bucket and key.
pub fn parse_s3_uri(s3_uri: &str) -> Result<ObjectLocation> {
    let uri = url::Url::parse(s3_uri)
        .map_err(|e| RestoreError::Config(format!("Invalid S3 URI format: {}: {}", s3_uri, e)))?;
    if uri.scheme() != "s3" {
        return Err(RestoreError::Config("S3 URI must start with s3://".to_string()));
    }
    let bucket = uri
        .host_str()
        .filter(|b| !b.is_empty())
        .ok_or_else(|| RestoreError::Config(format!("S3 URI missing bucket name: {}", s3_uri)))?
        .to_string();
    let key = uri.path().trim_start_matches('/').to_string();
    if key.is_empty() {
        return Err(RestoreError::Config(format!(
            "S3 URI missing key (object path): {}",
            s3_uri
        )));
    }
    Ok(ObjectLocation { bucket, key })
}
