use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid asset key: {0}")]
    InvalidKey(String),
    #[error("S3 error: {0}")]
    S3(String),
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Destination for uploaded images.
///
/// Keys are slash-separated (`artists/42`, `venues/<uuid>`). Writing an
/// existing key replaces the object.
#[async_trait]
pub trait AssetStore: Send + Sync {
    /// Store `data` under `key` and return the URL it can be fetched from.
    async fn put(&self, key: &str, data: &[u8]) -> Result<String, StorageError>;

    /// Filesystem directory holding the assets, for backends that have one.
    fn local_root(&self) -> Option<&Path> {
        None
    }
}

// ─── Local Filesystem Backend ──────────────────────────────────────

#[derive(Debug, Clone)]
pub struct LocalAssetStore {
    base_path: PathBuf,
    public_url: String,
}

impl LocalAssetStore {
    pub fn new(base_path: impl Into<PathBuf>, public_url: impl Into<String>) -> Self {
        Self {
            base_path: base_path.into(),
            public_url: public_url.into(),
        }
    }

    pub fn from_env() -> Self {
        let base =
            std::env::var("ASSET_STORAGE_PATH").unwrap_or_else(|_| "./data/assets".to_string());
        let public_url = std::env::var("ASSET_PUBLIC_URL").unwrap_or_else(|_| "/media".to_string());
        Self::new(base, public_url)
    }

    pub fn base(&self) -> &Path {
        &self.base_path
    }

    pub fn full_path(&self, key: &str) -> PathBuf {
        self.base_path.join(key)
    }
}

#[async_trait]
impl AssetStore for LocalAssetStore {
    async fn put(&self, key: &str, data: &[u8]) -> Result<String, StorageError> {
        let key = sanitize_key(key)?;
        let path = self.full_path(&key);

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&path, data).await?;

        tracing::debug!(key = %key, bytes = data.len(), "stored asset on local filesystem");
        Ok(join_url(&self.public_url, &key))
    }

    fn local_root(&self) -> Option<&Path> {
        Some(&self.base_path)
    }
}

// ─── S3 Backend ────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct S3AssetStore {
    client: aws_sdk_s3::Client,
    bucket: String,
    prefix: String,
    public_url: String,
}

impl S3AssetStore {
    /// Build a client for an S3-compatible endpoint.
    ///
    /// `public_url` is the base objects are served from. When absent it is
    /// derived from the endpoint (path style) or the AWS virtual-host name.
    pub async fn from_config(
        endpoint: Option<&str>,
        region: &str,
        access_key: &str,
        secret_key: &str,
        bucket: &str,
        prefix: &str,
        public_url: Option<&str>,
    ) -> Result<Self, StorageError> {
        if bucket.trim().is_empty() {
            return Err(StorageError::Config("S3 bucket name is empty".to_string()));
        }

        let creds =
            aws_sdk_s3::config::Credentials::new(access_key, secret_key, None, None, "giglocal");

        let mut config_builder = aws_sdk_s3::Config::builder()
            .region(aws_sdk_s3::config::Region::new(region.to_string()))
            .credentials_provider(creds)
            .behavior_version_latest();

        if let Some(ep) = endpoint {
            config_builder = config_builder.endpoint_url(ep).force_path_style(true);
        }

        let client = aws_sdk_s3::Client::from_conf(config_builder.build());

        let public_url = match public_url {
            Some(url) => url.to_string(),
            None => default_public_url(endpoint, region, bucket),
        };

        Ok(Self {
            client,
            bucket: bucket.to_string(),
            prefix: prefix.to_string(),
            public_url,
        })
    }
}

#[async_trait]
impl AssetStore for S3AssetStore {
    async fn put(&self, key: &str, data: &[u8]) -> Result<String, StorageError> {
        let key = prefixed_key(&self.prefix, &sanitize_key(key)?);

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(data.to_vec().into())
            .content_type(sniff_content_type(data))
            .send()
            .await
            .map_err(|e| StorageError::S3(format!("PutObject failed: {e}")))?;

        tracing::debug!(bucket = %self.bucket, key = %key, bytes = data.len(), "stored asset in S3");
        Ok(join_url(&self.public_url, &key))
    }
}

// ─── Helpers ───────────────────────────────────────────────────────

fn prefixed_key(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{}/{}", prefix.trim_end_matches('/'), key)
    }
}

fn default_public_url(endpoint: Option<&str>, region: &str, bucket: &str) -> String {
    match endpoint {
        Some(ep) => format!("{}/{}", ep.trim_end_matches('/'), bucket),
        None => format!("https://{bucket}.s3.{region}.amazonaws.com"),
    }
}

fn join_url(base: &str, key: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), key)
}

/// Normalise a slash-separated asset key.
///
/// Each segment has filesystem-hostile characters replaced, and `.`/`..`
/// segments are rejected so a key can never escape the storage root.
pub fn sanitize_key(key: &str) -> Result<String, StorageError> {
    let mut segments = Vec::new();
    for raw in key.split('/') {
        let segment: String = raw
            .chars()
            .map(|c| match c {
                '\\' | '\0' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
                _ => c,
            })
            .collect::<String>()
            .trim()
            .to_string();

        match segment.as_str() {
            "" => continue,
            "." | ".." => return Err(StorageError::InvalidKey(key.to_string())),
            _ => segments.push(segment),
        }
    }

    if segments.is_empty() {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    Ok(segments.join("/"))
}

/// Best-effort MIME type from the leading bytes of an image.
pub fn sniff_content_type(data: &[u8]) -> &'static str {
    if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
        "image/jpeg"
    } else if data.starts_with(&[0x89, 0x50, 0x4E, 0x47]) {
        "image/png"
    } else if data.len() > 12 && &data[8..12] == b"WEBP" {
        "image/webp"
    } else if data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a") {
        "image/gif"
    } else {
        "application/octet-stream"
    }
}
