//! Fetching patch assets into a sandbox

use crate::config::AssetConfig;
use crate::error::{AssetError, SandboxError};
use async_trait::async_trait;
use std::path::Path;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};
use url::Url;

/// Retrieves the bytes behind an asset URL and stores them at `dest`.
#[async_trait]
pub trait AssetFetcher: Send + Sync {
    /// Returns the number of bytes written
    async fn fetch(&self, url: &str, dest: &Path) -> Result<u64, AssetError>;
}

/// `http(s)://` via reqwest, `file://` from the local filesystem.
pub struct HttpAssetFetcher {
    client: reqwest::Client,
    max_bytes: u64,
}

impl HttpAssetFetcher {
    pub fn new(config: &AssetConfig) -> Result<Self, AssetError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| AssetError::Request {
                url: String::new(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            client,
            max_bytes: config.max_bytes,
        })
    }

    async fn download(&self, url: &Url, dest: &Path) -> Result<u64, AssetError> {
        let request_error = |e: reqwest::Error| AssetError::Request {
            url: url.to_string(),
            reason: e.to_string(),
        };

        let mut response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(request_error)?;

        if !response.status().is_success() {
            return Err(AssetError::Status {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }
        if response.content_length().is_some_and(|len| len > self.max_bytes) {
            return Err(self.too_large(url));
        }

        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(|e| SandboxError::io(dest, e))?;
        let mut written: u64 = 0;
        while let Some(chunk) = response.chunk().await.map_err(request_error)? {
            written += chunk.len() as u64;
            if written > self.max_bytes {
                drop(file);
                let _ = tokio::fs::remove_file(dest).await;
                return Err(self.too_large(url));
            }
            file.write_all(&chunk)
                .await
                .map_err(|e| SandboxError::io(dest, e))?;
        }
        file.flush().await.map_err(|e| SandboxError::io(dest, e))?;
        Ok(written)
    }

    async fn copy_local(&self, url: &Url, dest: &Path) -> Result<u64, AssetError> {
        let source = url
            .to_file_path()
            .map_err(|_| AssetError::InvalidUrl(url.to_string()))?;
        let metadata = tokio::fs::metadata(&source)
            .await
            .map_err(|e| SandboxError::io(&source, e))?;
        if metadata.len() > self.max_bytes {
            return Err(self.too_large(url));
        }
        tokio::fs::copy(&source, dest)
            .await
            .map_err(|e| SandboxError::io(&source, e).into())
    }

    fn too_large(&self, url: &Url) -> AssetError {
        AssetError::TooLarge {
            url: url.to_string(),
            limit: self.max_bytes,
        }
    }
}

#[async_trait]
impl AssetFetcher for HttpAssetFetcher {
    async fn fetch(&self, url: &str, dest: &Path) -> Result<u64, AssetError> {
        let parsed = Url::parse(url).map_err(|_| AssetError::InvalidUrl(url.to_string()))?;
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| SandboxError::io(parent, e))?;
        }

        let bytes = match parsed.scheme() {
            "http" | "https" => self.download(&parsed, dest).await?,
            "file" => self.copy_local(&parsed, dest).await?,
            other => return Err(AssetError::UnsupportedScheme(other.to_string())),
        };
        info!(url = %parsed, bytes, "Fetched asset");
        debug!(dest = %dest.display(), "Asset stored");
        Ok(bytes)
    }
}

/// File name for an asset: the sanitized `name`, or the last URL segment.
pub fn asset_file_name(url: &str, name: Option<&str>) -> Option<String> {
    let candidate = match name.map(str::trim).filter(|n| !n.is_empty()) {
        Some(name) => name.to_string(),
        None => Url::parse(url)
            .ok()?
            .path_segments()?
            .filter(|s| !s.is_empty())
            .last()?
            .to_string(),
    };
    let sanitized: String = candidate
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let sanitized = sanitized.trim_start_matches('.').to_string();
    if sanitized.is_empty() {
        None
    } else {
        Some(sanitized)
    }
}
