//! Source file access: local uploads directory or a remote object store.
//!
//! Remote fetches land in a named temp file that is removed when the
//! `FetchedSource` drops, whatever the processing outcome.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tempfile::NamedTempFile;
use tracing::debug;

use courseloom_core::{Error, Result};

/// Resolves a storage key to readable file bytes.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn fetch(&self, key: &str) -> Result<FetchedSource>;
}

/// A fetched source file. `Local` points at the stored file itself; `Temp`
/// owns a downloaded copy that is deleted on drop.
pub enum FetchedSource {
    Local(PathBuf),
    Temp(NamedTempFile),
}

impl FetchedSource {
    pub fn path(&self) -> &Path {
        match self {
            Self::Local(path) => path,
            Self::Temp(file) => file.path(),
        }
    }

    pub async fn read(&self) -> Result<Vec<u8>> {
        Ok(tokio::fs::read(self.path()).await?)
    }
}

/// Storage rooted at a local directory; keys are relative paths.
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl Storage for LocalStorage {
    async fn fetch(&self, key: &str) -> Result<FetchedSource> {
        let path = self.root.join(key);
        tokio::fs::metadata(&path)
            .await
            .map_err(|_| Error::Storage(format!("missing object: {key}")))?;
        Ok(FetchedSource::Local(path))
    }
}

/// Storage backed by an HTTP object store; keys are appended to the base URL
/// and objects are downloaded to a temp file.
pub struct HttpStorage {
    base_url: String,
    client: reqwest::Client,
}

impl HttpStorage {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Storage for HttpStorage {
    async fn fetch(&self, key: &str) -> Result<FetchedSource> {
        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), key);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;
        if !response.status().is_success() {
            return Err(Error::Http(format!(
                "GET {url} returned {}",
                response.status()
            )));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        let temp = NamedTempFile::new()?;
        tokio::fs::write(temp.path(), &bytes).await?;
        debug!("Downloaded {} ({} bytes) to {}", key, bytes.len(), temp.path().display());
        Ok(FetchedSource::Temp(temp))
    }
}
