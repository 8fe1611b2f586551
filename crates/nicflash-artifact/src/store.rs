//! Artifact store trait and HTTP implementation

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use md5::{Digest, Md5};
use reqwest::Client;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument, warn};

use crate::checksum::Checksum;
use crate::error::ArtifactError;

/// What to fetch and where to put it
#[derive(Debug, Clone)]
pub struct ArtifactRequest {
    /// Source URL
    pub url: String,
    /// Expected digest; `None` skips verification
    pub checksum: Option<Checksum>,
    /// Local path the artifact is stored at
    pub destination: PathBuf,
}

/// Fetches and caches artifacts
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Make a verified copy of the artifact available at `request.destination`
    ///
    /// On checksum mismatch nothing is left at the destination.
    async fn fetch(&self, request: &ArtifactRequest) -> Result<PathBuf, ArtifactError>;
}

/// Artifact store downloading over HTTP(S)
#[derive(Debug, Clone)]
pub struct HttpArtifactStore {
    client: Client,
}

impl HttpArtifactStore {
    /// Create a store with a default client
    ///
    /// # Errors
    /// Returns `ArtifactError::Download` if the HTTP client cannot be built.
    pub fn new(timeout: Duration) -> Result<Self, ArtifactError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ArtifactError::Download {
                url: String::new(),
                message: e.to_string(),
            })?;
        Ok(Self { client })
    }

    /// Create a store with a custom `reqwest::Client`
    #[must_use]
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    /// Reuse a cached file when its digest matches
    ///
    /// Without a declared checksum a cached file is never trusted.
    async fn cached(&self, request: &ArtifactRequest) -> Result<bool, ArtifactError> {
        let path = &request.destination;
        match tokio::fs::metadata(path).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(ArtifactError::io(path, e)),
        }

        if let Some(expected) = &request.checksum
            && Checksum::of_file(path).await? == *expected
        {
            debug!(path = %path.display(), "artifact already downloaded");
            return Ok(true);
        }

        debug!(path = %path.display(), "removing stale artifact");
        tokio::fs::remove_file(path)
            .await
            .map_err(|e| ArtifactError::io(path, e))?;
        Ok(false)
    }

    /// Stream the body to `destination`, hashing it on the way
    async fn download(&self, url: &str, destination: &Path) -> Result<Checksum, ArtifactError> {
        let download_error = |e: reqwest::Error| ArtifactError::Download {
            url: url.to_string(),
            message: e.to_string(),
        };
        let mut response = self.client.get(url).send().await.map_err(download_error)?;

        if !response.status().is_success() {
            return Err(ArtifactError::Download {
                url: url.to_string(),
                message: response.status().to_string(),
            });
        }

        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ArtifactError::io(parent, e))?;
        }
        let mut file = tokio::fs::File::create(destination)
            .await
            .map_err(|e| ArtifactError::io(destination, e))?;

        let mut hasher = Md5::new();
        let mut bytes = 0u64;
        while let Some(chunk) = response.chunk().await.map_err(download_error)? {
            hasher.update(&chunk);
            file.write_all(&chunk)
                .await
                .map_err(|e| ArtifactError::io(destination, e))?;
            bytes += chunk.len() as u64;
        }
        file.flush()
            .await
            .map_err(|e| ArtifactError::io(destination, e))?;

        info!(url, bytes, path = %destination.display(), "artifact downloaded");
        Ok(Checksum::from_hasher(hasher))
    }
}

/// Sibling path a download is written to before it is verified
fn partial_path(destination: &Path) -> PathBuf {
    let mut name = destination.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

async fn discard(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await
        && e.kind() != std::io::ErrorKind::NotFound
    {
        warn!(error = %e, path = %path.display(), "failed to remove partial artifact");
    }
}

#[async_trait]
impl ArtifactStore for HttpArtifactStore {
    #[instrument(skip(self, request), fields(url = %request.url))]
    async fn fetch(&self, request: &ArtifactRequest) -> Result<PathBuf, ArtifactError> {
        if self.cached(request).await? {
            return Ok(request.destination.clone());
        }

        let partial = partial_path(&request.destination);
        let actual = match self.download(&request.url, &partial).await {
            Ok(actual) => actual,
            Err(e) => {
                discard(&partial).await;
                return Err(e);
            }
        };

        if let Some(expected) = &request.checksum
            && actual != *expected
        {
            warn!(expected = %expected, actual = %actual, "checksum mismatch");
            discard(&partial).await;
            return Err(ArtifactError::ChecksumMismatch {
                url: request.url.clone(),
                expected: expected.to_string(),
                actual: actual.to_string(),
            });
        }

        tokio::fs::rename(&partial, &request.destination)
            .await
            .map_err(|e| ArtifactError::io(&request.destination, e))?;
        Ok(request.destination.clone())
    }
}
