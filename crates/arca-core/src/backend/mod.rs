//! Repository backends.
//!
//! A backend turns one repository location into raw candidate documents and
//! can copy a record's artifact to local disk. The query engine never looks
//! at a location directly; it asks a [`BackendProvider`] for the backend.

pub mod http;
pub mod local;

use std::path::Path;
use std::sync::Arc;

use arca_schema::{PackageRecord, RawCandidate, RepositoryRecord, RepositoryScheme, Sha256Digest};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use crate::config::EngineConfig;
use crate::convert::declared_name;
use crate::pattern::{NamePattern, any_match};

pub use http::HttpBackend;
pub use local::LocalBackend;

/// Transport-level failures.
#[derive(Error, Debug)]
pub enum BackendError {
    /// The HTTP request failed or returned an error status.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Local filesystem access failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// No transport exists for this location.
    #[error("No transport available for '{0}'")]
    Unsupported(String),

    /// A repository document could not be decoded.
    #[error("Invalid repository document {origin}: {reason}")]
    Decode {
        /// File or URL that was read.
        origin: String,
        /// Decoder message.
        reason: String,
    },

    /// The record names no artifact to fetch.
    #[error("{0} does not publish an artifact")]
    NoArtifact(String),

    /// The fetched artifact does not match its published checksum.
    #[error("Hash mismatch: expected {expected}, got {actual}")]
    HashMismatch {
        /// Published checksum.
        expected: String,
        /// Checksum of the received bytes.
        actual: String,
    },
}

/// Access to one repository.
#[async_trait]
pub trait RepositoryBackend: Send + Sync {
    /// Return the raw candidates whose declared name matches any of
    /// `patterns`. Backends may return a superset; the caller filters again.
    async fn query(&self, patterns: &[NamePattern]) -> Result<Vec<RawCandidate>, BackendError>;

    /// Copy the artifact of `record` to the file `dest`, returning the number
    /// of bytes written. A published checksum is verified, and `dest` is
    /// removed on mismatch.
    async fn fetch_artifact(&self, record: &PackageRecord, dest: &Path)
    -> Result<u64, BackendError>;
}

/// Maps repository records to backends.
pub trait BackendProvider: Send + Sync {
    /// The backend serving `repository`.
    ///
    /// # Errors
    ///
    /// [`BackendError::Unsupported`] if the location has no transport.
    fn backend_for(
        &self,
        repository: &RepositoryRecord,
    ) -> Result<Arc<dyn RepositoryBackend>, BackendError>;
}

/// Default provider: dispatches on the location's URI scheme.
#[derive(Debug, Clone)]
pub struct SchemeProvider {
    client: reqwest::Client,
}

impl SchemeProvider {
    /// Build a provider with an HTTP client configured from `config`.
    ///
    /// # Errors
    ///
    /// Fails if the HTTP client cannot be constructed.
    pub fn new(config: &EngineConfig) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.http_timeout)
            .build()?;
        Ok(Self { client })
    }

    /// Use an existing client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl BackendProvider for SchemeProvider {
    fn backend_for(
        &self,
        repository: &RepositoryRecord,
    ) -> Result<Arc<dyn RepositoryBackend>, BackendError> {
        match repository.scheme() {
            Some(RepositoryScheme::File) => {
                Ok(Arc::new(LocalBackend::from_uri(&repository.location)?))
            }
            Some(RepositoryScheme::Http | RepositoryScheme::Https) => Ok(Arc::new(
                HttpBackend::new(self.client.clone(), &repository.location),
            )),
            Some(RepositoryScheme::Ftp) | None => {
                Err(BackendError::Unsupported(repository.location.clone()))
            }
        }
    }
}

/// Keep the candidates whose declared name matches one of `patterns`.
/// Candidates without any name only survive a match-all pattern.
pub(crate) fn retain_matching(candidates: &mut Vec<RawCandidate>, patterns: &[NamePattern]) {
    candidates.retain(|raw| any_match(patterns, declared_name(raw).unwrap_or("")));
}

/// Streams bytes to a file while hashing them.
pub(crate) struct VerifiedWriter {
    file: File,
    hasher: Sha256,
    written: u64,
}

impl VerifiedWriter {
    pub(crate) async fn create(dest: &Path) -> Result<Self, BackendError> {
        Ok(Self {
            file: File::create(dest).await?,
            hasher: Sha256::new(),
            written: 0,
        })
    }

    pub(crate) async fn write(&mut self, chunk: &[u8]) -> Result<(), BackendError> {
        self.file.write_all(chunk).await?;
        self.hasher.update(chunk);
        self.written += chunk.len() as u64;
        Ok(())
    }

    /// Flush, then check the digest against `expected` when one is published.
    pub(crate) async fn finish(
        mut self,
        dest: &Path,
        expected: Option<&Sha256Digest>,
    ) -> Result<u64, BackendError> {
        self.file.flush().await?;
        drop(self.file);

        let actual = hex::encode(self.hasher.finalize());
        if let Some(expected) = expected
            && actual != expected.as_str()
        {
            tokio::fs::remove_file(dest).await.ok();
            return Err(BackendError::HashMismatch {
                expected: expected.to_string(),
                actual,
            });
        }
        Ok(self.written)
    }
}
