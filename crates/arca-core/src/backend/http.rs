//! Backend for `http` and `https` repositories.
//!
//! The repository publishes `<base>/index.json`, a JSON array of candidate
//! documents. Artifacts are streamed to disk and hashed on the way.

use std::path::Path;

use arca_schema::{PackageRecord, RawCandidate};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;

use super::local::decode_documents;
use super::{BackendError, RepositoryBackend, VerifiedWriter, retain_matching};
use crate::pattern::NamePattern;

/// A repository served over HTTP.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    base: String,
}

impl HttpBackend {
    /// A backend rooted at `base`.
    pub fn new(client: Client, base: &str) -> Self {
        Self {
            client,
            base: base.trim_end_matches('/').to_string(),
        }
    }

    fn index_url(&self) -> String {
        format!("{}/index.json", self.base)
    }

    fn artifact_url(&self, artifact: &str) -> String {
        if artifact.contains("://") {
            artifact.to_string()
        } else {
            format!("{}/{}", self.base, artifact.trim_start_matches('/'))
        }
    }
}

#[async_trait]
impl RepositoryBackend for HttpBackend {
    async fn query(&self, patterns: &[NamePattern]) -> Result<Vec<RawCandidate>, BackendError> {
        let url = self.index_url();
        tracing::debug!("GET {url}");

        let text = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        let mut candidates =
            decode_documents(&text).map_err(|reason| BackendError::Decode { origin: url, reason })?;
        retain_matching(&mut candidates, patterns);
        Ok(candidates)
    }

    async fn fetch_artifact(
        &self,
        record: &PackageRecord,
        dest: &Path,
    ) -> Result<u64, BackendError> {
        let artifact = record
            .artifact()
            .ok_or_else(|| BackendError::NoArtifact(record.name().to_string()))?;
        let url = self.artifact_url(artifact);
        tracing::debug!("Downloading {url}");

        let response = self.client.get(&url).send().await?.error_for_status()?;

        let mut writer = VerifiedWriter::create(dest).await?;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    drop(writer);
                    tokio::fs::remove_file(dest).await.ok();
                    return Err(e.into());
                }
            };
            writer.write(&chunk).await?;
        }
        writer.finish(dest, record.checksum()).await
    }
}
