//! Backend for `file://` repositories.
//!
//! Every `*.json` file at the repository root is a candidate document,
//! holding either one object or an array of objects. Relative artifact
//! locations resolve against the repository root.

use std::path::{Path, PathBuf};

use arca_schema::{PackageRecord, RawCandidate};
use async_trait::async_trait;
use serde_json::Value;
use tokio::io::AsyncReadExt;

use super::{BackendError, RepositoryBackend, VerifiedWriter, retain_matching};
use crate::pattern::NamePattern;

const CHUNK: usize = 64 * 1024;

/// A repository stored in a local directory.
#[derive(Debug, Clone)]
pub struct LocalBackend {
    root: PathBuf,
}

impl LocalBackend {
    /// A backend reading from `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// A backend for a `file://` URI.
    ///
    /// # Errors
    ///
    /// [`BackendError::Unsupported`] if `uri` is not a local file URI.
    pub fn from_uri(uri: &str) -> Result<Self, BackendError> {
        file_uri_path(uri)
            .map(Self::new)
            .ok_or_else(|| BackendError::Unsupported(uri.to_string()))
    }

    /// Repository root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn artifact_path(&self, artifact: &str) -> Result<PathBuf, BackendError> {
        if artifact.contains("://") {
            return file_uri_path(artifact)
                .ok_or_else(|| BackendError::Unsupported(artifact.to_string()));
        }
        let path = Path::new(artifact);
        if path.is_absolute() {
            Ok(path.to_path_buf())
        } else {
            Ok(self.root.join(path))
        }
    }
}

#[async_trait]
impl RepositoryBackend for LocalBackend {
    async fn query(&self, patterns: &[NamePattern]) -> Result<Vec<RawCandidate>, BackendError> {
        let mut paths = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_json = path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
            if is_json && entry.file_type().await?.is_file() {
                paths.push(path);
            }
        }
        paths.sort();

        let mut candidates = Vec::new();
        for path in paths {
            let text = match tokio::fs::read_to_string(&path).await {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!("Skipping {}: {e}", path.display());
                    continue;
                }
            };
            match decode_documents(&text) {
                Ok(docs) => candidates.extend(docs),
                Err(reason) => {
                    tracing::warn!("Skipping {}: {reason}", path.display());
                }
            }
        }

        tracing::debug!(
            "Read {} candidate documents from {}",
            candidates.len(),
            self.root.display()
        );
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
        let source = self.artifact_path(artifact)?;

        let mut input = tokio::fs::File::open(&source).await?;
        let mut writer = VerifiedWriter::create(dest).await?;
        let mut buf = vec![0u8; CHUNK];
        loop {
            let n = input.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            writer.write(&buf[..n]).await?;
        }
        writer.finish(dest, record.checksum()).await
    }
}

/// Decode one repository document into candidates.
pub(crate) fn decode_documents(text: &str) -> Result<Vec<RawCandidate>, String> {
    let value: Value = serde_json::from_str(text).map_err(|e| e.to_string())?;
    match value {
        Value::Object(fields) => Ok(vec![RawCandidate::from_fields(fields)]),
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::Object(fields) => Ok(RawCandidate::from_fields(fields)),
                other => Err(format!("expected an object, got {other}")),
            })
            .collect(),
        other => Err(format!("expected an object or array, got {other}")),
    }
}

/// Path component of a `file://` URI.
fn file_uri_path(uri: &str) -> Option<PathBuf> {
    let (scheme, rest) = uri.split_once("://")?;
    if !scheme.eq_ignore_ascii_case("file") || rest.is_empty() {
        return None;
    }
    let rest = rest.strip_prefix("localhost").unwrap_or(rest);
    Some(PathBuf::from(rest))
}

#[cfg(test)]
mod tests {
    use super::*;
    use arca_schema::{FormatKind, PackageName, RepositoryRecord, Sha256Digest, Version};
    use sha2::{Digest, Sha256};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, body: &str) {
        std::fs::write(dir.join(name), body).unwrap();
    }

    fn record(
        artifact: &str,
        checksum: Option<Sha256Digest>,
    ) -> (Arc<RepositoryRecord>, PackageRecord) {
        let repo = Arc::new(RepositoryRecord {
            name: "local".into(),
            location: "file:///unused".into(),
            priority: 0,
            trusted: true,
        });
        let record = PackageRecord::builder(
            PackageName::new("Tool"),
            Version::parse("1.0").unwrap(),
            FormatKind::Script,
        )
        .artifact(Some(artifact.to_string()))
        .checksum(checksum)
        .build(&repo);
        (repo, record)
    }

    #[test]
    fn test_file_uri_path() {
        assert_eq!(file_uri_path("file:///srv/r"), Some(PathBuf::from("/srv/r")));
        assert_eq!(
            file_uri_path("FILE://localhost/srv/r"),
            Some(PathBuf::from("/srv/r"))
        );
        assert_eq!(file_uri_path("https://x"), None);
    }

    #[tokio::test]
    async fn test_query_reads_root_documents() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "a.json",
            r#"{"format":"script","name":"Alpha","version":"1.0"}"#,
        );
        write(
            dir.path(),
            "many.json",
            r#"[{"format":"package-archive","id":"Beta","version":"2.0"},
                {"format":"script","name":"Alphabet","version":"0.1"}]"#,
        );
        write(dir.path(), "broken.json", "{ nope");
        std::fs::write(dir.path().join("latin1.json"), [0x7b, 0xff, 0xfe, 0x7d]).unwrap();
        write(dir.path(), "notes.txt", "ignored");
        std::fs::create_dir(dir.path().join("nested.json")).unwrap();

        let backend = LocalBackend::new(dir.path());
        let all = backend
            .query(&[NamePattern::new("*").unwrap()])
            .await
            .unwrap();
        assert_eq!(all.len(), 3);

        let alpha = backend
            .query(&[NamePattern::new("alpha").unwrap()])
            .await
            .unwrap();
        assert_eq!(alpha.len(), 2);
    }

    #[tokio::test]
    async fn test_missing_root_is_an_error() {
        let backend = LocalBackend::new("/definitely/not/here");
        let err = backend.query(&[]).await.unwrap_err();
        assert!(matches!(err, BackendError::Io(_)));
    }

    #[tokio::test]
    async fn test_fetch_relative_artifact_with_checksum() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("pkgs")).unwrap();
        write(dir.path(), "pkgs/Tool.ps1", "Write-Output 'hi'");
        let sum = Sha256Digest::new(hex::encode(Sha256::digest(b"Write-Output 'hi'"))).unwrap();

        let backend = LocalBackend::new(dir.path());
        let out = TempDir::new().unwrap();
        let dest = out.path().join("Tool.ps1");

        let (_repo, good) = record("pkgs/Tool.ps1", Some(sum));
        assert_eq!(backend.fetch_artifact(&good, &dest).await.unwrap(), 17);
        assert_eq!(std::fs::read_to_string(&dest).unwrap(), "Write-Output 'hi'");

        let wrong = Sha256Digest::new("f".repeat(64)).unwrap();
        let (_repo, bad) = record("pkgs/Tool.ps1", Some(wrong));
        let err = backend.fetch_artifact(&bad, &dest).await.unwrap_err();
        assert!(matches!(err, BackendError::HashMismatch { .. }));
        assert!(!dest.exists());
    }
}
