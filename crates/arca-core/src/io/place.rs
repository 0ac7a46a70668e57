//! Staging and atomic placement of acquired artifacts.
//!
//! All writes for one acquisition go into a hidden staging directory created
//! next to the final destination, so the closing `rename` stays on one
//! filesystem. If the acquisition is abandoned the staging directory is
//! removed on drop and the destination is never touched.

use std::io;
use std::path::{Path, PathBuf};

use arca_schema::{PackageRecord, RepositoryRecord};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use tempfile::TempDir;
use thiserror::Error;

/// Name of the side metadata document written in expanded mode.
pub const METADATA_FILE: &str = "arca-metadata.json";

/// Errors raised while staging or placing content.
#[derive(Error, Debug)]
pub enum PlaceError {
    /// Filesystem failure in the staging area or at the destination.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// The destination is occupied and replacement was not requested.
    #[error("{} already exists", .0.display())]
    Exists(PathBuf),

    /// The side metadata document could not be encoded.
    #[error("Failed to encode metadata: {0}")]
    Metadata(#[from] serde_json::Error),
}

/// A private scratch directory under the destination root.
#[derive(Debug)]
pub struct Staging {
    dir: TempDir,
}

impl Staging {
    /// Create a staging directory inside `dest_root`, creating the root if
    /// needed.
    pub fn new(dest_root: &Path) -> io::Result<Self> {
        std::fs::create_dir_all(dest_root)?;
        let dir = tempfile::Builder::new()
            .prefix(".arca-")
            .tempdir_in(dest_root)?;
        Ok(Self { dir })
    }

    /// Staging directory path.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Where the fetched artifact is written.
    pub fn download_path(&self) -> PathBuf {
        self.dir.path().join("download")
    }

    /// Where expanded content is assembled.
    pub fn content_path(&self) -> PathBuf {
        self.dir.path().join("content")
    }

    /// Move `staged` to `final_path`.
    ///
    /// With `replace`, an existing destination is first moved aside into
    /// the staging directory and restored if the final rename fails.
    /// Returns `true` when something was replaced.
    ///
    /// # Errors
    ///
    /// [`PlaceError::Exists`] if the destination exists and `replace` is
    /// false.
    pub fn commit(
        &self,
        staged: &Path,
        final_path: &Path,
        replace: bool,
    ) -> Result<bool, PlaceError> {
        if let Some(parent) = final_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let exists = final_path.symlink_metadata().is_ok();
        if exists && !replace {
            return Err(PlaceError::Exists(final_path.to_path_buf()));
        }

        if !exists {
            std::fs::rename(staged, final_path)?;
            return Ok(false);
        }

        let previous = self.dir.path().join("previous");
        std::fs::rename(final_path, &previous)?;
        if let Err(e) = std::fs::rename(staged, final_path) {
            std::fs::rename(&previous, final_path).ok();
            return Err(e.into());
        }
        Ok(true)
    }
}

/// Side metadata describing where an expanded package came from.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SideMetadata<'a> {
    /// Package name.
    pub name: &'a str,
    /// Version as published.
    pub version: &'a str,
    /// Whether the version carries a prerelease label.
    pub prerelease: bool,
    /// Format discriminator.
    pub format: &'a str,
    /// Source repository name.
    pub repository: &'a str,
    /// Source repository location.
    pub repository_location: &'a str,
    /// Artifact location as published.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<&'a str>,
    /// Package description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<&'a str>,
    /// Package author.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<&'a str>,
    /// Package tags; omitted when empty.
    #[serde(skip_serializing_if = "no_tags")]
    pub tags: &'a [String],
    /// RFC 3339 UTC time of the save.
    pub saved_at: String,
}

fn no_tags(tags: &&[String]) -> bool {
    tags.is_empty()
}

impl<'a> SideMetadata<'a> {
    /// Describe `record` from `repository`, saved at `saved_at`.
    pub fn new(
        record: &'a PackageRecord,
        repository: &'a RepositoryRecord,
        saved_at: DateTime<Utc>,
    ) -> Self {
        Self {
            name: record.name().as_str(),
            version: record.version().as_str(),
            prerelease: record.is_prerelease(),
            format: record.format().as_str(),
            repository: &repository.name,
            repository_location: &repository.location,
            artifact: record.artifact(),
            description: record.description(),
            author: record.author(),
            tags: record.tags(),
            saved_at: saved_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }

    /// Write the document into `dir`.
    pub fn write_to(&self, dir: &Path) -> Result<(), PlaceError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(dir.join(METADATA_FILE), json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arca_schema::{FormatKind, PackageName, Version};
    use std::sync::Arc;

    #[test]
    fn test_staging_lives_under_root_and_is_removed() {
        let root = tempfile::tempdir().unwrap();
        let dest = root.path().join("out");
        let path = {
            let staging = Staging::new(&dest).unwrap();
            assert!(staging.path().starts_with(&dest));
            std::fs::write(staging.download_path(), "x").unwrap();
            staging.path().to_path_buf()
        };
        assert!(!path.exists());
        assert_eq!(std::fs::read_dir(&dest).unwrap().count(), 0);
    }

    #[test]
    fn test_commit_new_and_conflicting() {
        let root = tempfile::tempdir().unwrap();
        let final_path = root.path().join("Tool").join("1.0");

        let staging = Staging::new(root.path()).unwrap();
        let content = staging.content_path();
        std::fs::create_dir_all(&content).unwrap();
        std::fs::write(content.join("a.txt"), "first").unwrap();
        assert!(!staging.commit(&content, &final_path, false).unwrap());
        assert_eq!(std::fs::read_to_string(final_path.join("a.txt")).unwrap(), "first");

        let staging = Staging::new(root.path()).unwrap();
        let content = staging.content_path();
        std::fs::create_dir_all(&content).unwrap();
        std::fs::write(content.join("b.txt"), "second").unwrap();
        assert!(matches!(
            staging.commit(&content, &final_path, false),
            Err(PlaceError::Exists(_))
        ));
        assert!(final_path.join("a.txt").exists());

        assert!(staging.commit(&content, &final_path, true).unwrap());
        assert!(!final_path.join("a.txt").exists());
        assert_eq!(std::fs::read_to_string(final_path.join("b.txt")).unwrap(), "second");
    }

    #[test]
    fn test_side_metadata_document() {
        let repo = Arc::new(RepositoryRecord {
            name: "local".into(),
            location: "file:///srv/r".into(),
            priority: 1,
            trusted: true,
        });
        let record = PackageRecord::builder(
            PackageName::new("Tool"),
            Version::parse("1.0-rc1").unwrap(),
            FormatKind::Script,
        )
        .tags(vec!["x".into()])
        .build(&repo);

        let dir = tempfile::tempdir().unwrap();
        let saved_at = DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        SideMetadata::new(&record, &repo, saved_at)
            .write_to(dir.path())
            .unwrap();

        let text = std::fs::read_to_string(dir.path().join(METADATA_FILE)).unwrap();
        let doc: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(doc["name"], "Tool");
        assert_eq!(doc["version"], "1.0-rc1");
        assert_eq!(doc["prerelease"], true);
        assert_eq!(doc["repository"], "local");
        assert_eq!(doc["savedAt"], "2024-05-01T12:00:00Z");
        assert!(doc.get("author").is_none());
    }
}
