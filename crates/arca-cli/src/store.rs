//! TOML persistence for the repository list.
//!
//! ```toml
//! [[repository]]
//! name = "internal"
//! location = "https://packages.example.com/api"
//! priority = 10
//! trusted = true
//! ```

use std::path::{Path, PathBuf};

use arca_core::{RegistryError, RepositoryRegistry};
use arca_schema::RepositoryRecord;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Failed to encode repository list: {0}")]
    Encode(#[from] toml::ser::Error),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RepositoryFile {
    #[serde(default, rename = "repository")]
    repositories: Vec<RepositoryRecord>,
}

/// Repository list stored in a TOML file.
#[derive(Debug, Clone)]
pub struct TomlRepositoryStore {
    path: PathBuf,
}

impl TomlRepositoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the registry. A missing file is an empty registry.
    pub fn load(&self) -> Result<RepositoryRegistry, StoreError> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(RepositoryRegistry::new());
            }
            Err(source) => {
                return Err(StoreError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };
        let file: RepositoryFile = toml::from_str(&text).map_err(|source| StoreError::Parse {
            path: self.path.clone(),
            source,
        })?;
        Ok(RepositoryRegistry::from_records(file.repositories)?)
    }

    /// Write the registry, replacing the file atomically.
    pub fn save(&self, registry: &RepositoryRegistry) -> Result<(), StoreError> {
        let file = RepositoryFile {
            repositories: registry.list(),
        };
        let text = toml::to_string_pretty(&file)?;

        let io_err = |source| StoreError::Io {
            path: self.path.clone(),
            source,
        };
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir).map_err(io_err)?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(io_err)?;
        std::io::Write::write_all(&mut tmp, text.as_bytes()).map_err(io_err)?;
        tmp.persist(&self.path).map_err(|e| io_err(e.error))?;
        Ok(())
    }

    /// Registered repositories in search order.
    pub fn list(&self) -> Result<Vec<RepositoryRecord>, StoreError> {
        Ok(self.load()?.list())
    }

    /// Register and persist one repository.
    pub fn add(
        &self,
        name: &str,
        url: &str,
        priority: i32,
        trusted: bool,
    ) -> Result<RepositoryRecord, StoreError> {
        let mut registry = self.load()?;
        let record = registry.add(name, url, priority, trusted)?;
        self.save(&registry)?;
        Ok(record)
    }

    /// Register the well-known gallery and persist.
    pub fn add_gallery(
        &self,
        priority: i32,
        trusted: bool,
    ) -> Result<RepositoryRecord, StoreError> {
        let mut registry = self.load()?;
        let record = registry.add_well_known_gallery(Some(priority), Some(trusted))?;
        self.save(&registry)?;
        Ok(record)
    }

    /// Unregister and persist.
    pub fn remove(&self, name: &str) -> Result<RepositoryRecord, StoreError> {
        let mut registry = self.load()?;
        let record = registry.remove(name)?;
        self.save(&registry)?;
        Ok(record)
    }
}
