//! Ordered store of repository records.
//!
//! The registry is purely in-memory. Callers load it from their persistence
//! layer with [`RepositoryRegistry::from_records`], mutate it, and write
//! [`RepositoryRegistry::list`] back. Resolution batches work on a
//! [`snapshot`](RepositoryRegistry::snapshot), so later mutations are never
//! observed mid-batch.

use std::sync::Arc;

use arca_schema::{
    DEFAULT_PRIORITY, MAX_PRIORITY, MIN_PRIORITY, RepositoryRecord, RepositoryScheme,
    WELL_KNOWN_GALLERY_NAME, WELL_KNOWN_GALLERY_URL,
};
use thiserror::Error;

/// Errors returned by registry mutations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// Bad name, location, or priority.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A repository with this name already exists.
    #[error("Repository '{0}' is already registered")]
    DuplicateName(String),

    /// The name is reserved for the well-known gallery.
    #[error("'{0}' is reserved; use the well-known gallery registration to add it")]
    ReservedName(String),

    /// No repository with this name exists.
    #[error("Repository '{0}' is not registered")]
    NotFound(String),
}

/// One item of a batch registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationSpec {
    /// An ordinary repository.
    Named {
        /// Repository name.
        name: String,
        /// Location URI or absolute path.
        url: String,
        /// Priority, defaulting to 50.
        priority: Option<i32>,
        /// Trust flag, defaulting to `false`.
        trusted: Option<bool>,
    },
    /// The well-known gallery at its fixed location.
    WellKnownGallery {
        /// Priority, defaulting to 50.
        priority: Option<i32>,
        /// Trust flag, defaulting to `false`.
        trusted: Option<bool>,
    },
}

#[derive(Debug, Clone)]
struct Entry {
    seq: u64,
    record: RepositoryRecord,
}

/// Ordered collection of registered repositories.
#[derive(Debug, Clone, Default)]
pub struct RepositoryRegistry {
    entries: Vec<Entry>,
    next_seq: u64,
}

impl RepositoryRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a registry from persisted records, keeping their order as
    /// insertion order.
    ///
    /// Persisted records may use the reserved gallery name.
    ///
    /// # Errors
    ///
    /// Fails on the first record that is invalid or duplicated.
    pub fn from_records(
        records: impl IntoIterator<Item = RepositoryRecord>,
    ) -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        for record in records {
            registry.insert(&record.name, &record.location, record.priority, record.trusted)?;
        }
        Ok(registry)
    }

    /// All records, ascending by priority. Equal priorities keep insertion
    /// order, then compare by name.
    pub fn list(&self) -> Vec<RepositoryRecord> {
        let mut entries: Vec<&Entry> = self.entries.iter().collect();
        entries.sort_by(|a, b| {
            a.record
                .priority
                .cmp(&b.record.priority)
                .then(a.seq.cmp(&b.seq))
                .then_with(|| a.record.name.cmp(&b.record.name))
        });
        entries.into_iter().map(|e| e.record.clone()).collect()
    }

    /// A frozen, priority-ordered copy for one resolution batch.
    pub fn snapshot(&self) -> Vec<Arc<RepositoryRecord>> {
        self.list().into_iter().map(Arc::new).collect()
    }

    /// Look up a repository by name (case-insensitive).
    pub fn get(&self, name: &str) -> Option<&RepositoryRecord> {
        self.position(name).map(|i| &self.entries[i].record)
    }

    /// Number of registered repositories.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Register a repository.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::ReservedName`] for the well-known gallery name.
    /// - [`RegistryError::InvalidArgument`] for an empty name, a location
    ///   outside `http`/`https`/`ftp`/`file`, or a priority outside `[0, 50]`.
    /// - [`RegistryError::DuplicateName`] if the name is taken.
    pub fn add(
        &mut self,
        name: &str,
        url: &str,
        priority: i32,
        trusted: bool,
    ) -> Result<RepositoryRecord, RegistryError> {
        if name.trim().eq_ignore_ascii_case(WELL_KNOWN_GALLERY_NAME) {
            return Err(RegistryError::ReservedName(name.trim().to_string()));
        }
        self.insert(name, url, priority, trusted)
    }

    /// Register the well-known gallery at its fixed location.
    ///
    /// # Errors
    ///
    /// [`RegistryError::InvalidArgument`] for a bad priority, or
    /// [`RegistryError::DuplicateName`] if the gallery is already registered.
    pub fn add_well_known_gallery(
        &mut self,
        priority: Option<i32>,
        trusted: Option<bool>,
    ) -> Result<RepositoryRecord, RegistryError> {
        self.insert(
            WELL_KNOWN_GALLERY_NAME,
            WELL_KNOWN_GALLERY_URL,
            priority.unwrap_or(DEFAULT_PRIORITY),
            trusted.unwrap_or(false),
        )
    }

    /// Register several repositories. Each spec succeeds or fails on its own.
    pub fn add_batch(
        &mut self,
        specs: impl IntoIterator<Item = RegistrationSpec>,
    ) -> Vec<Result<RepositoryRecord, RegistryError>> {
        specs
            .into_iter()
            .map(|spec| match spec {
                RegistrationSpec::WellKnownGallery { priority, trusted } => {
                    self.add_well_known_gallery(priority, trusted)
                }
                RegistrationSpec::Named {
                    name,
                    url,
                    priority,
                    trusted,
                } => {
                    let result = self.add(
                        &name,
                        &url,
                        priority.unwrap_or(DEFAULT_PRIORITY),
                        trusted.unwrap_or(false),
                    );
                    if let Err(e) = &result {
                        tracing::warn!("Skipping repository '{name}': {e}");
                    }
                    result
                }
            })
            .collect()
    }

    /// Unregister a repository.
    ///
    /// # Errors
    ///
    /// [`RegistryError::NotFound`] if no repository has this name.
    pub fn remove(&mut self, name: &str) -> Result<RepositoryRecord, RegistryError> {
        let idx = self
            .position(name)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))?;
        Ok(self.entries.remove(idx).record)
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.record.name.eq_ignore_ascii_case(name.trim()))
    }

    fn insert(
        &mut self,
        name: &str,
        url: &str,
        priority: i32,
        trusted: bool,
    ) -> Result<RepositoryRecord, RegistryError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(RegistryError::InvalidArgument(
                "Repository name cannot be empty".to_string(),
            ));
        }

        let location = normalize_location(url)?;

        if !(MIN_PRIORITY..=MAX_PRIORITY).contains(&priority) {
            return Err(RegistryError::InvalidArgument(format!(
                "Priority must be between {MIN_PRIORITY} and {MAX_PRIORITY}, got {priority}"
            )));
        }

        if self.position(name).is_some() {
            return Err(RegistryError::DuplicateName(name.to_string()));
        }

        let record = RepositoryRecord {
            name: name.to_string(),
            location,
            priority,
            trusted,
        };
        tracing::debug!(
            "Registered repository {} ({}, priority {})",
            record.name,
            record.location,
            record.priority
        );
        self.entries.push(Entry {
            seq: self.next_seq,
            record: record.clone(),
        });
        self.next_seq += 1;
        Ok(record)
    }
}

/// Validate a repository location, turning absolute paths into `file://` URIs.
fn normalize_location(url: &str) -> Result<String, RegistryError> {
    let url = url.trim();
    if url.is_empty() {
        return Err(RegistryError::InvalidArgument(
            "Repository url cannot be empty".to_string(),
        ));
    }

    let location = if url.starts_with('/') {
        format!("file://{url}")
    } else {
        url.to_string()
    };

    if RepositoryScheme::of(&location).is_none() {
        return Err(RegistryError::InvalidArgument(format!(
            "Invalid url '{url}': scheme must be http, https, ftp or file"
        )));
    }
    Ok(location)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(registry: &RepositoryRegistry) -> Vec<String> {
        registry.list().into_iter().map(|r| r.name).collect()
    }

    #[test]
    fn test_every_priority_in_range_is_accepted() {
        let mut registry = RepositoryRegistry::new();
        for p in MIN_PRIORITY..=MAX_PRIORITY {
            let name = format!("repo{p}");
            assert!(registry.add(&name, "https://example.com", p, false).is_ok());
        }
        assert_eq!(registry.len(), 51);
    }

    #[test]
    fn test_priority_out_of_range_is_rejected() {
        let mut registry = RepositoryRegistry::new();
        for p in [-1, 51] {
            assert!(matches!(
                registry.add("r", "https://example.com", p, false),
                Err(RegistryError::InvalidArgument(_))
            ));
        }
        assert!(registry.is_empty());
    }

    #[test]
    fn test_reserved_name_requires_gallery_path() {
        let mut registry = RepositoryRegistry::new();
        for name in [WELL_KNOWN_GALLERY_NAME, "Well-Known-Gallery"] {
            assert!(matches!(
                registry.add(name, "https://example.com", 10, true),
                Err(RegistryError::ReservedName(_))
            ));
        }

        let gallery = registry.add_well_known_gallery(None, None).unwrap();
        assert_eq!(gallery.location, WELL_KNOWN_GALLERY_URL);
        assert_eq!(gallery.priority, DEFAULT_PRIORITY);
        assert!(!gallery.trusted);
        assert!(matches!(
            registry.add_well_known_gallery(Some(1), None),
            Err(RegistryError::DuplicateName(_))
        ));
    }

    #[test]
    fn test_duplicate_names_ignore_case() {
        let mut registry = RepositoryRegistry::new();
        registry.add("Internal", "https://a.example", 10, false).unwrap();
        assert_eq!(
            registry.add("internal", "https://b.example", 20, false),
            Err(RegistryError::DuplicateName("internal".into()))
        );
    }

    #[test]
    fn test_scheme_validation() {
        let mut registry = RepositoryRegistry::new();
        for ok in [
            "http://a.example",
            "https://a.example",
            "ftp://a.example",
            "file:///srv/r",
        ] {
            let name = format!("r{}", registry.len());
            assert!(registry.add(&name, ok, 10, false).is_ok(), "{ok}");
        }
        for bad in ["ssh://a.example", "a.example", "", "https://"] {
            assert!(
                matches!(
                    registry.add("bad", bad, 10, false),
                    Err(RegistryError::InvalidArgument(_))
                ),
                "{bad}"
            );
        }
    }

    #[test]
    fn test_absolute_path_becomes_file_uri() {
        let mut registry = RepositoryRegistry::new();
        let record = registry.add("local", "/srv/packages", 5, true).unwrap();
        assert_eq!(record.location, "file:///srv/packages");
    }

    #[test]
    fn test_list_orders_by_priority_then_insertion() {
        let mut registry = RepositoryRegistry::new();
        registry.add("late", "https://a.example", 40, false).unwrap();
        registry.add("zeta", "https://b.example", 10, false).unwrap();
        registry.add("alpha", "https://c.example", 10, false).unwrap();
        assert_eq!(names(&registry), vec!["zeta", "alpha", "late"]);
    }

    #[test]
    fn test_batch_is_best_effort() {
        let mut registry = RepositoryRegistry::new();
        let results = registry.add_batch(vec![
            RegistrationSpec::Named {
                name: "one".into(),
                url: "https://one.example".into(),
                priority: None,
                trusted: None,
            },
            RegistrationSpec::Named {
                name: "broken".into(),
                url: "gopher://nope".into(),
                priority: Some(1),
                trusted: None,
            },
            RegistrationSpec::WellKnownGallery {
                priority: Some(3),
                trusted: Some(true),
            },
            RegistrationSpec::Named {
                name: String::new(),
                url: "https://x.example".into(),
                priority: None,
                trusted: None,
            },
        ]);

        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(RegistryError::InvalidArgument(_))));
        assert!(results[2].is_ok());
        assert!(matches!(results[3], Err(RegistryError::InvalidArgument(_))));
        assert_eq!(names(&registry), vec![WELL_KNOWN_GALLERY_NAME, "one"]);
        assert_eq!(registry.get("one").unwrap().priority, DEFAULT_PRIORITY);
    }

    #[test]
    fn test_remove() {
        let mut registry = RepositoryRegistry::new();
        registry.add("one", "https://one.example", 1, false).unwrap();
        assert_eq!(registry.remove("ONE").unwrap().name, "one");
        assert_eq!(
            registry.remove("one"),
            Err(RegistryError::NotFound("one".into()))
        );
    }

    #[test]
    fn test_from_records_accepts_persisted_gallery() {
        let records = vec![
            RepositoryRecord {
                name: WELL_KNOWN_GALLERY_NAME.into(),
                location: WELL_KNOWN_GALLERY_URL.into(),
                priority: 50,
                trusted: false,
            },
            RepositoryRecord {
                name: "local".into(),
                location: "file:///srv/r".into(),
                priority: 50,
                trusted: true,
            },
        ];
        let registry = RepositoryRegistry::from_records(records).unwrap();
        assert_eq!(names(&registry), vec![WELL_KNOWN_GALLERY_NAME, "local"]);
    }

    #[test]
    fn test_snapshot_is_detached() {
        let mut registry = RepositoryRegistry::new();
        registry.add("one", "https://one.example", 1, false).unwrap();
        let snapshot = registry.snapshot();
        registry.add("two", "https://two.example", 0, false).unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].name, "one");
    }
}
