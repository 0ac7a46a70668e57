use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Weak};

use crate::hash::Sha256Digest;
use crate::version::{Version, Versioned};

/// Lowest (most preferred) repository priority.
pub const MIN_PRIORITY: i32 = 0;
/// Highest (least preferred) repository priority.
pub const MAX_PRIORITY: i32 = 50;
/// Priority assigned when a registration does not specify one.
pub const DEFAULT_PRIORITY: i32 = 50;

/// Characters that make a name a pattern rather than a concrete name.
pub const WILDCARD_CHARS: [char; 4] = ['*', '?', '[', ']'];

/// A resource name.
///
/// The original spelling is kept for display and placement, while equality
/// and hashing ignore ASCII case, matching how repositories treat names.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PackageName(String);

impl PackageName {
    /// Create a new package name, keeping its spelling.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Return the name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` if the name contains any wildcard character.
    pub fn has_wildcard(&self) -> bool {
        self.0.contains(WILDCARD_CHARS)
    }
}

impl PartialEq for PackageName {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}

impl Eq for PackageName {}

impl Hash for PackageName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.to_ascii_lowercase().hash(state);
    }
}

impl PartialEq<str> for PackageName {
    fn eq(&self, other: &str) -> bool {
        self.0.eq_ignore_ascii_case(other)
    }
}

impl PartialEq<&str> for PackageName {
    fn eq(&self, other: &&str) -> bool {
        self.0.eq_ignore_ascii_case(other)
    }
}

impl std::fmt::Display for PackageName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::ops::Deref for PackageName {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<str> for PackageName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PackageName {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for PackageName {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// Transport scheme of a repository location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RepositoryScheme {
    /// `http://`
    Http,
    /// `https://`
    Https,
    /// `ftp://`
    Ftp,
    /// `file://`
    File,
}

impl RepositoryScheme {
    /// Extract the scheme of `location`, if it is one of the supported ones.
    pub fn of(location: &str) -> Option<Self> {
        let (scheme, rest) = location.split_once("://")?;
        if rest.is_empty() {
            return None;
        }
        match scheme.to_ascii_lowercase().as_str() {
            "http" => Some(Self::Http),
            "https" => Some(Self::Https),
            "ftp" => Some(Self::Ftp),
            "file" => Some(Self::File),
            _ => None,
        }
    }
}

/// A registered repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryRecord {
    /// Unique name (case-insensitive).
    pub name: String,
    /// Location URI (`http`, `https`, `ftp` or `file`).
    pub location: String,
    /// Search priority in `[0, 50]`; lower values are searched first.
    pub priority: i32,
    /// Whether packages from this repository may be acquired without confirmation.
    #[serde(default)]
    pub trusted: bool,
}

impl RepositoryRecord {
    /// The scheme of this repository's location.
    pub fn scheme(&self) -> Option<RepositoryScheme> {
        RepositoryScheme::of(&self.location)
    }
}

/// Metadata document format of a raw candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FormatKind {
    /// A module manifest (`name` + `moduleVersion`, optional `prerelease`).
    ModuleManifest,
    /// A standalone script (`name` + `version`).
    Script,
    /// A package archive manifest (`id` + `version`).
    PackageArchive,
}

impl FormatKind {
    /// Field holding the discriminator in a raw candidate.
    pub const FIELD: &'static str = "format";

    /// All known formats.
    pub const ALL: [Self; 3] = [Self::ModuleManifest, Self::Script, Self::PackageArchive];

    /// The discriminator value for this format.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ModuleManifest => "module-manifest",
            Self::Script => "script",
            Self::PackageArchive => "package-archive",
        }
    }

    /// Parse a discriminator value.
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.as_str() == s)
    }
}

impl std::fmt::Display for FormatKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An unconverted metadata document returned by a repository backend.
///
/// The field mapping is opaque to everything except the converter; the
/// `format` field tags which mapping applies.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawCandidate {
    fields: Map<String, Value>,
}

impl RawCandidate {
    /// An empty candidate with no discriminator.
    pub fn new() -> Self {
        Self::default()
    }

    /// A candidate tagged with `format`.
    pub fn tagged(format: FormatKind) -> Self {
        Self::new().with(FormatKind::FIELD, format.as_str())
    }

    /// Wrap an existing field mapping.
    pub fn from_fields(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    /// Builder-style field setter.
    #[must_use]
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }

    /// Raw field access.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// String field access. Non-string values are treated as absent.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    /// The discriminator text, if present.
    pub fn discriminator(&self) -> Option<&str> {
        self.get_str(FormatKind::FIELD)
    }

    /// All fields.
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }
}

/// The canonical package record every metadata format converts into.
///
/// Records are immutable once built. The source repository is held as a weak
/// reference: it can be looked up while the repository snapshot is alive but
/// the record never keeps it alive.
#[derive(Debug, Clone)]
pub struct PackageRecord {
    name: PackageName,
    version: Version,
    format: FormatKind,
    artifact: Option<String>,
    checksum: Option<Sha256Digest>,
    description: Option<String>,
    author: Option<String>,
    tags: Vec<String>,
    source: Weak<RepositoryRecord>,
}

impl PackageRecord {
    /// Start building a record.
    pub fn builder(
        name: PackageName,
        version: Version,
        format: FormatKind,
    ) -> PackageRecordBuilder {
        PackageRecordBuilder {
            name,
            version,
            format,
            artifact: None,
            checksum: None,
            description: None,
            author: None,
            tags: Vec::new(),
        }
    }

    /// Resource name.
    pub fn name(&self) -> &PackageName {
        &self.name
    }

    /// Concrete version.
    pub fn version(&self) -> &Version {
        &self.version
    }

    /// Whether the version is a prerelease.
    pub fn is_prerelease(&self) -> bool {
        self.version.is_prerelease()
    }

    /// Metadata format the record was converted from.
    pub fn format(&self) -> FormatKind {
        self.format
    }

    /// Location of the downloadable artifact.
    pub fn artifact(&self) -> Option<&str> {
        self.artifact.as_deref()
    }

    /// Published checksum of the artifact.
    pub fn checksum(&self) -> Option<&Sha256Digest> {
        self.checksum.as_ref()
    }

    /// Free-text description.
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Author.
    pub fn author(&self) -> Option<&str> {
        self.author.as_deref()
    }

    /// Tags.
    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    /// Look up the source repository, if the snapshot it came from is alive.
    pub fn repository(&self) -> Option<Arc<RepositoryRecord>> {
        self.source.upgrade()
    }
}

impl Versioned for PackageRecord {
    fn version(&self) -> &Version {
        &self.version
    }
}

/// Builder for [`PackageRecord`].
#[derive(Debug)]
pub struct PackageRecordBuilder {
    name: PackageName,
    version: Version,
    format: FormatKind,
    artifact: Option<String>,
    checksum: Option<Sha256Digest>,
    description: Option<String>,
    author: Option<String>,
    tags: Vec<String>,
}

impl PackageRecordBuilder {
    /// Set the artifact location.
    #[must_use]
    pub fn artifact(mut self, location: Option<String>) -> Self {
        self.artifact = location;
        self
    }

    /// Set the artifact checksum.
    #[must_use]
    pub fn checksum(mut self, checksum: Option<Sha256Digest>) -> Self {
        self.checksum = checksum;
        self
    }

    /// Set the description.
    #[must_use]
    pub fn description(mut self, description: Option<String>) -> Self {
        self.description = description;
        self
    }

    /// Set the author.
    #[must_use]
    pub fn author(mut self, author: Option<String>) -> Self {
        self.author = author;
        self
    }

    /// Set the tags.
    #[must_use]
    pub fn tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    /// Finish the record, linking it weakly to `source`.
    pub fn build(self, source: &Arc<RepositoryRecord>) -> PackageRecord {
        PackageRecord {
            name: self.name,
            version: self.version,
            format: self.format,
            artifact: self.artifact,
            checksum: self.checksum,
            description: self.description,
            author: self.author,
            tags: self.tags,
            source: Arc::downgrade(source),
        }
    }
}
