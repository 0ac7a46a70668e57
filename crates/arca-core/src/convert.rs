//! Canonicalization of raw candidate documents.
//!
//! Each metadata format has one mapping routine. Dispatch happens on the
//! candidate's `format` discriminator, so adding a format means adding a
//! [`FormatKind`] variant and a mapping arm here.

use std::sync::Arc;

use arca_schema::{
    FormatKind, PackageName, PackageRecord, PackageRecordBuilder, RawCandidate,
    RepositoryRecord, Sha256Digest, Version, VersionError,
};
use serde_json::Value;
use thiserror::Error;

/// Why a single candidate could not be converted.
///
/// These are never fatal: the query engine reports them as diagnostics and
/// moves on to the next candidate.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConversionError {
    /// The candidate has no `format` field.
    #[error("candidate has no format discriminator")]
    MissingDiscriminator,

    /// The `format` field names an unknown format.
    #[error("unknown format '{0}'")]
    UnknownDiscriminator(String),

    /// A required field is absent or empty.
    #[error("{format} candidate is missing required field '{field}'")]
    MissingField {
        /// Format being converted.
        format: FormatKind,
        /// Missing field.
        field: &'static str,
    },

    /// A field is present but has the wrong shape.
    #[error("{format} candidate has invalid field '{field}': {reason}")]
    InvalidField {
        /// Format being converted.
        format: FormatKind,
        /// Offending field.
        field: &'static str,
        /// What was wrong.
        reason: String,
    },

    /// The version text does not parse.
    #[error(transparent)]
    Version(#[from] VersionError),
}

const NAME: &str = "name";
const ID: &str = "id";
const VERSION: &str = "version";
const MODULE_VERSION: &str = "moduleVersion";
const PRERELEASE: &str = "prerelease";
const ARTIFACT: &str = "artifact";
const SHA256: &str = "sha256";
const DESCRIPTION: &str = "description";
const AUTHOR: &str = "author";
const TAGS: &str = "tags";

/// Converts raw candidates from one repository into [`PackageRecord`]s.
#[derive(Debug, Clone)]
pub struct MetadataConverter {
    source: Arc<RepositoryRecord>,
}

impl MetadataConverter {
    /// A converter whose records point back at `source`.
    pub fn new(source: Arc<RepositoryRecord>) -> Self {
        Self { source }
    }

    /// Convert one candidate.
    ///
    /// # Errors
    ///
    /// Returns a [`ConversionError`] describing why the candidate was skipped.
    pub fn convert(&self, raw: &RawCandidate) -> Result<PackageRecord, ConversionError> {
        let discriminator = raw
            .discriminator()
            .ok_or(ConversionError::MissingDiscriminator)?;
        let format = FormatKind::parse(discriminator)
            .ok_or_else(|| ConversionError::UnknownDiscriminator(discriminator.to_string()))?;

        let builder = match format {
            FormatKind::ModuleManifest => map_module_manifest(raw)?,
            FormatKind::Script => map_script(raw)?,
            FormatKind::PackageArchive => map_package_archive(raw)?,
        };
        let builder = map_common(builder, raw, format)?;
        Ok(builder.build(&self.source))
    }

    /// Convert a whole batch lazily. The returned iterator consumes the batch
    /// and cannot be restarted.
    pub fn convert_all(&self, batch: Vec<RawCandidate>) -> Conversions {
        Conversions {
            converter: self.clone(),
            batch: batch.into_iter(),
        }
    }
}

/// One-pass sequence of per-candidate conversion outcomes.
#[derive(Debug)]
pub struct Conversions {
    converter: MetadataConverter,
    batch: std::vec::IntoIter<RawCandidate>,
}

impl Iterator for Conversions {
    type Item = Result<PackageRecord, ConversionError>;

    fn next(&mut self) -> Option<Self::Item> {
        let raw = self.batch.next()?;
        Some(self.converter.convert(&raw))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.batch.size_hint()
    }
}

impl ExactSizeIterator for Conversions {}

/// The name a candidate declares, read without converting it.
///
/// Used to filter candidates by pattern before paying for conversion. A
/// candidate without a usable discriminator falls back to whichever of the
/// name fields it carries.
pub fn declared_name(raw: &RawCandidate) -> Option<&str> {
    match raw.discriminator().and_then(FormatKind::parse) {
        Some(FormatKind::PackageArchive) => raw.get_str(ID),
        Some(_) => raw.get_str(NAME),
        None => raw.get_str(NAME).or_else(|| raw.get_str(ID)),
    }
}

/// Re-derive the raw document of a record in its original format.
///
/// Converting the result yields a record with the same name, version, and
/// optional fields.
pub fn to_raw(record: &PackageRecord) -> RawCandidate {
    let format = record.format();
    let mut raw = RawCandidate::tagged(format);

    raw = match format {
        FormatKind::ModuleManifest => {
            let (release, label) = record.version().split_prerelease();
            let raw = raw
                .with(NAME, record.name().as_str())
                .with(MODULE_VERSION, release);
            match label {
                Some(label) => raw.with(PRERELEASE, label),
                None => raw,
            }
        }
        FormatKind::Script => raw
            .with(NAME, record.name().as_str())
            .with(VERSION, record.version().as_str()),
        FormatKind::PackageArchive => raw
            .with(ID, record.name().as_str())
            .with(VERSION, record.version().as_str()),
    };

    if let Some(artifact) = record.artifact() {
        raw = raw.with(ARTIFACT, artifact);
    }
    if let Some(sum) = record.checksum() {
        raw = raw.with(SHA256, sum.as_str());
    }
    if let Some(description) = record.description() {
        raw = raw.with(DESCRIPTION, description);
    }
    if let Some(author) = record.author() {
        raw = raw.with(AUTHOR, author);
    }
    if !record.tags().is_empty() {
        raw = raw.with(TAGS, record.tags().to_vec());
    }
    raw
}

fn map_module_manifest(raw: &RawCandidate) -> Result<PackageRecordBuilder, ConversionError> {
    let format = FormatKind::ModuleManifest;
    let name = required(raw, format, NAME)?;
    let release = required(raw, format, MODULE_VERSION)?;
    let label = optional_str(raw, format, PRERELEASE)?.filter(|l| !l.is_empty());

    let version = match label {
        Some(label) => Version::parse(&format!("{release}-{label}"))?,
        None => Version::parse(release)?,
    };
    Ok(PackageRecord::builder(PackageName::new(name), version, format))
}

fn map_script(raw: &RawCandidate) -> Result<PackageRecordBuilder, ConversionError> {
    let format = FormatKind::Script;
    let name = required(raw, format, NAME)?;
    let version = Version::parse(required(raw, format, VERSION)?)?;
    Ok(PackageRecord::builder(PackageName::new(name), version, format))
}

fn map_package_archive(raw: &RawCandidate) -> Result<PackageRecordBuilder, ConversionError> {
    let format = FormatKind::PackageArchive;
    let id = required(raw, format, ID)?;
    let version = Version::parse(required(raw, format, VERSION)?)?;
    Ok(PackageRecord::builder(PackageName::new(id), version, format))
}

/// Fields every format shares.
fn map_common(
    builder: PackageRecordBuilder,
    raw: &RawCandidate,
    format: FormatKind,
) -> Result<PackageRecordBuilder, ConversionError> {
    let checksum = optional_str(raw, format, SHA256)?
        .map(Sha256Digest::new)
        .transpose()
        .map_err(|e| ConversionError::InvalidField {
            format,
            field: SHA256,
            reason: e.to_string(),
        })?;

    Ok(builder
        .artifact(optional_str(raw, format, ARTIFACT)?.map(str::to_string))
        .checksum(checksum)
        .description(optional_str(raw, format, DESCRIPTION)?.map(str::to_string))
        .author(optional_str(raw, format, AUTHOR)?.map(str::to_string))
        .tags(tags(raw, format)?))
}

fn required<'a>(
    raw: &'a RawCandidate,
    format: FormatKind,
    field: &'static str,
) -> Result<&'a str, ConversionError> {
    match optional_str(raw, format, field)? {
        Some(s) if !s.trim().is_empty() => Ok(s.trim()),
        _ => Err(ConversionError::MissingField { format, field }),
    }
}

fn optional_str<'a>(
    raw: &'a RawCandidate,
    format: FormatKind,
    field: &'static str,
) -> Result<Option<&'a str>, ConversionError> {
    match raw.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(other) => Err(ConversionError::InvalidField {
            format,
            field,
            reason: format!("expected a string, got {other}"),
        }),
    }
}

/// Tags are either a JSON array of strings or one comma-separated string.
fn tags(raw: &RawCandidate, format: FormatKind) -> Result<Vec<String>, ConversionError> {
    let invalid = |reason: String| ConversionError::InvalidField {
        format,
        field: TAGS,
        reason,
    };
    match raw.get(TAGS) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::String(s)) => Ok(s
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect()),
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| {
                v.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| invalid(format!("expected string tags, got {v}")))
            })
            .collect(),
        Some(other) => Err(invalid(format!("expected a list, got {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn converter() -> (Arc<RepositoryRecord>, MetadataConverter) {
        let repo = Arc::new(RepositoryRecord {
            name: "local".into(),
            location: "file:///srv/repo".into(),
            priority: 10,
            trusted: true,
        });
        (repo.clone(), MetadataConverter::new(repo))
    }

    #[test]
    fn test_module_manifest_joins_prerelease() {
        let (_repo, converter) = converter();
        let raw = RawCandidate::tagged(FormatKind::ModuleManifest)
            .with("name", "Pester")
            .with("moduleVersion", "5.0.0")
            .with("prerelease", "beta1");
        let record = converter.convert(&raw).unwrap();
        assert_eq!(record.name().as_str(), "Pester");
        assert_eq!(record.version().as_str(), "5.0.0-beta1");
        assert!(record.is_prerelease());
        assert_eq!(record.repository().unwrap().name, "local");
    }

    #[test]
    fn test_script_and_archive_mappings() {
        let (_repo, converter) = converter();
        let script = RawCandidate::tagged(FormatKind::Script)
            .with("name", "Tool")
            .with("version", "1.2")
            .with("artifact", "Tool.ps1")
            .with("tags", "a, b,,c");
        let record = converter.convert(&script).unwrap();
        assert_eq!(record.format(), FormatKind::Script);
        assert_eq!(record.artifact(), Some("Tool.ps1"));
        assert_eq!(record.tags(), ["a", "b", "c"]);

        let archive = RawCandidate::tagged(FormatKind::PackageArchive)
            .with("id", "Newtonsoft")
            .with("version", "13.0.1")
            .with("tags", vec!["json"])
            .with("sha256", "A".repeat(64));
        let record = converter.convert(&archive).unwrap();
        assert_eq!(record.name().as_str(), "Newtonsoft");
        assert_eq!(record.checksum().unwrap().as_str(), "a".repeat(64));
    }

    #[test]
    fn test_discriminator_failures() {
        let (_repo, converter) = converter();
        let missing = RawCandidate::new().with("name", "X").with("version", "1.0");
        assert_eq!(
            converter.convert(&missing).unwrap_err(),
            ConversionError::MissingDiscriminator
        );

        let unknown = missing.clone().with("format", "nuspec");
        assert_eq!(
            converter.convert(&unknown).unwrap_err(),
            ConversionError::UnknownDiscriminator("nuspec".into())
        );
    }

    #[test]
    fn test_required_and_invalid_fields() {
        let (_repo, converter) = converter();
        let no_version = RawCandidate::tagged(FormatKind::Script).with("name", "X");
        assert_eq!(
            converter.convert(&no_version).unwrap_err(),
            ConversionError::MissingField {
                format: FormatKind::Script,
                field: "version"
            }
        );

        let wrong_key = RawCandidate::tagged(FormatKind::PackageArchive)
            .with("name", "X")
            .with("version", "1.0");
        assert!(matches!(
            converter.convert(&wrong_key),
            Err(ConversionError::MissingField { field: "id", .. })
        ));

        let bad_version = RawCandidate::tagged(FormatKind::Script)
            .with("name", "X")
            .with("version", "1.0.0.0.0");
        assert!(matches!(
            converter.convert(&bad_version),
            Err(ConversionError::Version(_))
        ));

        let bad_sum = RawCandidate::tagged(FormatKind::Script)
            .with("name", "X")
            .with("version", "1.0")
            .with("sha256", "abc");
        assert!(matches!(
            converter.convert(&bad_sum),
            Err(ConversionError::InvalidField { field: "sha256", .. })
        ));

        let numeric_name = RawCandidate::tagged(FormatKind::Script)
            .with("name", 42)
            .with("version", "1.0");
        assert!(matches!(
            converter.convert(&numeric_name),
            Err(ConversionError::InvalidField { field: "name", .. })
        ));
    }

    #[test]
    fn test_four_part_module_version() {
        let (_repo, converter) = converter();
        let raw = RawCandidate::tagged(FormatKind::ModuleManifest)
            .with("name", "Pester")
            .with("moduleVersion", "2.12.1.0");
        let record = converter.convert(&raw).unwrap();
        assert_eq!(record.version().as_str(), "2.12.1.0");
        assert_eq!(record.version().revision(), 0);
        assert!(!record.is_prerelease());
    }

    #[test]
    fn test_convert_all_continues_past_failures() {
        let (_repo, converter) = converter();
        let batch = vec![
            RawCandidate::tagged(FormatKind::Script)
                .with("name", "A")
                .with("version", "1.0"),
            RawCandidate::new().with("name", "B"),
            RawCandidate::tagged(FormatKind::Script)
                .with("name", "C")
                .with("version", "2.0"),
        ];
        let outcomes: Vec<_> = converter.convert_all(batch).collect();
        assert_eq!(outcomes.len(), 3);
        assert!(outcomes[0].is_ok());
        assert!(outcomes[1].is_err());
        assert_eq!(outcomes[2].as_ref().unwrap().name().as_str(), "C");
    }

    #[test]
    fn test_declared_name() {
        let archive = RawCandidate::tagged(FormatKind::PackageArchive).with("id", "Pkg");
        assert_eq!(declared_name(&archive), Some("Pkg"));
        let untagged = RawCandidate::new().with("id", "Other");
        assert_eq!(declared_name(&untagged), Some("Other"));
        assert_eq!(declared_name(&RawCandidate::new()), None);
    }

    #[test]
    fn test_round_trip_every_format() {
        let (_repo, converter) = converter();
        let originals = vec![
            RawCandidate::tagged(FormatKind::ModuleManifest)
                .with("name", "Mod")
                .with("moduleVersion", "2.1")
                .with("prerelease", "rc1")
                .with("author", "someone"),
            RawCandidate::tagged(FormatKind::ModuleManifest)
                .with("name", "Stable")
                .with("moduleVersion", "3.0.0"),
            RawCandidate::tagged(FormatKind::ModuleManifest)
                .with("name", "Four")
                .with("moduleVersion", "2.12.1.0"),
            RawCandidate::tagged(FormatKind::PackageArchive)
                .with("id", "Revised")
                .with("version", "1.0.0.7"),
            RawCandidate::tagged(FormatKind::Script)
                .with("name", "Script")
                .with("version", "0.9")
                .with("description", "does things"),
            RawCandidate::tagged(FormatKind::PackageArchive)
                .with("id", "Archive")
                .with("version", "4.5.6")
                .with("artifact", "pkgs/Archive.4.5.6.nupkg"),
        ];

        for original in originals {
            let record = converter.convert(&original).unwrap();
            let again = converter.convert(&to_raw(&record)).unwrap();
            assert_eq!(again.name().as_str(), record.name().as_str());
            assert_eq!(again.version().as_str(), record.version().as_str());
            assert_eq!(again.format(), record.format());
            assert_eq!(again.artifact(), record.artifact());
            assert_eq!(again.author(), record.author());
            assert_eq!(again.description(), record.description());
        }
    }
}
