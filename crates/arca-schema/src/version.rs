//! Version parsing and range matching.
//!
//! Supports:
//! - Any: `` or `*`
//! - Exact: `1.7.1` or `[1.7.1]`
//! - Range: `[1.0,2.0)`, `(1.0,]`, `[,2.0]` (each bound independently
//!   inclusive `[ ]` or exclusive `( )`, either side may be open)
//!
//! Version text is lenient about missing components (`1` and `1.2` read as
//! `1.0.0` and `1.2.0`) but keeps the original spelling for display. A fourth
//! numeric component (`2.12.1.0`) is kept as a revision that orders after
//! patch; a missing revision reads as `0`.

use std::cmp::Ordering;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Errors produced while parsing versions and version ranges.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VersionError {
    /// The input is not a valid version or range expression.
    #[error("Malformed version '{input}': {reason}")]
    MalformedVersion {
        /// The rejected input.
        input: String,
        /// What was wrong with it.
        reason: String,
    },
}

impl VersionError {
    fn malformed(input: &str, reason: impl Into<String>) -> Self {
        Self::MalformedVersion {
            input: input.to_string(),
            reason: reason.into(),
        }
    }
}

/// A concrete version.
///
/// Ordering and equality use semantic-version precedence with the revision
/// compared after patch, so `1.2` equals `1.2.0.0` and `1.0.0.1` is above
/// `1.0.0`. The text the version was parsed from is preserved verbatim.
#[derive(Debug, Clone)]
pub struct Version {
    raw: String,
    parsed: semver::Version,
    revision: u64,
}

impl Version {
    /// Parse a version string.
    ///
    /// # Errors
    ///
    /// Returns [`VersionError::MalformedVersion`] if the numeric core has
    /// more than four components, contains non-digits, or the remainder is
    /// not a valid semver prerelease/build suffix.
    pub fn parse(text: &str) -> Result<Self, VersionError> {
        let raw = text.trim();
        if raw.is_empty() {
            return Err(VersionError::malformed(text, "empty version"));
        }

        let split = raw.find(['-', '+']).unwrap_or(raw.len());
        let (core, suffix) = raw.split_at(split);

        let parts: Vec<&str> = core.split('.').collect();
        if parts.len() > 4 {
            return Err(VersionError::malformed(
                text,
                "at most four numeric components are supported",
            ));
        }
        if parts
            .iter()
            .any(|p| p.is_empty() || !p.chars().all(|c| c.is_ascii_digit()))
        {
            return Err(VersionError::malformed(text, "non-numeric version component"));
        }

        let revision = match parts.get(3) {
            Some(rev) => rev
                .parse::<u64>()
                .map_err(|e| VersionError::malformed(text, e.to_string()))?,
            None => 0,
        };

        let mut padded = parts[..parts.len().min(3)].join(".");
        for _ in parts.len()..3 {
            padded.push_str(".0");
        }
        padded.push_str(suffix);

        let parsed = semver::Version::parse(&padded)
            .map_err(|e| VersionError::malformed(text, e.to_string()))?;

        Ok(Self {
            raw: raw.to_string(),
            parsed,
            revision,
        })
    }

    /// The version exactly as it was written.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// The normalized semantic version, without the revision.
    pub fn semver(&self) -> &semver::Version {
        &self.parsed
    }

    /// The fourth numeric component, `0` when absent.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Returns `true` if this version carries a prerelease label.
    pub fn is_prerelease(&self) -> bool {
        !self.parsed.pre.is_empty()
    }

    /// Split the original text into its release part and prerelease label.
    ///
    /// `"1.0-beta2"` becomes `("1.0", Some("beta2"))`; a stable version
    /// returns its full text and `None`.
    pub fn split_prerelease(&self) -> (&str, Option<&str>) {
        if !self.is_prerelease() {
            return (&self.raw, None);
        }
        match self.raw.split_once('-') {
            Some((release, label)) => (release, Some(label)),
            None => (&self.raw, None),
        }
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.parsed == other.parsed && self.revision == other.revision
    }
}

impl Eq for Version {}

impl Hash for Version {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.parsed.hash(state);
        self.revision.hash(state);
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let (a, b) = (&self.parsed, &other.parsed);
        (a.major, a.minor, a.patch, self.revision)
            .cmp(&(b.major, b.minor, b.patch, other.revision))
            .then_with(|| a.pre.cmp(&b.pre))
            .then_with(|| a.build.cmp(&b.build))
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl FromStr for Version {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.raw)
    }
}

impl AsRef<str> for Version {
    fn as_ref(&self) -> &str {
        &self.raw
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Anything that carries a version and can take part in best-version selection.
pub trait Versioned {
    /// The version used for matching and ordering.
    fn version(&self) -> &Version;
}

impl Versioned for Version {
    fn version(&self) -> &Version {
        self
    }
}

impl<T: Versioned + ?Sized> Versioned for &T {
    fn version(&self) -> &Version {
        (**self).version()
    }
}

/// One side of a version range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Bound {
    /// No limit on this side.
    Unbounded,
    /// The bound itself is part of the range.
    Inclusive(Version),
    /// The bound itself is excluded.
    Exclusive(Version),
}

impl Bound {
    fn version(&self) -> Option<&Version> {
        match self {
            Self::Unbounded => None,
            Self::Inclusive(v) | Self::Exclusive(v) => Some(v),
        }
    }

    fn is_inclusive(&self) -> bool {
        matches!(self, Self::Inclusive(_))
    }
}

/// The version requirement part of a constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requirement {
    /// Only this version matches.
    Exact(Version),
    /// Any version between the bounds matches. Lower is never above upper.
    Range {
        /// Lower bound.
        lower: Bound,
        /// Upper bound.
        upper: Bound,
    },
}

/// A parsed version constraint plus the prerelease-allowed flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionConstraint {
    requirement: Requirement,
    prerelease: bool,
}

impl Default for VersionConstraint {
    fn default() -> Self {
        Self::any()
    }
}

impl VersionConstraint {
    /// The unbounded constraint. Prereleases are excluded.
    pub fn any() -> Self {
        Self {
            requirement: Requirement::Range {
                lower: Bound::Unbounded,
                upper: Bound::Unbounded,
            },
            prerelease: false,
        }
    }

    /// A constraint matching a single version.
    pub fn exact(version: Version) -> Self {
        Self {
            requirement: Requirement::Exact(version),
            prerelease: false,
        }
    }

    /// Build a range constraint, enforcing `lower <= upper`.
    ///
    /// # Errors
    ///
    /// Returns [`VersionError::MalformedVersion`] if the lower bound is above
    /// the upper bound, or if they are equal and either side is exclusive
    /// (an empty range).
    pub fn range(lower: Bound, upper: Bound) -> Result<Self, VersionError> {
        if let (Some(lo), Some(hi)) = (lower.version(), upper.version()) {
            let text = format!("{lo},{hi}");
            match lo.cmp(hi) {
                Ordering::Greater => {
                    return Err(VersionError::malformed(
                        &text,
                        "lower bound is greater than upper bound",
                    ));
                }
                Ordering::Equal if !(lower.is_inclusive() && upper.is_inclusive()) => {
                    return Err(VersionError::malformed(&text, "range is empty"));
                }
                _ => {}
            }
        }
        Ok(Self {
            requirement: Requirement::Range { lower, upper },
            prerelease: false,
        })
    }

    /// Parse a constraint expression (see the module docs for the grammar).
    ///
    /// # Errors
    ///
    /// Returns [`VersionError::MalformedVersion`] on invalid syntax, invalid
    /// version text, or inverted/empty ranges.
    pub fn parse(text: &str) -> Result<Self, VersionError> {
        let s = text.trim();
        if s.is_empty() || s == "*" {
            return Ok(Self::any());
        }

        let Some(open) = s.chars().next().filter(|c| matches!(c, '[' | '(')) else {
            if s.contains(',') || s.ends_with([']', ')']) {
                return Err(VersionError::malformed(text, "missing opening bracket"));
            }
            return Ok(Self::exact(Version::parse(s)?));
        };

        let Some(close) = s.chars().last().filter(|c| matches!(c, ']' | ')')) else {
            return Err(VersionError::malformed(text, "missing closing bracket"));
        };
        if s.len() < 2 {
            return Err(VersionError::malformed(text, "missing closing bracket"));
        }
        let inner = &s[1..s.len() - 1];

        let parts: Vec<&str> = inner.split(',').map(str::trim).collect();
        match parts.as_slice() {
            [single] => {
                if open == '[' && close == ']' && !single.is_empty() {
                    Ok(Self::exact(Version::parse(single)?))
                } else {
                    Err(VersionError::malformed(
                        text,
                        "a single version in brackets must be written [x]",
                    ))
                }
            }
            [lo, hi] => {
                let lower = make_bound(lo, open == '[')?;
                let upper = make_bound(hi, close == ']')?;
                Self::range(lower, upper).map_err(|_| {
                    VersionError::malformed(text, "lower bound must not exceed upper bound")
                })
            }
            _ => Err(VersionError::malformed(
                text,
                "a range has exactly two bounds",
            )),
        }
    }

    /// Return a copy with the prerelease-allowed flag set.
    #[must_use]
    pub fn with_prerelease(mut self, allowed: bool) -> Self {
        self.prerelease = allowed;
        self
    }

    /// The version requirement.
    pub fn requirement(&self) -> &Requirement {
        &self.requirement
    }

    /// Whether prerelease versions are accepted by [`accepts`](Self::accepts).
    pub fn allows_prerelease(&self) -> bool {
        self.prerelease
    }

    /// Returns `true` for the unbounded constraint.
    pub fn is_any(&self) -> bool {
        matches!(
            self.requirement,
            Requirement::Range {
                lower: Bound::Unbounded,
                upper: Bound::Unbounded
            }
        )
    }

    /// Check `version` against the requirement.
    ///
    /// A prerelease version never matches unless `prerelease_allowed` is set,
    /// whatever the requirement says.
    pub fn matches(&self, version: &Version, prerelease_allowed: bool) -> bool {
        if version.is_prerelease() && !prerelease_allowed {
            return false;
        }
        match &self.requirement {
            Requirement::Exact(v) => v == version,
            Requirement::Range { lower, upper } => {
                let above = match lower {
                    Bound::Unbounded => true,
                    Bound::Inclusive(lo) => version >= lo,
                    Bound::Exclusive(lo) => version > lo,
                };
                let below = match upper {
                    Bound::Unbounded => true,
                    Bound::Inclusive(hi) => version <= hi,
                    Bound::Exclusive(hi) => version < hi,
                };
                above && below
            }
        }
    }

    /// [`matches`](Self::matches) using this constraint's own prerelease flag.
    pub fn accepts(&self, version: &Version) -> bool {
        self.matches(version, self.prerelease)
    }

    /// Pick the highest candidate satisfying the constraint.
    ///
    /// Ties (versions with equal precedence) keep the first one seen.
    pub fn select_best<T, I>(&self, candidates: I, prerelease_allowed: bool) -> Option<T>
    where
        T: Versioned,
        I: IntoIterator<Item = T>,
    {
        let mut best: Option<T> = None;
        for candidate in candidates {
            if !self.matches(candidate.version(), prerelease_allowed) {
                continue;
            }
            match &best {
                Some(current) if candidate.version() <= current.version() => {}
                _ => best = Some(candidate),
            }
        }
        best
    }
}

fn make_bound(text: &str, inclusive: bool) -> Result<Bound, VersionError> {
    if text.is_empty() {
        return Ok(Bound::Unbounded);
    }
    let v = Version::parse(text)?;
    Ok(if inclusive {
        Bound::Inclusive(v)
    } else {
        Bound::Exclusive(v)
    })
}

impl FromStr for VersionConstraint {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl std::fmt::Display for VersionConstraint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.requirement {
            Requirement::Exact(v) => write!(f, "[{v}]"),
            Requirement::Range { .. } if self.is_any() => write!(f, "*"),
            Requirement::Range { lower, upper } => {
                match lower {
                    Bound::Unbounded => write!(f, "(,")?,
                    Bound::Inclusive(v) => write!(f, "[{v},")?,
                    Bound::Exclusive(v) => write!(f, "({v},")?,
                }
                match upper {
                    Bound::Unbounded => write!(f, ")"),
                    Bound::Inclusive(v) => write!(f, "{v}]"),
                    Bound::Exclusive(v) => write!(f, "{v})"),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    #[test]
    fn test_parse_pads_missing_components() {
        assert_eq!(v("1"), v("1.0.0"));
        assert_eq!(v("1.2"), v("1.2.0"));
        assert_eq!(v("1.2").as_str(), "1.2");
    }

    #[test]
    fn test_parse_prerelease() {
        let pre = v("2.0-beta1");
        assert!(pre.is_prerelease());
        assert_eq!(pre.split_prerelease(), ("2.0", Some("beta1")));
        assert_eq!(v("2.0.0").split_prerelease(), ("2.0.0", None));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(Version::parse("").is_err());
        assert!(Version::parse("abc").is_err());
        assert!(Version::parse("1..2").is_err());
        assert!(Version::parse("1.2.3.4.5").is_err());
        assert!(Version::parse("1.2.3.x").is_err());
    }

    #[test]
    fn test_four_part_versions() {
        let four = v("2.12.1.3");
        assert_eq!(four.revision(), 3);
        assert_eq!(four.as_str(), "2.12.1.3");
        assert_eq!(four.to_string(), "2.12.1.3");
        assert_eq!(v("1.0.0.0"), v("1.0.0"));
        assert!(v("1.0.0.1") > v("1.0.0"));
        assert!(v("1.0.1") > v("1.0.0.9"));
        assert!(v("1.0.0.1") > v("1.0.0.1-beta"));
        assert!(v("1.0.0.1-beta").is_prerelease());

        let exact = VersionConstraint::parse("2.12.1.3").unwrap();
        assert!(exact.matches(&four, false));
        assert!(!exact.matches(&v("2.12.1"), false));
        let range = VersionConstraint::parse("[1.0.0.1,2.0)").unwrap();
        assert!(!range.matches(&v("1.0.0"), false));
        assert!(range.matches(&v("1.0.0.2"), false));
        assert_eq!(VersionConstraint::parse(&range.to_string()).unwrap(), range);
    }

    #[test]
    fn test_ordering_is_semantic() {
        assert!(v("1.10.0") > v("1.9.0"));
        assert!(v("1.0.0") > v("1.0.0-rc.1"));
        assert!(v("1.0.0-beta.2") > v("1.0.0-beta.1"));
    }

    #[test]
    fn test_constraint_any() {
        let c = VersionConstraint::parse("").unwrap();
        assert!(c.is_any());
        assert!(VersionConstraint::parse("*").unwrap().is_any());
        assert!(c.matches(&v("0.0.1"), false));
    }

    #[test]
    fn test_constraint_exact() {
        for text in ["1.2.3", "[1.2.3]", " 1.2.3 "] {
            let c = VersionConstraint::parse(text).unwrap();
            assert!(c.matches(&v("1.2.3"), false), "{text}");
            assert!(!c.matches(&v("1.2.4"), false), "{text}");
        }
    }

    #[test]
    fn test_constraint_range_inclusivity() {
        let c = VersionConstraint::parse("[1.0,2.0)").unwrap();
        assert!(c.matches(&v("1.0.0"), false));
        assert!(c.matches(&v("1.9.9"), false));
        assert!(!c.matches(&v("2.0.0"), false));

        let c = VersionConstraint::parse("(1.0,2.0]").unwrap();
        assert!(!c.matches(&v("1.0.0"), false));
        assert!(c.matches(&v("2.0.0"), false));
    }

    #[test]
    fn test_constraint_open_bounds() {
        let min = VersionConstraint::parse("[1.5,)").unwrap();
        assert!(min.matches(&v("99.0"), false));
        assert!(!min.matches(&v("1.4"), false));

        let max = VersionConstraint::parse("(,1.5]").unwrap();
        assert!(max.matches(&v("0.1"), false));
        assert!(!max.matches(&v("1.6"), false));
    }

    #[test]
    fn test_constraint_rejects_inverted_and_empty() {
        assert!(VersionConstraint::parse("[2.0,1.0]").is_err());
        assert!(VersionConstraint::parse("(1.0,1.0]").is_err());
        assert!(VersionConstraint::parse("[1.0,1.0]").is_ok());
    }

    #[test]
    fn test_constraint_rejects_bad_syntax() {
        for bad in ["[1.0", "1.0]", "(1.0)", "[1.0,2.0,3.0]", "[x,2.0]", "1.0,2.0"] {
            assert!(
                matches!(
                    VersionConstraint::parse(bad),
                    Err(VersionError::MalformedVersion { .. })
                ),
                "{bad} should be malformed"
            );
        }
    }

    #[test]
    fn test_prerelease_excluded_unless_allowed() {
        let c = VersionConstraint::any();
        assert!(!c.matches(&v("3.0.0-preview"), false));
        assert!(c.matches(&v("3.0.0-preview"), true));
        assert!(!c.accepts(&v("3.0.0-preview")));
        assert!(c.with_prerelease(true).accepts(&v("3.0.0-preview")));
    }

    #[test]
    fn test_select_best_skips_prerelease() {
        let versions = [v("1.0.0"), v("2.0.0-alpha"), v("1.5.0")];
        let best = VersionConstraint::any().select_best(&versions, false);
        assert_eq!(best.map(Version::as_str), Some("1.5.0"));

        let best = VersionConstraint::any().select_best(&versions, true);
        assert_eq!(best.map(Version::as_str), Some("2.0.0-alpha"));
    }

    #[test]
    fn test_select_best_ties_keep_first_seen() {
        let versions = [v("1.2"), v("1.2.0"), v("1.0")];
        let best = VersionConstraint::any().select_best(&versions, false).unwrap();
        assert_eq!(best.as_str(), "1.2");
    }

    #[test]
    fn test_select_best_respects_range() {
        let versions = [v("1.0"), v("2.0"), v("3.0")];
        let c = VersionConstraint::parse("[1.0,3.0)").unwrap();
        assert_eq!(c.select_best(&versions, false).unwrap().as_str(), "2.0");
        let none = VersionConstraint::parse("[5.0,)").unwrap();
        assert!(none.select_best(&versions, false).is_none());
    }

    #[test]
    fn test_display_round_trips() {
        for text in ["[1.0,2.0)", "(,2.0]", "[1.2.3]", "*"] {
            let c = VersionConstraint::parse(text).unwrap();
            assert_eq!(VersionConstraint::parse(&c.to_string()).unwrap(), c);
        }
    }
}
