//! Shared data model for arca.
//!
//! Everything in this crate is pure: repository records, raw candidate
//! documents, canonical package records, and version range matching.
//! Network and filesystem effects live in `arca-core`.

pub mod hash;
pub mod types;
pub mod version;

// Re-exports
pub use hash::*;
pub use types::*;
pub use version::{Bound, Requirement, Version, VersionConstraint, VersionError, Versioned};

/// Reserved repository name for the well-known public gallery.
pub const WELL_KNOWN_GALLERY_NAME: &str = "well-known-gallery";

/// Fixed location used when the well-known gallery is registered.
pub const WELL_KNOWN_GALLERY_URL: &str = "https://www.powershellgallery.com/api/v2";
