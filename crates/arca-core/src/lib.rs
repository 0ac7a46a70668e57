//! Resolution and acquisition engine for arca.
//!
//! The pieces, leaves first:
//!
//! - [`registry`]: ordered repository records.
//! - [`convert`]: raw candidate documents to [`arca_schema::PackageRecord`]s.
//! - [`query`]: lazy, priority-ordered search across repositories.
//! - [`acquire`]: resolve, trust-check, fetch, and place requested names.
//!
//! Version ranges live in [`arca_schema::version`].

pub mod acquire;
pub mod backend;
pub mod config;
pub mod convert;
pub mod io;
pub mod paths;
pub mod pattern;
pub mod query;
pub mod registry;

pub use acquire::{
    AcquireError, Acquired, Acquirer, AcquisitionRequest, AcquisitionResult, ConflictPolicy,
    OutputMode,
};
pub use backend::{BackendError, BackendProvider, RepositoryBackend, SchemeProvider};
pub use config::EngineConfig;
pub use query::{
    Diagnostic, RepositorySelection, ResourceQueryEngine, SearchEvent, SearchHit, SearchRequest,
};
pub use registry::{RegistrationSpec, RegistryError, RepositoryRegistry};

/// User Agent string for core operations
pub const USER_AGENT: &str = concat!("arca-core/", env!("CARGO_PKG_VERSION"));
