use std::path::PathBuf;

use arca_schema::VersionError;
use thiserror::Error;

use crate::backend::BackendError;
use crate::io::extract::ExtractError;
use crate::io::place::PlaceError;

/// Why one requested name was not acquired.
#[derive(Error, Debug)]
pub enum AcquireError {
    /// The requested name is not a concrete name.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The version constraint does not parse.
    #[error(transparent)]
    MalformedVersion(#[from] VersionError),

    /// The winning repository is untrusted and trust was not accepted.
    #[error("{name} resolves to untrusted repository '{repository}'")]
    UntrustedSource {
        /// Requested name.
        name: String,
        /// Untrusted repository.
        repository: String,
    },

    /// The destination already exists, or another name in the batch claimed it.
    #[error("{} already exists", .0.display())]
    AlreadyExists(PathBuf),

    /// No repository offers a satisfying version.
    #[error("No repository provides {name} matching {constraint}")]
    NotFound {
        /// Requested name.
        name: String,
        /// Constraint that could not be satisfied.
        constraint: String,
    },

    /// The batch was cancelled before this name finished.
    #[error("Cancelled")]
    Cancelled,

    /// The artifact could not be fetched.
    #[error("Transport failure: {0}")]
    TransportFailure(#[from] BackendError),

    /// Local filesystem failure while staging or placing.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The artifact could not be expanded.
    #[error("Extraction failed: {0}")]
    Extract(#[from] ExtractError),
}

impl From<PlaceError> for AcquireError {
    fn from(e: PlaceError) -> Self {
        match e {
            PlaceError::Exists(path) => Self::AlreadyExists(path),
            PlaceError::Io(e) => Self::Io(e),
            PlaceError::Metadata(e) => Self::Io(std::io::Error::other(e)),
        }
    }
}

impl From<tokio::task::JoinError> for AcquireError {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::Io(std::io::Error::other(e))
    }
}

impl AcquireError {
    /// Short stable tag for reporting.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => "InvalidArgument",
            Self::MalformedVersion(_) => "MalformedVersion",
            Self::UntrustedSource { .. } => "UntrustedSource",
            Self::AlreadyExists(_) => "AlreadyExists",
            Self::NotFound { .. } => "NotFound",
            Self::Cancelled => "Cancelled",
            Self::TransportFailure(_) => "TransportFailure",
            Self::Io(_) | Self::Extract(_) => "LocalFailure",
        }
    }
}
