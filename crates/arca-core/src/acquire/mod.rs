//! Batch acquisition of packages.
//!
//! Each requested name moves through
//! `Pending → Resolving → {Resolved → Acquiring → {Done | Failed}} | Unresolved`
//! independently of the others. The batch:
//!
//! 1. snapshots the registry,
//! 2. resolves every name concurrently (bounded, order-preserving),
//! 3. claims destinations in request order so two names never share one,
//! 4. fetches and places the claimed names concurrently.
//!
//! One shared [`CancellationToken`] stops every name that has not finished.

mod error;
pub mod flow;

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use arca_schema::{PackageRecord, RepositoryRecord, VersionConstraint};
use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;

pub use error::AcquireError;
use flow::{PendingName, PlaceContext, PlannedName, ResolveContext, ResolvedName};

use crate::backend::BackendProvider;
use crate::config::EngineConfig;
use crate::query::{RepositorySelection, ResourceQueryEngine};
use crate::registry::RepositoryRegistry;

/// What to do when the destination already exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConflictPolicy {
    /// Replace the existing destination.
    Reinstall,
    /// Leave it alone and fail with `AlreadyExists`.
    NoClobber,
    /// No flag given: fail with `AlreadyExists`.
    #[default]
    FailIfExists,
}

/// How the artifact is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Copy the artifact unmodified to `<dest>/<name>.<version><ext>`.
    Archive,
    /// Expand into `<dest>/<name>/<version>/`.
    Expanded {
        /// Also write `arca-metadata.json` into the directory.
        include_metadata: bool,
    },
}

impl Default for OutputMode {
    fn default() -> Self {
        Self::Expanded {
            include_metadata: false,
        }
    }
}

/// Everything a caller specifies for one batch.
#[derive(Debug, Clone)]
pub struct AcquisitionRequest {
    /// Concrete names; wildcards are rejected per name.
    pub names: Vec<String>,
    /// Version constraint text. `None` means any version.
    pub version: Option<String>,
    /// Whether prerelease versions may be chosen.
    pub prerelease: bool,
    /// Repositories to search.
    pub repositories: RepositorySelection,
    /// Destination root.
    pub destination: PathBuf,
    /// Conflict handling.
    pub conflict: ConflictPolicy,
    /// Output layout.
    pub output: OutputMode,
    /// Allow untrusted repositories without confirmation.
    pub trust_accepted: bool,
}

impl AcquisitionRequest {
    /// A request with defaults: any stable version, all repositories,
    /// expanded output without metadata, fail if the destination exists,
    /// untrusted repositories refused.
    pub fn new(names: Vec<String>, destination: impl Into<PathBuf>) -> Self {
        Self {
            names,
            version: None,
            prerelease: false,
            repositories: RepositorySelection::All,
            destination: destination.into(),
            conflict: ConflictPolicy::default(),
            output: OutputMode::default(),
            trust_accepted: false,
        }
    }
}

/// A successful acquisition.
#[derive(Debug)]
pub struct Acquired {
    /// The record that was acquired.
    pub record: PackageRecord,
    /// Repository it came from.
    pub repository: Arc<RepositoryRecord>,
    /// Final local path.
    pub path: PathBuf,
    /// Whether an existing destination was replaced.
    pub replaced: bool,
}

/// Outcome for one requested name.
#[derive(Debug)]
pub struct AcquisitionResult {
    /// The name as requested.
    pub name: String,
    /// Success or the reason for failure.
    pub outcome: Result<Acquired, AcquireError>,
}

/// Runs acquisition batches.
#[derive(Clone)]
pub struct Acquirer {
    engine: ResourceQueryEngine,
    provider: Arc<dyn BackendProvider>,
    max_parallel: usize,
}

impl std::fmt::Debug for Acquirer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Acquirer")
            .field("max_parallel", &self.max_parallel)
            .finish_non_exhaustive()
    }
}

impl Acquirer {
    /// An acquirer reaching repositories through `provider`.
    pub fn new(provider: Arc<dyn BackendProvider>, config: &EngineConfig) -> Self {
        Self {
            engine: ResourceQueryEngine::new(provider.clone()),
            provider,
            max_parallel: config.max_parallel.max(1),
        }
    }

    /// Acquire every name in `request`, returning one result per name in
    /// request order. A failure for one name never affects another.
    pub async fn acquire_batch(
        &self,
        registry: &RepositoryRegistry,
        request: AcquisitionRequest,
        cancel: CancellationToken,
    ) -> Vec<AcquisitionResult> {
        let AcquisitionRequest {
            names,
            version,
            prerelease,
            repositories,
            destination,
            conflict,
            output,
            trust_accepted,
        } = request;

        let constraint = match version.as_deref().map(str::trim) {
            None | Some("") => Ok(VersionConstraint::any()),
            Some(text) => VersionConstraint::parse(text),
        }
        .map(|c| c.with_prerelease(prerelease));

        let resolve_ctx = constraint.map(|constraint| ResolveContext {
            engine: self.engine.clone(),
            snapshot: registry.snapshot().into(),
            constraint,
            prerelease,
            repositories,
            trust_accepted,
            cancel: cancel.clone(),
        });

        let resolved: Vec<Result<ResolvedName, AcquireError>> = stream::iter(names.iter())
            .map(|name| {
                let pending = PendingName::new(name.as_str());
                let ctx = resolve_ctx.as_ref();
                async move {
                    match (pending.validate(), ctx) {
                        (Err(e), _) => Err(e),
                        (Ok(()), Err(e)) => Err(AcquireError::MalformedVersion(e.clone())),
                        (Ok(()), Ok(ctx)) => pending.resolve(ctx).await,
                    }
                }
            })
            .buffered(self.max_parallel)
            .collect()
            .await;

        let planned = claim_destinations(resolved, &destination, output);

        let place_ctx = PlaceContext {
            provider: self.provider.clone(),
            destination,
            output,
            conflict,
            cancel,
        };
        let outcomes: Vec<Result<Acquired, AcquireError>> = stream::iter(planned)
            .map(|planned| {
                let ctx = &place_ctx;
                async move {
                    match planned {
                        Ok(planned) => planned.acquire(ctx).await,
                        Err(e) => Err(e),
                    }
                }
            })
            .buffered(self.max_parallel)
            .collect()
            .await;

        names
            .into_iter()
            .zip(outcomes)
            .map(|(name, outcome)| {
                if let Err(e) = &outcome {
                    tracing::debug!(name = %name, state = "Failed", reason = e.kind());
                    tracing::warn!("{name}: {e}");
                }
                AcquisitionResult { name, outcome }
            })
            .collect()
    }
}

/// Assign final paths in request order. A path claimed by an earlier name
/// fails every later name that maps to it.
fn claim_destinations(
    resolved: Vec<Result<ResolvedName, AcquireError>>,
    destination: &std::path::Path,
    output: OutputMode,
) -> Vec<Result<PlannedName, AcquireError>> {
    let mut claimed: HashSet<String> = HashSet::new();
    resolved
        .into_iter()
        .map(|r| {
            let resolved = r?;
            let path = resolved.final_path(destination, output);
            let key = path.to_string_lossy().to_lowercase();
            if !claimed.insert(key) {
                return Err(AcquireError::AlreadyExists(path));
            }
            Ok(resolved.plan(path))
        })
        .collect()
}
