//! Per-name acquisition typestate
//!
//! ```text
//! PendingName --[resolve()]--> ResolvedName --[plan()]--> PlannedName --[acquire()]--> Acquired
//! ```
//!
//! Each step takes its inputs as an explicit context value, so no step
//! depends on state left behind by another.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use arca_schema::{PackageName, PackageRecord, RepositoryRecord, VersionConstraint};
use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use super::{Acquired, AcquireError, ConflictPolicy, OutputMode};
use crate::backend::BackendProvider;
use crate::io::extract::extract_auto;
use crate::io::place::{SideMetadata, Staging};
use crate::paths::{artifact_suffix, filename_from_url};
use crate::query::{RepositorySelection, ResourceQueryEngine, SearchEvent, SearchRequest};

/// Inputs shared by every name's resolution in one batch.
#[derive(Debug, Clone)]
pub struct ResolveContext {
    /// Search engine shared by every name.
    pub engine: ResourceQueryEngine,
    /// Registry snapshot taken at batch start.
    pub snapshot: Arc<[Arc<RepositoryRecord>]>,
    /// Parsed version constraint.
    pub constraint: VersionConstraint,
    /// Whether prerelease versions may be chosen.
    pub prerelease: bool,
    /// Repositories to search.
    pub repositories: RepositorySelection,
    /// Untrusted repositories are allowed.
    pub trust_accepted: bool,
    /// Batch-wide cancellation.
    pub cancel: CancellationToken,
}

/// Inputs shared by every name's placement in one batch.
#[derive(Clone)]
pub struct PlaceContext {
    /// Backends used to fetch artifacts.
    pub provider: Arc<dyn BackendProvider>,
    /// Destination root; staging directories are created beneath it.
    pub destination: PathBuf,
    /// Output layout.
    pub output: OutputMode,
    /// What to do with an existing destination.
    pub conflict: ConflictPolicy,
    /// Batch-wide cancellation.
    pub cancel: CancellationToken,
}

impl std::fmt::Debug for PlaceContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaceContext")
            .field("destination", &self.destination)
            .field("output", &self.output)
            .field("conflict", &self.conflict)
            .finish_non_exhaustive()
    }
}

/// State 1: a requested name.
#[derive(Debug)]
pub struct PendingName {
    /// The name as requested.
    pub name: PackageName,
}

/// State 2: the record chosen for a name.
#[derive(Debug)]
pub struct ResolvedName {
    /// The name as requested.
    pub requested: PackageName,
    /// The winning repository.
    pub repository: Arc<RepositoryRecord>,
    /// The chosen record.
    pub record: PackageRecord,
}

/// State 3: a resolved name with its claimed destination.
#[derive(Debug)]
pub struct PlannedName {
    /// The resolution this plan came from.
    pub resolved: ResolvedName,
    /// Claimed destination.
    pub final_path: PathBuf,
}

impl PendingName {
    /// Start from a requested name.
    pub fn new(name: impl Into<PackageName>) -> Self {
        Self { name: name.into() }
    }

    /// Reject names that are empty or contain wildcard characters.
    pub fn validate(&self) -> Result<(), AcquireError> {
        if self.name.trim().is_empty() {
            return Err(AcquireError::InvalidArgument("empty package name".into()));
        }
        if self.name.has_wildcard() {
            return Err(AcquireError::InvalidArgument(format!(
                "'{}' contains wildcard characters; acquisition needs a concrete name",
                self.name
            )));
        }
        Ok(())
    }

    /// Find the record to acquire.
    ///
    /// The first repository, in search order, with any satisfying version
    /// wins; the best version is then chosen among that repository's
    /// candidates only.
    pub async fn resolve(self, ctx: &ResolveContext) -> Result<ResolvedName, AcquireError> {
        self.validate()?;
        let name = self.name;
        if ctx.cancel.is_cancelled() {
            return Err(AcquireError::Cancelled);
        }
        tracing::debug!(name = %name, state = "Resolving");

        let request = SearchRequest::new(&[name.as_str()])
            .map_err(|e| AcquireError::InvalidArgument(e.to_string()))?
            .with_constraint(ctx.constraint.clone())
            .with_prerelease(ctx.prerelease)
            .in_repositories(ctx.repositories.clone());

        let mut events = ctx.engine.search(&ctx.snapshot, request, ctx.cancel.clone());
        let mut winner: Option<Arc<RepositoryRecord>> = None;
        let mut candidates = Vec::new();

        // Later repositories are never queried once the winner is drained.
        while let Some(event) = events.next().await {
            match event {
                SearchEvent::Found(hit) if *hit.record.name() == name => {
                    if winner.is_none() {
                        winner = Some(hit.repository.clone());
                    }
                    candidates.push(hit.record);
                }
                SearchEvent::Exhausted(repo)
                    if winner.as_ref().is_some_and(|w| Arc::ptr_eq(w, &repo)) =>
                {
                    break;
                }
                _ => {}
            }
        }
        drop(events);

        if ctx.cancel.is_cancelled() {
            return Err(AcquireError::Cancelled);
        }

        let best = ctx.constraint.select_best(candidates, ctx.prerelease);
        let (Some(repository), Some(record)) = (winner, best) else {
            tracing::debug!(name = %name, state = "Unresolved");
            return Err(AcquireError::NotFound {
                name: name.to_string(),
                constraint: ctx.constraint.to_string(),
            });
        };

        if !repository.trusted && !ctx.trust_accepted {
            tracing::warn!(
                "Refusing {name} {} from untrusted repository '{}'",
                record.version(),
                repository.name
            );
            return Err(AcquireError::UntrustedSource {
                name: name.to_string(),
                repository: repository.name.clone(),
            });
        }

        tracing::debug!(
            name = %name,
            state = "Resolved",
            version = %record.version(),
            repository = %repository.name
        );
        Ok(ResolvedName {
            requested: name,
            repository,
            record,
        })
    }
}

impl ResolvedName {
    /// The artifact's file name, falling back to the package name.
    fn artifact_file_name(&self) -> String {
        self.record
            .artifact()
            .map(filename_from_url)
            .filter(|f| !f.is_empty())
            .map_or_else(|| self.record.name().to_string(), str::to_string)
    }

    /// Where this record lands under `destination` for `output`.
    pub fn final_path(&self, destination: &Path, output: OutputMode) -> PathBuf {
        let name = self.record.name().as_str();
        let version = self.record.version().as_str();
        match output {
            OutputMode::Archive => {
                let file = self.artifact_file_name();
                destination.join(format!("{name}.{version}{}", artifact_suffix(&file)))
            }
            OutputMode::Expanded { .. } => destination.join(name).join(version),
        }
    }

    /// Attach a claimed destination.
    pub fn plan(self, final_path: PathBuf) -> PlannedName {
        PlannedName {
            resolved: self,
            final_path,
        }
    }
}

impl PlannedName {
    /// Fetch, stage, and place the artifact.
    pub async fn acquire(self, ctx: &PlaceContext) -> Result<Acquired, AcquireError> {
        let Self {
            resolved,
            final_path,
        } = self;
        let name = resolved.requested.clone();

        if ctx.cancel.is_cancelled() {
            return Err(AcquireError::Cancelled);
        }
        if ctx.conflict != ConflictPolicy::Reinstall && final_path.symlink_metadata().is_ok() {
            return Err(AcquireError::AlreadyExists(final_path));
        }
        tracing::debug!(name = %name, state = "Acquiring");

        let staging = Staging::new(&ctx.destination)?;
        let download = staging.download_path();
        let backend = ctx.provider.backend_for(&resolved.repository)?;

        let fetched = tokio::select! {
            biased;
            () = ctx.cancel.cancelled() => return Err(AcquireError::Cancelled),
            result = backend.fetch_artifact(&resolved.record, &download) => result,
        };
        let bytes = fetched?;
        if ctx.cancel.is_cancelled() {
            return Err(AcquireError::Cancelled);
        }
        tracing::debug!("Fetched {bytes} bytes for {name}");

        let file_name = resolved.artifact_file_name();
        let output = ctx.output;
        let replace = ctx.conflict == ConflictPolicy::Reinstall;
        let cancel = ctx.cancel.clone();

        let placed = tokio::task::spawn_blocking(move || -> Result<_, AcquireError> {
            let staged = match output {
                OutputMode::Archive => download,
                OutputMode::Expanded { include_metadata } => {
                    let content = staging.content_path();
                    extract_auto(&download, &file_name, &content)?;
                    if include_metadata {
                        let now = chrono::Utc::now();
                        SideMetadata::new(&resolved.record, &resolved.repository, now)
                            .write_to(&content)?;
                    }
                    content
                }
            };
            if cancel.is_cancelled() {
                return Err(AcquireError::Cancelled);
            }
            let replaced = staging.commit(&staged, &final_path, replace)?;
            Ok((resolved, final_path, replaced))
        });
        let (resolved, final_path, replaced) = placed.await??;

        tracing::info!(
            "Saved {} {} from {} to {}",
            resolved.record.name(),
            resolved.record.version(),
            resolved.repository.name,
            final_path.display()
        );
        tracing::debug!(name = %name, state = "Done");
        Ok(Acquired {
            record: resolved.record,
            repository: resolved.repository,
            path: final_path,
            replaced,
        })
    }
}
