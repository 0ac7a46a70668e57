//! Priority-ordered search across repositories.
//!
//! [`ResourceQueryEngine::search`] returns a lazy stream: a repository is
//! queried only when the consumer has drained everything before it, so a
//! caller that stops after the first useful repository never touches the
//! rest.

use std::sync::Arc;

use arca_schema::{PackageRecord, RepositoryRecord, VersionConstraint};
use futures::stream::{self, BoxStream, StreamExt};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::backend::{BackendError, BackendProvider, retain_matching};
use crate::convert::{ConversionError, Conversions, MetadataConverter};
use crate::pattern::{NamePattern, PatternError};

/// Which repositories a search covers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RepositorySelection {
    /// Every registered repository, in priority order.
    #[default]
    All,
    /// The named repositories, in the order given.
    Named(Vec<String>),
}

impl RepositorySelection {
    /// `All` when `names` is empty, otherwise `Named`.
    pub fn from_names(names: Vec<String>) -> Self {
        if names.is_empty() {
            Self::All
        } else {
            Self::Named(names)
        }
    }

    /// Resolve against a priority-ordered snapshot.
    ///
    /// Unknown names are logged and skipped. A name listed twice is
    /// searched once.
    pub fn resolve(&self, snapshot: &[Arc<RepositoryRecord>]) -> Vec<Arc<RepositoryRecord>> {
        match self {
            Self::All => snapshot.to_vec(),
            Self::Named(names) => {
                let mut picked: Vec<Arc<RepositoryRecord>> = Vec::with_capacity(names.len());
                for name in names {
                    match snapshot.iter().find(|r| r.name.eq_ignore_ascii_case(name)) {
                        Some(repo) if !picked.iter().any(|p| Arc::ptr_eq(p, repo)) => {
                            picked.push(repo.clone());
                        }
                        Some(_) => {}
                        None => tracing::warn!("Repository '{name}' is not registered, skipping"),
                    }
                }
                picked
            }
        }
    }
}

/// Parameters of one search.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    /// Name patterns; a candidate matching any of them is kept.
    pub patterns: Vec<NamePattern>,
    /// Version constraint applied after conversion.
    pub constraint: VersionConstraint,
    /// Whether prerelease versions may be returned.
    pub prerelease: bool,
    /// Repositories to search.
    pub repositories: RepositorySelection,
}

impl SearchRequest {
    /// Search for `patterns` with no version constraint, stable versions
    /// only, across all repositories. No patterns means match everything.
    ///
    /// # Errors
    ///
    /// Fails if a pattern cannot be compiled.
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self, PatternError> {
        let mut compiled = patterns
            .iter()
            .map(|p| NamePattern::new(p.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        if compiled.is_empty() {
            compiled.push(NamePattern::new("*")?);
        }
        Ok(Self {
            patterns: compiled,
            constraint: VersionConstraint::any(),
            prerelease: false,
            repositories: RepositorySelection::All,
        })
    }

    /// Set the version constraint.
    #[must_use]
    pub fn with_constraint(mut self, constraint: VersionConstraint) -> Self {
        self.constraint = constraint;
        self
    }

    /// Allow or exclude prerelease versions.
    #[must_use]
    pub fn with_prerelease(mut self, allowed: bool) -> Self {
        self.prerelease = allowed;
        self
    }

    /// Restrict the repositories searched.
    #[must_use]
    pub fn in_repositories(mut self, selection: RepositorySelection) -> Self {
        self.repositories = selection;
        self
    }
}

/// A matching record and the repository it came from.
#[derive(Debug, Clone)]
pub struct SearchHit {
    /// Source repository.
    pub repository: Arc<RepositoryRecord>,
    /// Converted record.
    pub record: PackageRecord,
}

/// A problem that was skipped over during a search.
#[derive(Error, Debug)]
pub enum Diagnostic {
    /// A candidate could not be converted.
    #[error("{repository}: skipped candidate: {error}")]
    Conversion {
        /// Repository name.
        repository: String,
        /// Conversion failure.
        error: ConversionError,
    },

    /// A repository could not be queried.
    #[error("{repository}: {error}")]
    Transport {
        /// Repository name.
        repository: String,
        /// Transport failure.
        error: BackendError,
    },
}

/// One item of a search stream.
#[derive(Debug)]
pub enum SearchEvent {
    /// A record satisfying the request.
    Found(SearchHit),
    /// A non-fatal problem.
    Skipped(Diagnostic),
    /// Every hit from this repository has been yielded. Not emitted for a
    /// repository whose query failed.
    Exhausted(Arc<RepositoryRecord>),
}

/// Queries repositories through a [`BackendProvider`].
#[derive(Clone)]
pub struct ResourceQueryEngine {
    provider: Arc<dyn BackendProvider>,
}

impl std::fmt::Debug for ResourceQueryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceQueryEngine").finish_non_exhaustive()
    }
}

impl ResourceQueryEngine {
    /// An engine using `provider` to reach repositories.
    pub fn new(provider: Arc<dyn BackendProvider>) -> Self {
        Self { provider }
    }

    /// Search the repositories of `snapshot` selected by `request`.
    ///
    /// Hits come repository by repository, in selection order, with no
    /// de-duplication across repositories. The stream ends early once
    /// `cancel` fires; a batch that arrives after cancellation is dropped.
    pub fn search(
        &self,
        snapshot: &[Arc<RepositoryRecord>],
        request: SearchRequest,
        cancel: CancellationToken,
    ) -> BoxStream<'static, SearchEvent> {
        let cursor = Cursor {
            provider: self.provider.clone(),
            pending: request.repositories.resolve(snapshot).into_iter(),
            current: None,
            request,
            cancel,
        };
        stream::unfold(cursor, Cursor::advance).boxed()
    }
}

struct Cursor {
    provider: Arc<dyn BackendProvider>,
    pending: std::vec::IntoIter<Arc<RepositoryRecord>>,
    current: Option<(Arc<RepositoryRecord>, Conversions)>,
    request: SearchRequest,
    cancel: CancellationToken,
}

impl Cursor {
    async fn advance(mut self) -> Option<(SearchEvent, Self)> {
        loop {
            if self.cancel.is_cancelled() {
                return None;
            }
            if let Some((repo, mut conversions)) = self.current.take() {
                if let Some(event) = self.next_from(&repo, &mut conversions) {
                    self.current = Some((repo, conversions));
                    return Some((event, self));
                }
                return Some((SearchEvent::Exhausted(repo), self));
            }

            let repo = self.pending.next()?;
            match self.fetch(&repo).await {
                Ok(Some(conversions)) => self.current = Some((repo, conversions)),
                Ok(None) => return None,
                Err(error) => {
                    tracing::warn!("Repository '{}' failed: {error}", repo.name);
                    let event = SearchEvent::Skipped(Diagnostic::Transport {
                        repository: repo.name.clone(),
                        error,
                    });
                    return Some((event, self));
                }
            }
        }
    }

    /// Next event from the current batch, or `None` once it is drained.
    fn next_from(
        &self,
        repo: &Arc<RepositoryRecord>,
        conversions: &mut Conversions,
    ) -> Option<SearchEvent> {
        for outcome in conversions.by_ref() {
            match outcome {
                Ok(record) => {
                    if self
                        .request
                        .constraint
                        .matches(record.version(), self.request.prerelease)
                    {
                        return Some(SearchEvent::Found(SearchHit {
                            repository: repo.clone(),
                            record,
                        }));
                    }
                }
                Err(error) => {
                    tracing::warn!("{}: skipping candidate: {error}", repo.name);
                    return Some(SearchEvent::Skipped(Diagnostic::Conversion {
                        repository: repo.name.clone(),
                        error,
                    }));
                }
            }
        }
        None
    }

    /// Query one repository. `Ok(None)` means cancellation won.
    async fn fetch(
        &self,
        repo: &Arc<RepositoryRecord>,
    ) -> Result<Option<Conversions>, BackendError> {
        let backend = self.provider.backend_for(repo)?;
        tracing::debug!("Querying repository {} ({})", repo.name, repo.location);

        let result = tokio::select! {
            biased;
            () = self.cancel.cancelled() => return Ok(None),
            result = backend.query(&self.request.patterns) => result,
        };
        if self.cancel.is_cancelled() {
            return Ok(None);
        }

        let mut batch = result?;
        retain_matching(&mut batch, &self.request.patterns);
        Ok(Some(MetadataConverter::new(repo.clone()).convert_all(batch)))
    }
}
