//! Find command

use std::sync::Arc;

use anyhow::{Context, Result};
use arca_core::{
    RepositorySelection, ResourceQueryEngine, SchemeProvider, SearchEvent, SearchRequest,
};
use arca_schema::version::VersionConstraint;
use futures::StreamExt;

/// Search registered repositories and print hits as they arrive.
pub async fn find(
    patterns: &[String],
    version: Option<&str>,
    prerelease: bool,
    repositories: Vec<String>,
) -> Result<()> {
    let start = std::time::Instant::now();
    let (config, store) = crate::context()?;
    let registry = store.load().context("Failed to load repositories")?;

    let constraint = match version {
        Some(text) if !text.trim().is_empty() => {
            VersionConstraint::parse(text).context("Invalid version")?
        }
        _ => VersionConstraint::any(),
    };
    let request = SearchRequest::new(patterns)
        .context("Invalid name pattern")?
        .with_constraint(constraint)
        .with_prerelease(prerelease)
        .in_repositories(RepositorySelection::from_names(repositories));

    let provider = Arc::new(SchemeProvider::new(&config)?);
    let engine = ResourceQueryEngine::new(provider);
    let cancel = super::interrupt_token();
    let mut hits = engine.search(&registry.snapshot(), request, cancel);

    let mut found = 0usize;
    while let Some(event) = hits.next().await {
        match event {
            SearchEvent::Found(hit) => {
                found += 1;
                let record = &hit.record;
                println!(
                    "{:<30} {:<16} {:<16} {}",
                    record.name(),
                    record.version(),
                    hit.repository.name,
                    record.description().unwrap_or_default()
                );
            }
            SearchEvent::Skipped(diagnostic) => {
                tracing::warn!("{diagnostic}");
            }
            SearchEvent::Exhausted(repo) => {
                tracing::debug!("Finished repository {}", repo.name);
            }
        }
    }

    println!();
    println!(
        "FOUND {found}, elapsed {:.2}s",
        start.elapsed().as_secs_f64()
    );
    Ok(())
}
