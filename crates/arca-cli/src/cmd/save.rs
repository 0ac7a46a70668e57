//! Save command

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use arca_core::{
    Acquirer, AcquisitionRequest, ConflictPolicy, OutputMode, RepositorySelection, SchemeProvider,
};

/// Flags for `arca save`.
#[derive(Debug, Default)]
pub struct SaveOptions {
    pub version: Option<String>,
    pub prerelease: bool,
    pub repositories: Vec<String>,
    pub as_archive: bool,
    pub include_metadata: bool,
    pub trust: bool,
    pub reinstall: bool,
    pub no_clobber: bool,
}

impl SaveOptions {
    fn into_request(self, names: Vec<String>, path: PathBuf) -> AcquisitionRequest {
        let mut request = AcquisitionRequest::new(names, path);
        request.version = self.version;
        request.prerelease = self.prerelease;
        request.repositories = RepositorySelection::from_names(self.repositories);
        request.trust_accepted = self.trust;
        request.output = if self.as_archive {
            OutputMode::Archive
        } else {
            OutputMode::Expanded {
                include_metadata: self.include_metadata,
            }
        };
        request.conflict = if self.reinstall {
            ConflictPolicy::Reinstall
        } else if self.no_clobber {
            ConflictPolicy::NoClobber
        } else {
            ConflictPolicy::FailIfExists
        };
        request
    }
}

/// Save each name to `path`, reporting every outcome.
pub async fn save(names: Vec<String>, path: PathBuf, opts: SaveOptions) -> Result<()> {
    let start = std::time::Instant::now();
    let (config, store) = crate::context()?;
    let registry = store.load().context("Failed to load repositories")?;

    let provider = Arc::new(SchemeProvider::new(&config)?);
    let acquirer = Acquirer::new(provider, &config);
    let cancel = super::interrupt_token();

    let request = opts.into_request(names, path);
    let results = acquirer.acquire_batch(&registry, request, cancel).await;

    let mut failed = 0usize;
    for result in &results {
        match &result.outcome {
            Ok(acquired) => {
                let verb = if acquired.replaced { "replaced" } else { "saved" };
                println!(
                    "{} {} from {} {verb} to {}",
                    acquired.record.name(),
                    acquired.record.version(),
                    acquired.repository.name,
                    acquired.path.display()
                );
            }
            Err(e) => {
                failed += 1;
                eprintln!("{}: {} ({})", result.name, e, e.kind());
            }
        }
    }

    println!();
    println!(
        "SAVE COMPLETE {}/{}, elapsed {:.2}s",
        results.len() - failed,
        results.len(),
        start.elapsed().as_secs_f64()
    );

    if failed > 0 {
        bail!("{failed} of {} packages failed", results.len());
    }
    Ok(())
}
