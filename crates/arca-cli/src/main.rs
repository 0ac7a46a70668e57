//! arca - save packages from prioritized repositories

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use arca_cli::cmd;
use arca_cli::{Cli, Commands, RepoCommands};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Repo { command } => match command {
            RepoCommands::List => cmd::repo::list(),
            RepoCommands::Add {
                name,
                url,
                gallery,
                priority,
                trusted,
            } => {
                if gallery {
                    cmd::repo::add_gallery(priority, trusted)
                } else {
                    cmd::repo::add(
                        name.as_deref().unwrap_or_default(),
                        url.as_deref().unwrap_or_default(),
                        priority,
                        trusted,
                    )
                }
            }
            RepoCommands::Remove { name } => cmd::repo::remove(&name),
        },
        Commands::Find {
            patterns,
            version,
            prerelease,
            repositories,
        } => cmd::find::find(&patterns, version.as_deref(), prerelease, repositories).await,
        Commands::Save {
            names,
            path,
            version,
            prerelease,
            repositories,
            as_archive,
            include_metadata,
            trust,
            reinstall,
            no_clobber,
        } => {
            let opts = cmd::save::SaveOptions {
                version,
                prerelease,
                repositories,
                as_archive,
                include_metadata,
                trust,
                reinstall,
                no_clobber,
            };
            cmd::save::save(names, path, opts).await
        }
    }
}
