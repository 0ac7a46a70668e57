//! arca - save packages from prioritized repositories
#![allow(missing_docs)]
#![allow(clippy::missing_errors_doc)]
//!
//! Thin front end over `arca-core`: manages the repository list, searches
//! repositories, and saves packages to a directory.
//!
//! # Directory Layout
//!
//! ```text
//! ~/.arca/
//! └── repositories.toml   # Registered repositories
//! ```

pub mod cmd;
pub mod store;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use arca_schema::DEFAULT_PRIORITY;

#[derive(Debug, Parser)]
#[command(name = "arca")]
#[command(author, version, about = "arca - save packages from prioritized repositories")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Manage registered repositories
    Repo {
        #[command(subcommand)]
        command: RepoCommands,
    },
    /// Search repositories for packages
    Find {
        /// Name patterns (`*` wildcard; a bare name matches as a prefix)
        patterns: Vec<String>,
        /// Version or range, e.g. 1.2.0 or [1.0,2.0)
        #[arg(long)]
        version: Option<String>,
        /// Include prerelease versions
        #[arg(long)]
        prerelease: bool,
        /// Only search these repositories, in this order
        #[arg(long = "repository", short = 'r')]
        repositories: Vec<String>,
    },
    /// Save packages to a directory
    Save {
        /// Package names (no wildcards)
        #[arg(required = true)]
        names: Vec<String>,
        /// Destination directory
        #[arg(long)]
        path: PathBuf,
        /// Version or range, e.g. 1.2.0 or [1.0,2.0)
        #[arg(long)]
        version: Option<String>,
        /// Allow prerelease versions
        #[arg(long)]
        prerelease: bool,
        /// Only search these repositories, in this order
        #[arg(long = "repository", short = 'r')]
        repositories: Vec<String>,
        /// Save the artifact unmodified instead of expanding it
        #[arg(long)]
        as_archive: bool,
        /// Write arca-metadata.json next to expanded content
        #[arg(long, conflicts_with = "as_archive")]
        include_metadata: bool,
        /// Accept packages from untrusted repositories
        #[arg(long)]
        trust: bool,
        /// Overwrite an existing destination
        #[arg(long, conflicts_with = "no_clobber")]
        reinstall: bool,
        /// Never overwrite an existing destination
        #[arg(long)]
        no_clobber: bool,
    },
}

#[derive(Debug, Subcommand)]
pub enum RepoCommands {
    /// List repositories in search order
    List,
    /// Register a repository
    Add {
        /// Repository name
        #[arg(required_unless_present = "gallery")]
        name: Option<String>,
        /// Location (http, https, ftp, file URI or absolute path)
        #[arg(required_unless_present = "gallery")]
        url: Option<String>,
        /// Register the well-known gallery at its built-in location
        #[arg(long, conflicts_with_all = ["name", "url"])]
        gallery: bool,
        /// Search priority, 0 (first) to 50 (last)
        #[arg(long, default_value_t = DEFAULT_PRIORITY, allow_negative_numbers = true)]
        priority: i32,
        /// Trust packages from this repository
        #[arg(long)]
        trusted: bool,
    },
    /// Unregister a repository
    Remove {
        /// Repository name
        name: String,
    },
}

/// Load configuration and the repository store.
pub fn context() -> anyhow::Result<(arca_core::EngineConfig, store::TomlRepositoryStore)> {
    use anyhow::Context;

    let config = arca_core::EngineConfig::from_env().context("Failed to read configuration")?;
    let store = store::TomlRepositoryStore::new(config.repositories_path());
    Ok((config, store))
}
