//! Engine configuration.
//!
//! All settings come from the environment so the same binary behaves the
//! same under CI and interactive use:
//!
//! | Variable                 | Default          |
//! |--------------------------|------------------|
//! | `ARCA_HOME`              | `~/.arca`        |
//! | `ARCA_MAX_PARALLEL`      | number of CPUs   |
//! | `ARCA_HTTP_TIMEOUT_SECS` | `60`             |

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors raised while reading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Neither `ARCA_HOME` nor a home directory is available.
    #[error("Could not determine home directory. Set ARCA_HOME to override.")]
    NoHome,

    /// A numeric variable holds something that is not a positive integer.
    #[error("{var} must be a positive integer, got '{value}'")]
    InvalidNumber {
        /// Variable name.
        var: &'static str,
        /// Offending value.
        value: String,
    },
}

/// Settings shared by the query engine, backends, and orchestrator.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Home directory holding the repository list.
    pub home: PathBuf,
    /// Maximum number of names resolved or acquired at the same time.
    pub max_parallel: usize,
    /// Timeout applied to each HTTP request.
    pub http_timeout: Duration,
    /// User agent sent by the HTTP backend.
    pub user_agent: String,
}

impl EngineConfig {
    /// Defaults rooted at `home`.
    pub fn with_home(home: PathBuf) -> Self {
        Self {
            home,
            max_parallel: num_cpus::get().max(1),
            http_timeout: Duration::from_secs(60),
            user_agent: crate::USER_AGENT.to_string(),
        }
    }

    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NoHome`] if no home directory can be found, or
    /// [`ConfigError::InvalidNumber`] if a numeric variable is malformed.
    pub fn from_env() -> Result<Self, ConfigError> {
        let home = crate::paths::try_arca_home().ok_or(ConfigError::NoHome)?;
        let mut config = Self::with_home(home);

        if let Some(n) = read_positive("ARCA_MAX_PARALLEL")? {
            config.max_parallel = n;
        }
        if let Some(secs) = read_positive("ARCA_HTTP_TIMEOUT_SECS")? {
            config.http_timeout = Duration::from_secs(secs as u64);
        }

        Ok(config)
    }

    /// Path of the persisted repository list.
    pub fn repositories_path(&self) -> PathBuf {
        crate::paths::repositories_path(&self.home)
    }
}

fn read_positive(var: &'static str) -> Result<Option<usize>, ConfigError> {
    match std::env::var(var) {
        Ok(value) => parse_positive(var, &value).map(Some),
        Err(_) => Ok(None),
    }
}

fn parse_positive(var: &'static str, value: &str) -> Result<usize, ConfigError> {
    match value.trim().parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(ConfigError::InvalidNumber {
            var,
            value: value.to_string(),
        }),
    }
}
