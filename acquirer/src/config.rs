//! Acquirer configuration.
//!
//! Settings come from an optional TOML file. Every field has a default, so an
//! empty file (or no file at all) is valid. The cache root is resolved with
//! the precedence command-line flag, then `STEVEDORE_CACHE_DIR`, then the
//! file, then the platform data directory.
//!
//! ```toml
//! cache_root = "/var/cache/stevedore"
//!
//! [process]
//! timeout_secs = 30
//! poll_interval_millis = 250
//! warn_interval_secs = 10
//!
//! [retry]
//! max_attempts = 4
//! backoff_secs = 1
//! ```

use crate::dirs::{BaseDirs, default_cache_root, default_config_file};
use crate::error::{AcquireError, Result};
use crate::process::ProcessExecutor;
use crate::retry::RetryPolicy;
use camino::{Utf8Path, Utf8PathBuf};
use log::debug;
use serde::Deserialize;
use std::time::Duration;

/// Environment variable overriding the cache root.
pub const CACHE_DIR_ENV: &str = "STEVEDORE_CACHE_DIR";

/// Top-level configuration.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct AcquirerConfig {
    /// Root of the package cache.
    pub cache_root: Option<Utf8PathBuf>,
    /// External process limits.
    pub process: ProcessSettings,
    /// Retry schedule for tool steps.
    pub retry: RetrySettings,
}

/// The `[process]` table.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessSettings {
    /// Hang timeout per invocation.
    pub timeout_secs: u64,
    /// Interval between liveness checks.
    pub poll_interval_millis: u64,
    /// Interval between "still waiting" warnings.
    pub warn_interval_secs: u64,
}

impl Default for ProcessSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            poll_interval_millis: 250,
            warn_interval_secs: 10,
        }
    }
}

/// The `[retry]` table.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct RetrySettings {
    /// Attempts per step, including the first.
    pub max_attempts: u32,
    /// Linear backoff step.
    pub backoff_secs: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            backoff_secs: 1,
        }
    }
}

impl AcquirerConfig {
    /// Parse configuration text; `path` is only used in error messages.
    ///
    /// # Errors
    ///
    /// Returns [`AcquireError::Config`] for malformed TOML or unknown keys.
    pub fn from_toml(path: &Utf8Path, source: &str) -> Result<Self> {
        toml::from_str(source).map_err(|err| AcquireError::Config {
            path: path.to_owned(),
            reason: err.to_string(),
        })
    }

    /// Read and parse the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`AcquireError::Config`] if the file cannot be read or parsed.
    pub fn load(path: &Utf8Path) -> Result<Self> {
        let source = std::fs::read_to_string(path).map_err(|err| AcquireError::Config {
            path: path.to_owned(),
            reason: err.to_string(),
        })?;
        Self::from_toml(path, &source)
    }

    /// Load `explicit` if given; otherwise the platform default file when it
    /// exists; otherwise defaults.
    ///
    /// # Errors
    ///
    /// Returns [`AcquireError::Config`] if a selected file is unreadable or
    /// invalid. A missing default file is not an error.
    pub fn discover(explicit: Option<&Utf8Path>, dirs: &dyn BaseDirs) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        match default_config_file(dirs) {
            Some(path) if path.is_file() => {
                debug!("loading configuration from {path}");
                Self::load(&path)
            }
            _ => Ok(Self::default()),
        }
    }

    /// Resolve the cache root.
    ///
    /// # Errors
    ///
    /// Returns [`AcquireError::NoCacheRoot`] when no source yields a
    /// directory.
    pub fn resolve_cache_root(
        &self,
        flag: Option<&Utf8Path>,
        dirs: &dyn BaseDirs,
    ) -> Result<Utf8PathBuf> {
        flag.map(Utf8Path::to_owned)
            .or_else(cache_root_from_env)
            .or_else(|| self.cache_root.clone())
            .or_else(|| default_cache_root(dirs))
            .ok_or(AcquireError::NoCacheRoot)
    }

    /// A process executor with the configured limits.
    #[must_use]
    pub fn executor(&self) -> ProcessExecutor {
        ProcessExecutor::new(Duration::from_secs(self.process.timeout_secs))
            .with_poll_interval(Duration::from_millis(self.process.poll_interval_millis))
            .with_warn_interval(Duration::from_secs(self.process.warn_interval_secs))
    }

    /// The configured retry schedule.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::linear(
            self.retry.max_attempts,
            Duration::from_secs(self.retry.backoff_secs),
        )
    }
}

fn cache_root_from_env() -> Option<Utf8PathBuf> {
    std::env::var(CACHE_DIR_ENV)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .map(Utf8PathBuf::from)
}
