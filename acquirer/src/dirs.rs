//! Platform directory resolution.
//!
//! Lookups go through the [`BaseDirs`] trait so callers can substitute fixed
//! directories in tests. [`SystemBaseDirs`] answers from `directories-next`.

use camino::Utf8PathBuf;
use std::path::PathBuf;

/// Application directory name under the platform data and config roots.
pub const APP_DIR: &str = "stevedore";

/// Name of the package cache below the application data directory.
pub const PACKAGES_DIR: &str = "packages";

/// Name of the configuration file below the application config directory.
pub const CONFIG_FILE: &str = "acquirer.toml";

/// Source of per-user base directories.
#[cfg_attr(test, mockall::automock)]
pub trait BaseDirs {
    /// The platform data directory (for example `~/.local/share`).
    fn data_dir(&self) -> Option<PathBuf>;

    /// The platform configuration directory (for example `~/.config`).
    fn config_dir(&self) -> Option<PathBuf>;
}

/// [`BaseDirs`] backed by the host platform's conventions.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemBaseDirs;

impl BaseDirs for SystemBaseDirs {
    fn data_dir(&self) -> Option<PathBuf> {
        directories_next::BaseDirs::new().map(|dirs| dirs.data_dir().to_path_buf())
    }

    fn config_dir(&self) -> Option<PathBuf> {
        directories_next::BaseDirs::new().map(|dirs| dirs.config_dir().to_path_buf())
    }
}

/// Default package cache root: `<data dir>/stevedore/packages`.
///
/// `None` when the platform has no data directory or it is not UTF-8.
#[must_use]
pub fn default_cache_root(dirs: &dyn BaseDirs) -> Option<Utf8PathBuf> {
    let path = dirs.data_dir()?.join(APP_DIR).join(PACKAGES_DIR);
    Utf8PathBuf::from_path_buf(path).ok()
}

/// Default configuration file: `<config dir>/stevedore/acquirer.toml`.
#[must_use]
pub fn default_config_file(dirs: &dyn BaseDirs) -> Option<Utf8PathBuf> {
    let path = dirs.config_dir()?.join(APP_DIR).join(CONFIG_FILE);
    Utf8PathBuf::from_path_buf(path).ok()
}
