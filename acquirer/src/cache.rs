//! Local package cache lookup.
//!
//! The cache is a directory per feed holding files named by
//! [`crate::package::cache_file_name`]. Lookup only reads; files are placed
//! there by the downloaders after a successful fetch.

use crate::error::Result;
use crate::fs::enumerate_files_recursively;
use crate::package::{ArtifactMetadata, cache_search_patterns, parse_cache_file_name};
use camino::{Utf8Path, Utf8PathBuf};
use log::debug;

/// Cache directory for packages from `feed_id`.
///
/// ```
/// use camino::Utf8Path;
/// use stevedore_acquirer::cache::package_root;
///
/// let root = package_root(Utf8Path::new("/var/cache/stevedore"), "feeds-charts");
/// assert_eq!(root, Utf8Path::new("/var/cache/stevedore/feeds-charts"));
/// ```
#[must_use]
pub fn package_root(cache_root: &Utf8Path, feed_id: &str) -> Utf8PathBuf {
    cache_root.join(feed_id)
}

/// Find a cached artifact for `package_id` at exactly `version`.
///
/// Candidates are files below `cache_dir` whose names match the cache
/// convention for one of `extensions`. The first candidate whose parsed id
/// matches case-insensitively and whose version matches exactly is returned.
/// Files whose names cannot be parsed are skipped. A missing cache directory
/// is treated as empty.
///
/// # Errors
///
/// Returns an error if the directory walk fails or a matching file cannot be
/// read for hashing.
pub fn find_cached(
    cache_dir: &Utf8Path,
    package_id: &str,
    version: &str,
    extensions: &[&str],
) -> Result<Option<ArtifactMetadata>> {
    debug!("checking package cache for package {package_id} v{version}");
    if !cache_dir.is_dir() {
        return Ok(None);
    }

    let patterns = cache_search_patterns(package_id, version, extensions);
    for file in enumerate_files_recursively(cache_dir, &patterns)? {
        let Some(name) = file
            .file_name()
            .and_then(|name| parse_cache_file_name(name, Some(package_id), extensions))
        else {
            debug!("skipping cache entry with unrecognised name: {file}");
            continue;
        };

        if name.package_id.eq_ignore_ascii_case(package_id) && name.version == version {
            let meta = ArtifactMetadata::from_file(&file, &name.package_id, &name.version, &name.extension)?;
            return Ok(Some(meta));
        }
    }
    Ok(None)
}
