//! File-system helpers used by the downloaders.
//!
//! Paths are UTF-8 throughout; entries discovered on disk that are not valid
//! UTF-8 are reported as [`AcquireError::NonUtf8Path`].

use crate::error::{AcquireError, Result};
use camino::{Utf8Path, Utf8PathBuf};
use glob::{MatchOptions, Pattern};
use log::debug;
use walkdir::WalkDir;

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: false,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Create `dir` and any missing parents.
///
/// # Errors
///
/// Returns [`AcquireError::Io`] if the directory cannot be created.
pub fn ensure_dir(dir: &Utf8Path) -> Result<()> {
    std::fs::create_dir_all(dir)?;
    Ok(())
}

/// Write `content` to `path`, replacing any existing file.
///
/// # Errors
///
/// Returns [`AcquireError::Io`] if the file cannot be written.
pub fn overwrite_file(path: &Utf8Path, content: &str) -> Result<()> {
    std::fs::write(path, content)?;
    Ok(())
}

/// Move `src` to `dst`, replacing `dst` if it exists.
///
/// A rename is attempted first. When it fails (typically because the paths
/// are on different file systems) the file is copied and the source removed.
///
/// # Errors
///
/// Returns [`AcquireError::Io`] if both the rename and the copy fail, or the
/// source cannot be removed after copying.
pub fn move_file(src: &Utf8Path, dst: &Utf8Path) -> Result<()> {
    if let Some(parent) = dst.parent() {
        ensure_dir(parent)?;
    }
    if let Err(err) = std::fs::rename(src, dst) {
        debug!("rename {src} -> {dst} failed ({err}); copying instead");
        std::fs::copy(src, dst)?;
        std::fs::remove_file(src)?;
    }
    Ok(())
}

/// List files below `dir` whose names match any of `patterns`.
///
/// Patterns are shell globs matched case-insensitively against the file name
/// only. Invalid patterns are skipped. Results are sorted so callers see a
/// stable order.
///
/// # Errors
///
/// Returns [`AcquireError::CacheScan`] if the walk fails and
/// [`AcquireError::NonUtf8Path`] for entries that are not valid UTF-8.
pub fn enumerate_files_recursively(dir: &Utf8Path, patterns: &[String]) -> Result<Vec<Utf8PathBuf>> {
    let compiled: Vec<Pattern> = patterns
        .iter()
        .filter_map(|p| match Pattern::new(p) {
            Ok(pattern) => Some(pattern),
            Err(err) => {
                debug!("ignoring invalid file pattern {p:?}: {err}");
                None
            }
        })
        .collect();

    let mut files = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).follow_links(false) {
        let entry = entry.map_err(|source| AcquireError::CacheScan {
            dir: dir.to_owned(),
            source,
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let matched = entry.file_name().to_str().is_some_and(|name| {
            compiled
                .iter()
                .any(|pattern| pattern.matches_with(name, MATCH_OPTIONS))
        });
        if matched {
            let path = Utf8PathBuf::from_path_buf(entry.into_path()).map_err(AcquireError::NonUtf8Path)?;
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// A call-scoped temporary directory, removed when dropped.
#[derive(Debug)]
pub struct ScratchDir {
    inner: tempfile::TempDir,
    path: Utf8PathBuf,
}

impl ScratchDir {
    /// Create a fresh directory under the system temporary location.
    ///
    /// # Errors
    ///
    /// Returns [`AcquireError::Io`] if the directory cannot be created and
    /// [`AcquireError::NonUtf8Path`] if its path is not valid UTF-8.
    pub fn new(prefix: &str) -> Result<Self> {
        let inner = tempfile::Builder::new().prefix(prefix).tempdir()?;
        let path = Utf8PathBuf::from_path_buf(inner.path().to_owned()).map_err(AcquireError::NonUtf8Path)?;
        Ok(Self { inner, path })
    }

    /// Path of the directory.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Create (if needed) and return a subdirectory.
    ///
    /// # Errors
    ///
    /// Returns [`AcquireError::Io`] if the subdirectory cannot be created.
    pub fn subdir(&self, name: &str) -> Result<Utf8PathBuf> {
        let dir = self.path.join(name);
        ensure_dir(&dir)?;
        Ok(dir)
    }

    /// Delete the directory now, reporting any failure.
    ///
    /// # Errors
    ///
    /// Returns [`AcquireError::Io`] if removal fails.
    pub fn close(self) -> Result<()> {
        self.inner.close()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn utf8_tempdir() -> (tempfile::TempDir, Utf8PathBuf) {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = Utf8PathBuf::try_from(dir.path().to_owned()).expect("utf-8 temp dir");
        (dir, path)
    }

    #[test]
    fn move_file_creates_destination_parent() {
        let (_guard, root) = utf8_tempdir();
        let src = root.join("staging").join("chart.tgz");
        ensure_dir(&root.join("staging")).expect("staging dir");
        overwrite_file(&src, "chart").expect("write chart");

        let dst = root.join("cache").join("feed").join("chart-1.0.0.tgz");
        move_file(&src, &dst).expect("move should succeed");

        assert!(!src.exists());
        assert_eq!(std::fs::read_to_string(&dst).expect("read"), "chart");
    }

    #[test]
    fn move_file_replaces_existing_destination() {
        let (_guard, root) = utf8_tempdir();
        let src = root.join("new.tgz");
        let dst = root.join("old.tgz");
        overwrite_file(&src, "new").expect("write new");
        overwrite_file(&dst, "old").expect("write old");

        move_file(&src, &dst).expect("move should succeed");
        assert_eq!(std::fs::read_to_string(&dst).expect("read"), "new");
    }

    #[rstest]
    #[case::exact(&["nginx-1.2.3.tgz"], 1)]
    #[case::case_insensitive(&["NGINX-1.2.3.TGZ"], 1)]
    #[case::wildcard(&["nginx-*.tgz"], 2)]
    #[case::no_match(&["redis-*.tgz"], 0)]
    fn enumerate_matches_file_names_recursively(#[case] patterns: &[&str], #[case] expected: usize) {
        let (_guard, root) = utf8_tempdir();
        ensure_dir(&root.join("nested")).expect("nested dir");
        overwrite_file(&root.join("nginx-1.2.3.tgz"), "").expect("write");
        overwrite_file(&root.join("nested").join("nginx-1.2.4.tgz"), "").expect("write");
        overwrite_file(&root.join("nginx-1.2.3.zip"), "").expect("write");

        let patterns: Vec<String> = patterns.iter().map(|p| (*p).to_owned()).collect();
        let files = enumerate_files_recursively(&root, &patterns).expect("scan should succeed");
        assert_eq!(files.len(), expected);
    }

    #[test]
    fn enumerate_missing_directory_is_a_scan_error() {
        let (_guard, root) = utf8_tempdir();
        let err = enumerate_files_recursively(&root.join("absent"), &["*".to_owned()])
            .expect_err("missing dir should fail");
        assert!(matches!(err, AcquireError::CacheScan { .. }));
    }

    #[test]
    fn scratch_dir_is_removed_on_drop() {
        let scratch = ScratchDir::new("stevedore-test").expect("scratch dir");
        let path = scratch.path().to_owned();
        let staging = scratch.subdir("staging").expect("subdir");
        assert!(staging.is_dir());
        drop(scratch);
        assert!(!path.exists());
    }
}
