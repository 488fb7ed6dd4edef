//! Package identity, artifact metadata, and the cache filename convention.
//!
//! Cached files are named `<id>-<version><extension>`. Because both ids and
//! versions may contain `-`, parsing a name back tries each split point and
//! prefers the one whose remainder is a valid semantic version.

use crate::error::Result;
use camino::Utf8Path;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;
use url::Url;

/// What to acquire and where from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageIdentifier {
    /// Package, image, or chart name.
    pub id: String,
    /// Requested version or tag.
    pub version: String,
    /// Identifier of the feed, used to partition the cache.
    pub feed_id: String,
    /// Location of the registry or chart repository.
    pub feed_uri: Url,
}

impl PackageIdentifier {
    /// Create an identifier, trimming surrounding whitespace from the names.
    #[must_use]
    pub fn new(id: &str, version: &str, feed_id: &str, feed_uri: Url) -> Self {
        Self {
            id: id.trim().to_owned(),
            version: version.trim().to_owned(),
            feed_id: feed_id.trim().to_owned(),
            feed_uri,
        }
    }
}

impl fmt::Display for PackageIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} v{} from {}", self.id, self.version, self.feed_uri)
    }
}

/// Uniform result of a successful acquisition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactMetadata {
    /// Package, image, or chart name.
    pub package_id: String,
    /// Acquired version.
    pub version: String,
    /// File extension including the dot, or empty for images.
    pub extension: String,
    /// Local file path or fully-qualified image reference.
    pub reference: String,
    /// Content hash reported by the tool or computed from the file.
    pub hash: String,
    /// Size in bytes; zero when it could not be determined.
    pub size: u64,
}

impl ArtifactMetadata {
    /// Describe a file on disk, hashing its contents with SHA-256.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::AcquireError::Io`] if the file cannot be read.
    pub fn from_file(path: &Utf8Path, package_id: &str, version: &str, extension: &str) -> Result<Self> {
        let mut file = std::fs::File::open(path)?;
        let mut hasher = Sha256::new();
        let size = std::io::copy(&mut file, &mut hasher)?;
        Ok(Self {
            package_id: package_id.to_owned(),
            version: version.to_owned(),
            extension: extension.to_owned(),
            reference: path.to_string(),
            hash: format!("{:x}", hasher.finalize()),
            size,
        })
    }
}

/// The `(id, version)` pair recovered from a cache filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedName {
    /// Package id as it appears in the file name.
    pub package_id: String,
    /// Version as it appears in the file name.
    pub version: String,
    /// Extension including the dot.
    pub extension: String,
}

/// Build the cache file name for a package.
///
/// ```
/// use stevedore_acquirer::package::cache_file_name;
///
/// assert_eq!(cache_file_name("nginx", "1.2.3", ".tgz"), "nginx-1.2.3.tgz");
/// ```
#[must_use]
pub fn cache_file_name(package_id: &str, version: &str, extension: &str) -> String {
    format!("{package_id}-{version}{extension}")
}

/// Glob patterns that pre-filter cache candidates for a package.
#[must_use]
pub fn cache_search_patterns(package_id: &str, version: &str, extensions: &[&str]) -> Vec<String> {
    extensions
        .iter()
        .map(|ext| {
            let name = cache_file_name(package_id, version, ext);
            glob::Pattern::escape(&name)
        })
        .collect()
}

/// Recover `(id, version)` from a cache file name ending in one of
/// `extensions`. Returns `None` when the name does not follow the convention.
///
/// The id is split off at the first `-` followed by a semantic version, or
/// failing that by a digit. When the expected `package_id` is known, a split
/// that yields it (compared case-insensitively) wins, so ids that themselves
/// end in a version still resolve.
///
/// ```
/// use stevedore_acquirer::package::parse_cache_file_name;
///
/// let name = parse_cache_file_name("foo-1.0.0-2.0.0.tgz", Some("foo-1.0.0"), &[".tgz"])
///     .expect("conventional name");
/// assert_eq!((name.package_id.as_str(), name.version.as_str()), ("foo-1.0.0", "2.0.0"));
/// ```
#[must_use]
pub fn parse_cache_file_name(file_name: &str, package_id: Option<&str>, extensions: &[&str]) -> Option<CachedName> {
    let (stem, extension) = extensions.iter().find_map(|ext| {
        let lower = file_name.to_ascii_lowercase();
        lower
            .ends_with(&ext.to_ascii_lowercase())
            .then(|| file_name.get(..file_name.len() - ext.len()))
            .flatten()
            .map(|stem| (stem, (*ext).to_owned()))
    })?;

    let splits: Vec<(&str, &str)> = stem
        .match_indices('-')
        .filter_map(|(at, _)| Some((stem.get(..at)?, stem.get(at + 1..)?)))
        .filter(|(id, version)| !id.is_empty() && !version.is_empty())
        .collect();

    let chosen = package_id
        .and_then(|wanted| splits.iter().find(|(id, _)| id.eq_ignore_ascii_case(wanted)))
        .or_else(|| {
            splits
                .iter()
                .find(|(_, version)| semver::Version::parse(version).is_ok())
        })
        .or_else(|| {
            splits
                .iter()
                .find(|(_, version)| version.starts_with(|c: char| c.is_ascii_digit()))
        })?;

    Some(CachedName {
        package_id: chosen.0.to_owned(),
        version: chosen.1.to_owned(),
        extension,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::simple("nginx-1.2.3.tgz", "nginx", "1.2.3")]
    #[case::dashed_id("my-pkg-1.2.3.tgz", "my-pkg", "1.2.3")]
    #[case::prerelease("my-pkg-1.2.3-beta.1.tgz", "my-pkg", "1.2.3-beta.1")]
    #[case::non_semver("redis-6.2.tgz", "redis", "6.2")]
    #[case::upper_extension("chart-0.1.0.TGZ", "chart", "0.1.0")]
    fn parses_cache_file_names(#[case] name: &str, #[case] id: &str, #[case] version: &str) {
        let parsed = parse_cache_file_name(name, None, &[".tgz"]).expect("name should parse");
        assert_eq!(parsed.package_id, id);
        assert_eq!(parsed.version, version);
    }

    #[rstest]
    #[case::versioned_id("foo-1.0.0-2.0.0.tgz", "foo-1.0.0", "foo-1.0.0", "2.0.0")]
    #[case::id_case_differs("Foo-1.0.0-2.0.0.tgz", "foo-1.0.0", "Foo-1.0.0", "2.0.0")]
    #[case::other_id_falls_back("foo-1.0.0-2.0.0.tgz", "bar", "foo", "1.0.0-2.0.0")]
    fn known_package_id_guides_the_split(
        #[case] name: &str,
        #[case] wanted: &str,
        #[case] id: &str,
        #[case] version: &str,
    ) {
        let parsed = parse_cache_file_name(name, Some(wanted), &[".tgz"]).expect("name should parse");
        assert_eq!(parsed.package_id, id);
        assert_eq!(parsed.version, version);
    }

    #[rstest]
    #[case::wrong_extension("nginx-1.2.3.zip")]
    #[case::no_version("nginx.tgz")]
    #[case::no_digits("nginx-latest.tgz")]
    #[case::leading_dash("-1.2.3.tgz")]
    fn rejects_names_outside_the_convention(#[case] name: &str) {
        assert_eq!(parse_cache_file_name(name, None, &[".tgz"]), None);
    }

    #[test]
    fn search_patterns_escape_glob_characters() {
        let patterns = cache_search_patterns("odd[name]", "1.0.0", &[".tgz"]);
        let pattern = glob::Pattern::new(&patterns.concat()).expect("valid pattern");
        assert!(pattern.matches("odd[name]-1.0.0.tgz"));
    }

    #[test]
    fn metadata_from_file_hashes_contents() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = camino::Utf8PathBuf::try_from(dir.path().join("nginx-1.0.0.tgz")).expect("utf-8 path");
        std::fs::write(&path, b"abc").expect("write");

        let meta = ArtifactMetadata::from_file(&path, "nginx", "1.0.0", ".tgz").expect("metadata");
        assert_eq!(meta.size, 3);
        assert_eq!(
            meta.hash,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(meta.reference, path.as_str());
    }

    #[test]
    fn identifier_trims_names() {
        let feed = Url::parse("https://charts.example.com").expect("url");
        let id = PackageIdentifier::new(" nginx ", " 1.0.0", "feeds-1 ", feed);
        assert_eq!(id.id, "nginx");
        assert_eq!(id.version, "1.0.0");
        assert_eq!(id.feed_id, "feeds-1");
    }
}
