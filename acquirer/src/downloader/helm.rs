//! Helm chart acquisition.
//!
//! The client version is detected once per call and selects a command
//! sequence. Helm 2 needs an explicit `init` of a private home directory
//! before `repo add` and `fetch`; Helm 3 runs `repo add` and `pull` with its
//! configuration, cache, and data directories redirected into the call's
//! scratch directory. Either way the repository registration, including any
//! credentials, is discarded with that directory.
//!
//! The chart lands in a staging directory and is then moved into the feed's
//! cache directory as `<id>-<version>.tgz`.

use super::{DownloadRequest, invoke_tool};
use crate::cache::{find_cached, package_root};
use crate::command_line::{CommandLine, CommandLineInvocation};
use crate::credentials::{Credentials, basic_credentials};
use crate::error::{AcquireError, Result};
use crate::fs::{ScratchDir, ensure_dir, move_file};
use crate::package::{ArtifactMetadata, cache_file_name};
use crate::process::{CommandRunner, ProcessOptions};
use camino::{Utf8Path, Utf8PathBuf};
use log::{debug, info, warn};
use std::fmt;

/// Extension of chart archives.
pub const CHART_EXTENSION: &str = ".tgz";

/// Name under which the feed is registered for the duration of a call.
pub const TEMP_REPO_NAME: &str = "stevedorefeed";

const HELM: &str = "helm";
const TOOL: &str = "Helm";

/// Major version family of the Helm client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HelmVersion {
    /// Helm 2, which needs a client-side `init`.
    V2,
    /// Helm 3.
    V3,
}

impl HelmVersion {
    /// Classify `helm version --client --short` output.
    ///
    /// The first `v` followed by a digit is taken as the version marker; `3`
    /// selects [`HelmVersion::V3`] and anything else [`HelmVersion::V2`].
    ///
    /// ```
    /// use stevedore_acquirer::downloader::helm::HelmVersion;
    ///
    /// assert_eq!(HelmVersion::parse("Client: v2.16.1+gbbdfe5e"), HelmVersion::V2);
    /// assert_eq!(HelmVersion::parse("v3.0.1+g7c22ef9"), HelmVersion::V3);
    /// ```
    #[must_use]
    pub fn parse(output: &str) -> Self {
        let major = output
            .char_indices()
            .filter(|&(_, c)| c == 'v')
            .find_map(|(at, _)| {
                output
                    .get(at + 1..)
                    .and_then(|rest| rest.chars().next())
                    .filter(char::is_ascii_digit)
            });
        match major {
            Some('3') => Self::V3,
            Some(_) => Self::V2,
            None => {
                debug!("no version marker in helm output {output:?}; assuming Helm 2");
                Self::V2
            }
        }
    }

    /// The command sequence that stages `fetch.chart` into `fetch.staging`.
    ///
    /// # Errors
    ///
    /// Propagates command-line construction errors.
    pub fn command_sequence(self, fetch: &ChartFetch<'_>) -> Result<Vec<HelmStep>> {
        let chart_ref = format!("{TEMP_REPO_NAME}/{}", fetch.chart);
        let steps = match self {
            Self::V2 => vec![
                HelmStep::new(
                    "initialise",
                    CommandLine::new(HELM)
                        .action("init")
                        .argument("-home", fetch.home)
                        .flag("-client-only")
                        .flag("-debug"),
                )?,
                HelmStep::new(
                    "add the chart repository",
                    with_credentials(
                        CommandLine::new(HELM)
                            .action("repo")
                            .positional("add")
                            .argument("-home", fetch.home),
                        fetch.credentials,
                    )
                    .flag("-debug")
                    .positional(TEMP_REPO_NAME)
                    .positional(fetch.repository),
                )?,
                HelmStep::new(
                    "download the chart",
                    CommandLine::new(HELM)
                        .action("fetch")
                        .argument("-home", fetch.home)
                        .argument("-version", fetch.version)
                        .argument("-destination", fetch.staging)
                        .flag("-debug")
                        .positional(&chart_ref),
                )?,
            ],
            Self::V3 => vec![
                HelmStep::new(
                    "add the chart repository",
                    with_credentials(
                        CommandLine::new(HELM).action("repo").positional("add"),
                        fetch.credentials,
                    )
                    .positional(TEMP_REPO_NAME)
                    .positional(fetch.repository),
                )?,
                HelmStep::new(
                    "download the chart",
                    CommandLine::new(HELM)
                        .action("pull")
                        .argument("-version", fetch.version)
                        .argument("-destination", fetch.staging)
                        .positional(&chart_ref),
                )?,
            ],
        };
        Ok(steps)
    }

    /// Process options for the sequence's invocations.
    #[must_use]
    pub fn process_options(self, scratch: &Utf8Path, home: &Utf8Path) -> ProcessOptions {
        let options = ProcessOptions::in_dir(scratch);
        match self {
            Self::V2 => options,
            Self::V3 => options
                .with_env("HELM_CONFIG_HOME", home.join("config").as_str())
                .with_env("HELM_CACHE_HOME", home.join("cache").as_str())
                .with_env("HELM_DATA_HOME", home.join("data").as_str()),
        }
    }
}

impl fmt::Display for HelmVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::V2 => f.write_str("Helm 2"),
            Self::V3 => f.write_str("Helm 3"),
        }
    }
}

fn with_credentials(cmd: CommandLine, credentials: Option<&Credentials>) -> CommandLine {
    match credentials {
        Some(creds) => cmd
            .argument("-username", creds.username())
            .secret_argument("-password", creds.password()),
        None => cmd,
    }
}

/// Inputs to a chart command sequence.
#[derive(Debug, Clone, Copy)]
pub struct ChartFetch<'a> {
    /// Chart repository URL.
    pub repository: &'a str,
    /// Chart name.
    pub chart: &'a str,
    /// Chart version.
    pub version: &'a str,
    /// Private Helm home directory.
    pub home: &'a Utf8Path,
    /// Directory the chart is downloaded into.
    pub staging: &'a Utf8Path,
    /// Repository credentials, if any.
    pub credentials: Option<&'a Credentials>,
}

/// One retried invocation in a chart command sequence.
#[derive(Debug, Clone)]
pub struct HelmStep {
    /// What the step does, phrased to follow "failed to".
    pub action: &'static str,
    /// The invocation.
    pub invocation: CommandLineInvocation,
}

impl HelmStep {
    fn new(action: &'static str, cmd: CommandLine) -> Result<Self> {
        Ok(Self {
            action,
            invocation: cmd.build()?,
        })
    }
}

/// Fetches Helm charts into the package cache.
#[derive(Clone)]
pub struct HelmChartDownloader<'a> {
    runner: &'a dyn CommandRunner,
    cache_root: Utf8PathBuf,
}

impl fmt::Debug for HelmChartDownloader<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HelmChartDownloader")
            .field("cache_root", &self.cache_root)
            .finish_non_exhaustive()
    }
}

impl<'a> HelmChartDownloader<'a> {
    /// Create a downloader caching charts below `cache_root`.
    #[must_use]
    pub fn new(runner: &'a dyn CommandRunner, cache_root: Utf8PathBuf) -> Self {
        Self { runner, cache_root }
    }

    /// Return the cached chart, or fetch it.
    ///
    /// # Errors
    ///
    /// Returns [`AcquireError::ToolUnavailable`] when Helm cannot report its
    /// version, the last error of any step that keeps failing, and
    /// [`AcquireError::StagingEmpty`] when Helm reports success without
    /// producing a chart.
    pub fn download_package(&self, request: &DownloadRequest<'_>) -> Result<ArtifactMetadata> {
        let package = &request.package;
        let cache_dir = package_root(&self.cache_root, &package.feed_id);
        ensure_dir(&cache_dir)?;

        if !request.force_download {
            if let Some(hit) = find_cached(&cache_dir, &package.id, &package.version, &[CHART_EXTENSION])? {
                info!(
                    "package was found in cache; no need to download. Using file: '{}'",
                    hit.reference
                );
                return Ok(hit);
            }
        }

        self.download_chart(request, &cache_dir)
    }

    fn download_chart(&self, request: &DownloadRequest<'_>, cache_dir: &Utf8Path) -> Result<ArtifactMetadata> {
        let package = &request.package;
        let credentials = basic_credentials(request.credentials, &package.feed_uri);

        let scratch = ScratchDir::new("stevedore-helm-")?;
        let home = scratch.subdir("helm")?;
        let staging = scratch.subdir("staging")?;

        let version = self.detect_version(scratch.path())?;
        info!("using {version} to download {} v{}", package.id, package.version);

        let repository = package.feed_uri.as_str();
        let fetch = ChartFetch {
            repository,
            chart: &package.id,
            version: &package.version,
            home: &home,
            staging: &staging,
            credentials: credentials.as_ref(),
        };
        let options = version.process_options(scratch.path(), &home);
        for step in version.command_sequence(&fetch)? {
            request.retry.run(step.action, || {
                invoke_tool(self.runner, TOOL, step.action, &step.invocation, &options)
            })?;
        }

        let staged = single_staged_file(&staging)?;
        let destination = cache_dir.join(cache_file_name(&package.id, &package.version, CHART_EXTENSION));
        move_file(&staged, &destination)?;
        scratch.close()?;

        ArtifactMetadata::from_file(&destination, &package.id, &package.version, CHART_EXTENSION)
    }

    fn detect_version(&self, dir: &Utf8Path) -> Result<HelmVersion> {
        let unavailable = |reason: String| AcquireError::ToolUnavailable {
            tool: HELM.to_owned(),
            reason,
        };
        let invocation = CommandLine::new(HELM)
            .action("version")
            .flag("-client")
            .flag("-short")
            .build()?;
        let result = invoke_tool(
            self.runner,
            TOOL,
            "report its version",
            &invocation,
            &ProcessOptions::in_dir(dir),
        )
        .map_err(|err| {
            debug!("helm version check failed: {err}");
            unavailable(err.to_string())
        })?;
        Ok(HelmVersion::parse(&result.stdout))
    }
}

fn single_staged_file(staging: &Utf8Path) -> Result<Utf8PathBuf> {
    let mut files = Vec::new();
    for entry in staging.read_dir_utf8()? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            files.push(entry.into_path());
        }
    }
    files.sort();
    if files.len() > 1 {
        warn!("expected one chart in {staging}, found {}; using the first", files.len());
    }
    files.into_iter().next().ok_or_else(|| AcquireError::StagingEmpty {
        dir: staging.to_owned(),
    })
}

#[cfg(test)]
#[path = "helm_tests.rs"]
mod tests;
