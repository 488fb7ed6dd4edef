//! Package downloaders.
//!
//! [`PackageDownloader`] is the entry point: it selects a backend by
//! [`FeedType`] and returns uniform [`ArtifactMetadata`] whichever backend
//! ran. Backends drive external client tools through a [`CommandRunner`];
//! every collaborator and the per-call credentials are passed in explicitly.
//!
//! - [`container`] pulls images with the Docker client.
//! - [`helm`] fetches charts with the Helm client, using the local cache.

pub mod container;
pub mod helm;

use crate::command_line::CommandLineInvocation;
use crate::credentials::CredentialProvider;
use crate::error::{AcquireError, Result};
use crate::package::{ArtifactMetadata, PackageIdentifier};
use crate::process::{CommandRunner, ProcessOptions, ProcessResult};
use crate::retry::RetryPolicy;
use crate::script::ScriptEngine;
use camino::Utf8PathBuf;
use std::fmt;

pub use container::ContainerImageDownloader;
pub use helm::HelmChartDownloader;

/// Kind of feed a package comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeedType {
    /// A container registry.
    ContainerImage,
    /// A Helm chart repository.
    HelmChart,
}

impl fmt::Display for FeedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ContainerImage => f.write_str("container image"),
            Self::HelmChart => f.write_str("helm chart"),
        }
    }
}

/// One acquisition request.
pub struct DownloadRequest<'a> {
    /// What to acquire.
    pub package: PackageIdentifier,
    /// Source of feed credentials, consulted once per call.
    pub credentials: &'a dyn CredentialProvider,
    /// Skip the cache lookup and always run the backend.
    pub force_download: bool,
    /// Retry schedule applied to each retried tool step.
    pub retry: RetryPolicy,
}

impl fmt::Debug for DownloadRequest<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DownloadRequest")
            .field("package", &self.package)
            .field("force_download", &self.force_download)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

/// Collaborators shared by the backends.
#[derive(Clone)]
pub struct DownloadContext<'a> {
    /// Runs external tools.
    pub runner: &'a dyn CommandRunner,
    /// Runs helper scripts.
    pub scripts: &'a dyn ScriptEngine,
    /// Root of the package cache; each feed gets a subdirectory.
    pub cache_root: Utf8PathBuf,
}

impl fmt::Debug for DownloadContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DownloadContext")
            .field("cache_root", &self.cache_root)
            .finish_non_exhaustive()
    }
}

/// A downloader for one kind of feed.
#[derive(Debug)]
pub enum PackageDownloader<'a> {
    /// Pulls container images.
    ContainerImage(ContainerImageDownloader<'a>),
    /// Fetches Helm charts.
    HelmChart(HelmChartDownloader<'a>),
}

impl<'a> PackageDownloader<'a> {
    /// The downloader for `feed_type`.
    #[must_use]
    pub fn for_feed(feed_type: FeedType, context: &DownloadContext<'a>) -> Self {
        match feed_type {
            FeedType::ContainerImage => {
                Self::ContainerImage(ContainerImageDownloader::new(context.runner, context.scripts))
            }
            FeedType::HelmChart => {
                Self::HelmChart(HelmChartDownloader::new(context.runner, context.cache_root.clone()))
            }
        }
    }

    /// The feed type this downloader serves.
    #[must_use]
    pub const fn feed_type(&self) -> FeedType {
        match self {
            Self::ContainerImage(_) => FeedType::ContainerImage,
            Self::HelmChart(_) => FeedType::HelmChart,
        }
    }

    /// Acquire the requested package.
    ///
    /// # Errors
    ///
    /// Returns the first fatal failure of the backend, after any retries.
    pub fn download_package(&self, request: &DownloadRequest<'_>) -> Result<ArtifactMetadata> {
        log::info!("acquiring {} {}", self.feed_type(), request.package);
        match self {
            Self::ContainerImage(downloader) => downloader.download_package(request),
            Self::HelmChart(downloader) => downloader.download_package(request),
        }
    }
}

/// Run one tool step, turning hangs and non-zero exits into errors that name
/// the step.
pub(crate) fn invoke_tool(
    runner: &dyn CommandRunner,
    tool: &str,
    action: &str,
    invocation: &CommandLineInvocation,
    options: &ProcessOptions,
) -> Result<ProcessResult> {
    let result = runner.run(invocation, options)?;
    if result.forced_termination {
        return Err(AcquireError::ToolTimedOut {
            tool: tool.to_owned(),
            action: action.to_owned(),
            seconds: runner.timeout().as_secs(),
        });
    }
    if !result.succeeded() {
        return Err(AcquireError::ToolFailed {
            tool: tool.to_owned(),
            action: action.to_owned(),
            exit_code: result.exit_code,
            stderr: result.stderr.trim_end().to_owned(),
        });
    }
    Ok(result)
}
