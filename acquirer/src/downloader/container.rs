//! Container image acquisition through the Docker client.
//!
//! Images are always pulled; the registry and the local engine decide what
//! actually needs transferring, so no cache lookup happens here. Login and
//! pull run from an embedded helper script inside a per-call scratch
//! directory with `DOCKER_CONFIG` pointing into it, so registry credentials
//! are discarded with the directory.

use super::{DownloadRequest, invoke_tool};
use crate::command_line::CommandLine;
use crate::credentials::{Credentials, basic_credentials};
use crate::error::{AcquireError, Result};
use crate::fs::{ScratchDir, overwrite_file};
use crate::package::ArtifactMetadata;
use crate::process::{CommandRunner, ProcessOptions};
use crate::script::{Script, ScriptEngine, ScriptSyntax, Variables};
use log::{debug, info};
use std::fmt;
use url::Url;

/// Host name of the default public registry.
pub const DOCKER_HUB_REGISTRY: &str = "index.docker.io";

/// Client configuration directory, relative to the scratch directory.
pub const DOCKER_CONFIG_DIR: &str = "./octo-docker-configs";

const TOOL: &str = "Docker";
const PULL_SCRIPT_BASH: &str = include_str!("../../scripts/docker-pull.sh");
const PULL_SCRIPT_POWERSHELL: &str = include_str!("../../scripts/docker-pull.ps1");

/// Script variable holding the image reference.
pub const IMAGE_VARIABLE: &str = "STEVEDORE_IMAGE";
/// Script variable holding the registry host to log in to.
pub const FEED_HOST_VARIABLE: &str = "STEVEDORE_FEED_HOST";
/// Script variable holding the registry username.
pub const USERNAME_VARIABLE: &str = "STEVEDORE_USERNAME";
/// Script variable holding the registry password.
pub const PASSWORD_VARIABLE: &str = "STEVEDORE_PASSWORD";

/// Fully-qualified image reference for `id:version` on `feed`.
///
/// Images on the public registry are referenced by `id:version` alone;
/// elsewhere the registry authority and path prefix the name.
///
/// ```
/// use stevedore_acquirer::downloader::container::full_image_name;
/// use url::Url;
///
/// let hub = Url::parse("https://index.docker.io").expect("valid feed URI");
/// let name = full_image_name("nginx", "1.21", &hub).expect("hub has a host");
/// assert_eq!(name, "nginx:1.21");
///
/// let private = Url::parse("https://registry.example.com:5000/team/").expect("valid feed URI");
/// let name = full_image_name("nginx", "1.21", &private).expect("feed has a host");
/// assert_eq!(name, "registry.example.com:5000/team/nginx:1.21");
/// ```
///
/// # Errors
///
/// Returns [`AcquireError::InvalidFeedUri`] if the feed has no host.
pub fn full_image_name(id: &str, version: &str, feed: &Url) -> Result<String> {
    let host = feed_host_name(feed)?;
    if host == DOCKER_HUB_REGISTRY {
        return Ok(format!("{id}:{version}"));
    }
    let authority = match feed.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_owned(),
    };
    let path = feed.path().trim_end_matches('/');
    Ok(format!("{authority}{path}/{id}:{version}"))
}

/// Registry host used to scope `docker login`.
///
/// Empty for the public registry, the bare host when the port is 443, and
/// `host:port` otherwise.
///
/// # Errors
///
/// Returns [`AcquireError::InvalidFeedUri`] if the feed has no host.
pub fn feed_host(feed: &Url) -> Result<String> {
    let host = feed_host_name(feed)?;
    if host == DOCKER_HUB_REGISTRY {
        return Ok(String::new());
    }
    Ok(match feed.port_or_known_default() {
        Some(443) | None => host.to_owned(),
        Some(port) => format!("{host}:{port}"),
    })
}

fn feed_host_name(feed: &Url) -> Result<&str> {
    feed.host_str().ok_or_else(|| AcquireError::InvalidFeedUri {
        uri: feed.to_string(),
        reason: "a registry feed must name a host".to_owned(),
    })
}

/// Parse `docker inspect` output of the form `<hash> <size>`.
///
/// A size that cannot be parsed is logged and reported as zero.
///
/// # Errors
///
/// Returns [`AcquireError::ImageInspectFailed`] when no hash is present.
pub fn parse_inspect_output(image: &str, output: &str) -> Result<(String, u64)> {
    let mut fields = output
        .lines()
        .find(|line| !line.trim().is_empty())
        .unwrap_or_default()
        .split_whitespace();
    let hash = fields.next().ok_or_else(|| AcquireError::ImageInspectFailed {
        image: image.to_owned(),
        reason: "inspect produced no output".to_owned(),
    })?;
    let size = fields.next().and_then(|raw| raw.parse::<u64>().ok()).unwrap_or_else(|| {
        debug!("unable to parse image size for {image} ({hash})");
        0
    });
    Ok((hash.to_owned(), size))
}

/// Pulls container images.
#[derive(Clone, Copy)]
pub struct ContainerImageDownloader<'a> {
    runner: &'a dyn CommandRunner,
    scripts: &'a dyn ScriptEngine,
    syntax: ScriptSyntax,
}

impl fmt::Debug for ContainerImageDownloader<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContainerImageDownloader")
            .field("syntax", &self.syntax)
            .finish_non_exhaustive()
    }
}

impl<'a> ContainerImageDownloader<'a> {
    /// Create a downloader using the platform's preferred script dialect.
    #[must_use]
    pub fn new(runner: &'a dyn CommandRunner, scripts: &'a dyn ScriptEngine) -> Self {
        Self {
            runner,
            scripts,
            syntax: ScriptSyntax::preferred_for_environment(),
        }
    }

    /// Override the script dialect.
    #[must_use]
    pub const fn with_syntax(mut self, syntax: ScriptSyntax) -> Self {
        self.syntax = syntax;
        self
    }

    /// Pull the requested image and describe it.
    ///
    /// # Errors
    ///
    /// Returns [`AcquireError::ImagePullFailed`] (or a timeout) when the pull
    /// keeps failing and [`AcquireError::ImageInspectFailed`] when the pulled
    /// image cannot be inspected.
    pub fn download_package(&self, request: &DownloadRequest<'_>) -> Result<ArtifactMetadata> {
        let package = &request.package;
        let image = full_image_name(&package.id, &package.version, &package.feed_uri)?;
        let host = feed_host(&package.feed_uri)?;
        let credentials = basic_credentials(request.credentials, &package.feed_uri);

        let scratch = ScratchDir::new("stevedore-docker-")?;
        let options = ProcessOptions::in_dir(scratch.path()).with_env("DOCKER_CONFIG", DOCKER_CONFIG_DIR);

        info!("pulling image {image}");
        request.retry.run("pull the image", || {
            self.pull(&scratch, &options, &image, &host, credentials.as_ref())
        })?;
        let (hash, size) = self.inspect(&image, &options)?;
        scratch.close()?;

        Ok(ArtifactMetadata {
            package_id: package.id.clone(),
            version: package.version.clone(),
            extension: String::new(),
            reference: image,
            hash,
            size,
        })
    }

    fn pull(
        &self,
        scratch: &ScratchDir,
        options: &ProcessOptions,
        image: &str,
        host: &str,
        credentials: Option<&Credentials>,
    ) -> Result<()> {
        let script = self.write_pull_script(scratch)?;
        let mut variables = Variables::new();
        variables.set(IMAGE_VARIABLE, image);
        variables.set(FEED_HOST_VARIABLE, host);
        variables.set(USERNAME_VARIABLE, credentials.map(Credentials::username).unwrap_or_default());
        variables.set_sensitive(PASSWORD_VARIABLE, credentials.map(Credentials::password).unwrap_or_default());

        let result = self.scripts.execute(&script, &variables, options)?;
        if result.forced_termination {
            return Err(AcquireError::ToolTimedOut {
                tool: TOOL.to_owned(),
                action: "pull the image".to_owned(),
                seconds: self.runner.timeout().as_secs(),
            });
        }
        if !result.succeeded() {
            return Err(AcquireError::ImagePullFailed {
                image: image.to_owned(),
                exit_code: result.exit_code,
            });
        }
        Ok(())
    }

    fn write_pull_script(&self, scratch: &ScratchDir) -> Result<Script> {
        let body = match self.syntax {
            ScriptSyntax::Bash => PULL_SCRIPT_BASH,
            ScriptSyntax::PowerShell => PULL_SCRIPT_POWERSHELL,
        };
        let path = scratch
            .path()
            .join(format!("stevedore-docker-pull{}", self.syntax.extension()));
        overwrite_file(&path, body)?;
        Ok(Script::new(path, self.syntax))
    }

    fn inspect(&self, image: &str, options: &ProcessOptions) -> Result<(String, u64)> {
        let invocation = CommandLine::new("docker")
            .action("inspect")
            .argument("-format", "{{.Id}} {{.Size}}")
            .positional(image)
            .build()?;
        let result = invoke_tool(self.runner, TOOL, "inspect the image", &invocation, options)
            .map_err(|err| AcquireError::ImageInspectFailed {
                image: image.to_owned(),
                reason: err.to_string(),
            })?;
        parse_inspect_output(image, &result.stdout)
    }
}

#[cfg(test)]
#[path = "container_tests.rs"]
mod tests;
