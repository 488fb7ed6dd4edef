//! CLI argument definitions for the acquirer.
//!
//! This module defines the command-line interface using clap. It is separated
//! from the main entrypoint so the parsing rules can be tested directly.

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use url::Url;

/// Environment variable read for `--password`.
pub const PASSWORD_ENV: &str = "STEVEDORE_FEED_PASSWORD";

/// Acquire container images and Helm charts by driving their client tools.
#[derive(Parser, Debug)]
#[command(name = "stevedore-acquirer")]
#[command(version, about)]
#[command(long_about = concat!(
    "Acquire container images and Helm charts by driving their client tools.\n\n",
    "Images are pulled with the local Docker client and described by hash and ",
    "size. Charts are fetched with the Helm client (2 or 3, detected at run ",
    "time) into a per-feed package cache, which is consulted first unless ",
    "--force is given.\n\n",
    "Each tool step is retried with a linear backoff and killed if it hangs.",
))]
#[command(after_help = concat!(
    "EXAMPLES:\n",
    "  Pull an image from Docker Hub:\n",
    "    $ stevedore-acquirer image --feed https://index.docker.io --id nginx --version 1.21\n\n",
    "  Fetch a chart from a private repository:\n",
    "    $ STEVEDORE_FEED_PASSWORD=... stevedore-acquirer chart --feed-id charts \\\n",
    "        --feed https://charts.example.com --id nginx --version 1.2.3 --username ci\n",
))]
pub struct Cli {
    /// Kind of package to acquire.
    #[command(subcommand)]
    pub command: Command,

    /// Settings shared by every subcommand.
    #[command(flatten)]
    pub global: GlobalArgs,
}

/// Available subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Pull a container image.
    Image(PackageArgs),

    /// Fetch a Helm chart into the package cache.
    Chart(ChartArgs),
}

/// Identifies the package and how to reach its feed.
#[derive(Args, Debug, Clone)]
pub struct PackageArgs {
    /// Feed URI (registry or chart repository).
    #[arg(long, value_name = "URI")]
    pub feed: Url,

    /// Package, image, or chart name.
    #[arg(long, value_name = "ID")]
    pub id: String,

    /// Version (or tag) to acquire.
    #[arg(long = "version", value_name = "VERSION")]
    pub package_version: String,

    /// Feed username.
    #[arg(long, value_name = "NAME")]
    pub username: Option<String>,

    /// Feed password.
    #[arg(long, value_name = "SECRET", env = PASSWORD_ENV, hide_env_values = true)]
    pub password: Option<String>,

    /// Skip the cache lookup and always download.
    #[arg(long)]
    pub force: bool,
}

/// Arguments for the chart command.
#[derive(Args, Debug, Clone)]
pub struct ChartArgs {
    /// Feed identifier; names the feed's cache directory.
    #[arg(long, value_name = "FEED")]
    pub feed_id: String,

    /// Package and feed.
    #[command(flatten)]
    pub package: PackageArgs,
}

/// Settings that apply to every subcommand.
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Configuration file [default: platform config dir].
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<Utf8PathBuf>,

    /// Package cache root [default: platform data dir].
    #[arg(long, global = true, value_name = "DIR")]
    pub cache_dir: Option<Utf8PathBuf>,

    /// Attempts per tool step, including the first.
    #[arg(long, global = true, value_name = "N")]
    pub attempts: Option<u32>,

    /// Linear backoff step between attempts.
    #[arg(long, global = true, value_name = "SECS")]
    pub backoff_secs: Option<u64>,

    /// Hang timeout for each tool invocation.
    #[arg(long, global = true, value_name = "SECS")]
    pub timeout_secs: Option<u64>,

    /// Print the artifact metadata as JSON.
    #[arg(long, global = true)]
    pub json: bool,

    /// Increase log verbosity (repeatable: -v, -vv).
    #[arg(
        short,
        long = "verbose",
        global = true,
        action = clap::ArgAction::Count,
        conflicts_with = "quiet"
    )]
    pub verbosity: u8,

    /// Only log errors.
    #[arg(short, long, global = true, conflicts_with = "verbosity")]
    pub quiet: bool,
}

impl Command {
    /// The package arguments of either subcommand.
    #[must_use]
    pub fn package(&self) -> &PackageArgs {
        match self {
            Self::Image(args) => args,
            Self::Chart(args) => &args.package,
        }
    }
}

impl GlobalArgs {
    /// Default log filter directive for the chosen verbosity.
    ///
    /// ```
    /// use stevedore_acquirer::cli::GlobalArgs;
    ///
    /// let args = GlobalArgs { verbosity: 1, ..GlobalArgs::default() };
    /// assert_eq!(args.log_level(), "debug");
    /// ```
    #[must_use]
    pub fn log_level(&self) -> &'static str {
        match (self.quiet, self.verbosity) {
            (true, _) => "error",
            (false, 0) => "info",
            (false, 1) => "debug",
            (false, _) => "trace",
        }
    }
}

#[cfg(test)]
#[path = "cli_tests.rs"]
mod tests;
