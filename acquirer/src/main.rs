//! Stevedore acquirer CLI entrypoint.
//!
//! This binary acquires one container image or Helm chart and prints its
//! metadata to stdout. Progress and tool output are logged to stderr.

use clap::Parser;
use std::io::Write;
use stevedore_acquirer::cli::{Cli, Command, GlobalArgs, PackageArgs};
use stevedore_acquirer::config::AcquirerConfig;
use stevedore_acquirer::credentials::{Anonymous, CredentialProvider, Credentials, StaticCredentials};
use stevedore_acquirer::dirs::{BaseDirs, SystemBaseDirs};
use stevedore_acquirer::downloader::{DownloadContext, DownloadRequest, FeedType, PackageDownloader};
use stevedore_acquirer::error::Result;
use stevedore_acquirer::output::{format_human, format_json};
use stevedore_acquirer::package::PackageIdentifier;
use stevedore_acquirer::process::SystemCommandRunner;
use stevedore_acquirer::script::ShellScriptEngine;
use tracing_subscriber::EnvFilter;

/// Feed identifier recorded for images; registries are never cached locally.
const IMAGE_FEED_ID: &str = "registry";

fn main() {
    let cli = Cli::parse();
    init_logging(&cli.global);
    let mut stdout = std::io::stdout();
    let mut stderr = std::io::stderr();
    let run_result = run(&cli, &SystemBaseDirs, &mut stdout);
    let exit_code = exit_code_for_run_result(run_result, &mut stderr);
    if exit_code != 0 {
        std::process::exit(exit_code);
    }
}

fn run(cli: &Cli, dirs: &dyn BaseDirs, stdout: &mut dyn Write) -> Result<()> {
    let config = load_settings(&cli.global, dirs)?;
    let cache_root = config.resolve_cache_root(cli.global.cache_dir.as_deref(), dirs)?;

    let runner = SystemCommandRunner::new(config.executor());
    let scripts = ShellScriptEngine::new(&runner);
    let context = DownloadContext {
        runner: &runner,
        scripts: &scripts,
        cache_root,
    };

    let (feed_type, feed_id, args) = select_package(&cli.command);
    let provider = credential_provider(args);
    let request = DownloadRequest {
        package: PackageIdentifier::new(&args.id, &args.package_version, feed_id, args.feed.clone()),
        credentials: provider.as_ref(),
        force_download: args.force,
        retry: config.retry_policy(),
    };

    let metadata = PackageDownloader::for_feed(feed_type, &context).download_package(&request)?;
    let text = if cli.global.json {
        format_json(&metadata)
    } else {
        format_human(&metadata)
    };
    writeln!(stdout, "{text}")?;
    Ok(())
}

/// Loads the configuration file and applies command-line overrides.
fn load_settings(global: &GlobalArgs, dirs: &dyn BaseDirs) -> Result<AcquirerConfig> {
    let mut config = AcquirerConfig::discover(global.config.as_deref(), dirs)?;
    if let Some(attempts) = global.attempts {
        config.retry.max_attempts = attempts;
    }
    if let Some(secs) = global.backoff_secs {
        config.retry.backoff_secs = secs;
    }
    if let Some(secs) = global.timeout_secs {
        config.process.timeout_secs = secs;
    }
    Ok(config)
}

fn select_package(command: &Command) -> (FeedType, &str, &PackageArgs) {
    match command {
        Command::Image(args) => (FeedType::ContainerImage, IMAGE_FEED_ID, args),
        Command::Chart(args) => (FeedType::HelmChart, args.feed_id.as_str(), &args.package),
    }
}

fn credential_provider(args: &PackageArgs) -> Box<dyn CredentialProvider> {
    match &args.username {
        Some(username) => Box::new(StaticCredentials::new(Credentials::new(
            username.as_str(),
            args.password.clone().unwrap_or_default(),
        ))),
        None => Box::new(Anonymous),
    }
}

/// Explicit `-v`/`-q` flags win over `RUST_LOG`, which wins over the default.
fn log_filter(global: &GlobalArgs) -> EnvFilter {
    if global.quiet || global.verbosity > 0 {
        return EnvFilter::new(global.log_level());
    }
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(global.log_level()))
}

fn init_logging(global: &GlobalArgs) {
    let installed = tracing_subscriber::fmt()
        .with_env_filter(log_filter(global))
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
    if installed.is_err() {
        // A subscriber is already installed; keep it.
    }
}

fn exit_code_for_run_result(result: Result<()>, stderr: &mut dyn Write) -> i32 {
    match result {
        Ok(()) => 0,
        Err(err) => {
            write_stderr_line(stderr, err);
            1
        }
    }
}

fn write_stderr_line(stderr: &mut dyn Write, message: impl std::fmt::Display) {
    if writeln!(stderr, "{message}").is_err() {
        // Best-effort logging; ignore write failures.
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stevedore_acquirer::error::AcquireError;
    use url::Url;

    struct NoDirs;

    impl BaseDirs for NoDirs {
        fn data_dir(&self) -> Option<std::path::PathBuf> {
            None
        }

        fn config_dir(&self) -> Option<std::path::PathBuf> {
            None
        }
    }

    fn package_args(username: Option<&str>, password: Option<&str>) -> PackageArgs {
        PackageArgs {
            feed: Url::parse("https://charts.example.com").expect("url"),
            id: "nginx".to_owned(),
            package_version: "1.2.3".to_owned(),
            username: username.map(str::to_owned),
            password: password.map(str::to_owned),
            force: false,
        }
    }

    #[test]
    fn exit_code_for_run_result_returns_zero_on_success() {
        let mut stderr = Vec::new();
        let exit_code = exit_code_for_run_result(Ok(()), &mut stderr);
        assert_eq!(exit_code, 0);
        assert!(stderr.is_empty());
    }

    #[test]
    fn exit_code_for_run_result_prints_error_and_returns_one() {
        let err = AcquireError::StagingEmpty {
            dir: "/tmp/staging".into(),
        };

        let mut stderr = Vec::new();
        let exit_code = exit_code_for_run_result(Err(err), &mut stderr);
        assert_eq!(exit_code, 1);

        let stderr_text = String::from_utf8(stderr).expect("stderr was not UTF-8");
        assert!(stderr_text.contains("no chart was written to staging directory /tmp/staging"));
    }

    #[test]
    fn command_line_overrides_configuration() {
        let cli = Cli::parse_from([
            "stevedore-acquirer",
            "image",
            "--feed",
            "https://index.docker.io",
            "--id",
            "nginx",
            "--version",
            "1.21",
            "--attempts",
            "2",
            "--backoff-secs",
            "0",
            "--timeout-secs",
            "5",
        ]);
        let config = load_settings(&cli.global, &NoDirs).expect("settings");
        assert_eq!(config.retry_policy().max_attempts(), 2);
        assert_eq!(config.executor().timeout(), std::time::Duration::from_secs(5));
    }

    #[test]
    fn chart_command_selects_helm_backend_and_feed() {
        let cli = Cli::parse_from([
            "stevedore-acquirer",
            "chart",
            "--feed-id",
            "feeds-charts",
            "--feed",
            "https://charts.example.com",
            "--id",
            "nginx",
            "--version",
            "1.2.3",
        ]);
        let (feed_type, feed_id, args) = select_package(&cli.command);
        assert_eq!(feed_type, FeedType::HelmChart);
        assert_eq!(feed_id, "feeds-charts");
        assert_eq!(args.id, "nginx");
    }

    #[test]
    fn username_selects_static_credentials() {
        let feed = Url::parse("https://charts.example.com").expect("url");
        let provider = credential_provider(&package_args(Some("ci"), Some("hunter2")));
        let creds = provider.credential(&feed, "basic").expect("credentials");
        assert_eq!(creds.username(), "ci");
        assert_eq!(creds.password(), "hunter2");
    }

    #[test]
    fn missing_username_is_anonymous() {
        let feed = Url::parse("https://charts.example.com").expect("url");
        let provider = credential_provider(&package_args(None, Some("ignored")));
        assert!(provider.credential(&feed, "basic").is_none());
    }

    #[test]
    fn missing_cache_root_fails_before_running_tools() {
        let cli = temp_env::with_var_unset("STEVEDORE_CACHE_DIR", || {
            Cli::parse_from([
                "stevedore-acquirer",
                "image",
                "--feed",
                "https://index.docker.io",
                "--id",
                "nginx",
                "--version",
                "1.21",
            ])
        });
        let mut stdout = Vec::new();
        let err = temp_env::with_var_unset("STEVEDORE_CACHE_DIR", || run(&cli, &NoDirs, &mut stdout))
            .expect_err("no cache root");
        assert!(matches!(err, AcquireError::NoCacheRoot));
        assert!(stdout.is_empty());
    }
}
