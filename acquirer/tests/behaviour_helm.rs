//! Behaviour tests for Helm chart acquisition against a scripted client.
//!
//! The Helm client is replaced by a `StubRunner` that answers an expected
//! sequence of invocations, so these scenarios run without Helm installed.

use camino::Utf8PathBuf;
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use std::time::Duration;
use stevedore_acquirer::credentials::Anonymous;
use stevedore_acquirer::downloader::{DownloadRequest, HelmChartDownloader};
use stevedore_acquirer::error::{AcquireError, Result as AcquireResult};
use stevedore_acquirer::package::{ArtifactMetadata, PackageIdentifier};
use stevedore_acquirer::retry::RetryPolicy;
use stevedore_acquirer::test_utils::{
    ExpectedCall, StubRunner, failure_result, hung_result, success_result,
};
use tempfile::TempDir;
use url::Url;

const FEED_ID: &str = "feeds-charts";
const VERSION_ARGS: [&str; 3] = ["version", "--client", "--short"];

struct HelmWorld {
    _temp_dir: TempDir,
    cache_root: Utf8PathBuf,
    runner: Option<StubRunner>,
    outcome: Option<AcquireResult<ArtifactMetadata>>,
}

#[fixture]
fn world() -> HelmWorld {
    let temp_dir = TempDir::new().expect("create temp dir");
    let cache_root = Utf8PathBuf::try_from(temp_dir.path().to_owned()).expect("UTF-8 temp dir");
    HelmWorld {
        _temp_dir: temp_dir,
        cache_root,
        runner: None,
        outcome: None,
    }
}

fn acquire(world: &mut HelmWorld, id: &str, version: &str, attempts: u32) {
    let runner = world.runner.as_ref().expect("helm client configured");
    let request = DownloadRequest {
        package: PackageIdentifier::new(
            id,
            version,
            FEED_ID,
            Url::parse("https://charts.example.com").expect("feed URL"),
        ),
        credentials: &Anonymous,
        force_download: false,
        retry: RetryPolicy::linear(attempts, Duration::ZERO),
    };
    let outcome = HelmChartDownloader::new(runner, world.cache_root.clone()).download_package(&request);
    world.outcome = Some(outcome);
}

#[given("a chart cache containing {name}")]
fn given_chart_cache(world: &mut HelmWorld, name: String) {
    let feed_dir = world.cache_root.join(FEED_ID);
    std::fs::create_dir_all(&feed_dir).expect("create feed dir");
    std::fs::write(feed_dir.join(name), b"cached chart").expect("write cached chart");
}

#[given("an empty chart cache")]
fn given_empty_chart_cache(world: &mut HelmWorld) {
    let _ = world;
}

#[given("a Helm client that expects no calls")]
fn given_silent_client(world: &mut HelmWorld) {
    world.runner = Some(StubRunner::new(Vec::new()));
}

#[given("a Helm client that cannot be started")]
fn given_missing_client(world: &mut HelmWorld) {
    world.runner = Some(StubRunner::new(vec![ExpectedCall::failing(
        "helm",
        &VERSION_ARGS,
        AcquireError::Spawn {
            program: "helm".to_owned(),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        },
    )]));
}

#[given("a Helm 3 client whose repository registration fails {count:u32} times")]
fn given_rejecting_repository(world: &mut HelmWorld, count: u32) {
    let mut calls = vec![ExpectedCall::new(
        "helm",
        &VERSION_ARGS,
        success_result("v3.0.1+g7c22ef9"),
    )];
    calls.extend(
        (0..count).map(|_| ExpectedCall::any_args("helm", failure_result("Error: 401 Unauthorized"))),
    );
    world.runner = Some(StubRunner::new(calls));
}

#[given("a Helm 2 client whose chart download hangs")]
fn given_hanging_fetch(world: &mut HelmWorld) {
    world.runner = Some(StubRunner::new(vec![
        ExpectedCall::new("helm", &VERSION_ARGS, success_result("Client: v2.16.1+gbbdfe5e")),
        ExpectedCall::any_args("helm", success_result("")),
        ExpectedCall::any_args("helm", success_result("")),
        ExpectedCall::any_args("helm", hung_result()),
    ]));
}

#[when("chart {id} version {version} is acquired")]
fn when_chart_acquired(world: &mut HelmWorld, id: String, version: String) {
    acquire(world, &id, &version, RetryPolicy::default().max_attempts());
}

#[when("chart {id} version {version} is requested with {attempts:u32} attempts")]
fn when_chart_requested(world: &mut HelmWorld, id: String, version: String, attempts: u32) {
    acquire(world, &id, &version, attempts);
}

#[then("the cached chart is returned")]
fn then_cached_chart_returned(world: &mut HelmWorld) {
    let outcome = world.outcome.as_ref().expect("acquisition ran");
    let meta = outcome.as_ref().expect("expected a cache hit");
    assert_eq!(
        meta.reference,
        world.cache_root.join(FEED_ID).join("nginx-1.2.3.tgz").as_str()
    );
    assert_eq!(meta.extension, ".tgz");
}

#[then("the acquisition fails mentioning {message}")]
fn then_acquisition_fails(world: &mut HelmWorld, message: String) {
    let outcome = world.outcome.as_ref().expect("acquisition ran");
    let err = outcome.as_ref().expect_err("expected acquisition to fail");
    assert!(err.to_string().contains(&message), "unexpected error: {err}");
}

#[then("every expected Helm call was made")]
fn then_calls_consumed(world: &mut HelmWorld) {
    world.runner.as_ref().expect("helm client configured").assert_finished();
}

#[scenario(
    path = "tests/features/helm.feature",
    name = "A cached chart skips the Helm client"
)]
fn scenario_cache_hit(world: HelmWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/helm.feature",
    name = "A missing Helm client is reported"
)]
fn scenario_missing_client(world: HelmWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/helm.feature",
    name = "A rejected repository is retried and then reported"
)]
fn scenario_rejected_repository(world: HelmWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/helm.feature",
    name = "A hung chart download is reported as a timeout"
)]
fn scenario_hung_download(world: HelmWorld) {
    let _ = world;
}
