//! Behaviour tests for container image naming.

use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use stevedore_acquirer::downloader::container::{feed_host, full_image_name};
use url::Url;

#[derive(Default)]
struct ImageWorld {
    feed: Option<Url>,
    reference: Option<String>,
    host: Option<String>,
}

#[fixture]
fn world() -> ImageWorld {
    ImageWorld::default()
}

#[given("the registry feed {uri}")]
fn given_registry_feed(world: &mut ImageWorld, uri: String) {
    world.feed = Some(Url::parse(&uri).expect("valid feed URI"));
}

#[when("the image {id} with tag {tag} is named")]
fn when_image_named(world: &mut ImageWorld, id: String, tag: String) {
    let feed = world.feed.as_ref().expect("feed configured");
    world.reference = Some(full_image_name(&id, &tag, feed).expect("image name"));
    world.host = Some(feed_host(feed).expect("login host"));
}

#[then("the image reference is {expected}")]
fn then_image_reference(world: &mut ImageWorld, expected: String) {
    assert_eq!(world.reference.as_deref(), Some(expected.as_str()));
}

#[then("the login host is {expected}")]
fn then_login_host(world: &mut ImageWorld, expected: String) {
    assert_eq!(world.host.as_deref(), Some(expected.as_str()));
}

#[then("no login host is used")]
fn then_no_login_host(world: &mut ImageWorld) {
    assert_eq!(world.host.as_deref(), Some(""));
}

#[scenario(
    path = "tests/features/image.feature",
    name = "Docker Hub images use the short name"
)]
fn scenario_docker_hub(world: ImageWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/image.feature",
    name = "Private registries prefix the host, port and path"
)]
fn scenario_private_registry(world: ImageWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/image.feature",
    name = "The default HTTPS port is omitted from the login host"
)]
fn scenario_default_port(world: ImageWorld) {
    let _ = world;
}
