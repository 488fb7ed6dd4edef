//! Feed credentials.
//!
//! Credentials are looked up per acquisition through a [`CredentialProvider`]
//! and passed down explicitly. Passwords stay wrapped in
//! [`secrecy::SecretString`] until the moment they are handed to a tool.

use secrecy::{ExposeSecret, SecretString};
use url::Url;

/// Authentication scheme requested from providers by the downloaders.
pub const BASIC_SCHEME: &str = "basic";

/// A username and password for a feed.
#[derive(Debug)]
pub struct Credentials {
    username: String,
    password: SecretString,
}

impl Credentials {
    /// Create a credential pair.
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: SecretString::from(password.into()),
        }
    }

    /// The username.
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    /// The password, exposed for handing to a tool.
    #[must_use]
    pub fn password(&self) -> &str {
        self.password.expose_secret()
    }

    /// True when there is no username to authenticate with.
    #[must_use]
    pub fn is_anonymous(&self) -> bool {
        self.username.trim().is_empty()
    }

    fn duplicate(&self) -> Self {
        Self::new(self.username.clone(), self.password.expose_secret().to_owned())
    }
}

/// Supplies credentials for a feed.
pub trait CredentialProvider {
    /// Credentials for `feed` under `scheme`, or `None` for anonymous access.
    fn credential(&self, feed: &Url, scheme: &str) -> Option<Credentials>;
}

/// Provider that never returns credentials.
#[derive(Debug, Clone, Copy, Default)]
pub struct Anonymous;

impl CredentialProvider for Anonymous {
    fn credential(&self, _feed: &Url, _scheme: &str) -> Option<Credentials> {
        None
    }
}

/// Provider that returns the same credentials for every feed.
#[derive(Debug)]
pub struct StaticCredentials {
    credentials: Credentials,
}

impl StaticCredentials {
    /// Wrap a fixed credential pair.
    #[must_use]
    pub fn new(credentials: Credentials) -> Self {
        Self { credentials }
    }
}

impl CredentialProvider for StaticCredentials {
    fn credential(&self, _feed: &Url, _scheme: &str) -> Option<Credentials> {
        Some(self.credentials.duplicate())
    }
}

/// Look up basic credentials, treating a provider answer with an empty
/// username as anonymous.
pub fn basic_credentials(provider: &dyn CredentialProvider, feed: &Url) -> Option<Credentials> {
    provider
        .credential(feed, BASIC_SCHEME)
        .filter(|creds| !creds.is_anonymous())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed() -> Url {
        Url::parse("https://registry.example.com").expect("url")
    }

    #[test]
    fn debug_output_redacts_password() {
        let creds = Credentials::new("admin", "hunter2");
        let shown = format!("{creds:?}");
        assert!(shown.contains("admin"));
        assert!(!shown.contains("hunter2"));
    }

    #[test]
    fn anonymous_provider_returns_nothing() {
        assert!(basic_credentials(&Anonymous, &feed()).is_none());
    }

    #[test]
    fn static_provider_returns_a_fresh_pair_each_call() {
        let provider = StaticCredentials::new(Credentials::new("admin", "hunter2"));
        let first = basic_credentials(&provider, &feed()).expect("credentials");
        let second = basic_credentials(&provider, &feed()).expect("credentials");
        assert_eq!(first.username(), "admin");
        assert_eq!(second.password(), "hunter2");
    }

    #[test]
    fn blank_username_is_anonymous() {
        let provider = StaticCredentials::new(Credentials::new("  ", "ignored"));
        assert!(basic_credentials(&provider, &feed()).is_none());
    }
}
