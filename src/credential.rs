//! API credential resolution.
//!
//! The key is taken from the secret store (process environment) when present,
//! otherwise from whatever the user typed into the sidebar. Only the `AI`
//! prefix is checked; a missing or malformed key produces a warning status but
//! never blocks a request.

use serde::Serialize;
use std::fmt;

pub const EXPECTED_PREFIX: &str = "AI";

/// Opaque API key. `Debug` never prints the value.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn has_expected_prefix(&self) -> bool {
        self.0.starts_with(EXPECTED_PREFIX)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credential(<redacted, {} chars>)", self.0.len())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialSource {
    SecretStore,
    UserEntered,
    Missing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialStatus {
    /// Secret store supplied a well-formed key.
    Provided,
    /// The user-entered key has the expected prefix.
    Accepted,
    Warning,
}

impl CredentialStatus {
    pub fn message(&self) -> &'static str {
        match self {
            CredentialStatus::Provided => "API key already provided!",
            CredentialStatus::Accepted => "Success!",
            CredentialStatus::Warning => "Please enter your API Key!",
        }
    }
}

/// Outcome of resolving the credential for one request.
#[derive(Debug, Clone)]
pub struct ResolvedCredential {
    pub credential: Credential,
    pub source: CredentialSource,
    pub status: CredentialStatus,
}

/// Pick the key for a request.
///
/// A well-formed secret-store key wins. An unprefixed one is only used when
/// the user has not entered a well-formed key of their own, so the user can
/// always override a bad deployment key from the sidebar.
pub fn resolve(secret: Option<&Credential>, entered: Option<&str>) -> ResolvedCredential {
    let secret = secret.filter(|s| !s.expose().is_empty());
    if let Some(secret) = secret.filter(|s| s.has_expected_prefix()) {
        return ResolvedCredential {
            credential: secret.clone(),
            source: CredentialSource::SecretStore,
            status: CredentialStatus::Provided,
        };
    }

    let entered = entered.unwrap_or_default();
    let credential = Credential::new(entered);
    if credential.has_expected_prefix() {
        return ResolvedCredential {
            credential,
            source: CredentialSource::UserEntered,
            status: CredentialStatus::Accepted,
        };
    }

    if let Some(secret) = secret {
        tracing::warn!("Secret store API key does not start with the expected prefix");
        return ResolvedCredential {
            credential: secret.clone(),
            source: CredentialSource::SecretStore,
            status: CredentialStatus::Warning,
        };
    }

    let source = if entered.is_empty() {
        CredentialSource::Missing
    } else {
        CredentialSource::UserEntered
    };
    ResolvedCredential {
        credential,
        source,
        status: CredentialStatus::Warning,
    }
}
