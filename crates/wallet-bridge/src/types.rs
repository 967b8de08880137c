use std::fmt;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

/// Which backend custodies (or fronts) the wallet.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ProviderKind {
    /// Hosted key-management service with an in-process SDK session.
    EmbeddedCustodial,
    /// Separate wallet application reached over an authorization protocol.
    ExternalProtocol,
    /// Any other backend registered by the embedding application.
    Custom(String),
}

impl ProviderKind {
    pub fn as_str(&self) -> &str {
        match self {
            ProviderKind::EmbeddedCustodial => "embedded",
            ProviderKind::ExternalProtocol => "external",
            ProviderKind::Custom(name) => name,
        }
    }
}

impl From<String> for ProviderKind {
    fn from(name: String) -> Self {
        match name.as_str() {
            "embedded" => ProviderKind::EmbeddedCustodial,
            "external" => ProviderKind::ExternalProtocol,
            _ => ProviderKind::Custom(name),
        }
    }
}

impl From<ProviderKind> for String {
    fn from(kind: ProviderKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connection state of a provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum ProviderStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl ProviderStatus {
    /// Whether `next` is a legal successor of this state.
    ///
    /// Any state may drop to `Disconnected`; `Error` only leaves through a
    /// fresh attempt (`Connecting`).
    pub fn can_transition_to(self, next: ProviderStatus) -> bool {
        use ProviderStatus::*;
        matches!(
            (self, next),
            (_, Disconnected)
                | (Disconnected, Connecting)
                | (Connecting, Connected)
                | (Connecting, Error)
                | (Error, Connecting)
        )
    }
}

/// Optional profile data returned by a login.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileHints {
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
}

/// Produced once per successful login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthResult {
    pub provider_kind: ProviderKind,
    pub address: String,
    pub profile: ProfileHints,
}

/// How the user wants to sign in.
#[derive(Debug)]
pub enum LoginMethod {
    /// Redirect-based login through a social identity provider.
    OAuth { provider: String },
    /// Direct identifier + secret (e.g. email and one-time code).
    Credential {
        identifier: String,
        secret: SecretString,
    },
    /// Authorize through a separate wallet application.
    ExternalWallet,
}

impl LoginMethod {
    pub fn label(&self) -> &'static str {
        match self {
            LoginMethod::OAuth { .. } => "oauth",
            LoginMethod::Credential { .. } => "credential",
            LoginMethod::ExternalWallet => "external-wallet",
        }
    }
}

/// Identity the application presents to external wallets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppIdentity {
    pub name: String,
    pub uri: String,
    pub icon: String,
}
