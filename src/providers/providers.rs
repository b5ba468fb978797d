use std::time::Duration;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{
    oauth_provider::OAuthProvider,
    password_provider::{CredentialsConfig, PasswordProvider},
};
use crate::models::Identity;

/// Why a login attempt did not produce an identity.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthFailure {
    #[error("invalid email or password")]
    InvalidCredentials,
    #[error("identity provider exchange failed: {0}")]
    ProviderExchangeFailed(String),
    #[error("access was denied at the identity provider")]
    ProviderDenied,
    #[error("unknown login method '{0}'")]
    UnknownProvider(String),
    #[error("login method does not accept this kind of input")]
    UnsupportedInput,
    #[error("login state did not match the one we issued")]
    StateMismatch,
    #[error("failed to issue credential: {0}")]
    Signing(String),
}

impl AuthFailure {
    /// Short machine-readable code, used for `/login?error=<code>`.
    pub fn code(&self) -> &'static str {
        match self {
            AuthFailure::InvalidCredentials => "InvalidCredentials",
            AuthFailure::ProviderExchangeFailed(_) => "ProviderExchangeFailed",
            AuthFailure::ProviderDenied => "ProviderDenied",
            AuthFailure::UnknownProvider(_) => "UnknownProvider",
            AuthFailure::UnsupportedInput => "UnsupportedInput",
            AuthFailure::StateMismatch => "StateMismatch",
            AuthFailure::Signing(_) => "Signing",
        }
    }
}

/// What the caller presents to a login method.
#[derive(Debug, Clone)]
pub enum LoginInput {
    /// Email + plaintext password.
    Password { email: String, password: String },
    /// The query of an OAuth redirect back to us.
    Callback {
        code: Option<String>,
        error: Option<String>,
        redirect_uri: String,
    },
}

/// Known delegated-auth provider families.
#[derive(Deserialize, Serialize, JsonSchema, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Google,
    Github,
    /// Any other OAuth 2.0 provider; endpoints must be given explicitly.
    Oauth,
}

/// Configuration of one delegated-auth provider. The map key it is stored under
/// is the provider id; `google` and `github` ids imply their kind.
#[derive(Deserialize, Serialize, JsonSchema, Debug, Clone)]
pub struct ProviderConfig {
    #[serde(default)]
    pub kind: Option<ProviderKind>,
    #[serde(default)]
    pub name: Option<String>,
    pub client_id: String,
    pub client_secret: String,
    #[serde(default)]
    pub authorize_url: Option<String>,
    #[serde(default)]
    pub token_url: Option<String>,
    #[serde(default)]
    pub userinfo_url: Option<String>,
    #[serde(default)]
    pub scopes: Option<Vec<String>>,
}

impl ProviderConfig {
    pub fn resolved_kind(&self, id: &str) -> ProviderKind {
        self.kind.unwrap_or(match id {
            "google" => ProviderKind::Google,
            "github" => ProviderKind::Github,
            _ => ProviderKind::Oauth,
        })
    }
}

/// Public description of a login method, as listed on the login page.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ProviderInfo {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub provider_type: String,
    pub signin_url: String,
    pub callback_url: String,
}

/// A login method must be able to turn its input into an `Identity` or fail.
#[async_trait::async_trait]
pub trait Provider: Send + Sync {
    /// Stable id used in URLs (`credentials`, `google`, ...).
    fn get_id(&self) -> &str;
    /// Display name for the login page and logs.
    fn get_name(&self) -> &str;
    /// `credentials` or `oauth`.
    fn get_type(&self) -> &str;
    /// Where to send the browser to start a delegated login, if this is one.
    fn authorize_url(&self, _redirect_uri: &str, _state: &str) -> Option<String> {
        None
    }
    async fn authenticate(&self, input: &LoginInput) -> Result<Identity, AuthFailure>;
}

/// Builds every configured login method. Fails on an incomplete generic OAuth config.
pub fn create_auth_providers(
    credentials: &CredentialsConfig,
    providers: &std::collections::BTreeMap<String, ProviderConfig>,
    http: reqwest::Client,
) -> Result<Vec<Box<dyn Provider>>, String> {
    let mut created: Vec<Box<dyn Provider>> = Vec::new();
    if credentials.enabled {
        created.push(Box::new(PasswordProvider::new(credentials)));
    }
    for (id, cfg) in providers {
        created.push(Box::new(OAuthProvider::new(id, cfg, http.clone())?));
    }
    Ok(created)
}

/// HTTP client used for provider token and userinfo calls.
pub fn provider_http_client(timeout: Duration) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("todotron/", env!("CARGO_PKG_VERSION")))
        .build()
}
