use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::metrics::Metrics;
use crate::models::Credential;
use crate::providers::{AuthFailure, LoginInput, Provider};
use crate::session::{CredentialValidator, SessionAuthority, ValidationError};

/// What a request carries, as far as the access gate is concerned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialState {
    Valid(Credential),
    Absent,
    Invalid(ValidationError),
}

impl CredentialState {
    pub fn credential(&self) -> Option<&Credential> {
        match self {
            CredentialState::Valid(c) => Some(c),
            _ => None,
        }
    }
}

/// A freshly minted session credential and its signed token.
#[derive(Debug, Clone)]
pub struct Issued {
    pub token: String,
    pub credential: Credential,
}

/// Holds every login method plus the authority that signs their results.
pub struct Auth {
    providers: Vec<Box<dyn Provider>>,
    authority: Arc<SessionAuthority>,
    validator: Arc<dyn CredentialValidator>,
    timeout: Duration,
    metrics: Metrics,
}

impl Auth {
    pub fn new(
        providers: Vec<Box<dyn Provider>>,
        authority: Arc<SessionAuthority>,
        timeout: Duration,
        metrics: Metrics,
    ) -> Self {
        info!(
            "Login methods: {}",
            providers
                .iter()
                .map(|p| p.get_id())
                .collect::<Vec<_>>()
                .join(", ")
        );
        Auth {
            providers,
            validator: authority.clone(),
            authority,
            timeout,
            metrics,
        }
    }

    /// Swaps the validator, e.g. for one that introspects tokens remotely.
    pub fn with_validator(mut self, validator: Arc<dyn CredentialValidator>) -> Self {
        self.validator = validator;
        self
    }

    pub fn providers(&self) -> &[Box<dyn Provider>] {
        &self.providers
    }

    pub fn provider(&self, id: &str) -> Option<&dyn Provider> {
        self.providers
            .iter()
            .find(|p| p.get_id() == id)
            .map(|p| p.as_ref())
    }

    pub fn authority(&self) -> &SessionAuthority {
        &self.authority
    }

    /// Runs the login method `method` and, on success, mints a local credential
    /// bound to the identity it asserted. Provider round trips are bounded by
    /// the configured timeout.
    pub async fn authenticate(&self, method: &str, input: &LoginInput) -> Result<Issued, AuthFailure> {
        let provider = self
            .provider(method)
            .ok_or_else(|| AuthFailure::UnknownProvider(method.to_string()))?;

        let outcome = match timeout(self.timeout, provider.authenticate(input)).await {
            Ok(result) => result,
            Err(_) => Err(AuthFailure::ProviderExchangeFailed(format!(
                "provider '{}' timed out",
                method
            ))),
        };

        let identity = match outcome {
            Ok(identity) => identity,
            Err(e) => {
                warn!("Login via '{}' failed: {}", method, e);
                self.metrics.record_login_attempt(method, e.code());
                return Err(e);
            }
        };

        let (token, credential) = self
            .authority
            .issue(&identity)
            .map_err(|e| AuthFailure::Signing(e.to_string()))?;

        info!(
            "Login via '{}' succeeded for subject '{}'",
            method, credential.subject
        );
        self.metrics.record_login_attempt(method, "success");
        Ok(Issued { token, credential })
    }

    /// Validates whatever token the request carried. Never fails: problems
    /// resolve to `Absent` or `Invalid`.
    pub async fn credential_state(&self, token: Option<&str>) -> CredentialState {
        let Some(token) = token.filter(|t| !t.is_empty()) else {
            return CredentialState::Absent;
        };
        match self.validator.validate(token).await {
            Ok(credential) => CredentialState::Valid(credential),
            Err(e) => {
                debug!("Presented credential rejected: {}", e);
                CredentialState::Invalid(e)
            }
        }
    }
}
