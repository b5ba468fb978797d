use std::sync::Arc;

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::config::SessionConfig;
use crate::models::{Credential, Identity, ProviderTag};
use crate::utils::clock::{Clock, SystemClock};

/// Why a presented credential was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Bad signature, wrong issuer, or not a token at all.
    #[error("credential is malformed")]
    Malformed,
    #[error("credential has expired")]
    Expired,
}

#[derive(Debug, Error)]
#[error("failed to sign credential: {0}")]
pub struct SigningError(String);

/// Anything that can turn a presented token into a credential.
///
/// Locally signed tokens validate without I/O, but an introspecting validator
/// (remote session store, provider introspection endpoint) fits the same seam.
#[async_trait::async_trait]
pub trait CredentialValidator: Send + Sync {
    async fn validate(&self, token: &str) -> Result<Credential, ValidationError>;
}

/// Claims carried inside the signed session token.
#[derive(Debug, Serialize, Deserialize)]
struct SessionClaims {
    sub: String,
    name: String,
    email: String,
    provider: ProviderTag,
    iat: i64,
    exp: i64,
    iss: String,
    jti: String,
}

/// Issues and validates HS256 session credentials.
pub struct SessionAuthority {
    issuer: String,
    max_age_in_secs: i64,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    clock: Arc<dyn Clock>,
}

impl SessionAuthority {
    pub fn new(config: &SessionConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: &SessionConfig, clock: Arc<dyn Clock>) -> Self {
        SessionAuthority {
            issuer: config.issuer.clone(),
            max_age_in_secs: config.max_age_in_secs,
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            clock,
        }
    }

    /// Lifetime of freshly issued credentials, in seconds.
    pub fn max_age(&self) -> i64 {
        self.max_age_in_secs
    }

    /// Mints a signed token for `identity`. The subject id is embedded so that
    /// validation can hand it back without another lookup.
    pub fn issue(&self, identity: &Identity) -> Result<(String, Credential), SigningError> {
        let now = self.clock.now().timestamp();
        let exp = now
            .checked_add(self.max_age_in_secs)
            .ok_or_else(|| SigningError("credential lifetime overflows".to_string()))?;
        let claims = SessionClaims {
            sub: identity.subject.clone(),
            name: identity.name.clone(),
            email: identity.email.clone(),
            provider: identity.provider.clone(),
            iat: now,
            exp,
            iss: self.issuer.clone(),
            jti: uuid::Uuid::new_v4().to_string(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| SigningError(e.to_string()))?;

        Ok((token, credential_from(claims)))
    }

    /// Verifies the signature, and only then the expiry.
    pub fn verify(&self, token: &str) -> Result<Credential, ValidationError> {
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is judged below against our own clock, after the signature holds.
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.set_required_spec_claims(&["exp", "sub", "iss"]);
        validation.set_issuer(&[&self.issuer]);

        let claims = decode::<SessionClaims>(token, &self.decoding_key, &validation)
            .map_err(|e| {
                debug!("Rejecting session token: {}", e);
                ValidationError::Malformed
            })?
            .claims;

        if self.clock.now().timestamp() >= claims.exp {
            debug!("Session token for subject '{}' has expired", claims.sub);
            return Err(ValidationError::Expired);
        }

        Ok(credential_from(claims))
    }
}

fn credential_from(claims: SessionClaims) -> Credential {
    Credential {
        subject: claims.sub,
        name: claims.name,
        email: claims.email,
        provider: claims.provider,
        issued_at: claims.iat,
        expires_at: claims.exp,
    }
}

#[async_trait::async_trait]
impl CredentialValidator for SessionAuthority {
    async fn validate(&self, token: &str) -> Result<Credential, ValidationError> {
        self.verify(token)
    }
}
