use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::models::{Identity, ProviderTag};
use crate::providers::{AuthFailure, LoginInput, Provider};

/// Email/password login. Ships with a single demo identity; a real deployment
/// would replace the user list with a verified user store.
#[derive(Deserialize, Serialize, Debug, JsonSchema, Clone)]
pub struct CredentialsConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_users")]
    pub users: Vec<CredentialUser>,
}

/// A single account accepted by the password login.
#[derive(Deserialize, Serialize, Debug, JsonSchema, Clone)]
pub struct CredentialUser {
    /// Subject id; stable across logins.
    pub id: String,
    pub email: String,
    pub password: String,
    pub name: String,
}

fn default_enabled() -> bool {
    true
}

fn default_users() -> Vec<CredentialUser> {
    vec![CredentialUser {
        id: "1".to_string(),
        email: "demo@example.com".to_string(),
        password: "password".to_string(),
        name: "Demo User".to_string(),
    }]
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        CredentialsConfig {
            enabled: default_enabled(),
            users: default_users(),
        }
    }
}

/// Compares every byte regardless of where the first difference is.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

pub struct PasswordProvider {
    config: CredentialsConfig,
}

impl PasswordProvider {
    pub fn new(config: &CredentialsConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }
}

#[async_trait]
impl Provider for PasswordProvider {
    fn get_id(&self) -> &str {
        "credentials"
    }

    fn get_name(&self) -> &str {
        "Email and password"
    }

    fn get_type(&self) -> &str {
        "credentials"
    }

    async fn authenticate(&self, input: &LoginInput) -> Result<Identity, AuthFailure> {
        let LoginInput::Password { email, password } = input else {
            return Err(AuthFailure::UnsupportedInput);
        };

        let email = email.trim();
        if email.is_empty() {
            return Err(AuthFailure::InvalidCredentials);
        }

        debug!("Password login attempt for '{}'", email);
        self.config
            .users
            .iter()
            .find(|user| {
                user.email.eq_ignore_ascii_case(email)
                    && constant_time_eq(user.password.as_bytes(), password.as_bytes())
            })
            .map(|user| Identity {
                subject: user.id.clone(),
                name: user.name.clone(),
                email: user.email.clone(),
                provider: ProviderTag::Credentials,
            })
            .ok_or(AuthFailure::InvalidCredentials)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn password(email: &str, password: &str) -> LoginInput {
        LoginInput::Password {
            email: email.to_string(),
            password: password.to_string(),
        }
    }

    #[tokio::test]
    async fn test_demo_identity_logs_in() {
        let provider = PasswordProvider::new(&CredentialsConfig::default());
        let identity = provider
            .authenticate(&password("demo@example.com", "password"))
            .await
            .unwrap();
        assert_eq!(identity.subject, "1");
        assert_eq!(identity.name, "Demo User");
        assert_eq!(identity.provider, ProviderTag::Credentials);
    }

    #[tokio::test]
    async fn test_subject_is_stable_across_logins() {
        let provider = PasswordProvider::new(&CredentialsConfig::default());
        let first = provider
            .authenticate(&password("demo@example.com", "password"))
            .await
            .unwrap();
        let second = provider
            .authenticate(&password(" Demo@Example.com ", "password"))
            .await
            .unwrap();
        assert_eq!(first.subject, second.subject);
    }

    #[tokio::test]
    async fn test_wrong_password_is_invalid_credentials() {
        let provider = PasswordProvider::new(&CredentialsConfig::default());
        for wrong in ["", "Password", "password ", "hunter2"] {
            let result = provider
                .authenticate(&password("demo@example.com", wrong))
                .await;
            assert_eq!(result, Err(AuthFailure::InvalidCredentials), "{wrong:?}");
        }
    }

    #[tokio::test]
    async fn test_unknown_email_is_invalid_credentials() {
        let provider = PasswordProvider::new(&CredentialsConfig::default());
        let result = provider
            .authenticate(&password("someone@example.com", "password"))
            .await;
        assert_eq!(result, Err(AuthFailure::InvalidCredentials));
    }

    #[tokio::test]
    async fn test_callback_input_is_unsupported() {
        let provider = PasswordProvider::new(&CredentialsConfig::default());
        let result = provider
            .authenticate(&LoginInput::Callback {
                code: Some("abc".to_string()),
                error: None,
                redirect_uri: "http://localhost/cb".to_string(),
            })
            .await;
        assert_eq!(result, Err(AuthFailure::UnsupportedInput));
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"abcd"));
    }
}
