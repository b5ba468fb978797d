pub mod oauth_provider;
pub mod password_provider;
pub mod providers;

// Re-export from providers.rs so we can do "use crate::providers::*;"
pub use oauth_provider::OAuthProvider;
pub use password_provider::{CredentialUser, CredentialsConfig, PasswordProvider};
pub use providers::*;
