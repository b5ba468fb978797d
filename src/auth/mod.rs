pub mod auth;
pub mod cookies;
pub mod extract;

pub use auth::{Auth, CredentialState, Issued};
pub use extract::Session;
