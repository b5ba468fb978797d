//! Session/token authority: mints signed credentials at login and validates them
//! on every subsequent request.

pub mod authority;

pub use authority::{CredentialValidator, SessionAuthority, SigningError, ValidationError};
