use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::HeaderMap;

use super::cookies::session_token;
use super::CredentialState;
use crate::models::Credential;
use crate::state::AppState;
use crate::utils::http_helpers::HTTPError;

/// A caller with a valid session credential.
///
/// Protected handlers take this as an argument, so they re-verify the
/// credential themselves instead of trusting that the gate ran.
#[derive(Debug, Clone)]
pub struct Session {
    pub credential: Credential,
    pub token: String,
}

impl Session {
    /// Resolves the session carried by `headers`, if it is valid.
    pub async fn from_headers(headers: &HeaderMap, state: &AppState) -> Option<Session> {
        let token = session_token(headers, &state.config.session.cookie_name)?;
        match state.auth.credential_state(Some(&token)).await {
            CredentialState::Valid(credential) => Some(Session { credential, token }),
            CredentialState::Absent | CredentialState::Invalid(_) => None,
        }
    }
}

impl FromRequestParts<AppState> for Session {
    type Rejection = HTTPError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, HTTPError> {
        Session::from_headers(&parts.headers, state)
            .await
            .ok_or_else(HTTPError::unauthorized)
    }
}
