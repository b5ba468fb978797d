use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Redirect, Response};
use axum_extra::extract::cookie::CookieJar;
use tracing::debug;

use super::{Decision, Visibility};
use crate::auth::cookies::{cleared_session_cookie, session_token};
use crate::auth::CredentialState;
use crate::state::AppState;
use crate::utils::http_helpers::HTTPError;

/// Runs in front of every route. Public paths go straight through without the
/// credential being looked at; protected ones need a valid credential, else
/// API callers get a 401 and page navigations a redirect to the login page.
pub async fn access_gate(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let path = request.uri().path().to_string();

    if state.gate.classify(&path) == Visibility::Public {
        state.metrics.record_gate_decision("public", "admit");
        return next.run(request).await;
    }

    let token = session_token(request.headers(), &state.config.session.cookie_name);
    let credential = state.auth.credential_state(token.as_deref()).await;

    match state.gate.evaluate(&path, &credential) {
        Decision::Admit => {
            state.metrics.record_gate_decision("protected", "admit");
            next.run(request).await
        }
        Decision::Deny => {
            state.metrics.record_gate_decision("protected", "deny");
            debug!("Gate denied '{}' ({:?})", path, credential);

            let mut jar = CookieJar::new();
            if matches!(credential, CredentialState::Invalid(_)) {
                jar = jar.add(cleared_session_cookie(&state.config));
            }

            if path == "/api" || path.starts_with("/api/") {
                return (jar, HTTPError::unauthorized()).into_response();
            }
            let return_to = request
                .uri()
                .path_and_query()
                .map(|pq| pq.as_str())
                .unwrap_or("/");
            (jar, Redirect::to(&state.gate.login_redirect(return_to))).into_response()
        }
    }
}
