//! HTTP route definitions and handlers.
//!
//! Pages (`/`, `/login`), the authentication namespace, the protected to-do
//! API and the operational endpoints, all behind the access gate.

mod auth_routes;
mod health_routes;
mod metrics;
mod page_routes;
mod todo_routes;

use axum::middleware;
use axum::response::{IntoResponse, Redirect, Response};
use axum::Router;
use axum_extra::extract::cookie::CookieJar;

use crate::auth::cookies::cleared_session_cookie;
use crate::auth::Session;
use crate::client::ApiError;
use crate::config::ConfigV1;
use crate::gate::access_gate;
use crate::providers::ProviderInfo;
use crate::state::AppState;
use crate::utils::http_helpers::HTTPError;

/// Creates the application router with all routes and the access gate in front.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(page_routes::routes())
        .merge(auth_routes::routes())
        .merge(todo_routes::routes())
        .merge(health_routes::routes())
        .merge(metrics::routes())
        .layer(middleware::from_fn_with_state(state.clone(), access_gate))
        .with_state(state)
}

fn origin(config: &ConfigV1) -> &str {
    config.origin.trim_end_matches('/')
}

/// Redirect URI registered with a delegated-auth provider.
pub(crate) fn callback_url(config: &ConfigV1, provider_id: &str) -> String {
    format!("{}/api/auth/callback/{}", origin(config), provider_id)
}

pub(crate) fn provider_infos(state: &AppState) -> Vec<ProviderInfo> {
    state
        .auth
        .providers()
        .iter()
        .map(|p| ProviderInfo {
            id: p.get_id().to_string(),
            name: p.get_name().to_string(),
            provider_type: p.get_type().to_string(),
            signin_url: format!("{}/api/auth/signin/{}", origin(&state.config), p.get_id()),
            callback_url: callback_url(&state.config, p.get_id()),
        })
        .collect()
}

/// A remote 401 means our credential is no longer accepted: the caller's
/// workspace is dropped and their session cookie cleared.
fn revoke(state: &AppState, session: &Session) -> CookieJar {
    state.workspaces.drop_session(&session.credential.subject);
    CookieJar::new().add(cleared_session_cookie(&state.config))
}

/// Facade failure as seen by an API caller.
pub(crate) fn api_failure(state: &AppState, session: &Session, err: ApiError) -> Response {
    if err == ApiError::Unauthorized {
        return (revoke(state, session), HTTPError::from(err)).into_response();
    }
    HTTPError::from(err).into_response()
}

/// Facade failure during a page navigation: a 401 sends the caller back to login.
pub(crate) fn page_failure(
    state: &AppState,
    session: &Session,
    err: ApiError,
    return_to: &str,
) -> Response {
    if err == ApiError::Unauthorized {
        let target = state.gate.login_redirect(return_to);
        return (revoke(state, session), Redirect::to(&target)).into_response();
    }
    HTTPError::from(err).into_response()
}
