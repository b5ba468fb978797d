//! Login, logout and session endpoints under the public `/api/auth` namespace.

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::{
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::cookie::CookieJar;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::DateTime;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};
use url::form_urlencoded;
use uuid::Uuid;

use super::{callback_url, provider_infos};
use crate::auth::cookies::{
    cleared_oauth_state_cookie, cleared_session_cookie, oauth_state_cookie, session_cookie,
    OAUTH_STATE_COOKIE,
};
use crate::auth::Session;
use crate::gate::safe_return_path;
use crate::providers::{AuthFailure, LoginInput, ProviderInfo};
use crate::state::AppState;
use crate::utils::http_helpers::HTTPError;

/// Registers the authentication routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/auth/providers", get(list_providers))
        .route("/api/auth/signin/{provider}", get(signin))
        .route(
            "/api/auth/callback/{provider}",
            get(oauth_callback).post(password_callback),
        )
        .route("/api/auth/session", get(session))
        .route("/api/auth/signout", post(signout))
}

async fn list_providers(State(state): State<AppState>) -> Json<Vec<ProviderInfo>> {
    Json(provider_infos(&state))
}

/// Round-tripped through the provider as the OAuth `state` parameter.
#[derive(Serialize, Deserialize, Debug, PartialEq)]
struct OAuthState {
    nonce: String,
    callback: String,
}

fn encode_state(state: &OAuthState) -> Result<String, HTTPError> {
    let raw = serde_json::to_vec(state)
        .map_err(|e| HTTPError::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string(), None))?;
    Ok(URL_SAFE_NO_PAD.encode(raw))
}

fn decode_state(value: &str) -> Option<OAuthState> {
    let raw = URL_SAFE_NO_PAD.decode(value).ok()?;
    serde_json::from_slice(&raw).ok()
}

#[derive(Deserialize)]
struct SigninQuery {
    #[serde(rename = "callbackUrl")]
    callback_url: Option<String>,
}

/// Starts a delegated login by sending the browser to the provider.
async fn signin(
    State(state): State<AppState>,
    Path(provider_id): Path<String>,
    Query(query): Query<SigninQuery>,
) -> Result<Response, HTTPError> {
    let provider = state.auth.provider(&provider_id).ok_or_else(|| {
        HTTPError::new(
            StatusCode::NOT_FOUND,
            AuthFailure::UnknownProvider(provider_id.clone()).to_string(),
            None,
        )
    })?;

    let callback = safe_return_path(query.callback_url.as_deref());
    let nonce = Uuid::new_v4().simple().to_string();
    let oauth_state = encode_state(&OAuthState {
        nonce: nonce.clone(),
        callback: callback.clone(),
    })?;

    let redirect_uri = callback_url(&state.config, &provider_id);
    let Some(url) = provider.authorize_url(&redirect_uri, &oauth_state) else {
        // Password logins have no redirect leg; the form lives on the login page.
        return Ok(Redirect::to(&state.gate.login_redirect(&callback)).into_response());
    };

    let jar = CookieJar::new().add(oauth_state_cookie(&state.config, nonce));
    Ok((jar, Redirect::to(&url)).into_response())
}

#[derive(Deserialize)]
struct CallbackQuery {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

/// Where the provider sends the browser back to. Every outcome is a redirect:
/// to the return path on success, to the login page with an error code otherwise.
async fn oauth_callback(
    State(state): State<AppState>,
    Path(provider_id): Path<String>,
    Query(query): Query<CallbackQuery>,
    jar: CookieJar,
) -> Response {
    let expected = jar.get(OAUTH_STATE_COOKIE).map(|c| c.value().to_string());
    let jar = jar.add(cleared_oauth_state_cookie(&state.config));

    let returned = query.state.as_deref().and_then(decode_state);
    let oauth_state = match (returned, expected) {
        (Some(returned), Some(nonce)) if !nonce.is_empty() && returned.nonce == nonce => returned,
        _ => {
            warn!("OAuth callback for '{}' carried an unknown state", provider_id);
            let url = state.gate.login_error(AuthFailure::StateMismatch.code());
            return (jar, Redirect::to(&url)).into_response();
        }
    };

    let input = LoginInput::Callback {
        code: query.code,
        error: query.error,
        redirect_uri: callback_url(&state.config, &provider_id),
    };
    match state.auth.authenticate(&provider_id, &input).await {
        Ok(issued) => {
            let jar = jar.add(session_cookie(&state.config, issued.token));
            let target = safe_return_path(Some(&oauth_state.callback));
            (jar, Redirect::to(&target)).into_response()
        }
        Err(e) => {
            let url = state.gate.login_error(e.code());
            (jar, Redirect::to(&url)).into_response()
        }
    }
}

#[derive(Deserialize, Default)]
struct PasswordForm {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
    #[serde(rename = "callbackUrl", default)]
    callback_url: Option<String>,
}

fn parse_password_form(headers: &HeaderMap, body: &[u8]) -> Result<PasswordForm, HTTPError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    if content_type.starts_with("application/json") {
        return serde_json::from_slice(body)
            .map_err(|e| HTTPError::new(StatusCode::BAD_REQUEST, e.to_string(), None));
    }
    if content_type.starts_with("application/x-www-form-urlencoded") {
        let mut form = PasswordForm::default();
        for (key, value) in form_urlencoded::parse(body) {
            match key.as_ref() {
                "email" => form.email = value.into_owned(),
                "password" => form.password = value.into_owned(),
                "callbackUrl" => form.callback_url = Some(value.into_owned()),
                _ => {}
            }
        }
        return Ok(form);
    }
    Err(HTTPError::new(
        StatusCode::UNSUPPORTED_MEDIA_TYPE,
        "expected a JSON or form body",
        None,
    ))
}

/// Email/password login. Answers with JSON so that both forms and scripts can use it.
async fn password_callback(
    State(state): State<AppState>,
    Path(provider_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let form = match parse_password_form(&headers, &body) {
        Ok(form) => form,
        Err(e) => return e.into_response(),
    };
    let input = LoginInput::Password {
        email: form.email,
        password: form.password,
    };

    match state.auth.authenticate(&provider_id, &input).await {
        Ok(issued) => {
            let jar = CookieJar::new().add(session_cookie(&state.config, issued.token));
            let url = safe_return_path(form.callback_url.as_deref());
            (jar, Json(json!({ "ok": true, "url": url }))).into_response()
        }
        Err(e) => {
            let status = match e {
                AuthFailure::UnknownProvider(_) => StatusCode::NOT_FOUND,
                AuthFailure::UnsupportedInput => StatusCode::BAD_REQUEST,
                AuthFailure::Signing(_) => StatusCode::INTERNAL_SERVER_ERROR,
                _ => StatusCode::UNAUTHORIZED,
            };
            HTTPError::new(status, e.code(), None).into_response()
        }
    }
}

/// The session payload for a valid credential, `{}` otherwise.
async fn session(State(state): State<AppState>, headers: HeaderMap) -> Json<Value> {
    let Some(session) = Session::from_headers(&headers, &state).await else {
        return Json(json!({}));
    };
    let credential = session.credential;
    let expires = DateTime::from_timestamp(credential.expires_at, 0).map(|at| at.to_rfc3339());
    Json(json!({
        "user": {
            "id": credential.subject,
            "name": credential.name,
            "email": credential.email,
        },
        "provider": credential.provider,
        "expires": expires,
    }))
}

/// Clears the session cookie and forgets the caller's cached data.
async fn signout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Some(session) = Session::from_headers(&headers, &state).await {
        state.workspaces.drop_session(&session.credential.subject);
        info!("Signed out subject '{}'", session.credential.subject);
    }
    let jar = CookieJar::new().add(cleared_session_cookie(&state.config));
    (jar, Json(json!({ "url": state.gate.login_path() }))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_state_round_trip_and_garbage() {
        let state = OAuthState {
            nonce: "abc".to_string(),
            callback: "/todos".to_string(),
        };
        let encoded = encode_state(&state).unwrap();
        assert!(!encoded.contains('='));
        assert_eq!(decode_state(&encoded), Some(state));
        assert_eq!(decode_state("not base64!"), None);
        assert_eq!(decode_state(&URL_SAFE_NO_PAD.encode("[]")), None);
    }

    #[test]
    fn test_password_form_accepts_json_and_urlencoded() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let form = parse_password_form(
            &headers,
            br#"{"email": "demo@example.com", "password": "pw", "callbackUrl": "/x"}"#,
        )
        .unwrap();
        assert_eq!(form.email, "demo@example.com");
        assert_eq!(form.callback_url.as_deref(), Some("/x"));

        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/x-www-form-urlencoded"),
        );
        let form =
            parse_password_form(&headers, b"email=demo%40example.com&password=p%26w").unwrap();
        assert_eq!(form.email, "demo@example.com");
        assert_eq!(form.password, "p&w");
        assert_eq!(form.callback_url, None);

        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        assert_eq!(
            parse_password_form(&headers, b"").err().map(|e| e.status()),
            Some(StatusCode::UNSUPPORTED_MEDIA_TYPE)
        );
    }
}
