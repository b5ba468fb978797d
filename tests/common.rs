#![allow(dead_code)]

use axum::body::Body;
use axum::http::{header, HeaderMap, Method, Request};
use axum::response::Response;
use axum::Router;
use figment::providers::{Format, Yaml};
use figment::Figment;
use serde_json::Value;
use std::sync::Arc;
use todotron::config::{extract_config, ConfigV1};
use todotron::routes::create_router;
use todotron::startup::build_state;
use todotron::state::AppState;
use tower::ServiceExt;

pub const COOKIE_NAME: &str = "todotron.session-token";

const TEST_CONFIG: &str = r#"
version: "1.0.0"
bind_address: 127.0.0.1:0
origin: http://localhost:3000
logging:
  level: debug
  format: console
session:
  secret: integration-secret
  issuer: todotron-test
remote:
  base_url: "{remote}"
  timeout_in_ms: 2000
  rate_limit_backoff_in_ms: 1
credentials:
  users:
    - id: "1"
      email: demo@example.com
      password: password
      name: Demo User
providers:
  google:
    client_id: google-client
    client_secret: google-secret
    authorize_url: "{remote}/oauth/authorize"
    token_url: "{remote}/oauth/token"
    userinfo_url: "{remote}/oauth/userinfo"
gate:
  public_prefixes:
    - /docs
"#;

/// Test config whose remote collection and OAuth endpoints live at `remote`.
pub fn test_config(remote: &str) -> ConfigV1 {
    let yaml = TEST_CONFIG.replace("{remote}", remote.trim_end_matches('/'));
    extract_config(&Figment::new().merge(Yaml::string(&yaml)))
        .expect("Failed to parse integration test config")
}

pub fn build_app(config: ConfigV1) -> (Router, AppState) {
    let state = build_state(Arc::new(config)).expect("Failed to build app state");
    (create_router(state.clone()), state)
}

pub fn request(method: Method, path: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(path);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::empty()).expect("failed to build request")
}

pub fn json_request(method: Method, path: &str, cookie: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(path)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder
        .body(Body::from(body.to_string()))
        .expect("failed to build request")
}

pub async fn send(app: &Router, request: Request<Body>) -> Response {
    app.clone()
        .oneshot(request)
        .await
        .expect("request should succeed")
}

pub async fn body_json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("failed to read body");
    serde_json::from_slice(&bytes).expect("body is not JSON")
}

/// Value of cookie `name` as set by `headers`, if any `Set-Cookie` names it.
pub fn set_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find_map(|raw| {
            let pair = raw.split(';').next()?.trim();
            let (key, value) = pair.split_once('=')?;
            (key == name).then(|| value.to_string())
        })
}

pub fn location(response: &Response) -> String {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .expect("response should redirect")
        .to_string()
}

/// Logs in as the demo user and returns a `Cookie` header value.
pub async fn login(app: &Router) -> String {
    let response = send(
        app,
        json_request(
            Method::POST,
            "/api/auth/callback/credentials",
            None,
            serde_json::json!({"email": "demo@example.com", "password": "password"}),
        ),
    )
    .await;
    assert_eq!(response.status(), 200);
    let token = set_cookie(response.headers(), COOKIE_NAME).expect("session cookie should be set");
    format!("{}={}", COOKIE_NAME, token)
}
