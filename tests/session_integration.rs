mod common;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use common::{
    body_json, build_app, json_request, location, login, request, send, set_cookie, test_config,
    COOKIE_NAME,
};
use mockito::{Matcher, Server};
use serde_json::json;

const OAUTH_STATE_COOKIE: &str = "todotron.oauth-state";

#[tokio::test]
async fn test_password_login_sets_session_cookie() {
    let (app, _) = build_app(test_config("http://127.0.0.1:1"));
    let response = send(
        &app,
        json_request(
            Method::POST,
            "/api/auth/callback/credentials",
            None,
            json!({"email": "demo@example.com", "password": "password", "callbackUrl": "/todos"}),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let raw = response
        .headers()
        .get(header::SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(raw.starts_with(COOKIE_NAME));
    assert!(raw.contains("HttpOnly"));
    assert!(raw.contains("SameSite=Lax"));
    assert!(raw.contains("Path=/"));
    assert!(!raw.contains("Secure"));

    let body = body_json(response).await;
    assert_eq!(body, json!({"ok": true, "url": "/todos"}));
}

#[tokio::test]
async fn test_wrong_password_is_rejected() {
    let (app, _) = build_app(test_config("http://127.0.0.1:1"));
    let response = send(
        &app,
        json_request(
            Method::POST,
            "/api/auth/callback/credentials",
            None,
            json!({"email": "demo@example.com", "password": "hunter2"}),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(set_cookie(response.headers(), COOKIE_NAME).is_none());
    assert_eq!(body_json(response).await, json!({"error": "InvalidCredentials"}));
}

#[tokio::test]
async fn test_form_login_and_foreign_return_path() {
    let (app, _) = build_app(test_config("http://127.0.0.1:1"));
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/auth/callback/credentials")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(
            "email=demo%40example.com&password=password&callbackUrl=https%3A%2F%2Fevil.test%2F",
        ))
        .unwrap();
    let response = send(&app, request).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["url"], "/");
}

#[tokio::test]
async fn test_session_endpoint_echoes_subject() {
    let (app, _) = build_app(test_config("http://127.0.0.1:1"));

    let response = send(&app, request(Method::GET, "/api/auth/session", None)).await;
    assert_eq!(body_json(response).await, json!({}));

    let cookie = login(&app).await;
    let first = body_json(send(&app, request(Method::GET, "/api/auth/session", Some(&cookie))).await).await;
    assert_eq!(first["user"]["id"], "1");
    assert_eq!(first["user"]["email"], "demo@example.com");
    assert_eq!(first["provider"], "credentials");
    assert!(first["expires"].is_string());

    let again = login(&app).await;
    let second = body_json(send(&app, request(Method::GET, "/api/auth/session", Some(&again))).await).await;
    assert_eq!(second["user"]["id"], first["user"]["id"]);
}

#[tokio::test]
async fn test_signout_clears_cookie() {
    let (app, _) = build_app(test_config("http://127.0.0.1:1"));
    let cookie = login(&app).await;

    let response = send(&app, request(Method::POST, "/api/auth/signout", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(set_cookie(response.headers(), COOKIE_NAME).as_deref(), Some(""));
    assert_eq!(body_json(response).await, json!({"url": "/login"}));
}

#[tokio::test]
async fn test_signin_for_password_method_points_at_login_page() {
    let (app, _) = build_app(test_config("http://127.0.0.1:1"));
    let response = send(
        &app,
        request(Method::GET, "/api/auth/signin/credentials?callbackUrl=/todos", None),
    )
    .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/login?callbackUrl=%2Ftodos");

    let response = send(&app, request(Method::GET, "/api/auth/signin/myspace", None)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

/// Follows `/api/auth/signin/google` and returns the `state` it sent to the
/// provider plus the matching state cookie.
async fn start_oauth(app: &axum::Router, remote: &str) -> (String, String) {
    let response = send(
        app,
        request(Method::GET, "/api/auth/signin/google?callbackUrl=/todos", None),
    )
    .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    let target = url::Url::parse(&location(&response)).unwrap();
    assert!(target.as_str().starts_with(&format!("{}/oauth/authorize?", remote)));
    let query: std::collections::HashMap<String, String> =
        target.query_pairs().into_owned().collect();
    assert_eq!(query["client_id"], "google-client");
    assert_eq!(query["response_type"], "code");
    assert_eq!(
        query["redirect_uri"],
        "http://localhost:3000/api/auth/callback/google"
    );

    let nonce = set_cookie(response.headers(), OAUTH_STATE_COOKIE).expect("state cookie");
    (
        query["state"].clone(),
        format!("{}={}", OAUTH_STATE_COOKIE, nonce),
    )
}

#[tokio::test]
async fn test_oauth_round_trip() {
    let mut server = Server::new_async().await;
    let token = server
        .mock("POST", "/oauth/token")
        .match_body(Matcher::AllOf(vec![
            Matcher::UrlEncoded("code".into(), "abc".into()),
            Matcher::UrlEncoded("grant_type".into(), "authorization_code".into()),
            Matcher::UrlEncoded("client_secret".into(), "google-secret".into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({"access_token": "provider-token", "token_type": "Bearer"}).to_string())
        .expect(1)
        .create_async()
        .await;
    let userinfo = server
        .mock("GET", "/oauth/userinfo")
        .match_header("authorization", "Bearer provider-token")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({"sub": "g-42", "name": "Grace", "email": "grace@example.com"}).to_string())
        .expect(1)
        .create_async()
        .await;

    let (app, _) = build_app(test_config(&server.url()));
    let (state, state_cookie) = start_oauth(&app, &server.url()).await;

    let callback = format!("/api/auth/callback/google?code=abc&state={}", state);
    let response = send(&app, request(Method::GET, &callback, Some(&state_cookie))).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/todos");
    let session = set_cookie(response.headers(), COOKIE_NAME).expect("session cookie");
    assert_eq!(set_cookie(response.headers(), OAUTH_STATE_COOKIE).as_deref(), Some(""));

    let cookie = format!("{}={}", COOKIE_NAME, session);
    let body = body_json(send(&app, request(Method::GET, "/api/auth/session", Some(&cookie))).await).await;
    assert_eq!(body["user"]["id"], "g-42");
    assert_eq!(body["provider"], "google");

    token.assert_async().await;
    userinfo.assert_async().await;
}

#[tokio::test]
async fn test_oauth_state_mismatch_is_rejected() {
    let server = Server::new_async().await;
    let (app, _) = build_app(test_config(&server.url()));
    let (state, _) = start_oauth(&app, &server.url()).await;

    let forged = format!("{}=someone-elses-nonce", OAUTH_STATE_COOKIE);
    let callback = format!("/api/auth/callback/google?code=abc&state={}", state);
    let response = send(&app, request(Method::GET, &callback, Some(&forged))).await;
    assert_eq!(location(&response), "/login?error=StateMismatch");
    assert!(set_cookie(response.headers(), COOKIE_NAME).is_none());
}

#[tokio::test]
async fn test_oauth_consent_declined() {
    let server = Server::new_async().await;
    let (app, _) = build_app(test_config(&server.url()));
    let (state, state_cookie) = start_oauth(&app, &server.url()).await;

    let callback = format!("/api/auth/callback/google?error=access_denied&state={}", state);
    let response = send(&app, request(Method::GET, &callback, Some(&state_cookie))).await;
    assert_eq!(location(&response), "/login?error=ProviderDenied");
}

#[tokio::test]
async fn test_oauth_exchange_failure() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/oauth/token")
        .with_status(400)
        .with_header("content-type", "application/json")
        .with_body(json!({"error": "invalid_grant"}).to_string())
        .create_async()
        .await;
    let (app, _) = build_app(test_config(&server.url()));
    let (state, state_cookie) = start_oauth(&app, &server.url()).await;

    let callback = format!("/api/auth/callback/google?code=bad&state={}", state);
    let response = send(&app, request(Method::GET, &callback, Some(&state_cookie))).await;
    assert_eq!(location(&response), "/login?error=ProviderExchangeFailed");
}

#[test]
fn test_empty_session_secret_fails_startup() {
    let mut config = test_config("http://127.0.0.1:1");
    config.session.secret = "  ".to_string();
    assert!(todotron::startup::build_state(std::sync::Arc::new(config)).is_err());
}

#[test]
fn test_non_positive_session_lifetime_fails_startup() {
    for max_age in [0, -60] {
        let mut config = test_config("http://127.0.0.1:1");
        config.session.max_age_in_secs = max_age;
        assert!(todotron::startup::build_state(std::sync::Arc::new(config)).is_err());
    }
}
