use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use super::{ApiError, CredentialSlot};
use crate::config::RemoteConfig;
use crate::metrics::Metrics;
use crate::models::{NewTodo, Todo, TodoPatch};

/// Upper bound on how long a `Retry-After` header may make us wait.
const MAX_RETRY_AFTER: Duration = Duration::from_secs(10);

/// CRUD over the remote to-do collection.
///
/// Reads are safe to retry. `create` is not idempotent: every call may mint
/// a new remote id, so it is never retried blindly.
#[async_trait]
pub trait TodoApi: Send + Sync {
    async fn list_all(&self) -> Result<Vec<Todo>, ApiError>;
    async fn get_by_id(&self, id: i64) -> Result<Todo, ApiError>;
    async fn list_by_owner(&self, owner_id: i64) -> Result<Vec<Todo>, ApiError>;
    async fn create(&self, todo: &NewTodo) -> Result<Todo, ApiError>;
    async fn update(&self, id: i64, patch: &TodoPatch) -> Result<Todo, ApiError>;
    async fn delete(&self, id: i64) -> Result<(), ApiError>;
}

/// HTTP client for the remote collection. The configured timeout applies to
/// the whole request; hitting it surfaces as `Unreachable`.
pub fn remote_http_client(config: &RemoteConfig) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_millis(config.timeout_in_ms))
        .user_agent(concat!("todotron/", env!("CARGO_PKG_VERSION")))
        .build()
}

pub struct TodoClient {
    http: reqwest::Client,
    base_url: String,
    credential: CredentialSlot,
    backoff: Duration,
    metrics: Metrics,
}

impl TodoClient {
    pub fn new(
        http: reqwest::Client,
        config: &RemoteConfig,
        credential: CredentialSlot,
        metrics: Metrics,
    ) -> Self {
        TodoClient {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            credential,
            backoff: Duration::from_millis(config.rate_limit_backoff_in_ms),
            metrics,
        }
    }

    pub fn credential(&self) -> &CredentialSlot {
        &self.credential
    }

    /// Sends one call, attaching the bearer credential if there is one, and
    /// classifies the answer. A 429 is retried once after the backoff.
    async fn execute<B: Serialize + Sync>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&B>,
    ) -> Result<reqwest::Response, ApiError> {
        let url = format!("{}{}", self.base_url, path);
        let mut retried = false;

        loop {
            let mut request = self.http.request(method.clone(), &url);
            if !query.is_empty() {
                request = request.query(query);
            }
            if let Some(body) = body {
                request = request.json(body);
            }
            if let Some(token) = self.credential.get() {
                request = request.bearer_auth(token);
            }

            let started = Instant::now();
            let result = request.send().await;
            let elapsed = started.elapsed().as_secs_f64();

            let response = match result {
                Ok(response) => response,
                Err(e) => {
                    warn!("{} {} failed: {}", method, url, e);
                    self.metrics
                        .record_remote_request(method.as_str(), "unreachable", elapsed);
                    return Err(ApiError::Unreachable);
                }
            };

            let status = response.status();
            if status == StatusCode::TOO_MANY_REQUESTS && !retried {
                let wait = retry_after(&response).unwrap_or(self.backoff);
                debug!("{} {} rate limited, retrying in {:?}", method, url, wait);
                self.metrics
                    .record_remote_request(method.as_str(), "rate_limited", elapsed);
                tokio::time::sleep(wait).await;
                retried = true;
                continue;
            }

            let outcome = classify(status);
            let label = match &outcome {
                Ok(()) => "ok",
                Err(e) => e.outcome(),
            };
            self.metrics
                .record_remote_request(method.as_str(), label, elapsed);

            return match outcome {
                Ok(()) => Ok(response),
                Err(ApiError::Unauthorized) => {
                    warn!("{} {} rejected our credential, dropping it", method, url);
                    self.credential.clear();
                    Err(ApiError::Unauthorized)
                }
                Err(e) => Err(e),
            };
        }
    }

    async fn fetch<T: DeserializeOwned, B: Serialize + Sync>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&B>,
    ) -> Result<T, ApiError> {
        let response = self.execute(method, path, query, body).await?;
        response.json::<T>().await.map_err(|e| {
            if e.is_timeout() {
                ApiError::Unreachable
            } else {
                ApiError::Decode(e.to_string())
            }
        })
    }
}

fn classify(status: StatusCode) -> Result<(), ApiError> {
    match status {
        s if s.is_success() => Ok(()),
        StatusCode::UNAUTHORIZED => Err(ApiError::Unauthorized),
        StatusCode::FORBIDDEN => Err(ApiError::Forbidden),
        StatusCode::NOT_FOUND => Err(ApiError::NotFound),
        StatusCode::TOO_MANY_REQUESTS => Err(ApiError::RateLimited),
        s => Err(ApiError::Status(s.as_u16())),
    }
}

fn retry_after(response: &reqwest::Response) -> Option<Duration> {
    let secs: u64 = response
        .headers()
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()?;
    Some(Duration::from_secs(secs).min(MAX_RETRY_AFTER))
}

const NO_BODY: Option<&()> = None;

#[async_trait]
impl TodoApi for TodoClient {
    async fn list_all(&self) -> Result<Vec<Todo>, ApiError> {
        self.fetch(Method::GET, "/todos", &[], NO_BODY).await
    }

    async fn get_by_id(&self, id: i64) -> Result<Todo, ApiError> {
        self.fetch(Method::GET, &format!("/todos/{}", id), &[], NO_BODY)
            .await
    }

    async fn list_by_owner(&self, owner_id: i64) -> Result<Vec<Todo>, ApiError> {
        self.fetch(
            Method::GET,
            "/todos",
            &[("userId", owner_id.to_string())],
            NO_BODY,
        )
        .await
    }

    async fn create(&self, todo: &NewTodo) -> Result<Todo, ApiError> {
        self.fetch(Method::POST, "/todos", &[], Some(todo)).await
    }

    async fn update(&self, id: i64, patch: &TodoPatch) -> Result<Todo, ApiError> {
        self.fetch(Method::PATCH, &format!("/todos/{}", id), &[], Some(patch))
            .await
    }

    async fn delete(&self, id: i64) -> Result<(), ApiError> {
        self.execute(Method::DELETE, &format!("/todos/{}", id), &[], NO_BODY)
            .await
            .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use serde_json::json;

    fn client(base_url: &str, token: Option<&str>) -> TodoClient {
        client_with_timeout(base_url, token, 2_000)
    }

    fn client_with_timeout(base_url: &str, token: Option<&str>, timeout_in_ms: u64) -> TodoClient {
        let config = RemoteConfig {
            base_url: base_url.to_string(),
            timeout_in_ms,
            rate_limit_backoff_in_ms: 1,
        };
        TodoClient::new(
            remote_http_client(&config).unwrap(),
            &config,
            CredentialSlot::new(token.map(str::to_string)),
            Metrics::new(),
        )
    }

    #[tokio::test]
    async fn test_list_by_owner_sends_filter_and_bearer() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/todos")
            .match_query(Matcher::UrlEncoded("userId".into(), "3".into()))
            .match_header("authorization", "Bearer tok")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!([{"id": 1, "userId": 3, "title": "milk", "completed": false}]).to_string())
            .expect(1)
            .create_async()
            .await;

        let todos = client(&server.url(), Some("tok"))
            .list_by_owner(3)
            .await
            .unwrap();
        assert_eq!(todos.len(), 1);
        assert_eq!(todos[0].user_id, 3);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_missing_credential_sends_no_header() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/todos/5")
            .match_header("authorization", Matcher::Missing)
            .with_status(200)
            .with_body(json!({"id": 5, "userId": 1, "title": "x", "completed": true}).to_string())
            .create_async()
            .await;

        let todo = client(&server.url(), None).get_by_id(5).await.unwrap();
        assert!(todo.completed);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_unauthorized_clears_credential() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/todos")
            .with_status(401)
            .expect(1)
            .create_async()
            .await;

        let c = client(&server.url(), Some("stale"));
        assert_eq!(c.list_all().await, Err(ApiError::Unauthorized));
        assert!(!c.credential().is_present());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_forbidden_keeps_credential() {
        let mut server = Server::new_async().await;
        server
            .mock("DELETE", "/todos/9")
            .with_status(403)
            .create_async()
            .await;

        let c = client(&server.url(), Some("tok"));
        assert_eq!(c.delete(9).await, Err(ApiError::Forbidden));
        assert!(c.credential().is_present());
    }

    #[tokio::test]
    async fn test_rate_limit_is_retried_exactly_once() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/todos")
            .with_status(429)
            .expect(2)
            .create_async()
            .await;

        let result = client(&server.url(), None).list_all().await;
        assert_eq!(result, Err(ApiError::RateLimited));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_create_is_not_retried() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/todos")
            .match_body(Matcher::PartialJson(json!({"userId": 1, "title": "new"})))
            .with_status(500)
            .expect(1)
            .create_async()
            .await;

        let result = client(&server.url(), None)
            .create(&NewTodo {
                user_id: 1,
                title: "new".to_string(),
                completed: false,
            })
            .await;
        assert_eq!(result, Err(ApiError::Status(500)));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_not_found_and_decode_errors() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/todos/404")
            .with_status(404)
            .create_async()
            .await;
        server
            .mock("PATCH", "/todos/1")
            .with_status(200)
            .with_body("not json")
            .create_async()
            .await;

        let c = client(&server.url(), None);
        assert_eq!(c.get_by_id(404).await, Err(ApiError::NotFound));
        assert!(matches!(
            c.update(1, &TodoPatch::default()).await,
            Err(ApiError::Decode(_))
        ));
    }

    #[tokio::test]
    async fn test_connection_refused_is_unreachable() {
        let result = client("http://127.0.0.1:1", None).list_all().await;
        assert_eq!(result, Err(ApiError::Unreachable));
    }

    /// Accepts one connection, writes `preamble` and then goes silent.
    async fn stalled_remote(preamble: &'static [u8]) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).await;
            let _ = socket.write_all(preamble).await;
            tokio::time::sleep(Duration::from_secs(30)).await;
            drop(socket);
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_remote_that_never_answers_is_unreachable() {
        let url = stalled_remote(b"").await;
        let started = Instant::now();
        let result = client_with_timeout(&url, None, 200).list_all().await;
        assert_eq!(result, Err(ApiError::Unreachable));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_body_that_stalls_is_unreachable() {
        let url = stalled_remote(
            b"HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: 64\r\n\r\n[",
        )
        .await;
        let result = client_with_timeout(&url, None, 200).list_all().await;
        assert_eq!(result, Err(ApiError::Unreachable));
    }
}
