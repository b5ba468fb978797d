use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::client::ApiError;

/// A general purpose HTTP error type that renders as `{"error": "..."}`.
#[derive(Debug)]
pub struct HTTPError {
    status: StatusCode,
    message: String,
    challenge: Option<String>,
}

impl HTTPError {
    /// Creates a new HTTP error with the given status code, message and optional
    /// `WWW-Authenticate` challenge.
    pub fn new(status: StatusCode, message: impl Into<String>, challenge: Option<String>) -> Self {
        HTTPError {
            status,
            message: message.into(),
            challenge,
        }
    }

    pub fn unauthorized() -> Self {
        HTTPError::new(
            StatusCode::UNAUTHORIZED,
            "Unauthorized access",
            Some("Bearer realm=\"todotron\"".to_string()),
        )
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for HTTPError {
    fn into_response(self) -> Response {
        let mut response = (self.status, Json(json!({ "error": self.message }))).into_response();
        if let Some(challenge) = self.challenge {
            if let Ok(value) = HeaderValue::from_str(&challenge) {
                response
                    .headers_mut()
                    .insert(header::WWW_AUTHENTICATE, value);
            }
        }
        response
    }
}

/// Transport errors from the to-do facade, as seen by our own HTTP callers.
impl From<ApiError> for HTTPError {
    fn from(err: ApiError) -> Self {
        let status = match err {
            ApiError::Unauthorized => return HTTPError::unauthorized(),
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Unreachable | ApiError::Status(_) | ApiError::Decode(_) => {
                StatusCode::BAD_GATEWAY
            }
        };
        HTTPError::new(status, err.to_string(), None)
    }
}
