//! Liveness endpoint.

use axum::{routing::get, Router};

use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}

/// Public and cheap: it touches neither the remote collection nor the session authority.
async fn health_check() -> &'static str {
    "OK"
}
