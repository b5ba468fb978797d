//! The two pages: the to-do view and the login page. Both render JSON view
//! models; presentation is left to whatever sits in front.

use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use axum::{routing::get, Json, Router};
use serde::{Deserialize, Serialize};

use super::{page_failure, provider_infos};
use crate::auth::Session;
use crate::client::ApiError;
use crate::gate::safe_return_path;
use crate::models::Todo;
use crate::providers::ProviderInfo;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(todo_view))
        .route("/login", get(login_view))
}

#[derive(Serialize)]
struct UserView {
    id: String,
    name: String,
    email: String,
}

#[derive(Serialize)]
struct TodoView {
    user: UserView,
    todos: Vec<Todo>,
    /// Set when a refresh failed; `todos` then holds the last data we had.
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// The caller's to-dos. Accounts without a numeric id own none remotely and
/// see the full collection instead.
async fn todo_view(session: Session, State(state): State<AppState>) -> Response {
    let workspace = state
        .workspaces
        .for_session(&session.credential.subject, &session.token);
    let result = match session.credential.owner_id() {
        Some(owner) => workspace.queries.list_by_owner(owner).await,
        None => workspace.queries.list_all().await,
    };

    let (todos, error) = match (result.data, result.error) {
        (_, Some(ApiError::Unauthorized)) => {
            return page_failure(&state, &session, ApiError::Unauthorized, "/")
        }
        (Some(todos), error) => (todos, error),
        (None, Some(err)) => return page_failure(&state, &session, err, "/"),
        (None, None) => (Vec::new(), None),
    };

    let credential = session.credential;
    Json(TodoView {
        user: UserView {
            id: credential.subject,
            name: credential.name,
            email: credential.email,
        },
        todos,
        error: error.map(|e| e.to_string()),
    })
    .into_response()
}

#[derive(Deserialize)]
struct LoginQuery {
    #[serde(rename = "callbackUrl")]
    callback_url: Option<String>,
    error: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LoginView {
    providers: Vec<ProviderInfo>,
    callback_url: String,
    error: Option<String>,
}

async fn login_view(State(state): State<AppState>, Query(query): Query<LoginQuery>) -> Json<LoginView> {
    Json(LoginView {
        providers: provider_infos(&state),
        callback_url: safe_return_path(query.callback_url.as_deref()),
        error: query.error,
    })
}
