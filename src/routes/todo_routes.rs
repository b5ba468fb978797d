//! The protected to-do API. Every handler takes a [`Session`], so the
//! credential is verified here as well as at the gate.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{routing::get, Json, Router};
use serde::Deserialize;

use super::api_failure;
use crate::auth::Session;
use crate::models::{NewTodo, Todo, TodoPatch};
use crate::state::AppState;
use crate::utils::http_helpers::HTTPError;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/protected/todos", get(list_mine).post(create_todo))
        .route("/api/protected/todos/all", get(list_all))
        .route(
            "/api/protected/todos/{id}",
            get(get_todo).patch(update_todo).delete(delete_todo),
        )
}

type ApiResult<T> = Result<T, Response>;

async fn list_mine(session: Session, State(state): State<AppState>) -> ApiResult<Json<Vec<Todo>>> {
    let workspace = state
        .workspaces
        .for_session(&session.credential.subject, &session.token);
    let result = match session.credential.owner_id() {
        Some(owner) => workspace.queries.list_by_owner(owner).await,
        None => workspace.queries.list_all().await,
    };
    result
        .into_result()
        .map(Json)
        .map_err(|e| api_failure(&state, &session, e))
}

async fn list_all(session: Session, State(state): State<AppState>) -> ApiResult<Json<Vec<Todo>>> {
    let workspace = state
        .workspaces
        .for_session(&session.credential.subject, &session.token);
    workspace
        .queries
        .list_all()
        .await
        .into_result()
        .map(Json)
        .map_err(|e| api_failure(&state, &session, e))
}

async fn get_todo(
    session: Session,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Todo>> {
    let workspace = state
        .workspaces
        .for_session(&session.credential.subject, &session.token);
    workspace
        .queries
        .get_by_id(id)
        .await
        .into_result()
        .map(Json)
        .map_err(|e| api_failure(&state, &session, e))
}

#[derive(Deserialize)]
struct CreateTodo {
    title: String,
    #[serde(default)]
    completed: bool,
}

/// Creates a to-do owned by the caller.
async fn create_todo(
    session: Session,
    State(state): State<AppState>,
    Json(body): Json<CreateTodo>,
) -> ApiResult<(StatusCode, Json<Todo>)> {
    let Some(owner) = session.credential.owner_id() else {
        return Err(HTTPError::new(
            StatusCode::FORBIDDEN,
            "this account cannot own to-dos",
            None,
        )
        .into_response());
    };
    let title = body.title.trim();
    if title.is_empty() {
        return Err(
            HTTPError::new(StatusCode::BAD_REQUEST, "title must not be empty", None).into_response(),
        );
    }

    let workspace = state
        .workspaces
        .for_session(&session.credential.subject, &session.token);
    let new = NewTodo {
        user_id: owner,
        title: title.to_string(),
        completed: body.completed,
    };
    workspace
        .queries
        .create(&new)
        .await
        .map(|todo| (StatusCode::CREATED, Json(todo)))
        .map_err(|e| api_failure(&state, &session, e))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateTodo {
    user_id: Option<i64>,
    title: Option<String>,
    completed: Option<bool>,
}

/// Updates title and completion. Ownership never moves through this
/// endpoint; naming any owner but the caller is refused.
async fn update_todo(
    session: Session,
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<UpdateTodo>,
) -> ApiResult<Json<Todo>> {
    if let Some(user_id) = body.user_id {
        if session.credential.owner_id() != Some(user_id) {
            return Err(HTTPError::new(
                StatusCode::FORBIDDEN,
                "to-dos can only be assigned to yourself",
                None,
            )
            .into_response());
        }
    }
    let title = match body.title {
        Some(title) if title.trim().is_empty() => {
            return Err(
                HTTPError::new(StatusCode::BAD_REQUEST, "title must not be empty", None)
                    .into_response(),
            );
        }
        title => title.map(|t| t.trim().to_string()),
    };
    let patch = TodoPatch {
        user_id: None,
        title,
        completed: body.completed,
    };

    let workspace = state
        .workspaces
        .for_session(&session.credential.subject, &session.token);
    workspace
        .queries
        .update(id, &patch)
        .await
        .map(Json)
        .map_err(|e| api_failure(&state, &session, e))
}

async fn delete_todo(
    session: Session,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    let workspace = state
        .workspaces
        .for_session(&session.credential.subject, &session.token);
    workspace
        .queries
        .delete(id)
        .await
        .map(|()| StatusCode::NO_CONTENT)
        .map_err(|e| api_failure(&state, &session, e))
}
