//! REST server for the task store.
//!
//! Exposes a `LocalStore` over HTTP. Every route except `/api/health` requires
//! `Authorization: Bearer <token>`; store errors are rendered as
//! `{"error": "..."}` with a status code derived from the error variant.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Path, Query, Request, State};
use axum::http::{header::AUTHORIZATION, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, put};
use axum::{Json, Router};
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::error::{Error, Result};
use crate::project::{NewProject, ProjectPatch, ProjectSummary};
use crate::store::{LocalStore, NoteStore, ProjectStore, TaskStore, TimeEntryStore};
use crate::task::*;

#[derive(Clone)]
pub struct ServerState {
    pub store: LocalStore,
    pub token: Arc<str>,
}

#[derive(Serialize)]
struct Success {
    success: bool,
}

const SUCCESS: Json<Success> = Json(Success { success: true });

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::Auth(_) => StatusCode::UNAUTHORIZED,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Conflict(_) => StatusCode::CONFLICT,
            Error::Network(_) => StatusCode::BAD_GATEWAY,
            Error::Io(_) | Error::Serde(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!(error = %self, "request failed");
        }
        let message = match self {
            Error::Validation(m) | Error::NotFound(m) | Error::Conflict(m) | Error::Auth(m) => m,
            other => other.to_string(),
        };
        (status, Json(ErrorBody { error: message })).into_response()
    }
}

/// Build the application router.
pub fn router(state: ServerState) -> Router {
    let api = Router::new()
        .route("/tasks", get(list_tasks).post(create_task))
        .route("/tasks/{id}", get(get_task).put(update_task).delete(delete_task))
        .route("/tasks/{id}/notes", get(list_notes).post(add_note))
        .route("/notes/{id}", delete(delete_note))
        .route("/tasks/{id}/time-entries", get(list_time_entries).post(add_time_entry))
        .route("/time-entries/{id}", put(update_time_entry).delete(delete_time_entry))
        .route("/projects", get(list_projects).post(create_project))
        .route("/projects/{id}", get(get_project).put(update_project).delete(delete_project))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_bearer))
        // Registered after the auth layer so it stays public.
        .route("/health", get(health));

    Router::new()
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the store on `bind` until Ctrl-C.
pub async fn serve(store: LocalStore, token: String, bind: SocketAddr) -> Result<()> {
    let state = ServerState {
        store,
        token: Arc::from(token),
    };
    let listener = TcpListener::bind(bind).await?;
    info!(addr = %listener.local_addr()?, "task store listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "cannot listen for shutdown signal");
            }
        })
        .await?;
    info!("task store stopped");
    Ok(())
}

async fn require_bearer(State(state): State<ServerState>, req: Request, next: Next) -> Response {
    let presented = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim);
    match presented {
        Some(token) if token == &*state.token => next.run(req).await,
        Some(_) => {
            warn!(path = %req.uri().path(), "rejected invalid bearer token");
            Error::Auth("invalid bearer token".into()).into_response()
        }
        None => Error::Auth("missing bearer token".into()).into_response(),
    }
}

async fn health() -> &'static str {
    "ok"
}

async fn list_tasks(State(s): State<ServerState>, Query(filter): Query<TaskFilter>) -> Result<Json<TaskPage>> {
    Ok(Json(s.store.list_tasks(&filter).await?))
}

async fn get_task(State(s): State<ServerState>, Path(id): Path<u64>) -> Result<Json<TaskDetail>> {
    Ok(Json(s.store.get_task(id).await?))
}

async fn create_task(State(s): State<ServerState>, Json(new): Json<NewTask>) -> Result<(StatusCode, Json<Task>)> {
    let task = s.store.create_task(new).await?;
    info!(task = task.id, "task created");
    Ok((StatusCode::CREATED, Json(task)))
}

async fn update_task(
    State(s): State<ServerState>,
    Path(id): Path<u64>,
    Json(patch): Json<TaskPatch>,
) -> Result<Json<Task>> {
    Ok(Json(s.store.update_task(id, patch).await?))
}

async fn delete_task(State(s): State<ServerState>, Path(id): Path<u64>) -> Result<Json<Success>> {
    s.store.delete_task(id).await?;
    info!(task = id, "task deleted");
    Ok(SUCCESS)
}

async fn list_notes(State(s): State<ServerState>, Path(id): Path<u64>) -> Result<Json<Vec<TaskNote>>> {
    Ok(Json(s.store.list_notes(id).await?))
}

async fn add_note(
    State(s): State<ServerState>,
    Path(id): Path<u64>,
    Json(note): Json<NewNote>,
) -> Result<(StatusCode, Json<TaskNote>)> {
    Ok((StatusCode::CREATED, Json(s.store.add_note(id, note.text).await?)))
}

async fn delete_note(State(s): State<ServerState>, Path(id): Path<u64>) -> Result<Json<Success>> {
    s.store.delete_note(id).await?;
    Ok(SUCCESS)
}

async fn list_time_entries(State(s): State<ServerState>, Path(id): Path<u64>) -> Result<Json<TimeSheet>> {
    Ok(Json(s.store.list_time_entries(id).await?))
}

async fn add_time_entry(
    State(s): State<ServerState>,
    Path(id): Path<u64>,
    Json(input): Json<TimeEntryInput>,
) -> Result<(StatusCode, Json<TimeEntry>)> {
    Ok((StatusCode::CREATED, Json(s.store.add_time_entry(id, input).await?)))
}

async fn update_time_entry(
    State(s): State<ServerState>,
    Path(id): Path<u64>,
    Json(input): Json<TimeEntryInput>,
) -> Result<Json<TimeEntry>> {
    Ok(Json(s.store.update_time_entry(id, input).await?))
}

async fn delete_time_entry(State(s): State<ServerState>, Path(id): Path<u64>) -> Result<Json<Success>> {
    s.store.delete_time_entry(id).await?;
    Ok(SUCCESS)
}

async fn list_projects(State(s): State<ServerState>) -> Result<Json<Vec<ProjectSummary>>> {
    Ok(Json(s.store.list_projects().await?))
}

async fn get_project(State(s): State<ServerState>, Path(id): Path<u64>) -> Result<Json<ProjectSummary>> {
    Ok(Json(s.store.get_project(id).await?))
}

async fn create_project(
    State(s): State<ServerState>,
    Json(new): Json<NewProject>,
) -> Result<(StatusCode, Json<ProjectSummary>)> {
    Ok((StatusCode::CREATED, Json(s.store.create_project(new).await?)))
}

async fn update_project(
    State(s): State<ServerState>,
    Path(id): Path<u64>,
    Json(patch): Json<ProjectPatch>,
) -> Result<Json<ProjectSummary>> {
    Ok(Json(s.store.update_project(id, patch).await?))
}

async fn delete_project(State(s): State<ServerState>, Path(id): Path<u64>) -> Result<Json<Success>> {
    s.store.delete_project(id).await?;
    Ok(SUCCESS)
}
