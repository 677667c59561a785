//! REST client for a remote task store.
//!
//! `HttpStore` implements the store traits against the endpoints served by
//! `tb serve`, translating HTTP status codes back into the crate's `Error`
//! variants so callers see the same taxonomy locally and remotely.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use crate::error::{Error, Result};
use crate::project::{NewProject, ProjectPatch, ProjectSummary};
use crate::store::{NoteStore, ProjectStore, TaskStore, TimeEntryStore};
use crate::task::*;

#[derive(Debug, Clone)]
pub struct HttpStore {
    client: Client,
    base_url: String,
    token: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

impl HttpStore {
    /// `base_url` is the API root, e.g. `http://127.0.0.1:8080/api`.
    pub fn new(base_url: &str, token: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Network(format!("cannot build http client: {e}")))?;
        Ok(HttpStore {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn execute(&self, req: RequestBuilder) -> Result<Response> {
        let resp = req.bearer_auth(&self.token).send().await?;
        debug!(status = %resp.status(), url = %resp.url(), "store response");
        if resp.status().is_success() {
            Ok(resp)
        } else {
            Err(error_from_response(resp).await)
        }
    }

    async fn json<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T> {
        Ok(self.execute(req).await?.json().await?)
    }

    async fn unit(&self, req: RequestBuilder) -> Result<()> {
        self.execute(req).await.map(|_| ())
    }
}

/// Map a non-success response onto the error taxonomy.
async fn error_from_response(resp: Response) -> Error {
    let status = resp.status();
    let message = match resp.json::<ErrorBody>().await {
        Ok(body) => body.error,
        Err(_) => status.canonical_reason().unwrap_or("request failed").to_string(),
    };
    error_for_status(status, message)
}

fn error_for_status(status: StatusCode, message: String) -> Error {
    match status {
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => Error::Validation(message),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Error::Auth(message),
        StatusCode::NOT_FOUND => Error::NotFound(message),
        StatusCode::CONFLICT => Error::Conflict(message),
        other => Error::Network(format!("{other}: {message}")),
    }
}

#[async_trait]
impl TaskStore for HttpStore {
    async fn list_tasks(&self, filter: &TaskFilter) -> Result<TaskPage> {
        self.json(self.client.get(self.url("/tasks")).query(filter)).await
    }

    async fn get_task(&self, id: u64) -> Result<TaskDetail> {
        self.json(self.client.get(self.url(&format!("/tasks/{id}")))).await
    }

    async fn create_task(&self, new: NewTask) -> Result<Task> {
        self.json(self.client.post(self.url("/tasks")).json(&new)).await
    }

    async fn update_task(&self, id: u64, patch: TaskPatch) -> Result<Task> {
        self.json(self.client.put(self.url(&format!("/tasks/{id}"))).json(&patch)).await
    }

    async fn delete_task(&self, id: u64) -> Result<()> {
        self.unit(self.client.delete(self.url(&format!("/tasks/{id}")))).await
    }
}

#[async_trait]
impl NoteStore for HttpStore {
    async fn list_notes(&self, task_id: u64) -> Result<Vec<TaskNote>> {
        self.json(self.client.get(self.url(&format!("/tasks/{task_id}/notes")))).await
    }

    async fn add_note(&self, task_id: u64, text: String) -> Result<TaskNote> {
        let body = NewNote { text };
        self.json(self.client.post(self.url(&format!("/tasks/{task_id}/notes"))).json(&body))
            .await
    }

    async fn delete_note(&self, note_id: u64) -> Result<()> {
        self.unit(self.client.delete(self.url(&format!("/notes/{note_id}")))).await
    }
}

#[async_trait]
impl TimeEntryStore for HttpStore {
    async fn list_time_entries(&self, task_id: u64) -> Result<TimeSheet> {
        self.json(self.client.get(self.url(&format!("/tasks/{task_id}/time-entries")))).await
    }

    async fn add_time_entry(&self, task_id: u64, input: TimeEntryInput) -> Result<TimeEntry> {
        let url = self.url(&format!("/tasks/{task_id}/time-entries"));
        self.json(self.client.post(url).json(&input)).await
    }

    async fn update_time_entry(&self, entry_id: u64, input: TimeEntryInput) -> Result<TimeEntry> {
        let url = self.url(&format!("/time-entries/{entry_id}"));
        self.json(self.client.put(url).json(&input)).await
    }

    async fn delete_time_entry(&self, entry_id: u64) -> Result<()> {
        self.unit(self.client.delete(self.url(&format!("/time-entries/{entry_id}")))).await
    }
}

#[async_trait]
impl ProjectStore for HttpStore {
    async fn list_projects(&self) -> Result<Vec<ProjectSummary>> {
        self.json(self.client.get(self.url("/projects"))).await
    }

    async fn get_project(&self, id: u64) -> Result<ProjectSummary> {
        self.json(self.client.get(self.url(&format!("/projects/{id}")))).await
    }

    async fn create_project(&self, new: NewProject) -> Result<ProjectSummary> {
        self.json(self.client.post(self.url("/projects")).json(&new)).await
    }

    async fn update_project(&self, id: u64, patch: ProjectPatch) -> Result<ProjectSummary> {
        self.json(self.client.put(self.url(&format!("/projects/{id}"))).json(&patch)).await
    }

    async fn delete_project(&self, id: u64) -> Result<()> {
        self.unit(self.client.delete(self.url(&format!("/projects/{id}")))).await
    }
}
