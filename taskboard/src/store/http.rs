//! REST task store backed by `reqwest`.
//!
//! Paths are relative to the configured API base URL and keep the backend's
//! trailing slashes. Sub-task routes hang off the task alone, without the
//! project prefix. Every request carries the session's bearer token.

use std::time::Duration;

use reqwest::header::AUTHORIZATION;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use taskboard_proto::activity::ActivityEntry;
use taskboard_proto::chat::ChatMessage;
use taskboard_proto::task::{
    Member, MemberId, NewTask, Project, ProjectId, SubTask, SubTaskId, Task, TaskId,
};

use super::{StoreError, TaskStore};
use crate::session::Session;

/// Longest error body kept in [`StoreError::Status`].
const MAX_ERROR_BODY: usize = 512;

/// Settings for [`HttpTaskStore`].
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// REST API base URL, e.g. `http://localhost:8000/api`.
    pub api_url: String,
    /// Timeout applied to every request.
    pub request_timeout: Duration,
}

/// [`TaskStore`] talking to the project backend over HTTP.
#[derive(Debug, Clone)]
pub struct HttpTaskStore {
    client: Client,
    base: String,
    session: Session,
}

impl HttpTaskStore {
    /// Builds a store for `session`.
    ///
    /// # Errors
    ///
    /// - [`StoreError::InvalidUrl`] if `api_url` is not an http(s) URL.
    /// - [`StoreError::Request`] if the HTTP client cannot be built.
    pub fn new(config: &StoreConfig, session: Session) -> Result<Self, StoreError> {
        let parsed = url::Url::parse(&config.api_url)
            .map_err(|e| StoreError::InvalidUrl(format!("{}: {e}", config.api_url)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(StoreError::InvalidUrl(format!(
                "{}: expected http or https",
                config.api_url
            )));
        }
        let client = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self {
            client,
            base: config.api_url.trim_end_matches('/').to_string(),
            session,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    fn tasks_path(project: ProjectId) -> String {
        format!("/projects/{project}/tasks/")
    }

    fn task_path(project: ProjectId, task: TaskId) -> String {
        format!("/projects/{project}/tasks/{task}/")
    }

    fn subtasks_path(task: TaskId) -> String {
        format!("/tasks/{task}/sub-tasks/")
    }

    fn subtask_path(task: TaskId, subtask: SubTaskId) -> String {
        format!("/tasks/{task}/sub-tasks/{subtask}/")
    }

    fn project_path(project: ProjectId, rest: &str) -> String {
        format!("/projects/{project}/{rest}")
    }

    async fn fetch<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, StoreError> {
        let response = self.execute(request).await?;
        Ok(response.json().await?)
    }

    async fn execute(&self, request: RequestBuilder) -> Result<Response, StoreError> {
        let response = request
            .header(AUTHORIZATION, self.session.bearer().as_str())
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(err = %e, "REST request failed");
                StoreError::Request(e)
            })?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let mut body = response.text().await.unwrap_or_default();
        if body.len() > MAX_ERROR_BODY {
            let mut end = MAX_ERROR_BODY;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            body.truncate(end);
        }
        tracing::warn!(status = status.as_u16(), "backend rejected request");
        Err(StoreError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

impl TaskStore for HttpTaskStore {
    async fn list_tasks(&self, project: ProjectId) -> Result<Vec<Task>, StoreError> {
        let url = self.url(&Self::tasks_path(project));
        self.fetch(self.client.get(url)).await
    }

    async fn create_task(&self, project: ProjectId, task: &NewTask) -> Result<Task, StoreError> {
        let url = self.url(&Self::tasks_path(project));
        let mut body = serde_json::to_value(task)
            .map_err(|e| StoreError::Rejected(format!("unencodable task: {e}")))?;
        body["project_id"] = json!(project);
        self.fetch(self.client.post(url).json(&body)).await
    }

    async fn update_task(&self, project: ProjectId, task: &Task) -> Result<Task, StoreError> {
        let url = self.url(&Self::task_path(project, task.id));
        let mut body = serde_json::to_value(task)
            .map_err(|e| StoreError::Rejected(format!("unencodable task: {e}")))?;
        body["project_id"] = json!(project);
        self.fetch(self.client.put(url).json(&body)).await
    }

    async fn delete_task(&self, project: ProjectId, task: TaskId) -> Result<(), StoreError> {
        let url = self.url(&Self::task_path(project, task));
        self.execute(self.client.delete(url)).await.map(drop)
    }

    async fn create_subtask(
        &self,
        _project: ProjectId,
        task: TaskId,
        title: &str,
    ) -> Result<SubTask, StoreError> {
        let url = self.url(&Self::subtasks_path(task));
        let body = json!({"title": title, "task": task});
        self.fetch(self.client.post(url).json(&body)).await
    }

    async fn set_subtask_completed(
        &self,
        _project: ProjectId,
        task: TaskId,
        subtask: SubTaskId,
        completed: bool,
    ) -> Result<SubTask, StoreError> {
        let url = self.url(&Self::subtask_path(task, subtask));
        let body = json!({"completed": completed});
        self.fetch(self.client.patch(url).json(&body)).await
    }

    async fn delete_subtask(
        &self,
        _project: ProjectId,
        task: TaskId,
        subtask: SubTaskId,
    ) -> Result<(), StoreError> {
        let url = self.url(&Self::subtask_path(task, subtask));
        self.execute(self.client.delete(url)).await.map(drop)
    }

    async fn list_activity(&self, project: ProjectId) -> Result<Vec<ActivityEntry>, StoreError> {
        let url = self.url(&Self::project_path(project, "activity-logs/"));
        let rows: Vec<Value> = self.fetch(self.client.get(url)).await?;
        Ok(decode_rows(project, "activity", rows))
    }

    async fn list_chat(&self, project: ProjectId) -> Result<Vec<ChatMessage>, StoreError> {
        let url = self.url(&Self::project_path(project, "chat-messages/"));
        let rows: Vec<Value> = self.fetch(self.client.get(url)).await?;
        Ok(decode_rows(project, "chat", rows))
    }

    async fn get_project(&self, project: ProjectId) -> Result<Project, StoreError> {
        let url = self.url(&Self::project_path(project, ""));
        self.fetch(self.client.get(url)).await
    }

    async fn list_members(&self, project: ProjectId) -> Result<Vec<Member>, StoreError> {
        let url = self.url(&Self::project_path(project, "members/"));
        self.fetch(self.client.get(url)).await
    }

    async fn invite_members(
        &self,
        project: ProjectId,
        usernames: &[String],
    ) -> Result<(), StoreError> {
        let url = self.url(&Self::project_path(project, "invite/"));
        let body = json!({"usernames": usernames});
        self.execute(self.client.post(url).json(&body)).await.map(drop)
    }

    async fn set_manager(&self, project: ProjectId, member: MemberId) -> Result<Project, StoreError> {
        let url = self.url(&Self::project_path(project, "set_manager/"));
        let body = json!({"manager_id": member});
        self.fetch(self.client.patch(url).json(&body)).await
    }

    async fn remove_member(&self, project: ProjectId, member: MemberId) -> Result<(), StoreError> {
        let url = self.url(&Self::project_path(project, &format!("kickmember/{member}/")));
        self.execute(self.client.delete(url)).await.map(drop)
    }
}

/// History rows are decoded one by one; a bad row is logged and skipped.
fn decode_rows<T: DeserializeOwned>(project: ProjectId, kind: &str, rows: Vec<Value>) -> Vec<T> {
    rows.into_iter()
        .filter_map(|row| match serde_json::from_value(row) {
            Ok(item) => Some(item),
            Err(e) => {
                tracing::warn!(project = %project, kind, err = %e, "skipping malformed history row");
                None
            }
        })
        .collect()
}
