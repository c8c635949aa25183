//! REST routes under `/api`, mirroring the project backend's paths.
//!
//! Task routes are nested under the project; sub-task routes hang off the
//! task alone.

use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, patch, post, put};
use serde_json::json;

use taskboard_proto::activity::ActivityEntry;
use taskboard_proto::chat::ChatMessage;
use taskboard_proto::task::{Member, MemberId, Project, ProjectId, SubTask, SubTaskId, Task, TaskId};

use crate::server::StubState;
use crate::store::{CreateSubTask, CreateTask, Invite, PatchSubTask, SetManager, StoreError};

/// An error answered as `{"detail": ...}` with a matching status.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Missing or unknown bearer token.
    #[error("authentication credentials were not provided")]
    Unauthorized,
    /// The store refused the request.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Store(
                StoreError::TaskNotFound(_)
                | StoreError::SubTaskNotFound(_)
                | StoreError::UserNotFound(_)
                | StoreError::MemberNotFound(_),
            ) => StatusCode::NOT_FOUND,
            Self::Store(StoreError::Invalid(_)) => StatusCode::BAD_REQUEST,
        };
        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}

/// The REST router, to be nested under `/api`.
pub fn router() -> Router<Arc<StubState>> {
    Router::new()
        .route(
            "/projects/{project}/tasks/",
            get(list_tasks).post(create_task),
        )
        .route(
            "/projects/{project}/tasks/{task}/",
            put(update_task).delete(delete_task),
        )
        .route("/tasks/{task}/sub-tasks/", post(create_subtask))
        .route(
            "/tasks/{task}/sub-tasks/{subtask}/",
            patch(patch_subtask).delete(delete_subtask),
        )
        .route("/projects/{project}/", get(get_project))
        .route("/projects/{project}/members/", get(list_members))
        .route("/projects/{project}/invite/", post(invite))
        .route("/projects/{project}/set_manager/", patch(set_manager))
        .route(
            "/projects/{project}/kickmember/{member}/",
            delete(remove_member),
        )
        .route("/projects/{project}/activity-logs/", get(list_activity))
        .route("/projects/{project}/chat-messages/", get(list_chat))
}

fn authorize(state: &StubState, headers: &HeaderMap) -> Result<String, ApiError> {
    state.user_for(headers).ok_or(ApiError::Unauthorized)
}

async fn list_tasks(
    State(state): State<Arc<StubState>>,
    headers: HeaderMap,
    Path(project): Path<ProjectId>,
) -> Result<Json<Vec<Task>>, ApiError> {
    authorize(&state, &headers)?;
    Ok(Json(state.store.tasks(project)))
}

async fn create_task(
    State(state): State<Arc<StubState>>,
    headers: HeaderMap,
    Path(project): Path<ProjectId>,
    Json(body): Json<CreateTask>,
) -> Result<(StatusCode, Json<Task>), ApiError> {
    let user = authorize(&state, &headers)?;
    let task = state.store.create_task(project, body)?;
    tracing::info!(%project, task = %task.id, %user, "task created");
    Ok((StatusCode::CREATED, Json(task)))
}

async fn update_task(
    State(state): State<Arc<StubState>>,
    headers: HeaderMap,
    Path((project, task)): Path<(ProjectId, TaskId)>,
    Json(body): Json<Task>,
) -> Result<Json<Task>, ApiError> {
    authorize(&state, &headers)?;
    Ok(Json(state.store.update_task(project, task, body)?))
}

async fn delete_task(
    State(state): State<Arc<StubState>>,
    headers: HeaderMap,
    Path((project, task)): Path<(ProjectId, TaskId)>,
) -> Result<StatusCode, ApiError> {
    let user = authorize(&state, &headers)?;
    let removed = state.store.delete_task(project, task)?;
    tracing::info!(%project, task = %removed.id, %user, "task deleted");
    Ok(StatusCode::NO_CONTENT)
}

async fn create_subtask(
    State(state): State<Arc<StubState>>,
    headers: HeaderMap,
    Path(task): Path<TaskId>,
    Json(body): Json<CreateSubTask>,
) -> Result<(StatusCode, Json<SubTask>), ApiError> {
    authorize(&state, &headers)?;
    let sub = state.store.create_subtask(task, &body)?;
    Ok((StatusCode::CREATED, Json(sub)))
}

async fn patch_subtask(
    State(state): State<Arc<StubState>>,
    headers: HeaderMap,
    Path((task, subtask)): Path<(TaskId, SubTaskId)>,
    Json(body): Json<PatchSubTask>,
) -> Result<Json<SubTask>, ApiError> {
    authorize(&state, &headers)?;
    Ok(Json(state.store.patch_subtask(task, subtask, body)?))
}

async fn delete_subtask(
    State(state): State<Arc<StubState>>,
    headers: HeaderMap,
    Path((task, subtask)): Path<(TaskId, SubTaskId)>,
) -> Result<StatusCode, ApiError> {
    authorize(&state, &headers)?;
    state.store.delete_subtask(task, subtask)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn get_project(
    State(state): State<Arc<StubState>>,
    headers: HeaderMap,
    Path(project): Path<ProjectId>,
) -> Result<Json<Project>, ApiError> {
    authorize(&state, &headers)?;
    Ok(Json(state.store.project(project)))
}

async fn list_members(
    State(state): State<Arc<StubState>>,
    headers: HeaderMap,
    Path(project): Path<ProjectId>,
) -> Result<Json<Vec<Member>>, ApiError> {
    authorize(&state, &headers)?;
    Ok(Json(state.store.members(project)))
}

async fn invite(
    State(state): State<Arc<StubState>>,
    headers: HeaderMap,
    Path(project): Path<ProjectId>,
    Json(body): Json<Invite>,
) -> Result<Json<Vec<Member>>, ApiError> {
    let user = authorize(&state, &headers)?;
    let invited = state.store.invite(project, &body)?;
    tracing::info!(%project, %user, invited = invited.len(), "members invited");
    Ok(Json(invited))
}

async fn set_manager(
    State(state): State<Arc<StubState>>,
    headers: HeaderMap,
    Path(project): Path<ProjectId>,
    Json(body): Json<SetManager>,
) -> Result<Json<Project>, ApiError> {
    let user = authorize(&state, &headers)?;
    let details = state.store.set_manager(project, body.manager_id)?;
    tracing::info!(%project, %user, manager = %body.manager_id, "manager changed");
    Ok(Json(details))
}

async fn remove_member(
    State(state): State<Arc<StubState>>,
    headers: HeaderMap,
    Path((project, member)): Path<(ProjectId, MemberId)>,
) -> Result<StatusCode, ApiError> {
    let user = authorize(&state, &headers)?;
    state.store.remove_member(project, member)?;
    tracing::info!(%project, %user, %member, "member removed");
    Ok(StatusCode::NO_CONTENT)
}

async fn list_activity(
    State(state): State<Arc<StubState>>,
    headers: HeaderMap,
    Path(project): Path<ProjectId>,
) -> Result<Json<Vec<ActivityEntry>>, ApiError> {
    authorize(&state, &headers)?;
    Ok(Json(state.store.activity(project)))
}

async fn list_chat(
    State(state): State<Arc<StubState>>,
    headers: HeaderMap,
    Path(project): Path<ProjectId>,
) -> Result<Json<Vec<ChatMessage>>, ApiError> {
    authorize(&state, &headers)?;
    Ok(Json(state.store.chat(project)))
}
