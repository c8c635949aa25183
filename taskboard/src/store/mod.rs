//! Remote task store abstraction.
//!
//! Defines the [`TaskStore`] trait the board talks to for every committed
//! mutation. Concrete implementations:
//! - [`http::HttpTaskStore`]: the project backend over REST
//! - [`memory::MemoryTaskStore`]: in-process store for tests

pub mod http;
pub mod memory;

use std::future::Future;

use taskboard_proto::activity::ActivityEntry;
use taskboard_proto::chat::ChatMessage;
use taskboard_proto::task::{
    Member, MemberId, NewTask, Project, ProjectId, SubTask, SubTaskId, Task, TaskId,
};

/// Errors that can occur during store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The request could not be sent, timed out, or its body was unreadable.
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The backend answered with a non-success status.
    #[error("backend returned {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, possibly truncated.
        body: String,
    },

    /// The configured base URL is not usable.
    #[error("invalid API URL: {0}")]
    InvalidUrl(String),

    /// The store refused the operation.
    #[error("rejected: {0}")]
    Rejected(String),
}

/// Async CRUD interface to the backend that owns tasks, sub-tasks and
/// project membership.
///
/// Every method resolves only after the backend has committed the change and
/// returns the record as stored. Implementations are shared across spawned
/// tasks, so they must be `Send + Sync + 'static`.
pub trait TaskStore: Send + Sync + 'static {
    /// Fetch the full task snapshot of a project.
    fn list_tasks(
        &self,
        project: ProjectId,
    ) -> impl Future<Output = Result<Vec<Task>, StoreError>> + Send;

    /// Create a task.
    fn create_task(
        &self,
        project: ProjectId,
        task: &NewTask,
    ) -> impl Future<Output = Result<Task, StoreError>> + Send;

    /// Replace a task (edit and move both go through here).
    fn update_task(
        &self,
        project: ProjectId,
        task: &Task,
    ) -> impl Future<Output = Result<Task, StoreError>> + Send;

    /// Delete a task.
    fn delete_task(
        &self,
        project: ProjectId,
        task: TaskId,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Create a sub-task under `task`.
    fn create_subtask(
        &self,
        project: ProjectId,
        task: TaskId,
        title: &str,
    ) -> impl Future<Output = Result<SubTask, StoreError>> + Send;

    /// Set a sub-task's completion flag.
    fn set_subtask_completed(
        &self,
        project: ProjectId,
        task: TaskId,
        subtask: SubTaskId,
        completed: bool,
    ) -> impl Future<Output = Result<SubTask, StoreError>> + Send;

    /// Delete a sub-task.
    fn delete_subtask(
        &self,
        project: ProjectId,
        task: TaskId,
        subtask: SubTaskId,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Fetch the project's activity history, newest first.
    fn list_activity(
        &self,
        project: ProjectId,
    ) -> impl Future<Output = Result<Vec<ActivityEntry>, StoreError>> + Send;

    /// Fetch the project's chat history, oldest first.
    fn list_chat(
        &self,
        project: ProjectId,
    ) -> impl Future<Output = Result<Vec<ChatMessage>, StoreError>> + Send;

    /// Fetch project details, including its manager.
    fn get_project(
        &self,
        project: ProjectId,
    ) -> impl Future<Output = Result<Project, StoreError>> + Send;

    /// Fetch the project's members.
    fn list_members(
        &self,
        project: ProjectId,
    ) -> impl Future<Output = Result<Vec<Member>, StoreError>> + Send;

    /// Add existing accounts to the project by username.
    fn invite_members(
        &self,
        project: ProjectId,
        usernames: &[String],
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Hand the manager role to a member; returns the updated project.
    fn set_manager(
        &self,
        project: ProjectId,
        member: MemberId,
    ) -> impl Future<Output = Result<Project, StoreError>> + Send;

    /// Remove a member from the project.
    fn remove_member(
        &self,
        project: ProjectId,
        member: MemberId,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
}
