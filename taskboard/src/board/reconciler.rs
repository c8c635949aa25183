//! Applies local and remote mutations to a [`BoardState`].
//!
//! Remote sync events are applied last-write-wins by identifier, in delivery
//! order. A local [`Intent`] is first planned against the current state, then
//! committed through the [`TaskStore`], and only the committed result is
//! applied: it is turned into the same [`SyncEvent`] that gets broadcast, so
//! local and remote changes take the same path into the board.

use taskboard_proto::event::{SyncEvent, TaskField};
use taskboard_proto::task::{
    MAX_TASK_TITLE_LENGTH, NewTask, ProjectId, SubTaskId, Task, TaskId, TaskStatus,
};

use super::{BoardError, BoardState, Intent, Outcome, SkipReason};
use crate::store::{StoreError, TaskStore};

/// A validated intent, ready to be committed.
///
/// Holds everything needed to call the store, so it can be executed away
/// from the reconciler (for example in a spawned task).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Plan {
    /// `POST` a new task.
    Create(NewTask),
    /// `PUT` the task with its new status.
    Move {
        /// The task as it should be stored.
        task: Task,
        /// Column it is leaving.
        from: TaskStatus,
    },
    /// `PUT` the edited task.
    Edit {
        /// The task as it should be stored.
        task: Task,
        /// Fields that differ from the stored version.
        edited_fields: Vec<TaskField>,
    },
    /// `DELETE` the task.
    Delete {
        /// Task to delete.
        id: TaskId,
        /// Its title, carried in the broadcast event.
        title: String,
    },
    /// `POST` a sub-task.
    AddSubTask {
        /// Parent task.
        task: TaskId,
        /// Sub-task title.
        title: String,
    },
    /// `PATCH` a sub-task's completion.
    SetSubTaskCompleted {
        /// Parent task.
        task: TaskId,
        /// Sub-task to update.
        subtask: SubTaskId,
        /// New completion flag.
        completed: bool,
    },
    /// `DELETE` a sub-task.
    DeleteSubTask {
        /// Parent task.
        task: TaskId,
        /// Sub-task to delete.
        subtask: SubTaskId,
    },
    /// Nothing to commit; the event is broadcast as is.
    Broadcast(SyncEvent),
}

impl Plan {
    /// Whether executing the plan calls the store.
    #[must_use]
    pub const fn needs_store(&self) -> bool {
        !matches!(self, Self::Broadcast(_))
    }

    /// Commits the plan and returns the event describing the stored result.
    ///
    /// # Errors
    ///
    /// Propagates the store's error; nothing has been applied in that case.
    pub async fn execute<S: TaskStore>(
        self,
        store: &S,
        project: ProjectId,
    ) -> Result<SyncEvent, StoreError> {
        match self {
            Self::Create(new) => store
                .create_task(project, &new)
                .await
                .map(SyncEvent::TaskCreated),
            Self::Move { task, from } => {
                let to = task.status;
                let stored = store.update_task(project, &task).await?;
                Ok(SyncEvent::TaskMoved {
                    task: stored,
                    from_status: Some(from),
                    to_status: Some(to),
                })
            }
            Self::Edit {
                task,
                edited_fields,
            } => {
                let stored = store.update_task(project, &task).await?;
                Ok(SyncEvent::TaskEdited {
                    task: stored,
                    edited_fields,
                })
            }
            Self::Delete { id, title } => {
                store.delete_task(project, id).await?;
                Ok(SyncEvent::TaskDeleted {
                    id,
                    title: Some(title),
                })
            }
            Self::AddSubTask { task, title } => store
                .create_subtask(project, task, &title)
                .await
                .map(SyncEvent::SubTaskCreated),
            Self::SetSubTaskCompleted {
                task,
                subtask,
                completed,
            } => store
                .set_subtask_completed(project, task, subtask, completed)
                .await
                .map(SyncEvent::SubTaskUpdated),
            Self::DeleteSubTask { task, subtask } => {
                store.delete_subtask(project, task, subtask).await?;
                Ok(SyncEvent::SubTaskDeleted {
                    task_id: task,
                    subtask_id: subtask,
                })
            }
            Self::Broadcast(event) => Ok(event),
        }
    }
}

/// Owns the board state of one project.
#[derive(Debug, Clone)]
pub struct Reconciler {
    project: ProjectId,
    state: BoardState,
}

impl Reconciler {
    /// A reconciler with an empty board.
    #[must_use]
    pub fn new(project: ProjectId) -> Self {
        Self {
            project,
            state: BoardState::new(),
        }
    }

    /// A reconciler seeded from a REST snapshot.
    #[must_use]
    pub fn hydrate(project: ProjectId, snapshot: Vec<Task>) -> Self {
        Self {
            project,
            state: BoardState::from_snapshot(snapshot),
        }
    }

    /// The project this board belongs to.
    #[must_use]
    pub const fn project(&self) -> ProjectId {
        self.project
    }

    /// Current board state.
    #[must_use]
    pub const fn state(&self) -> &BoardState {
        &self.state
    }

    /// Applies one sync event.
    ///
    /// Never fails: events for unknown or already-removed targets are
    /// dropped and reported as [`Outcome::Skipped`].
    pub fn apply_remote_event(&mut self, event: &SyncEvent) -> Outcome {
        let outcome = self.apply(event);
        if let Outcome::Skipped(reason) = outcome {
            tracing::debug!(
                project = %self.project,
                action = %event.action(),
                task_id = %event.task_id(),
                %reason,
                "sync event skipped"
            );
        }
        outcome
    }

    fn apply(&mut self, event: &SyncEvent) -> Outcome {
        match event {
            SyncEvent::TaskCreated(task) => {
                if self.state.contains(task.id) {
                    return Outcome::Skipped(SkipReason::DuplicateTask);
                }
                self.state.push(task.clone());
                Outcome::Changed
            }
            SyncEvent::TaskUpdated(task) | SyncEvent::TaskEdited { task, .. } => {
                if !self.state.replace(task.clone()) {
                    return Outcome::Skipped(SkipReason::UnknownTask);
                }
                self.state.clear_previews(task.id);
                Outcome::Changed
            }
            SyncEvent::TaskMoved {
                task, from_status, ..
            } => {
                let Some(stored) = self.state.task(task.id) else {
                    return Outcome::Skipped(SkipReason::UnknownTask);
                };
                if let Some(from) = from_status
                    && *from != stored.status
                {
                    tracing::info!(
                        project = %self.project,
                        task_id = %task.id,
                        sender_from = %from,
                        stored_from = %stored.status,
                        "moved event disagrees with stored column"
                    );
                }
                self.state.replace(task.clone());
                Outcome::Changed
            }
            SyncEvent::TaskDeleted { id, .. } => {
                if self.state.remove(*id) {
                    Outcome::Changed
                } else {
                    Outcome::Skipped(SkipReason::AlreadyAbsent)
                }
            }
            SyncEvent::SubTaskCreated(sub) => {
                let Some(parent) = self.state.task_mut(sub.task) else {
                    return Outcome::Skipped(SkipReason::UnknownTask);
                };
                if parent.subtask(sub.id).is_some() {
                    return Outcome::Skipped(SkipReason::DuplicateSubTask);
                }
                parent.subtasks.push(sub.clone());
                Outcome::Changed
            }
            SyncEvent::SubTaskUpdated(sub) | SyncEvent::SubTaskMoved(sub) => {
                let Some(parent) = self.state.task_mut(sub.task) else {
                    return Outcome::Skipped(SkipReason::UnknownTask);
                };
                match parent.subtasks.iter_mut().find(|s| s.id == sub.id) {
                    Some(slot) => {
                        *slot = sub.clone();
                        Outcome::Changed
                    }
                    None => Outcome::Skipped(SkipReason::UnknownSubTask),
                }
            }
            SyncEvent::SubTaskDeleted {
                task_id,
                subtask_id,
            } => {
                let Some(parent) = self.state.task_mut(*task_id) else {
                    return Outcome::Skipped(SkipReason::UnknownTask);
                };
                let before = parent.subtasks.len();
                parent.subtasks.retain(|s| s.id != *subtask_id);
                if parent.subtasks.len() == before {
                    Outcome::Skipped(SkipReason::AlreadyAbsent)
                } else {
                    Outcome::Changed
                }
            }
            SyncEvent::Editing {
                task_id,
                field,
                value,
            } => {
                if !self.state.contains(*task_id) {
                    return Outcome::Skipped(SkipReason::UnknownTask);
                }
                self.state.set_preview(*task_id, *field, value.clone());
                Outcome::Changed
            }
        }
    }

    /// Validates an intent against the current board.
    ///
    /// Returns `Ok(None)` when the intent is a no-op (moving a task to the
    /// column it is already in).
    ///
    /// # Errors
    ///
    /// - [`BoardError::TitleEmpty`] / [`BoardError::TitleTooLong`] for bad titles.
    /// - [`BoardError::TaskNotFound`] / [`BoardError::SubTaskNotFound`] for
    ///   missing targets.
    pub fn plan(&self, intent: Intent) -> Result<Option<Plan>, BoardError> {
        let plan = match intent {
            Intent::AddTask { title, description } => Plan::Create(NewTask {
                title: validate_title(&title)?,
                description,
                status: TaskStatus::ToDo,
                project: self.project,
            }),
            Intent::MoveTask { task, to } => {
                let stored = self.require_task(task)?;
                if stored.status == to {
                    return Ok(None);
                }
                Plan::Move {
                    task: Task {
                        status: to,
                        ..stored.clone()
                    },
                    from: stored.status,
                }
            }
            Intent::EditTask(mut edited) => {
                let stored = self.require_task(edited.id)?;
                edited.title = validate_title(&edited.title)?;
                let edited_fields = edited_fields(stored, &edited);
                Plan::Edit {
                    task: edited,
                    edited_fields,
                }
            }
            Intent::DeleteTask(id) => Plan::Delete {
                id,
                title: self.require_task(id)?.title.clone(),
            },
            Intent::AddSubTask { task, title } => {
                self.require_task(task)?;
                Plan::AddSubTask {
                    task,
                    title: validate_title(&title)?,
                }
            }
            Intent::ToggleSubTask { task, subtask } => {
                let sub = self
                    .require_task(task)?
                    .subtask(subtask)
                    .ok_or(BoardError::SubTaskNotFound { task, subtask })?;
                Plan::SetSubTaskCompleted {
                    task,
                    subtask,
                    completed: !sub.completed,
                }
            }
            Intent::DeleteSubTask { task, subtask } => {
                self.require_task(task)?
                    .subtask(subtask)
                    .ok_or(BoardError::SubTaskNotFound { task, subtask })?;
                Plan::DeleteSubTask { task, subtask }
            }
            Intent::EditField { task, field, value } => {
                self.require_task(task)?;
                Plan::Broadcast(SyncEvent::Editing {
                    task_id: task,
                    field,
                    value,
                })
            }
        };
        Ok(Some(plan))
    }

    /// Plans, commits and applies a local intent.
    ///
    /// Returns the event to broadcast, or `None` for a no-op. On any error
    /// the board is left untouched.
    ///
    /// # Errors
    ///
    /// Validation errors from [`Self::plan`], or [`BoardError::Network`] if
    /// the store call fails.
    pub async fn apply_local_mutation<S: TaskStore>(
        &mut self,
        store: &S,
        intent: Intent,
    ) -> Result<Option<SyncEvent>, BoardError> {
        let Some(plan) = self.plan(intent)? else {
            return Ok(None);
        };
        let event = plan.execute(store, self.project).await?;
        self.apply_remote_event(&event);
        Ok(Some(event))
    }

    fn require_task(&self, id: TaskId) -> Result<&Task, BoardError> {
        self.state.task(id).ok_or(BoardError::TaskNotFound(id))
    }
}

/// Trims a title and checks it is non-empty and within the length limit.
fn validate_title(title: &str) -> Result<String, BoardError> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err(BoardError::TitleEmpty);
    }
    let len = trimmed.chars().count();
    if len > MAX_TASK_TITLE_LENGTH {
        return Err(BoardError::TitleTooLong {
            len,
            max: MAX_TASK_TITLE_LENGTH,
        });
    }
    Ok(trimmed.to_string())
}

/// The user-editable fields that differ between two versions of a task.
#[must_use]
pub fn edited_fields(before: &Task, after: &Task) -> Vec<TaskField> {
    let mut fields = Vec::new();
    if before.title != after.title {
        fields.push(TaskField::Title);
    }
    if before.description != after.description {
        fields.push(TaskField::Description);
    }
    if before.owner != after.owner {
        fields.push(TaskField::Owner);
    }
    if before.percentage != after.percentage {
        fields.push(TaskField::Percentage);
    }
    if before.deadline != after.deadline {
        fields.push(TaskField::Deadline);
    }
    fields
}
