//! The project task board.
//!
//! [`BoardState`] is the in-memory collection of tasks for one project.
//! [`Reconciler`] is the only thing that mutates it, applying both remote
//! sync events and locally requested [`Intent`]s. [`BoardSession`] runs a
//! reconciler inside one tokio task wired to the REST store and the
//! project's WebSocket channel; [`projection`] turns the state into the
//! three board columns.

pub mod projection;
pub mod reconciler;
pub mod session;
pub mod state;

use std::fmt;

use serde_json::Value;

use taskboard_proto::event::TaskField;
use taskboard_proto::task::{SubTaskId, Task, TaskId, TaskStatus};

pub use projection::{Projection, TaskDisplay, drop_target, project};
pub use reconciler::{Plan, Reconciler};
pub use session::{BoardCommand, BoardEvent, BoardHandle, BoardSession};
pub use state::BoardState;

use crate::connection::ConnectionError;
use crate::store::StoreError;

/// Errors that can occur while operating on a board.
#[derive(Debug, thiserror::Error)]
pub enum BoardError {
    /// The backend call failed; the board was left untouched.
    #[error("network failure: {0}")]
    Network(#[from] StoreError),

    /// Task and sub-task titles must not be blank.
    #[error("title cannot be empty")]
    TitleEmpty,

    /// Title exceeds the maximum length.
    #[error("title too long ({len} characters, max {max})")]
    TitleTooLong {
        /// Length of the rejected title in characters.
        len: usize,
        /// Allowed maximum.
        max: usize,
    },

    /// No task with this id on the board.
    #[error("task not found: {0}")]
    TaskNotFound(TaskId),

    /// The parent exists but has no such sub-task.
    #[error("sub-task {subtask} not found on task {task}")]
    SubTaskNotFound {
        /// Parent task.
        task: TaskId,
        /// Missing sub-task.
        subtask: SubTaskId,
    },

    /// The committed change could not be broadcast.
    #[error("connection error: {0}")]
    Connection(#[from] ConnectionError),

    /// The board session has shut down.
    #[error("board session closed")]
    SessionClosed,
}

/// A mutation requested by the local user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    /// Create a `To-Do` card.
    AddTask {
        /// Card title.
        title: String,
        /// Card description, may be empty.
        description: String,
    },
    /// Move a card to another column.
    MoveTask {
        /// Card to move.
        task: TaskId,
        /// Target column.
        to: TaskStatus,
    },
    /// Save an edited copy of a card.
    EditTask(Task),
    /// Delete a card.
    DeleteTask(TaskId),
    /// Add a checklist item.
    AddSubTask {
        /// Parent card.
        task: TaskId,
        /// Item title.
        title: String,
    },
    /// Flip a checklist item's completion.
    ToggleSubTask {
        /// Parent card.
        task: TaskId,
        /// Item to flip.
        subtask: SubTaskId,
    },
    /// Remove a checklist item.
    DeleteSubTask {
        /// Parent card.
        task: TaskId,
        /// Item to remove.
        subtask: SubTaskId,
    },
    /// Share an uncommitted field value while the user types.
    EditField {
        /// Card being edited.
        task: TaskId,
        /// Field being edited.
        field: TaskField,
        /// Value as typed.
        value: Value,
    },
}

impl Intent {
    /// The card this intent targets, if it already exists.
    #[must_use]
    pub const fn task_id(&self) -> Option<TaskId> {
        match self {
            Self::AddTask { .. } => None,
            Self::EditTask(task) => Some(task.id),
            Self::MoveTask { task, .. }
            | Self::DeleteTask(task)
            | Self::AddSubTask { task, .. }
            | Self::ToggleSubTask { task, .. }
            | Self::DeleteSubTask { task, .. }
            | Self::EditField { task, .. } => Some(*task),
        }
    }
}

/// Result of applying one event to the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The board state was modified.
    Changed,
    /// The event was dropped without touching the board.
    Skipped(SkipReason),
}

impl Outcome {
    /// Whether the event modified the board.
    #[must_use]
    pub const fn is_changed(self) -> bool {
        matches!(self, Self::Changed)
    }
}

/// Why an event was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// A `created` event for a task already on the board.
    DuplicateTask,
    /// A `created` event for a sub-task already on its parent.
    DuplicateSubTask,
    /// The event targets a task that is not on the board.
    UnknownTask,
    /// The event targets a sub-task its parent does not have.
    UnknownSubTask,
    /// A `deleted` event for something already gone.
    AlreadyAbsent,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::DuplicateTask => "duplicate task",
            Self::DuplicateSubTask => "duplicate sub-task",
            Self::UnknownTask => "unknown task",
            Self::UnknownSubTask => "unknown sub-task",
            Self::AlreadyAbsent => "already absent",
        })
    }
}
