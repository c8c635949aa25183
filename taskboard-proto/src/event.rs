//! Sync events exchanged over a project's task channel.
//!
//! Every mutation a client commits is broadcast as one event whose
//! `action` tag says what happened. Task and sub-task events share the tag
//! set; sub-task payloads are recognized by their `subtask_id` field. The
//! advisory `editing` action carries a single live-edited field and never
//! a full record.
//!
//! Decoding is strict about the tag: a missing or unknown `action` is an
//! error, the payload is never guessed at.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::task::{SubTask, SubTaskId, Task, TaskId, TaskStatus};

/// Errors produced while decoding or encoding a sync event.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EventError {
    /// The payload has no `action` tag.
    #[error("event has no action tag")]
    MissingAction,
    /// The `action` tag is not one of the known actions.
    #[error("unknown event action: {0}")]
    UnknownAction(String),
    /// The payload does not have the shape its action requires.
    #[error("malformed event: {0}")]
    Malformed(String),
}

impl From<serde_json::Error> for EventError {
    fn from(err: serde_json::Error) -> Self {
        Self::Malformed(err.to_string())
    }
}

/// The discriminant of a sync event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// A record was created.
    Created,
    /// A record was replaced (sub-task toggles, programmatic updates).
    Updated,
    /// A task was saved from the edit dialog.
    Edited,
    /// A task changed column.
    Moved,
    /// A record was removed.
    Deleted,
    /// A field is being edited live; advisory only.
    Editing,
}

impl Action {
    /// The tag as written on the wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Edited => "edited",
            Self::Moved => "moved",
            Self::Deleted => "deleted",
            Self::Editing => "editing",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = EventError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(Self::Created),
            "updated" => Ok(Self::Updated),
            "edited" => Ok(Self::Edited),
            "moved" => Ok(Self::Moved),
            "deleted" => Ok(Self::Deleted),
            "editing" => Ok(Self::Editing),
            other => Err(EventError::UnknownAction(other.to_string())),
        }
    }
}

/// Task fields that can be edited, named as on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskField {
    /// `title`
    Title,
    /// `description`
    Description,
    /// `owner`
    Owner,
    /// `percentage`
    Percentage,
    /// `deadline`
    Deadline,
}

impl TaskField {
    /// The field name as written on the wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Title => "title",
            Self::Description => "description",
            Self::Owner => "owner",
            Self::Percentage => "percentage",
            Self::Deadline => "deadline",
        }
    }
}

impl fmt::Display for TaskField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskField {
    type Err = EventError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "title" => Ok(Self::Title),
            "description" => Ok(Self::Description),
            "owner" => Ok(Self::Owner),
            "percentage" => Ok(Self::Percentage),
            "deadline" => Ok(Self::Deadline),
            other => Err(EventError::Malformed(format!("unknown task field: {other}"))),
        }
    }
}

/// One mutation broadcast over a project's task channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// A task was created.
    TaskCreated(Task),
    /// A task was replaced.
    TaskUpdated(Task),
    /// A task was saved from the edit dialog.
    TaskEdited {
        /// The saved task.
        task: Task,
        /// Which fields differ from the previous version.
        edited_fields: Vec<TaskField>,
    },
    /// A task changed column. `task.status` is the target column.
    TaskMoved {
        /// The moved task.
        task: Task,
        /// Column the sender saw the task in. Informational only.
        from_status: Option<TaskStatus>,
        /// Column the sender dropped the task on.
        to_status: Option<TaskStatus>,
    },
    /// A task was deleted.
    TaskDeleted {
        /// The deleted task.
        id: TaskId,
        /// Title at deletion time, if the sender included it.
        title: Option<String>,
    },
    /// A sub-task was created.
    SubTaskCreated(SubTask),
    /// A sub-task was replaced (completion toggled).
    SubTaskUpdated(SubTask),
    /// A sub-task was re-sent with the `moved` tag; applied as a replacement.
    SubTaskMoved(SubTask),
    /// A sub-task was deleted.
    SubTaskDeleted {
        /// Parent task.
        task_id: TaskId,
        /// The deleted sub-task.
        subtask_id: SubTaskId,
    },
    /// A field of a task is being edited live.
    Editing {
        /// The task being edited.
        task_id: TaskId,
        /// Which field.
        field: TaskField,
        /// The uncommitted value as typed.
        value: Value,
    },
}

#[derive(Deserialize)]
struct SubTaskWire {
    subtask_id: SubTaskId,
    task_id: TaskId,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    completed: Option<bool>,
}

#[derive(Deserialize)]
struct SubTaskRefWire {
    subtask_id: SubTaskId,
    task_id: TaskId,
}

#[derive(Deserialize)]
struct DeletedTaskWire {
    id: TaskId,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    task_title: Option<String>,
}

#[derive(Deserialize)]
struct MoveWire {
    #[serde(default)]
    from_status: Option<TaskStatus>,
    #[serde(default)]
    to_status: Option<TaskStatus>,
}

#[derive(Deserialize)]
struct EditedWire {
    #[serde(default)]
    edited_fields: Value,
}

/// Reads an `edited_fields` value, which senders write either as a list of
/// names or as one comma-separated string. Unknown names and repeats are
/// skipped; the first mention keeps its place.
#[must_use]
pub fn parse_edited_fields(raw: &Value) -> Vec<TaskField> {
    let named: Vec<TaskField> = match raw {
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .filter_map(|name| name.trim().parse().ok())
            .collect(),
        Value::String(joined) => joined
            .split(',')
            .filter_map(|name| name.trim().parse().ok())
            .collect(),
        _ => Vec::new(),
    };
    let mut fields = Vec::with_capacity(named.len());
    for field in named {
        if !fields.contains(&field) {
            fields.push(field);
        }
    }
    fields
}

#[derive(Deserialize)]
struct EditingWire {
    task_id: TaskId,
    field: TaskField,
    #[serde(default)]
    value: Value,
}

impl SyncEvent {
    /// The action tag of this event.
    #[must_use]
    pub const fn action(&self) -> Action {
        match self {
            Self::TaskCreated(_) | Self::SubTaskCreated(_) => Action::Created,
            Self::TaskUpdated(_) | Self::SubTaskUpdated(_) => Action::Updated,
            Self::TaskEdited { .. } => Action::Edited,
            Self::TaskMoved { .. } | Self::SubTaskMoved(_) => Action::Moved,
            Self::TaskDeleted { .. } | Self::SubTaskDeleted { .. } => Action::Deleted,
            Self::Editing { .. } => Action::Editing,
        }
    }

    /// The task this event concerns (the parent, for sub-task events).
    #[must_use]
    pub const fn task_id(&self) -> TaskId {
        match self {
            Self::TaskCreated(task)
            | Self::TaskUpdated(task)
            | Self::TaskEdited { task, .. }
            | Self::TaskMoved { task, .. } => task.id,
            Self::TaskDeleted { id, .. } => *id,
            Self::SubTaskCreated(sub) | Self::SubTaskUpdated(sub) | Self::SubTaskMoved(sub) => {
                sub.task
            }
            Self::SubTaskDeleted { task_id, .. } | Self::Editing { task_id, .. } => *task_id,
        }
    }

    /// Decodes the `message` object of a frame.
    ///
    /// # Errors
    ///
    /// [`EventError::MissingAction`] or [`EventError::UnknownAction`] when
    /// the tag is absent or unrecognized, [`EventError::Malformed`] when the
    /// payload does not fit the action.
    pub fn from_message(message: &Value) -> Result<Self, EventError> {
        let object = message
            .as_object()
            .ok_or_else(|| EventError::Malformed("message is not an object".to_string()))?;
        let action: Action = match object.get("action") {
            None | Some(Value::Null) => return Err(EventError::MissingAction),
            Some(Value::String(tag)) => tag.parse()?,
            Some(other) => return Err(EventError::UnknownAction(other.to_string())),
        };

        if action != Action::Editing && object.contains_key("subtask_id") {
            return Self::subtask_from_message(action, message);
        }

        Ok(match action {
            Action::Created => Self::TaskCreated(Task::deserialize(message)?),
            Action::Updated => Self::TaskUpdated(Task::deserialize(message)?),
            Action::Edited => {
                let wire = EditedWire::deserialize(message)?;
                Self::TaskEdited {
                    task: Task::deserialize(message)?,
                    edited_fields: parse_edited_fields(&wire.edited_fields),
                }
            }
            Action::Moved => {
                let wire = MoveWire::deserialize(message)?;
                Self::TaskMoved {
                    task: Task::deserialize(message)?,
                    from_status: wire.from_status,
                    to_status: wire.to_status,
                }
            }
            Action::Deleted => {
                let wire = DeletedTaskWire::deserialize(message)?;
                Self::TaskDeleted {
                    id: wire.id,
                    title: wire.task_title.or(wire.title),
                }
            }
            Action::Editing => {
                let wire = EditingWire::deserialize(message)?;
                Self::Editing {
                    task_id: wire.task_id,
                    field: wire.field,
                    value: wire.value,
                }
            }
        })
    }

    fn subtask_from_message(action: Action, message: &Value) -> Result<Self, EventError> {
        if action == Action::Deleted {
            let wire = SubTaskRefWire::deserialize(message)?;
            return Ok(Self::SubTaskDeleted {
                task_id: wire.task_id,
                subtask_id: wire.subtask_id,
            });
        }
        let wire = SubTaskWire::deserialize(message)?;
        let sub = SubTask {
            id: wire.subtask_id,
            task: wire.task_id,
            title: wire.title.unwrap_or_default(),
            completed: wire.completed.unwrap_or_default(),
        };
        match action {
            Action::Created => Ok(Self::SubTaskCreated(sub)),
            Action::Updated | Action::Edited => Ok(Self::SubTaskUpdated(sub)),
            Action::Moved => Ok(Self::SubTaskMoved(sub)),
            Action::Deleted | Action::Editing => Err(EventError::Malformed(format!(
                "unexpected sub-task action: {action}"
            ))),
        }
    }

    /// Encodes this event as the `message` object of a frame.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::Malformed`] if a payload fails to serialize.
    pub fn to_message(&self) -> Result<Value, EventError> {
        let mut object = match self {
            Self::TaskCreated(task) | Self::TaskUpdated(task) => record_object(task)?,
            Self::TaskEdited {
                task,
                edited_fields,
            } => {
                let mut object = record_object(task)?;
                object.insert(
                    "edited_fields".to_string(),
                    Value::Array(
                        edited_fields
                            .iter()
                            .map(|f| Value::String(f.as_str().to_string()))
                            .collect(),
                    ),
                );
                object
            }
            Self::TaskMoved {
                task,
                from_status,
                to_status,
            } => {
                let mut object = record_object(task)?;
                if let Some(from) = from_status {
                    object.insert("from_status".to_string(), serde_json::to_value(from)?);
                }
                if let Some(to) = to_status {
                    object.insert("to_status".to_string(), serde_json::to_value(to)?);
                }
                object
            }
            Self::TaskDeleted { id, title } => {
                let mut object = Map::new();
                object.insert("id".to_string(), serde_json::to_value(id)?);
                if let Some(title) = title {
                    object.insert("task_title".to_string(), Value::String(title.clone()));
                }
                object
            }
            Self::SubTaskCreated(sub) | Self::SubTaskUpdated(sub) | Self::SubTaskMoved(sub) => {
                let mut object = record_object(sub)?;
                object.insert("subtask_id".to_string(), serde_json::to_value(sub.id)?);
                object.insert("task_id".to_string(), serde_json::to_value(sub.task)?);
                object
            }
            Self::SubTaskDeleted {
                task_id,
                subtask_id,
            } => {
                let mut object = Map::new();
                object.insert("subtask_id".to_string(), serde_json::to_value(subtask_id)?);
                object.insert("task_id".to_string(), serde_json::to_value(task_id)?);
                object
            }
            Self::Editing {
                task_id,
                field,
                value,
            } => {
                let mut object = Map::new();
                object.insert("task_id".to_string(), serde_json::to_value(task_id)?);
                object.insert("field".to_string(), Value::String(field.as_str().to_string()));
                object.insert("value".to_string(), value.clone());
                object
            }
        };
        object.insert(
            "action".to_string(),
            Value::String(self.action().as_str().to_string()),
        );
        Ok(Value::Object(object))
    }
}

fn record_object<T: Serialize>(record: &T) -> Result<Map<String, Value>, EventError> {
    match serde_json::to_value(record)? {
        Value::Object(object) => Ok(object),
        other => Err(EventError::Malformed(format!(
            "record serialized to non-object: {other}"
        ))),
    }
}
