//! Activity log entries: a human-readable history of task mutations.
//!
//! The backend keeps the history and serves it per project. Clients extend
//! their copy live from task-channel frames, so the same shape is built from
//! both sources.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::event::{Action, TaskField, parse_edited_fields};
use crate::frame::{Frame, lenient_timestamp};

/// Author shown when a frame carries no `user`.
pub const UNKNOWN_USER: &str = "Someone";

/// Title shown when neither `task_title` nor `title` is present.
pub const UNKNOWN_TASK: &str = "Unknown Task";

/// One line of the activity log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityEntry {
    /// Who made the change.
    #[serde(default = "unknown_user", deserialize_with = "user_or_unknown")]
    pub user: String,
    /// What kind of change.
    pub action: Action,
    /// Title of the affected task at the time of the change.
    #[serde(default = "unknown_task", deserialize_with = "title_or_unknown")]
    pub task_title: String,
    /// Fields touched by an `edited` change.
    #[serde(default, deserialize_with = "lenient_fields")]
    pub edited_fields: Vec<TaskField>,
    /// Source column of a `moved` change.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_status: Option<String>,
    /// Target column of a `moved` change.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_status: Option<String>,
    /// When the change was relayed.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_timestamp"
    )]
    pub timestamp: Option<DateTime<Utc>>,
}

impl ActivityEntry {
    /// Builds an entry from a task-channel frame.
    ///
    /// Returns `None` for `editing` previews and for payloads without a
    /// recognizable action; those never appear in the log.
    #[must_use]
    pub fn from_frame(frame: &Frame) -> Option<Self> {
        let message = frame.message.as_object()?;
        let action: Action = message.get("action")?.as_str()?.parse().ok()?;
        if action == Action::Editing {
            return None;
        }
        let text = |key: &str| message.get(key).and_then(Value::as_str).map(str::to_string);
        Some(Self {
            user: frame
                .user
                .clone()
                .filter(|u| !u.is_empty())
                .unwrap_or_else(unknown_user),
            action,
            task_title: text("task_title")
                .or_else(|| text("title"))
                .unwrap_or_else(unknown_task),
            edited_fields: message
                .get("edited_fields")
                .map(parse_edited_fields)
                .unwrap_or_default(),
            from_status: text("from_status"),
            to_status: text("to_status"),
            timestamp: frame.timestamp,
        })
    }

    /// The sentence shown in the log.
    #[must_use]
    pub fn render(&self) -> String {
        let Self {
            user, task_title, ..
        } = self;
        match self.action {
            Action::Moved => format!(
                "{user} has moved '{task_title}' from '{}' to '{}'",
                self.from_status.as_deref().unwrap_or("?"),
                self.to_status.as_deref().unwrap_or("?"),
            ),
            Action::Created => format!("{user} has created a task '{task_title}'"),
            Action::Deleted => format!("{user} has deleted '{task_title}'"),
            Action::Edited => {
                let fields: Vec<&str> = self.edited_fields.iter().map(|f| f.as_str()).collect();
                format!("{user} has edited the {}", fields.join(", "))
            }
            Action::Updated => format!("{user} has updated '{task_title}'"),
            Action::Editing => String::new(),
        }
    }
}

fn unknown_user() -> String {
    UNKNOWN_USER.to_string()
}

fn unknown_task() -> String {
    UNKNOWN_TASK.to_string()
}

fn user_or_unknown<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?
        .filter(|s| !s.is_empty())
        .unwrap_or_else(unknown_user))
}

fn title_or_unknown<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_else(unknown_task))
}

fn lenient_fields<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Vec<TaskField>, D::Error> {
    Ok(parse_edited_fields(&Value::deserialize(deserializer)?))
}
