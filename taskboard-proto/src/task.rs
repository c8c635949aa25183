//! Task and sub-task records as served by the project backend.
//!
//! Identifiers are server-assigned integers. The JSON shape matches the
//! REST payloads, which are also reused verbatim inside sync events.
//! Deserialization is lenient where the backend is known to be loose
//! (`null` for empty collections, owners as ids or as member objects,
//! fractional or out-of-range percentages).

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Maximum allowed task title length in characters.
pub const MAX_TASK_TITLE_LENGTH: usize = 256;

macro_rules! integer_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(u64);

        impl $name {
            /// Wraps a raw server-assigned identifier.
            #[must_use]
            pub const fn new(raw: u64) -> Self {
                Self(raw)
            }

            /// Returns the raw identifier.
            #[must_use]
            pub const fn get(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim().parse().map(Self)
            }
        }
    };
}

integer_id!(
    /// Server-assigned task identifier.
    TaskId
);
integer_id!(
    /// Server-assigned sub-task identifier.
    SubTaskId
);
integer_id!(
    /// Project identifier; one board and one chat room per project.
    ProjectId
);
integer_id!(
    /// Identifier of a project member (user account).
    MemberId
);

/// Column a task sits in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TaskStatus {
    /// Not started.
    #[serde(rename = "To-Do")]
    ToDo,
    /// Being worked on.
    Doing,
    /// Finished.
    Done,
}

impl TaskStatus {
    /// All statuses in board column order.
    pub const ALL: [Self; 3] = [Self::ToDo, Self::Doing, Self::Done];

    /// The label used on the wire and in column headers.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::ToDo => "To-Do",
            Self::Doing => "Doing",
            Self::Done => "Done",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Error returned when a status name is not one of the three columns.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown task status: {0}")]
pub struct ParseStatusError(String);

impl FromStr for TaskStatus {
    type Err = ParseStatusError;

    /// Accepts the wire labels and the short forms `todo`, `doing`, `done`,
    /// case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "to-do" | "todo" | "to_do" => Ok(Self::ToDo),
            "doing" => Ok(Self::Doing),
            "done" => Ok(Self::Done),
            _ => Err(ParseStatusError(s.to_string())),
        }
    }
}

/// Completion percentage, always within `0..=100`.
///
/// Out-of-range and fractional wire values are clamped and rounded rather
/// than rejected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Percentage(u8);

impl Percentage {
    /// Upper bound of the range.
    pub const MAX: u8 = 100;

    /// Clamps an integer into range.
    #[must_use]
    pub fn new(value: i64) -> Self {
        Self(u8::try_from(value.clamp(0, i64::from(Self::MAX))).unwrap_or(Self::MAX))
    }

    /// Returns the stored value.
    #[must_use]
    pub const fn get(self) -> u8 {
        self.0
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn from_f64(raw: f64) -> Self {
        if raw.is_nan() {
            return Self(0);
        }
        Self(raw.clamp(0.0, f64::from(Self::MAX)).round() as u8)
    }
}

impl<'de> Deserialize<'de> for Percentage {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<f64>::deserialize(deserializer)?;
        Ok(raw.map_or(Self(0), Self::from_f64))
    }
}

/// A project member as listed by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    /// Member identifier.
    pub id: MemberId,
    /// Display name.
    pub username: String,
}

/// Project details; only the fields the board needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    /// Project identifier.
    pub id: ProjectId,
    /// Project name.
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    /// The member who manages the project, if any.
    #[serde(default)]
    pub manager: Option<MemberId>,
}

/// A checklist item nested under a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubTask {
    /// Sub-task identifier.
    pub id: SubTaskId,
    /// Parent task.
    pub task: TaskId,
    /// Sub-task title.
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    /// Whether the item has been ticked off.
    #[serde(default, deserialize_with = "null_as_default")]
    pub completed: bool,
}

/// A task card on the board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Server-assigned identifier, unique within the board.
    pub id: TaskId,
    /// Task title.
    pub title: String,
    /// Free-form description.
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
    /// Column the task is in.
    pub status: TaskStatus,
    /// Completion percentage.
    #[serde(default)]
    pub percentage: Percentage,
    /// Optional due date.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<DateTime<Utc>>,
    /// Members who own the task.
    #[serde(default, deserialize_with = "deserialize_owners")]
    pub owner: BTreeSet<MemberId>,
    /// Nested checklist, in creation order.
    #[serde(default, deserialize_with = "null_as_default")]
    pub subtasks: Vec<SubTask>,
    /// Owning project, when the payload carries it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<ProjectId>,
}

impl Task {
    /// Looks up a nested sub-task.
    #[must_use]
    pub fn subtask(&self, id: SubTaskId) -> Option<&SubTask> {
        self.subtasks.iter().find(|s| s.id == id)
    }
}

/// Request body for creating a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTask {
    /// Task title.
    pub title: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// Initial column, `To-Do` for cards added from the board.
    pub status: TaskStatus,
    /// Owning project.
    pub project: ProjectId,
}

impl NewTask {
    /// A `To-Do` card with an empty description.
    #[must_use]
    pub fn todo(project: ProjectId, title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: String::new(),
            status: TaskStatus::ToDo,
            project,
        }
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Owners arrive either as bare ids or as embedded member objects.
#[derive(Deserialize)]
#[serde(untagged)]
enum OwnerWire {
    Id(MemberId),
    Member { id: MemberId },
}

fn deserialize_owners<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<BTreeSet<MemberId>, D::Error> {
    let owners = Option::<Vec<OwnerWire>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(owners
        .into_iter()
        .map(|o| match o {
            OwnerWire::Id(id) | OwnerWire::Member { id } => id,
        })
        .collect())
}
