//! Read-only views of a [`BoardState`]: the three columns and per-card
//! display hints. Nothing here is stored back into the board.

use chrono::{DateTime, TimeDelta, Utc};

use taskboard_proto::task::{MemberId, Task, TaskId, TaskStatus};

use super::{BoardState, Intent};

/// One column of the board.
#[derive(Debug, Clone, PartialEq)]
pub struct Column<'a> {
    /// The status this column shows.
    pub status: TaskStatus,
    /// Tasks with that status, in board order.
    pub tasks: Vec<&'a Task>,
}

/// The board split into its three columns.
#[derive(Debug, Clone, PartialEq)]
pub struct Projection<'a> {
    columns: [Column<'a>; 3],
}

impl<'a> Projection<'a> {
    /// Columns in `To-Do`, `Doing`, `Done` order.
    #[must_use]
    pub fn columns(&self) -> &[Column<'a>] {
        &self.columns
    }

    /// The column for one status.
    #[must_use]
    pub const fn column(&self, status: TaskStatus) -> &Column<'a> {
        match status {
            TaskStatus::ToDo => &self.columns[0],
            TaskStatus::Doing => &self.columns[1],
            TaskStatus::Done => &self.columns[2],
        }
    }
}

/// Partitions the board into columns, keeping arrival order inside each.
#[must_use]
pub fn project(state: &BoardState) -> Projection<'_> {
    Projection {
        columns: TaskStatus::ALL.map(|status| Column {
            status,
            tasks: state.tasks().iter().filter(|t| t.status == status).collect(),
        }),
    }
}

/// The intent produced by dropping a card on a column, or `None` when the
/// card is unknown or already there.
#[must_use]
pub fn drop_target(state: &BoardState, task: TaskId, target: TaskStatus) -> Option<Intent> {
    let current = state.task(task)?;
    (current.status != target).then_some(Intent::MoveTask { task, to: target })
}

/// How a card should be drawn for a given viewer at a given time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskDisplay {
    /// `"Due in 3 days"` or `"Overdue by 2 hours"`; `None` without a
    /// deadline or when progress is hidden.
    pub deadline_label: Option<String>,
    /// The deadline has passed.
    pub overdue: bool,
    /// Percentage and deadline are shown for unfinished tasks only.
    pub show_progress: bool,
    /// The viewer is one of the owners; the card is highlighted.
    pub owned_by_viewer: bool,
}

impl TaskDisplay {
    /// Derives the display hints of `task`.
    #[must_use]
    pub fn derive(task: &Task, viewer: Option<MemberId>, now: DateTime<Utc>) -> Self {
        let show_progress = task.status != TaskStatus::Done;
        let owned_by_viewer = viewer.is_some_and(|id| task.owner.contains(&id));
        let (deadline_label, overdue) = match task.deadline {
            Some(deadline) if show_progress => {
                if deadline > now {
                    (Some(format!("Due in {}", humanize(deadline - now))), false)
                } else {
                    (Some(format!("Overdue by {}", humanize(now - deadline))), true)
                }
            }
            _ => (None, false),
        };
        Self {
            deadline_label,
            overdue,
            show_progress,
            owned_by_viewer,
        }
    }
}

const MINUTE: i64 = 60;
const HOUR: i64 = 60 * MINUTE;
const DAY: i64 = 24 * HOUR;

/// Integer division rounded half up, for non-negative operands.
const fn round_div(value: i64, unit: i64) -> i64 {
    (value + unit / 2) / unit
}

/// Coarse relative duration: "a few seconds", "5 minutes", "a day", ...
fn humanize(delta: TimeDelta) -> String {
    let secs = delta.num_seconds().abs();
    if secs <= 44 {
        return "a few seconds".to_string();
    }
    if secs <= 89 {
        return "a minute".to_string();
    }
    let minutes = round_div(secs, MINUTE);
    if minutes <= 44 {
        return format!("{minutes} minutes");
    }
    if minutes <= 89 {
        return "an hour".to_string();
    }
    let hours = round_div(secs, HOUR);
    if hours <= 21 {
        return format!("{hours} hours");
    }
    if hours <= 35 {
        return "a day".to_string();
    }
    let days = round_div(secs, DAY);
    if days <= 25 {
        return format!("{days} days");
    }
    if days <= 45 {
        return "a month".to_string();
    }
    // Average month and year lengths are close enough at this resolution.
    let months = round_div(days * 100, 3044);
    if months <= 10 {
        return format!("{months} months");
    }
    if months <= 17 {
        return "a year".to_string();
    }
    format!("{} years", round_div(days, 365).max(2))
}
