//! In-memory board state.

use std::collections::BTreeMap;

use serde_json::Value;

use taskboard_proto::event::TaskField;
use taskboard_proto::task::{Task, TaskId};

/// Every task of one project, in the order they arrived, plus the live-edit
/// previews other users are broadcasting.
///
/// Task ids are unique. Only [`super::Reconciler`] mutates a board state;
/// everything else sees cloned snapshots.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoardState {
    tasks: Vec<Task>,
    previews: BTreeMap<TaskId, BTreeMap<TaskField, Value>>,
}

impl BoardState {
    /// An empty board.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a board from a REST snapshot. A repeated id keeps its first
    /// position and its last value.
    #[must_use]
    pub fn from_snapshot(snapshot: Vec<Task>) -> Self {
        let mut state = Self::new();
        for task in snapshot {
            if !state.replace(task.clone()) {
                state.tasks.push(task);
            }
        }
        state
    }

    /// Tasks in arrival order.
    #[must_use]
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    /// Looks up a task.
    #[must_use]
    pub fn task(&self, id: TaskId) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    /// Whether the task is on the board.
    #[must_use]
    pub fn contains(&self, id: TaskId) -> bool {
        self.task(id).is_some()
    }

    /// Number of tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether the board has no tasks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// The uncommitted value another user is typing into `field`, if any.
    #[must_use]
    pub fn preview(&self, id: TaskId, field: TaskField) -> Option<&Value> {
        self.previews.get(&id).and_then(|fields| fields.get(&field))
    }

    /// Whether any field of the task has a live preview.
    #[must_use]
    pub fn has_previews(&self, id: TaskId) -> bool {
        self.previews.contains_key(&id)
    }

    pub(crate) fn task_mut(&mut self, id: TaskId) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|t| t.id == id)
    }

    pub(crate) fn push(&mut self, task: Task) {
        self.tasks.push(task);
    }

    /// Replaces the task with the same id in place; `false` if absent.
    pub(crate) fn replace(&mut self, task: Task) -> bool {
        match self.task_mut(task.id) {
            Some(slot) => {
                *slot = task;
                true
            }
            None => false,
        }
    }

    /// Removes a task and its previews; `false` if absent.
    pub(crate) fn remove(&mut self, id: TaskId) -> bool {
        self.previews.remove(&id);
        let before = self.tasks.len();
        self.tasks.retain(|t| t.id != id);
        self.tasks.len() != before
    }

    pub(crate) fn set_preview(&mut self, id: TaskId, field: TaskField, value: Value) {
        self.previews.entry(id).or_default().insert(field, value);
    }

    pub(crate) fn clear_previews(&mut self, id: TaskId) {
        self.previews.remove(&id);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use serde_json::json;
    use taskboard_proto::task::{Percentage, TaskStatus};

    use super::*;

    fn task(id: u64, title: &str) -> Task {
        Task {
            id: TaskId::new(id),
            title: title.to_string(),
            description: String::new(),
            status: TaskStatus::ToDo,
            percentage: Percentage::default(),
            deadline: None,
            owner: BTreeSet::new(),
            subtasks: Vec::new(),
            project: None,
        }
    }

    #[test]
    fn snapshot_dedups_by_id() {
        let state = BoardState::from_snapshot(vec![task(1, "a"), task(2, "b"), task(1, "a2")]);
        assert_eq!(state.len(), 2);
        assert_eq!(state.tasks()[0].title, "a2");
        assert_eq!(state.tasks()[1].id, TaskId::new(2));
    }

    #[test]
    fn remove_drops_previews() {
        let mut state = BoardState::from_snapshot(vec![task(1, "a")]);
        state.set_preview(TaskId::new(1), TaskField::Title, json!("typing"));
        assert!(state.has_previews(TaskId::new(1)));
        assert!(state.remove(TaskId::new(1)));
        assert!(!state.has_previews(TaskId::new(1)));
        assert!(!state.remove(TaskId::new(1)));
        assert!(state.is_empty());
    }

    #[test]
    fn replace_requires_existing_task() {
        let mut state = BoardState::new();
        assert!(!state.replace(task(3, "x")));
        assert!(state.is_empty());
    }
}
