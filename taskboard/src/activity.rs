//! Client-side copy of a project's activity log.

use std::collections::VecDeque;

use taskboard_proto::activity::ActivityEntry;
use taskboard_proto::task::ProjectId;

use crate::store::{StoreError, TaskStore};

/// Activity entries, newest first.
///
/// Seeded from the backend's history, then extended with
/// [`crate::board::BoardEvent::Activity`] entries as they arrive on the task
/// channel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivityLog {
    entries: VecDeque<ActivityEntry>,
}

impl ActivityLog {
    /// An empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A log holding `history` as served by the backend (newest first).
    #[must_use]
    pub fn from_history(history: Vec<ActivityEntry>) -> Self {
        Self {
            entries: history.into(),
        }
    }

    /// Fetches the project's history.
    ///
    /// # Errors
    ///
    /// Propagates the store's error.
    pub async fn load<S: TaskStore>(store: &S, project: ProjectId) -> Result<Self, StoreError> {
        let history = store.list_activity(project).await?;
        tracing::debug!(project = %project, entries = history.len(), "activity log loaded");
        Ok(Self::from_history(history))
    }

    /// Prepends a live entry.
    pub fn record(&mut self, entry: ActivityEntry) {
        self.entries.push_front(entry);
    }

    /// Entries, newest first.
    pub fn entries(&self) -> impl Iterator<Item = &ActivityEntry> {
        self.entries.iter()
    }

    /// Rendered sentences, newest first. `editing` entries never make it
    /// into the log, so every line is non-empty.
    pub fn lines(&self) -> impl Iterator<Item = String> + '_ {
        self.entries.iter().map(ActivityEntry::render)
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the log is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
