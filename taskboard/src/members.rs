//! Project membership as the client sees it.

use taskboard_proto::task::{Member, MemberId, ProjectId, Task};

use crate::store::{StoreError, TaskStore};

/// A project's members and manager.
///
/// Used to show owner names on cards and to answer the `members` command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Roster {
    members: Vec<Member>,
    manager: Option<MemberId>,
}

impl Roster {
    /// A roster with the given members and manager.
    #[must_use]
    pub const fn new(members: Vec<Member>, manager: Option<MemberId>) -> Self {
        Self { members, manager }
    }

    /// Fetches the project details and member list together.
    ///
    /// # Errors
    ///
    /// Propagates the first store error.
    pub async fn load<S: TaskStore>(store: &S, project: ProjectId) -> Result<Self, StoreError> {
        let (details, members) =
            tokio::try_join!(store.get_project(project), store.list_members(project))?;
        tracing::debug!(project = %project, members = members.len(), "roster loaded");
        Ok(Self::new(members, details.manager))
    }

    /// Members in the order the backend lists them.
    #[must_use]
    pub fn members(&self) -> &[Member] {
        &self.members
    }

    /// The project manager, if one is set.
    #[must_use]
    pub const fn manager(&self) -> Option<MemberId> {
        self.manager
    }

    /// Replaces the manager, e.g. after `set_manager` succeeded.
    pub const fn set_manager(&mut self, manager: Option<MemberId>) {
        self.manager = manager;
    }

    /// Username of `id`, if it is a member.
    #[must_use]
    pub fn name_of(&self, id: MemberId) -> Option<&str> {
        self.members
            .iter()
            .find(|m| m.id == id)
            .map(|m| m.username.as_str())
    }

    /// Owner names of `task`; ids that are not (or no longer) members show
    /// as `#id`.
    #[must_use]
    pub fn owner_names(&self, task: &Task) -> Vec<String> {
        task.owner
            .iter()
            .map(|&id| self.name_of(id).map_or_else(|| format!("#{id}"), str::to_string))
            .collect()
    }

    /// One line per member, the manager marked.
    pub fn lines(&self) -> impl Iterator<Item = String> + '_ {
        self.members.iter().map(|m| {
            if self.manager == Some(m.id) {
                format!("#{} {} (manager)", m.id, m.username)
            } else {
                format!("#{} {}", m.id, m.username)
            }
        })
    }
}
