//! In-memory project data: tasks, sub-tasks, members, activity history and
//! chat.
//!
//! One [`parking_lot::Mutex`] guards everything; it is never held across an
//! await point. Ids are assigned from global counters so they are unique
//! across projects, like database primary keys. Sub-tasks are addressed by
//! their task alone, which relies on that.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Deserialize;

use taskboard_proto::activity::ActivityEntry;
use taskboard_proto::chat::ChatMessage;
use taskboard_proto::task::{
    MAX_TASK_TITLE_LENGTH, Member, MemberId, Percentage, Project, ProjectId, SubTask, SubTaskId,
    Task, TaskId, TaskStatus,
};

/// Errors returned by [`ProjectStore`] operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// No such task in the project.
    #[error("task {0} not found")]
    TaskNotFound(TaskId),
    /// No such sub-task on the task.
    #[error("sub-task {0} not found")]
    SubTaskNotFound(SubTaskId),
    /// No account with that username.
    #[error("user {0} not found")]
    UserNotFound(String),
    /// The member does not belong to the project.
    #[error("member {0} not found")]
    MemberNotFound(MemberId),
    /// The request body is not acceptable.
    #[error("invalid request: {0}")]
    Invalid(String),
}

/// Body of a task creation request.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateTask {
    /// Title, required.
    pub title: String,
    /// Description.
    #[serde(default)]
    pub description: Option<String>,
    /// Initial column, `To-Do` when omitted.
    #[serde(default)]
    pub status: Option<TaskStatus>,
    /// Initial percentage.
    #[serde(default)]
    pub percentage: Option<Percentage>,
    /// Deadline.
    #[serde(default)]
    pub deadline: Option<DateTime<Utc>>,
    /// Owners.
    #[serde(default)]
    pub owner: Option<BTreeSet<MemberId>>,
}

/// Body of a sub-task creation request.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateSubTask {
    /// Title, required.
    pub title: String,
}

/// Body of a sub-task partial update.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PatchSubTask {
    /// New title.
    #[serde(default)]
    pub title: Option<String>,
    /// New completion flag.
    #[serde(default)]
    pub completed: Option<bool>,
}

/// Body of an invitation.
#[derive(Debug, Clone, Deserialize)]
pub struct Invite {
    /// Accounts to add.
    pub usernames: Vec<String>,
}

/// Body of a manager change.
#[derive(Debug, Clone, Deserialize)]
pub struct SetManager {
    /// The member taking over.
    pub manager_id: MemberId,
}

#[derive(Debug, Default)]
struct ProjectData {
    tasks: Vec<Task>,
    members: Vec<MemberId>,
    manager: Option<MemberId>,
    /// Newest first.
    activity: Vec<ActivityEntry>,
    chat: Vec<ChatMessage>,
}

#[derive(Debug, Default)]
struct Inner {
    projects: HashMap<ProjectId, ProjectData>,
    /// Every known account, in registration order.
    accounts: Vec<Member>,
    next_task: u64,
    next_subtask: u64,
}

impl Inner {
    fn project_mut(&mut self, project: ProjectId) -> &mut ProjectData {
        self.projects.entry(project).or_default()
    }

    fn tasks_mut(&mut self, project: ProjectId) -> &mut Vec<Task> {
        &mut self.project_mut(project).tasks
    }

    fn task_mut(&mut self, project: ProjectId, id: TaskId) -> Result<&mut Task, StoreError> {
        self.tasks_mut(project)
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or(StoreError::TaskNotFound(id))
    }

    /// A task in whichever project holds it.
    fn any_task_mut(&mut self, id: TaskId) -> Result<&mut Task, StoreError> {
        self.projects
            .values_mut()
            .flat_map(|p| p.tasks.iter_mut())
            .find(|t| t.id == id)
            .ok_or(StoreError::TaskNotFound(id))
    }

    fn details(&self, project: ProjectId) -> Project {
        Project {
            id: project,
            name: format!("Project {project}"),
            manager: self.projects.get(&project).and_then(|p| p.manager),
        }
    }
}

/// Thread-safe store for every project the stub serves.
#[derive(Debug, Default)]
pub struct ProjectStore {
    inner: Mutex<Inner>,
}

impl ProjectStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces a project's tasks. Id counters skip past the seeded ids.
    pub fn seed(&self, project: ProjectId, tasks: Vec<Task>) {
        let mut inner = self.inner.lock();
        let max_task = tasks.iter().map(|t| t.id.get()).max().unwrap_or(0);
        let max_sub = tasks
            .iter()
            .flat_map(|t| t.subtasks.iter().map(|s| s.id.get()))
            .max()
            .unwrap_or(0);
        inner.next_task = inner.next_task.max(max_task);
        inner.next_subtask = inner.next_subtask.max(max_sub);
        *inner.tasks_mut(project) = tasks;
    }

    /// All tasks of a project, in creation order.
    #[must_use]
    pub fn tasks(&self, project: ProjectId) -> Vec<Task> {
        self.inner
            .lock()
            .projects
            .get(&project)
            .map(|p| p.tasks.clone())
            .unwrap_or_default()
    }

    /// Creates a task.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Invalid`] for a blank or too long title.
    pub fn create_task(&self, project: ProjectId, body: CreateTask) -> Result<Task, StoreError> {
        let title = check_title(&body.title)?;
        let mut inner = self.inner.lock();
        inner.next_task += 1;
        let task = Task {
            id: TaskId::new(inner.next_task),
            title,
            description: body.description.unwrap_or_default(),
            status: body.status.unwrap_or(TaskStatus::ToDo),
            percentage: body.percentage.unwrap_or_default(),
            deadline: body.deadline,
            owner: body.owner.unwrap_or_default(),
            subtasks: Vec::new(),
            project: Some(project),
        };
        inner.tasks_mut(project).push(task.clone());
        Ok(task)
    }

    /// Replaces a task's fields; its sub-tasks are kept.
    ///
    /// # Errors
    ///
    /// [`StoreError::TaskNotFound`] or [`StoreError::Invalid`].
    pub fn update_task(
        &self,
        project: ProjectId,
        id: TaskId,
        body: Task,
    ) -> Result<Task, StoreError> {
        let title = check_title(&body.title)?;
        let mut inner = self.inner.lock();
        let stored = inner.task_mut(project, id)?;
        let subtasks = std::mem::take(&mut stored.subtasks);
        *stored = Task {
            id,
            title,
            subtasks,
            project: Some(project),
            ..body
        };
        Ok(stored.clone())
    }

    /// Deletes a task.
    ///
    /// # Errors
    ///
    /// [`StoreError::TaskNotFound`].
    pub fn delete_task(&self, project: ProjectId, id: TaskId) -> Result<Task, StoreError> {
        let mut inner = self.inner.lock();
        let tasks = inner.tasks_mut(project);
        let index = tasks
            .iter()
            .position(|t| t.id == id)
            .ok_or(StoreError::TaskNotFound(id))?;
        Ok(tasks.remove(index))
    }

    /// Adds a sub-task to a task.
    ///
    /// # Errors
    ///
    /// [`StoreError::TaskNotFound`] or [`StoreError::Invalid`].
    pub fn create_subtask(&self, task: TaskId, body: &CreateSubTask) -> Result<SubTask, StoreError> {
        let title = check_title(&body.title)?;
        let mut inner = self.inner.lock();
        let id = SubTaskId::new(inner.next_subtask + 1);
        let parent = inner.any_task_mut(task)?;
        let sub = SubTask {
            id,
            task,
            title,
            completed: false,
        };
        parent.subtasks.push(sub.clone());
        inner.next_subtask += 1;
        Ok(sub)
    }

    /// Partially updates a sub-task.
    ///
    /// # Errors
    ///
    /// [`StoreError::TaskNotFound`], [`StoreError::SubTaskNotFound`] or
    /// [`StoreError::Invalid`].
    pub fn patch_subtask(
        &self,
        task: TaskId,
        subtask: SubTaskId,
        body: PatchSubTask,
    ) -> Result<SubTask, StoreError> {
        let title = body.title.as_deref().map(check_title).transpose()?;
        let mut inner = self.inner.lock();
        let parent = inner.any_task_mut(task)?;
        let sub = parent
            .subtasks
            .iter_mut()
            .find(|s| s.id == subtask)
            .ok_or(StoreError::SubTaskNotFound(subtask))?;
        if let Some(title) = title {
            sub.title = title;
        }
        if let Some(completed) = body.completed {
            sub.completed = completed;
        }
        Ok(sub.clone())
    }

    /// Deletes a sub-task.
    ///
    /// # Errors
    ///
    /// [`StoreError::TaskNotFound`] or [`StoreError::SubTaskNotFound`].
    pub fn delete_subtask(&self, task: TaskId, subtask: SubTaskId) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        let parent = inner.any_task_mut(task)?;
        let before = parent.subtasks.len();
        parent.subtasks.retain(|s| s.id != subtask);
        if parent.subtasks.len() == before {
            return Err(StoreError::SubTaskNotFound(subtask));
        }
        Ok(())
    }

    /// Registers an account, returning its id. Registering a known
    /// username returns the existing id.
    pub fn register_account(&self, username: &str) -> MemberId {
        let mut inner = self.inner.lock();
        if let Some(known) = inner.accounts.iter().find(|a| a.username == username) {
            return known.id;
        }
        let id = MemberId::new(inner.accounts.len() as u64 + 1);
        inner.accounts.push(Member {
            id,
            username: username.to_string(),
        });
        id
    }

    /// Project details. Unknown projects exist with no manager.
    #[must_use]
    pub fn project(&self, project: ProjectId) -> Project {
        self.inner.lock().details(project)
    }

    /// Members of a project, in joining order.
    #[must_use]
    pub fn members(&self, project: ProjectId) -> Vec<Member> {
        let inner = self.inner.lock();
        let Some(data) = inner.projects.get(&project) else {
            return Vec::new();
        };
        data.members
            .iter()
            .filter_map(|id| inner.accounts.iter().find(|a| a.id == *id).cloned())
            .collect()
    }

    /// Adds accounts to a project. Nothing is added unless every username
    /// is known; existing members are skipped. The first member becomes the
    /// manager.
    ///
    /// # Errors
    ///
    /// [`StoreError::UserNotFound`] for the first unknown username.
    pub fn invite(&self, project: ProjectId, body: &Invite) -> Result<Vec<Member>, StoreError> {
        let mut inner = self.inner.lock();
        let mut invited = Vec::with_capacity(body.usernames.len());
        for name in &body.usernames {
            let account = inner
                .accounts
                .iter()
                .find(|a| a.username == *name)
                .ok_or_else(|| StoreError::UserNotFound(name.clone()))?;
            invited.push(account.clone());
        }
        let data = inner.project_mut(project);
        for member in &invited {
            if !data.members.contains(&member.id) {
                data.members.push(member.id);
            }
        }
        if data.manager.is_none() {
            data.manager = data.members.first().copied();
        }
        Ok(invited)
    }

    /// Hands the manager role to a member.
    ///
    /// # Errors
    ///
    /// [`StoreError::MemberNotFound`] if `member` is not in the project.
    pub fn set_manager(&self, project: ProjectId, member: MemberId) -> Result<Project, StoreError> {
        let mut inner = self.inner.lock();
        let data = inner.project_mut(project);
        if !data.members.contains(&member) {
            return Err(StoreError::MemberNotFound(member));
        }
        data.manager = Some(member);
        Ok(inner.details(project))
    }

    /// Removes a member from a project.
    ///
    /// # Errors
    ///
    /// [`StoreError::MemberNotFound`] if `member` is not in the project, or
    /// [`StoreError::Invalid`] for the manager.
    pub fn remove_member(&self, project: ProjectId, member: MemberId) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        let data = inner.project_mut(project);
        if !data.members.contains(&member) {
            return Err(StoreError::MemberNotFound(member));
        }
        if data.manager == Some(member) {
            return Err(StoreError::Invalid(
                "the manager cannot be removed".to_string(),
            ));
        }
        data.members.retain(|m| *m != member);
        Ok(())
    }

    /// Prepends an activity entry.
    pub fn record_activity(&self, project: ProjectId, entry: ActivityEntry) {
        let mut inner = self.inner.lock();
        inner
            .projects
            .entry(project)
            .or_default()
            .activity
            .insert(0, entry);
    }

    /// Activity history, newest first.
    #[must_use]
    pub fn activity(&self, project: ProjectId) -> Vec<ActivityEntry> {
        self.inner
            .lock()
            .projects
            .get(&project)
            .map(|p| p.activity.clone())
            .unwrap_or_default()
    }

    /// Appends a chat message.
    pub fn record_chat(&self, project: ProjectId, message: ChatMessage) {
        let mut inner = self.inner.lock();
        inner.projects.entry(project).or_default().chat.push(message);
    }

    /// Chat history, oldest first.
    #[must_use]
    pub fn chat(&self, project: ProjectId) -> Vec<ChatMessage> {
        self.inner
            .lock()
            .projects
            .get(&project)
            .map(|p| p.chat.clone())
            .unwrap_or_default()
    }
}

fn check_title(title: &str) -> Result<String, StoreError> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err(StoreError::Invalid("title may not be blank".to_string()));
    }
    if trimmed.chars().count() > MAX_TASK_TITLE_LENGTH {
        return Err(StoreError::Invalid(format!(
            "title longer than {MAX_TASK_TITLE_LENGTH} characters"
        )));
    }
    Ok(trimmed.to_string())
}
