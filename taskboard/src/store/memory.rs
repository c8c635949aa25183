//! In-process task store for testing.
//!
//! Keeps projects in a [`parking_lot::Mutex`]-guarded map and assigns ids
//! from a counter. [`MemoryTaskStore::fail_with`] makes every following
//! mutation fail, which is how tests exercise the "REST failure leaves the
//! board untouched" path.

use std::collections::{BTreeSet, HashMap};

use parking_lot::Mutex;

use taskboard_proto::activity::ActivityEntry;
use taskboard_proto::chat::ChatMessage;
use taskboard_proto::task::{
    Member, MemberId, NewTask, Percentage, Project, ProjectId, SubTask, SubTaskId, Task, TaskId,
};

use super::{StoreError, TaskStore};

#[derive(Debug, Default)]
struct Inner {
    tasks: HashMap<ProjectId, Vec<Task>>,
    activity: HashMap<ProjectId, Vec<ActivityEntry>>,
    chat: HashMap<ProjectId, Vec<ChatMessage>>,
    accounts: Vec<Member>,
    members: HashMap<ProjectId, Vec<Member>>,
    managers: HashMap<ProjectId, MemberId>,
    next_task: u64,
    next_subtask: u64,
    failure: Option<String>,
}

/// [`TaskStore`] kept entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryTaskStore {
    inner: Mutex<Inner>,
}

impl MemoryTaskStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a project's task list, as if created earlier by someone else.
    pub fn seed(&self, project: ProjectId, tasks: Vec<Task>) {
        let mut inner = self.inner.lock();
        let max_id = tasks.iter().map(|t| t.id.get()).max().unwrap_or(0);
        inner.next_task = inner.next_task.max(max_id);
        inner.tasks.insert(project, tasks);
    }

    /// Seeds a project's activity history.
    pub fn seed_activity(&self, project: ProjectId, entries: Vec<ActivityEntry>) {
        self.inner.lock().activity.insert(project, entries);
    }

    /// Seeds a project's chat history.
    pub fn seed_chat(&self, project: ProjectId, messages: Vec<ChatMessage>) {
        self.inner.lock().chat.insert(project, messages);
    }

    /// Registers an account that can later be invited by username.
    pub fn add_account(&self, member: Member) {
        self.inner.lock().accounts.push(member);
    }

    /// Seeds a project's members and manager.
    pub fn seed_members(&self, project: ProjectId, members: Vec<Member>, manager: Option<MemberId>) {
        let mut inner = self.inner.lock();
        inner.members.insert(project, members);
        if let Some(manager) = manager {
            inner.managers.insert(project, manager);
        } else {
            inner.managers.remove(&project);
        }
    }

    /// Makes every following call fail with `reason`; `None` heals the store.
    pub fn fail_with(&self, reason: Option<&str>) {
        self.inner.lock().failure = reason.map(str::to_string);
    }

    /// Snapshot of a project's tasks as stored.
    #[must_use]
    pub fn tasks(&self, project: ProjectId) -> Vec<Task> {
        self.inner
            .lock()
            .tasks
            .get(&project)
            .cloned()
            .unwrap_or_default()
    }

    fn with<T>(
        &self,
        f: impl FnOnce(&mut Inner) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut inner = self.inner.lock();
        if let Some(reason) = &inner.failure {
            return Err(StoreError::Rejected(reason.clone()));
        }
        f(&mut inner)
    }
}

impl Inner {
    fn project(&self, project: ProjectId) -> Project {
        Project {
            id: project,
            name: String::new(),
            manager: self.managers.get(&project).copied(),
        }
    }

    fn is_member(&self, project: ProjectId, member: MemberId) -> bool {
        self.members
            .get(&project)
            .is_some_and(|members| members.iter().any(|m| m.id == member))
    }
}

fn find_task(tasks: &mut [Task], id: TaskId) -> Result<&mut Task, StoreError> {
    tasks
        .iter_mut()
        .find(|t| t.id == id)
        .ok_or_else(|| StoreError::Rejected(format!("no task {id}")))
}

impl TaskStore for MemoryTaskStore {
    async fn list_tasks(&self, project: ProjectId) -> Result<Vec<Task>, StoreError> {
        self.with(|inner| Ok(inner.tasks.get(&project).cloned().unwrap_or_default()))
    }

    async fn create_task(&self, project: ProjectId, task: &NewTask) -> Result<Task, StoreError> {
        self.with(|inner| {
            inner.next_task += 1;
            let created = Task {
                id: TaskId::new(inner.next_task),
                title: task.title.clone(),
                description: task.description.clone(),
                status: task.status,
                percentage: Percentage::default(),
                deadline: None,
                owner: BTreeSet::new(),
                subtasks: Vec::new(),
                project: Some(project),
            };
            inner.tasks.entry(project).or_default().push(created.clone());
            Ok(created)
        })
    }

    async fn update_task(&self, project: ProjectId, task: &Task) -> Result<Task, StoreError> {
        self.with(|inner| {
            let tasks = inner.tasks.entry(project).or_default();
            let stored = find_task(tasks, task.id)?;
            let subtasks = std::mem::take(&mut stored.subtasks);
            *stored = Task {
                subtasks,
                project: Some(project),
                ..task.clone()
            };
            Ok(stored.clone())
        })
    }

    async fn delete_task(&self, project: ProjectId, task: TaskId) -> Result<(), StoreError> {
        self.with(|inner| {
            let tasks = inner.tasks.entry(project).or_default();
            let before = tasks.len();
            tasks.retain(|t| t.id != task);
            if tasks.len() == before {
                return Err(StoreError::Rejected(format!("no task {task}")));
            }
            Ok(())
        })
    }

    async fn create_subtask(
        &self,
        project: ProjectId,
        task: TaskId,
        title: &str,
    ) -> Result<SubTask, StoreError> {
        self.with(|inner| {
            inner.next_subtask += 1;
            let id = SubTaskId::new(inner.next_subtask);
            let tasks = inner.tasks.entry(project).or_default();
            let parent = find_task(tasks, task)?;
            let sub = SubTask {
                id,
                task,
                title: title.to_string(),
                completed: false,
            };
            parent.subtasks.push(sub.clone());
            Ok(sub)
        })
    }

    async fn set_subtask_completed(
        &self,
        project: ProjectId,
        task: TaskId,
        subtask: SubTaskId,
        completed: bool,
    ) -> Result<SubTask, StoreError> {
        self.with(|inner| {
            let tasks = inner.tasks.entry(project).or_default();
            let parent = find_task(tasks, task)?;
            let sub = parent
                .subtasks
                .iter_mut()
                .find(|s| s.id == subtask)
                .ok_or_else(|| StoreError::Rejected(format!("no sub-task {subtask}")))?;
            sub.completed = completed;
            Ok(sub.clone())
        })
    }

    async fn delete_subtask(
        &self,
        project: ProjectId,
        task: TaskId,
        subtask: SubTaskId,
    ) -> Result<(), StoreError> {
        self.with(|inner| {
            let tasks = inner.tasks.entry(project).or_default();
            let parent = find_task(tasks, task)?;
            parent.subtasks.retain(|s| s.id != subtask);
            Ok(())
        })
    }

    async fn list_activity(&self, project: ProjectId) -> Result<Vec<ActivityEntry>, StoreError> {
        self.with(|inner| Ok(inner.activity.get(&project).cloned().unwrap_or_default()))
    }

    async fn list_chat(&self, project: ProjectId) -> Result<Vec<ChatMessage>, StoreError> {
        self.with(|inner| Ok(inner.chat.get(&project).cloned().unwrap_or_default()))
    }

    async fn get_project(&self, project: ProjectId) -> Result<Project, StoreError> {
        self.with(|inner| Ok(inner.project(project)))
    }

    async fn list_members(&self, project: ProjectId) -> Result<Vec<Member>, StoreError> {
        self.with(|inner| Ok(inner.members.get(&project).cloned().unwrap_or_default()))
    }

    async fn invite_members(
        &self,
        project: ProjectId,
        usernames: &[String],
    ) -> Result<(), StoreError> {
        self.with(|inner| {
            let mut invited = Vec::with_capacity(usernames.len());
            for name in usernames {
                let account = inner
                    .accounts
                    .iter()
                    .find(|a| a.username == *name)
                    .ok_or_else(|| StoreError::Rejected(format!("no user {name}")))?;
                invited.push(account.clone());
            }
            let members = inner.members.entry(project).or_default();
            for account in invited {
                if !members.iter().any(|m| m.id == account.id) {
                    members.push(account);
                }
            }
            Ok(())
        })
    }

    async fn set_manager(&self, project: ProjectId, member: MemberId) -> Result<Project, StoreError> {
        self.with(|inner| {
            if !inner.is_member(project, member) {
                return Err(StoreError::Rejected(format!("{member} is not a member")));
            }
            inner.managers.insert(project, member);
            Ok(inner.project(project))
        })
    }

    async fn remove_member(&self, project: ProjectId, member: MemberId) -> Result<(), StoreError> {
        self.with(|inner| {
            if !inner.is_member(project, member) {
                return Err(StoreError::Rejected(format!("{member} is not a member")));
            }
            if inner.managers.get(&project) == Some(&member) {
                return Err(StoreError::Rejected("the manager cannot be removed".to_string()));
            }
            if let Some(members) = inner.members.get_mut(&project) {
                members.retain(|m| m.id != member);
            }
            Ok(())
        })
    }
}
