//! Live board session: one tokio task owning the [`Reconciler`].
//!
//! ```text
//! UI  ── BoardCommand ──▶  session task  ◀── frames ── Connection (tasks channel)
//!     ◀─ watch<BoardState>     │    ▲
//!     ◀─ BoardEvent            ▼    │ completions
//!                          spawned REST calls
//! ```
//!
//! REST calls run in spawned tasks so inbound events keep flowing while a
//! request is in flight. Their results come back over a channel and are
//! applied in the session task, so every mutation of the board is serialized
//! there without locks.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use taskboard_proto::activity::ActivityEntry;
use taskboard_proto::event::SyncEvent;
use taskboard_proto::frame::Frame;
use taskboard_proto::task::ProjectId;

use super::{BoardError, BoardState, Intent, Outcome, Plan, Reconciler};
use crate::connection::{
    Channel, Connection, ConnectionError, ConnectionManager, ConnectionStatus,
};
use crate::store::TaskStore;

/// Capacity of the command channel into the session task.
const COMMAND_CAPACITY: usize = 64;

/// Capacity of the event channel out of the session task.
const EVENT_CAPACITY: usize = 256;

/// Commands sent from the UI to the session task.
#[derive(Debug)]
pub enum BoardCommand {
    /// Plan, commit and broadcast a local change.
    Intent(Intent),
    /// Close the connection and stop the task.
    Shutdown,
}

/// Notifications from the session task to the UI.
#[derive(Debug)]
pub enum BoardEvent {
    /// The task channel changed state.
    StatusChanged(ConnectionStatus),
    /// An event went through the reconciler.
    Applied {
        /// The event.
        event: SyncEvent,
        /// What it did to the board.
        outcome: Outcome,
        /// `true` for committed local changes, `false` for channel events.
        local: bool,
    },
    /// A local intent could not be completed.
    Failed {
        /// The intent that failed.
        intent: Intent,
        /// Why.
        error: BoardError,
    },
    /// Someone (possibly us) changed the board; shown in the activity log.
    Activity(ActivityEntry),
}

/// The result of a spawned REST call.
#[derive(Debug)]
struct Completion {
    intent: Intent,
    result: Result<SyncEvent, BoardError>,
}

/// State owned by the session task.
pub struct BoardSession<S> {
    reconciler: Reconciler,
    store: Arc<S>,
    connection: Connection,
    state_tx: watch::Sender<BoardState>,
    events_tx: mpsc::Sender<BoardEvent>,
    completions_tx: mpsc::UnboundedSender<Completion>,
    completions_rx: mpsc::UnboundedReceiver<Completion>,
}

impl<S: TaskStore> BoardSession<S> {
    /// Opens the board of `project`.
    ///
    /// Connects the project's task channel first, then fetches the REST
    /// snapshot, so no event published after the snapshot is missed. Frames
    /// that arrive meanwhile wait in the connection's inbound queue.
    ///
    /// # Errors
    ///
    /// - [`BoardError::Connection`] if the WebSocket URL cannot be built.
    /// - [`BoardError::Network`] if the snapshot cannot be fetched; the
    ///   connection is closed again.
    pub async fn open(
        store: Arc<S>,
        connections: &ConnectionManager,
        project: ProjectId,
    ) -> Result<BoardHandle, BoardError> {
        let connection = connections.connect(Channel::Tasks(project))?;
        let snapshot = store.list_tasks(project).await.map_err(|e| {
            tracing::warn!(project = %project, err = %e, "could not load board snapshot");
            e
        })?;
        let reconciler = Reconciler::hydrate(project, snapshot);
        tracing::info!(project = %project, tasks = reconciler.state().len(), "board hydrated");

        let (state_tx, state_rx) = watch::channel(reconciler.state().clone());
        let (events_tx, events_rx) = mpsc::channel(EVENT_CAPACITY);
        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_CAPACITY);
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        let status = connection.subscribe_status();

        let session = Self {
            reconciler,
            store,
            connection,
            state_tx,
            events_tx,
            completions_tx,
            completions_rx,
        };
        let task = tokio::spawn(session.run(commands_rx, status.clone()));

        Ok(BoardHandle {
            project,
            commands: commands_tx,
            state: state_rx,
            status,
            events: events_rx,
            task: Some(task),
        })
    }

    async fn run(
        mut self,
        mut commands: mpsc::Receiver<BoardCommand>,
        mut status: watch::Receiver<ConnectionStatus>,
    ) {
        let project = self.reconciler.project();
        let mut inbound_open = true;
        let mut status_open = true;

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(BoardCommand::Intent(intent)) => self.dispatch(intent),
                    Some(BoardCommand::Shutdown) | None => break,
                },
                frame = self.connection.recv(), if inbound_open => match frame {
                    Some(frame) => self.on_frame(&frame),
                    None => {
                        tracing::debug!(project = %project, "task channel ended");
                        inbound_open = false;
                    }
                },
                Some(done) = self.completions_rx.recv() => self.on_completion(done),
                changed = status.changed(), if status_open => {
                    if changed.is_ok() {
                        let current = *status.borrow_and_update();
                        tracing::info!(project = %project, status = %current, "task channel status");
                        self.emit(BoardEvent::StatusChanged(current));
                    } else {
                        status_open = false;
                    }
                }
            }
        }

        self.connection.close();
        tracing::info!(project = %project, "board session closed");
    }

    fn dispatch(&mut self, intent: Intent) {
        let project = self.reconciler.project();
        // A change committed now could not be broadcast, and peers would
        // never see it.
        if !self.connection.is_ready() {
            tracing::info!(project = %project, status = %self.connection.status(), "intent refused, task channel not open");
            self.emit(BoardEvent::Failed {
                intent,
                error: ConnectionError::NotReady.into(),
            });
            return;
        }
        let plan = match self.reconciler.plan(intent.clone()) {
            Ok(Some(plan)) => plan,
            Ok(None) => {
                tracing::debug!(project = %project, ?intent, "intent is a no-op");
                return;
            }
            Err(error) => {
                tracing::info!(project = %project, err = %error, "intent rejected");
                self.emit(BoardEvent::Failed { intent, error });
                return;
            }
        };

        if let Plan::Broadcast(event) = plan {
            self.on_completion(Completion {
                intent,
                result: Ok(event),
            });
            return;
        }

        let store = Arc::clone(&self.store);
        let completions = self.completions_tx.clone();
        tokio::spawn(async move {
            let result = plan.execute(&*store, project).await.map_err(BoardError::from);
            if completions.send(Completion { intent, result }).is_err() {
                tracing::debug!(project = %project, "board session gone, discarding REST result");
            }
        });
    }

    fn on_completion(&mut self, done: Completion) {
        let project = self.reconciler.project();
        let event = match done.result {
            Ok(event) => event,
            Err(error) => {
                tracing::warn!(project = %project, err = %error, "local change failed");
                self.emit(BoardEvent::Failed {
                    intent: done.intent,
                    error,
                });
                return;
            }
        };

        let outcome = self.reconciler.apply_remote_event(&event);
        if outcome.is_changed() {
            self.publish();
        }
        let sent = self.connection.send_event(&event);
        self.emit(BoardEvent::Applied {
            event,
            outcome,
            local: true,
        });
        if let Err(e) = sent {
            tracing::warn!(project = %project, err = %e, "committed change was not broadcast");
            self.emit(BoardEvent::Failed {
                intent: done.intent,
                error: e.into(),
            });
        }
    }

    fn on_frame(&mut self, frame: &Frame) {
        let event = match frame.event() {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(project = %self.reconciler.project(), err = %e, "dropping sync event");
                return;
            }
        };
        if let Some(entry) = ActivityEntry::from_frame(frame) {
            self.emit(BoardEvent::Activity(entry));
        }
        let outcome = self.reconciler.apply_remote_event(&event);
        if outcome.is_changed() {
            self.publish();
        }
        self.emit(BoardEvent::Applied {
            event,
            outcome,
            local: false,
        });
    }

    fn publish(&self) {
        self.state_tx.send_replace(self.reconciler.state().clone());
    }

    fn emit(&self, event: BoardEvent) {
        if let Err(mpsc::error::TrySendError::Full(event)) = self.events_tx.try_send(event) {
            tracing::warn!(?event, "board event dropped, receiver is lagging");
        }
    }
}

/// Handle to a running [`BoardSession`].
///
/// Dropping the handle stops the session task and closes its connection.
#[derive(Debug)]
pub struct BoardHandle {
    project: ProjectId,
    commands: mpsc::Sender<BoardCommand>,
    state: watch::Receiver<BoardState>,
    status: watch::Receiver<ConnectionStatus>,
    events: mpsc::Receiver<BoardEvent>,
    task: Option<JoinHandle<()>>,
}

impl BoardHandle {
    /// The project this board shows.
    #[must_use]
    pub const fn project(&self) -> ProjectId {
        self.project
    }

    /// A copy of the latest board state.
    #[must_use]
    pub fn snapshot(&self) -> BoardState {
        self.state.borrow().clone()
    }

    /// A receiver notified on every board change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<BoardState> {
        self.state.clone()
    }

    /// Current status of the task channel.
    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    /// Waits until the task channel is connected or has given up, and
    /// returns the status reached.
    pub async fn wait_until_ready(&self) -> ConnectionStatus {
        let mut status = self.status.clone();
        status
            .wait_for(|s| s.is_ready() || s.is_terminal())
            .await
            .map_or(ConnectionStatus::Closed, |s| *s)
    }

    /// Queues a local change.
    ///
    /// The session refuses it with a [`BoardEvent::Failed`] carrying
    /// [`ConnectionError::NotReady`] unless the task channel is open.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::SessionClosed`] if the session has stopped.
    pub async fn submit(&self, intent: Intent) -> Result<(), BoardError> {
        self.commands
            .send(BoardCommand::Intent(intent))
            .await
            .map_err(|_| BoardError::SessionClosed)
    }

    /// Next notification; `None` once the session has stopped.
    pub async fn next_event(&mut self) -> Option<BoardEvent> {
        self.events.recv().await
    }

    /// Stops the session and waits for it to close its connection.
    pub async fn close(mut self) {
        let _ = self.commands.send(BoardCommand::Shutdown).await;
        if let Some(task) = self.task.take()
            && let Err(e) = task.await
        {
            tracing::warn!(project = %self.project, err = %e, "board session task failed");
        }
    }
}

impl Drop for BoardHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::time::Duration;

    use taskboard_proto::task::{Percentage, Task, TaskId, TaskStatus};

    use super::*;
    use crate::board::SkipReason;
    use crate::store::memory::MemoryTaskStore;
    use crate::test_support::{echo_server, manager};

    const P: ProjectId = ProjectId::new(3);
    const WAIT: Duration = Duration::from_secs(5);

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
            project: Some(P),
        }
    }

    async fn next_applied(handle: &mut BoardHandle) -> (SyncEvent, Outcome, bool) {
        loop {
            let event = tokio::time::timeout(WAIT, handle.next_event())
                .await
                .unwrap()
                .unwrap();
            if let BoardEvent::Applied {
                event,
                outcome,
                local,
            } = event
            {
                return (event, outcome, local);
            }
        }
    }

    #[tokio::test]
    async fn open_hydrates_from_store() {
        let url = echo_server().await;
        let store = Arc::new(MemoryTaskStore::new());
        store.seed(P, vec![task(1, "A"), task(2, "B")]);
        let handle = BoardSession::open(store, &manager(&url), P).await.unwrap();
        assert_eq!(handle.snapshot().len(), 2);
        assert_eq!(handle.wait_until_ready().await, ConnectionStatus::Connected);
        handle.close().await;
    }

    #[tokio::test]
    async fn open_fails_when_snapshot_fails() {
        let url = echo_server().await;
        let store = Arc::new(MemoryTaskStore::new());
        store.fail_with(Some("down"));
        let connections = manager(&url);
        let result = BoardSession::open(store, &connections, P).await;
        assert!(matches!(result, Err(BoardError::Network(_))));
        assert!(!connections.is_registered(Channel::Tasks(P)));
    }

    #[tokio::test]
    async fn local_change_is_applied_then_echo_ignored() {
        let url = echo_server().await;
        let store = Arc::new(MemoryTaskStore::new());
        let mut handle = BoardSession::open(Arc::clone(&store), &manager(&url), P)
            .await
            .unwrap();
        handle.wait_until_ready().await;

        handle
            .submit(Intent::AddTask {
                title: "Write tests".to_string(),
                description: String::new(),
            })
            .await
            .unwrap();

        let (event, outcome, local) = next_applied(&mut handle).await;
        assert!(local);
        assert_eq!(outcome, Outcome::Changed);
        assert!(matches!(event, SyncEvent::TaskCreated(_)));
        assert_eq!(handle.snapshot().tasks()[0].title, "Write tests");

        let (echo, outcome, local) = next_applied(&mut handle).await;
        assert!(!local);
        assert_eq!(echo, event);
        assert_eq!(outcome, Outcome::Skipped(SkipReason::DuplicateTask));
        assert_eq!(handle.snapshot().len(), 1);
        assert_eq!(store.tasks(P).len(), 1);
        handle.close().await;
    }

    #[tokio::test]
    async fn rest_failure_is_reported_and_board_unchanged() {
        let url = echo_server().await;
        let store = Arc::new(MemoryTaskStore::new());
        store.seed(P, vec![task(1, "A")]);
        let mut handle = BoardSession::open(Arc::clone(&store), &manager(&url), P)
            .await
            .unwrap();
        handle.wait_until_ready().await;
        store.fail_with(Some("backend down"));

        handle
            .submit(Intent::DeleteTask(TaskId::new(1)))
            .await
            .unwrap();
        let failed = loop {
            match tokio::time::timeout(WAIT, handle.next_event()).await.unwrap() {
                Some(BoardEvent::Failed { intent, error }) => break (intent, error),
                Some(_) => {}
                None => panic!("session ended"),
            }
        };
        assert_eq!(failed.0, Intent::DeleteTask(TaskId::new(1)));
        assert!(matches!(failed.1, BoardError::Network(_)));
        assert_eq!(handle.snapshot().len(), 1);
        handle.close().await;
    }

    #[tokio::test]
    async fn validation_errors_never_reach_the_store() {
        let url = echo_server().await;
        let store = Arc::new(MemoryTaskStore::new());
        let mut handle = BoardSession::open(Arc::clone(&store), &manager(&url), P)
            .await
            .unwrap();
        handle.wait_until_ready().await;
        handle
            .submit(Intent::AddTask {
                title: "  ".to_string(),
                description: String::new(),
            })
            .await
            .unwrap();
        let error = loop {
            match tokio::time::timeout(WAIT, handle.next_event()).await.unwrap() {
                Some(BoardEvent::Failed { error, .. }) => break error,
                Some(_) => {}
                None => panic!("session ended"),
            }
        };
        assert!(matches!(error, BoardError::TitleEmpty));
        assert!(store.tasks(P).is_empty());
    }

    #[tokio::test]
    async fn intents_are_refused_until_the_channel_is_open() {
        // Nothing listens on port 1, so the channel never opens.
        let store = Arc::new(MemoryTaskStore::new());
        let mut handle = BoardSession::open(Arc::clone(&store), &manager("ws://127.0.0.1:1"), P)
            .await
            .unwrap();
        assert!(!handle.status().is_ready());

        handle
            .submit(Intent::AddTask {
                title: "Too early".to_string(),
                description: String::new(),
            })
            .await
            .unwrap();
        let (intent, error) = loop {
            match tokio::time::timeout(WAIT, handle.next_event()).await.unwrap() {
                Some(BoardEvent::Failed { intent, error }) => break (intent, error),
                Some(BoardEvent::Applied { event, .. }) => panic!("applied {event:?}"),
                Some(_) => {}
                None => panic!("session ended"),
            }
        };
        assert!(matches!(intent, Intent::AddTask { .. }));
        assert!(matches!(
            error,
            BoardError::Connection(ConnectionError::NotReady)
        ));
        assert!(handle.snapshot().is_empty());
        assert!(store.tasks(P).is_empty());
        handle.close().await;
    }

    #[tokio::test]
    async fn submit_after_close_is_rejected() {
        let url = echo_server().await;
        let store = Arc::new(MemoryTaskStore::new());
        let connections = manager(&url);
        let handle = BoardSession::open(store, &connections, P).await.unwrap();
        let commands = handle.commands.clone();
        handle.close().await;
        assert!(!connections.is_registered(Channel::Tasks(P)));
        assert!(commands.send(BoardCommand::Shutdown).await.is_err());
    }
}
