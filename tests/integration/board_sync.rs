// Test-specific lint overrides: integration tests use unwrap/expect freely,
// and some pedantic/nursery lints are not appropriate for test code.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::doc_markdown,
    clippy::future_not_send,
    clippy::missing_panics_doc,
    clippy::missing_errors_doc
)]

//! Integration tests for two boards converging through the stub backend.
//!
//! Each test starts an in-process `taskboard-stub`, opens a board per user
//! with the real REST store and connection manager, and checks that a
//! change made on one board shows up on the other.

use std::sync::Arc;
use std::time::Duration;

use taskboard::activity::ActivityLog;
use taskboard::board::{BoardEvent, BoardHandle, BoardSession, BoardState, Intent};
use taskboard::chat::ChatFeed;
use taskboard::connection::{ConnectionConfig, ConnectionManager, ConnectionStatus};
use taskboard::session::Session;
use taskboard::store::http::{HttpTaskStore, StoreConfig};
use taskboard_proto::event::{Action, TaskField};
use taskboard_proto::task::{MemberId, ProjectId, TaskStatus};
use taskboard_stub::hub::Room;
use taskboard_stub::server::{self, StubState};
use tokio::sync::watch;

const PROJECT: ProjectId = ProjectId::new(1);
const WAIT: Duration = Duration::from_secs(10);

struct Client {
    store: Arc<HttpTaskStore>,
    connections: ConnectionManager,
}

async fn start_stub() -> (std::net::SocketAddr, Arc<StubState>) {
    let state = Arc::new(
        StubState::new()
            .with_user("tok-ana", "ana")
            .with_user("tok-bo", "bo"),
    );
    let (addr, _handle) = server::start_server_with_state("127.0.0.1:0", Arc::clone(&state))
        .await
        .unwrap();
    (addr, state)
}

fn client(addr: std::net::SocketAddr, id: u64, name: &str) -> Client {
    let session = Session::new(MemberId::new(id), name, format!("tok-{name}"));
    let store = HttpTaskStore::new(
        &StoreConfig {
            api_url: format!("http://{addr}/api"),
            request_timeout: Duration::from_secs(5),
        },
        session.clone(),
    )
    .unwrap();
    let connections =
        ConnectionManager::new(ConnectionConfig::new(format!("ws://{addr}")), session).unwrap();
    Client {
        store: Arc::new(store),
        connections,
    }
}

async fn open_board(client: &Client) -> BoardHandle {
    let board = BoardSession::open(Arc::clone(&client.store), &client.connections, PROJECT)
        .await
        .unwrap();
    assert_eq!(
        tokio::time::timeout(WAIT, board.wait_until_ready()).await.unwrap(),
        ConnectionStatus::Connected
    );
    board
}

/// Waits until `n` sockets have joined `room` on the stub.
async fn wait_for_subscribers(state: &StubState, room: Room, n: usize) {
    tokio::time::timeout(WAIT, async {
        while state.hub.subscribers(room) < n {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("sockets did not join the room");
}

async fn wait_for_state(
    board: &BoardHandle,
    pred: impl FnMut(&BoardState) -> bool,
) -> BoardState {
    let mut rx: watch::Receiver<BoardState> = board.subscribe();
    tokio::time::timeout(WAIT, rx.wait_for(pred))
        .await
        .expect("timed out waiting for board state")
        .unwrap()
        .clone()
}

#[tokio::test]
async fn changes_on_one_board_reach_the_other() {
    let (addr, state) = start_stub().await;
    let ana = client(addr, 1, "ana");
    let bo = client(addr, 2, "bo");
    let board_a = open_board(&ana).await;
    let board_b = open_board(&bo).await;
    wait_for_subscribers(&state, Room::Tasks(PROJECT), 2).await;

    board_a
        .submit(Intent::AddTask {
            title: "  Write report ".to_string(),
            description: "quarterly".to_string(),
        })
        .await
        .unwrap();
    let seen = wait_for_state(&board_b, |s| s.len() == 1).await;
    let task = seen.tasks()[0].clone();
    assert_eq!(task.title, "Write report");
    assert_eq!(task.status, TaskStatus::ToDo);

    // The sender's own echo must not duplicate the card.
    let own = wait_for_state(&board_a, |s| s.len() == 1).await;
    assert_eq!(own.tasks()[0].id, task.id);

    board_a
        .submit(Intent::MoveTask {
            task: task.id,
            to: TaskStatus::Doing,
        })
        .await
        .unwrap();
    wait_for_state(&board_b, |s| {
        s.task(task.id).is_some_and(|t| t.status == TaskStatus::Doing)
    })
    .await;

    board_b
        .submit(Intent::AddSubTask {
            task: task.id,
            title: "collect numbers".to_string(),
        })
        .await
        .unwrap();
    let with_sub = wait_for_state(&board_a, |s| {
        s.task(task.id).is_some_and(|t| t.subtasks.len() == 1)
    })
    .await;
    let subtask = with_sub.task(task.id).unwrap().subtasks[0].id;

    board_a
        .submit(Intent::ToggleSubTask {
            task: task.id,
            subtask,
        })
        .await
        .unwrap();
    wait_for_state(&board_b, |s| {
        s.task(task.id)
            .and_then(|t| t.subtask(subtask))
            .is_some_and(|sub| sub.completed)
    })
    .await;

    board_b.submit(Intent::DeleteTask(task.id)).await.unwrap();
    wait_for_state(&board_a, BoardState::is_empty).await;
    wait_for_state(&board_b, BoardState::is_empty).await;

    board_a.close().await;
    board_b.close().await;
}

#[tokio::test]
async fn late_joiner_hydrates_from_rest() {
    let (addr, _state) = start_stub().await;
    let ana = client(addr, 1, "ana");
    let board_a = open_board(&ana).await;
    for title in ["one", "two"] {
        board_a
            .submit(Intent::AddTask {
                title: title.to_string(),
                description: String::new(),
            })
            .await
            .unwrap();
    }
    wait_for_state(&board_a, |s| s.len() == 2).await;

    let bo = client(addr, 2, "bo");
    let board_b = open_board(&bo).await;
    let titles: Vec<String> = board_b
        .snapshot()
        .tasks()
        .iter()
        .map(|t| t.title.clone())
        .collect();
    assert_eq!(titles, vec!["one", "two"]);
}

#[tokio::test]
async fn editing_previews_do_not_change_the_task() {
    let (addr, state) = start_stub().await;
    let ana = client(addr, 1, "ana");
    let bo = client(addr, 2, "bo");
    let board_a = open_board(&ana).await;
    let board_b = open_board(&bo).await;
    wait_for_subscribers(&state, Room::Tasks(PROJECT), 2).await;

    board_a
        .submit(Intent::AddTask {
            title: "Draft".to_string(),
            description: String::new(),
        })
        .await
        .unwrap();
    let task = wait_for_state(&board_b, |s| s.len() == 1).await.tasks()[0].clone();

    board_a
        .submit(Intent::EditField {
            task: task.id,
            field: TaskField::Title,
            value: "Draft v2".into(),
        })
        .await
        .unwrap();
    let previewed = wait_for_state(&board_b, |s| s.has_previews(task.id)).await;
    assert_eq!(previewed.task(task.id).unwrap().title, "Draft");

    let mut edited = task.clone();
    edited.title = "Draft v2".to_string();
    board_a.submit(Intent::EditTask(edited)).await.unwrap();
    let saved = wait_for_state(&board_b, |s| {
        s.task(task.id).is_some_and(|t| t.title == "Draft v2")
    })
    .await;
    assert!(!saved.has_previews(task.id));
}

#[tokio::test]
async fn activity_is_stamped_with_the_sender() {
    let (addr, state) = start_stub().await;
    let ana = client(addr, 1, "ana");
    let bo = client(addr, 2, "bo");
    let board_a = open_board(&ana).await;
    let mut board_b = open_board(&bo).await;
    wait_for_subscribers(&state, Room::Tasks(PROJECT), 2).await;

    board_a
        .submit(Intent::AddTask {
            title: "Ship".to_string(),
            description: String::new(),
        })
        .await
        .unwrap();

    let entry = tokio::time::timeout(WAIT, async {
        loop {
            if let Some(BoardEvent::Activity(entry)) = board_b.next_event().await {
                break entry;
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(entry.user, "ana");
    assert_eq!(entry.action, Action::Created);
    assert_eq!(entry.render(), "ana has created a task 'Ship'");

    // The backend keeps the same history for late joiners.
    let history = ActivityLog::load(&*bo.store, PROJECT).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(state.store.activity(PROJECT)[0].user, "ana");
}

#[tokio::test]
async fn chat_messages_are_relayed_and_kept() {
    let (addr, state) = start_stub().await;
    let ana = client(addr, 1, "ana");
    let bo = client(addr, 2, "bo");
    let feed_a = ChatFeed::open(&*ana.store, &ana.connections, PROJECT)
        .await
        .unwrap();
    let mut feed_b = ChatFeed::open(&*bo.store, &bo.connections, PROJECT)
        .await
        .unwrap();

    wait_for_subscribers(&state, Room::Chat(PROJECT), 2).await;
    assert!(feed_a.status().is_ready());

    assert!(feed_a.send("hello bo").unwrap());
    let message = tokio::time::timeout(WAIT, feed_b.recv()).await.unwrap().unwrap();
    assert_eq!(message.user, "ana");
    assert_eq!(message.message, "hello bo");
    assert!(message.timestamp.is_some());

    let late = ChatFeed::open(&*bo.store, &bo.connections, PROJECT)
        .await
        .unwrap();
    assert_eq!(late.messages().len(), 1);
    feed_a.close();
}
