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

//! Integration tests for task channel recovery after the server drops it.
//!
//! The stub's hub closes every socket on demand: with code 1012 the client
//! must retry and resume, with code 1000 it must stop.

use std::sync::Arc;
use std::time::Duration;

use taskboard::board::{BoardEvent, BoardHandle, BoardSession, BoardState, Intent};
use taskboard::connection::{
    ConnectionConfig, ConnectionError, ConnectionManager, ConnectionStatus, ReconnectPolicy,
};
use taskboard::session::Session;
use taskboard::store::http::{HttpTaskStore, StoreConfig};
use taskboard_proto::task::{MemberId, ProjectId};
use taskboard_stub::server::{self, StubState};

const PROJECT: ProjectId = ProjectId::new(5);
const WAIT: Duration = Duration::from_secs(10);

async fn start_stub(state: StubState) -> (std::net::SocketAddr, Arc<StubState>) {
    let state = Arc::new(state);
    let (addr, _handle) = server::start_server_with_state("127.0.0.1:0", Arc::clone(&state))
        .await
        .unwrap();
    (addr, state)
}

async fn open_board(addr: std::net::SocketAddr, id: u64, name: &str) -> BoardHandle {
    let session = Session::new(MemberId::new(id), name, format!("tok-{name}"));
    let store = HttpTaskStore::new(
        &StoreConfig {
            api_url: format!("http://{addr}/api"),
            request_timeout: Duration::from_secs(5),
        },
        session.clone(),
    )
    .unwrap();
    let config = ConnectionConfig {
        reconnect: ReconnectPolicy {
            max_attempts: 3,
            delay: Duration::from_millis(300),
        },
        ..ConnectionConfig::new(format!("ws://{addr}"))
    };
    let connections = ConnectionManager::new(config, session).unwrap();
    BoardSession::open(Arc::new(store), &connections, PROJECT)
        .await
        .unwrap()
}

/// Reads board events until a status change matching `pred` arrives.
async fn wait_for_status(
    board: &mut BoardHandle,
    mut pred: impl FnMut(ConnectionStatus) -> bool,
) -> ConnectionStatus {
    tokio::time::timeout(WAIT, async {
        loop {
            match board.next_event().await {
                Some(BoardEvent::StatusChanged(status)) if pred(status) => break status,
                Some(_) => {}
                None => panic!("board session stopped"),
            }
        }
    })
    .await
    .expect("timed out waiting for status")
}

async fn wait_for_state(board: &BoardHandle, pred: impl FnMut(&BoardState) -> bool) {
    let mut rx = board.subscribe();
    tokio::time::timeout(WAIT, rx.wait_for(pred))
        .await
        .expect("timed out waiting for board state")
        .unwrap();
}

#[tokio::test]
async fn severed_channel_reconnects_and_resumes() {
    let (addr, state) = start_stub(StubState::new()).await;
    let mut board_a = open_board(addr, 1, "ana").await;
    let board_b = open_board(addr, 2, "bo").await;
    assert_eq!(board_a.wait_until_ready().await, ConnectionStatus::Connected);
    assert_eq!(board_b.wait_until_ready().await, ConnectionStatus::Connected);

    state.hub.sever_all();

    let retrying = wait_for_status(&mut board_a, |s| {
        matches!(s, ConnectionStatus::Reconnecting { .. })
    })
    .await;
    assert_eq!(
        retrying,
        ConnectionStatus::Reconnecting {
            attempt: 1,
            max_attempts: 3
        }
    );
    wait_for_status(&mut board_a, ConnectionStatus::is_ready).await;
    assert_eq!(board_b.wait_until_ready().await, ConnectionStatus::Connected);

    // Both sockets must be back in the room before the next change.
    let room = taskboard_stub::hub::Room::Tasks(PROJECT);
    tokio::time::timeout(WAIT, async {
        while state.hub.subscribers(room) < 2 {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .unwrap();

    board_a
        .submit(Intent::AddTask {
            title: "after the outage".to_string(),
            description: String::new(),
        })
        .await
        .unwrap();
    wait_for_state(&board_b, |s| s.len() == 1).await;
}

#[tokio::test]
async fn normal_close_is_final() {
    let (addr, state) = start_stub(StubState::new()).await;
    let mut board = open_board(addr, 1, "ana").await;
    assert_eq!(board.wait_until_ready().await, ConnectionStatus::Connected);

    state.hub.close_all_normally();

    let status = wait_for_status(&mut board, ConnectionStatus::is_terminal).await;
    assert_eq!(status, ConnectionStatus::Disconnected);

    // Without an open channel the change is refused before any REST call.
    board
        .submit(Intent::AddTask {
            title: "offline".to_string(),
            description: String::new(),
        })
        .await
        .unwrap();
    let failed = tokio::time::timeout(WAIT, async {
        loop {
            if let Some(BoardEvent::Failed { error, .. }) = board.next_event().await {
                break error;
            }
        }
    })
    .await
    .unwrap();
    assert!(matches!(
        failed,
        taskboard::board::BoardError::Connection(ConnectionError::NotReady)
    ));
    assert!(state.store.tasks(PROJECT).is_empty());
    assert!(board.snapshot().is_empty());
}

#[tokio::test]
async fn unknown_token_cannot_open_board() {
    let (addr, _state) = start_stub(StubState::new().requiring_auth(true)).await;
    // No token is registered, so the snapshot request is refused.
    let session = Session::new(MemberId::new(1), "ana", "tok-ana");
    let store = HttpTaskStore::new(
        &StoreConfig {
            api_url: format!("http://{addr}/api"),
            request_timeout: Duration::from_secs(5),
        },
        session.clone(),
    )
    .unwrap();
    let config = ConnectionConfig {
        reconnect: ReconnectPolicy {
            max_attempts: 1,
            delay: Duration::from_millis(10),
        },
        ..ConnectionConfig::new(format!("ws://{addr}"))
    };
    let connections = ConnectionManager::new(config, session).unwrap();
    let result = BoardSession::open(Arc::new(store), &connections, PROJECT).await;
    assert!(matches!(
        result,
        Err(taskboard::board::BoardError::Network(_))
    ));
}
