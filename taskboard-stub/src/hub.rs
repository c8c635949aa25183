//! WebSocket rooms: one task room and one chat room per project.
//!
//! Every text frame a client sends is stamped with the sender's username and
//! the relay time, recorded in the project history, and broadcast to every
//! subscriber of the room, the sender included.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::mpsc;

use taskboard_proto::activity::ActivityEntry;
use taskboard_proto::chat::ChatMessage;
use taskboard_proto::frame::Frame;
use taskboard_proto::task::ProjectId;

use crate::store::ProjectStore;

/// Close code sent by [`Hub::sever_all`]; clients treat it as retryable.
pub const CLOSE_SERVICE_RESTART: u16 = 1012;

/// Close code sent by [`Hub::close_all_normally`].
pub const CLOSE_NORMAL: u16 = 1000;

/// A broadcast group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Room {
    /// `/ws/projects/{project}/tasks/`
    Tasks(ProjectId),
    /// `/ws/chat/{project}/`
    Chat(ProjectId),
}

impl Room {
    /// The project the room belongs to.
    #[must_use]
    pub const fn project(self) -> ProjectId {
        match self {
            Self::Tasks(p) | Self::Chat(p) => p,
        }
    }
}

impl fmt::Display for Room {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tasks(p) => write!(f, "tasks/{p}"),
            Self::Chat(p) => write!(f, "chat/{p}"),
        }
    }
}

type Subscribers = HashMap<u64, mpsc::UnboundedSender<Message>>;

/// Registry of live sockets per room.
#[derive(Debug, Default)]
pub struct Hub {
    rooms: Mutex<HashMap<Room, Subscribers>>,
    next_id: AtomicU64,
}

impl Hub {
    /// An empty hub.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a subscriber and returns its id.
    pub fn join(&self, room: Room, tx: mpsc::UnboundedSender<Message>) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.rooms.lock().entry(room).or_default().insert(id, tx);
        id
    }

    /// Removes a subscriber.
    pub fn leave(&self, room: Room, id: u64) {
        let mut rooms = self.rooms.lock();
        if let Some(subs) = rooms.get_mut(&room) {
            subs.remove(&id);
            if subs.is_empty() {
                rooms.remove(&room);
            }
        }
    }

    /// Number of live subscribers in `room`.
    #[must_use]
    pub fn subscribers(&self, room: Room) -> usize {
        self.rooms.lock().get(&room).map_or(0, HashMap::len)
    }

    /// Sends `text` to every subscriber of `room`. Returns how many received it.
    pub fn broadcast(&self, room: Room, text: &str) -> usize {
        let rooms = self.rooms.lock();
        let Some(subs) = rooms.get(&room) else {
            return 0;
        };
        subs.values()
            .filter(|tx| tx.send(Message::Text(text.into())).is_ok())
            .count()
    }

    /// Drops every socket with a retryable close code, as a restarting
    /// server would.
    pub fn sever_all(&self) {
        self.close_all(CLOSE_SERVICE_RESTART, "service restart");
    }

    /// Closes every socket with a normal close code.
    pub fn close_all_normally(&self) {
        self.close_all(CLOSE_NORMAL, "bye");
    }

    fn close_all(&self, code: u16, reason: &str) {
        let mut rooms = self.rooms.lock();
        let count: usize = rooms.values().map(HashMap::len).sum();
        for (_, tx) in rooms.drain().flat_map(|(_, subs)| subs) {
            let _ = tx.send(Message::Close(Some(CloseFrame {
                code,
                reason: reason.into(),
            })));
        }
        tracing::info!(count, code, "closed all sockets");
    }
}

/// Serves one socket until either side closes.
pub async fn handle_socket(
    socket: WebSocket,
    room: Room,
    user: String,
    hub: Arc<Hub>,
    store: Arc<ProjectStore>,
) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    let id = hub.join(room, tx);
    tracing::info!(%room, %user, id, "socket joined");

    let mut write_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let closing = matches!(msg, Message::Close(_));
            if ws_sender.send(msg).await.is_err() || closing {
                break;
            }
        }
    });

    let reader_hub = Arc::clone(&hub);
    let reader_user = user.clone();
    let mut read_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_receiver.next().await {
            match msg {
                Message::Text(text) => {
                    relay_text(room, &reader_user, text.as_str(), &reader_hub, &store);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut read_task => {
            write_task.abort();
        }
        _ = &mut write_task => {
            read_task.abort();
        }
    }

    hub.leave(room, id);
    tracing::info!(%room, %user, id, "socket left");
}

/// Stamps, records and broadcasts one client frame.
///
/// Frames that are not JSON objects are dropped.
pub fn relay_text(room: Room, user: &str, text: &str, hub: &Hub, store: &ProjectStore) {
    let frame = match Frame::decode(text) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::warn!(%room, %user, err = %e, "dropping malformed frame");
            return;
        }
    };
    let stamped = Frame::new(frame.message).stamped(user, Utc::now());
    match room {
        Room::Tasks(project) => {
            if let Some(entry) = ActivityEntry::from_frame(&stamped) {
                store.record_activity(project, entry);
            }
        }
        Room::Chat(project) => match ChatMessage::from_frame(&stamped) {
            Some(message) => store.record_chat(project, message),
            None => {
                tracing::warn!(%room, %user, "dropping non-text chat frame");
                return;
            }
        },
    }
    let encoded = match stamped.encode() {
        Ok(encoded) => encoded,
        Err(e) => {
            tracing::error!(%room, err = %e, "failed to encode frame");
            return;
        }
    };
    let delivered = hub.broadcast(room, &encoded);
    tracing::debug!(%room, %user, delivered, "frame relayed");
}
