//! Project chat feed over the chat channel.

use taskboard_proto::chat::ChatMessage;
use taskboard_proto::task::ProjectId;

use crate::connection::{Channel, Connection, ConnectionError, ConnectionManager, ConnectionStatus};
use crate::store::{StoreError, TaskStore};

/// Errors that can occur while operating the chat feed.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    /// Chat history could not be fetched.
    #[error("network failure: {0}")]
    Network(#[from] StoreError),

    /// The chat channel is unusable.
    #[error("connection error: {0}")]
    Connection(#[from] ConnectionError),
}

/// A project's chat room: history plus live messages in arrival order.
#[derive(Debug)]
pub struct ChatFeed {
    project: ProjectId,
    messages: Vec<ChatMessage>,
    connection: Connection,
}

impl ChatFeed {
    /// Connects the chat channel of `project` and loads its history.
    ///
    /// # Errors
    ///
    /// - [`ChatError::Connection`] if the channel URL cannot be built.
    /// - [`ChatError::Network`] if the history cannot be fetched.
    pub async fn open<S: TaskStore>(
        store: &S,
        connections: &ConnectionManager,
        project: ProjectId,
    ) -> Result<Self, ChatError> {
        let connection = connections.connect(Channel::Chat(project))?;
        let messages = store.list_chat(project).await?;
        tracing::debug!(project = %project, messages = messages.len(), "chat history loaded");
        Ok(Self {
            project,
            messages,
            connection,
        })
    }

    /// The project this room belongs to.
    #[must_use]
    pub const fn project(&self) -> ProjectId {
        self.project
    }

    /// Every message seen so far, oldest first.
    #[must_use]
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Status of the chat channel.
    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        self.connection.status()
    }

    /// Waits for the next chat message, appends it and returns a copy.
    ///
    /// Frames without text are logged and skipped. Returns `None` once the
    /// channel has ended for good.
    pub async fn recv(&mut self) -> Option<ChatMessage> {
        loop {
            let frame = self.connection.recv().await?;
            match ChatMessage::from_frame(&frame) {
                Some(message) => {
                    self.messages.push(message.clone());
                    return Some(message);
                }
                None => {
                    tracing::warn!(project = %self.project, "chat frame without text, skipping");
                }
            }
        }
    }

    /// Sends `text` trimmed. Blank text is not sent and returns `Ok(false)`.
    ///
    /// The message is not appended locally; it shows up when the server
    /// echoes it back.
    ///
    /// # Errors
    ///
    /// See [`Connection::send`].
    pub fn send(&self, text: &str) -> Result<bool, ConnectionError> {
        let Some(frame) = ChatMessage::outgoing(text) else {
            return Ok(false);
        };
        self.connection.send(&frame)?;
        Ok(true)
    }

    /// Closes the chat channel.
    pub fn close(&self) {
        self.connection.close();
    }
}
