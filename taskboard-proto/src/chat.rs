//! Project chat messages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::activity::UNKNOWN_USER;
use crate::frame::{Frame, lenient_timestamp};

/// One message in a project's chat room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Author's username.
    #[serde(default)]
    pub user: String,
    /// Message text.
    pub message: String,
    /// When the server relayed or stored the message.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_timestamp"
    )]
    pub timestamp: Option<DateTime<Utc>>,
}

impl ChatMessage {
    /// Builds a message from a chat-channel frame; `None` if the payload is
    /// not text.
    #[must_use]
    pub fn from_frame(frame: &Frame) -> Option<Self> {
        let text = frame.message.as_str()?;
        Some(Self {
            user: frame.user.clone().unwrap_or_else(|| UNKNOWN_USER.to_string()),
            message: text.to_string(),
            timestamp: frame.timestamp,
        })
    }

    /// The outgoing frame for `text`, or `None` when it is blank.
    #[must_use]
    pub fn outgoing(text: &str) -> Option<Frame> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return None;
        }
        Some(Frame::new(Value::String(trimmed.to_string())))
    }
}
