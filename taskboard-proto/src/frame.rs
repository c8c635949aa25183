//! The text frame envelope shared by the task and chat channels.
//!
//! Clients send `{"message": ...}`. The server relays the message to every
//! subscriber of the channel, the sender included, and stamps the frame
//! with the sender's username and the time it was relayed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::event::{EventError, SyncEvent};

/// One text frame on a WebSocket channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    /// The payload: a sync event object on task channels, a string on chat.
    #[serde(default)]
    pub message: Value,
    /// Username of the sender, stamped by the server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    /// Relay time, stamped by the server.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_timestamp"
    )]
    pub timestamp: Option<DateTime<Utc>>,
}

impl Frame {
    /// An unstamped outgoing frame.
    #[must_use]
    pub const fn new(message: Value) -> Self {
        Self {
            message,
            user: None,
            timestamp: None,
        }
    }

    /// An outgoing frame carrying a sync event.
    ///
    /// # Errors
    ///
    /// Propagates [`SyncEvent::to_message`] failures.
    pub fn from_event(event: &SyncEvent) -> Result<Self, EventError> {
        Ok(Self::new(event.to_message()?))
    }

    /// Stamps the frame the way the relay does before broadcasting.
    #[must_use]
    pub fn stamped(mut self, user: impl Into<String>, at: DateTime<Utc>) -> Self {
        self.user = Some(user.into());
        self.timestamp = Some(at);
        self
    }

    /// Decodes the payload as a sync event.
    ///
    /// # Errors
    ///
    /// See [`SyncEvent::from_message`].
    pub fn event(&self) -> Result<SyncEvent, EventError> {
        SyncEvent::from_message(&self.message)
    }

    /// Serializes the frame to JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::Malformed`] if serialization fails.
    pub fn encode(&self) -> Result<String, EventError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parses a frame from JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::Malformed`] if the text is not a JSON object.
    pub fn decode(text: &str) -> Result<Self, EventError> {
        Ok(serde_json::from_str(text)?)
    }
}

/// A timestamp the server formatted in some other way is dropped rather than
/// failing the whole frame.
pub(crate) fn lenient_timestamp<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<DateTime<Utc>>, D::Error> {
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.and_then(|s| {
        DateTime::parse_from_rfc3339(&s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }))
}
