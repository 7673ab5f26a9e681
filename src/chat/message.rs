//! Chat wire types: messages, kinds, notifications, room ids, topics.

use serde::{Deserialize, Serialize};

// =============================================================================
// ROOM ID
// =============================================================================

/// Opaque chat room identifier issued by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
    /// Parse a room id, rejecting blank input.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() { None } else { Some(Self(trimmed.to_owned())) }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RoomId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// MESSAGES
// =============================================================================

/// Kind of a chat message. Only `Chat` and `SystemAssign` are shown to users.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageKind {
    Chat,
    Join,
    Leave,
    /// A support agent was assigned to the room.
    SystemAssign,
}

impl MessageKind {
    /// Housekeeping kinds never reach the transcript.
    #[must_use]
    pub fn is_housekeeping(self) -> bool {
        matches!(self, Self::Join | Self::Leave)
    }
}

/// A message as published on a room topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub sender: String,
    #[serde(default)]
    pub content: String,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    /// Milliseconds since Unix epoch.
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_id: Option<RoomId>,
}

impl ChatMessage {
    #[must_use]
    pub fn new(kind: MessageKind, sender: &str, content: &str, room: &RoomId) -> Self {
        Self {
            sender: sender.to_owned(),
            content: content.to_owned(),
            kind,
            timestamp: now_ms(),
            room_id: Some(room.clone()),
        }
    }
}

/// A message delivered on a user's personal notification topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub sender: String,
    pub room_id: RoomId,
    #[serde(default, alias = "content")]
    pub preview: String,
}

pub(crate) fn now_ms() -> i64 {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    i64::try_from(now.as_millis()).unwrap_or(i64::MAX)
}

// =============================================================================
// TOPICS
// =============================================================================

/// Broker destinations used by the chat session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatTopics {
    /// Prefix for broadcast topics, e.g. `/topic`.
    pub topic_prefix: String,
    /// Prefix for application destinations handled by the broker, e.g. `/app`.
    pub app_prefix: String,
    /// Prefix for per-user queues, e.g. `/user`.
    pub user_prefix: String,
}

impl Default for ChatTopics {
    fn default() -> Self {
        Self { topic_prefix: "/topic".into(), app_prefix: "/app".into(), user_prefix: "/user".into() }
    }
}

impl ChatTopics {
    #[must_use]
    pub fn room(&self, room: &RoomId) -> String {
        format!("{}/room/{room}", self.topic_prefix)
    }

    #[must_use]
    pub fn send(&self, room: &RoomId) -> String {
        format!("{}/chat.sendMessage/{room}", self.app_prefix)
    }

    #[must_use]
    pub fn join(&self, room: &RoomId) -> String {
        format!("{}/chat.addUser/{room}", self.app_prefix)
    }

    #[must_use]
    pub fn leave(&self, room: &RoomId) -> String {
        format!("{}/chat.leaveRoom/{room}", self.app_prefix)
    }

    #[must_use]
    pub fn notifications(&self, user_id: &str) -> String {
        format!("{}/{user_id}/queue/notifications", self.user_prefix)
    }

    /// Map an application destination back to the room topic the broker
    /// relays it to. Returns `None` for destinations that are not room sends.
    #[must_use]
    pub fn relay_topic(&self, destination: &str) -> Option<String> {
        let rest = destination.strip_prefix(&self.app_prefix)?.strip_prefix('/')?;
        let (_, room) = rest.split_once('/')?;
        RoomId::parse(room).map(|room| self.room(&room))
    }
}

#[cfg(test)]
#[path = "message_test.rs"]
mod tests;
