//! Message projector: wire messages to display-ready transcript entries.

use serde::Serialize;

use super::message::{ChatMessage, MessageKind, Notification, RoomId};

/// One visible line of the chat transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptEntry {
    pub sender: String,
    pub content: String,
    pub kind: MessageKind,
    pub timestamp: i64,
    /// Authored by the user who owns the session.
    pub is_self: bool,
}

/// Project a wire message. JOIN and LEAVE never produce an entry.
#[must_use]
pub fn project(message: &ChatMessage, self_id: &str) -> Option<TranscriptEntry> {
    if message.kind.is_housekeeping() {
        return None;
    }
    Some(TranscriptEntry {
        sender: message.sender.clone(),
        content: message.content.clone(),
        kind: message.kind,
        timestamp: message.timestamp,
        is_self: message.kind == MessageKind::Chat && message.sender == self_id,
    })
}

/// Project a history batch, keeping order and dropping housekeeping kinds.
#[must_use]
pub fn project_all(messages: &[ChatMessage], self_id: &str) -> Vec<TranscriptEntry> {
    messages
        .iter()
        .filter_map(|m| project(m, self_id))
        .collect()
}

/// Surface a toast only for other people's messages in a room that is not open.
#[must_use]
pub fn should_toast(notification: &Notification, open_room: Option<&RoomId>, self_id: &str) -> bool {
    if notification.sender == self_id {
        return false;
    }
    open_room != Some(&notification.room_id)
}

#[cfg(test)]
#[path = "projector_test.rs"]
mod tests;
