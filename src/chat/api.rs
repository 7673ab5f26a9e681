//! Backend endpoints the chat session depends on.

use crate::backend::BackendError;

use super::message::{ChatMessage, RoomId};

#[async_trait::async_trait]
pub trait ChatApi: Send + Sync {
    /// Ask the backend to open a new support room for the caller.
    async fn create_room(&self, token: &str) -> Result<RoomId, BackendError>;

    /// Full message history of `room`, oldest first.
    async fn history(&self, token: &str, room: &RoomId) -> Result<Vec<ChatMessage>, BackendError>;
}
