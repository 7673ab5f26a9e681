//! Room resolver state: the session-scoped cached room id.
//!
//! The browser keeps the id under [`ROOM_STORAGE_KEY`] and hands it over when
//! it attaches. The session holds it in a [`RoomSlot`] and reports changes
//! back so the browser can persist them.

use std::sync::{Arc, Mutex};

use super::message::RoomId;

/// Browser local-storage key holding the cached room id.
pub const ROOM_STORAGE_KEY: &str = "chatRoomId";

/// At most one room id per chat session.
#[derive(Debug, Clone, Default)]
pub struct RoomSlot {
    inner: Arc<Mutex<Option<RoomId>>>,
}

impl RoomSlot {
    #[must_use]
    pub fn new(initial: Option<RoomId>) -> Self {
        Self { inner: Arc::new(Mutex::new(initial)) }
    }

    #[must_use]
    pub fn get(&self) -> Option<RoomId> {
        self.inner
            .lock()
            .ok()
            .and_then(|slot| slot.clone())
    }

    /// Store `room`, returning the id it replaced.
    pub fn set(&self, room: RoomId) -> Option<RoomId> {
        self.inner
            .lock()
            .ok()
            .and_then(|mut slot| slot.replace(room))
    }

    /// Seed the slot only when empty. Returns `true` if `room` was stored.
    pub fn seed(&self, room: RoomId) -> bool {
        let Ok(mut slot) = self.inner.lock() else { return false };
        if slot.is_some() {
            return false;
        }
        *slot = Some(room);
        true
    }
}
