//! Connection manager: one chat session (and transport) per user.
//!
//! Browser sockets attach through [`ChatHub::attach`] and hold the returned
//! [`ChatView`]. Views for the same user share one session. When the last
//! view drops, the session is released and forgotten.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::info;

use super::api::ChatApi;
use super::message::{ChatTopics, RoomId};
use super::room::RoomSlot;
use super::session::{ChatError, ChatIdentity, ChatSession};
use super::transport::{BrokerConfig, StompTransport, Transport};

/// Opens the broker transport for a new session.
pub trait TransportFactory: Send + Sync {
    fn open(&self, identity: &ChatIdentity) -> Arc<dyn Transport>;
}

/// Production factory: STOMP over websocket to the configured broker.
pub struct StompFactory {
    pub url: String,
    pub reconnect_delay: Duration,
}

impl TransportFactory for StompFactory {
    fn open(&self, identity: &ChatIdentity) -> Arc<dyn Transport> {
        Arc::new(StompTransport::new(BrokerConfig {
            url: self.url.clone(),
            token: Some(identity.token.clone()),
            reconnect_delay: self.reconnect_delay,
        }))
    }
}

struct HubEntry {
    session: Arc<ChatSession>,
    views: usize,
}

type Sessions = Arc<Mutex<HashMap<String, HubEntry>>>;

#[derive(Clone)]
pub struct ChatHub {
    sessions: Sessions,
    factory: Arc<dyn TransportFactory>,
    api: Arc<dyn ChatApi>,
    topics: ChatTopics,
}

impl ChatHub {
    #[must_use]
    pub fn new(factory: Arc<dyn TransportFactory>, api: Arc<dyn ChatApi>, topics: ChatTopics) -> Self {
        Self { sessions: Arc::new(Mutex::new(HashMap::new())), factory, api, topics }
    }

    /// Attach a view for `identity`, creating and connecting the session on
    /// first attach. `cached_room` seeds the session's room only when the
    /// session has none yet.
    ///
    /// # Errors
    ///
    /// Returns the connect error; the view is released before returning.
    pub async fn attach(&self, identity: ChatIdentity, cached_room: Option<RoomId>) -> Result<ChatView, ChatError> {
        let session = {
            let mut sessions = self
                .sessions
                .lock()
                .map_err(|_| ChatError::NotConnected)?;
            let entry = sessions
                .entry(identity.user_id.clone())
                .or_insert_with(|| {
                    info!(user_id = %identity.user_id, "chat: new session");
                    let transport = self.factory.open(&identity);
                    let session = ChatSession::new(
                        identity.clone(),
                        self.topics.clone(),
                        transport,
                        Arc::clone(&self.api),
                        RoomSlot::default(),
                    );
                    HubEntry { session, views: 0 }
                });
            entry.views += 1;
            Arc::clone(&entry.session)
        };

        let view = ChatView { session, user_id: identity.user_id, sessions: Arc::clone(&self.sessions) };
        if let Some(room) = cached_room {
            view.session.adopt_room(room).await?;
        }
        view.session.connect().await?;
        Ok(view)
    }

    /// Number of users with a live session.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.sessions.lock().map(|s| s.len()).unwrap_or(0)
    }
}

/// An attached view of a user's chat session. Dropping it detaches.
pub struct ChatView {
    session: Arc<ChatSession>,
    user_id: String,
    sessions: Sessions,
}

impl ChatView {
    #[must_use]
    pub fn session(&self) -> &Arc<ChatSession> {
        &self.session
    }
}

impl Drop for ChatView {
    fn drop(&mut self) {
        let released = {
            let Ok(mut sessions) = self.sessions.lock() else { return };
            let Some(entry) = sessions.get_mut(&self.user_id) else { return };
            entry.views = entry.views.saturating_sub(1);
            if entry.views == 0 { sessions.remove(&self.user_id) } else { None }
        };
        if let Some(entry) = released {
            entry.session.release();
        }
    }
}

#[cfg(test)]
#[path = "hub_test.rs"]
mod tests;
