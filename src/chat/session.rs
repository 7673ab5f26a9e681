//! Chat session: room handshake, sending, and inbound projection for one user.
//!
//! DESIGN
//! ======
//! A session owns one transport, one [`RoomSlot`], one subscription registry
//! and the in-memory transcript. A pump task turns transport events and topic
//! deliveries into [`ChatEvent`]s on a broadcast channel that attached
//! browser sockets forward verbatim.
//!
//! HANDSHAKE
//! =========
//! On every transport `Connected`:
//! 1. subscribe to the personal notification topic
//! 2. if a room id is cached: subscribe to the room topic, load history,
//!    publish JOIN
//!
//! On send with no cached room: create a room through the backend, store the
//! id, subscribe, then publish. Sends racing ahead of room creation are not
//! serialized; each of them creates its own room.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::backend::BackendError;
use crate::error::ErrorCode;

use super::api::ChatApi;
use super::message::{ChatMessage, ChatTopics, MessageKind, Notification, RoomId};
use super::projector::{self, TranscriptEntry};
use super::registry::SubscriptionRegistry;
use super::room::{ROOM_STORAGE_KEY, RoomSlot};
use super::transport::{Delivery, Transport, TransportError, TransportEvent};

const EVENT_CHANNEL_CAPACITY: usize = 128;

// =============================================================================
// TYPES
// =============================================================================

/// Who the session acts for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatIdentity {
    /// Backend user id; also the `sender` on published messages.
    pub user_id: String,
    /// Bearer token for backend calls and the broker CONNECT.
    pub token: String,
}

/// Events pushed to attached views.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    Connected,
    Disconnected,
    /// The session now uses `room_id`; the browser should cache it under `storage_key`.
    RoomAssigned { room_id: RoomId, storage_key: &'static str },
    /// Transcript replaced by the room's history.
    History { entries: Vec<TranscriptEntry> },
    Entry { entry: TranscriptEntry },
    Toast { notification: Notification },
    /// Transient failure to surface as a notification.
    Error { code: &'static str, message: String },
}

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("message is empty")]
    EmptyMessage,
    #[error("chat is not connected")]
    NotConnected,
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl ErrorCode for ChatError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::EmptyMessage => "E_CHAT_EMPTY_MESSAGE",
            Self::NotConnected => "E_CHAT_NOT_CONNECTED",
            Self::Transport(e) => e.error_code(),
            Self::Backend(e) => e.error_code(),
        }
    }

    fn retryable(&self) -> bool {
        match self {
            Self::EmptyMessage => false,
            Self::NotConnected => true,
            Self::Transport(e) => e.retryable(),
            Self::Backend(e) => e.retryable(),
        }
    }
}

/// A failed send. Carries the typed text so it can be put back in the input.
#[derive(Debug, thiserror::Error)]
#[error("send failed: {error}")]
pub struct SendError {
    pub draft: String,
    #[source]
    pub error: ChatError,
}

// =============================================================================
// SESSION
// =============================================================================

pub struct ChatSession {
    identity: ChatIdentity,
    topics: ChatTopics,
    transport: Arc<dyn Transport>,
    api: Arc<dyn ChatApi>,
    room: RoomSlot,
    registry: Mutex<SubscriptionRegistry>,
    transcript: Mutex<Vec<TranscriptEntry>>,
    events: broadcast::Sender<ChatEvent>,
    started: AtomicBool,
    inbound: Mutex<Option<mpsc::UnboundedReceiver<Delivery>>>,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl ChatSession {
    #[must_use]
    pub fn new(
        identity: ChatIdentity,
        topics: ChatTopics,
        transport: Arc<dyn Transport>,
        api: Arc<dyn ChatApi>,
        room: RoomSlot,
    ) -> Arc<Self> {
        let (sink, inbound) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Arc::new(Self {
            identity,
            topics,
            registry: Mutex::new(SubscriptionRegistry::new(Arc::clone(&transport), sink)),
            transport,
            api,
            room,
            transcript: Mutex::new(Vec::new()),
            events,
            started: AtomicBool::new(false),
            inbound: Mutex::new(Some(inbound)),
            pump: Mutex::new(None),
        })
    }

    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.identity.user_id
    }

    #[must_use]
    pub fn room(&self) -> Option<RoomId> {
        self.room.get()
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    #[must_use]
    pub fn transcript(&self) -> Vec<TranscriptEntry> {
        self.transcript
            .lock()
            .map(|t| t.clone())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn active_topics(&self) -> Vec<String> {
        self.registry
            .lock()
            .map(|r| r.topics())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn subscribe_events(&self) -> broadcast::Receiver<ChatEvent> {
        self.events.subscribe()
    }

    /// Start the pump and the transport. Subsequent calls do nothing.
    ///
    /// # Errors
    ///
    /// Returns the transport error if the connection cannot be started.
    pub async fn connect(self: &Arc<Self>) -> Result<(), ChatError> {
        if self.started.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        // Subscribe to transport events before connecting so `Connected` is not missed.
        let events = self.transport.events();
        let inbound = self
            .inbound
            .lock()
            .ok()
            .and_then(|mut slot| slot.take());
        if let Some(inbound) = inbound {
            let handle = tokio::spawn(pump(Arc::downgrade(self), events, inbound));
            if let Ok(mut pump) = self.pump.lock() {
                *pump = Some(handle);
            }
        }
        info!(user_id = %self.identity.user_id, "chat: connecting");
        self.transport.connect().await?;
        Ok(())
    }

    /// Send a CHAT message to the current room, creating the room first if
    /// none is cached.
    ///
    /// # Errors
    ///
    /// Returns a [`SendError`] carrying the original text on any failure.
    pub async fn send(&self, content: &str) -> Result<(), SendError> {
        self.try_send(content)
            .await
            .map_err(|error| SendError { draft: content.to_owned(), error })
    }

    async fn try_send(&self, content: &str) -> Result<(), ChatError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        if !self.transport.is_connected() {
            return Err(ChatError::NotConnected);
        }

        let room = match self.room.get() {
            Some(room) => room,
            None => {
                // Concurrent first sends each reach this branch.
                let room = self.api.create_room(&self.identity.token).await?;
                self.room.set(room.clone());
                info!(user_id = %self.identity.user_id, %room, "chat: room created");
                self.emit(ChatEvent::RoomAssigned { room_id: room.clone(), storage_key: ROOM_STORAGE_KEY });
                self.with_registry(|r| r.ensure(&self.topics.room(&room)))?;
                room
            }
        };

        let message = ChatMessage::new(MessageKind::Chat, &self.identity.user_id, content, &room);
        self.publish(&self.topics.send(&room), &message)?;
        debug!(user_id = %self.identity.user_id, %room, "chat: message sent");
        Ok(())
    }

    /// Adopt a room id cached by the browser if the session has none yet.
    ///
    /// # Errors
    ///
    /// Returns an error if entering the room on a live connection fails.
    pub async fn adopt_room(&self, room: RoomId) -> Result<(), ChatError> {
        if !self.room.seed(room.clone()) {
            return Ok(());
        }
        if self.transport.is_connected() {
            self.enter_room(&room).await?;
        }
        Ok(())
    }

    /// Leave the current room (if any) and enter `room`.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport is down or the new subscription
    /// fails. On error the session stays in its previous room.
    pub async fn switch_room(&self, room: RoomId) -> Result<(), ChatError> {
        if !self.transport.is_connected() {
            return Err(ChatError::NotConnected);
        }
        let previous = self.room.get();
        if previous.as_ref() == Some(&room) {
            return Ok(());
        }
        // Subscribe before touching the slot so a failure leaves the old room active.
        self.with_registry(|r| r.ensure(&self.topics.room(&room)))?;
        self.room.set(room.clone());
        if let Some(previous) = previous {
            self.announce(MessageKind::Leave, &previous);
            self.with_registry(|r| Ok(r.release(&self.topics.room(&previous))))?;
        }
        self.emit(ChatEvent::RoomAssigned { room_id: room.clone(), storage_key: ROOM_STORAGE_KEY });
        self.enter_room(&room).await
    }

    /// Tear down: LEAVE the room, drop every subscription, stop the pump and
    /// close the transport. Safe to call more than once.
    pub fn release(&self) {
        if let Some(room) = self.room.get() {
            if self.transport.is_connected() {
                self.announce(MessageKind::Leave, &room);
            }
        }
        if let Ok(mut registry) = self.registry.lock() {
            registry.clear();
        }
        if let Some(handle) = self.pump.lock().ok().and_then(|mut p| p.take()) {
            handle.abort();
        }
        self.transport.close();
        info!(user_id = %self.identity.user_id, "chat: session released");
    }

    // -------------------------------------------------------------------------
    // handshake
    // -------------------------------------------------------------------------

    async fn on_connected(&self) {
        let notifications = self.topics.notifications(&self.identity.user_id);
        if let Err(e) = self.with_registry(|r| r.ensure(&notifications)) {
            self.emit_error(&e);
        }
        self.emit(ChatEvent::Connected);

        if let Some(room) = self.room.get() {
            if let Err(e) = self.enter_room(&room).await {
                self.emit_error(&e);
            }
        }
    }

    /// Subscribe to the room topic, load history, then announce JOIN.
    async fn enter_room(&self, room: &RoomId) -> Result<(), ChatError> {
        self.with_registry(|r| r.ensure(&self.topics.room(room)))?;

        match self.api.history(&self.identity.token, room).await {
            Ok(history) => {
                let entries = projector::project_all(&history, &self.identity.user_id);
                if let Ok(mut transcript) = self.transcript.lock() {
                    transcript.clone_from(&entries);
                }
                self.emit(ChatEvent::History { entries });
            }
            Err(e) => {
                warn!(%room, error = %e, "chat: history fetch failed");
                self.emit_error(&ChatError::Backend(e));
            }
        }

        self.announce(MessageKind::Join, room);
        info!(user_id = %self.identity.user_id, %room, "chat: joined room");
        Ok(())
    }

    fn on_disconnected(&self) {
        if let Ok(mut registry) = self.registry.lock() {
            registry.forget_all();
        }
        self.emit(ChatEvent::Disconnected);
    }

    // -------------------------------------------------------------------------
    // inbound
    // -------------------------------------------------------------------------

    fn on_delivery(&self, delivery: &Delivery) {
        if delivery.topic == self.topics.notifications(&self.identity.user_id) {
            match serde_json::from_str::<Notification>(&delivery.body) {
                Ok(notification) => {
                    let open = self.room.get();
                    if projector::should_toast(&notification, open.as_ref(), &self.identity.user_id) {
                        self.emit(ChatEvent::Toast { notification });
                    }
                }
                Err(e) => warn!(error = %e, "chat: invalid notification payload"),
            }
            return;
        }

        let Some(room) = self.room.get() else { return };
        if delivery.topic != self.topics.room(&room) {
            debug!(topic = %delivery.topic, "chat: delivery for inactive topic dropped");
            return;
        }
        let message = match serde_json::from_str::<ChatMessage>(&delivery.body) {
            Ok(m) => m,
            Err(e) => {
                warn!(error = %e, "chat: invalid room message payload");
                return;
            }
        };
        if let Some(entry) = projector::project(&message, &self.identity.user_id) {
            if let Ok(mut transcript) = self.transcript.lock() {
                transcript.push(entry.clone());
            }
            self.emit(ChatEvent::Entry { entry });
        }
    }

    // -------------------------------------------------------------------------
    // helpers
    // -------------------------------------------------------------------------

    fn with_registry<T>(
        &self,
        f: impl FnOnce(&mut SubscriptionRegistry) -> Result<T, TransportError>,
    ) -> Result<T, ChatError> {
        let mut registry = self
            .registry
            .lock()
            .map_err(|_| ChatError::Transport(TransportError::Closed))?;
        Ok(f(&mut registry)?)
    }

    fn publish(&self, destination: &str, message: &ChatMessage) -> Result<(), ChatError> {
        let body = serde_json::to_string(message).unwrap_or_default();
        self.transport.publish(destination, body)?;
        Ok(())
    }

    /// Publish a JOIN or LEAVE. Failures are logged, not surfaced.
    fn announce(&self, kind: MessageKind, room: &RoomId) {
        let message = ChatMessage::new(kind, &self.identity.user_id, "", room);
        let destination = match kind {
            MessageKind::Leave => self.topics.leave(room),
            _ => self.topics.join(room),
        };
        if let Err(e) = self.publish(&destination, &message) {
            debug!(%room, ?kind, error = %e, "chat: announce failed");
        }
    }

    fn emit(&self, event: ChatEvent) {
        let _ = self.events.send(event);
    }

    fn emit_error(&self, err: &ChatError) {
        self.emit(ChatEvent::Error { code: err.error_code(), message: err.to_string() });
    }
}

// =============================================================================
// PUMP
// =============================================================================

async fn pump(
    session: Weak<ChatSession>,
    mut events: broadcast::Receiver<TransportEvent>,
    mut inbound: mpsc::UnboundedReceiver<Delivery>,
) {
    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(session) = session.upgrade() else { break };
                match event {
                    Ok(TransportEvent::Connected) => session.on_connected().await,
                    Ok(TransportEvent::Disconnected) => session.on_disconnected(),
                    Ok(TransportEvent::Error(message)) => {
                        session.emit(ChatEvent::Error { code: "E_TRANSPORT", message });
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "chat: transport events lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            delivery = inbound.recv() => {
                let Some(delivery) = delivery else { break };
                let Some(session) = session.upgrade() else { break };
                session.on_delivery(&delivery);
            }
        }
    }
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
