//! In-memory fakes for chat tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::{broadcast, mpsc};

use crate::backend::BackendError;

use super::api::ChatApi;
use super::message::{ChatMessage, ChatTopics, RoomId};
use super::room::RoomSlot;
use super::transport::{Delivery, SubscriptionId, Transport, TransportError, TransportEvent};

// =============================================================================
// FAKE TRANSPORT
// =============================================================================

/// Broker stand-in. Publishes to `/app/...` destinations are echoed to the
/// matching room topic, like the real broker relays them.
pub struct FakeTransport {
    topics: ChatTopics,
    connected: AtomicBool,
    closed: AtomicBool,
    fail_publish: AtomicBool,
    fail_subscribe: AtomicBool,
    pub connect_calls: AtomicUsize,
    next_id: AtomicU64,
    subs: Mutex<HashMap<SubscriptionId, (String, mpsc::UnboundedSender<Delivery>)>>,
    pub unsubscribed: Mutex<Vec<SubscriptionId>>,
    pub published: Mutex<Vec<(String, String)>>,
    /// Room slot contents observed at each publish.
    pub room_at_publish: Mutex<Vec<Option<RoomId>>>,
    watched_room: Mutex<Option<RoomSlot>>,
    events: broadcast::Sender<TransportEvent>,
}

impl FakeTransport {
    pub fn new() -> Arc<Self> {
        let (events, _) = broadcast::channel(32);
        Arc::new(Self {
            topics: ChatTopics::default(),
            connected: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            fail_publish: AtomicBool::new(false),
            fail_subscribe: AtomicBool::new(false),
            connect_calls: AtomicUsize::new(0),
            next_id: AtomicU64::new(0),
            subs: Mutex::new(HashMap::new()),
            unsubscribed: Mutex::new(Vec::new()),
            published: Mutex::new(Vec::new()),
            room_at_publish: Mutex::new(Vec::new()),
            watched_room: Mutex::new(None),
            events,
        })
    }

    pub fn watch_room(&self, slot: RoomSlot) {
        *self.watched_room.lock().unwrap() = Some(slot);
    }

    pub fn set_fail_publish(&self, fail: bool) {
        self.fail_publish.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_subscribe(&self, fail: bool) {
        self.fail_subscribe.store(fail, Ordering::SeqCst);
    }

    pub fn connects(&self) -> usize {
        self.connect_calls.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Topics with a live subscription, sorted.
    pub fn active_topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self
            .subs
            .lock()
            .unwrap()
            .values()
            .map(|(t, _)| t.clone())
            .collect();
        topics.sort();
        topics
    }

    pub fn published_to(&self, destination: &str) -> Vec<String> {
        self.published
            .lock()
            .unwrap()
            .iter()
            .filter(|(d, _)| d == destination)
            .map(|(_, b)| b.clone())
            .collect()
    }

    /// Push `body` to every subscriber of `topic`.
    pub fn deliver(&self, topic: &str, body: &str) {
        for (sub_topic, sink) in self.subs.lock().unwrap().values() {
            if sub_topic == topic {
                let _ = sink.send(Delivery { topic: topic.to_owned(), body: body.to_owned() });
            }
        }
    }

    /// Simulate a dropped socket: broker forgets subscriptions.
    pub fn drop_connection(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.subs.lock().unwrap().clear();
        let _ = self.events.send(TransportEvent::Disconnected);
    }

    /// Simulate the fixed-delay reconnect completing.
    pub fn reconnect(&self) {
        self.connected.store(true, Ordering::SeqCst);
        let _ = self.events.send(TransportEvent::Connected);
    }
}

#[async_trait::async_trait]
impl Transport for FakeTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        if !self.connected.swap(true, Ordering::SeqCst) {
            let _ = self.events.send(TransportEvent::Connected);
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn subscribe(&self, topic: &str, sink: mpsc::UnboundedSender<Delivery>) -> Result<SubscriptionId, TransportError> {
        if !self.is_connected() || self.fail_subscribe.load(Ordering::SeqCst) {
            return Err(TransportError::NotConnected);
        }
        let id = format!("sub-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.subs
            .lock()
            .unwrap()
            .insert(id.clone(), (topic.to_owned(), sink));
        Ok(id)
    }

    fn unsubscribe(&self, id: &str) {
        if self.subs.lock().unwrap().remove(id).is_some() {
            self.unsubscribed.lock().unwrap().push(id.to_owned());
        }
    }

    fn publish(&self, destination: &str, body: String) -> Result<(), TransportError> {
        if !self.is_connected() || self.fail_publish.load(Ordering::SeqCst) {
            return Err(TransportError::NotConnected);
        }
        let observed = self.watched_room.lock().unwrap().as_ref().and_then(RoomSlot::get);
        self.room_at_publish.lock().unwrap().push(observed);
        self.published
            .lock()
            .unwrap()
            .push((destination.to_owned(), body.clone()));
        if let Some(topic) = self.topics.relay_topic(destination) {
            self.deliver(&topic, &body);
        }
        Ok(())
    }

    fn events(&self) -> broadcast::Receiver<TransportEvent> {
        self.events.subscribe()
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);
    }
}

// =============================================================================
// FAKE CHAT API
// =============================================================================

pub struct FakeChatApi {
    pub created: AtomicUsize,
    pub history_calls: AtomicUsize,
    next_room: Mutex<Vec<RoomId>>,
    history: Mutex<HashMap<RoomId, Vec<ChatMessage>>>,
    fail_create: AtomicBool,
}

impl FakeChatApi {
    /// `rooms` are handed out in order by `create_room`.
    pub fn new(rooms: &[&str]) -> Arc<Self> {
        let mut next_room: Vec<RoomId> = rooms.iter().filter_map(|r| RoomId::parse(r)).collect();
        next_room.reverse();
        Arc::new(Self {
            created: AtomicUsize::new(0),
            history_calls: AtomicUsize::new(0),
            next_room: Mutex::new(next_room),
            history: Mutex::new(HashMap::new()),
            fail_create: AtomicBool::new(false),
        })
    }

    pub fn with_history(&self, room: &str, messages: Vec<ChatMessage>) {
        let room = RoomId::parse(room).unwrap();
        self.history.lock().unwrap().insert(room, messages);
    }

    pub fn set_fail_create(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }

    pub fn creates(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl ChatApi for FakeChatApi {
    async fn create_room(&self, _token: &str) -> Result<RoomId, BackendError> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(BackendError::Status { status: 503, message: "chat unavailable".into() });
        }
        self.created.fetch_add(1, Ordering::SeqCst);
        // A real backend round trip; lets racing callers interleave.
        tokio::task::yield_now().await;
        self.next_room
            .lock()
            .unwrap()
            .pop()
            .ok_or_else(|| BackendError::Parse("no more rooms".into()))
    }

    async fn history(&self, _token: &str, room: &RoomId) -> Result<Vec<ChatMessage>, BackendError> {
        self.history_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .history
            .lock()
            .unwrap()
            .get(room)
            .cloned()
            .unwrap_or_default())
    }
}
