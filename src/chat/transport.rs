//! Broker transport: one STOMP-over-websocket connection per chat session.
//!
//! DESIGN
//! ======
//! [`Transport`] is the seam between chat session logic and the broker.
//! Subscribe/unsubscribe/publish only enqueue frames, so they are synchronous
//! and safe to call from `Drop`. Deliveries for every subscription flow into
//! the sink supplied at subscribe time.
//!
//! LIFECYCLE
//! =========
//! `StompTransport::connect` spawns a supervisor task once. The supervisor
//! dials, performs the CONNECT handshake, then runs writer and reader loops
//! until the socket drops. It then waits the fixed reconnect delay and dials
//! again. Each transition is announced on the events channel; subscriptions
//! do not survive a reconnect (session logic re-runs its handshake on
//! `Connected`).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc, watch};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use super::stomp::{self, Command, StompFrame};

// =============================================================================
// TYPES
// =============================================================================

/// Broker-assigned subscription handle (the STOMP `id` header).
pub type SubscriptionId = String;

/// A message received on a subscribed topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub topic: String,
    pub body: String,
}

/// Connection state changes announced to session logic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Connected,
    Disconnected,
    /// Broker ERROR frame or socket failure. Transient; reconnect follows.
    Error(String),
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("transport is not connected")]
    NotConnected,
    #[error("broker connection failed: {0}")]
    Connect(String),
    #[error("broker rejected the session: {0}")]
    Rejected(String),
    #[error("transport is closed")]
    Closed,
}

impl crate::error::ErrorCode for TransportError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::NotConnected => "E_TRANSPORT_NOT_CONNECTED",
            Self::Connect(_) => "E_TRANSPORT_CONNECT",
            Self::Rejected(_) => "E_TRANSPORT_REJECTED",
            Self::Closed => "E_TRANSPORT_CLOSED",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::NotConnected | Self::Connect(_))
    }
}

// =============================================================================
// TRANSPORT TRAIT
// =============================================================================

#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Start the connection. Calling it again after the first call is a no-op.
    async fn connect(&self) -> Result<(), TransportError>;

    fn is_connected(&self) -> bool;

    /// Subscribe to `topic`; deliveries are pushed into `sink`.
    fn subscribe(&self, topic: &str, sink: mpsc::UnboundedSender<Delivery>) -> Result<SubscriptionId, TransportError>;

    fn unsubscribe(&self, id: &str);

    fn publish(&self, destination: &str, body: String) -> Result<(), TransportError>;

    fn events(&self) -> broadcast::Receiver<TransportEvent>;

    /// Stop the connection and the reconnect loop. Idempotent.
    fn close(&self);
}

// =============================================================================
// STOMP TRANSPORT
// =============================================================================

#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Websocket URL of the broker endpoint, e.g. `wss://chat.example/ws`.
    pub url: String,
    /// Bearer token forwarded in the CONNECT frame.
    pub token: Option<String>,
    pub reconnect_delay: Duration,
}

struct Route {
    topic: String,
    sink: mpsc::UnboundedSender<Delivery>,
}

struct Shared {
    connected: AtomicBool,
    started: AtomicBool,
    next_id: AtomicU64,
    outbound: Mutex<Option<mpsc::UnboundedSender<String>>>,
    routes: Mutex<HashMap<SubscriptionId, Route>>,
    events: broadcast::Sender<TransportEvent>,
    shutdown: watch::Sender<bool>,
}

impl Shared {
    fn emit(&self, event: TransportEvent) {
        // No receivers is fine: nobody is listening yet.
        let _ = self.events.send(event);
    }

    fn enqueue(&self, frame: &StompFrame) -> Result<(), TransportError> {
        if !self.connected.load(Ordering::Acquire) {
            return Err(TransportError::NotConnected);
        }
        let guard = self.outbound.lock().map_err(|_| TransportError::Closed)?;
        let tx = guard.as_ref().ok_or(TransportError::NotConnected)?;
        tx.send(stomp::encode_frame(frame))
            .map_err(|_| TransportError::NotConnected)
    }

    fn mark_disconnected(&self) {
        self.connected.store(false, Ordering::Release);
        if let Ok(mut out) = self.outbound.lock() {
            *out = None;
        }
        // Broker-side subscriptions died with the socket.
        if let Ok(mut routes) = self.routes.lock() {
            routes.clear();
        }
    }
}

/// Production transport: STOMP 1.2 over a websocket with fixed-delay reconnect.
pub struct StompTransport {
    config: BrokerConfig,
    shared: Arc<Shared>,
}

impl StompTransport {
    #[must_use]
    pub fn new(config: BrokerConfig) -> Self {
        let (events, _) = broadcast::channel(64);
        let (shutdown, _) = watch::channel(false);
        Self {
            config,
            shared: Arc::new(Shared {
                connected: AtomicBool::new(false),
                started: AtomicBool::new(false),
                next_id: AtomicU64::new(0),
                outbound: Mutex::new(None),
                routes: Mutex::new(HashMap::new()),
                events,
                shutdown,
            }),
        }
    }
}

#[async_trait::async_trait]
impl Transport for StompTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        if *self.shared.shutdown.borrow() {
            return Err(TransportError::Closed);
        }
        if self.shared.started.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let shared = Arc::clone(&self.shared);
        let config = self.config.clone();
        tokio::spawn(supervise(shared, config));
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::Acquire)
    }

    fn subscribe(&self, topic: &str, sink: mpsc::UnboundedSender<Delivery>) -> Result<SubscriptionId, TransportError> {
        let n = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        let id = format!("sub-{n}");
        self.shared
            .enqueue(&StompFrame::subscribe(&id, topic))?;
        if let Ok(mut routes) = self.shared.routes.lock() {
            routes.insert(id.clone(), Route { topic: topic.to_owned(), sink });
        }
        debug!(%id, %topic, "stomp: subscribed");
        Ok(id)
    }

    fn unsubscribe(&self, id: &str) {
        let removed = self
            .shared
            .routes
            .lock()
            .ok()
            .and_then(|mut routes| routes.remove(id));
        if removed.is_some() {
            // Best effort: a dead socket already dropped the subscription.
            let _ = self.shared.enqueue(&StompFrame::unsubscribe(id));
            debug!(%id, "stomp: unsubscribed");
        }
    }

    fn publish(&self, destination: &str, body: String) -> Result<(), TransportError> {
        self.shared
            .enqueue(&StompFrame::send(destination, body))
    }

    fn events(&self) -> broadcast::Receiver<TransportEvent> {
        self.shared.events.subscribe()
    }

    fn close(&self) {
        if self.shared.shutdown.send_replace(true) {
            return;
        }
        let _ = self
            .shared
            .enqueue(&StompFrame::new(Command::Disconnect));
        self.shared.mark_disconnected();
    }
}

impl Drop for StompTransport {
    fn drop(&mut self) {
        self.close();
    }
}

// =============================================================================
// SUPERVISOR
// =============================================================================

async fn supervise(shared: Arc<Shared>, config: BrokerConfig) {
    let mut shutdown = shared.shutdown.subscribe();
    loop {
        if *shutdown.borrow() {
            break;
        }
        match run_connection(&shared, &config, &mut shutdown).await {
            Ok(()) => info!(url = %config.url, "stomp: connection closed"),
            Err(e) => {
                warn!(url = %config.url, error = %e, "stomp: connection failed");
                shared.emit(TransportEvent::Error(e.to_string()));
            }
        }
        let was_connected = shared.connected.load(Ordering::Acquire);
        shared.mark_disconnected();
        if was_connected {
            shared.emit(TransportEvent::Disconnected);
        }

        tokio::select! {
            () = tokio::time::sleep(config.reconnect_delay) => {}
            _ = shutdown.changed() => {}
        }
    }
    debug!(url = %config.url, "stomp: supervisor stopped");
}

async fn run_connection(
    shared: &Arc<Shared>,
    config: &BrokerConfig,
    shutdown: &mut watch::Receiver<bool>,
) -> Result<(), TransportError> {
    let (socket, _) = tokio_tungstenite::connect_async(config.url.as_str())
        .await
        .map_err(|e| TransportError::Connect(e.to_string()))?;
    let (mut sink, mut stream) = socket.split();

    let connect = StompFrame::connect(&broker_host(&config.url), config.token.as_deref());
    sink.send(Message::text(stomp::encode_frame(&connect)))
        .await
        .map_err(|e| TransportError::Connect(e.to_string()))?;

    // Wait for CONNECTED (or ERROR) before accepting outbound frames.
    loop {
        let next = tokio::select! {
            next = stream.next() => next,
            _ = shutdown.changed() => {
                let _ = sink.close().await;
                return Ok(());
            }
        };
        let Some(msg) = next else {
            return Err(TransportError::Connect("socket closed during handshake".into()));
        };
        let msg = msg.map_err(|e| TransportError::Connect(e.to_string()))?;
        let Message::Text(text) = msg else { continue };
        match stomp::decode_frame(text.as_str()) {
            Ok(Some(frame)) if frame.command == Command::Connected => break,
            Ok(Some(frame)) if frame.command == Command::Error => {
                let reason = frame.get("message").unwrap_or("unknown").to_owned();
                return Err(TransportError::Rejected(reason));
            }
            Ok(_) => {}
            Err(e) => return Err(TransportError::Connect(e.to_string())),
        }
    }

    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
    if let Ok(mut out) = shared.outbound.lock() {
        *out = Some(out_tx);
    }
    shared.connected.store(true, Ordering::Release);
    info!(url = %config.url, "stomp: connected");
    shared.emit(TransportEvent::Connected);

    loop {
        tokio::select! {
            Some(text) = out_rx.recv() => {
                if let Err(e) = sink.send(Message::text(text)).await {
                    return Err(TransportError::Connect(e.to_string()));
                }
            }
            msg = stream.next() => {
                let Some(msg) = msg else { return Ok(()) };
                match msg {
                    Ok(Message::Text(text)) => dispatch_inbound(shared, text.as_str()),
                    Ok(Message::Close(_)) => return Ok(()),
                    Ok(_) => {}
                    Err(e) => return Err(TransportError::Connect(e.to_string())),
                }
            }
            _ = shutdown.changed() => {
                // Flush the DISCONNECT frame queued by `close`.
                while let Ok(text) = out_rx.try_recv() {
                    let _ = sink.send(Message::text(text)).await;
                }
                let _ = sink.close().await;
                return Ok(());
            }
        }
    }
}

fn dispatch_inbound(shared: &Shared, text: &str) {
    let frame = match stomp::decode_frame(text) {
        Ok(Some(frame)) => frame,
        Ok(None) => return,
        Err(e) => {
            warn!(error = %e, "stomp: undecodable frame");
            return;
        }
    };

    match frame.command {
        Command::Message => {
            let Some(sub_id) = frame.get("subscription").map(str::to_owned) else {
                warn!("stomp: MESSAGE without subscription header");
                return;
            };
            let Ok(routes) = shared.routes.lock() else { return };
            if let Some(route) = routes.get(&sub_id) {
                let _ = route.sink.send(Delivery { topic: route.topic.clone(), body: frame.body });
            }
        }
        Command::Error => {
            let reason = frame.get("message").unwrap_or("unknown").to_owned();
            warn!(%reason, "stomp: broker error frame");
            shared.emit(TransportEvent::Error(reason));
        }
        _ => {}
    }
}

/// Host header value for CONNECT: the authority part of the broker URL.
fn broker_host(url: &str) -> String {
    let rest = url.split_once("://").map_or(url, |(_, rest)| rest);
    let authority = rest.split(['/', '?']).next().unwrap_or(rest);
    authority
        .split(':')
        .next()
        .unwrap_or(authority)
        .to_owned()
}

#[cfg(test)]
#[path = "transport_test.rs"]
mod tests;
