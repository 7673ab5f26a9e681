//! Live support chat.
//!
//! ARCHITECTURE
//! ============
//! Browsers talk to the portal over a websocket; the portal keeps one broker
//! connection per user and bridges the two.
//!
//! - `hub`: connection manager, one session per user, released on last detach
//! - `session`: room handshake, send path, inbound projection
//! - `room`: session-scoped cached room id
//! - `registry`: scoped topic subscriptions
//! - `projector`: wire message to transcript entry
//! - `transport` / `stomp`: broker connection and frame codec

pub mod api;
pub mod hub;
pub mod message;
pub mod projector;
pub mod registry;
pub mod room;
pub mod session;
pub mod stomp;
pub mod transport;

#[cfg(test)]
pub mod test_helpers;
