//! Subscription registry: scoped topic subscriptions with guaranteed release.
//!
//! Every live subscription is owned by a [`Subscription`] guard held in the
//! registry. Dropping the guard (directly, via [`SubscriptionRegistry::release`]
//! or [`SubscriptionRegistry::clear`], or by dropping the registry) sends the
//! broker UNSUBSCRIBE.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;

use super::transport::{Delivery, SubscriptionId, Transport, TransportError};

/// RAII handle for one broker subscription.
pub struct Subscription {
    id: SubscriptionId,
    topic: String,
    transport: Arc<dyn Transport>,
    armed: bool,
}

impl Subscription {
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if self.armed {
            self.transport.unsubscribe(&self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("topic", &self.topic)
            .finish_non_exhaustive()
    }
}

/// Active subscriptions of one chat session, keyed by topic.
pub struct SubscriptionRegistry {
    transport: Arc<dyn Transport>,
    sink: mpsc::UnboundedSender<Delivery>,
    active: HashMap<String, Subscription>,
}

impl SubscriptionRegistry {
    /// All deliveries from subscriptions made through this registry go to `sink`.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, sink: mpsc::UnboundedSender<Delivery>) -> Self {
        Self { transport, sink, active: HashMap::new() }
    }

    /// Subscribe to `topic` unless it is already held.
    ///
    /// Returns `true` when a new subscription was made.
    ///
    /// # Errors
    ///
    /// Propagates the transport error when the broker subscription fails.
    pub fn ensure(&mut self, topic: &str) -> Result<bool, TransportError> {
        if self.active.contains_key(topic) {
            return Ok(false);
        }
        let id = self.transport.subscribe(topic, self.sink.clone())?;
        self.active.insert(
            topic.to_owned(),
            Subscription { id, topic: topic.to_owned(), transport: Arc::clone(&self.transport), armed: true },
        );
        Ok(true)
    }

    /// Unsubscribe from `topic`. Returns `true` if it was held.
    pub fn release(&mut self, topic: &str) -> bool {
        self.active.remove(topic).is_some()
    }

    /// Unsubscribe from everything.
    pub fn clear(&mut self) {
        self.active.clear();
    }

    /// Forget every entry without sending UNSUBSCRIBE. Used after the broker
    /// connection dropped, when the broker has already discarded them.
    pub fn forget_all(&mut self) {
        for (_, mut sub) in self.active.drain() {
            sub.armed = false;
        }
    }

    #[must_use]
    pub fn contains(&self, topic: &str) -> bool {
        self.active.contains_key(topic)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.active.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    /// Held topics, sorted for stable output.
    #[must_use]
    pub fn topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.active.keys().cloned().collect();
        topics.sort();
        topics
    }
}

#[cfg(test)]
#[path = "registry_test.rs"]
mod tests;
