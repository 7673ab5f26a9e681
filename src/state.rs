//! Shared application state.
//!
//! DESIGN
//! ======
//! `AppState` is injected into Axum handlers via the `State` extractor. It
//! holds the typed config, the pooled backend client and the chat hub. The
//! portal keeps no domain data; the only live state is the per-user chat
//! sessions owned by the hub.

use std::sync::Arc;

use crate::backend::{BackendClient, BackendError};
use crate::chat::hub::{ChatHub, StompFactory, TransportFactory};
use crate::chat::message::ChatTopics;
use crate::config::AppConfig;

/// Clone is required by Axum; every field is Arc-wrapped or cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub backend: Arc<BackendClient>,
    pub chat: ChatHub,
}

impl AppState {
    /// Production state: STOMP transports to the configured broker.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend HTTP client cannot be built.
    pub fn new(config: AppConfig) -> Result<Self, BackendError> {
        let factory = Arc::new(StompFactory {
            url: config.broker_url.clone(),
            reconnect_delay: config.chat_reconnect_delay,
        });
        Self::with_transports(config, factory)
    }

    /// State with a caller-supplied transport factory.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend HTTP client cannot be built.
    pub fn with_transports(config: AppConfig, factory: Arc<dyn TransportFactory>) -> Result<Self, BackendError> {
        let backend = Arc::new(BackendClient::new(&config.backend_url, config.backend_timeouts)?);
        let chat = ChatHub::new(factory, backend.clone(), ChatTopics::default());
        Ok(Self { config: Arc::new(config), backend, chat })
    }
}

#[cfg(test)]
#[path = "state_test_helpers.rs"]
pub mod test_helpers;
