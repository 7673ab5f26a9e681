use super::*;
use std::sync::Mutex;
use std::time::Duration;

use crate::chat::session::ChatIdentity;
use crate::chat::test_helpers::FakeTransport;
use crate::chat::transport::Transport;
use crate::config::{BackendTimeouts, DEFAULT_BOOKING_HOLD_SECS};

/// Config pointing at `backend_url`, with short timeouts for tests.
#[must_use]
pub fn test_config(backend_url: &str) -> AppConfig {
    AppConfig {
        port: 0,
        backend_url: backend_url.trim_end_matches('/').to_owned(),
        broker_url: "ws://127.0.0.1:1/ws".into(),
        public_url: None,
        cookie_secure: false,
        backend_timeouts: BackendTimeouts { request_secs: 5, connect_secs: 1 },
        chat_reconnect_delay: Duration::from_millis(10),
        booking_hold: Duration::from_secs(DEFAULT_BOOKING_HOLD_SECS),
        google_authorize_url: Some("https://backend.test/oauth2/authorize/google".into()),
    }
}

/// Hands out in-memory transports and remembers them per user.
#[derive(Default)]
pub struct FakeFactory {
    pub opened: Mutex<Vec<(String, Arc<FakeTransport>)>>,
}

impl FakeFactory {
    #[must_use]
    pub fn transport_for(&self, user_id: &str) -> Option<Arc<FakeTransport>> {
        self.opened
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(user, _)| user == user_id)
            .map(|(_, t)| Arc::clone(t))
    }
}

impl TransportFactory for FakeFactory {
    fn open(&self, identity: &ChatIdentity) -> Arc<dyn Transport> {
        let transport = FakeTransport::new();
        self.opened
            .lock()
            .unwrap()
            .push((identity.user_id.clone(), Arc::clone(&transport)));
        transport
    }
}

/// Test `AppState` backed by `backend_url` and in-memory chat transports.
#[must_use]
pub fn test_app_state(backend_url: &str) -> (AppState, Arc<FakeFactory>) {
    let factory = Arc::new(FakeFactory::default());
    let state = AppState::with_transports(test_config(backend_url), factory.clone()).unwrap();
    (state, factory)
}
