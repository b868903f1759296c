//! Shared fixtures for the wiremock-backed tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use oncovision_core::auth::{
    AuthEvent, AuthSettings, CredentialKey, CredentialStore, MemoryCredentialStore,
    SessionController,
};
use tokio::sync::broadcast;
use wiremock::MockServer;

/// Long enough that the renewal loop never fires during a request test
pub const QUIET_RENEWAL: Duration = Duration::from_secs(3600);

pub fn settings(server: &MockServer) -> AuthSettings {
    AuthSettings::new(&server.uri())
        .expect("mock server uri")
        .with_renewal_interval(QUIET_RENEWAL)
        .with_request_timeout(Duration::from_millis(500))
}

pub fn controller(settings: AuthSettings, store: &Arc<MemoryCredentialStore>) -> SessionController {
    let store: Arc<dyn CredentialStore> = store.clone();
    SessionController::new(settings, store).expect("controller")
}

/// A store holding a complete logged-in session.
pub fn logged_in_store(access: &str, refresh: Option<&str>) -> Arc<MemoryCredentialStore> {
    let store = Arc::new(MemoryCredentialStore::new());
    store.set(CredentialKey::AccessToken, access);
    if let Some(refresh) = refresh {
        store.set(CredentialKey::RefreshToken, refresh);
    }
    store.set(CredentialKey::Username, "alice");
    store
}

pub fn assert_store_empty(store: &MemoryCredentialStore) {
    for key in CredentialKey::ALL {
        assert!(store.get(key).is_none(), "{} should be cleared", key);
    }
}

/// Everything published so far, without waiting.
pub fn drain(rx: &mut broadcast::Receiver<AuthEvent>) -> Vec<AuthEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
