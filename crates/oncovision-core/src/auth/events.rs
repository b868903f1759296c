//! Session events published to the UI shell.
//!
//! The shell decides what "go to the login page" means; the data layer only
//! announces that a login is required.

use tokio::sync::broadcast;
use tracing::debug;

/// Buffer size for the event channel.
/// Events are rare (login, logout, renewals every few minutes).
const EVENT_BUFFER_SIZE: usize = 32;

/// Why the session had to be torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginRequiredReason {
    /// A 401 arrived and the refresh token was rejected or unreachable.
    SessionExpired,
    /// A 401 arrived and there was no refresh token to try.
    NoSession,
    /// The background renewal failed.
    RenewalFailed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    LoggedIn { username: String },
    TokenRenewed,
    LoggedOut,
    LoginRequired { reason: LoginRequiredReason },
}

#[derive(Debug, Clone)]
pub(crate) struct EventBus {
    tx: broadcast::Sender<AuthEvent>,
}

impl EventBus {
    pub(crate) fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_BUFFER_SIZE);
        Self { tx }
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.tx.subscribe()
    }

    pub(crate) fn publish(&self, event: AuthEvent) {
        // No subscribers is not an error
        if self.tx.send(event.clone()).is_err() {
            debug!(?event, "Auth event dropped - no subscribers");
        }
    }
}
