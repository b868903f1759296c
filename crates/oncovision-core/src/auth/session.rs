use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::Client;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use url::Url;

use super::credentials::{CredentialKey, CredentialStore};
use super::events::{AuthEvent, EventBus, LoginRequiredReason};
use super::renewal::RenewalLoop;
use crate::api::tokens::{TokenApi, TokenPair};
use crate::api::{ApiError, AuthClient};

/// Default renewal period. Access tokens are presumed to live five minutes,
/// so renew one minute early.
pub const DEFAULT_RENEWAL_INTERVAL: Duration = Duration::from_secs(4 * 60);

/// Default HTTP request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Everything the controller needs to reach the API.
#[derive(Debug, Clone)]
pub struct AuthSettings {
    /// Base URL of the API; token endpoints live under `api/token/`.
    pub base_url: Url,
    pub renewal_interval: Duration,
    pub request_timeout: Duration,
}

impl AuthSettings {
    pub fn new(base_url: &str) -> Result<Self, ApiError> {
        let mut base_url = Url::parse(base_url)?;
        // Url::join drops the last segment unless the path ends with '/'
        if !base_url.path().ends_with('/') {
            base_url.set_path(&format!("{}/", base_url.path()));
        }
        Ok(Self {
            base_url,
            renewal_interval: DEFAULT_RENEWAL_INTERVAL,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        })
    }

    pub fn with_renewal_interval(mut self, interval: Duration) -> Self {
        self.renewal_interval = interval;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// Snapshot of the three persisted session fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub username: Option<String>,
}

impl Session {
    pub fn load(store: &dyn CredentialStore) -> Self {
        Self {
            access_token: store.get(CredentialKey::AccessToken),
            refresh_token: store.get(CredentialKey::RefreshToken),
            username: store.get(CredentialKey::Username),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.access_token.is_some() && self.username.is_some()
    }

    pub fn is_anonymous(&self) -> bool {
        self.access_token.is_none() && self.refresh_token.is_none() && self.username.is_none()
    }

    /// Access token and username travel together; a missing refresh token
    /// next to an access token means storage was partially cleared.
    pub fn is_consistent(&self) -> bool {
        match (&self.access_token, &self.username) {
            (Some(_), Some(_)) => self.refresh_token.is_some(),
            (None, None) => self.refresh_token.is_none(),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Anonymous,
    Authenticated { username: String },
}

impl SessionState {
    /// Decide the state from what the store holds right now.
    fn probe(store: &dyn CredentialStore) -> Self {
        match (
            store.get(CredentialKey::AccessToken),
            store.get(CredentialKey::Username),
        ) {
            (Some(_), Some(username)) => SessionState::Authenticated { username },
            _ => SessionState::Anonymous,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, SessionState::Authenticated { .. })
    }
}

#[derive(Debug)]
struct Tracked {
    state: SessionState,
    logged_in_at: Option<DateTime<Utc>>,
    renewed_at: Option<DateTime<Utc>>,
}

/// State shared by the controller, its renewal loop and every `AuthClient`.
pub(crate) struct SessionCore {
    pub(crate) store: Arc<dyn CredentialStore>,
    pub(crate) tokens: TokenApi,
    pub(crate) http: Client,
    pub(crate) base_url: Url,
    pub(crate) events: EventBus,
    tracked: Mutex<Tracked>,
    renewal: Mutex<Option<RenewalLoop>>,
    renewal_interval: Duration,
    /// Held for the duration of any refresh so only one is in flight.
    pub(crate) refresh_lock: tokio::sync::Mutex<()>,
    /// Bumped whenever a session begins or ends. A refresh that sees a
    /// different value on completion belongs to a dead session.
    epoch: AtomicU64,
}

impl SessionCore {
    fn tracked(&self) -> MutexGuard<'_, Tracked> {
        self.tracked.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    pub(crate) fn state(&self) -> SessionState {
        self.tracked().state.clone()
    }

    fn begin_session(&self, username: &str, pair: &TokenPair) {
        {
            let mut tracked = self.tracked();
            self.epoch.fetch_add(1, Ordering::SeqCst);
            self.store.set(CredentialKey::AccessToken, &pair.access);
            self.store.set(CredentialKey::RefreshToken, &pair.refresh);
            self.store.set(CredentialKey::Username, username);
            tracked.state = SessionState::Authenticated {
                username: username.to_string(),
            };
            tracked.logged_in_at = Some(Utc::now());
            tracked.renewed_at = None;
        }
        self.events.publish(AuthEvent::LoggedIn {
            username: username.to_string(),
        });
    }

    /// Write a refreshed access token unless the session it belongs to has
    /// ended in the meantime. Returns whether the token was stored.
    pub(crate) fn commit_access_token(&self, epoch: u64, access: &str) -> bool {
        let mut tracked = self.tracked();
        if self.epoch() != epoch {
            debug!("Session ended during refresh, discarding new access token");
            return false;
        }
        self.store.set(CredentialKey::AccessToken, access);
        tracked.renewed_at = Some(Utc::now());
        true
    }

    /// Tear the session down: clear the store, stop renewal, tell the shell.
    /// `reason` is `None` for a user-initiated logout.
    pub(crate) fn end_session(&self, reason: Option<LoginRequiredReason>) {
        {
            let mut tracked = self.tracked();
            self.epoch.fetch_add(1, Ordering::SeqCst);
            self.store.clear_all();
            tracked.state = SessionState::Anonymous;
            tracked.logged_in_at = None;
            tracked.renewed_at = None;
        }
        self.stop_renewal();

        match reason {
            None => {
                info!("Logged out");
                self.events.publish(AuthEvent::LoggedOut);
            }
            Some(reason) => {
                warn!(?reason, "Session ended, login required");
                self.events.publish(AuthEvent::LoginRequired { reason });
            }
        }
    }

    fn start_renewal(self: &Arc<Self>) {
        let renewal = RenewalLoop::start(self, self.renewal_interval);
        let previous = self
            .renewal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(renewal);
        if let Some(previous) = previous {
            previous.stop();
        }
    }

    fn stop_renewal(&self) {
        let renewal = self
            .renewal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(renewal) = renewal {
            renewal.stop();
        }
    }

    fn renewal_active(&self) -> bool {
        self.renewal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(RenewalLoop::is_running)
            .unwrap_or(false)
    }
}

/// Owns login/logout and the background renewal loop.
///
/// Must be created inside a tokio runtime: a session restored from the
/// store starts its renewal loop immediately.
pub struct SessionController {
    core: Arc<SessionCore>,
}

impl SessionController {
    pub fn new(settings: AuthSettings, store: Arc<dyn CredentialStore>) -> Result<Self, ApiError> {
        let http = Client::builder().timeout(settings.request_timeout).build()?;
        let tokens = TokenApi::new(http.clone(), &settings.base_url)?;

        let state = SessionState::probe(store.as_ref());
        debug!(backend = store.name(), ?state, "Session restored from store");

        let core = Arc::new(SessionCore {
            store,
            tokens,
            http,
            base_url: settings.base_url,
            events: EventBus::new(),
            tracked: Mutex::new(Tracked {
                state,
                logged_in_at: None,
                renewed_at: None,
            }),
            renewal: Mutex::new(None),
            renewal_interval: settings.renewal_interval,
            refresh_lock: tokio::sync::Mutex::new(()),
            epoch: AtomicU64::new(0),
        });

        if core.state().is_authenticated() {
            core.start_renewal();
        }

        Ok(Self { core })
    }

    /// A request client bound to this session.
    pub fn client(&self) -> AuthClient {
        AuthClient::new(Arc::clone(&self.core))
    }

    /// Exchange credentials for tokens. On failure nothing is stored and
    /// the controller stays where it was.
    pub async fn login(&self, username: &str, password: &str) -> Result<(), ApiError> {
        match self.core.tokens.obtain_pair(username, password).await {
            Ok(pair) => {
                self.core.begin_session(username, &pair);
                self.core.start_renewal();
                info!(username, "Login successful");
                Ok(())
            }
            Err(e) => {
                warn!(username, error = %e, "Login failed");
                Err(e)
            }
        }
    }

    /// Discard the local session. No server call is made.
    pub fn logout(&self) {
        self.core.end_session(None);
    }

    /// Run one renewal tick now.
    pub async fn renew_now(&self) -> Result<(), ApiError> {
        self.core.renew().await
    }

    pub fn state(&self) -> SessionState {
        self.core.state()
    }

    pub fn is_authenticated(&self) -> bool {
        self.core.state().is_authenticated()
    }

    pub fn username(&self) -> Option<String> {
        match self.core.state() {
            SessionState::Authenticated { username } => Some(username),
            SessionState::Anonymous => None,
        }
    }

    /// The persisted fields as they are right now.
    pub fn session(&self) -> Session {
        Session::load(self.core.store.as_ref())
    }

    pub fn logged_in_at(&self) -> Option<DateTime<Utc>> {
        self.core.tracked().logged_in_at
    }

    pub fn last_renewal(&self) -> Option<DateTime<Utc>> {
        self.core.tracked().renewed_at
    }

    pub fn renewal_active(&self) -> bool {
        self.core.renewal_active()
    }

    pub fn renewal_interval(&self) -> Duration {
        self.core.renewal_interval
    }

    pub fn store_backend(&self) -> &'static str {
        self.core.store.name()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.core.events.subscribe()
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.core.stop_renewal();
    }
}
