//! Authentication module for managing sessions and credentials.
//!
//! This module provides:
//! - `CredentialStore`: the injected key/value backing for the session
//!   (in-memory, JSON file, or OS keychain via keyring)
//! - `SessionController`: login, logout and background token renewal
//! - `AuthEvent`: what the UI shell listens to, including `LoginRequired`
//!
//! Access tokens are renewed every four minutes by default.

pub mod credentials;
pub mod events;
mod refresh;
mod renewal;
pub mod session;

pub use credentials::{
    CredentialKey, CredentialStore, FileCredentialStore, KeyringCredentialStore,
    MemoryCredentialStore,
};
pub use events::{AuthEvent, LoginRequiredReason};
pub use session::{AuthSettings, Session, SessionController, SessionState};

pub(crate) use session::SessionCore;
