//! OncoVision core - authenticated API client, session management and models.
//!
//! The pieces fit together like this:
//!
//! ```no_run
//! use std::sync::Arc;
//! use oncovision_core::api::OncoVisionApi;
//! use oncovision_core::auth::{AuthSettings, MemoryCredentialStore, SessionController};
//! use oncovision_core::models::PatientQuery;
//!
//! # async fn example() -> Result<(), oncovision_core::api::ApiError> {
//! let settings = AuthSettings::new("http://127.0.0.1:8080")?;
//! let session = SessionController::new(settings, Arc::new(MemoryCredentialStore::new()))?;
//! session.login("alice", "secret").await?;
//!
//! let api = OncoVisionApi::new(session.client());
//! let patients = api.list_patients(&PatientQuery::default()).await?;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod auth;
pub mod config;
pub mod models;

pub use api::{ApiError, AuthClient, OncoVisionApi};
pub use auth::{AuthEvent, CredentialStore, SessionController, SessionState};
pub use config::Config;
