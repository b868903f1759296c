//! Single-flight access-token refresh.
//!
//! Both the background renewal and the retry-on-401 path go through
//! `refresh_lock`, so at most one refresh call is in flight per session.
//! A refresh whose session ended while it was waiting on the network does
//! not write its token back.

use tracing::{debug, warn};

use super::credentials::CredentialKey;
use super::events::{AuthEvent, LoginRequiredReason};
use super::session::SessionCore;
use crate::api::ApiError;

impl SessionCore {
    /// One background renewal tick. Any failure ends the session.
    pub(crate) async fn renew(&self) -> Result<(), ApiError> {
        let epoch = self.epoch();
        let _guard = self.refresh_lock.lock().await;
        if self.epoch() != epoch {
            return Err(ApiError::Unauthorized);
        }

        let Some(refresh_token) = self.store.get(CredentialKey::RefreshToken) else {
            warn!("No refresh token stored, cannot renew");
            self.end_session(Some(LoginRequiredReason::RenewalFailed));
            return Err(ApiError::Unauthorized);
        };

        match self.tokens.refresh(&refresh_token).await {
            Ok(access) => {
                if !self.commit_access_token(epoch, &access) {
                    return Err(ApiError::Unauthorized);
                }
                self.events.publish(AuthEvent::TokenRenewed);
                Ok(())
            }
            Err(e) => {
                if self.epoch() == epoch {
                    self.end_session(Some(LoginRequiredReason::RenewalFailed));
                }
                Err(e)
            }
        }
    }

    /// Obtain a usable access token after `rejected` drew a 401.
    ///
    /// If another caller already replaced the rejected token while this one
    /// waited for the lock, that token is returned without a network call.
    pub(crate) async fn refresh_after_rejection(
        &self,
        rejected: Option<&str>,
    ) -> Result<String, ApiError> {
        let epoch = self.epoch();
        let _guard = self.refresh_lock.lock().await;
        if self.epoch() != epoch {
            return Err(ApiError::Unauthorized);
        }

        if let Some(current) = self.store.get(CredentialKey::AccessToken) {
            if rejected != Some(current.as_str()) {
                debug!("Access token was refreshed concurrently, reusing it");
                return Ok(current);
            }
        }

        let Some(refresh_token) = self.store.get(CredentialKey::RefreshToken) else {
            self.end_session(Some(LoginRequiredReason::NoSession));
            return Err(ApiError::Unauthorized);
        };

        match self.tokens.refresh(&refresh_token).await {
            Ok(access) => {
                if self.commit_access_token(epoch, &access) {
                    self.events.publish(AuthEvent::TokenRenewed);
                    Ok(access)
                } else {
                    Err(ApiError::Unauthorized)
                }
            }
            Err(e) => {
                warn!(error = %e, "Token refresh failed");
                if self.epoch() == epoch {
                    self.end_session(Some(LoginRequiredReason::SessionExpired));
                }
                Err(ApiError::SessionExpired)
            }
        }
    }
}
