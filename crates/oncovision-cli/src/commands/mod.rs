//! CLI command handlers.

pub mod auth;
pub mod cases;
pub mod patients;

use anyhow::{bail, Result};
use oncovision_core::api::OncoVisionApi;
use oncovision_core::auth::{AuthEvent, LoginRequiredReason};
use oncovision_core::{Config, SessionController};
use serde::Serialize;
use tokio::sync::broadcast;

/// What every "go to login" ends up telling the user.
pub const LOGIN_HINT: &str = "Run `oncovision login` to sign in.";

/// Shared context for all commands.
pub struct Context {
    pub config: Config,
    pub session: SessionController,
    pub api: OncoVisionApi,
    /// Output as JSON for scripting.
    pub json_output: bool,
}

impl Context {
    /// Fail early instead of sending an anonymous request the API will refuse.
    pub fn require_session(&self) -> Result<()> {
        if !self.session.is_authenticated() {
            bail!("Not signed in. {}", LOGIN_HINT);
        }
        Ok(())
    }

    /// Print `value` as pretty JSON when `--json` was given. Returns whether
    /// it did, so callers fall back to their table output otherwise.
    pub fn print_json<T: Serialize + ?Sized>(&self, value: &T) -> Result<bool> {
        if !self.json_output {
            return Ok(false);
        }
        println!("{}", serde_json::to_string_pretty(value)?);
        Ok(true)
    }
}

/// The reason of the last `LoginRequired` published so far, if any.
pub fn login_required(events: &mut broadcast::Receiver<AuthEvent>) -> Option<LoginRequiredReason> {
    let mut reason = None;
    loop {
        match events.try_recv() {
            Ok(AuthEvent::LoginRequired { reason: r }) => reason = Some(r),
            Ok(_) | Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
            Err(_) => return reason,
        }
    }
}

pub fn login_required_message(reason: LoginRequiredReason) -> String {
    let why = match reason {
        LoginRequiredReason::SessionExpired => "Your session has expired.",
        LoginRequiredReason::NoSession => "You are not signed in.",
        LoginRequiredReason::RenewalFailed => "The session could not be renewed.",
    };
    format!("{} {}", why, LOGIN_HINT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_required_keeps_last_reason() {
        let (tx, mut rx) = broadcast::channel(8);
        tx.send(AuthEvent::TokenRenewed).expect("send");
        tx.send(AuthEvent::LoginRequired { reason: LoginRequiredReason::SessionExpired })
            .expect("send");
        tx.send(AuthEvent::LoggedOut).expect("send");
        assert_eq!(login_required(&mut rx), Some(LoginRequiredReason::SessionExpired));
        assert_eq!(login_required(&mut rx), None);
    }

    #[test]
    fn test_message_points_to_login() {
        let msg = login_required_message(LoginRequiredReason::RenewalFailed);
        assert!(msg.starts_with("The session could not be renewed."));
        assert!(msg.ends_with(LOGIN_HINT));
    }
}
