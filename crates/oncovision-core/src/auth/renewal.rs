use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::session::SessionCore;

/// Periodic access-token renewal for an authenticated session.
///
/// The task holds only a weak reference to the session, so it never keeps
/// a dropped controller alive. Dropping the loop aborts the task.
pub(crate) struct RenewalLoop {
    handle: JoinHandle<()>,
}

impl RenewalLoop {
    pub(crate) fn start(core: &Arc<SessionCore>, period: Duration) -> Self {
        let weak = Arc::downgrade(core);
        let handle = tokio::spawn(run(weak, period));
        debug!(period_secs = period.as_secs_f64(), "Renewal loop started");
        Self { handle }
    }

    pub(crate) fn stop(self) {
        // Drop aborts the task
        debug!("Renewal loop stopped");
    }

    pub(crate) fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }
}

impl Drop for RenewalLoop {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn run(core: Weak<SessionCore>, period: Duration) {
    // First tick one full period after login, not immediately
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        let Some(core) = core.upgrade() else {
            debug!("Session dropped, renewal loop exiting");
            return;
        };
        if !core.state().is_authenticated() {
            return;
        }

        match core.renew().await {
            Ok(()) => info!("Access token renewed"),
            Err(e) => {
                warn!(error = %e, "Background token renewal failed");
                return;
            }
        }
    }
}
