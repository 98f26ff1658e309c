//! Cooperative build cancellation.
//!
//! One controller per session; it is the only component besides the result
//! collector that clears the active-child reference. Wire it to whatever
//! requests termination: the process-wide interrupt signal, a GUI cancel
//! button, or a supervising service.

use super::session::BuildSession;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct CancellationController {
    session: Arc<BuildSession>,
}

impl CancellationController {
    pub fn new(session: Arc<BuildSession>) -> Self {
        Self { session }
    }

    /// Terminate the active build, if any.
    ///
    /// The active-child reference is cleared before the kill is attempted,
    /// so it is gone even when signaling fails; termination errors are
    /// logged and swallowed, never re-raised. The session is marked
    /// cancelled either way so the result collector reports a distinct
    /// "cancelled" outcome.
    pub async fn cancel(&self) {
        self.session.mark_cancelled();
        let Some(child) = self.session.take() else {
            debug!("cancel requested with no active child");
            return;
        };
        info!(pid = child.id(), "terminating active build");
        if let Err(err) = child.terminate(true).await {
            warn!(error = %err, "termination failed; child may already be gone");
        }
    }
}
