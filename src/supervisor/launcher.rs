//! Child process launcher: transport selection, spawn, and registration.

use super::child::ChildHandle;
use super::pipe::PipeChild;
use super::pty::PtyChild;
use super::session::BuildSession;
use crate::errors::LaunchError;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

/// Which transport to put between us and the child.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Transport {
    /// Try the pseudoterminal, fall back to plain pipes if the platform or
    /// backend cannot provide one.
    #[default]
    Auto,
    Pty,
    Pipe,
}

impl std::str::FromStr for Transport {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Transport::Auto),
            "pty" => Ok(Transport::Pty),
            "pipe" => Ok(Transport::Pipe),
            other => Err(format!("unknown transport '{other}' (expected auto, pty or pipe)")),
        }
    }
}

/// Everything needed to start the compiler child: produced by the
/// command-builder collaborator, consumed here.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub env: Vec<(String, String)>,
    pub transport: Transport,
}

/// Spawn the child on the requested transport and register it as the
/// session's active child.
///
/// Fails with [`LaunchError`] when the executable cannot be spawned or a
/// live build is already registered; in both cases no partial state is
/// left behind.
pub async fn launch(
    spec: &LaunchSpec,
    session: &BuildSession,
) -> Result<Arc<dyn ChildHandle>, LaunchError> {
    // Reject a concurrent build before paying for a spawn.
    if let Some(existing) = session.active()
        && existing.is_alive()
    {
        return Err(LaunchError::BuildInProgress {
            pid: existing.id(),
        });
    }

    let child: Arc<dyn ChildHandle> = match spec.transport {
        Transport::Pipe => Arc::new(PipeChild::spawn(spec)?),
        Transport::Pty => Arc::new(PtyChild::spawn(spec)?),
        Transport::Auto => match PtyChild::spawn(spec) {
            Ok(child) => Arc::new(child),
            Err(LaunchError::Pty(reason)) => {
                warn!(%reason, "pseudoterminal unavailable, falling back to pipe transport");
                Arc::new(PipeChild::spawn(spec)?)
            }
            Err(other) => return Err(other),
        },
    };
    debug!(pid = child.id(), transport = ?spec.transport, "child spawned");

    if let Err(err) = session.register(child.clone()) {
        // Lost the race against another launcher: do not leave an orphan.
        if let Err(kill_err) = child.terminate(true).await {
            warn!(error = %kill_err, "failed to clean up child after registration conflict");
        }
        return Err(err);
    }
    Ok(child)
}
