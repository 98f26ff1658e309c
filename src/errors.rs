//! Typed error hierarchy for the build supervisor.
//!
//! Only two error families surface to callers as actionable failures:
//! `LaunchError` (the child never existed) and a non-zero exit reported
//! through `BuildOutcome`. Transport failures mid-stream are folded into
//! end-of-stream by the readers, and termination failures are logged and
//! swallowed by the cancellation controller.

use thiserror::Error;

/// Errors raised while trying to start the compiler child process.
///
/// Fatal: when one of these is returned, no child exists and no active
/// reference has been registered.
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("a build is already running (child pid {pid})")]
    BuildInProgress { pid: u32 },

    #[error("failed to spawn {program}: {source}")]
    SpawnFailed {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("pseudoterminal transport failed: {0}")]
    Pty(String),
}

/// Errors raised while terminating an active child.
///
/// These never propagate past the cancellation controller: they are logged
/// and the active-child reference is cleared regardless.
#[derive(Debug, Error)]
pub enum TerminationError {
    #[error("failed to terminate pty child {pid}: {reason}")]
    Pty { pid: u32, reason: String },

    #[error("failed to signal process group {pgid}: {reason}")]
    ProcessGroup { pgid: i32, reason: String },

    #[error("failed to kill child {pid}: {source}")]
    Kill {
        pid: u32,
        #[source]
        source: std::io::Error,
    },
}
