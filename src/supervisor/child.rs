//! The polymorphic child-process handle.
//!
//! Both transports (pseudoterminal and plain pipe) expose the same small
//! capability surface, so the consumer loop and the cancellation
//! controller never branch on how the child was spawned.

use crate::errors::TerminationError;
use async_trait::async_trait;
use std::time::Duration;

/// What one poll of the delivery queue produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// An ordered fragment of raw output. May split escape sequences or
    /// UTF-8 code points; the normalizer tolerates that.
    Chunk(Vec<u8>),
    /// The poll timeout elapsed without data.
    Idle,
    /// End of stream. Guaranteed to arrive on every reader exit path,
    /// including transport errors.
    Eof,
}

/// Event pushed by a transport's reader onto the delivery queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ReaderEvent {
    Chunk(Vec<u8>),
    Eof,
}

/// A running compiler child, owned by the launcher and observed by the
/// cancellation controller and result collector.
#[async_trait]
pub trait ChildHandle: Send + Sync {
    /// Pull the next chunk from the delivery queue, waiting at most
    /// `timeout`.
    async fn read_chunk(&self, timeout: Duration) -> ReadOutcome;

    /// Whether the OS process is still running.
    fn is_alive(&self) -> bool;

    /// Terminate the child. With `force`, escalates past the polite
    /// request (the transport decides what that means: PTY kill, or
    /// group SIGTERM, grace window, group SIGKILL).
    async fn terminate(&self, force: bool) -> Result<(), TerminationError>;

    /// Wait up to `timeout` for the exit code. `None` means the child had
    /// not exited in time.
    async fn wait(&self, timeout: Duration) -> Option<i32>;

    /// OS process id, for logging and diagnostics.
    fn id(&self) -> u32;
}
