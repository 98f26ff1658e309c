//! Build-process supervision.
//!
//! Wires the transports, the stream normalizer, the progress engine, the
//! heartbeat, and the result collector into one consumer loop. Output is
//! delivered to the sinks in exact chunk-arrival order, and every line is
//! classified before it is echoed.

mod cancel;
mod child;
mod heartbeat;
mod launcher;
mod pipe;
mod pty;
mod session;

pub use cancel::CancellationController;
pub use child::{ChildHandle, ReadOutcome};
pub use heartbeat::{HEARTBEAT_AFTER, Heartbeat};
pub use launcher::{LaunchSpec, Transport, launch};
pub use pipe::PipeChild;
pub use pty::PtyChild;
pub use session::BuildSession;

use crate::progress::{ProgressEngine, ProgressUpdate};
use crate::stream::{DisplayEvent, Normalizer};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// How often the delivery queue is polled; heartbeat and liveness checks
/// run between polls.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Bounded wait for the exit code after end-of-stream.
const EXIT_CODE_WAIT: Duration = Duration::from_secs(10);

/// Receives normalized text for display.
///
/// In a GUI host, implementations typically forward these over a
/// thread-safe event channel and let the UI thread drain it; the supervisor
/// itself never touches UI state.
pub trait DisplaySink: Send {
    /// A completed output line.
    fn line(&mut self, text: &str);
    /// The current state of the unterminated last line; replaces the
    /// previous partial state in place.
    fn partial(&mut self, text: &str);
}

/// Receives progress updates and the idle heartbeat.
pub trait ProgressSink: Send {
    fn overall(&mut self, percent: u8, message: &str);
    fn task(&mut self, percent: u8, message: &str);
    /// Idle indicator frame; distinct from the percentage channels.
    fn heartbeat(&mut self, frame: char);
    fn heartbeat_clear(&mut self);
}

/// Terminal state of one supervised build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildOutcome {
    Success,
    Failed { exit_code: i32 },
    Cancelled,
}

impl BuildOutcome {
    pub fn success(&self) -> bool {
        matches!(self, BuildOutcome::Success)
    }

    /// Process exit code to report for this outcome.
    pub fn exit_code(&self) -> i32 {
        match self {
            BuildOutcome::Success => 0,
            BuildOutcome::Failed { exit_code } => {
                if *exit_code == 0 { 1 } else { *exit_code }
            }
            // Conventional "terminated by interrupt" code.
            BuildOutcome::Cancelled => 130,
        }
    }
}

impl std::fmt::Display for BuildOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BuildOutcome::Success => write!(f, "succeeded"),
            BuildOutcome::Failed { exit_code } => write!(f, "failed with exit code {exit_code}"),
            BuildOutcome::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Drive one child to completion.
///
/// Consumes the delivery queue until end-of-stream, feeding the normalizer,
/// the progress engine, and the sinks; then collects the exit code and
/// clears the session's active reference. Always reaches a definite
/// terminal state: a hung child is force-terminated after the bounded
/// exit-code wait.
pub async fn supervise(
    child: Arc<dyn ChildHandle>,
    session: &BuildSession,
    display: &mut dyn DisplaySink,
    progress: &mut dyn ProgressSink,
) -> BuildOutcome {
    let mut normalizer = Normalizer::new();
    let mut engine = ProgressEngine::new(Instant::now());
    let mut heartbeat = Heartbeat::new();

    let snapshot = engine.snapshot().clone();
    progress.overall(snapshot.overall_percent, &snapshot.overall_message);
    progress.task(snapshot.task_percent, &snapshot.task_message);

    let mut last_output = tokio::time::Instant::now();
    loop {
        match child.read_chunk(POLL_INTERVAL).await {
            ReadOutcome::Chunk(bytes) => {
                if heartbeat.is_visible() {
                    progress.heartbeat_clear();
                    heartbeat.reset();
                }
                last_output = tokio::time::Instant::now();

                let normalized = normalizer.feed(&bytes);
                let now = Instant::now();
                for update in &normalized.protocol {
                    emit(progress, engine.apply_protocol(update, now));
                }
                for line in &normalized.lines {
                    emit(progress, engine.observe_line(line, now));
                }
                for event in &normalized.display {
                    match event {
                        DisplayEvent::Line(text) => display.line(text),
                        DisplayEvent::Partial(text) => display.partial(text),
                    }
                }
            }
            ReadOutcome::Idle => {
                if !child.is_alive() {
                    debug!("child exited and queue drained");
                    break;
                }
                if last_output.elapsed() > HEARTBEAT_AFTER {
                    progress.heartbeat(heartbeat.next_frame());
                }
            }
            ReadOutcome::Eof => {
                debug!("end of stream");
                break;
            }
        }
    }
    if heartbeat.is_visible() {
        progress.heartbeat_clear();
        heartbeat.reset();
    }

    let exit_code = collect_exit_code(child.as_ref()).await;
    session.clear();

    if session.is_cancelled() {
        BuildOutcome::Cancelled
    } else if exit_code == 0 {
        BuildOutcome::Success
    } else {
        BuildOutcome::Failed { exit_code }
    }
}

/// Obtain the exit code with a bounded wait, force-terminating a child
/// that fails to report one in time.
async fn collect_exit_code(child: &dyn ChildHandle) -> i32 {
    match child.wait(EXIT_CODE_WAIT).await {
        Some(code) => code,
        None => {
            warn!("child did not report an exit status in time; forcing termination");
            if let Err(err) = child.terminate(true).await {
                warn!(error = %err, "forced termination failed");
            }
            child.wait(Duration::from_secs(1)).await.unwrap_or(1)
        }
    }
}

fn emit(progress: &mut dyn ProgressSink, updates: Vec<ProgressUpdate>) {
    for update in updates {
        match update {
            ProgressUpdate::Overall { percent, message } => progress.overall(percent, &message),
            ProgressUpdate::Task { percent, message } => progress.task(percent, &message),
        }
    }
}
