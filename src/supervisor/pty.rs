//! Pseudoterminal transport.
//!
//! The compiler detects an interactive terminal and switches to
//! carriage-return progress redraws, which are far easier to turn into a
//! live progress bar than its batched plain output. A dedicated blocking
//! reader thread pulls bounded chunks off the PTY master and forwards them
//! to the delivery queue; every exit path pushes the end-of-stream
//! sentinel so the consumer can never block forever.

use super::child::{ChildHandle, ReadOutcome, ReaderEvent};
use super::launcher::LaunchSpec;
use crate::errors::{LaunchError, TerminationError};
use async_trait::async_trait;
use portable_pty::{CommandBuilder, MasterPty, PtySize, native_pty_system};
use std::io::Read;
use std::sync::Mutex as StdMutex;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tracing::debug;

const READ_CHUNK_SIZE: usize = 4096;
const QUEUE_DEPTH: usize = 256;

pub struct PtyChild {
    events: Mutex<mpsc::Receiver<ReaderEvent>>,
    child: StdMutex<Box<dyn portable_pty::Child + Send>>,
    exit_code: StdMutex<Option<i32>>,
    pid: u32,
    // Keeps the master side open for the lifetime of the child; dropping it
    // early would EOF the reader while the compiler is still running.
    _master: StdMutex<Box<dyn MasterPty + Send>>,
}

impl PtyChild {
    pub fn spawn(spec: &LaunchSpec) -> Result<Self, LaunchError> {
        let pty_system = native_pty_system();
        let pair = pty_system
            .openpty(PtySize {
                rows: 24,
                cols: 120,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| LaunchError::Pty(e.to_string()))?;

        let mut cmd = CommandBuilder::new(&spec.program);
        cmd.args(&spec.args);
        cmd.cwd(&spec.cwd);
        for (key, value) in &spec.env {
            cmd.env(key, value);
        }
        cmd.env("TERM", "xterm-256color");

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| LaunchError::Pty(format!("spawn {}: {e}", spec.program)))?;
        // The slave end belongs to the child now; holding it open here would
        // mask the child's EOF.
        drop(pair.slave);

        let pid = child.process_id().unwrap_or(0);
        let reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| LaunchError::Pty(e.to_string()))?;

        let (tx, rx) = mpsc::channel(QUEUE_DEPTH);
        std::thread::spawn(move || run_reader(reader, tx));

        Ok(Self {
            events: Mutex::new(rx),
            child: StdMutex::new(child),
            exit_code: StdMutex::new(None),
            pid,
            _master: StdMutex::new(pair.master),
        })
    }

    /// Poll the OS for an exit status, caching it so repeated liveness
    /// checks keep working after the child has been reaped.
    fn poll_exit(&self) -> Option<i32> {
        if let Ok(code) = self.exit_code.lock()
            && code.is_some()
        {
            return *code;
        }
        let status = match self.child.lock() {
            Ok(mut child) => child.try_wait().ok().flatten(),
            Err(_) => None,
        };
        if let Some(status) = status {
            let code = status.exit_code() as i32;
            if let Ok(mut slot) = self.exit_code.lock() {
                *slot = Some(code);
            }
            return Some(code);
        }
        None
    }
}

/// Bounded-read loop on the PTY master.
///
/// Runs on its own thread because the master reader is blocking. Converts
/// every error into stream termination; the `Eof` sentinel is sent
/// unconditionally at the end.
fn run_reader(mut reader: Box<dyn Read + Send>, tx: mpsc::Sender<ReaderEvent>) {
    let mut buf = [0u8; READ_CHUNK_SIZE];
    loop {
        match reader.read(&mut buf) {
            Ok(0) => {
                debug!("pty reader: eof");
                break;
            }
            Ok(n) => {
                if tx.blocking_send(ReaderEvent::Chunk(buf[..n].to_vec())).is_err() {
                    break;
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(10));
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => {
                // EIO on the master is the normal "child closed the slave"
                // signal; anything else is equally final for our purposes.
                debug!(error = %e, "pty reader: read failed, treating as end of stream");
                break;
            }
        }
    }
    let _ = tx.blocking_send(ReaderEvent::Eof);
}

#[async_trait]
impl ChildHandle for PtyChild {
    async fn read_chunk(&self, timeout: Duration) -> ReadOutcome {
        let mut events = self.events.lock().await;
        match tokio::time::timeout(timeout, events.recv()).await {
            Err(_) => ReadOutcome::Idle,
            Ok(Some(ReaderEvent::Chunk(bytes))) => ReadOutcome::Chunk(bytes),
            Ok(Some(ReaderEvent::Eof)) | Ok(None) => ReadOutcome::Eof,
        }
    }

    fn is_alive(&self) -> bool {
        self.poll_exit().is_none()
    }

    async fn terminate(&self, force: bool) -> Result<(), TerminationError> {
        #[cfg(unix)]
        if !force {
            use nix::sys::signal::{Signal, kill};
            use nix::unistd::Pid;
            return match kill(Pid::from_raw(self.pid as i32), Signal::SIGTERM) {
                Ok(()) | Err(nix::errno::Errno::ESRCH) => Ok(()),
                Err(e) => Err(TerminationError::Pty {
                    pid: self.pid,
                    reason: e.to_string(),
                }),
            };
        }

        let mut killer = match self.child.lock() {
            Ok(child) => child.clone_killer(),
            Err(_) => {
                return Err(TerminationError::Pty {
                    pid: self.pid,
                    reason: "child handle poisoned".to_string(),
                });
            }
        };
        killer.kill().map_err(|source| TerminationError::Kill {
            pid: self.pid,
            source,
        })
    }

    async fn wait(&self, timeout: Duration) -> Option<i32> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(code) = self.poll_exit() {
                return Some(code);
            }
            if tokio::time::Instant::now() >= deadline {
                return None;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    fn id(&self) -> u32 {
        self.pid
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::Arc;

    fn spec(program: &str, args: &[&str]) -> LaunchSpec {
        LaunchSpec {
            program: program.to_string(),
            args: args.iter().map(|s| s.to_string()).collect(),
            cwd: PathBuf::from("/tmp"),
            env: Vec::new(),
            transport: super::super::launcher::Transport::Pty,
        }
    }

    async fn drain(child: &dyn ChildHandle) -> Vec<u8> {
        let mut output = Vec::new();
        loop {
            match child.read_chunk(Duration::from_millis(200)).await {
                ReadOutcome::Chunk(bytes) => output.extend_from_slice(&bytes),
                ReadOutcome::Idle => {
                    if !child.is_alive() {
                        break;
                    }
                }
                ReadOutcome::Eof => break,
            }
        }
        output
    }

    #[tokio::test]
    async fn spawn_echo_and_read_until_eof() {
        let child = PtyChild::spawn(&spec("echo", &["hello supervisor"])).expect("spawn");
        let output = drain(&child).await;
        let text = String::from_utf8_lossy(&output);
        assert!(text.contains("hello supervisor"), "output: {text:?}");
        assert_eq!(child.wait(Duration::from_secs(5)).await, Some(0));
    }

    #[tokio::test]
    async fn terminate_kills_a_long_running_child() {
        let child = Arc::new(PtyChild::spawn(&spec("sleep", &["30"])).expect("spawn"));
        assert!(child.is_alive());
        child.terminate(true).await.expect("terminate");
        let code = child.wait(Duration::from_secs(5)).await;
        assert!(code.is_some(), "child should exit after kill");
        assert!(!child.is_alive());
    }
}
