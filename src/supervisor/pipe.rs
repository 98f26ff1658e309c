//! Plain-pipe transport.
//!
//! Used when a pseudoterminal is unavailable. stdout and stderr are both
//! captured and forwarded into one delivery queue; their relative
//! interleaving is whatever the OS pipe scheduling produces, which is an
//! accepted limitation of this transport. On Unix the child is made the
//! leader of its own process group so that cancellation can signal the
//! whole tree — the compiler routinely spawns C-compiler subprocesses.

use super::child::{ChildHandle, ReadOutcome, ReaderEvent};
use super::launcher::LaunchSpec;
use crate::errors::{LaunchError, TerminationError};
use async_trait::async_trait;
use std::process::Stdio;
use std::sync::Mutex as StdMutex;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::sync::{Mutex, mpsc};
use tracing::debug;

const READ_CHUNK_SIZE: usize = 4096;
const QUEUE_DEPTH: usize = 256;

/// How long a polite group SIGTERM gets before the group is SIGKILLed.
#[cfg(unix)]
const GROUP_KILL_GRACE: Duration = Duration::from_millis(500);

pub struct PipeChild {
    events: Mutex<mpsc::Receiver<ReaderEvent>>,
    child: StdMutex<tokio::process::Child>,
    exit_code: StdMutex<Option<i32>>,
    pid: u32,
}

impl PipeChild {
    pub fn spawn(spec: &LaunchSpec) -> Result<Self, LaunchError> {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .current_dir(&spec.cwd)
            .envs(spec.env.iter().cloned())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn().map_err(|source| LaunchError::SpawnFailed {
            program: spec.program.clone(),
            source,
        })?;
        let pid = child.id().unwrap_or(0);

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let (tx, rx) = mpsc::channel(QUEUE_DEPTH);

        // One forwarder per pipe; the sentinel goes out once both are done.
        let out_task = stdout.map(|r| tokio::spawn(forward(r, tx.clone())));
        let err_task = stderr.map(|r| tokio::spawn(forward(r, tx.clone())));
        tokio::spawn(async move {
            if let Some(task) = out_task {
                let _ = task.await;
            }
            if let Some(task) = err_task {
                let _ = task.await;
            }
            let _ = tx.send(ReaderEvent::Eof).await;
        });

        Ok(Self {
            events: Mutex::new(rx),
            child: StdMutex::new(child),
            exit_code: StdMutex::new(None),
            pid,
        })
    }

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
            let code = exit_code_of(status);
            if let Ok(mut slot) = self.exit_code.lock() {
                *slot = Some(code);
            }
            return Some(code);
        }
        None
    }
}

#[cfg(unix)]
fn exit_code_of(status: std::process::ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status
        .code()
        .unwrap_or_else(|| -status.signal().unwrap_or(1))
}

#[cfg(not(unix))]
fn exit_code_of(status: std::process::ExitStatus) -> i32 {
    status.code().unwrap_or(1)
}

/// Copy one pipe into the delivery queue until EOF or error; errors are
/// stream terminators here, never build failures.
async fn forward<R: AsyncReadExt + Unpin>(mut reader: R, tx: mpsc::Sender<ReaderEvent>) {
    let mut buf = [0u8; READ_CHUNK_SIZE];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                if tx.send(ReaderEvent::Chunk(buf[..n].to_vec())).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                debug!(error = %e, "pipe read failed, treating as end of stream");
                break;
            }
        }
    }
}

#[cfg(unix)]
fn signal_group(pgid: i32, signal: nix::sys::signal::Signal) -> Result<(), TerminationError> {
    use nix::sys::signal::killpg;
    use nix::unistd::Pid;
    match killpg(Pid::from_raw(pgid), signal) {
        // Whole group already gone: nothing left to stop.
        Ok(()) | Err(nix::errno::Errno::ESRCH) => Ok(()),
        Err(e) => Err(TerminationError::ProcessGroup {
            pgid,
            reason: e.to_string(),
        }),
    }
}

#[async_trait]
impl ChildHandle for PipeChild {
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

    #[cfg(unix)]
    async fn terminate(&self, force: bool) -> Result<(), TerminationError> {
        let pgid = self.pid as i32;
        signal_group(pgid, nix::sys::signal::Signal::SIGTERM)?;
        if force {
            tokio::time::sleep(GROUP_KILL_GRACE).await;
            if self.is_alive() {
                signal_group(pgid, nix::sys::signal::Signal::SIGKILL)?;
            }
        }
        Ok(())
    }

    #[cfg(not(unix))]
    async fn terminate(&self, _force: bool) -> Result<(), TerminationError> {
        let result = match self.child.lock() {
            Ok(mut child) => child.start_kill(),
            Err(_) => return Ok(()),
        };
        result.map_err(|source| TerminationError::Kill {
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
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    }

    fn id(&self) -> u32 {
        self.pid
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::supervisor::launcher::Transport;
    use std::path::PathBuf;

    fn sh(script: &str) -> LaunchSpec {
        LaunchSpec {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
            cwd: PathBuf::from("/tmp"),
            env: Vec::new(),
            transport: Transport::Pipe,
        }
    }

    async fn drain(child: &PipeChild) -> String {
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
        String::from_utf8_lossy(&output).into_owned()
    }

    #[tokio::test]
    async fn merges_stdout_and_stderr_into_one_queue() {
        let child = PipeChild::spawn(&sh("echo out; echo err 1>&2")).expect("spawn");
        let output = drain(&child).await;
        assert!(output.contains("out"));
        assert!(output.contains("err"));
        assert_eq!(child.wait(Duration::from_secs(5)).await, Some(0));
    }

    #[tokio::test]
    async fn eof_sentinel_arrives_after_exit() {
        let child = PipeChild::spawn(&sh("true")).expect("spawn");
        loop {
            match child.read_chunk(Duration::from_millis(200)).await {
                ReadOutcome::Eof => break,
                ReadOutcome::Chunk(_) | ReadOutcome::Idle => {}
            }
        }
        assert_eq!(child.wait(Duration::from_secs(5)).await, Some(0));
    }

    #[tokio::test]
    async fn non_zero_exit_code_is_reported() {
        let child = PipeChild::spawn(&sh("exit 3")).expect("spawn");
        drain(&child).await;
        assert_eq!(child.wait(Duration::from_secs(5)).await, Some(3));
    }

    #[tokio::test]
    async fn terminate_signals_the_whole_process_group() {
        // The child spawns its own grandchild; group signaling must stop both.
        let child = PipeChild::spawn(&sh("sleep 30 & wait")).expect("spawn");
        assert!(child.is_alive());
        child.terminate(true).await.expect("terminate");
        let code = child.wait(Duration::from_secs(5)).await;
        assert!(code.is_some(), "child should exit after group signal");
        assert!(!child.is_alive());
    }

    #[tokio::test]
    async fn missing_program_is_a_spawn_error() {
        let spec = LaunchSpec {
            program: "definitely-not-a-real-binary-xyz".to_string(),
            args: Vec::new(),
            cwd: PathBuf::from("/tmp"),
            env: Vec::new(),
            transport: Transport::Pipe,
        };
        match PipeChild::spawn(&spec) {
            Err(LaunchError::SpawnFailed { program, .. }) => {
                assert!(program.contains("definitely-not"));
            }
            Err(other) => panic!("expected SpawnFailed, got {other}"),
            Ok(_) => panic!("spawn unexpectedly succeeded"),
        }
    }
}
