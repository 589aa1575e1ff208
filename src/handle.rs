//! Spawning and signalling of a single child process.
//!
//! A `ProcessHandle` owns nothing but the identity of a running instance. The child
//! itself is moved into an exit-watcher task, and each output stream is drained by
//! its own worker task; all of them report through the shared event channel.

use std::io::ErrorKind;
use std::process::{ExitStatus, Stdio};

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;

use crate::events::{Event, ProcessUpdate};
use crate::framer::LineFramer;
use crate::output::{CapturedLine, StreamKind};

const READ_CHUNK: usize = 8 * 1024;
const DEFAULT_TERM: &str = "xterm-256color";

#[derive(Debug, Error)]
pub enum SpawnError {
    #[error("empty command")]
    EmptyCommand,
    #[error("{program}: {source}")]
    Io {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// Signals understood by `signal_tree`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupSignal {
    /// Ask the tree to exit (SIGTERM).
    Terminate,
    /// Force the tree down (SIGKILL).
    Kill,
}

/// A live child instance, identified by pid and spawn generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessHandle {
    pid: u32,
    generation: u64,
}

impl ProcessHandle {
    /// Starts `command` for `name` and wires its streams and exit into `tx`.
    ///
    /// The command is split on whitespace; there is no quoting or escaping.
    /// The child becomes the leader of a new process group so the whole tree it
    /// spawns can be signalled at once.
    pub fn start(
        name: &str,
        command: &str,
        generation: u64,
        tx: &mpsc::Sender<Event>,
    ) -> Result<Self, SpawnError> {
        let mut parts = command.split_whitespace();
        let program = parts.next().ok_or(SpawnError::EmptyCommand)?;

        let mut cmd = Command::new(program);
        cmd.args(parts)
            .env("FORCE_COLOR", "1")
            .env("TERM", terminal_type())
            .stdin(Stdio::inherit())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        #[cfg(windows)]
        {
            const CREATE_NEW_PROCESS_GROUP: u32 = 0x00000200;
            cmd.creation_flags(CREATE_NEW_PROCESS_GROUP);
        }

        #[cfg(unix)]
        unsafe {
            cmd.pre_exec(|| {
                let _ = libc::setpgid(0, 0);
                Ok(())
            });
        }

        let mut child = cmd.spawn().map_err(|source| SpawnError::Io {
            program: program.to_string(),
            source,
        })?;
        let pid = child.id().unwrap_or(0);

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(read_stream(
                name.to_string(),
                generation,
                StreamKind::Stdout,
                stdout,
                tx.clone(),
            ));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(read_stream(
                name.to_string(),
                generation,
                StreamKind::Stderr,
                stderr,
                tx.clone(),
            ));
        }
        tokio::spawn(watch_exit(name.to_string(), generation, child, tx.clone()));

        Ok(Self { pid, generation })
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Signals the instance and every descendant in its group.
    pub fn signal(&self, signal: GroupSignal) {
        signal_tree(self.pid, signal);
    }
}

fn terminal_type() -> String {
    std::env::var("TERM")
        .ok()
        .filter(|term| !term.is_empty())
        .unwrap_or_else(|| DEFAULT_TERM.to_string())
}

async fn watch_exit(name: String, generation: u64, mut child: Child, tx: mpsc::Sender<Event>) {
    let code = match child.wait().await {
        Ok(status) => exit_code(status),
        Err(err) => {
            tracing::warn!(process = %name, error = %err, "failed waiting for child");
            1
        }
    };
    tracing::info!(process = %name, generation, code, "process exited");
    let _ = tx
        .send(Event::Process(ProcessUpdate::Exited {
            name,
            generation,
            code,
        }))
        .await;
}

/// Exit code, or `128 + signal` when the child was killed by a signal.
fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    1
}

// Runs until the stream closes, so output written after a kill request is kept.
async fn read_stream<R>(
    name: String,
    generation: u64,
    source: StreamKind,
    mut reader: R,
    tx: mpsc::Sender<Event>,
) where
    R: AsyncRead + Unpin,
{
    let mut framer = LineFramer::new();
    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => {
                tracing::debug!(process = %name, stream = source.label(), error = %err, "stream closed");
                break;
            }
        };
        for line in framer.push(&buf[..n]) {
            if !forward(&tx, &name, generation, source, line).await {
                return;
            }
        }
    }
    if let Some(line) = framer.finish() {
        forward(&tx, &name, generation, source, line).await;
    }
}

async fn forward(
    tx: &mpsc::Sender<Event>,
    name: &str,
    generation: u64,
    source: StreamKind,
    line: String,
) -> bool {
    let captured = CapturedLine::new(name, generation, source, line);
    tx.send(Event::Process(ProcessUpdate::Line(captured)))
        .await
        .is_ok()
}

/// Delivers `signal` to the process group led by `pid`.
///
/// Failures mean the group is already gone and are ignored.
#[cfg(unix)]
pub fn signal_tree(pid: u32, signal: GroupSignal) {
    let Ok(pid) = i32::try_from(pid) else {
        return;
    };
    // kill(0) or kill(-0) would hit our own group.
    if pid <= 0 {
        return;
    }
    let sig = match signal {
        GroupSignal::Terminate => libc::SIGTERM,
        GroupSignal::Kill => libc::SIGKILL,
    };
    unsafe {
        if libc::kill(-pid, sig) != 0 {
            tracing::debug!(pid, "process group already gone");
        }
        // Covers a child whose setpgid failed.
        let _ = libc::kill(pid, sig);
    }
}

#[cfg(windows)]
pub fn signal_tree(pid: u32, signal: GroupSignal) {
    if pid == 0 {
        return;
    }
    match signal {
        GroupSignal::Terminate => {
            use windows_sys::Win32::System::Console::{GenerateConsoleCtrlEvent, CTRL_BREAK_EVENT};
            // CTRL_BREAK reaches every process in the group created at spawn.
            unsafe {
                let _ = GenerateConsoleCtrlEvent(CTRL_BREAK_EVENT, pid);
            }
        }
        GroupSignal::Kill => {
            let _ = std::process::Command::new("taskkill")
                .args(["/T", "/F", "/PID", &pid.to_string()])
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status();
        }
    }
}

#[cfg(all(not(unix), not(windows)))]
pub fn signal_tree(_pid: u32, _signal: GroupSignal) {}
