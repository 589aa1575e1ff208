//! Data structures for tracking process state.
//!
//! `ProcessConfig` is what the Procfile (or the single command) declares,
//! `ProcessState` is the run state reported by the supervisor, and `Process`
//! aggregates both with the process's log history.

use crate::output::LogEntry;

/// Name used for the process in single-command mode.
pub const SINGLE_PROCESS_NAME: &str = "main";

/// A named command declared at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessConfig {
    /// Unique name within a run.
    pub name: String,
    /// Command line, split on whitespace at spawn time.
    pub command: String,
}

impl ProcessConfig {
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
        }
    }
}

/// Run state of one process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessState {
    pub running: bool,
    /// Pid of the most recent spawn. Stale once `running` is false.
    pub pid: Option<u32>,
    /// Set when the process terminates, cleared by the next spawn.
    pub exit_code: Option<i32>,
}

/// A supervised process and everything it has logged.
#[derive(Debug, Clone)]
pub struct Process {
    pub name: String,
    pub command: String,
    pub state: ProcessState,
    /// Append-only, in arrival order. Only `clear_logs` shrinks it.
    pub logs: Vec<LogEntry>,
}

impl Process {
    pub fn new(config: &ProcessConfig) -> Self {
        Self {
            name: config.name.clone(),
            command: config.command.clone(),
            state: ProcessState::default(),
            logs: Vec::new(),
        }
    }

    /// Index of the newest entry, or 0 for an empty log.
    pub fn last_log_index(&self) -> usize {
        self.logs.len().saturating_sub(1)
    }

    pub fn status(&self) -> ProcessStatus {
        if self.state.running {
            ProcessStatus::Running
        } else {
            match self.state.exit_code {
                None => ProcessStatus::Idle,
                Some(0) => ProcessStatus::Exited,
                Some(code) => ProcessStatus::Failed(code),
            }
        }
    }
}

/// Coarse status used by the views.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessStatus {
    /// Never started or not yet reported.
    Idle,
    Running,
    /// Exited with code 0.
    Exited,
    /// Exited with a non-zero code.
    Failed(i32),
}
