//! Process supervision and log accumulation.
//!
//! The `Supervisor` owns the registry: one `Process` per configured name (state and
//! log history) plus the live `ProcessHandle` attributed to each name. It is driven
//! from the event loop only, so every mutation (control calls as well as updates
//! coming back from the stream workers) happens on one path and the UI always sees
//! a consistent snapshot through `processes()`.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::events::{Event, ProcessUpdate};
use crate::handle::{signal_tree, GroupSignal, ProcessHandle};
use crate::output::{CapturedLine, LogEntry, LogLevel};
use crate::process::{Process, ProcessConfig, ProcessState};
use crate::shutdown::ShutdownHooks;

/// Default pause between killing and respawning on restart.
pub const DEFAULT_RESTART_DELAY: Duration = Duration::from_millis(100);

/// Owns process lifecycles and log history for a run.
pub struct Supervisor {
    processes: Vec<Process>,
    index: HashMap<String, usize>,
    live: HashMap<String, ProcessHandle>,
    // Replaced instances that have not reported their exit yet.
    retired: Vec<ProcessHandle>,
    next_generation: u64,
    next_seq: u64,
    revision: u64,
    restart_delay: Duration,
    // Set once the run is ending; pending restarts are dropped.
    shutting_down: bool,
    event_tx: mpsc::Sender<Event>,
    hooks: ShutdownHooks,
}

impl Supervisor {
    /// Creates a supervisor with one idle process per config.
    ///
    /// Configs are expected to have unique names; later duplicates are ignored.
    pub fn new(
        configs: &[ProcessConfig],
        event_tx: mpsc::Sender<Event>,
        hooks: ShutdownHooks,
        restart_delay: Duration,
    ) -> Self {
        let mut processes = Vec::with_capacity(configs.len());
        let mut index = HashMap::with_capacity(configs.len());
        for config in configs {
            if index.contains_key(&config.name) {
                continue;
            }
            index.insert(config.name.clone(), processes.len());
            processes.push(Process::new(config));
        }
        Self {
            processes,
            index,
            live: HashMap::new(),
            retired: Vec::new(),
            next_generation: 1,
            next_seq: 1,
            revision: 0,
            restart_delay,
            shutting_down: false,
            event_tx,
            hooks,
        }
    }

    /// Current snapshot, in configuration order.
    pub fn processes(&self) -> &[Process] {
        &self.processes
    }

    pub fn process(&self, name: &str) -> Option<&Process> {
        self.index.get(name).map(|&idx| &self.processes[idx])
    }

    /// Bumped on every mutation visible through `processes()`.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Whether any instance, current or replaced, is still alive.
    pub fn has_live(&self) -> bool {
        !self.live.is_empty() || !self.retired.is_empty()
    }

    /// Spawns every configured process.
    pub fn start_all(&mut self) {
        let commands: Vec<(String, String)> = self
            .processes
            .iter()
            .map(|p| (p.name.clone(), p.command.clone()))
            .collect();
        for (name, command) in commands {
            self.spawn(&name, &command);
        }
    }

    /// Starts `command` for `name`.
    ///
    /// A spawn failure is recorded as an error entry in the process's log and an
    /// exit code of 1; it is never returned to the caller.
    pub fn spawn(&mut self, name: &str, command: &str) {
        let Some(&idx) = self.index.get(name) else {
            tracing::warn!(process = %name, "spawn requested for unknown process");
            return;
        };

        if let Some(previous) = self.live.remove(name) {
            // Still running after the restart delay: detach it from the name but keep
            // signalling it until it exits.
            tracing::debug!(process = %name, pid = previous.pid(), "retiring previous instance");
            previous.signal(GroupSignal::Terminate);
            self.retired.push(previous);
        }

        let generation = self.next_generation;
        self.next_generation += 1;

        match ProcessHandle::start(name, command, generation, &self.event_tx) {
            Ok(handle) => {
                tracing::info!(process = %name, pid = handle.pid(), generation, "process started");
                self.processes[idx].state = ProcessState {
                    running: true,
                    pid: Some(handle.pid()),
                    exit_code: None,
                };
                self.live.insert(name.to_string(), handle);
            }
            Err(err) => {
                tracing::warn!(process = %name, error = %err, "failed to start process");
                let line = CapturedLine::synthetic(
                    name,
                    LogLevel::Error,
                    format!("Failed to start: {}", err),
                    err.to_string(),
                );
                self.append(idx, line);
                self.processes[idx].state = ProcessState {
                    running: false,
                    pid: None,
                    exit_code: Some(1),
                };
            }
        }
        self.touch();
        self.refresh_cleanup_hook();
    }

    /// Asks the live instance of `name` and its descendants to terminate.
    ///
    /// The state changes only once the exit is observed. Killing a process that is
    /// not running does nothing.
    pub fn kill(&mut self, name: &str) {
        if let Some(handle) = self.live.get(name) {
            tracing::info!(process = %name, pid = handle.pid(), "terminating process group");
            handle.signal(GroupSignal::Terminate);
        }
    }

    /// Applies `kill` to every live process.
    pub fn kill_all(&mut self) {
        let names: Vec<String> = self.live.keys().cloned().collect();
        for name in names {
            self.kill(&name);
        }
        for handle in &self.retired {
            handle.signal(GroupSignal::Terminate);
        }
    }

    /// Terminates everything and stops honouring restarts.
    pub fn shutdown(&mut self) {
        tracing::info!(live = self.live.len(), retired = self.retired.len(), "shutting down");
        self.shutting_down = true;
        self.kill_all();
    }

    /// Sends SIGKILL to everything still alive, replaced instances included.
    pub fn force_kill_all(&mut self) {
        for handle in self.live.values().chain(self.retired.iter()) {
            tracing::warn!(pid = handle.pid(), "force killing process group");
            handle.signal(GroupSignal::Kill);
        }
    }

    /// Kills `name`, then respawns its command once the restart delay elapses.
    pub fn restart(&mut self, name: &str) {
        if self.shutting_down || !self.index.contains_key(name) {
            return;
        }
        tracing::info!(process = %name, delay_ms = self.restart_delay.as_millis() as u64, "restarting");
        self.kill(name);
        let tx = self.event_tx.clone();
        let delay = self.restart_delay;
        let name = name.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx
                .send(Event::Process(ProcessUpdate::RestartDue { name }))
                .await;
        });
    }

    pub fn restart_all(&mut self) {
        let names: Vec<String> = self.processes.iter().map(|p| p.name.clone()).collect();
        for name in names {
            self.restart(&name);
        }
    }

    /// Empties the log history of `name`; its state is untouched.
    pub fn clear_logs(&mut self, name: &str) {
        if let Some(&idx) = self.index.get(name) {
            self.processes[idx].logs.clear();
            self.touch();
        }
    }

    /// Applies an update from a worker, an exit watcher or a restart timer.
    pub fn apply(&mut self, update: ProcessUpdate) {
        match update {
            ProcessUpdate::Line(line) => {
                if let Some(&idx) = self.index.get(&line.process) {
                    self.append(idx, line);
                    self.touch();
                }
            }
            ProcessUpdate::Exited {
                name,
                generation,
                code,
            } => self.on_exit(&name, generation, code),
            ProcessUpdate::RestartDue { name } => {
                if self.shutting_down {
                    return;
                }
                if let Some(command) = self.process(&name).map(|p| p.command.clone()) {
                    self.spawn(&name, &command);
                }
            }
        }
    }

    fn on_exit(&mut self, name: &str, generation: u64, code: i32) {
        let current = self
            .live
            .get(name)
            .map(|handle| handle.generation() == generation)
            .unwrap_or(false);
        if current {
            self.live.remove(name);
            if let Some(&idx) = self.index.get(name) {
                let state = &mut self.processes[idx].state;
                state.running = false;
                state.exit_code = Some(code);
            }
            self.touch();
        } else {
            self.retired.retain(|handle| handle.generation() != generation);
        }
        self.refresh_cleanup_hook();
    }

    fn append(&mut self, idx: usize, line: CapturedLine) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.processes[idx].logs.push(LogEntry::new(seq, line));
    }

    fn touch(&mut self) {
        self.revision += 1;
    }

    // The hook owns a copy of the pids so it can run from the signal task without
    // touching the registry.
    fn refresh_cleanup_hook(&self) {
        let pids: Vec<u32> = self
            .live
            .values()
            .chain(self.retired.iter())
            .map(|handle| handle.pid())
            .collect();
        self.hooks.register(move || {
            for pid in &pids {
                signal_tree(*pid, GroupSignal::Terminate);
            }
        });
    }
}
