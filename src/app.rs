//! Interaction state and key handling.
//!
//! `App` holds only what the user controls: the focused panel, the selected process,
//! one log selection per process and the overlays. It never touches processes
//! directly; keys that affect them come back as an `AppAction` for the event loop
//! to carry out against the supervisor.

use std::time::{Duration, Instant};

use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

use crate::output::LogEntry;
use crate::process::Process;

const STATUS_TTL: Duration = Duration::from_secs(3);

/// Panel receiving navigation keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Panel {
    Processes,
    Console,
}

impl Panel {
    pub fn label(self) -> &'static str {
        match self {
            Panel::Processes => "Processes",
            Panel::Console => "Console",
        }
    }
}

/// Actions resulting from user interaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppAction {
    /// No action required.
    None,
    /// Stop everything and exit.
    Quit,
    Kill(usize),
    KillAll,
    Restart(usize),
    RestartAll,
    /// Drop the log history of a process.
    Clear(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusLevel {
    Info,
    Warning,
}

#[derive(Debug, Clone)]
struct StatusMessage {
    text: String,
    at: Instant,
    level: StatusLevel,
}

#[derive(Debug)]
pub struct App {
    pub active_panel: Panel,
    pub selected_process: usize,
    /// Selected log index, one per process.
    log_selection: Vec<usize>,
    /// Log lengths observed by the last `sync`.
    seen_len: Vec<usize>,
    pub show_help: bool,
    pub show_detail: bool,
    /// Rows visible in the console, used as the page size.
    pub console_height: usize,
    pub use_symbols: bool,
    /// Single-command layout: no process list, console focused.
    pub single: bool,
    status_message: Option<StatusMessage>,
}

impl App {
    pub fn new(process_count: usize, single: bool, use_symbols: bool) -> Self {
        Self {
            active_panel: if single { Panel::Console } else { Panel::Processes },
            selected_process: 0,
            log_selection: vec![0; process_count],
            seen_len: vec![0; process_count],
            show_help: false,
            show_detail: false,
            console_height: 10,
            use_symbols,
            single,
            status_message: None,
        }
    }

    /// Log selection of process `index`.
    pub fn log_selection(&self, index: usize) -> usize {
        self.log_selection.get(index).copied().unwrap_or(0)
    }

    pub fn selected_log(&self) -> usize {
        self.log_selection(self.selected_process)
    }

    pub fn selected_entry<'a>(&self, processes: &'a [Process]) -> Option<&'a LogEntry> {
        processes
            .get(self.selected_process)
            .and_then(|process| process.logs.get(self.selected_log()))
    }

    /// Reconciles selections with a new snapshot.
    ///
    /// A selection sitting on the last entry follows new entries, as does every
    /// selection while the console is not focused. A selection the user moved away
    /// from the end keeps its value. Shrunk logs clamp the selection.
    pub fn sync(&mut self, processes: &[Process]) {
        let count = processes.len();
        self.log_selection.resize(count, 0);
        self.seen_len.resize(count, 0);
        if count == 0 {
            self.selected_process = 0;
            return;
        }
        self.selected_process = self.selected_process.min(count - 1);

        let console_active = self.active_panel == Panel::Console;
        for (idx, process) in processes.iter().enumerate() {
            let len = process.logs.len();
            let previous = self.seen_len[idx];
            let selection = &mut self.log_selection[idx];
            if len > previous {
                let was_last = *selection >= previous.saturating_sub(1);
                if !console_active || was_last {
                    *selection = process.last_log_index();
                }
            } else if len < previous {
                *selection = (*selection).min(process.last_log_index());
            }
            self.seen_len[idx] = len;
        }
        if self.selected_entry(processes).is_none() {
            self.show_detail = false;
        }
    }

    /// Moves the process selection, clamped to the list.
    ///
    /// A change of process jumps that process's log selection to its newest entry.
    pub fn select_process(&mut self, index: usize, processes: &[Process]) {
        if processes.is_empty() {
            return;
        }
        let index = index.min(processes.len() - 1);
        if index != self.selected_process {
            self.selected_process = index;
            if let Some(slot) = self.log_selection.get_mut(index) {
                *slot = processes[index].last_log_index();
            }
        }
    }

    fn select_log(&mut self, index: usize, processes: &[Process]) {
        let Some(process) = processes.get(self.selected_process) else {
            return;
        };
        if let Some(slot) = self.log_selection.get_mut(self.selected_process) {
            *slot = index.min(process.last_log_index());
        }
    }

    fn move_selection(&mut self, delta: isize, processes: &[Process]) {
        match self.active_panel {
            Panel::Processes => {
                let target = offset(self.selected_process, delta);
                self.select_process(target, processes);
            }
            Panel::Console => {
                let target = offset(self.selected_log(), delta);
                self.select_log(target, processes);
            }
        }
    }

    fn jump(&mut self, to_end: bool, processes: &[Process]) {
        match (self.active_panel, to_end) {
            (Panel::Processes, false) => self.select_process(0, processes),
            (Panel::Processes, true) => self.select_process(usize::MAX, processes),
            (Panel::Console, false) => self.select_log(0, processes),
            (Panel::Console, true) => self.select_log(usize::MAX, processes),
        }
    }

    pub fn set_panel(&mut self, panel: Panel) {
        self.active_panel = panel;
    }

    pub fn handle_key(&mut self, key: KeyEvent, processes: &[Process]) -> AppAction {
        if key.kind == KeyEventKind::Release {
            return AppAction::None;
        }
        self.sync(processes);

        if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
            return AppAction::Quit;
        }
        if self.show_help {
            if matches!(key.code, KeyCode::Char('?') | KeyCode::Esc | KeyCode::Char('q')) {
                self.show_help = false;
            }
            return AppAction::None;
        }
        if self.show_detail {
            if matches!(key.code, KeyCode::Enter | KeyCode::Esc | KeyCode::Char('q')) {
                self.show_detail = false;
            }
            return AppAction::None;
        }

        let page = self.console_height.max(1) as isize;
        let selected = self.selected_process;
        let has_process = selected < processes.len();
        match key.code {
            KeyCode::Char('q') => AppAction::Quit,
            // The single-command layout has no process list to focus.
            KeyCode::Tab | KeyCode::BackTab | KeyCode::Char('1') if self.single => AppAction::None,
            KeyCode::Tab | KeyCode::BackTab => {
                self.active_panel = match self.active_panel {
                    Panel::Processes => Panel::Console,
                    Panel::Console => Panel::Processes,
                };
                AppAction::None
            }
            KeyCode::Char('1') => {
                self.set_panel(Panel::Processes);
                AppAction::None
            }
            KeyCode::Char('2') => {
                self.set_panel(Panel::Console);
                AppAction::None
            }
            KeyCode::Down | KeyCode::Char('j') => {
                self.move_selection(1, processes);
                AppAction::None
            }
            KeyCode::Up | KeyCode::Char('k') => {
                self.move_selection(-1, processes);
                AppAction::None
            }
            KeyCode::PageDown => {
                let target = offset(self.selected_log(), page);
                self.select_log(target, processes);
                AppAction::None
            }
            KeyCode::PageUp => {
                let target = offset(self.selected_log(), -page);
                self.select_log(target, processes);
                AppAction::None
            }
            KeyCode::Home | KeyCode::Char('g') => {
                self.jump(false, processes);
                AppAction::None
            }
            KeyCode::End | KeyCode::Char('G') => {
                self.jump(true, processes);
                AppAction::None
            }
            KeyCode::Enter => {
                if self.active_panel == Panel::Console && self.selected_entry(processes).is_some() {
                    self.show_detail = true;
                }
                AppAction::None
            }
            KeyCode::Char('?') => {
                self.show_help = true;
                AppAction::None
            }
            KeyCode::Char('c') if has_process => {
                if let Some(slot) = self.log_selection.get_mut(selected) {
                    *slot = 0;
                }
                // Lines arriving after the clear count as growth from empty.
                if let Some(seen) = self.seen_len.get_mut(selected) {
                    *seen = 0;
                }
                AppAction::Clear(selected)
            }
            KeyCode::Char('r') if has_process => AppAction::Restart(selected),
            KeyCode::Char('x') if has_process => AppAction::Kill(selected),
            KeyCode::Char('R') => AppAction::RestartAll,
            KeyCode::Char('X') => AppAction::KillAll,
            _ => AppAction::None,
        }
    }

    pub fn set_status_message(&mut self, message: impl Into<String>) {
        self.set_status(message, StatusLevel::Info);
    }

    pub fn set_status_warning(&mut self, message: impl Into<String>) {
        self.set_status(message, StatusLevel::Warning);
    }

    fn set_status(&mut self, message: impl Into<String>, level: StatusLevel) {
        self.status_message = Some(StatusMessage {
            text: message.into(),
            at: Instant::now(),
            level,
        });
    }

    pub fn status_message(&self) -> Option<(&str, StatusLevel)> {
        self.status_message
            .as_ref()
            .filter(|message| message.at.elapsed() < STATUS_TTL)
            .map(|message| (message.text.as_str(), message.level))
    }
}

fn offset(value: usize, delta: isize) -> usize {
    if delta < 0 {
        value.saturating_sub(delta.unsigned_abs())
    } else {
        value.saturating_add(delta as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::{CapturedLine, LogLevel};
    use crate::process::ProcessConfig;

    fn processes(counts: &[usize]) -> Vec<Process> {
        counts
            .iter()
            .enumerate()
            .map(|(idx, &count)| {
                let mut process = Process::new(&ProcessConfig::new(format!("p{}", idx), "true"));
                for _ in 0..count {
                    push(&mut process);
                }
                process
            })
            .collect()
    }

    fn push(process: &mut Process) {
        let seq = process.logs.len() as u64 + 1;
        let line = CapturedLine::synthetic(&process.name, LogLevel::Info, "line", "line");
        process.logs.push(LogEntry::new(seq, line));
    }

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn press(app: &mut App, procs: &[Process], code: KeyCode) -> AppAction {
        app.handle_key(key(code), procs)
    }

    #[test]
    fn process_selection_is_clamped() {
        let procs = processes(&[1, 2, 3]);
        let mut app = App::new(3, false, true);
        app.select_process(99, &procs);
        assert_eq!(app.selected_process, 2);
        press(&mut app, &procs, KeyCode::Down);
        assert_eq!(app.selected_process, 2);
        press(&mut app, &procs, KeyCode::Home);
        press(&mut app, &procs, KeyCode::Up);
        assert_eq!(app.selected_process, 0);

        let mut empty = App::new(0, false, true);
        assert_eq!(press(&mut empty, &[], KeyCode::Down), AppAction::None);
        assert_eq!(press(&mut empty, &[], KeyCode::Char('x')), AppAction::None);
        assert_eq!(empty.selected_process, 0);
    }

    #[test]
    fn switching_process_jumps_to_newest_log() {
        let procs = processes(&[4, 6]);
        let mut app = App::new(2, false, true);
        app.sync(&procs);
        app.log_selection[1] = 2;
        press(&mut app, &procs, KeyCode::Char('j'));
        assert_eq!(app.selected_process, 1);
        assert_eq!(app.selected_log(), 5);
    }

    #[test]
    fn panel_switch_keeps_selections() {
        let procs = processes(&[5, 5]);
        let mut app = App::new(2, false, true);
        app.select_process(1, &procs);
        app.sync(&procs);
        app.set_panel(Panel::Console);
        press(&mut app, &procs, KeyCode::Up);
        let log = app.selected_log();

        press(&mut app, &procs, KeyCode::Tab);
        assert_eq!(app.active_panel, Panel::Processes);
        press(&mut app, &procs, KeyCode::Char('2'));
        assert_eq!(app.active_panel, Panel::Console);
        press(&mut app, &procs, KeyCode::Char('1'));
        assert_eq!(app.active_panel, Panel::Processes);
        assert_eq!(app.selected_process, 1);
        assert_eq!(app.selected_log(), log);
    }

    #[test]
    fn new_entries_follow_when_at_last_index() {
        let mut procs = processes(&[3]);
        let mut app = App::new(1, false, true);
        app.set_panel(Panel::Console);
        app.sync(&procs);
        assert_eq!(app.selected_log(), 2);

        push(&mut procs[0]);
        app.sync(&procs);
        assert_eq!(app.selected_log(), 3);
    }

    #[test]
    fn browsing_history_suspends_follow() {
        let mut procs = processes(&[5]);
        let mut app = App::new(1, false, true);
        app.set_panel(Panel::Console);
        app.sync(&procs);
        press(&mut app, &procs, KeyCode::Char('k'));
        press(&mut app, &procs, KeyCode::Char('k'));
        assert_eq!(app.selected_log(), 2);

        push(&mut procs[0]);
        push(&mut procs[0]);
        app.sync(&procs);
        assert_eq!(app.selected_log(), 2);

        press(&mut app, &procs, KeyCode::End);
        push(&mut procs[0]);
        app.sync(&procs);
        assert_eq!(app.selected_log(), 7);
    }

    #[test]
    fn inactive_console_always_follows() {
        let mut procs = processes(&[5]);
        let mut app = App::new(1, false, true);
        app.sync(&procs);
        app.log_selection[0] = 1;
        push(&mut procs[0]);
        app.sync(&procs);
        assert_eq!(app.selected_log(), 5);
    }

    #[test]
    fn clear_resets_log_selection() {
        let mut procs = processes(&[4]);
        let mut app = App::new(1, false, true);
        app.sync(&procs);
        assert_eq!(press(&mut app, &procs, KeyCode::Char('c')), AppAction::Clear(0));
        assert_eq!(app.selected_log(), 0);
        procs[0].logs.clear();
        app.sync(&procs);
        assert_eq!(app.selected_log(), 0);

        push(&mut procs[0]);
        app.sync(&procs);
        assert_eq!(app.selected_log(), 0);
        push(&mut procs[0]);
        app.sync(&procs);
        assert_eq!(app.selected_log(), 1);
    }

    #[test]
    fn follow_resumes_when_lines_arrive_with_the_clear() {
        let mut procs = processes(&[5]);
        let mut app = App::new(1, false, true);
        app.set_panel(Panel::Console);
        app.sync(&procs);
        press(&mut app, &procs, KeyCode::Char('c'));
        procs[0].logs.clear();
        push(&mut procs[0]);
        push(&mut procs[0]);
        app.sync(&procs);
        assert_eq!(app.selected_log(), 1);

        push(&mut procs[0]);
        app.sync(&procs);
        assert_eq!(app.selected_log(), 2);
    }

    #[test]
    fn single_layout_keeps_console_focused() {
        let procs = processes(&[3]);
        let mut app = App::new(1, true, true);
        app.sync(&procs);
        press(&mut app, &procs, KeyCode::Tab);
        assert_eq!(app.active_panel, Panel::Console);
        press(&mut app, &procs, KeyCode::BackTab);
        press(&mut app, &procs, KeyCode::Char('1'));
        assert_eq!(app.active_panel, Panel::Console);
        press(&mut app, &procs, KeyCode::Char('k'));
        assert_eq!(app.selected_log(), 1);
    }

    #[test]
    fn control_keys_map_to_actions() {
        let procs = processes(&[0, 0]);
        let mut app = App::new(2, false, true);
        app.select_process(1, &procs);
        assert_eq!(press(&mut app, &procs, KeyCode::Char('r')), AppAction::Restart(1));
        assert_eq!(press(&mut app, &procs, KeyCode::Char('x')), AppAction::Kill(1));
        assert_eq!(press(&mut app, &procs, KeyCode::Char('R')), AppAction::RestartAll);
        assert_eq!(press(&mut app, &procs, KeyCode::Char('X')), AppAction::KillAll);
        assert_eq!(press(&mut app, &procs, KeyCode::Char('q')), AppAction::Quit);

        let mut app = App::new(2, false, true);
        let ctrl_c = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);
        assert_eq!(app.handle_key(ctrl_c, &procs), AppAction::Quit);
    }

    #[test]
    fn overlays_swallow_keys() {
        let procs = processes(&[2]);
        let mut app = App::new(1, true, true);
        assert_eq!(app.active_panel, Panel::Console);

        press(&mut app, &procs, KeyCode::Char('?'));
        assert!(app.show_help);
        assert_eq!(press(&mut app, &procs, KeyCode::Char('x')), AppAction::None);
        press(&mut app, &procs, KeyCode::Esc);
        assert!(!app.show_help);

        press(&mut app, &procs, KeyCode::Enter);
        assert!(app.show_detail);
        assert_eq!(app.selected_entry(&procs).map(|e| e.seq), Some(2));
        assert_eq!(press(&mut app, &procs, KeyCode::Char('r')), AppAction::None);
        press(&mut app, &procs, KeyCode::Enter);
        assert!(!app.show_detail);
    }

    #[test]
    fn paging_moves_by_console_height() {
        let procs = processes(&[50]);
        let mut app = App::new(1, true, true);
        app.console_height = 10;
        app.sync(&procs);
        press(&mut app, &procs, KeyCode::PageUp);
        assert_eq!(app.selected_log(), 39);
        press(&mut app, &procs, KeyCode::Char('g'));
        assert_eq!(app.selected_log(), 0);
        press(&mut app, &procs, KeyCode::PageDown);
        assert_eq!(app.selected_log(), 10);
        press(&mut app, &procs, KeyCode::Char('G'));
        assert_eq!(app.selected_log(), 49);
    }

    #[test]
    fn status_message_is_visible() {
        let mut app = App::new(0, false, true);
        assert!(app.status_message().is_none());
        app.set_status_warning("Killing all processes");
        assert_eq!(
            app.status_message(),
            Some(("Killing all processes", StatusLevel::Warning))
        );
    }
}
