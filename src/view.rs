//! Render model.
//!
//! `build_screen` turns a supervisor snapshot and the interaction state into a plain
//! description of what is on screen. It is recomputed after every change and
//! carries no terminal types, so the layout decisions can be tested directly.

use crate::app::{App, Panel, StatusLevel};
use crate::output::{format_json, LogEntry, LogLevel};
use crate::process::{Process, ProcessStatus};

pub const WAITING_PLACEHOLDER: &str = "Waiting for logs...";

const HELP: [(&str, &str); 14] = [
    ("Tab", "Switch panel"),
    ("1 / 2", "Focus processes / console"),
    ("j k / arrows", "Move selection"),
    ("g G / Home End", "Jump to top / bottom"),
    ("PgUp PgDn", "Scroll logs by page"),
    ("Enter", "Show log entry details"),
    ("c", "Clear logs of selected process"),
    ("r", "Restart selected process"),
    ("R", "Restart all processes"),
    ("x", "Kill selected process"),
    ("X", "Kill all processes"),
    ("?", "Toggle this help"),
    ("Esc", "Close overlay"),
    ("q / Ctrl+C", "Quit"),
];

#[derive(Debug, Clone, PartialEq)]
pub struct Screen {
    pub title: String,
    pub active_panel: Panel,
    /// False in single-command mode.
    pub show_process_list: bool,
    pub process_rows: Vec<ProcessRow>,
    pub selected_process: usize,
    pub console_title: String,
    pub console_rows: Vec<LogRow>,
    /// Position of the selected entry within `console_rows`.
    pub console_cursor: Option<usize>,
    pub placeholder: Option<&'static str>,
    /// "n of m", empty when there are no entries.
    pub console_footer: String,
    pub status_bar: String,
    pub status_message: Option<(String, StatusLevel)>,
    pub help: Option<Vec<(&'static str, &'static str)>>,
    pub detail: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProcessRow {
    pub icon: &'static str,
    pub name: String,
    pub detail: String,
    pub status: ProcessStatus,
    pub selected: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogRow {
    pub time: String,
    pub icon: &'static str,
    pub level: LogLevel,
    pub message: String,
    pub stderr: bool,
    pub selected: bool,
}

/// Builds the screen for a console with `console_rows` visible lines.
pub fn build_screen(processes: &[Process], app: &App, console_rows: usize) -> Screen {
    let selected = processes.get(app.selected_process);
    let process_rows = processes
        .iter()
        .enumerate()
        .map(|(idx, process)| process_row(process, idx == app.selected_process, app.use_symbols))
        .collect();

    let (console_rows_out, console_cursor, footer) = match selected {
        Some(process) if !process.logs.is_empty() => {
            let selection = app.log_selection(app.selected_process).min(process.last_log_index());
            let (start, end) = console_window(process.logs.len(), selection, console_rows);
            let rows = process.logs[start..end]
                .iter()
                .enumerate()
                .map(|(offset, entry)| log_row(entry, start + offset == selection, app.use_symbols))
                .collect();
            let cursor = Some(selection - start).filter(|_| selection < end);
            let footer = format!("{} of {}", selection + 1, process.logs.len());
            (rows, cursor, footer)
        }
        _ => (Vec::new(), None, String::new()),
    };
    let placeholder = console_rows_out.is_empty().then_some(WAITING_PLACEHOLDER);

    let detail = if app.show_detail {
        app.selected_entry(processes).map(detail_lines)
    } else {
        None
    };

    Screen {
        title: match selected {
            Some(process) => format!("lazydev · {}", process.name),
            None => "lazydev".to_string(),
        },
        active_panel: app.active_panel,
        show_process_list: shows_process_list(processes, app),
        process_rows,
        selected_process: app.selected_process,
        console_title: selected.map(console_title).unwrap_or_else(|| "Console".to_string()),
        console_rows: console_rows_out,
        console_cursor,
        placeholder,
        console_footer: footer,
        status_bar: status_bar(processes, app),
        status_message: app
            .status_message()
            .map(|(text, level)| (text.to_string(), level)),
        help: app.show_help.then(|| HELP.to_vec()),
        detail,
    }
}

/// The process list is hidden for a single process.
pub fn shows_process_list(processes: &[Process], app: &App) -> bool {
    !app.single && processes.len() > 1
}

/// Visible `[start, end)` of a log of `len` entries with `rows` lines, keeping the
/// selection centred except near either end.
pub fn console_window(len: usize, selection: usize, rows: usize) -> (usize, usize) {
    if rows == 0 || len == 0 {
        return (0, 0);
    }
    if len <= rows {
        return (0, len);
    }
    let start = selection.saturating_sub(rows / 2).min(len - rows);
    (start, start + rows)
}

fn process_row(process: &Process, selected: bool, use_symbols: bool) -> ProcessRow {
    let status = process.status();
    let detail = match status {
        ProcessStatus::Running => match process.state.pid {
            Some(pid) => format!("pid {}", pid),
            None => "running".to_string(),
        },
        ProcessStatus::Idle => "idle".to_string(),
        ProcessStatus::Exited => "exited".to_string(),
        ProcessStatus::Failed(code) => format!("exit {}", code),
    };
    ProcessRow {
        icon: status_icon(status, use_symbols),
        name: process.name.clone(),
        detail,
        status,
        selected,
    }
}

fn log_row(entry: &LogEntry, selected: bool, use_symbols: bool) -> LogRow {
    LogRow {
        time: entry.timestamp.format("%H:%M:%S").to_string(),
        icon: level_icon(entry.level, use_symbols),
        level: entry.level,
        message: entry.message.clone(),
        stderr: entry.source == crate::output::StreamKind::Stderr,
        selected,
    }
}

fn console_title(process: &Process) -> String {
    let errors = count_level(process, LogLevel::Error);
    let warnings = count_level(process, LogLevel::Warn);
    let mut title = format!("Console: {} ({} logs", process.name, process.logs.len());
    if errors > 0 {
        title.push_str(&format!(", {} errors", errors));
    }
    if warnings > 0 {
        title.push_str(&format!(", {} warnings", warnings));
    }
    title.push(')');
    title
}

fn count_level(process: &Process, level: LogLevel) -> usize {
    process.logs.iter().filter(|entry| entry.level == level).count()
}

fn status_bar(processes: &[Process], app: &App) -> String {
    let running = processes.iter().filter(|p| p.state.running).count();
    let logs: usize = processes.iter().map(|p| p.logs.len()).sum();
    format!(
        "{}/{} running | {} logs | {} | ? help | q quit",
        running,
        processes.len(),
        logs,
        app.active_panel.label()
    )
}

fn detail_lines(entry: &LogEntry) -> Vec<String> {
    let mut lines = vec![
        format!("Time:    {}", entry.timestamp.format("%Y-%m-%d %H:%M:%S%.3f")),
        format!("Level:   {}", entry.level.label()),
        format!("Source:  {}", entry.source.label()),
        format!("Process: {}", entry.process_name),
        format!("Id:      {}", entry.id),
        String::new(),
    ];
    let body = format_json(&entry.message).unwrap_or_else(|| entry.message.clone());
    lines.extend(body.lines().map(str::to_string));
    lines
}

fn status_icon(status: ProcessStatus, use_symbols: bool) -> &'static str {
    match (status, use_symbols) {
        (ProcessStatus::Running, true) => "●",
        (ProcessStatus::Exited, true) => "○",
        (ProcessStatus::Failed(_), true) => "✗",
        (ProcessStatus::Idle, true) => "·",
        (ProcessStatus::Running, false) => "*",
        (ProcessStatus::Exited, false) => "o",
        (ProcessStatus::Failed(_), false) => "x",
        (ProcessStatus::Idle, false) => "-",
    }
}

fn level_icon(level: LogLevel, use_symbols: bool) -> &'static str {
    match (level, use_symbols) {
        (LogLevel::Error, true) => "✖",
        (LogLevel::Warn, true) => "⚠",
        (LogLevel::Info, true) => "ℹ",
        (LogLevel::Debug, true) => "·",
        (LogLevel::Error, false) => "E",
        (LogLevel::Warn, false) => "W",
        (LogLevel::Info, false) => "I",
        (LogLevel::Debug, false) => "D",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::CapturedLine;
    use crate::process::{ProcessConfig, ProcessState};

    fn process(name: &str, lines: &[(LogLevel, &str)]) -> Process {
        let mut process = Process::new(&ProcessConfig::new(name, "true"));
        for (idx, (level, text)) in lines.iter().enumerate() {
            let line = CapturedLine::synthetic(name, *level, *text, *text);
            process.logs.push(LogEntry::new(idx as u64 + 1, line));
        }
        process
    }

    #[test]
    fn window_centres_selection_and_pins_ends() {
        assert_eq!(console_window(5, 4, 10), (0, 5));
        assert_eq!(console_window(100, 99, 10), (90, 100));
        assert_eq!(console_window(100, 0, 10), (0, 10));
        assert_eq!(console_window(100, 50, 10), (45, 55));
        assert_eq!(console_window(100, 50, 0), (0, 0));
    }

    #[test]
    fn console_shows_selected_process() {
        let procs = vec![
            process("web", &[(LogLevel::Info, "ready"), (LogLevel::Error, "boom")]),
            process("worker", &[(LogLevel::Warn, "slow")]),
        ];
        let mut app = App::new(2, false, true);
        app.sync(&procs);
        let screen = build_screen(&procs, &app, 10);
        assert!(screen.show_process_list);
        assert_eq!(screen.process_rows.len(), 2);
        assert!(screen.process_rows[0].selected);
        assert_eq!(screen.console_title, "Console: web (2 logs, 1 errors)");
        assert_eq!(screen.console_rows.len(), 2);
        assert_eq!(screen.console_rows[1].message, "boom");
        assert_eq!(screen.console_rows[1].icon, "✖");
        assert_eq!(screen.console_cursor, Some(1));
        assert_eq!(screen.console_footer, "2 of 2");
        assert!(screen.placeholder.is_none());
        assert_eq!(screen.status_bar, "0/2 running | 3 logs | Processes | ? help | q quit");
    }

    #[test]
    fn empty_console_shows_placeholder() {
        let procs = vec![process("main", &[])];
        let app = App::new(1, true, false);
        let screen = build_screen(&procs, &app, 10);
        assert!(!screen.show_process_list);
        assert_eq!(screen.placeholder, Some(WAITING_PLACEHOLDER));
        assert!(screen.console_footer.is_empty());
        assert_eq!(screen.process_rows[0].icon, "-");
    }

    #[test]
    fn process_rows_reflect_state() {
        let mut running = process("api", &[]);
        running.state = ProcessState {
            running: true,
            pid: Some(4242),
            exit_code: None,
        };
        let mut failed = process("db", &[]);
        failed.state.exit_code = Some(1);
        let procs = vec![running, failed];
        let app = App::new(2, false, true);
        let screen = build_screen(&procs, &app, 5);
        assert_eq!(screen.process_rows[0].detail, "pid 4242");
        assert_eq!(screen.process_rows[0].icon, "●");
        assert_eq!(screen.process_rows[1].detail, "exit 1");
        assert_eq!(screen.process_rows[1].status, ProcessStatus::Failed(1));
    }

    #[test]
    fn detail_pretty_prints_json() {
        let procs = vec![process("api", &[(LogLevel::Info, "login {\"user\":\"ada\"}")])];
        let mut app = App::new(1, true, true);
        app.sync(&procs);
        app.show_detail = true;
        let screen = build_screen(&procs, &app, 5);
        let detail = screen.detail.unwrap();
        assert!(detail.contains(&"Id:      api-1".to_string()));
        assert!(detail.contains(&"login {".to_string()));
        assert!(detail.contains(&"  \"user\": \"ada\"".to_string()));
    }

    #[test]
    fn help_overlay_lists_keys() {
        let mut app = App::new(0, false, true);
        app.show_help = true;
        let screen = build_screen(&[], &app, 5);
        let help = screen.help.unwrap();
        assert!(help.iter().any(|(key, _)| *key == "X"));
        assert_eq!(screen.title, "lazydev");
    }
}
