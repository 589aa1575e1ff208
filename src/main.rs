//! lazydev: run a Procfile (or a single command) with a live log console.
//!
//! This is the entry point. It resolves what to run, starts the supervisor and the
//! terminal UI, and drives the single event loop through which every process update,
//! key press and termination signal flows.

mod app;
mod classify;
mod config;
mod events;
mod framer;
mod handle;
mod output;
mod process;
mod shutdown;
mod supervisor;
mod tui;
mod view;

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::builder::styling::{AnsiColor, Effects, Style};
use clap::builder::Styles;
use clap::Parser;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use crate::app::{App, AppAction};
use crate::config::{ConfigError, Settings};
use crate::events::Event;
use crate::process::{ProcessConfig, SINGLE_PROCESS_NAME};
use crate::shutdown::ShutdownHooks;
use crate::supervisor::{Supervisor, DEFAULT_RESTART_DELAY};

const EVENT_CAPACITY: usize = 1024;
const TICK_RATE: Duration = Duration::from_millis(150);
const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_millis(2000);
// Events handled per redraw when output is flooding in.
const MAX_BATCH: usize = 512;
const LOG_ENV: &str = "LAZYDEV_LOG";

/// Command-line interface definition.
#[derive(Debug, Parser)]
#[command(
    name = "lazydev",
    version,
    about = "Run your dev processes side by side with a live log console",
    styles = help_styles(),
    color = clap::ColorChoice::Auto
)]
struct Cli {
    /// Run this command as a single process instead of reading a Procfile.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, value_name = "COMMAND")]
    command: Vec<String>,
    /// Procfile to read (default: Procfile, procfile or Procfile.dev in the current directory).
    #[arg(long)]
    procfile: Option<PathBuf>,
    /// Path to lazydev.toml settings file.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Ignore any lazydev.toml in the current directory.
    #[arg(long)]
    no_config: bool,
    /// Delay between kill and respawn on restart (ms).
    #[arg(long)]
    restart_delay_ms: Option<u64>,
    /// Time to wait after SIGTERM before force-killing on exit (ms).
    #[arg(long)]
    shutdown_grace_ms: Option<u64>,
    /// Write diagnostics to this file (filter with LAZYDEV_LOG).
    #[arg(long)]
    log_file: Option<PathBuf>,
    /// Use ASCII status symbols.
    #[arg(long)]
    ascii: bool,
}

/// Resolved run settings: CLI over lazydev.toml over defaults.
#[derive(Debug, Clone)]
struct RunSettings {
    restart_delay: Duration,
    shutdown_grace: Duration,
    log_file: Option<PathBuf>,
    use_symbols: bool,
}

impl RunSettings {
    fn resolve(cli: &Cli, file: &Settings) -> Self {
        Self {
            restart_delay: cli
                .restart_delay_ms
                .or(file.restart_delay_ms)
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_RESTART_DELAY),
            shutdown_grace: cli
                .shutdown_grace_ms
                .or(file.shutdown_grace_ms)
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_SHUTDOWN_GRACE),
            log_file: cli.log_file.clone().or_else(|| file.log_file.clone()),
            use_symbols: !cli.ascii && file.symbols.unwrap_or(true),
        }
    }
}

/// What to run and how.
#[derive(Debug)]
struct Setup {
    processes: Vec<ProcessConfig>,
    single: bool,
    settings: RunSettings,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cwd = std::env::current_dir().context("failed to resolve current directory")?;
    let setup = load_setup(&cli, &cwd)?;
    init_logging(setup.settings.log_file.as_deref())?;
    tracing::info!(
        processes = setup.processes.len(),
        single = setup.single,
        "starting lazydev"
    );

    let (event_tx, mut event_rx) = mpsc::channel(EVENT_CAPACITY);
    let hooks = ShutdownHooks::new();
    let mut supervisor = Supervisor::new(
        &setup.processes,
        event_tx.clone(),
        hooks.clone(),
        setup.settings.restart_delay,
    );
    let single_view = setup.single || setup.processes.len() == 1;
    let mut app = App::new(setup.processes.len(), single_view, setup.settings.use_symbols);

    let mut terminal = tui::init_terminal().context("failed to initialize terminal")?;
    supervisor.start_all();
    spawn_input_listener(event_tx.clone());
    spawn_signal_listener(event_tx, hooks.clone());

    let result = run(
        &mut terminal,
        &mut supervisor,
        &mut app,
        &mut event_rx,
        &hooks,
        setup.settings.shutdown_grace,
    )
    .await;

    if supervisor.has_live() {
        // Errors from the loop skip the staged shutdown.
        supervisor.shutdown();
        hooks.run_once();
        supervisor.force_kill_all();
    }
    tui::restore_terminal(terminal).context("failed to restore terminal")?;
    tracing::info!("exited");
    result
}

/// Drives the UI until quit or a signal, then stops every child.
async fn run(
    terminal: &mut tui::TuiTerminal,
    supervisor: &mut Supervisor,
    app: &mut App,
    event_rx: &mut mpsc::Receiver<Event>,
    hooks: &ShutdownHooks,
    grace: Duration,
) -> Result<()> {
    let mut ticker = tokio::time::interval(TICK_RATE);
    let mut stop_deadline: Option<Instant> = None;
    let mut drawn_revision = None;
    let mut needs_draw = true;

    loop {
        if needs_draw || drawn_revision != Some(supervisor.revision()) {
            app.sync(supervisor.processes());
            tui::draw(terminal, supervisor.processes(), app)?;
            drawn_revision = Some(supervisor.revision());
            needs_draw = false;
        }

        if let Some(deadline) = stop_deadline {
            if !supervisor.has_live() {
                tracing::info!("all processes stopped");
                break;
            }
            if Instant::now() >= deadline {
                tracing::warn!("shutdown grace period elapsed");
                supervisor.force_kill_all();
                break;
            }
        }

        tokio::select! {
            event = event_rx.recv() => {
                let Some(event) = event else { break };
                let mut next = Some(event);
                let mut handled = 0;
                while let Some(event) = next.take() {
                    needs_draw |= !matches!(event, Event::Process(_));
                    if let Some(stop) = handle_event(event, supervisor, app, hooks, stop_deadline.is_some()) {
                        stop_deadline = Some(match stop {
                            Stop::Graceful => Instant::now() + grace,
                            Stop::Now => Instant::now(),
                        });
                    }
                    handled += 1;
                    if handled < MAX_BATCH {
                        next = event_rx.try_recv().ok();
                    }
                }
            }
            _ = ticker.tick() => needs_draw = true,
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stop {
    Graceful,
    /// A second request while stopping skips the grace period.
    Now,
}

fn handle_event(
    event: Event,
    supervisor: &mut Supervisor,
    app: &mut App,
    hooks: &ShutdownHooks,
    stopping: bool,
) -> Option<Stop> {
    match event {
        Event::Process(update) => {
            supervisor.apply(update);
            None
        }
        Event::Resize => None,
        Event::Key(key) => {
            let action = app.handle_key(key, supervisor.processes());
            if stopping {
                return (action == AppAction::Quit).then_some(Stop::Now);
            }
            handle_app_action(action, supervisor, app, hooks)
        }
        Event::Shutdown { signal } => {
            tracing::info!(signal, "termination signal received");
            if stopping {
                return Some(Stop::Now);
            }
            begin_stop(supervisor, app, hooks);
            Some(Stop::Graceful)
        }
    }
}

fn handle_app_action(
    action: AppAction,
    supervisor: &mut Supervisor,
    app: &mut App,
    hooks: &ShutdownHooks,
) -> Option<Stop> {
    match action {
        AppAction::None => {}
        AppAction::Quit => {
            begin_stop(supervisor, app, hooks);
            return Some(Stop::Graceful);
        }
        AppAction::Kill(idx) => {
            if let Some(name) = process_name(supervisor, idx) {
                supervisor.kill(&name);
                app.set_status_message(format!("Killing {}", name));
            }
        }
        AppAction::KillAll => {
            supervisor.kill_all();
            app.set_status_warning("Killing all processes");
        }
        AppAction::Restart(idx) => {
            if let Some(name) = process_name(supervisor, idx) {
                supervisor.restart(&name);
                app.set_status_message(format!("Restarting {}", name));
            }
        }
        AppAction::RestartAll => {
            supervisor.restart_all();
            app.set_status_message("Restarting all processes");
        }
        AppAction::Clear(idx) => {
            if let Some(name) = process_name(supervisor, idx) {
                supervisor.clear_logs(&name);
                app.set_status_message(format!("Cleared logs of {}", name));
            }
        }
    }
    None
}

fn process_name(supervisor: &Supervisor, idx: usize) -> Option<String> {
    supervisor.processes().get(idx).map(|p| p.name.clone())
}

fn begin_stop(supervisor: &mut Supervisor, app: &mut App, hooks: &ShutdownHooks) {
    supervisor.shutdown();
    // Latch the hook so a later signal does not signal the groups again.
    hooks.run_once();
    app.set_status_warning("Stopping processes...");
}

fn load_setup(cli: &Cli, cwd: &Path) -> Result<Setup> {
    let settings_path = if cli.no_config {
        None
    } else {
        cli.config
            .clone()
            .or_else(|| config::default_settings_path(cwd))
    };
    let file = match &settings_path {
        Some(path) => config::load_settings(path)?,
        None => Settings::default(),
    };
    let settings = RunSettings::resolve(cli, &file);

    if !cli.command.is_empty() {
        let command = cli.command.join(" ");
        return Ok(Setup {
            processes: vec![ProcessConfig::new(SINGLE_PROCESS_NAME, command)],
            single: true,
            settings,
        });
    }

    let procfile = cli
        .procfile
        .clone()
        .or_else(|| file.procfile.clone())
        .or_else(|| config::find_procfile(cwd))
        .ok_or(ConfigError::NoProcesses)?;
    let processes = config::load_procfile(&procfile)?;
    Ok(Setup {
        processes,
        single: false,
        settings,
    })
}

// The UI owns the terminal, so diagnostics only go to a file when asked for.
fn init_logging(log_file: Option<&Path>) -> Result<()> {
    let Some(path) = log_file else {
        return Ok(());
    };
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open log file {}", path.display()))?;
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .try_init();
    Ok(())
}

fn spawn_input_listener(tx: mpsc::Sender<Event>) {
    std::thread::spawn(move || loop {
        if crossterm::event::poll(Duration::from_millis(100)).unwrap_or(false) {
            let event = match crossterm::event::read() {
                Ok(crossterm::event::Event::Key(key)) => Event::Key(key),
                Ok(crossterm::event::Event::Resize(_, _)) => Event::Resize,
                _ => continue,
            };
            if tx.blocking_send(event).is_err() {
                break;
            }
        } else if tx.is_closed() {
            break;
        }
    });
}

/// Runs the cleanup hook on SIGINT, SIGTERM or SIGHUP, then tells the loop.
fn spawn_signal_listener(tx: mpsc::Sender<Event>, hooks: ShutdownHooks) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let (mut sigint, mut sigterm, mut sighup) = match (
                signal(SignalKind::interrupt()),
                signal(SignalKind::terminate()),
                signal(SignalKind::hangup()),
            ) {
                (Ok(int), Ok(term), Ok(hup)) => (int, term, hup),
                _ => {
                    tracing::warn!("failed to install signal handlers");
                    return;
                }
            };
            loop {
                let signal = tokio::select! {
                    _ = sigint.recv() => "SIGINT",
                    _ = sigterm.recv() => "SIGTERM",
                    _ = sighup.recv() => "SIGHUP",
                };
                hooks.run_once();
                if tx.send(Event::Shutdown { signal }).await.is_err() {
                    break;
                }
            }
        }
        #[cfg(not(unix))]
        {
            while tokio::signal::ctrl_c().await.is_ok() {
                hooks.run_once();
                if tx.send(Event::Shutdown { signal: "CTRL_C" }).await.is_err() {
                    break;
                }
            }
        }
    });
}

fn help_styles() -> Styles {
    Styles::styled()
        .header(
            Style::new()
                .fg_color(Some(AnsiColor::Cyan.into()))
                .effects(Effects::BOLD),
        )
        .usage(
            Style::new()
                .fg_color(Some(AnsiColor::Green.into()))
                .effects(Effects::BOLD),
        )
        .literal(Style::new().fg_color(Some(AnsiColor::Yellow.into())))
        .placeholder(Style::new().fg_color(Some(AnsiColor::Magenta.into())))
}
