//! Terminal setup and drawing.
//!
//! Everything shown is decided by `view::build_screen`; this module only lays the
//! screen out with `ratatui` and styles it.

use std::io::{self, Stdout};

use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen, SetTitle,
};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::block::{Position, Title};
use ratatui::widgets::{Block, BorderType, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap};
use ratatui::{Frame, Terminal};

use crate::app::{App, Panel, StatusLevel};
use crate::output::LogLevel;
use crate::process::{Process, ProcessStatus};
use crate::view::{build_screen, shows_process_list, Screen};

pub type TuiTerminal = Terminal<CrosstermBackend<Stdout>>;

const PROCESS_LIST_WIDTH: u16 = 30;

/// Enables raw mode and enters the alternate screen.
pub fn init_terminal() -> io::Result<TuiTerminal> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    Terminal::new(CrosstermBackend::new(stdout))
}

/// Undoes `init_terminal`.
pub fn restore_terminal(mut terminal: TuiTerminal) -> io::Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

/// Draws the current snapshot. Records the console height in `app` for paging.
pub fn draw(terminal: &mut TuiTerminal, processes: &[Process], app: &mut App) -> io::Result<()> {
    let mut title = None;
    terminal.draw(|frame| {
        let areas = split(frame.size(), shows_process_list(processes, app));
        app.console_height = areas.console.height.saturating_sub(2) as usize;
        let screen = build_screen(processes, app, app.console_height);
        render(frame, &screen, &areas);
        title = Some(screen.title);
    })?;
    if let Some(title) = title {
        execute!(terminal.backend_mut(), SetTitle(title))?;
    }
    Ok(())
}

struct Areas {
    full: Rect,
    processes: Option<Rect>,
    console: Rect,
    status: Rect,
}

fn split(area: Rect, with_list: bool) -> Areas {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(3), Constraint::Length(1)])
        .split(area);
    if !with_list {
        return Areas {
            full: area,
            processes: None,
            console: vertical[0],
            status: vertical[1],
        };
    }
    let main = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Length(PROCESS_LIST_WIDTH), Constraint::Min(20)])
        .split(vertical[0]);
    Areas {
        full: area,
        processes: Some(main[0]),
        console: main[1],
        status: vertical[1],
    }
}

fn render(frame: &mut Frame, screen: &Screen, areas: &Areas) {
    if let (true, Some(area)) = (screen.show_process_list, areas.processes) {
        render_processes(frame, screen, area);
    }
    render_console(frame, screen, areas.console);
    render_status(frame, screen, areas.status);

    if let Some(detail) = &screen.detail {
        let popup = centered_rect(70, 70, areas.full);
        let text = Text::from(detail.iter().map(|line| Line::raw(line.clone())).collect::<Vec<_>>());
        let block = panel_block("Log entry (Esc to close)", true);
        frame.render_widget(Clear, popup);
        frame.render_widget(Paragraph::new(text).block(block).wrap(Wrap { trim: false }), popup);
    }

    if let Some(help) = &screen.help {
        let popup = centered_rect(50, 60, areas.full);
        let lines: Vec<Line> = help
            .iter()
            .map(|(key, action)| {
                Line::from(vec![
                    Span::styled(format!("  {:<16}", key), Style::default().fg(Color::Yellow)),
                    Span::raw(*action),
                ])
            })
            .collect();
        frame.render_widget(Clear, popup);
        frame.render_widget(Paragraph::new(lines).block(panel_block("Help", true)), popup);
    }
}

fn render_processes(frame: &mut Frame, screen: &Screen, area: Rect) {
    let active = screen.active_panel == Panel::Processes;
    let items: Vec<ListItem> = screen
        .process_rows
        .iter()
        .map(|row| {
            let name_style = if row.selected {
                Style::default().add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(Color::Gray)
            };
            ListItem::new(Line::from(vec![
                Span::styled(format!("{} ", row.icon), status_style(row.status)),
                Span::styled(row.name.clone(), name_style),
                Span::styled(format!(" {}", row.detail), Style::default().fg(Color::DarkGray)),
            ]))
        })
        .collect();
    let list = List::new(items)
        .block(panel_block("Processes [1]", active))
        .highlight_style(selection_style(active));
    frame.render_stateful_widget(
        list,
        area,
        &mut list_state(Some(screen.selected_process), screen.process_rows.len()),
    );
}

fn render_console(frame: &mut Frame, screen: &Screen, area: Rect) {
    let active = screen.active_panel == Panel::Console;
    let mut block = panel_block(&format!("{} [2]", screen.console_title), active);
    if !screen.console_footer.is_empty() {
        block = block.title(
            Title::from(format!(" {} ", screen.console_footer))
                .position(Position::Bottom)
                .alignment(Alignment::Right),
        );
    }

    if let Some(placeholder) = screen.placeholder {
        let paragraph = Paragraph::new(placeholder)
            .style(Style::default().fg(Color::DarkGray))
            .block(block);
        frame.render_widget(paragraph, area);
        return;
    }

    let items: Vec<ListItem> = screen
        .console_rows
        .iter()
        .map(|row| {
            let level = level_style(row.level);
            let mut message = if row.stderr && row.level == LogLevel::Info {
                Style::default().fg(Color::LightRed)
            } else {
                level
            };
            if row.selected {
                message = message.add_modifier(Modifier::BOLD);
            }
            ListItem::new(Line::from(vec![
                Span::styled(format!("{} ", row.time), Style::default().fg(Color::DarkGray)),
                Span::styled(format!("{} ", row.icon), level),
                Span::styled(row.message.clone(), message),
            ]))
        })
        .collect();
    let list = List::new(items)
        .block(block)
        .highlight_style(selection_style(active));
    frame.render_stateful_widget(
        list,
        area,
        &mut list_state(screen.console_cursor, screen.console_rows.len()),
    );
}

fn render_status(frame: &mut Frame, screen: &Screen, area: Rect) {
    let line = match &screen.status_message {
        Some((text, StatusLevel::Warning)) => {
            Line::from(Span::styled(text.clone(), Style::default().fg(Color::Yellow)))
        }
        Some((text, StatusLevel::Info)) => {
            Line::from(Span::styled(text.clone(), Style::default().fg(Color::Cyan)))
        }
        None => Line::from(Span::styled(
            screen.status_bar.clone(),
            Style::default().fg(Color::DarkGray),
        )),
    };
    frame.render_widget(Paragraph::new(line), area);
}

fn panel_block(title: &str, active: bool) -> Block<'static> {
    let border = if active {
        Style::default().fg(Color::Cyan)
    } else {
        Style::default().fg(Color::DarkGray)
    };
    Block::default()
        .title(title.to_string())
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(border)
}

fn selection_style(active: bool) -> Style {
    if active {
        Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD)
    } else {
        Style::default().add_modifier(Modifier::BOLD)
    }
}

fn list_state(selected: Option<usize>, len: usize) -> ListState {
    let mut state = ListState::default();
    if len > 0 {
        state.select(selected.map(|idx| idx.min(len - 1)));
    }
    state
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

fn status_style(status: ProcessStatus) -> Style {
    match status {
        ProcessStatus::Idle => Style::default().fg(Color::DarkGray),
        ProcessStatus::Running => Style::default().fg(Color::Green),
        ProcessStatus::Exited => Style::default().fg(Color::Gray),
        ProcessStatus::Failed(_) => Style::default().fg(Color::Red),
    }
}

fn level_style(level: LogLevel) -> Style {
    match level {
        LogLevel::Error => Style::default().fg(Color::Red),
        LogLevel::Warn => Style::default().fg(Color::Yellow),
        LogLevel::Info => Style::default(),
        LogLevel::Debug => Style::default().fg(Color::DarkGray),
    }
}
