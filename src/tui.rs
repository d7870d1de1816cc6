use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, TryRecvError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use chrono::Local;
use crossterm::ExecutableCommand;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind};
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use miette::IntoDiagnostic;
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Alignment, Constraint, Direction, Layout};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};

use crate::app::{ProgressEvent, ProgressSink};
use crate::error::ListerError;

const EVENTS_MAX: usize = 8;
const LOGS_MAX: usize = 500;
const BAR_WIDTH: usize = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum View {
    Operational,
    Logs,
    Help,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Connect,
    Discover,
    Collect,
    Export,
    Done,
}

impl Phase {
    fn label(self) -> &'static str {
        match self {
            Phase::Connect => "Connect",
            Phase::Discover => "Discover",
            Phase::Collect => "Collect",
            Phase::Export => "Export",
            Phase::Done => "Done",
        }
    }
}

#[derive(Debug)]
struct DashboardState {
    harbor_url: String,
    harbor_version: Option<String>,
    phase: Phase,
    total_projects: usize,
    started_projects: usize,
    done_projects: usize,
    empty_projects: usize,
    repositories: usize,
    tags: usize,
    warnings: usize,
    events: VecDeque<String>,
    logs: VecDeque<String>,
    view: View,
    started: Instant,
}

impl DashboardState {
    fn apply(&mut self, event: ProgressEvent) {
        let line = match event {
            ProgressEvent::Connected { version } => {
                self.phase = Phase::Discover;
                let line = format!("connected, Harbor {version}");
                self.harbor_version = Some(version);
                line
            }
            ProgressEvent::ProjectsDiscovered { total } => {
                self.phase = if total == 0 {
                    Phase::Export
                } else {
                    Phase::Collect
                };
                self.total_projects = total;
                format!("{total} projects discovered")
            }
            ProgressEvent::ProjectStarted { project } => {
                self.started_projects += 1;
                format!("listing {project}")
            }
            ProgressEvent::ProjectFinished {
                project,
                repositories,
                tags,
            } => {
                self.done_projects += 1;
                self.repositories += repositories;
                self.tags += tags;
                if self.done_projects >= self.total_projects {
                    self.phase = Phase::Export;
                }
                format!("{project}: {repositories} repositories, {tags} tags")
            }
            ProgressEvent::ProjectEmpty { project } => {
                self.done_projects += 1;
                self.empty_projects += 1;
                if self.done_projects >= self.total_projects {
                    self.phase = Phase::Export;
                }
                format!("{project}: 0 repositories")
            }
            ProgressEvent::ProjectFailed { project, reason } => {
                self.done_projects += 1;
                self.warnings += 1;
                if self.done_projects >= self.total_projects {
                    self.phase = Phase::Export;
                }
                format!("warning: skipped project {project}: {reason}")
            }
            ProgressEvent::Warning { message } => {
                self.warnings += 1;
                format!("warning: {message}")
            }
            ProgressEvent::Exported { path } => {
                self.phase = Phase::Done;
                format!("saved {path}")
            }
        };
        push_bounded(&mut self.events, line.clone(), EVENTS_MAX);
        push_bounded(
            &mut self.logs,
            format!("[{}] {line}", Local::now().format("%H:%M:%S")),
            LOGS_MAX,
        );
    }

    fn percent(&self) -> u8 {
        match self.phase {
            Phase::Connect | Phase::Discover => 0,
            Phase::Export | Phase::Done => 100,
            Phase::Collect if self.total_projects == 0 => 100,
            Phase::Collect => ((self.done_projects * 100) / self.total_projects).min(100) as u8,
        }
    }
}

pub struct Tui {
    state: Arc<Mutex<DashboardState>>,
    cancelled: Arc<AtomicBool>,
    log_scroll: u16,
}

struct TuiProgress {
    state: Arc<Mutex<DashboardState>>,
    cancelled: Arc<AtomicBool>,
}

impl ProgressSink for TuiProgress {
    fn event(&self, event: ProgressEvent) {
        if let Ok(mut state) = self.state.lock() {
            state.apply(event);
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl Tui {
    pub fn new(harbor_url: &str) -> Self {
        Self {
            state: Arc::new(Mutex::new(DashboardState {
                harbor_url: harbor_url.to_string(),
                harbor_version: None,
                phase: Phase::Connect,
                total_projects: 0,
                started_projects: 0,
                done_projects: 0,
                empty_projects: 0,
                repositories: 0,
                tags: 0,
                warnings: 0,
                events: VecDeque::new(),
                logs: VecDeque::new(),
                view: View::Operational,
                started: Instant::now(),
            })),
            cancelled: Arc::new(AtomicBool::new(false)),
            log_scroll: 0,
        }
    }

    /// Runs `f` on a background thread while the dashboard renders its progress.
    pub fn run<F, R>(&mut self, f: F) -> miette::Result<R>
    where
        F: FnOnce(&dyn ProgressSink) -> Result<R, ListerError> + Send + 'static,
        R: Send + 'static,
    {
        let mut stdout = io::stdout();
        enable_raw_mode().into_diagnostic()?;
        stdout.execute(EnterAlternateScreen).into_diagnostic()?;

        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend).into_diagnostic()?;
        terminal.clear().into_diagnostic()?;

        let (tx, rx) = std::sync::mpsc::channel();
        let sink = TuiProgress {
            state: self.state.clone(),
            cancelled: self.cancelled.clone(),
        };
        let handle = thread::spawn(move || tx.send(f(&sink)));

        let mut tick = 0usize;
        loop {
            if let Ok(state) = self.state.lock() {
                let scroll = self.log_scroll;
                terminal
                    .draw(|frame| draw_ui(frame, &state, scroll, tick))
                    .into_diagnostic()?;
            }

            if let Some(result) = poll_job(&rx) {
                restore_terminal()?;
                handle.join().ok();
                return result.map_err(miette::Report::new);
            }

            if event::poll(Duration::from_millis(120)).into_diagnostic()? {
                if let Event::Key(key) = event::read().into_diagnostic()? {
                    if self.handle_key(key) {
                        break;
                    }
                }
            }

            tick = tick.wrapping_add(1);
        }

        self.cancelled.store(true, Ordering::SeqCst);
        let saving = self
            .state
            .lock()
            .map(|state| matches!(state.phase, Phase::Export | Phase::Done))
            .unwrap_or(false);
        restore_terminal()?;
        if saving {
            // Let an in-progress save finish or back out before the process exits.
            handle.join().ok();
            if let Ok(Ok(result)) = rx.try_recv() {
                return Ok(result);
            }
        }
        Err(miette::Report::new(ListerError::Aborted))
    }

    fn handle_key(&mut self, key: KeyEvent) -> bool {
        if key.kind != KeyEventKind::Press {
            return false;
        }
        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => return true,
            KeyCode::F(1) | KeyCode::Char('?') => self.toggle_view(View::Help),
            KeyCode::F(4) | KeyCode::Char('l') => self.toggle_view(View::Logs),
            KeyCode::PageUp | KeyCode::Up => self.scroll_logs(5),
            KeyCode::PageDown | KeyCode::Down => self.scroll_logs(-5),
            _ => {}
        }
        false
    }

    fn toggle_view(&self, view: View) {
        if let Ok(mut state) = self.state.lock() {
            state.view = if state.view == view {
                View::Operational
            } else {
                view
            };
        }
    }

    fn scroll_logs(&mut self, delta: i16) {
        let max = self.state.lock().map(|state| state.logs.len()).unwrap_or(0);
        let max_scroll = max.saturating_sub(1) as i16;
        let next = (self.log_scroll as i16 + delta).clamp(0, max_scroll);
        self.log_scroll = next as u16;
    }
}

/// `None` while the job is still running.
fn poll_job<R>(rx: &Receiver<Result<R, ListerError>>) -> Option<Result<R, ListerError>> {
    match rx.try_recv() {
        Ok(result) => Some(result),
        Err(TryRecvError::Empty) => None,
        Err(TryRecvError::Disconnected) => Some(Err(ListerError::Worker(
            "background job stopped without a result".to_string(),
        ))),
    }
}

fn restore_terminal() -> miette::Result<()> {
    disable_raw_mode().into_diagnostic()?;
    let mut stdout = io::stdout();
    stdout.execute(LeaveAlternateScreen).into_diagnostic()?;
    Ok(())
}

fn draw_ui(frame: &mut ratatui::Frame, state: &DashboardState, scroll: u16, tick: usize) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(8),
            Constraint::Length(2),
        ])
        .split(frame.area());

    frame.render_widget(draw_header(state, tick), chunks[0]);
    match state.view {
        View::Operational => {
            let main = Layout::default()
                .direction(Direction::Horizontal)
                .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
                .split(chunks[1]);
            frame.render_widget(draw_status_panel(state), main[0]);
            frame.render_widget(draw_events_panel(state), main[1]);
        }
        View::Logs => frame.render_widget(draw_logs_view(state, scroll), chunks[1]),
        View::Help => frame.render_widget(draw_help(), chunks[1]),
    }
    frame.render_widget(draw_footer(), chunks[2]);
}

fn draw_header(state: &DashboardState, tick: usize) -> Paragraph<'static> {
    let hb = if tick % 2 == 0 { "*" } else { " " };
    let version = state
        .harbor_version
        .clone()
        .unwrap_or_else(|| "connecting".to_string());
    let title = Line::from(vec![
        Span::styled(
            "HARBOR-LISTER",
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw(" "),
        Span::styled(env!("CARGO_PKG_VERSION"), Style::default().fg(Color::Gray)),
        Span::raw("   "),
        Span::styled(hb, Style::default().fg(Color::Green)),
    ]);
    let target = Line::from(vec![
        Span::styled("Registry: ", Style::default().fg(Color::Gray)),
        Span::raw(state.harbor_url.clone()),
        Span::styled("   Harbor: ", Style::default().fg(Color::Gray)),
        Span::raw(version),
    ]);
    Paragraph::new(vec![title, target])
        .alignment(Alignment::Left)
        .block(Block::default().borders(Borders::BOTTOM))
}

fn draw_status_panel(state: &DashboardState) -> Paragraph<'static> {
    let percent = state.percent();
    let phase_color = match state.phase {
        Phase::Done => Color::Green,
        _ => Color::Cyan,
    };
    let warn_color = if state.warnings > 0 {
        Color::Yellow
    } else {
        Color::Gray
    };
    let elapsed = state.started.elapsed().as_secs();
    let lines = vec![
        Line::from(Span::styled(
            "STATUS / PROGRESS",
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        )),
        Line::from(vec![
            Span::styled("Phase: ", Style::default().fg(Color::Gray)),
            Span::styled(
                format!("{:<8} ", state.phase.label()),
                Style::default().fg(phase_color),
            ),
            Span::raw(progress_bar(percent)),
            Span::raw(format!(" {percent:>3}%")),
        ]),
        Line::from(vec![
            Span::styled("Projects: ", Style::default().fg(Color::Gray)),
            Span::raw(format!(
                "{}/{} done, {} in flight, {} empty",
                state.done_projects,
                state.total_projects,
                state.started_projects.saturating_sub(state.done_projects),
                state.empty_projects
            )),
        ]),
        Line::from(vec![
            Span::styled("Repositories: ", Style::default().fg(Color::Gray)),
            Span::raw(state.repositories.to_string()),
            Span::styled("   Tags: ", Style::default().fg(Color::Gray)),
            Span::raw(state.tags.to_string()),
        ]),
        Line::from(vec![
            Span::styled("Warnings: ", Style::default().fg(Color::Gray)),
            Span::styled(state.warnings.to_string(), Style::default().fg(warn_color)),
            Span::styled("   Elapsed: ", Style::default().fg(Color::Gray)),
            Span::raw(format!("{:02}:{:02}", elapsed / 60, elapsed % 60)),
        ]),
    ];
    Paragraph::new(lines)
        .block(Block::default().borders(Borders::RIGHT))
        .wrap(Wrap { trim: true })
}

fn draw_events_panel(state: &DashboardState) -> Paragraph<'static> {
    let mut lines = vec![Line::from(Span::styled(
        "RECENT EVENTS",
        Style::default()
            .fg(Color::Cyan)
            .add_modifier(Modifier::BOLD),
    ))];
    for event in state.events.iter().rev() {
        let style = if event.starts_with("warning:") {
            Style::default().fg(Color::Yellow)
        } else {
            Style::default()
        };
        lines.push(Line::from(Span::styled(format!("- {event}"), style)));
    }
    Paragraph::new(lines).wrap(Wrap { trim: true })
}

fn draw_logs_view(state: &DashboardState, scroll: u16) -> Paragraph<'static> {
    let total = state.logs.len();
    let visible = 15usize;
    let start = total.saturating_sub(scroll as usize + visible);
    let mut lines = Vec::with_capacity(visible + 1);
    lines.push(Line::from(Span::styled(
        "LOGS (PgUp/PgDown to scroll)",
        Style::default()
            .fg(Color::Cyan)
            .add_modifier(Modifier::BOLD),
    )));
    for line in state.logs.iter().skip(start).take(visible) {
        lines.push(Line::from(line.clone()));
    }
    Paragraph::new(lines).wrap(Wrap { trim: true })
}

fn draw_help() -> Paragraph<'static> {
    let lines = vec![
        Line::from(Span::styled(
            "HELP",
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        )),
        Line::from("q / Esc      abort the run (no workbook is written)"),
        Line::from("l / F4       toggle the log view"),
        Line::from("? / F1       toggle this help"),
        Line::from("PgUp/PgDown  scroll logs"),
    ];
    Paragraph::new(lines).wrap(Wrap { trim: true })
}

fn draw_footer() -> Paragraph<'static> {
    Paragraph::new(Line::from(Span::styled(
        "q quit  l logs  ? help",
        Style::default().fg(Color::DarkGray),
    )))
    .block(Block::default().borders(Borders::TOP))
}

fn progress_bar(percent: u8) -> String {
    let filled = (percent as usize * BAR_WIDTH) / 100;
    let mut out = String::from("[");
    for i in 0..BAR_WIDTH {
        out.push(if i < filled { '#' } else { '.' });
    }
    out.push(']');
    out
}

fn push_bounded(buffer: &mut VecDeque<String>, item: String, max: usize) {
    buffer.push_back(item);
    while buffer.len() > max {
        buffer.pop_front();
    }
}
