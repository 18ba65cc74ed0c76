use std::collections::VecDeque;
use std::io;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crossterm::ExecutableCommand;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind};
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use miette::IntoDiagnostic;
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{BarChart, Block, Borders, Gauge, Paragraph, Sparkline, Wrap};

use crate::aggregate::{
    COMPLETION_GOAL, build_category_progress, hardest_completions, placement_histogram,
    rolling_placement, summarize,
};
use crate::domain::{MAX_PLACEMENT, RecordSet};
use crate::error::ArenaError;
use crate::sync::{ProgressEvent, ProgressSink, SyncGeneration, SyncPhase};

const EVENTS_MAX: usize = 8;
const HARDEST_SHOWN: usize = 8;
const RECENT_SHOWN: usize = 12;

#[derive(Debug)]
struct AppState {
    player: String,
    status: String,
    phase: SyncPhase,
    records: RecordSet,
    fetched: usize,
    total: usize,
    events: VecDeque<String>,
    started: Instant,
    active: bool,
}

impl AppState {
    fn new(player: String) -> Self {
        Self {
            player,
            status: "Starting...".to_string(),
            phase: SyncPhase::Idle,
            records: RecordSet::default(),
            fetched: 0,
            total: 0,
            events: VecDeque::new(),
            started: Instant::now(),
            active: false,
        }
    }
}

/// Full-screen dashboard. Syncs run on a worker thread and report through
/// [`TuiProgress`]; the main thread only renders.
pub struct Tui {
    state: Arc<Mutex<AppState>>,
    generation: SyncGeneration,
    rolling_window: usize,
}

struct TuiProgress {
    state: Arc<Mutex<AppState>>,
}

impl ProgressSink for TuiProgress {
    fn event(&self, event: ProgressEvent) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        match event {
            ProgressEvent::Phase(phase) => {
                if phase != SyncPhase::Idle {
                    push_event(&mut state.events, format!("[{}] {phase}", timestamp()));
                }
                if let SyncPhase::Failed { reason } = &phase {
                    state.status = reason.clone();
                }
                state.phase = phase;
            }
            ProgressEvent::Status(message) => state.status = message,
            ProgressEvent::Preview {
                records,
                fetched,
                total,
            } => {
                state.records = records;
                state.fetched = fetched;
                state.total = total;
            }
        }
    }
}

impl Tui {
    pub fn new(
        player: impl Into<String>,
        generation: SyncGeneration,
        rolling_window: usize,
    ) -> Self {
        Self {
            state: Arc::new(Mutex::new(AppState::new(player.into()))),
            generation,
            rolling_window,
        }
    }

    /// Runs `f` on a worker thread while drawing its progress. Pressing `q`
    /// supersedes the running sync so its result is never committed.
    pub fn run<F, R>(&mut self, f: F) -> miette::Result<R>
    where
        F: FnOnce(&dyn ProgressSink) -> Result<R, ArenaError> + Send + 'static,
        R: Send + 'static,
    {
        self.set_active(true);

        let mut stdout = io::stdout();
        enable_raw_mode().into_diagnostic()?;
        stdout.execute(EnterAlternateScreen).into_diagnostic()?;

        let backend = CrosstermBackend::new(stdout);
        let mut terminal = match Terminal::new(backend) {
            Ok(terminal) => terminal,
            Err(err) => {
                restore_terminal()?;
                return Err(err).into_diagnostic();
            }
        };

        let (tx, rx) = mpsc::channel();
        let sink = TuiProgress {
            state: self.state.clone(),
        };
        let handle = thread::spawn(move || tx.send(f(&sink)));

        let outcome = self.drive(&mut terminal, &rx);
        if !matches!(outcome, Ok(Some(_))) {
            self.generation.supersede();
        }
        self.set_active(false);
        restore_terminal()?;

        match outcome? {
            Some(result) => {
                handle.join().ok();
                result.map_err(miette::Report::new)
            }
            None => Err(miette::Report::msg("aborted")),
        }
    }

    /// Draws until the worker reports back or the user quits. `None` means
    /// the user quit first.
    fn drive<R>(
        &self,
        terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
        rx: &Receiver<R>,
    ) -> miette::Result<Option<R>> {
        terminal.clear().into_diagnostic()?;
        let mut tick = 0usize;
        loop {
            if let Ok(state) = self.state.lock() {
                terminal
                    .draw(|frame| draw_ui(frame, &state, self.rolling_window, tick))
                    .into_diagnostic()?;
            }

            if let Some(result) = poll_worker(rx)? {
                return Ok(Some(result));
            }

            if event::poll(Duration::from_millis(120)).into_diagnostic()? {
                if let Event::Key(key) = event::read().into_diagnostic()? {
                    if is_quit(key) {
                        return Ok(None);
                    }
                }
            }

            tick = tick.wrapping_add(1);
        }
    }

    /// Shows the final dashboard for `records` until a key is pressed.
    pub fn show(&mut self, records: &RecordSet, status: &str) -> miette::Result<()> {
        if let Ok(mut state) = self.state.lock() {
            state.records = records.clone();
            state.status = status.to_string();
            state.fetched = 0;
            state.total = 0;
        }

        let mut stdout = io::stdout();
        enable_raw_mode().into_diagnostic()?;
        stdout.execute(EnterAlternateScreen).into_diagnostic()?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend).into_diagnostic()?;

        loop {
            if let Ok(state) = self.state.lock() {
                terminal
                    .draw(|frame| draw_ui(frame, &state, self.rolling_window, 0))
                    .into_diagnostic()?;
            }
            if event::poll(Duration::from_millis(200)).into_diagnostic()? {
                if let Event::Key(key) = event::read().into_diagnostic()? {
                    if key.kind == KeyEventKind::Press {
                        break;
                    }
                }
            }
        }

        restore_terminal()
    }

    pub fn confirm_clear(&mut self, player: &str) -> miette::Result<bool> {
        let mut stdout = io::stdout();
        enable_raw_mode().into_diagnostic()?;
        stdout.execute(EnterAlternateScreen).into_diagnostic()?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend).into_diagnostic()?;

        let confirmed = loop {
            terminal
                .draw(|frame| {
                    let block = Block::default().borders(Borders::ALL).title("Confirm");
                    let text = Paragraph::new(vec![
                        Line::from(format!("Clear cached Arena matches for {player}?")),
                        Line::from("Press y to confirm, n to cancel."),
                    ])
                    .alignment(Alignment::Center)
                    .block(block);
                    frame.render_widget(text, frame.area());
                })
                .into_diagnostic()?;

            if event::poll(Duration::from_millis(100)).into_diagnostic()? {
                if let Event::Key(key) = event::read().into_diagnostic()? {
                    match key.code {
                        KeyCode::Char('y') | KeyCode::Char('Y') => break true,
                        KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => break false,
                        _ => {}
                    }
                }
            }
        };

        restore_terminal()?;
        Ok(confirmed)
    }

    fn set_active(&self, active: bool) {
        if let Ok(mut state) = self.state.lock() {
            state.active = active;
            if active {
                state.started = Instant::now();
            }
        }
    }
}

fn restore_terminal() -> miette::Result<()> {
    disable_raw_mode().into_diagnostic()?;
    io::stdout()
        .execute(LeaveAlternateScreen)
        .into_diagnostic()?;
    Ok(())
}

/// A worker that hung up without sending (it panicked) is an error.
fn poll_worker<R>(rx: &Receiver<R>) -> miette::Result<Option<R>> {
    match rx.try_recv() {
        Ok(result) => Ok(Some(result)),
        Err(TryRecvError::Empty) => Ok(None),
        Err(TryRecvError::Disconnected) => {
            Err(miette::Report::msg("sync worker stopped without a result"))
        }
    }
}

fn is_quit(key: KeyEvent) -> bool {
    key.kind == KeyEventKind::Press && matches!(key.code, KeyCode::Char('q') | KeyCode::Esc)
}

fn draw_ui(frame: &mut ratatui::Frame, state: &AppState, window: usize, tick: usize) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(3),
            Constraint::Min(10),
            Constraint::Length(EVENTS_MAX as u16 / 2 + 2),
        ])
        .split(frame.area());

    frame.render_widget(draw_header(state, tick), rows[0]);
    frame.render_widget(draw_progress(state), rows[1]);
    draw_body(frame, state, window, rows[2]);
    frame.render_widget(draw_events(state), rows[3]);
}

fn draw_header(state: &AppState, tick: usize) -> Paragraph<'static> {
    let hb = if state.active && tick % 2 == 0 { "*" } else { " " };
    let phase_color = match state.phase {
        SyncPhase::Failed { .. } => Color::Red,
        SyncPhase::Persisted | SyncPhase::Idle => Color::Green,
        _ => Color::Cyan,
    };
    let line = Line::from(vec![
        Span::styled(
            "ARENA-TRACKER",
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw(" "),
        Span::styled(env!("CARGO_PKG_VERSION"), Style::default().fg(Color::Gray)),
        Span::raw("   Player: "),
        Span::styled(state.player.clone(), Style::default().fg(Color::White)),
        Span::raw("   Phase: "),
        Span::styled(state.phase.label(), Style::default().fg(phase_color)),
        Span::raw(format!("   {}s ", state.started.elapsed().as_secs())),
        Span::styled(hb, Style::default().fg(Color::Green)),
    ]);
    let status = Line::from(Span::styled(
        state.status.clone(),
        Style::default().fg(Color::Gray),
    ));
    Paragraph::new(vec![line, status]).block(Block::default().borders(Borders::BOTTOM))
}

fn draw_progress(state: &AppState) -> Gauge<'static> {
    let ratio = if state.total == 0 {
        if state.active { 0.0 } else { 1.0 }
    } else {
        (state.fetched as f64 / state.total as f64).clamp(0.0, 1.0)
    };
    let label = if state.total == 0 {
        format!("{} matches", state.records.len())
    } else {
        format!("{}/{} details", state.fetched, state.total)
    };
    Gauge::default()
        .block(Block::default().borders(Borders::ALL).title("Progress"))
        .gauge_style(Style::default().fg(Color::Cyan))
        .ratio(ratio)
        .label(label)
}

fn draw_body(frame: &mut ratatui::Frame, state: &AppState, window: usize, area: Rect) {
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(area);
    let left = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(4), Constraint::Min(4)])
        .split(columns[0]);
    let right = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
        .split(columns[1]);

    let records = state.records.records();
    let progress = build_category_progress(records);
    let summary = summarize(records, &progress);

    let average = summary
        .average_placement
        .map(|avg| format!("{avg:.2}"))
        .unwrap_or_else(|| "--".to_string());
    let summary_text = Paragraph::new(vec![
        Line::from(format!(
            "Games: {}   Avg place: {average}",
            summary.total_games
        )),
        Line::from(format!(
            "Arena God: {}/{COMPLETION_GOAL} champions won ({} to go)",
            summary.completed_categories, summary.remaining_to_goal
        )),
    ])
    .block(Block::default().borders(Borders::ALL).title("Summary"));
    frame.render_widget(summary_text, left[0]);

    let mut lines = vec![Line::from(Span::styled(
        "Hardest wins",
        Style::default().add_modifier(Modifier::BOLD),
    ))];
    for entry in hardest_completions(&progress, HARDEST_SHOWN) {
        lines.push(Line::from(format!(
            "{:<14} {} tries",
            entry.category,
            entry.attempts_until_success.unwrap_or_default()
        )));
    }
    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled(
        "Recent",
        Style::default().add_modifier(Modifier::BOLD),
    )));
    for record in records.iter().take(RECENT_SHOWN) {
        let place = record
            .placement
            .map(|p| format!("#{p}"))
            .unwrap_or_else(|| "#?".to_string());
        let color = if record.is_first() {
            Color::Yellow
        } else {
            Color::White
        };
        lines.push(Line::from(vec![
            Span::styled(format!("{place:<3} "), Style::default().fg(color)),
            Span::raw(format!("{:<14} {}", record.champion, record.kda())),
        ]));
    }
    frame.render_widget(
        Paragraph::new(lines)
            .block(Block::default().borders(Borders::ALL).title("Champions"))
            .wrap(Wrap { trim: true }),
        left[1],
    );

    let counts = placement_histogram(records);
    let labels: Vec<String> = (1..=MAX_PLACEMENT).map(|p| p.to_string()).collect();
    let bars: Vec<(&str, u64)> = labels
        .iter()
        .zip(counts)
        .map(|(label, count)| (label.as_str(), u64::from(count)))
        .collect();
    let chart = BarChart::default()
        .block(Block::default().borders(Borders::ALL).title("Placements"))
        .data(bars.as_slice())
        .bar_width(3)
        .bar_gap(1)
        .bar_style(Style::default().fg(Color::Cyan))
        .value_style(Style::default().fg(Color::Black).bg(Color::Cyan));
    frame.render_widget(chart, right[0]);

    // Inverted so a better (lower) average draws a taller bar.
    let trend: Vec<u64> = rolling_placement(records, window)
        .into_iter()
        .map(|avg| ((f64::from(MAX_PLACEMENT) + 1.0 - avg) * 10.0).round() as u64)
        .collect();
    let sparkline = Sparkline::default()
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!("Rolling placement ({window})")),
        )
        .data(trend.iter().copied())
        .style(Style::default().fg(Color::Green));
    frame.render_widget(sparkline, right[1]);
}

fn draw_events(state: &AppState) -> Paragraph<'static> {
    let lines: Vec<Line> = state
        .events
        .iter()
        .rev()
        .take(EVENTS_MAX / 2)
        .map(|event| Line::from(event.clone()))
        .collect();
    Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .title("Events (q to quit)"),
    )
}

fn push_event(buffer: &mut VecDeque<String>, item: String) {
    buffer.push_back(item);
    while buffer.len() > EVENTS_MAX {
        buffer.pop_front();
    }
}

fn timestamp() -> String {
    chrono::Local::now().format("%H:%M:%S").to_string()
}
