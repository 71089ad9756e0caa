use std::collections::VecDeque;
use std::io;
use std::time::Duration;

use anyhow::Result;
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::terminal::{self, EnterAlternateScreen, LeaveAlternateScreen};
use crossterm::{cursor, execute};
use ratatui::Frame;
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Gauge, Paragraph};
use tilenet::{
    FrameControl, LevelStatus, NetResult, NetworkStats, Session, SessionConfig, SlotInfo,
    SlotStatus, WaitStage,
};

use crate::play::{self, Clock, RunLimit};

const MAX_LOG_LINES: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LogLevel {
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone)]
struct LogEntry {
    level: LogLevel,
    text: String,
}

#[derive(Debug, Default)]
pub struct TuiState {
    logs: VecDeque<LogEntry>,
    scroll: usize,
    selected_slot: usize,
    pending_kick: Option<u8>,
}

impl TuiState {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, level: LogLevel, text: String) {
        if self.logs.len() == MAX_LOG_LINES {
            self.logs.pop_front();
        }
        self.logs.push_back(LogEntry { level, text });
    }

    pub fn log_info(&mut self, text: impl Into<String>) {
        self.push(LogLevel::Info, text.into());
    }

    pub fn log_warn(&mut self, text: impl Into<String>) {
        self.push(LogLevel::Warn, text.into());
    }

    pub fn log_error(&mut self, text: impl Into<String>) {
        self.push(LogLevel::Error, text.into());
    }

    pub fn scroll_up(&mut self) {
        self.scroll = (self.scroll + 5).min(self.logs.len().saturating_sub(1));
    }

    pub fn scroll_down(&mut self) {
        self.scroll = self.scroll.saturating_sub(5);
    }

    pub fn select_prev_slot(&mut self) {
        self.selected_slot = self.selected_slot.saturating_sub(1);
    }

    pub fn select_next_slot(&mut self, count: usize) {
        if self.selected_slot + 1 < count {
            self.selected_slot += 1;
        }
    }

    pub fn request_kick(&mut self, slots: &[SlotInfo]) {
        if let Some(slot) = slots.get(self.selected_slot) {
            if slot.status != SlotStatus::NotConnected {
                self.pending_kick = Some(slot.id);
            }
        }
    }

    pub fn take_pending_kick(&mut self) -> Option<u8> {
        self.pending_kick.take()
    }
}

pub struct Tui {
    terminal: Terminal<CrosstermBackend<io::Stdout>>,
    state: TuiState,
}

impl Tui {
    pub fn new() -> io::Result<Self> {
        terminal::enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen, cursor::Hide)?;

        let backend = CrosstermBackend::new(stdout);
        let terminal = Terminal::new(backend)?;

        Ok(Self {
            terminal,
            state: TuiState::new(),
        })
    }

    pub fn restore(mut self) -> io::Result<()> {
        terminal::disable_raw_mode()?;
        execute!(self.terminal.backend_mut(), LeaveAlternateScreen, cursor::Show)?;
        Ok(())
    }

    pub fn state_mut(&mut self) -> &mut TuiState {
        &mut self.state
    }

    /// Joins a host while showing the wait screen. Esc cancels, q quits.
    pub fn join(&mut self, config: SessionConfig, address: &str, clock: Clock) -> NetResult<Session> {
        let frame_ms = config.timings.frame;
        let terminal = &mut self.terminal;

        let mut driver = |stage: WaitStage| {
            if terminal.draw(|frame| render_wait(frame, address, stage)).is_err() {
                return FrameControl::Quit;
            }
            match poll_key(Duration::from_millis(frame_ms.into())) {
                Ok(Some(KeyCode::Esc)) => FrameControl::Cancel,
                Ok(Some(KeyCode::Char('q'))) | Err(_) => FrameControl::Quit,
                Ok(_) => FrameControl::Continue(clock.ticks()),
            }
        };
        Session::join(config, address, &mut driver)
    }

    /// Runs a host or client session until quit, the limit, or the end of
    /// the game.
    pub fn run(&mut self, session: &mut Session, clock: Clock, limit: RunLimit) -> Result<()> {
        let frame_ms = match &*session {
            Session::Host(_) => 1,
            _ => 10,
        };
        let mut running = true;

        while running && !limit.expired() {
            let report = match play::advance(session, &clock) {
                Ok(report) => report,
                Err(e) => {
                    self.state.log_error(format!("Session error: {}", e));
                    break;
                }
            };
            for event in &report.events {
                self.state.log_info(play::describe(event));
            }
            match &report.level {
                Some(LevelStatus::Ready { path, .. }) => {
                    self.state.log_info(format!("Next level ready at {}", path.display()));
                }
                Some(LevelStatus::Ended) => self.state.log_info("Host has no further level"),
                _ => {}
            }
            if report.finished {
                self.state.log_warn("Session finished");
                running = false;
            }

            if let Session::Host(host) = session {
                if let Some(slot) = self.state.take_pending_kick() {
                    host.kick(slot);
                }
            }

            let slots = match &*session {
                Session::Host(host) => host.slot_infos(),
                _ => Vec::new(),
            };

            if let Some(code) = poll_key(Duration::from_millis(frame_ms))? {
                match code {
                    KeyCode::Char('q') | KeyCode::Esc => running = false,
                    KeyCode::PageUp => self.state.scroll_up(),
                    KeyCode::PageDown => self.state.scroll_down(),
                    KeyCode::Up => self.state.select_prev_slot(),
                    KeyCode::Down => self.state.select_next_slot(slots.len()),
                    KeyCode::Char('k') | KeyCode::Char('K') => self.state.request_kick(&slots),
                    _ => {}
                }
            }

            let state = &self.state;
            self.terminal
                .draw(|frame| render_session(frame, state, session, &slots))?;
        }

        self.state.log_info("Shutting down...");
        session.close();
        Ok(())
    }
}

fn poll_key(timeout: Duration) -> io::Result<Option<KeyCode>> {
    if !event::poll(timeout)? {
        return Ok(None);
    }
    if let Event::Key(key) = event::read()? {
        if key.kind == KeyEventKind::Press {
            if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
                return Ok(Some(KeyCode::Char('q')));
            }
            return Ok(Some(key.code));
        }
    }
    Ok(None)
}

fn render_wait(frame: &mut Frame, address: &str, stage: WaitStage) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(5),
            Constraint::Min(0),
        ])
        .split(frame.area());

    let header = Paragraph::new(format!("Joining {}", address))
        .block(
            Block::default()
                .title(" tilenet ")
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Cyan)),
        )
        .style(Style::default().fg(Color::White));
    frame.render_widget(header, chunks[0]);

    let status = Paragraph::new(stage.label())
        .alignment(Alignment::Center)
        .block(
            Block::default()
                .title(" Status ")
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Yellow)),
        )
        .style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD));
    frame.render_widget(status, chunks[1]);

    render_help(frame, chunks[2], "Esc to cancel, 'q' to quit");
}

fn render_session(frame: &mut Frame, state: &TuiState, session: &Session, slots: &[SlotInfo]) {
    let is_host = matches!(session, Session::Host(_));
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(if is_host { 3 } else { 0 }),
            Constraint::Length(8),
            Constraint::Min(4),
            Constraint::Length(3),
        ])
        .split(frame.area());

    render_header(frame, chunks[0], session);
    if let Session::Host(host) = session {
        render_capacity(frame, chunks[1], host.connected_count(), slots.len());
    }

    let middle = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
        .split(chunks[2]);
    render_players(frame, middle[0], session);
    if let Session::Host(host) = session {
        render_slots(frame, middle[1], state, slots, &host.stats());
    } else {
        render_level(frame, middle[1], session);
    }

    render_log(frame, chunks[3], state);
    let help = if is_host {
        "'q' quit, Up/Down select client, 'k' kick, PgUp/PgDn scroll log"
    } else {
        "'q' quit, PgUp/PgDn scroll log"
    };
    render_help(frame, chunks[4], help);
}

fn render_header(frame: &mut Frame, area: Rect, session: &Session) {
    let role = match session {
        Session::Local(_) => "Local",
        Session::Host(_) => "Host",
        Session::Client(_) => "Client",
    };
    let checkpoint = session.checkpoint();
    let text = format!(
        "{} game  |  Difficulty: {}  |  Checkpoint: {},{}  |  Level type: {:?}",
        session.mode().kind(),
        session.difficulty(),
        checkpoint.x,
        checkpoint.y,
        session.level_type()
    );

    let paragraph = Paragraph::new(text)
        .block(
            Block::default()
                .title(format!(" tilenet {} ", role))
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Cyan)),
        )
        .style(Style::default().fg(Color::White));
    frame.render_widget(paragraph, area);
}

fn render_capacity(frame: &mut Frame, area: Rect, connected: usize, slots: usize) {
    let ratio = if slots == 0 {
        0.0
    } else {
        connected as f64 / slots as f64
    };
    let gauge = Gauge::default()
        .block(Block::default().borders(Borders::ALL).title(" Clients "))
        .gauge_style(Style::default().fg(Color::Green))
        .ratio(ratio.min(1.0))
        .label(format!("{}/{} clients", connected, slots));
    frame.render_widget(gauge, area);
}

fn render_players(frame: &mut Frame, area: Rect, session: &Session) {
    let local = session.local_index();
    let lines: Vec<Line> = session
        .roster()
        .iter()
        .enumerate()
        .map(|(index, player)| {
            let style = if Some(index) == local {
                Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(Color::White)
            };
            Line::from(vec![
                Span::styled(format!("{:>2} ", index), Style::default().fg(Color::Gray)),
                Span::styled(format!("{:<16}", player.name), style),
                Span::styled(
                    format!(" team {} score {}", player.team, player.team_score),
                    Style::default().fg(Color::Gray),
                ),
            ])
        })
        .collect();

    let title = format!(" Players {}/{} ", session.roster().len(), session.roster().capacity());
    let paragraph = Paragraph::new(lines).block(
        Block::default()
            .title(title)
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Green)),
    );
    frame.render_widget(paragraph, area);
}

fn render_slots(frame: &mut Frame, area: Rect, state: &TuiState, slots: &[SlotInfo], total: &NetworkStats) {
    let mut lines = vec![Line::from(vec![
        Span::styled("Total: ", Style::default().fg(Color::Gray)),
        Span::styled(
            format!(
                "{} msgs / {} sent, {} msgs / {} recv",
                total.messages_sent,
                format_bytes(total.bytes_sent),
                total.messages_received,
                format_bytes(total.bytes_received)
            ),
            Style::default().fg(Color::White),
        ),
    ])];

    for (index, slot) in slots.iter().enumerate() {
        if slot.status == SlotStatus::NotConnected && index != state.selected_slot {
            continue;
        }
        let marker = if index == state.selected_slot { ">" } else { " " };
        let status = match slot.status {
            SlotStatus::NotConnected => "free".to_string(),
            SlotStatus::Streaming { offset, .. } => format!("level {}", format_bytes(offset as u64)),
            SlotStatus::Operational => "playing".to_string(),
        };
        let peer = slot
            .peer
            .map_or_else(|| "-".to_string(), |peer| peer.to_string());
        let player = slot
            .player
            .map_or_else(|| "-".to_string(), |player| player.to_string());
        lines.push(Line::from(vec![
            Span::styled(format!("{}{:>2} ", marker, slot.id), Style::default().fg(Color::Yellow)),
            Span::styled(format!("{:<22}", peer), Style::default().fg(Color::White)),
            Span::styled(format!(" {:<12}", status), Style::default().fg(Color::Gray)),
            Span::styled(
                format!(
                    " p{} {}/{}",
                    player,
                    format_bytes(slot.stats.bytes_sent),
                    format_bytes(slot.stats.bytes_received)
                ),
                Style::default().fg(Color::Gray),
            ),
        ]));
    }

    let paragraph = Paragraph::new(lines).block(
        Block::default()
            .title(" Connections ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Yellow)),
    );
    frame.render_widget(paragraph, area);
}

fn render_level(frame: &mut Frame, area: Rect, session: &Session) {
    let text = match session {
        Session::Client(client) => match client.level_status() {
            LevelStatus::Waiting => "Waiting for the host".to_string(),
            LevelStatus::Downloading { bytes } => format!("Downloading, {}", format_bytes(*bytes as u64)),
            LevelStatus::Ready { path, .. } => format!("Level at {}", path.display()),
            LevelStatus::Ended => "No further level".to_string(),
        },
        _ => String::new(),
    };
    let paragraph = Paragraph::new(text).block(
        Block::default()
            .title(" Level ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Yellow)),
    );
    frame.render_widget(paragraph, area);
}

fn render_log(frame: &mut Frame, area: Rect, state: &TuiState) {
    let visible = area.height.saturating_sub(2) as usize;
    let end = state.logs.len().saturating_sub(state.scroll);
    let start = end.saturating_sub(visible);

    let lines: Vec<Line> = state
        .logs
        .range(start..end)
        .map(|entry| {
            let color = match entry.level {
                LogLevel::Info => Color::White,
                LogLevel::Warn => Color::Yellow,
                LogLevel::Error => Color::Red,
            };
            Line::from(Span::styled(entry.text.clone(), Style::default().fg(color)))
        })
        .collect();

    let paragraph = Paragraph::new(lines).block(
        Block::default()
            .title(" Log ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::DarkGray)),
    );
    frame.render_widget(paragraph, area);
}

fn render_help(frame: &mut Frame, area: Rect, text: &str) {
    let block = Block::default()
        .title(" Controls ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray));

    let text = Paragraph::new(text.to_string()).block(block).style(
        Style::default()
            .fg(Color::DarkGray)
            .add_modifier(Modifier::ITALIC),
    );

    frame.render_widget(text, area);
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{}B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1}KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1}MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
