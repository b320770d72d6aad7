use anyhow::Result;
use chrono::{DateTime, Local};
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    layout::{Alignment, Constraint, Direction, Layout},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Wrap},
    Frame, Terminal,
};
use std::io;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::time::Duration;

use super::Surface;
use crate::config::{Config, UpdateInterval};
use crate::display::{DisplaySink, DisplaySummary, TOOLTIP_HEADER};
use crate::scheduler::Scheduler;

#[derive(Debug, Clone, Default)]
struct View {
    surface: Surface,
    changed_at: Option<DateTime<Local>>,
}

/// Sink backing the interactive status view. Cheap to clone; all clones
/// share one surface.
#[derive(Clone, Default)]
pub struct WatchSink {
    view: Arc<Mutex<View>>,
}

impl WatchSink {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn surface(&self) -> Surface {
        self.snapshot().surface
    }

    fn snapshot(&self) -> View {
        self.view
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set(&self, surface: Surface) {
        let mut view = self.view.lock().unwrap_or_else(PoisonError::into_inner);
        view.surface = surface;
        view.changed_at = Some(Local::now());
    }
}

impl DisplaySink for WatchSink {
    fn show_loading(&self) {
        self.set(Surface::Loading);
    }

    fn show_error(&self, message: &str) {
        self.set(Surface::Error(message.to_string()));
    }

    fn update_display(&self, summary: &DisplaySummary) -> anyhow::Result<()> {
        self.set(Surface::Showing(summary.clone()));
        Ok(())
    }

    fn hide(&self) {
        self.set(Surface::Hidden);
    }
}

/// Text around the surface that does not come from the sink.
struct Chrome {
    status_message: String,
    /// Shown in place of a hidden surface.
    idle_text: &'static str,
    schedule: Option<Duration>,
}

struct App {
    sink: WatchSink,
    scheduler: Arc<Scheduler>,
    config: Arc<Config>,
    status_message: String,
    should_quit: bool,
}

impl App {
    fn refresh(&mut self) {
        if self.scheduler.refresher().is_refreshing() {
            self.status_message = "Refresh already running".to_string();
            return;
        }

        let scheduler = self.scheduler.clone();
        tokio::spawn(async move {
            scheduler.refresh_now().await;
        });
        self.status_message = "Refreshing credits...".to_string();
    }

    fn show_config_path(&mut self) {
        self.status_message = match self.config.path() {
            Some(path) => format!("Config: {}", path.display()),
            None => "Configuration is not backed by a file".to_string(),
        };
    }

    fn chrome(&self) -> Chrome {
        Chrome {
            status_message: self.status_message.clone(),
            idle_text: idle_text(&self.config),
            schedule: self.scheduler.period(),
        }
    }

    fn handle_key(&mut self, code: KeyCode) {
        match code {
            KeyCode::Char('q') | KeyCode::Esc => self.should_quit = true,
            KeyCode::Char('r') => self.refresh(),
            KeyCode::Char('c') => self.show_config_path(),
            _ => {}
        }
    }
}

/// Run the status view until the user quits. The scheduler must already be
/// started; it is disposed before returning.
pub async fn run(scheduler: Arc<Scheduler>, sink: WatchSink, config: Arc<Config>) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = App {
        sink,
        scheduler: scheduler.clone(),
        config,
        status_message: "Starting...".to_string(),
        should_quit: false,
    };
    let res = run_app(&mut terminal, &mut app).await;

    scheduler.dispose();

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    res
}

async fn run_app<B: Backend>(terminal: &mut Terminal<B>, app: &mut App) -> Result<()> {
    loop {
        let view = app.sink.snapshot();
        let chrome = app.chrome();
        terminal.draw(|f| ui(f, &view, &chrome))?;

        if event::poll(Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    app.handle_key(key.code);
                }
            }
        }

        if app.should_quit {
            return Ok(());
        }

        // Let spawned refreshes make progress between frames
        tokio::task::yield_now().await;
    }
}

fn idle_text(config: &Config) -> &'static str {
    if config.show_in_status_bar() {
        "No providers enabled"
    } else {
        "Status display is turned off"
    }
}

fn describe_schedule(period: Option<Duration>) -> String {
    let Some(period) = period else {
        return "Timer stopped".to_string();
    };
    match UpdateInterval::ALL.into_iter().find(|i| i.period() == period) {
        Some(interval) => format!("Every {}", interval.label()),
        None => format!("Every {}s", period.as_secs()),
    }
}

fn headline_style(surface: &Surface) -> Style {
    let color = match surface {
        Surface::Hidden => Color::DarkGray,
        Surface::Loading => Color::Yellow,
        Surface::Error(_) => Color::Red,
        Surface::Showing(summary) if summary.all_failed => Color::Red,
        Surface::Showing(_) => Color::Green,
    };
    Style::default().fg(color).add_modifier(Modifier::BOLD)
}

fn ui(f: &mut Frame, view: &View, chrome: &Chrome) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(2)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(3),
            Constraint::Min(0),
            Constraint::Length(4),
        ])
        .split(f.size());

    // Header
    let header = Paragraph::new(TOOLTIP_HEADER)
        .style(
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        )
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::ALL));
    f.render_widget(header, chunks[0]);

    // Status line
    let text = if view.surface.is_visible() {
        view.surface.text()
    } else {
        chrome.idle_text
    };
    let status = Paragraph::new(Span::styled(text, headline_style(&view.surface)))
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::ALL).title("Credits"));
    f.render_widget(status, chunks[1]);

    // Details
    let tooltip = view.surface.tooltip();
    let details: Vec<Line> = tooltip
        .lines()
        .filter(|line| *line != TOOLTIP_HEADER)
        .map(|line| {
            if line.contains(": Error - ") {
                Line::from(Span::styled(line.to_string(), Style::default().fg(Color::Red)))
            } else {
                Line::from(line.to_string())
            }
        })
        .collect();
    let details = Paragraph::new(details)
        .block(Block::default().borders(Borders::ALL).title("Providers"))
        .wrap(Wrap { trim: true });
    f.render_widget(details, chunks[2]);

    // Footer
    let key = Style::default()
        .fg(Color::Yellow)
        .add_modifier(Modifier::BOLD);
    let updated = view
        .changed_at
        .map(|t| format!("Updated {}  ", t.format("%H:%M:%S")))
        .unwrap_or_default();
    let footer_text = vec![
        Line::from(vec![
            Span::raw("Press "),
            Span::styled("q", key),
            Span::raw(" to quit, "),
            Span::styled("r", key),
            Span::raw(" to refresh, "),
            Span::styled("c", key),
            Span::raw(" for config path"),
        ]),
        Line::from(format!(
            "{}  {}{}",
            describe_schedule(chrome.schedule),
            updated,
            chrome.status_message
        )),
    ];

    let footer = Paragraph::new(footer_text)
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::ALL));
    f.render_widget(footer, chunks[3]);
}
