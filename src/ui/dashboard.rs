use std::time::Duration;

use anyhow::{Context, Result};
use crossbeam_channel as channel;
use crossterm::{
    cursor,
    event::{self, DisableFocusChange, EnableFocusChange, Event, KeyCode, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout},
    style::Color,
    symbols::Marker,
    widgets::{
        canvas::{Canvas, Context as Painter, Line, Points},
        Block, Borders, Paragraph,
    },
    Terminal,
};
use tokio::runtime::Runtime;
use tracing::{info, warn};

use crate::chart::{ChartArea, ChartLayout};
use crate::config::WatchSettings;
use crate::metrics::DataPoint;
use crate::net::client::SpeedClient;
use crate::poll::{self, PollControl, PollEvent, PollState};
use crate::series::TimeSeries;

/// Virtual drawing area; the canvas scales it to the terminal.
pub const CHART_AREA: ChartArea = ChartArea { width: 520.0, height: 220.0 };

const DOWNLOAD_COLOR: Color = Color::Rgb(0x60, 0xa5, 0xfa);
const UPLOAD_COLOR: Color = Color::Rgb(0x34, 0xd3, 0x99);

/// What the terminal shows, fed by poll events.
pub struct Dashboard {
    series: TimeSeries,
    poll: PollState,
    last_error: Option<String>,
    samples: u64,
}

impl Dashboard {
    pub fn new(series: TimeSeries) -> Self {
        Self { series, poll: PollState::Idle, last_error: None, samples: 0 }
    }

    /// Returns true when the event added a point to the chart.
    pub fn apply(&mut self, event: PollEvent) -> bool {
        match event {
            PollEvent::Sample(point) => {
                self.series.push(point);
                self.samples += 1;
                self.last_error = None;
                true
            }
            // the chart and the last values stay as they were
            PollEvent::Failed(err) => {
                self.last_error = Some(err.to_string());
                false
            }
            PollEvent::State(state) => {
                self.poll = state;
                false
            }
        }
    }

    pub fn latest(&self) -> DataPoint {
        self.series.latest().copied().unwrap_or_default()
    }

    pub fn status_line(&self) -> String {
        match (self.poll, &self.last_error) {
            (PollState::Idle, _) => "starting".to_string(),
            (PollState::Paused, _) => "paused".to_string(),
            (PollState::Running, Some(err)) => format!("error: {err}"),
            (PollState::Running, None) if self.samples == 0 => "waiting for first sample".to_string(),
            (PollState::Running, None) => {
                format!("live | {}/{} points", self.series.len(), self.series.capacity())
            }
        }
    }

    pub fn layout(&self) -> ChartLayout {
        ChartLayout::compute(&self.series, CHART_AREA)
    }
}

// chart coordinates grow downwards, canvas coordinates upwards
fn flip(y: f64) -> f64 {
    CHART_AREA.height - y
}

fn paint_series(ctx: &mut Painter<'_>, points: &[(f64, f64)], color: Color) {
    if let [(x, y)] = points {
        ctx.draw(&Points { coords: &[(*x, flip(*y))], color });
        return;
    }
    for pair in points.windows(2) {
        let ((x1, y1), (x2, y2)) = (pair[0], pair[1]);
        ctx.draw(&Line { x1, y1: flip(y1), x2, y2: flip(y2), color });
    }
}

fn write_svg(settings: &WatchSettings, layout: &ChartLayout) {
    if let Some(path) = &settings.svg {
        if let Err(e) = std::fs::write(path, layout.to_svg()) {
            warn!(?e, path = %path.display(), "Writing SVG failed");
        }
    }
}

/// Raw mode and the alternate screen, restored on drop whatever the exit path.
struct TerminalGuard;

impl TerminalGuard {
    fn enter() -> Result<Self> {
        enable_raw_mode()?;
        let guard = TerminalGuard;
        execute!(std::io::stdout(), EnterAlternateScreen, EnableFocusChange)?;
        Ok(guard)
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = execute!(std::io::stdout(), DisableFocusChange, LeaveAlternateScreen, cursor::Show);
    }
}

/// Stops the poll loop when the dashboard goes away, including on error.
struct StopPolling<'a>(&'a PollControl);

impl Drop for StopPolling<'_> {
    fn drop(&mut self) {
        self.0.shutdown();
    }
}

pub fn run_watch(settings: WatchSettings, rt: &Runtime) -> Result<()> {
    let client = SpeedClient::new(&settings.url, settings.fetch_timeout).context("Building HTTP client")?;
    info!(url = client.url(), poll_ms = settings.cadence.poll_ms(), "Watching");

    let (event_tx, event_rx) = channel::unbounded::<PollEvent>();
    let (control, poller) = {
        let _guard = rt.enter();
        poll::spawn(client, settings.cadence.poll_interval(), event_tx)
    };
    let dash = Dashboard::new(TimeSeries::for_window(
        Duration::from_millis(settings.cadence.window_ms()),
        settings.cadence.poll_interval(),
    ));

    let result = {
        let _stop = StopPolling(&control);
        draw_loop(&settings, &control, &event_rx, dash)
    };
    // waits for a fetch still in flight, bounded by the fetch timeout
    if let Err(e) = rt.block_on(poller) {
        warn!(?e, "Poll loop ended abnormally");
    }
    result
}

fn draw_loop(
    settings: &WatchSettings,
    control: &PollControl,
    event_rx: &channel::Receiver<PollEvent>,
    mut dash: Dashboard,
) -> Result<()> {
    let _terminal_guard = TerminalGuard::enter()?;
    let backend = CrosstermBackend::new(std::io::stdout());
    let mut terminal = Terminal::new(backend)?;

    loop {
        while let Ok(ev) = event_rx.try_recv() {
            if dash.apply(ev) {
                write_svg(settings, &dash.layout());
            }
        }

        let layout = dash.layout();
        let latest = dash.latest();
        let status = dash.status_line();
        terminal.draw(|f| {
            let rows = Layout::default()
                .direction(Direction::Vertical)
                .constraints([
                    Constraint::Length(4), // Current rates
                    Constraint::Min(0),    // Chart
                    Constraint::Length(1), // Footer
                ].as_ref())
                .split(f.size());

            let rates = Paragraph::new(format!(
                "Download: {:.2} Mbps\nUpload:   {:.2} Mbps",
                latest.download_mbps, latest.upload_mbps
            ))
            .block(Block::default().title(format!("{} | {status}", settings.url)).borders(Borders::ALL));
            f.render_widget(rates, rows[0]);

            let chart = Canvas::default()
                .block(Block::default().title(format!("Mbps (max {:.0})", layout.max_val)).borders(Borders::ALL))
                .marker(Marker::Braille)
                .x_bounds([0.0, CHART_AREA.width])
                .y_bounds([0.0, CHART_AREA.height])
                .paint(|ctx| {
                    for line in &layout.grid {
                        let y = flip(line.y);
                        ctx.draw(&Line { x1: layout.left, y1: y, x2: layout.right, y2: y, color: Color::DarkGray });
                        ctx.print(0.0, y, line.label.clone());
                    }
                    ctx.layer();
                    paint_series(ctx, &layout.download, DOWNLOAD_COLOR);
                    paint_series(ctx, &layout.upload, UPLOAD_COLOR);
                });
            f.render_widget(chart, rows[1]);

            f.render_widget(Paragraph::new("p: pause/resume | q: quit"), rows[2]);
        })?;

        if event::poll(Duration::from_millis(100))? {
            match event::read()? {
                Event::Key(key) => {
                    if key.code == KeyCode::Char('q')
                        || (key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL))
                    {
                        return Ok(());
                    } else if key.code == KeyCode::Char('p') {
                        control.toggle();
                    }
                }
                Event::FocusLost => {
                    control.pause();
                }
                Event::FocusGained => {
                    control.resume();
                }
                _ => {}
            }
        }
    }
}
