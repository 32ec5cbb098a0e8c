mod ui;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use ratatui::{
    crossterm::{
        self,
        event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind},
        execute,
        terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
    },
    prelude::*,
};
use road_lab_core::{
    Lab, LabConfig, Mode,
    metrics::Metrics,
    params::{AGENT_COUNT, GRID_SIZE},
};
use serde::Serialize;
use std::{
    fs::File,
    io::{self, Stdout},
    path::PathBuf,
    time::{Duration, Instant},
};

/// Side-by-side obstacle discovery lab: the same field driven once with
/// private knowledge and once with shared knowledge.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Seed for randomized layouts. Drawn from the OS when omitted
    #[arg(short, long)]
    seed: Option<u64>,

    /// Begin with a randomized layout instead of the fixed one
    #[arg(short, long)]
    random: bool,

    /// Number of agents
    #[arg(short, long, default_value_t = AGENT_COUNT)]
    agents: usize,

    /// Side length of the field in cells
    #[arg(short, long, default_value_t = GRID_SIZE)]
    grid_size: usize,

    /// Milliseconds between ticks
    #[arg(long, default_value_t = 100)]
    tick_ms: u64,

    /// Run both modes to completion without a terminal UI and print the totals
    #[arg(long)]
    headless: bool,

    /// Tick cap per mode in headless mode
    #[arg(long, default_value_t = 5_000)]
    max_ticks: u64,

    /// Print the headless report as JSON
    #[arg(long, requires = "headless")]
    json: bool,

    /// Write logs to this file
    #[arg(long, value_name = "LOG_FILE")]
    log_file: Option<PathBuf>,
}

impl Args {
    fn config(&self) -> LabConfig {
        LabConfig {
            grid_size: self.grid_size,
            agent_count: self.agents,
            ..LabConfig::default()
        }
    }
}

struct App {
    /// Private knowledge, drawn on the left.
    uncoordinated: Lab,
    /// Shared knowledge, drawn on the right.
    coordinated: Lab,
    /// Last message for the status line.
    status: String,
    should_quit: bool,
}

impl App {
    /// Builds both labs on one locked layout so their runs are comparable.
    fn new(config: LabConfig, seed: Option<u64>, random: bool) -> Result<Self> {
        let mut uncoordinated = match seed {
            Some(seed) => Lab::with_seed(config.clone(), seed),
            None => Lab::new(config.clone()),
        };
        if random {
            uncoordinated
                .randomize_layout()
                .context("Failed to generate a random layout")?;
        }
        uncoordinated.lock_layout();

        let mut coordinated = Lab::new(config);
        coordinated.lock_with(uncoordinated.layout())?;

        let mut app = App {
            uncoordinated,
            coordinated,
            status: String::new(),
            should_quit: false,
        };
        app.status = app.idle_status();
        Ok(app)
    }

    fn idle_status(&self) -> String {
        let warnings = self.uncoordinated.warnings();
        match warnings.first() {
            Some(warning) => format!("{warning} ({} setup warnings)", warnings.len()),
            None => "Ready".to_string(),
        }
    }

    fn is_running(&self) -> bool {
        self.uncoordinated.is_running() || self.coordinated.is_running()
    }

    /// Starts both runs, or stops them and rolls back to the locked layout.
    fn toggle_run(&mut self) -> Result<()> {
        if self.is_running() {
            self.uncoordinated.stop_run();
            self.coordinated.stop_run();
            self.status = "Stopped".to_string();
        } else {
            self.uncoordinated.start_run(false, Mode::Uncoordinated)?;
            self.coordinated.start_run(false, Mode::Coordinated)?;
            self.status = "Running".to_string();
        }
        Ok(())
    }

    /// Draws a new random layout and hands it to both labs.
    fn randomize(&mut self) -> Result<()> {
        if self.is_running() {
            self.status = "Stop the run before randomizing".to_string();
            return Ok(());
        }
        self.uncoordinated.randomize_layout()?;
        self.coordinated.lock_with(self.uncoordinated.layout())?;
        info!("Randomized shared layout");
        self.status = self.idle_status();
        Ok(())
    }

    /// Handles one step of both simulations.
    fn tick(&mut self) {
        for lab in [&mut self.uncoordinated, &mut self.coordinated] {
            if !lab.is_complete() {
                lab.tick();
            }
        }
        if self.is_running() && self.uncoordinated.is_complete() && self.coordinated.is_complete()
        {
            self.status = "Both runs complete".to_string();
        }
    }

    /// Sets the quit flag.
    fn quit(&mut self) {
        self.should_quit = true;
    }
}

/// Totals of one headless run.
#[derive(Debug, Serialize)]
struct RunReport {
    mode: Mode,
    completed: bool,
    agents: usize,
    agents_at_goal: usize,
    ticks: u64,
    efficiency: f64,
    #[serde(flatten)]
    metrics: Metrics,
}

impl RunReport {
    fn of(lab: &Lab) -> Self {
        RunReport {
            mode: lab.mode(),
            completed: lab.is_complete(),
            agents: lab.agents().len(),
            agents_at_goal: lab.agents_at_goal(),
            ticks: lab.ticks(),
            efficiency: lab.metrics().efficiency(),
            metrics: lab.metrics().clone(),
        }
    }
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();
    init_logging(&args)?;

    let mut app = App::new(args.config(), args.seed, args.random)?;

    if args.headless {
        return run_headless(&mut app, args.max_ticks, args.json);
    }

    // Set up the terminal
    let mut terminal = setup_terminal()?;

    // Run the main application loop, restoring the terminal even on error
    let result = run_app(&mut terminal, &mut app, Duration::from_millis(args.tick_ms));
    restore_terminal(&mut terminal)?;
    result
}

/// Logs go to `--log-file` when given. Without one the interactive UI keeps
/// logging off unless `RUST_LOG` asks for it, since stderr would tear the
/// alternate screen.
fn init_logging(args: &Args) -> Result<()> {
    let default_filter = match (&args.log_file, args.headless) {
        (Some(_), _) => "info",
        (None, true) => "warn",
        (None, false) => "off",
    };
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter));

    if let Some(path) = &args.log_file {
        let file = File::create(path)
            .with_context(|| format!("Failed to create log file: {}", path.display()))?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }

    builder.try_init().context("Failed to install logger")?;
    Ok(())
}

/// Runs both modes on the locked layout and prints their totals.
fn run_headless(app: &mut App, max_ticks: u64, json: bool) -> Result<()> {
    app.toggle_run()?;
    app.uncoordinated.run_until_complete(max_ticks);
    app.coordinated.run_until_complete(max_ticks);

    let reports = [
        RunReport::of(&app.uncoordinated),
        RunReport::of(&app.coordinated),
    ];

    if json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
        return Ok(());
    }

    println!(
        "{:<14} {:>9} {:>7} {:>7} {:>11} {:>10} {:>11}",
        "mode", "at goal", "ticks", "steps", "discoveries", "redundant", "efficiency"
    );
    for report in &reports {
        let finish = match report.metrics.finished_tick {
            Some(tick) => tick.to_string(),
            None => format!(">{}", report.ticks),
        };
        println!(
            "{:<14} {:>9} {:>7} {:>7} {:>11} {:>10} {:>10.1}%",
            report.mode.to_string(),
            format!("{}/{}", report.agents_at_goal, report.agents),
            finish,
            report.metrics.total_steps,
            report.metrics.discoveries,
            report.metrics.redundant_discoveries,
            report.efficiency
        );
    }
    Ok(())
}

/// Configures the terminal for TUI interaction.
fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>> {
    let mut stdout = io::stdout();
    enable_raw_mode()?;
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    Terminal::new(backend).map_err(Into::into)
}

/// Restores the terminal to its original state.
fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;
    Ok(())
}

/// Runs the main loop of the TUI application.
fn run_app(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    app: &mut App,
    tick_rate: Duration,
) -> Result<()> {
    let mut last_tick = Instant::now();

    loop {
        terminal.draw(|f| ui::draw(f, app))?;

        let timeout = tick_rate
            .checked_sub(last_tick.elapsed())
            .unwrap_or(Duration::ZERO);

        if crossterm::event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    match key.code {
                        KeyCode::Char('q') | KeyCode::Esc => app.quit(),
                        KeyCode::Char('s') | KeyCode::Char(' ') => app.toggle_run()?,
                        KeyCode::Char('r') => app.randomize()?,
                        _ => {}
                    }
                }
            }
        }

        if last_tick.elapsed() >= tick_rate {
            app.tick();
            last_tick = Instant::now();
        }

        if app.should_quit {
            break;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app() -> App {
        App::new(LabConfig::default(), Some(3), false).unwrap()
    }

    #[test]
    fn both_labs_share_the_layout() {
        let mut app = app();
        assert_eq!(app.uncoordinated.layout(), app.coordinated.layout());
        app.randomize().unwrap();
        assert_eq!(app.uncoordinated.layout(), app.coordinated.layout());
        assert!(app.uncoordinated.is_locked());
        assert!(app.coordinated.is_locked());
    }

    #[test]
    fn toggling_starts_each_lab_in_its_mode() {
        let mut app = app();
        app.toggle_run().unwrap();
        assert_eq!(app.uncoordinated.mode(), Mode::Uncoordinated);
        assert_eq!(app.coordinated.mode(), Mode::Coordinated);
        assert!(app.is_running());

        app.tick();
        assert_eq!(app.uncoordinated.ticks(), 1);
        assert_eq!(app.coordinated.ticks(), 1);

        app.toggle_run().unwrap();
        assert!(!app.is_running());
        assert_eq!(app.uncoordinated.ticks(), 0);
    }

    #[test]
    fn randomize_waits_for_the_run_to_stop() {
        let mut app = app();
        let before = app.uncoordinated.layout();
        app.toggle_run().unwrap();
        app.randomize().unwrap();
        assert_eq!(app.uncoordinated.layout(), before);
        assert_eq!(app.status, "Stop the run before randomizing");
    }

    #[test]
    fn report_carries_the_metrics() {
        let mut app = app();
        app.toggle_run().unwrap();
        app.coordinated.run_until_complete(5_000);
        let report = RunReport::of(&app.coordinated);
        assert!(report.completed);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["mode"], "coordinated");
        assert_eq!(json["total_steps"], report.metrics.total_steps);
        assert!(json.get("started_at").is_none());
    }
}
