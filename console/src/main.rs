// Operator console for the robotic arm
// Run with: cargo run -p console
// Make sure a controller (or the simulator: cargo run -p sim) is listening

mod app;
mod ui;

use std::fs::OpenOptions;
use std::io;
use std::sync::Mutex;
use std::time::Duration;

use arm_link::config::{ConsoleConfig, LogConfig};
use arm_link::session::ConsoleSession;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use app::{handle_key_event, AppState};

// the terminal belongs to the UI, so tracing goes to a file
fn init_logging(log: &LogConfig) -> Result<(), Box<dyn std::error::Error>> {
    let file = OpenOptions::new().create(true).append(true).open(&log.file)?;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log.level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = ConsoleConfig::load()?;
    init_logging(&config.log)?;
    info!("Starting console, controller at {}", config.connection.connection_url());

    let mut session = ConsoleSession::start(&config)?;

    let mut app_state = AppState::new();
    let res = run_terminal(&mut session, &mut app_state);
    finish(session, res).await
}

// The session is released whatever happened to the terminal.
async fn finish(
    session: ConsoleSession,
    res: Result<(), Box<dyn std::error::Error>>,
) -> Result<(), Box<dyn std::error::Error>> {
    session.shutdown().await;
    res
}

// Sets up the terminal, runs the app, and always attempts every restore step.
fn run_terminal(session: &mut ConsoleSession, app_state: &mut AppState) -> Result<(), Box<dyn std::error::Error>> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    if let Err(e) = execute!(stdout, EnterAlternateScreen, EnableMouseCapture) {
        let _ = disable_raw_mode();
        return Err(e.into());
    }
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = match Terminal::new(backend) {
        Ok(terminal) => terminal,
        Err(e) => {
            let _ = execute!(io::stdout(), LeaveAlternateScreen, DisableMouseCapture);
            let _ = disable_raw_mode();
            return Err(e.into());
        }
    };

    let res = run_app(&mut terminal, session, app_state);

    // Restore terminal
    let restored = [
        disable_raw_mode(),
        execute!(terminal.backend_mut(), LeaveAlternateScreen, DisableMouseCapture),
        terminal.show_cursor(),
    ];

    if let Err(err) = &res {
        error!("Console loop failed: {}", err);
    }
    res?;
    for step in restored {
        step?;
    }
    Ok(())
}

fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    session: &mut ConsoleSession,
    app_state: &mut AppState,
) -> Result<(), Box<dyn std::error::Error>> {
    loop {
        for event in session.poll_events() {
            app_state.record_event(event);
        }
        app_state.connection = session.connection_state();

        terminal.draw(|f| ui::ui(f, session, app_state))?;
        if app_state.should_quit {
            break;
        }

        // Handle input with timeout
        if event::poll(Duration::from_millis(30))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    handle_key_event(key, session, app_state);
                }
            }
        }
    }
    Ok(())
}
