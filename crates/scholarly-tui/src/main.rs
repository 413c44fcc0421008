mod app;
mod handler;
mod tui;
mod ui;

use std::path::PathBuf;

use anyhow::Result;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use app::App;
use tui::{EventHandler, Tui, TICK_RATE};

/// `<data_dir>/scholarly/logs`, or `./logs` when there is no data dir
fn log_dir() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join("scholarly").join("logs"))
        .unwrap_or_else(|| PathBuf::from("logs"))
}

/// Logs go to a file only; the terminal is busy drawing the UI.
fn init_tracing() -> tracing_appender::non_blocking::WorkerGuard {
    let file_appender = tracing_appender::rolling::never(log_dir(), "scholarly.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "scholarly=info,scholarly_core=info".into());

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false),
        )
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    let _guard = init_tracing();
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting");

    let mut app = App::new()?;

    tui::install_panic_hook();
    let mut terminal = tui::init()?;

    app.refresh_projects();

    let mut events = EventHandler::new(TICK_RATE);
    let result = run(&mut terminal, &mut app, &mut events).await;

    tui::restore()?;
    if let Err(e) = &result {
        tracing::error!("exited with error: {:#}", e);
    }
    result
}

async fn run(terminal: &mut Tui, app: &mut App, events: &mut EventHandler) -> Result<()> {
    while !app.should_quit {
        terminal.draw(|frame| ui::render(app, frame))?;

        match events.next().await {
            Some(event) => handler::handle_event(app, event).await?,
            None => break,
        }
    }
    Ok(())
}
