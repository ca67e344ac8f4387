// Forbid accidental stdout/stderr writes in the *library* portion of the TUI.
// The standalone `chatline` binary prints a short message on fatal errors.
#![deny(clippy::print_stdout, clippy::print_stderr)]

use std::fs::OpenOptions;
use std::sync::Arc;

use chatline_core::Config;
use chatline_core::config::ConfigOverrides;
use chatline_core::transport::ChatTransport;
use chatline_core::transport::HttpTransport;
use tokio::sync::mpsc::unbounded_channel;
use tracing_appender::non_blocking;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

use crate::app::App;
use crate::app_event_sender::AppEventSender;
use crate::keymap::ChatKeymap;

mod app;
mod app_event;
mod app_event_sender;
mod cli;
mod clipboard;
mod composer;
mod keymap;
mod markdown;
mod markdown_render;
mod render;
mod status_line;
mod time_format;
mod tokio_scheduler;
mod transcript;
mod tui;

pub use cli::Cli;

const LOG_FILE_NAME: &str = "chatline-tui.log";

pub async fn run_main(cli: Cli) -> std::io::Result<()> {
    let overrides = ConfigOverrides {
        server_url: cli.server_url.clone(),
        config_path: cli.config.clone(),
    };
    let config = Config::load_with_overrides(overrides).map_err(|err| {
        std::io::Error::other(format!("error loading configuration: {err:#}"))
    })?;
    let keymap = ChatKeymap::from_overrides(&config.keys)
        .map_err(|err| std::io::Error::other(format!("invalid [keys] configuration: {err}")))?;

    let log_dir = config.log_dir();
    std::fs::create_dir_all(&log_dir)?;
    let mut log_file_opts = OpenOptions::new();
    log_file_opts.create(true).append(true);

    // The log can contain conversation text.
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        log_file_opts.mode(0o600);
    }

    let log_file = log_file_opts.open(log_dir.join(LOG_FILE_NAME))?;
    let (non_blocking, _guard) = non_blocking(log_file);

    let default_filter = if cli.debug {
        "chatline_core=info,chatline_tui=info"
    } else {
        "chatline_core=warn,chatline_tui=warn"
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_target(false)
        .with_filter(env_filter);
    let _ = tracing_subscriber::registry().with(file_layer).try_init();

    run_ratatui_app(config, keymap)
        .await
        .map_err(|err| std::io::Error::other(err.to_string()))
}

async fn run_ratatui_app(config: Config, keymap: ChatKeymap) -> color_eyre::Result<()> {
    color_eyre::install()?;

    let transport: Arc<dyn ChatTransport> =
        Arc::new(HttpTransport::new(config.server_url.clone()));
    let (app_event_tx, app_event_rx) = unbounded_channel();
    let mut app = App::new(config, keymap, transport, AppEventSender::new(app_event_tx));

    let mut terminal = tui::init()?;
    let result = app.run(&mut terminal, app_event_rx).await;
    if let Err(err) = tui::restore() {
        tracing::warn!("failed to restore terminal: {err}");
    }
    result
}
