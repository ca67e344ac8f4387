use std::path::PathBuf;

use chatline_core::config::ServerUrl;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(version, about = "Terminal chat client for a streaming chat backend")]
pub struct Cli {
    /// Base URL of the chat backend. Overrides `server_url` in config.toml.
    #[arg(long = "server-url", short = 's', value_name = "URL")]
    pub server_url: Option<ServerUrl>,

    /// Read configuration from this file instead of
    /// `$CHATLINE_HOME/config.toml`.
    #[arg(long = "config", short = 'c', value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Log at info level instead of warn.
    #[arg(long = "debug", short = 'd', default_value_t = false)]
    pub debug: bool,
}
