//! `config.toml` loading.
//!
//! The file lives in `$CHATLINE_HOME` (default `~/.chatline`). Every key is
//! optional; command-line overrides win over the file, and the file wins over
//! built-in defaults.

mod server_url;

use std::collections::BTreeMap;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use dirs::home_dir;
use serde::Deserialize;

pub use server_url::ServerUrl;

pub const CONFIG_TOML_FILE: &str = "config.toml";

const CHATLINE_HOME_ENV: &str = "CHATLINE_HOME";
const DEFAULT_SERVER_URL: &str = "http://localhost:8999";
const DEFAULT_HISTORY_WINDOW: usize = 10;
const DEFAULT_INPUT_CHAR_LIMIT: usize = 2000;

/// Raw shape of `config.toml`.
#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ConfigToml {
    pub server_url: Option<ServerUrl>,
    /// Number of trailing turns sent with each request.
    pub history_window: Option<usize>,
    pub input_char_limit: Option<usize>,
    #[serde(default)]
    pub pacing: PacingToml,
    /// `[keys]` table: action name to one chord or a list of chords.
    #[serde(default)]
    pub keys: BTreeMap<String, KeyBindingValue>,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum KeyBindingValue {
    Single(String),
    Multiple(Vec<String>),
}

impl KeyBindingValue {
    pub fn into_chords(self) -> Vec<String> {
        match self {
            KeyBindingValue::Single(chord) => vec![chord],
            KeyBindingValue::Multiple(chords) => chords,
        }
    }
}

/// `[pacing]` table. Millisecond values.
#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct PacingToml {
    pub restart_gap_chars: Option<usize>,
    pub markdown_growth_chars: Option<usize>,
    pub stream_interval_ms: Option<u64>,
    pub drain_interval_ms: Option<u64>,
    pub completion_marker_ms: Option<u64>,
}

/// Typewriter and render-gate tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacingConfig {
    /// Hidden backlog (in chars) above which an arriving delta restarts the
    /// reveal timer even though one is already running.
    pub restart_gap_chars: usize,
    /// Growth (in chars) since the last markdown layout that forces a new one.
    pub markdown_growth_chars: usize,
    pub stream_interval: Duration,
    pub drain_interval: Duration,
    /// How long the completion marker stays on a finished reply.
    pub completion_marker_ttl: Duration,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            restart_gap_chars: 10,
            markdown_growth_chars: 100,
            stream_interval: Duration::from_millis(30),
            drain_interval: Duration::from_millis(15),
            completion_marker_ttl: Duration::from_millis(3000),
        }
    }
}

impl PacingConfig {
    fn from_toml(toml: &PacingToml) -> anyhow::Result<Self> {
        anyhow::ensure!(
            toml.stream_interval_ms != Some(0),
            "pacing.stream_interval_ms must be at least 1"
        );
        anyhow::ensure!(
            toml.drain_interval_ms != Some(0),
            "pacing.drain_interval_ms must be at least 1"
        );
        let defaults = Self::default();
        let millis = |value: Option<u64>, fallback: Duration| {
            value.map(Duration::from_millis).unwrap_or(fallback)
        };
        Ok(Self {
            restart_gap_chars: toml.restart_gap_chars.unwrap_or(defaults.restart_gap_chars),
            markdown_growth_chars: toml
                .markdown_growth_chars
                .unwrap_or(defaults.markdown_growth_chars),
            stream_interval: millis(toml.stream_interval_ms, defaults.stream_interval),
            drain_interval: millis(toml.drain_interval_ms, defaults.drain_interval),
            completion_marker_ttl: millis(
                toml.completion_marker_ms,
                defaults.completion_marker_ttl,
            ),
        })
    }
}

/// Overrides supplied on the command line.
#[derive(Default, Debug, Clone)]
pub struct ConfigOverrides {
    pub server_url: Option<ServerUrl>,
    pub config_path: Option<PathBuf>,
}

/// Resolved configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub server_url: ServerUrl,
    pub history_window: usize,
    pub input_char_limit: usize,
    pub pacing: PacingConfig,
    /// Key binding overrides by action name. Validated by the UI.
    pub keys: BTreeMap<String, Vec<String>>,
    pub chatline_home: PathBuf,
}

impl Config {
    /// Read `config.toml` (a missing file is not an error) and apply
    /// `overrides` on top.
    pub fn load_with_overrides(overrides: ConfigOverrides) -> anyhow::Result<Self> {
        let chatline_home = find_chatline_home()?;
        let path = overrides
            .config_path
            .clone()
            .unwrap_or_else(|| chatline_home.join(CONFIG_TOML_FILE));
        let toml = load_config_toml(&path)?;
        Self::from_toml(toml, overrides, chatline_home)
    }

    pub fn from_toml(
        toml: ConfigToml,
        overrides: ConfigOverrides,
        chatline_home: PathBuf,
    ) -> anyhow::Result<Self> {
        let server_url = match overrides.server_url.or(toml.server_url) {
            Some(url) => url,
            None => ServerUrl::parse(DEFAULT_SERVER_URL)?,
        };
        let history_window = toml.history_window.unwrap_or(DEFAULT_HISTORY_WINDOW);
        anyhow::ensure!(history_window > 0, "history_window must be at least 1");

        Ok(Self {
            server_url,
            history_window,
            input_char_limit: toml.input_char_limit.unwrap_or(DEFAULT_INPUT_CHAR_LIMIT),
            pacing: PacingConfig::from_toml(&toml.pacing)?,
            keys: toml
                .keys
                .into_iter()
                .map(|(action, value)| (action, value.into_chords()))
                .collect(),
            chatline_home,
        })
    }

    pub fn log_dir(&self) -> PathBuf {
        self.chatline_home.join("log")
    }
}

/// Parse `path` as [`ConfigToml`]. Returns defaults when the file does not
/// exist.
pub fn load_config_toml(path: &Path) -> anyhow::Result<ConfigToml> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("no config at {}, using defaults", path.display());
            return Ok(ConfigToml::default());
        }
        Err(err) => {
            return Err(err).with_context(|| format!("failed to read {}", path.display()));
        }
    };
    toml::from_str(&contents).with_context(|| format!("failed to parse {}", path.display()))
}

/// `$CHATLINE_HOME` when set, otherwise `~/.chatline`. Does not verify that
/// the directory exists.
pub fn find_chatline_home() -> anyhow::Result<PathBuf> {
    if let Some(home) = std::env::var_os(CHATLINE_HOME_ENV).filter(|value| !value.is_empty()) {
        return Ok(PathBuf::from(home));
    }
    let mut path = home_dir().context("could not find home directory")?;
    path.push(".chatline");
    Ok(path)
}
