use std::fmt;

use serde::Deserialize;
use url::Url;

/// Base URL of the chat backend, e.g. `http://localhost:8999`.
///
/// Only `http` and `https` are accepted. In `config.toml` this is a plain
/// string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerUrl(Url);

impl ServerUrl {
    pub fn parse(value: &str) -> anyhow::Result<Self> {
        let url = Url::parse(value.trim())?;
        match url.scheme() {
            "http" | "https" => Ok(Self(url)),
            other => anyhow::bail!("{value} uses unsupported scheme {other}"),
        }
    }

    /// The URL without a trailing slash, ready for path joining.
    pub fn as_str(&self) -> &str {
        self.0.as_str().trim_end_matches('/')
    }

    pub fn url(&self) -> &Url {
        &self.0
    }
}

impl std::str::FromStr for ServerUrl {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ServerUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ServerUrl {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        ServerUrl::parse(&s).map_err(|err| serde::de::Error::custom(format!("{err:#}")))
    }
}
