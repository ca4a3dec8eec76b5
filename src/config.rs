//! Startup configuration: a JSON file whose leading `#` comment header is
//! stripped before parsing. Command-line flags override individual fields
//! after loading.

use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URLs of the storage backends. Required, non-empty.
    #[serde(rename = "Backends")]
    pub backends: Vec<String>,

    #[serde(rename = "Port")]
    pub port: u16,

    /// Parallelism hint; maps to runtime worker threads.
    #[serde(rename = "MaxProcs")]
    pub max_procs: usize,

    /// Per-decade latency buckets; the histogram gets one extra overflow
    /// bucket on top.
    #[serde(rename = "Buckets")]
    pub buckets: usize,

    /// Select the binary upstream codec instead of the object-graph one.
    #[serde(rename = "UsePB")]
    pub use_pb: bool,

    /// `host:port` of the telemetry sink; empty means none configured.
    #[serde(rename = "GraphiteHost")]
    pub graphite_host: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            backends: Vec::new(),
            port: 8080,
            max_procs: 1,
            buckets: 10,
            use_pb: false,
            graphite_host: String::new(),
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("could not read config file: {0}")]
    Read(#[from] std::io::Error),

    #[error("could not parse config file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("config file has no content after its comment header")]
    EmptyAfterHeader,

    #[error("no backends configured")]
    NoBackends,
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let stripped = strip_comment_header(&raw).ok_or(ConfigError::EmptyAfterHeader)?;
        let config: Config = serde_json::from_str(stripped)?;
        if config.backends.is_empty() {
            return Err(ConfigError::NoBackends);
        }
        Ok(config)
    }

    /// Where to publish telemetry: the configured host, or the
    /// `GRAPHITEHOST`/`GRAPHITEPORT` environment as a fallback.
    pub fn graphite_sink(&self) -> Option<String> {
        resolve_graphite_sink(
            &self.graphite_host,
            std::env::var("GRAPHITEHOST").ok(),
            std::env::var("GRAPHITEPORT").ok(),
        )
    }
}

fn resolve_graphite_sink(
    configured: &str,
    env_host: Option<String>,
    env_port: Option<String>,
) -> Option<String> {
    if !configured.is_empty() {
        return Some(configured.to_string());
    }
    let host = env_host.unwrap_or_default();
    let port = env_port.unwrap_or_default();
    if host.is_empty() && port.is_empty() {
        return None;
    }
    Some(format!("{host}:{port}"))
}

/// Drop the leading block of lines starting with `#`. Returns `None` when
/// the file is empty, is all header, or the header never terminates.
fn strip_comment_header(raw: &str) -> Option<&str> {
    let mut rest = raw;
    while rest.starts_with('#') {
        match rest.find('\n') {
            Some(idx) if idx + 1 < rest.len() => rest = &rest[idx + 1..],
            _ => return None,
        }
    }
    if rest.trim().is_empty() {
        None
    } else {
        Some(rest)
    }
}
