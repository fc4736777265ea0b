//! Sender configuration.
//!
//! Loaded from a JSON file (by default `config.json` in the working
//! directory):
//!
//! ```json
//! {
//!   "server_config": { "ip": "10.0.0.20", "port": 9800, "transport": "tcp" },
//!   "send_interval_ms": 100,
//!   "addresses": [
//!     { "address": 1, "label": "CAM1", "tally1": false, "tally2": false },
//!     { "address": 2, "label": "CAM2" }
//!   ]
//! }
//! ```
//!
//! Every field is optional. Absent or unusable values fall back to
//! `127.0.0.1:9800` over UDP, a 100 ms send interval, and an empty
//! address list.

use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use crate::error::{ConfigErrorKind, Result, TallyError};
use crate::source::TallySource;

pub const DEFAULT_CONFIG_FILE: &str = "config.json";
pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 9800;
pub const DEFAULT_SEND_INTERVAL_MS: u64 = 100;

/// Delivery mechanism for UMD messages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TransportKind {
    #[default]
    Udp,
    Tcp,
}

impl FromStr for TransportKind {
    type Err = TallyError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "udp" => Ok(Self::Udp),
            "tcp" => Ok(Self::Tcp),
            _ => Err(TallyError::InvalidTransport(s.to_string())),
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Udp => write!(f, "udp"),
            Self::Tcp => write!(f, "tcp"),
        }
    }
}

/// Destination of the tally stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub transport: TransportKind,
}

impl ServerConfig {
    /// `host:port`, as shown in logs.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            transport: TransportKind::Udp,
        }
    }
}

/// Fully resolved configuration: destination, sources and send rate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub server: ServerConfig,
    pub sources: Vec<TallySource>,
    pub send_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            sources: Vec::new(),
            send_interval: Duration::from_millis(DEFAULT_SEND_INTERVAL_MS),
        }
    }
}

impl Config {
    /// Read and parse a configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| TallyError::Config {
            path: path.to_path_buf(),
            kind: if e.kind() == ErrorKind::NotFound {
                ConfigErrorKind::NotFound
            } else {
                ConfigErrorKind::Unreadable(e)
            },
        })?;

        Self::parse(&contents).map_err(|e| TallyError::Config {
            path: path.to_path_buf(),
            kind: ConfigErrorKind::Malformed(e),
        })
    }

    /// Like [`load`](Self::load), but any failure is logged and replaced
    /// by the defaults with an empty address list.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        tracing::info!(path = %path.display(), "loading configuration");

        let config = match Self::load(path) {
            Ok(config) => config,
            Err(TallyError::Config {
                kind: ConfigErrorKind::NotFound,
                ..
            }) => {
                tracing::error!(path = %path.display(), "the config file could not be found");
                Self::default()
            }
            Err(e) => {
                tracing::error!(error = %e, "an error occurred while loading the configuration file");
                Self::default()
            }
        };

        tracing::info!(
            sources = config.sources.len(),
            "config loading complete"
        );
        config
    }

    /// Parse configuration text.
    ///
    /// Only text that is not JSON at all is an error. Every other problem
    /// is local: a mistyped `server_config` field keeps its default, and an
    /// `addresses` entry that is not a usable source is logged and skipped
    /// while the rest of the document still applies.
    pub fn parse(json: &str) -> std::result::Result<Self, serde_json::Error> {
        let doc: Value = serde_json::from_str(json)?;
        let mut config = Config::default();

        let Some(doc) = doc.as_object() else {
            tracing::warn!("configuration is not a JSON object, using defaults");
            return Ok(config);
        };

        if let Some(server) = doc.get("server_config").and_then(Value::as_object) {
            match server.get("ip") {
                None | Some(Value::Null) => {}
                Some(Value::String(ip)) if ip.is_empty() => {}
                Some(Value::String(ip)) => config.server.host = ip.clone(),
                Some(other) => tracing::warn!(ip = %other, default = DEFAULT_HOST, "ignoring unusable ip"),
            }

            if let Some(port) = server.get("port").filter(|v| !v.is_null()) {
                match parse_port(port) {
                    Some(p) => config.server.port = p,
                    None => tracing::warn!(%port, default = DEFAULT_PORT, "ignoring unusable port"),
                }
            }

            match server.get("transport") {
                None | Some(Value::Null) => {}
                Some(Value::String(tag)) if tag.is_empty() => {}
                Some(Value::String(tag)) => match tag.parse() {
                    Ok(kind) => config.server.transport = kind,
                    Err(e) => tracing::error!(error = %e, "falling back to udp"),
                },
                Some(other) => tracing::error!(transport = %other, "unknown transport, falling back to udp"),
            }
        }

        if let Some(ms) = doc
            .get("send_interval_ms")
            .and_then(Value::as_u64)
            .filter(|ms| *ms > 0)
        {
            config.send_interval = Duration::from_millis(ms);
        }

        if let Some(addresses) = doc.get("addresses").and_then(Value::as_array) {
            tracing::info!(count = addresses.len(), "loading TSL addresses");
            config.sources = addresses
                .iter()
                .enumerate()
                .filter_map(|(i, entry)| {
                    TallySource::deserialize(entry)
                        .inspect_err(|e| {
                            tracing::warn!(index = i, %entry, error = %e, "skipping unusable address entry")
                        })
                        .ok()
                })
                .collect();
        }

        Ok(config)
    }
}

/// Ports appear both as numbers and as numeric strings in the wild.
fn parse_port(value: &Value) -> Option<u16> {
    let port = match value {
        Value::Number(n) => u16::try_from(n.as_u64()?).ok()?,
        Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    (port != 0).then_some(port)
}
