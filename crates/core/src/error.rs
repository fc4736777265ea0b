//! Error types for the tally sender library.

use std::fmt;
use std::path::PathBuf;

/// Errors that can occur in the tally sender library.
///
/// Variants map to specific failure modes across the stack:
///
/// - **Transport**: [`Io`](Self::Io), [`NotConnected`](Self::NotConnected),
///   [`AddressResolution`](Self::AddressResolution).
/// - **Configuration**: [`Config`](Self::Config),
///   [`InvalidTransport`](Self::InvalidTransport).
/// - **Service**: [`NotStarted`](Self::NotStarted),
///   [`AlreadyRunning`](Self::AlreadyRunning).
///
/// None of these terminate the sender. The scheduler logs per-tick
/// failures and keeps its cadence; only constructors hand errors back.
#[derive(Debug, thiserror::Error)]
pub enum TallyError {
    /// Underlying I/O or socket error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A send was attempted on a stream that is not in the `Connected` state,
    /// or on a datagram socket that has already been closed.
    #[error("transport not connected")]
    NotConnected,

    /// `host:port` did not resolve to any socket address.
    #[error("could not resolve destination: {0}")]
    AddressResolution(String),

    /// The configuration file could not be read or parsed.
    #[error("configuration error in {}: {kind}", .path.display())]
    Config { path: PathBuf, kind: ConfigErrorKind },

    /// Transport tag other than `udp` or `tcp`.
    #[error("unknown transport: {0}")]
    InvalidTransport(String),

    /// [`Service::start`](crate::Service::start) has not been called yet.
    #[error("service not started")]
    NotStarted,

    /// [`Service::start`](crate::Service::start) was called while already running.
    #[error("service already running")]
    AlreadyRunning,
}

/// Specific kind of configuration failure.
#[derive(Debug)]
pub enum ConfigErrorKind {
    /// The file does not exist.
    NotFound,
    /// The file exists but could not be read.
    Unreadable(std::io::Error),
    /// The file is not valid JSON or does not have the expected shape.
    Malformed(serde_json::Error),
}

impl fmt::Display for ConfigErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "file not found"),
            Self::Unreadable(e) => write!(f, "unreadable: {e}"),
            Self::Malformed(e) => write!(f, "malformed: {e}"),
        }
    }
}

/// Convenience alias for `Result<T, TallyError>`.
pub type Result<T> = std::result::Result<T, TallyError>;
