//! Delivery of encoded UMD messages to a single receiver.
//!
//! Two interchangeable mechanisms sit behind the [`Transport`] trait:
//!
//! - **UDP** ([`udp`]): connectionless. `connect` only resolves the
//!   receiver and binds a local socket; every message is a
//!   fire-and-forget datagram to `host:port`.
//!
//! - **TCP** ([`tcp`]): one persistent stream. `connect` starts the
//!   handshake on a background thread; sends are refused with
//!   [`TallyError::NotConnected`] until it completes.
//!
//! ## Stream lifecycle
//!
//! ```text
//! Idle -> Connecting -> Connected -> Closed
//!            |              |
//!            v              v
//!          Failed <---------+  (write error)
//! ```
//!
//! Nothing reconnects on its own. After `Failed`, the owner has to call
//! [`Transport::connect`] again.

pub mod tcp;
pub mod udp;

use std::fmt;
use std::net::{SocketAddr, ToSocketAddrs};

use crate::config::{ServerConfig, TransportKind};
use crate::error::{Result, TallyError};
use crate::protocol::Message;

pub use tcp::TcpTransport;
pub use udp::UdpTransport;

/// Connection state reported by a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Created, `connect` not called yet.
    Idle,
    /// Stream handshake in flight.
    Connecting,
    /// Ready to send.
    Connected,
    /// Closed by the owner.
    Closed,
    /// The connect attempt or a later write failed.
    Failed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Closed => "closed",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Send-only channel to one tally receiver.
pub trait Transport: Send {
    /// Which mechanism this is.
    fn kind(&self) -> TransportKind;

    /// Begin (or, after a failure, retry) the connection.
    fn connect(&mut self) -> Result<()>;

    /// Deliver one message. Returns the number of bytes written.
    fn send(&mut self, message: &Message) -> Result<usize>;

    /// Release the socket. Stream transports flush and send FIN first.
    fn close(&mut self) -> Result<()>;

    fn state(&self) -> ConnectionState;
}

/// The transport selected by configuration.
pub enum Link {
    Udp(UdpTransport),
    Tcp(TcpTransport),
}

impl Link {
    /// Build the transport named by `config.transport`.
    ///
    /// No I/O happens here. The destination is resolved by
    /// [`Transport::connect`], so an unknown host surfaces as a logged
    /// connection failure instead of preventing the sender from starting.
    pub fn from_config(config: &ServerConfig) -> Self {
        match config.transport {
            TransportKind::Udp => {
                tracing::info!(target: "tally::config", "initiating TSL UDP socket");
                Link::Udp(UdpTransport::new(&config.host, config.port))
            }
            TransportKind::Tcp => {
                tracing::info!(target: "tally::config", "initiating TSL TCP socket");
                Link::Tcp(TcpTransport::new(&config.host, config.port))
            }
        }
    }

    fn inner(&self) -> &dyn Transport {
        match self {
            Link::Udp(t) => t,
            Link::Tcp(t) => t,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn Transport {
        match self {
            Link::Udp(t) => t,
            Link::Tcp(t) => t,
        }
    }
}

impl Transport for Link {
    fn kind(&self) -> TransportKind {
        self.inner().kind()
    }

    fn connect(&mut self) -> Result<()> {
        self.inner_mut().connect()
    }

    fn send(&mut self, message: &Message) -> Result<usize> {
        self.inner_mut().send(message)
    }

    fn close(&mut self) -> Result<()> {
        self.inner_mut().close()
    }

    fn state(&self) -> ConnectionState {
        self.inner().state()
    }
}

/// Resolve `host:port`, taking the first address returned.
pub fn resolve(host: &str, port: u16) -> Result<SocketAddr> {
    (host, port)
        .to_socket_addrs()
        .map_err(|e| TallyError::AddressResolution(format!("{host}:{port}: {e}")))?
        .next()
        .ok_or_else(|| TallyError::AddressResolution(format!("{host}:{port}")))
}
