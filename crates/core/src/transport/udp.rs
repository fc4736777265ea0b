use std::net::{SocketAddr, UdpSocket};

use super::{ConnectionState, Transport, resolve};
use crate::config::TransportKind;
use crate::error::{Result, TallyError};
use crate::protocol::Message;

/// UDP transport for UMD messages.
///
/// Sends every message as one datagram from an ephemeral local socket
/// (`0.0.0.0:0`, or `[::]:0` for IPv6 receivers). There is no handshake;
/// the receiver address is resolved on [`connect`](Transport::connect),
/// and again on each send until a lookup succeeds, so an unreachable name
/// costs one logged error per tick rather than stopping the sender.
pub struct UdpTransport {
    host: String,
    port: u16,
    socket: Option<UdpSocket>,
    dest: Option<SocketAddr>,
    state: ConnectionState,
}

impl UdpTransport {
    /// Create a transport for `host:port`. No socket is opened until
    /// [`connect`](Transport::connect) or the first send.
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            host: host.to_string(),
            port,
            socket: None,
            dest: None,
            state: ConnectionState::Idle,
        }
    }

    /// Resolve the receiver and bind the local socket if not done yet.
    fn ready(&mut self) -> Result<(&UdpSocket, SocketAddr)> {
        let dest = match self.dest {
            Some(dest) => dest,
            None => match resolve(&self.host, self.port) {
                Ok(dest) => {
                    self.dest = Some(dest);
                    dest
                }
                Err(e) => {
                    self.state = ConnectionState::Failed;
                    return Err(e);
                }
            },
        };

        if self.socket.is_none() {
            let local = if dest.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
            let socket = UdpSocket::bind(local).inspect_err(|_| {
                self.state = ConnectionState::Failed;
            })?;
            tracing::debug!(local = ?socket.local_addr().ok(), %dest, "UDP socket bound");
            self.socket = Some(socket);
        }
        self.state = ConnectionState::Connected;

        match &self.socket {
            Some(socket) => Ok((socket, dest)),
            None => Err(TallyError::NotConnected),
        }
    }
}

impl Transport for UdpTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Udp
    }

    fn connect(&mut self) -> Result<()> {
        if self.state == ConnectionState::Closed {
            self.state = ConnectionState::Idle;
        }
        self.ready().map(|_| ())
    }

    fn send(&mut self, message: &Message) -> Result<usize> {
        if self.state == ConnectionState::Closed {
            return Err(TallyError::NotConnected);
        }
        let (socket, dest) = self.ready()?;
        Ok(socket.send_to(message.as_ref(), dest)?)
    }

    fn close(&mut self) -> Result<()> {
        if self.socket.take().is_some() {
            tracing::info!(
                target: "tally::config",
                dest = %format_args!("{}:{}", self.host, self.port),
                "TSL connection closed"
            );
        }
        self.state = ConnectionState::Closed;
        Ok(())
    }

    fn state(&self) -> ConnectionState {
        self.state
    }
}
