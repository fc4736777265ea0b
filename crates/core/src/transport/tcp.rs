use std::fmt;
use std::io::Write;
use std::net::{Shutdown, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use super::{ConnectionState, Transport, resolve};
use crate::config::TransportKind;
use crate::error::{Result, TallyError};
use crate::protocol::Message;

/// How long a connect attempt may take before it is reported as failed.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Upper bound on a single write, kept well below the send interval so a
/// stalled receiver cannot hold up the next tick.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_millis(250);

/// Persistent TCP stream to the tally receiver.
///
/// [`connect`](Transport::connect) returns immediately; name resolution and
/// the handshake run on a short-lived thread, which installs the stream
/// when both succeed and marks the transport `Failed` otherwise.
/// Until then, and after any write failure, [`send`](Transport::send)
/// returns [`TallyError::NotConnected`].
pub struct TcpTransport {
    endpoint: Endpoint,
    shared: Arc<Mutex<Shared>>,
    connect_timeout: Duration,
    write_timeout: Duration,
}

struct Shared {
    state: ConnectionState,
    stream: Option<TcpStream>,
    /// Bumped on every connect and close so a late handshake from an
    /// earlier attempt can tell it is stale.
    attempt: u64,
}

#[derive(Clone)]
struct Endpoint {
    host: String,
    port: u16,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl TcpTransport {
    pub fn new(host: &str, port: u16) -> Self {
        Self::with_timeouts(host, port, DEFAULT_CONNECT_TIMEOUT, DEFAULT_WRITE_TIMEOUT)
    }

    pub fn with_timeouts(
        host: &str,
        port: u16,
        connect_timeout: Duration,
        write_timeout: Duration,
    ) -> Self {
        Self {
            endpoint: Endpoint {
                host: host.to_string(),
                port,
            },
            shared: Arc::new(Mutex::new(Shared {
                state: ConnectionState::Idle,
                stream: None,
                attempt: 0,
            })),
            connect_timeout,
            write_timeout,
        }
    }

    /// Block until the connection leaves `Connecting` or `timeout` elapses,
    /// returning the state observed last.
    pub fn wait_settled(&self, timeout: Duration) -> ConnectionState {
        let deadline = Instant::now() + timeout;
        loop {
            let state = self.shared.lock().state;
            if state != ConnectionState::Connecting || Instant::now() >= deadline {
                return state;
            }
            thread::sleep(Duration::from_millis(5));
        }
    }

    fn establish(
        shared: Arc<Mutex<Shared>>,
        endpoint: Endpoint,
        attempt: u64,
        connect_timeout: Duration,
        write_timeout: Duration,
    ) {
        let result = resolve(&endpoint.host, endpoint.port).and_then(|dest| {
            let stream = TcpStream::connect_timeout(&dest, connect_timeout)?;
            stream.set_nodelay(true)?;
            stream.set_write_timeout(Some(write_timeout))?;
            Ok(stream)
        });

        let mut shared = shared.lock();
        if shared.attempt != attempt || shared.state != ConnectionState::Connecting {
            tracing::debug!(dest = %endpoint, "discarding stale connect attempt");
            return;
        }

        match result {
            Ok(stream) => {
                shared.stream = Some(stream);
                shared.state = ConnectionState::Connected;
                tracing::info!(target: "tally::config", dest = %endpoint, "TSL connection established");
            }
            Err(e) => {
                shared.state = ConnectionState::Failed;
                tracing::error!(dest = %endpoint, error = %e, "an error occurred with the connection");
            }
        }
    }
}

impl Transport for TcpTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Tcp
    }

    fn connect(&mut self) -> Result<()> {
        let attempt = {
            let mut shared = self.shared.lock();
            if matches!(
                shared.state,
                ConnectionState::Connecting | ConnectionState::Connected
            ) {
                return Ok(());
            }
            shared.attempt += 1;
            shared.state = ConnectionState::Connecting;
            shared.attempt
        };

        tracing::debug!(dest = %self.endpoint, attempt, "connecting");

        let shared = self.shared.clone();
        let endpoint = self.endpoint.clone();
        let connect_timeout = self.connect_timeout;
        let write_timeout = self.write_timeout;
        let spawned = thread::Builder::new()
            .name("tsl-tcp-connect".into())
            .spawn(move || {
                Self::establish(shared, endpoint, attempt, connect_timeout, write_timeout)
            });

        if let Err(e) = spawned {
            self.shared.lock().state = ConnectionState::Failed;
            return Err(e.into());
        }
        Ok(())
    }

    fn send(&mut self, message: &Message) -> Result<usize> {
        let mut shared = self.shared.lock();
        if shared.state != ConnectionState::Connected {
            return Err(TallyError::NotConnected);
        }
        let stream = shared.stream.as_mut().ok_or(TallyError::NotConnected)?;

        match stream.write_all(message.as_ref()) {
            Ok(()) => Ok(message.as_ref().len()),
            Err(e) => {
                shared.stream = None;
                shared.state = ConnectionState::Failed;
                tracing::error!(dest = %self.endpoint, error = %e, "TSL stream failed");
                Err(e.into())
            }
        }
    }

    fn close(&mut self) -> Result<()> {
        let mut shared = self.shared.lock();
        shared.attempt += 1;
        let previous = shared.state;
        shared.state = ConnectionState::Closed;

        if let Some(mut stream) = shared.stream.take() {
            let flushed = stream.flush();
            let shutdown = stream.shutdown(Shutdown::Write);
            tracing::info!(target: "tally::config", dest = %self.endpoint, "TSL connection closed");
            flushed?;
            shutdown?;
        } else if previous != ConnectionState::Closed {
            tracing::debug!(dest = %self.endpoint, %previous, "closed without an open stream");
        }
        Ok(())
    }

    fn state(&self) -> ConnectionState {
        self.shared.lock().state
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::debug!(error = %e, "error closing stream on drop");
        }
    }
}
