//! Transport Session
//!
//! Owns the TCP connection to the instrument.
//!
//! ## State Machine
//! ```text
//! Unconnected ──open()──▶ Connected ──close() / I/O fault──▶ Closed
//!      │                                                       ▲
//!      └──────────────────────close()──────────────────────────┘
//! ```
//!
//! `send_and_receive` takes `&mut self`, so at most one command can be in
//! flight per session. Any transport or framing fault closes the session:
//! the protocol has no way to resynchronise once a frame boundary is lost.

use std::fmt;
use std::io;
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use bytes::BytesMut;
use socket2::{Domain, Protocol, Socket, Type};

use crate::config::{Config, Endpoint};
use crate::error::{Result, SolstisError};
use crate::protocol::{is_blank, read_frame, write_frame};

/// Lifecycle of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unconnected,
    Connected,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Unconnected => "unconnected",
            SessionState::Connected => "connected",
            SessionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// A single TCP session with the instrument
pub struct Session {
    /// Remote endpoint, fixed at construction
    endpoint: Endpoint,

    state: SessionState,

    stream: Option<TcpStream>,

    /// Receive buffer; empty between exchanges
    buf: BytesMut,

    connect_timeout: Option<Duration>,
    read_timeout: Option<Duration>,
    write_timeout: Option<Duration>,
    max_frame_size: usize,
}

impl Session {
    /// Create an unconnected session for the endpoint in `config`
    pub fn new(config: &Config) -> Self {
        Self {
            endpoint: config.endpoint(),
            state: SessionState::Unconnected,
            stream: None,
            buf: BytesMut::with_capacity(1024),
            connect_timeout: config.connect_timeout,
            read_timeout: config.read_timeout,
            write_timeout: config.write_timeout,
            max_frame_size: config.max_frame_size,
        }
    }

    /// Create a session and connect it
    pub fn connect(config: &Config) -> Result<Self> {
        let mut session = Self::new(config);
        session.open()?;
        Ok(session)
    }

    /// Connect to the endpoint
    ///
    /// On failure the session stays `Unconnected` and may be opened again.
    pub fn open(&mut self) -> Result<()> {
        if self.state != SessionState::Unconnected {
            return Err(SolstisError::InvalidState {
                state: self.state,
                action: "open session",
            });
        }

        let remote = self.endpoint.remote();
        tracing::info!("Connecting to {}", remote);

        let stream = self.establish(&remote).map_err(|source| {
            tracing::warn!("Connection to {} failed: {}", remote, source);
            SolstisError::Connection {
                addr: remote.clone(),
                source,
            }
        })?;

        tracing::debug!(
            "Connected to {} from {}",
            remote,
            stream
                .local_addr()
                .map(|a| a.to_string())
                .unwrap_or_else(|_| "unknown".to_string())
        );

        self.stream = Some(stream);
        self.state = SessionState::Connected;
        Ok(())
    }

    /// Resolve and connect, trying each resolved address in turn
    fn establish(&self, remote: &str) -> io::Result<TcpStream> {
        let mut last_err = None;

        for addr in remote.to_socket_addrs()? {
            match self.connect_one(addr) {
                Ok(stream) => {
                    // Requests are tiny; do not wait to coalesce them
                    stream.set_nodelay(true)?;
                    stream.set_read_timeout(self.read_timeout)?;
                    stream.set_write_timeout(self.write_timeout)?;
                    return Ok(stream);
                }
                Err(e) => {
                    tracing::debug!("Connect attempt to {} failed: {}", addr, e);
                    last_err = Some(e);
                }
            }
        }

        Err(last_err.unwrap_or_else(|| {
            io::Error::new(io::ErrorKind::AddrNotAvailable, "host resolved to no addresses")
        }))
    }

    /// Connect to one address, from the configured local address if any
    fn connect_one(&self, addr: SocketAddr) -> io::Result<TcpStream> {
        let local = match self.endpoint.local_address {
            Some(ip) => ip,
            None => {
                return match self.connect_timeout {
                    Some(timeout) => TcpStream::connect_timeout(&addr, timeout),
                    None => TcpStream::connect(addr),
                }
            }
        };

        if local.is_ipv4() != addr.is_ipv4() {
            return Err(io::Error::new(
                io::ErrorKind::AddrNotAvailable,
                format!("local address {} cannot reach {}", local, addr),
            ));
        }

        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
        socket.bind(&SocketAddr::new(local, 0).into())?;
        match self.connect_timeout {
            Some(timeout) => socket.connect_timeout(&addr.into(), timeout)?,
            None => socket.connect(&addr.into())?,
        }

        tracing::trace!("Bound {} for connection to {}", local, addr);
        Ok(socket.into())
    }

    /// Send one encoded command and wait for its complete reply frame
    ///
    /// Blocks for the write and for the read. Returns exactly the reply
    /// frame's bytes. A transport or framing fault closes the session.
    pub fn send_and_receive(&mut self, command: &[u8]) -> Result<Vec<u8>> {
        if self.state != SessionState::Connected {
            return Err(SolstisError::InvalidState {
                state: self.state,
                action: "send command",
            });
        }

        match self.exchange(command) {
            Ok(frame) => Ok(frame),
            Err(e) => {
                self.fault(&e);
                Err(e)
            }
        }
    }

    fn exchange(&mut self, command: &[u8]) -> Result<Vec<u8>> {
        let stream = self.stream.as_mut().ok_or(SolstisError::InvalidState {
            state: self.state,
            action: "send command",
        })?;

        tracing::trace!("Sending {} bytes to {}", command.len(), self.endpoint.remote());
        write_frame(stream, command)?;

        let frame = read_frame(stream, &mut self.buf, self.max_frame_size)?;

        // One command in flight: nothing may follow the reply
        if !is_blank(&self.buf) {
            let extra = self.buf.len();
            return Err(SolstisError::MalformedReply(format!(
                "{} unexpected bytes after reply frame",
                extra
            )));
        }
        self.buf.clear();

        tracing::trace!("Received {} byte reply", frame.len());
        Ok(frame)
    }

    fn fault(&mut self, err: &SolstisError) {
        tracing::warn!("Closing session to {} after fault: {}", self.endpoint.remote(), err);
        self.close();
    }

    /// Close the connection; safe to call more than once
    pub fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            // The peer may already be gone
            let _ = stream.shutdown(Shutdown::Both);
            tracing::debug!("Closed session to {}", self.endpoint.remote());
        }
        self.buf.clear();
        self.state = SessionState::Closed;
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == SessionState::Connected
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Local socket address, while connected
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.stream.as_ref().and_then(|s| s.local_addr().ok())
    }

    /// Remote socket address, while connected
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.stream.as_ref().and_then(|s| s.peer_addr().ok())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}
