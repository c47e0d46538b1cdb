//! Instrument Simulator
//!
//! A TCP server that speaks the instrument's command protocol. Used by the
//! test suite and the `solstis-sim` binary.
//!
//! ## Architecture
//! - Acceptor thread polling a non-blocking listener
//! - One thread per client connection
//! - Shared instrument state (wavelength, lock) behind a mutex
//! - Per-operation scripts override the default replies, one use each

use std::collections::{HashMap, VecDeque};
use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use bytes::BytesMut;
use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;

use crate::error::{Result, SolstisError};
use crate::protocol::status::{self, Outcome};
use crate::protocol::{
    decode_command, read_frame, write_frame, write_reply, Command, Operation, Reply, StatusCode,
    Value, MAX_FRAME_SIZE,
};

/// How often idle threads check for shutdown
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// A one-shot override for the next command of an operation
pub enum Script {
    /// Reply with this status and payload
    Respond {
        status: Option<StatusCode>,
        fields: Vec<(String, Value)>,
    },
    /// Build the reply from the received command
    Build(Box<dyn Fn(&Command) -> Reply + Send>),
    /// Write these bytes verbatim
    Raw(Vec<u8>),
    /// Write these bytes, then drop the connection
    RawThenClose(Vec<u8>),
    /// Read the command and never answer
    Silent,
    /// Drop the connection without answering
    Close,
}

impl Script {
    /// Reply with a numeric status and no payload
    pub fn status(code: i64) -> Self {
        Script::Respond {
            status: Some(StatusCode::Code(code)),
            fields: Vec::new(),
        }
    }

    /// Reply with a status word (`start_link`, `pba_reference_status`)
    pub fn word(word: &str) -> Self {
        Script::Respond {
            status: Some(StatusCode::Word(word.to_string())),
            fields: Vec::new(),
        }
    }

    /// Reply with a numeric status and the given payload
    pub fn reply(code: i64, fields: Vec<(&str, Value)>) -> Self {
        Script::Respond {
            status: Some(StatusCode::Code(code)),
            fields: fields
                .into_iter()
                .map(|(name, value)| (name.to_string(), value))
                .collect(),
        }
    }
}

/// Simulated laser state
#[derive(Debug, Clone)]
struct Instrument {
    wavelength: f64,
    locked: bool,
}

struct Shared {
    instrument: Mutex<Instrument>,
    scripts: Mutex<HashMap<Operation, VecDeque<Script>>>,
    received: Sender<Command>,
    shutdown: AtomicBool,
}

/// TCP instrument simulator
pub struct Simulator {
    addr: SocketAddr,
    shared: Arc<Shared>,
    received: Receiver<Command>,
    acceptor: Option<JoinHandle<()>>,
}

impl Simulator {
    /// Start a simulator on an ephemeral localhost port
    pub fn start() -> Result<Self> {
        Self::bind("127.0.0.1:0")
    }

    /// Start a simulator listening on `addr`
    pub fn bind(addr: &str) -> Result<Self> {
        let listener = TcpListener::bind(addr).map_err(|source| SolstisError::Connection {
            addr: addr.to_string(),
            source,
        })?;
        let addr = listener.local_addr().map_err(SolstisError::Transport)?;
        listener.set_nonblocking(true).map_err(SolstisError::Transport)?;

        let (tx, rx) = channel::unbounded();
        let shared = Arc::new(Shared {
            instrument: Mutex::new(Instrument {
                wavelength: 780.0,
                locked: false,
            }),
            scripts: Mutex::new(HashMap::new()),
            received: tx,
            shutdown: AtomicBool::new(false),
        });

        let acceptor = {
            let shared = Arc::clone(&shared);
            thread::Builder::new()
                .name("solstis-sim-accept".to_string())
                .spawn(move || accept_loop(listener, shared))
                .map_err(SolstisError::Transport)?
        };

        tracing::info!("Simulator listening on {}", addr);

        Ok(Self {
            addr,
            shared,
            received: rx,
            acceptor: Some(acceptor),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Queue a one-shot script for the next `operation` command
    pub fn script(&self, operation: Operation, script: Script) {
        self.shared
            .scripts
            .lock()
            .entry(operation)
            .or_default()
            .push_back(script);
    }

    /// Commands received so far that have not been taken yet
    pub fn received(&self) -> Vec<Command> {
        self.received.try_iter().collect()
    }

    /// Wait up to `timeout` for the next received command
    pub fn next_command(&self, timeout: Duration) -> Option<Command> {
        self.received.recv_timeout(timeout).ok()
    }

    /// Current simulated wavelength in nm
    pub fn wavelength(&self) -> f64 {
        self.shared.instrument.lock().wavelength
    }

    /// Whether the simulated wavelength lock is engaged
    pub fn is_locked(&self) -> bool {
        self.shared.instrument.lock().locked
    }

    /// Block until the acceptor thread exits (after `shutdown`)
    pub fn run(&mut self) {
        if let Some(handle) = self.acceptor.take() {
            let _ = handle.join();
        }
    }

    /// Signal all simulator threads to stop
    pub fn shutdown(&self) {
        self.shared.shutdown.store(true, Ordering::Relaxed);
    }
}

impl Drop for Simulator {
    fn drop(&mut self) {
        self.shutdown();
        self.run();
    }
}

fn accept_loop(listener: TcpListener, shared: Arc<Shared>) {
    while !shared.shutdown.load(Ordering::Relaxed) {
        match listener.accept() {
            Ok((stream, peer)) => {
                tracing::debug!("Simulator accepted {}", peer);
                let shared = Arc::clone(&shared);
                let spawned = thread::Builder::new()
                    .name("solstis-sim-conn".to_string())
                    .spawn(move || {
                        if let Err(e) = serve(stream, &shared) {
                            tracing::debug!("Simulator connection {} ended: {}", peer, e);
                        }
                    });
                if let Err(e) = spawned {
                    tracing::warn!("Simulator could not spawn connection thread: {}", e);
                }
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => thread::sleep(POLL_INTERVAL),
            Err(e) => {
                tracing::warn!("Simulator accept failed: {}", e);
                thread::sleep(POLL_INTERVAL);
            }
        }
    }
    tracing::debug!("Simulator acceptor stopped");
}

/// Serve one client connection until it closes or the simulator stops
fn serve(mut stream: TcpStream, shared: &Shared) -> Result<()> {
    stream.set_nonblocking(false).map_err(SolstisError::Transport)?;
    stream
        .set_read_timeout(Some(POLL_INTERVAL))
        .map_err(SolstisError::Transport)?;

    let mut buf = BytesMut::with_capacity(1024);

    loop {
        if shared.shutdown.load(Ordering::Relaxed) {
            return Ok(());
        }

        let frame = match read_frame(&mut stream, &mut buf, MAX_FRAME_SIZE) {
            Ok(frame) => frame,
            Err(SolstisError::Transport(ref e))
                if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) =>
            {
                continue;
            }
            Err(e) => return Err(e),
        };

        let command = match decode_command(&frame) {
            Ok(command) => command,
            Err(e) => {
                tracing::debug!("Simulator could not parse command: {}", e);
                write_reply(&mut stream, &Reply::parse_fail(0))?;
                continue;
            }
        };

        tracing::trace!("Simulator received {:?}", command);
        let _ = shared.received.send(command.clone());

        let script = shared
            .scripts
            .lock()
            .get_mut(&command.operation())
            .and_then(VecDeque::pop_front);

        match script {
            None => write_reply(&mut stream, &default_reply(&command, shared))?,
            Some(Script::Respond { status, fields }) => {
                let mut reply = Reply::to(command.transmission_id(), command.operation(), status);
                reply.fields = fields;
                write_reply(&mut stream, &reply)?;
            }
            Some(Script::Build(build)) => write_reply(&mut stream, &build(&command))?,
            Some(Script::Raw(bytes)) => write_frame(&mut stream, &bytes)?,
            Some(Script::RawThenClose(bytes)) => {
                write_frame(&mut stream, &bytes)?;
                return Ok(());
            }
            Some(Script::Silent) => {}
            Some(Script::Close) => return Ok(()),
        }
    }
}

/// The answer a healthy instrument gives
fn default_reply(command: &Command, shared: &Shared) -> Reply {
    let id = command.transmission_id();
    let operation = command.operation();
    let mut instrument = shared.instrument.lock();
    let requested = command.get("wavelength").and_then(Value::as_f64);

    match operation {
        Operation::Ping => {
            let text = command.get("text_in").and_then(Value::as_str).unwrap_or("");
            Reply::to(id, operation, None).field("text_out", swap_case(text))
        }
        Operation::SetWaveM => {
            if let Some(nm) = requested {
                instrument.wavelength = nm;
            }
            Reply::to(id, operation, Some(StatusCode::Code(0)))
                .field("current_wavelength", instrument.wavelength)
                .field("extended_zone", 0)
        }
        Operation::PollWaveM => {
            let status = if instrument.locked { 3 } else { 0 };
            Reply::to(id, operation, Some(StatusCode::Code(status)))
                .field("current_wavelength", instrument.wavelength)
                .field("lock_status", i64::from(instrument.locked))
                .field("extended_zone", 0)
        }
        Operation::LockWaveM => {
            instrument.locked = command.get("operation").and_then(Value::as_str) == Some("on");
            Reply::to(id, operation, Some(StatusCode::Code(0)))
        }
        Operation::StopWaveM => {
            instrument.locked = false;
            Reply::to(id, operation, Some(StatusCode::Code(0)))
                .field("current_wavelength", instrument.wavelength)
        }
        Operation::MoveWaveT => {
            if let Some(nm) = requested {
                instrument.wavelength = nm;
            }
            Reply::to(id, operation, Some(StatusCode::Code(0)))
        }
        Operation::PollMoveWaveT => Reply::to(id, operation, Some(StatusCode::Code(0)))
            .field("current_wavelength", instrument.wavelength),
        _ => {
            let status = status::entries(operation)
                .iter()
                .find(|entry| entry.outcome == Outcome::Success)
                .map(|entry| entry.key.to_status());
            Reply::to(id, operation, status)
        }
    }
}

fn swap_case(text: &str) -> String {
    text.chars()
        .flat_map(|c| {
            if c.is_uppercase() {
                c.to_lowercase().collect::<Vec<_>>()
            } else {
                c.to_uppercase().collect::<Vec<_>>()
            }
        })
        .collect()
}
