//! Command Client
//!
//! The caller-facing façade over the codec and the transport session.
//!
//! ## Responsibilities
//! - Allocate a fresh transmission id for every command
//! - Encode, send, and wait for the matching reply
//! - Reject replies that answer a different command
//! - Interpret the status through the (operation, status) table
//! - Turn reply payloads into typed results
//!
//! Nothing here retries. After an error the request is finished; a retry
//! is a new command with a new transmission id.

use std::net::IpAddr;

use crate::config::Config;
use crate::error::{Result, SolstisError};
use crate::network::{Session, SessionState};
use crate::protocol::status::{self, Outcome};
use crate::protocol::{
    decode_reply, encode_command, Command, FrameKind, Operation, Reply, StatusCode, Value,
};

/// Largest transmission id before the counter wraps to 0
pub const MAX_TRANSMISSION_ID: u32 = (1 << 30) - 1;

/// Allocates transmission ids 1, 2, 3, ... wrapping to 0 after the maximum
#[derive(Debug, Default, Clone)]
pub struct TransmissionIds {
    last: u32,
}

impl TransmissionIds {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start so that the next id handed out is `last + 1`
    pub fn starting_after(last: u32) -> Self {
        Self { last }
    }

    pub fn next_id(&mut self) -> u32 {
        self.last = self.last.wrapping_add(1);
        if self.last > MAX_TRANSMISSION_ID {
            self.last = 0;
        }
        self.last
    }
}

// =============================================================================
// Typed Results
// =============================================================================

/// Wavelength meter reading returned by `set_wave_m`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WavelengthReading {
    /// Most recent wavelength meter reading in nm
    pub current_wavelength: f64,
    /// Whether the current wavelength lies in an extended zone
    pub extended_zone: bool,
}

/// State of the wavelength-meter tuning software
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaveMeterState {
    /// Tuning software not active
    Idle,
    /// Tuning in progress
    Tuning,
    /// Target wavelength is being maintained
    Maintained,
}

/// Result of `poll_wave_m`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WaveMeterPoll {
    pub state: WaveMeterState,
    pub current_wavelength: f64,
    pub lock_engaged: bool,
    pub extended_zone: bool,
}

/// State of a table-based (`move_wave_t`) tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TuningState {
    Completed,
    InProgress,
}

/// Result of `poll_move_wave_t`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TableTuningPoll {
    pub state: TuningState,
    pub current_wavelength: f64,
}

// =============================================================================
// Client
// =============================================================================

/// Blocking command client for one instrument
///
/// Not meant to be shared between threads: callers that need concurrency
/// should serialize access themselves or use one client per worker.
pub struct SolstisClient {
    session: Session,
    ids: TransmissionIds,
    client_address: Option<IpAddr>,
}

impl SolstisClient {
    /// Connect to the instrument described by `config`
    pub fn connect(config: &Config) -> Result<Self> {
        let session = Session::connect(config)?;
        Ok(Self::from_session(session))
    }

    /// Wrap an already-constructed session
    pub fn from_session(session: Session) -> Self {
        let client_address = session.endpoint().local_address;
        Self {
            session,
            ids: TransmissionIds::new(),
            client_address,
        }
    }

    /// Start a command for `operation` with a fresh transmission id
    pub fn command(&mut self, operation: Operation) -> Command {
        Command::new(self.ids.next_id(), operation)
    }

    /// Send a command and return its reply once the status is interpreted
    ///
    /// Replies with a `Success` or `InProgress` status are returned;
    /// documented failures raise `Instrument`, undocumented statuses raise
    /// `UnknownStatus`.
    pub fn issue(&mut self, command: Command) -> Result<Reply> {
        let operation = command.operation();
        tracing::debug!(
            op = operation.as_str(),
            transmission_id = command.transmission_id(),
            "Issuing command"
        );

        check_parameters(&command)?;

        let frame = self.session.send_and_receive(&encode_command(&command))?;
        let reply = decode_reply(&frame)?;

        if let Err(e) = check_correlation(&command, &reply) {
            // A stray frame means the stream no longer lines up with our commands
            if !matches!(e, SolstisError::ParseFailed { .. }) {
                self.session.close();
            }
            return Err(e);
        }

        let outcome = status::interpret(operation, reply.status.as_ref()).map_err(|e| {
            tracing::debug!(op = operation.as_str(), error = %e, "Command did not succeed");
            e
        })?;

        if outcome == Outcome::InProgress {
            tracing::debug!(op = operation.as_str(), "Instrument reports operation in progress");
        }

        Ok(reply)
    }

    fn issue_simple(&mut self, operation: Operation) -> Result<Reply> {
        let command = self.command(operation);
        self.issue(command)
    }

    // =========================================================================
    // Link
    // =========================================================================

    /// Announce this client to the instrument
    ///
    /// Uses the configured client address, or the local address of the
    /// connection when none is configured.
    pub fn start_link(&mut self) -> Result<()> {
        let address = match self.client_address {
            Some(address) => address,
            None => self
                .session
                .local_addr()
                .map(|addr| addr.ip())
                .ok_or(SolstisError::InvalidState {
                    state: self.session.state(),
                    action: "start link",
                })?,
        };

        let command = self
            .command(Operation::StartLink)
            .param("ip_address", address.to_string());
        self.issue(command)?;
        tracing::info!("Link started as {}", address);
        Ok(())
    }

    /// Echo `text` through the instrument (it answers with the case swapped)
    pub fn ping(&mut self, text: &str) -> Result<String> {
        let command = self.command(Operation::Ping).param("text_in", text);
        let reply = self.issue(command)?;
        Ok(reply.str_field("text_out")?.to_string())
    }

    // =========================================================================
    // Wavelength Meter Tuning
    // =========================================================================

    /// Tune to `wavelength` nm using the wavelength meter
    pub fn set_wave_m(&mut self, wavelength: f64) -> Result<WavelengthReading> {
        check_wavelength(wavelength)?;
        let command = self.command(Operation::SetWaveM).param("wavelength", wavelength);
        let reply = self.issue(command)?;

        Ok(WavelengthReading {
            current_wavelength: reply.f64_field("current_wavelength")?,
            extended_zone: reply.flag_field("extended_zone")?,
        })
    }

    /// Query the wavelength-meter tuning state
    pub fn poll_wave_m(&mut self) -> Result<WaveMeterPoll> {
        let reply = self.issue_simple(Operation::PollWaveM)?;

        let state = match reply.status {
            Some(StatusCode::Code(0)) => WaveMeterState::Idle,
            Some(StatusCode::Code(2)) => WaveMeterState::Tuning,
            Some(StatusCode::Code(3)) => WaveMeterState::Maintained,
            _ => return Err(unmapped_status(Operation::PollWaveM, &reply)),
        };

        Ok(WaveMeterPoll {
            state,
            current_wavelength: reply.f64_field("current_wavelength")?,
            lock_engaged: reply.flag_field("lock_status")?,
            extended_zone: reply.flag_field("extended_zone")?,
        })
    }

    /// Engage (`true`) or release (`false`) the wavelength lock
    pub fn lock_wave_m(&mut self, engage: bool) -> Result<()> {
        let command = self
            .command(Operation::LockWaveM)
            .param("operation", if engage { "on" } else { "off" });
        self.issue(command)?;
        Ok(())
    }

    /// Stop wavelength-meter tuning; returns the last meter reading in nm
    pub fn stop_wave_m(&mut self) -> Result<f64> {
        let reply = self.issue_simple(Operation::StopWaveM)?;
        reply.f64_field("current_wavelength")
    }

    // =========================================================================
    // Table Tuning
    // =========================================================================

    /// Tune to `wavelength` nm using the internal wavelength table
    pub fn move_wave_t(&mut self, wavelength: f64) -> Result<()> {
        check_wavelength(wavelength)?;
        let command = self.command(Operation::MoveWaveT).param("wavelength", wavelength);
        self.issue(command)?;
        Ok(())
    }

    /// Query the table-tuning state
    pub fn poll_move_wave_t(&mut self) -> Result<TableTuningPoll> {
        let reply = self.issue_simple(Operation::PollMoveWaveT)?;

        let state = match reply.status {
            Some(StatusCode::Code(0)) => TuningState::Completed,
            Some(StatusCode::Code(1)) => TuningState::InProgress,
            _ => return Err(unmapped_status(Operation::PollMoveWaveT, &reply)),
        };

        Ok(TableTuningPoll {
            state,
            current_wavelength: reply.f64_field("current_wavelength")?,
        })
    }

    /// Abort a table tuning in progress
    pub fn stop_move_wave_t(&mut self) -> Result<()> {
        self.issue_simple(Operation::StopMoveWaveT)?;
        Ok(())
    }

    // =========================================================================
    // Manual Tuning (percent of full scale)
    // =========================================================================

    pub fn tune_etalon(&mut self, setting: f64) -> Result<()> {
        self.tune(Operation::TuneEtalon, setting)
    }

    pub fn tune_cavity(&mut self, setting: f64) -> Result<()> {
        self.tune(Operation::TuneCavity, setting)
    }

    pub fn fine_tune_cavity(&mut self, setting: f64) -> Result<()> {
        self.tune(Operation::FineTuneCavity, setting)
    }

    pub fn tune_resonator(&mut self, setting: f64) -> Result<()> {
        self.tune(Operation::TuneResonator, setting)
    }

    pub fn fine_tune_resonator(&mut self, setting: f64) -> Result<()> {
        self.tune(Operation::FineTuneResonator, setting)
    }

    fn tune(&mut self, operation: Operation, setting: f64) -> Result<()> {
        if !(0.0..=100.0).contains(&setting) {
            return Err(SolstisError::InvalidParameter(format!(
                "{} setting {} is outside 0..=100",
                operation, setting
            )));
        }
        let command = self.command(operation).param("setting", setting);
        self.issue(command)?;
        Ok(())
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Close the connection; safe to call more than once
    pub fn close(&mut self) {
        self.session.close();
    }

    pub fn session_state(&self) -> SessionState {
        self.session.state()
    }

    pub fn session(&self) -> &Session {
        &self.session
    }
}

/// Check that `reply` answers `command` and nothing else
fn check_correlation(command: &Command, reply: &Reply) -> Result<()> {
    let operation = command.operation();

    match reply.kind() {
        FrameKind::ParseFail => {
            tracing::warn!(op = operation.as_str(), "Instrument could not parse command");
            return Err(SolstisError::ParseFailed {
                transmission_id: reply.transmission_id,
            });
        }
        FrameKind::Report => {
            tracing::warn!(op = %reply.op, "Report frame received on command path");
            return Err(SolstisError::UnexpectedReport {
                op: reply.op.clone(),
            });
        }
        FrameKind::Reply => {}
    }

    if !reply.answers(operation) {
        tracing::warn!(expected = %operation.reply_op(), actual = %reply.op, "Reply operation mismatch");
        return Err(SolstisError::OperationMismatch {
            expected: operation.reply_op(),
            actual: reply.op.clone(),
        });
    }

    if reply.transmission_id != command.transmission_id() {
        tracing::warn!(
            expected = command.transmission_id(),
            actual = reply.transmission_id,
            "Reply transmission id mismatch"
        );
        return Err(SolstisError::TransmissionMismatch {
            expected: command.transmission_id(),
            actual: reply.transmission_id,
        });
    }

    Ok(())
}

/// Reject values the wire format cannot carry
fn check_parameters(command: &Command) -> Result<()> {
    fn finite(value: &Value) -> bool {
        match value {
            Value::Float(f) => f.is_finite(),
            Value::List(items) => items.iter().all(finite),
            _ => true,
        }
    }

    match command.parameters().iter().find(|(_, value)| !finite(value)) {
        Some((name, value)) => Err(SolstisError::InvalidParameter(format!(
            "{} parameter '{}' is not finite: {}",
            command.operation(),
            name,
            value
        ))),
        None => Ok(()),
    }
}

fn check_wavelength(wavelength: f64) -> Result<()> {
    if wavelength.is_finite() && wavelength > 0.0 {
        Ok(())
    } else {
        Err(SolstisError::InvalidParameter(format!(
            "wavelength {} nm is not a positive finite number",
            wavelength
        )))
    }
}

/// A status the table accepted but the typed result has no state for
fn unmapped_status(operation: Operation, reply: &Reply) -> SolstisError {
    match &reply.status {
        Some(code) => SolstisError::UnknownStatus {
            operation,
            code: code.clone(),
        },
        None => SolstisError::MalformedReply(format!("{}: missing field 'status'", reply.op)),
    }
}
