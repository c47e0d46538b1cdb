//! Status interpretation
//!
//! Status meanings are operation-specific: code 1 means "setting out of
//! range" for `tune_etalon` but "tuning in progress" for
//! `poll_move_wave_t`. The table below is keyed by (operation, status) and
//! is the only place status codes are given meaning.
//!
//! ## Outcomes
//! - `Success`: the result is returned to the caller
//! - `InProgress`: an informational state reported by a poll; also returned
//! - `Failure`: raised as [`SolstisError::Instrument`]
//!
//! A status missing from the table raises [`SolstisError::UnknownStatus`].

use crate::error::{Result, SolstisError};
use super::{Operation, StatusCode};

/// How a documented status is surfaced to the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    InProgress,
    Failure,
}

/// Key of a table entry; words are used by `start_link` and `pba_reference_status`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKey {
    Code(i64),
    Word(&'static str),
}

impl StatusKey {
    pub fn matches(&self, status: &StatusCode) -> bool {
        match (self, status) {
            (StatusKey::Code(a), StatusCode::Code(b)) => a == b,
            (StatusKey::Word(a), StatusCode::Word(b)) => *a == b.as_str(),
            _ => false,
        }
    }

    pub fn to_status(self) -> StatusCode {
        match self {
            StatusKey::Code(code) => StatusCode::Code(code),
            StatusKey::Word(word) => StatusCode::Word(word.to_string()),
        }
    }
}

/// One documented status of one operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusEntry {
    pub key: StatusKey,
    pub meaning: &'static str,
    pub outcome: Outcome,
}

const fn ok(code: i64, meaning: &'static str) -> StatusEntry {
    StatusEntry { key: StatusKey::Code(code), meaning, outcome: Outcome::Success }
}

const fn busy(code: i64, meaning: &'static str) -> StatusEntry {
    StatusEntry { key: StatusKey::Code(code), meaning, outcome: Outcome::InProgress }
}

const fn fail(code: i64, meaning: &'static str) -> StatusEntry {
    StatusEntry { key: StatusKey::Code(code), meaning, outcome: Outcome::Failure }
}

const fn word(word: &'static str, meaning: &'static str, outcome: Outcome) -> StatusEntry {
    StatusEntry { key: StatusKey::Word(word), meaning, outcome }
}

const NO_METER: &str = "no link to wavelength meter or no meter configured";
const TERASCAN_UNAVAILABLE: &str = "TeraScan not available";
const REF_CAVITY_NOT_FITTED: &str = "reference cavity not fitted";
const ERC_NOT_FITTED: &str = "ERC not fitted";
const INVALID_SCAN_TYPE: &str = "invalid scan type";

const TUNE: &[StatusEntry] = &[
    ok(0, "operation completed"),
    fail(1, "setting out of range"),
    fail(2, "command failed"),
];

const COMPLETED_OR_FAILED: &[StatusEntry] = &[
    ok(0, "operation completed"),
    fail(1, "operation failed"),
];

const COMPLETED_OR_COMMAND_FAILED: &[StatusEntry] = &[
    ok(0, "operation completed"),
    fail(1, "command failed"),
];

const SUCCESSFUL_OR_FAILED: &[StatusEntry] = &[
    ok(0, "operation successful"),
    fail(1, "operation failed"),
];

const SUCCESSFUL_OR_COMMAND_FAILED: &[StatusEntry] = &[
    ok(0, "operation successful"),
    fail(1, "command failed"),
];

const NO_MESSAGE: &[StatusEntry] = &[ok(0, "no message")];

const TOLERANCE: &[StatusEntry] = &[
    ok(0, "operation successful"),
    fail(1, "no link to wavelength meter or meter not configured"),
    fail(2, "tolerance value out of range"),
];

/// The (operation, status) table, one row per operation
pub static STATUS_TABLE: &[(Operation, &[StatusEntry])] = &[
    (Operation::SetWaveM, &[
        ok(0, "command successful"),
        fail(1, NO_METER),
        fail(2, "wavelength out of range"),
    ]),
    (Operation::PollWaveM, &[
        ok(0, "tuning software not active"),
        fail(1, NO_METER),
        busy(2, "tuning in progress"),
        ok(3, "wavelength lock is being maintained"),
    ]),
    (Operation::LockWaveM, &[
        ok(0, "operation successful"),
        fail(1, NO_METER),
    ]),
    (Operation::StopWaveM, &[
        ok(0, "operation successful"),
        fail(1, "no link to wavelength meter"),
    ]),
    (Operation::MoveWaveT, &[
        ok(0, "operation successful"),
        fail(1, "command failed"),
        fail(2, "wavelength out of range"),
    ]),
    (Operation::PollMoveWaveT, &[
        ok(0, "tuning completed"),
        busy(1, "tuning in progress"),
        fail(2, "tuning operation failed"),
    ]),
    (Operation::StopMoveWaveT, &[ok(0, "operation completed")]),
    (Operation::TuneEtalon, TUNE),
    (Operation::TuneCavity, TUNE),
    (Operation::FineTuneCavity, TUNE),
    (Operation::TuneResonator, TUNE),
    (Operation::FineTuneResonator, TUNE),
    (Operation::EtalonLock, COMPLETED_OR_FAILED),
    (Operation::EtalonLockStatus, COMPLETED_OR_COMMAND_FAILED),
    (Operation::RefCavityLock, COMPLETED_OR_FAILED),
    (Operation::RefCavityLockStatus, COMPLETED_OR_COMMAND_FAILED),
    (Operation::EcdLock, &[
        ok(0, "operation completed"),
        fail(1, "operation failed"),
        fail(2, "ECD not fitted"),
    ]),
    (Operation::EcdLockStatus, COMPLETED_OR_COMMAND_FAILED),
    (Operation::MonitorA, COMPLETED_OR_FAILED),
    (Operation::MonitorB, COMPLETED_OR_FAILED),
    (Operation::SelectProfile, COMPLETED_OR_FAILED),
    (Operation::GetStatus, COMPLETED_OR_FAILED),
    (Operation::GetAlignmentStatus, NO_MESSAGE),
    (Operation::BeamAlignment, &[
        ok(0, "operation completed"),
        fail(1, "operation failed, not fitted"),
    ]),
    (Operation::BeamAdjustX, NO_MESSAGE),
    (Operation::BeamAdjustY, &[
        ok(0, "operation completed"),
        fail(1, "operation failed, not fitted"),
        fail(2, "operation failed, value out of range"),
        fail(3, "operation failed, not in manual mode"),
    ]),
    (Operation::ScanStitchInitialise, &[
        ok(0, "operation completed"),
        fail(1, "start out of range"),
        fail(2, "stop out of range"),
        fail(3, "scan out of range"),
        fail(4, TERASCAN_UNAVAILABLE),
    ]),
    (Operation::ScanStitchOp, &[
        ok(0, "operation completed"),
        fail(1, "operation failed"),
        fail(2, TERASCAN_UNAVAILABLE),
    ]),
    (Operation::ScanStitchStatus, &[
        ok(0, "not active"),
        busy(1, "in progress"),
        fail(2, TERASCAN_UNAVAILABLE),
    ]),
    (Operation::ScanStitchOutput, &[
        ok(0, "operation completed"),
        fail(1, "operation failed"),
        fail(3, TERASCAN_UNAVAILABLE),
    ]),
    (Operation::TerascanOutput, &[
        ok(0, "operation completed"),
        fail(1, "operation failed"),
        fail(2, "delay period out of range"),
        fail(3, "update step out of range"),
        fail(4, TERASCAN_UNAVAILABLE),
    ]),
    (Operation::FastScanStart, &[
        ok(0, "successful, scan in progress"),
        fail(1, "failed, scan width too great for current tuning position"),
        fail(2, "failed, reference cavity not fitted"),
        fail(3, "failed, ERC not fitted"),
        fail(4, INVALID_SCAN_TYPE),
        fail(5, "time greater than 10000 seconds"),
    ]),
    (Operation::FastScanPoll, &[
        ok(0, "scan not in progress"),
        busy(1, "scan in progress"),
        fail(2, REF_CAVITY_NOT_FITTED),
        fail(3, ERC_NOT_FITTED),
        fail(4, INVALID_SCAN_TYPE),
    ]),
    (Operation::FastScanStop, &[
        ok(0, "operation completed"),
        fail(1, "operation failed"),
        fail(2, REF_CAVITY_NOT_FITTED),
        fail(3, ERC_NOT_FITTED),
        fail(4, INVALID_SCAN_TYPE),
    ]),
    (Operation::FastScanStopNr, &[
        ok(0, "operation completed"),
        fail(1, "operation failed"),
        fail(2, REF_CAVITY_NOT_FITTED),
        fail(4, INVALID_SCAN_TYPE),
    ]),
    (Operation::PbaReference, &[
        ok(0, "operation completed"),
        fail(1, "operation failed, not fitted"),
    ]),
    (Operation::PbaReferenceStatus, &[
        word("not_fitted", "beam alignment is not fitted to this system", Outcome::Failure),
        word("off", "PBA reference is not running", Outcome::Success),
        word("tuning", "tuning to the reference wavelength", Outcome::InProgress),
        word("optimising", "optimising the PBA", Outcome::InProgress),
    ]),
    (Operation::GetWavelengthRange, NO_MESSAGE),
    (Operation::TerascanContinue, &[
        ok(0, "operation completed"),
        fail(1, "operation failed, TeraScan was not paused"),
        fail(2, TERASCAN_UNAVAILABLE),
    ]),
    (Operation::ReadAllAdc, COMPLETED_OR_FAILED),
    (Operation::SetWaveToleranceM, TOLERANCE),
    (Operation::SetWaveLockToleranceM, TOLERANCE),
    (Operation::DigitalPidControl, SUCCESSFUL_OR_COMMAND_FAILED),
    (Operation::DigitalPidPoll, SUCCESSFUL_OR_COMMAND_FAILED),
    (Operation::SetWMeterChannel, &[
        ok(0, "operation successful"),
        fail(1, "command failed"),
        fail(2, "channel out of range"),
    ]),
    (Operation::LockWaveMFixed, &[
        ok(0, "operation successful"),
        fail(1, NO_METER),
    ]),
    (Operation::GpioOutput, SUCCESSFUL_OR_FAILED),
    (Operation::DacRamping, SUCCESSFUL_OR_FAILED),
    (Operation::DacRampingPoll, SUCCESSFUL_OR_FAILED),
    (Operation::DigitalPotOutput, SUCCESSFUL_OR_FAILED),
    (Operation::DacOutput, &[
        ok(0, "operation successful"),
        fail(1, "operation failed"),
        fail(2, "output value out of range"),
    ]),
    (Operation::StartLink, &[
        word("ok", "link established", Outcome::Success),
        word("failed", "failed to start link", Outcome::Failure),
    ]),
    (Operation::Ping, NO_MESSAGE),
];

/// All documented statuses of `operation`
pub fn entries(operation: Operation) -> &'static [StatusEntry] {
    STATUS_TABLE
        .iter()
        .find(|(op, _)| *op == operation)
        .map(|(_, entries)| *entries)
        .unwrap_or(&[])
}

/// Find the documented meaning of `status` for `operation`
pub fn lookup(operation: Operation, status: &StatusCode) -> Option<&'static StatusEntry> {
    entries(operation).iter().find(|entry| entry.key.matches(status))
}

/// Map a reply status to an outcome, raising for failures and gaps
///
/// `Success` and `InProgress` come back as `Ok`; the caller decides what an
/// in-progress poll means for its workflow.
pub fn interpret(operation: Operation, status: Option<&StatusCode>) -> Result<Outcome> {
    let status = match status {
        Some(status) => status,
        None if !operation.reply_has_status() => return Ok(Outcome::Success),
        None => {
            return Err(SolstisError::MalformedReply(format!(
                "{}: missing field 'status'",
                operation.reply_op()
            )))
        }
    };

    match lookup(operation, status) {
        Some(entry) if entry.outcome == Outcome::Failure => Err(SolstisError::Instrument {
            operation,
            code: status.clone(),
            meaning: entry.meaning,
        }),
        Some(entry) => Ok(entry.outcome),
        None => Err(SolstisError::UnknownStatus {
            operation,
            code: status.clone(),
        }),
    }
}
