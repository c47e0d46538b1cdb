//! Command definitions
//!
//! Represents commands sent to the instrument.

use std::fmt;
use std::str::FromStr;

use crate::error::SolstisError;

macro_rules! operations {
    ($($variant:ident = $id:literal => $wire:literal,)+) => {
        /// Instrument operations, numbered as in the vendor command reference
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[repr(u8)]
        pub enum Operation {
            $($variant = $id,)+
        }

        impl Operation {
            /// Every operation, in protocol-number order
            pub const ALL: &'static [Operation] = &[$(Operation::$variant,)+];

            /// Wire token sent in the `op` field
            pub fn as_str(self) -> &'static str {
                match self {
                    $(Operation::$variant => $wire,)+
                }
            }

            /// Look up an operation by its wire token
            pub fn from_wire(op: &str) -> Option<Self> {
                match op {
                    $($wire => Some(Operation::$variant),)+
                    _ => None,
                }
            }
        }
    };
}

operations! {
    SetWaveM = 1 => "set_wave_m",
    PollWaveM = 2 => "poll_wave_m",
    LockWaveM = 3 => "lock_wave_m",
    StopWaveM = 4 => "stop_wave_m",
    MoveWaveT = 5 => "move_wave_t",
    PollMoveWaveT = 6 => "poll_move_wave_t",
    StopMoveWaveT = 7 => "stop_move_wave_t",
    TuneEtalon = 8 => "tune_etalon",
    TuneCavity = 9 => "tune_cavity",
    FineTuneCavity = 10 => "fine_tune_cavity",
    TuneResonator = 11 => "tune_resonator",
    FineTuneResonator = 12 => "fine_tune_resonator",
    EtalonLock = 13 => "etalon_lock",
    EtalonLockStatus = 14 => "etalon_lock_status",
    RefCavityLock = 15 => "ref_cavity_lock",
    RefCavityLockStatus = 16 => "ref_cavity_lock_status",
    EcdLock = 17 => "ecd_lock",
    EcdLockStatus = 18 => "ecd_lock_status",
    MonitorA = 19 => "monitor_a",
    MonitorB = 20 => "monitor_b",
    SelectProfile = 21 => "select_profile",
    GetStatus = 22 => "get_status",
    GetAlignmentStatus = 23 => "get_alignment_status",
    BeamAlignment = 24 => "beam_alignment",
    BeamAdjustX = 25 => "beam_adjust_x",
    BeamAdjustY = 26 => "beam_adjust_y",
    ScanStitchInitialise = 27 => "scan_stitch_initialise",
    ScanStitchOp = 28 => "scan_stitch_op",
    ScanStitchStatus = 29 => "scan_stitch_status",
    ScanStitchOutput = 30 => "scan_stitch_output",
    TerascanOutput = 31 => "terascan_output",
    FastScanStart = 32 => "fast_scan_start",
    FastScanPoll = 33 => "fast_scan_poll",
    FastScanStop = 34 => "fast_scan_stop",
    FastScanStopNr = 35 => "fast_scan_stop_nr",
    PbaReference = 36 => "pba_reference",
    PbaReferenceStatus = 37 => "pba_reference_status",
    GetWavelengthRange = 38 => "get_wavelength_range",
    TerascanContinue = 39 => "terascan_continue",
    ReadAllAdc = 40 => "read_all_adc",
    SetWaveToleranceM = 41 => "set_wave_tolerance_m",
    SetWaveLockToleranceM = 42 => "set_wave_lock_tolerance_m",
    DigitalPidControl = 43 => "digital_pid_control",
    DigitalPidPoll = 44 => "digital_pid_poll",
    SetWMeterChannel = 45 => "set_w_meter_channel",
    LockWaveMFixed = 46 => "lock_wave_m_fixed",
    GpioOutput = 47 => "gpio_output",
    DacRamping = 48 => "dac_ramping",
    DacRampingPoll = 49 => "dac_ramping_poll",
    DigitalPotOutput = 50 => "digital_pot_output",
    DacOutput = 51 => "dac_output",
    StartLink = 100 => "start_link",
    Ping = 101 => "ping",
}

impl Operation {
    /// Protocol number of this operation
    pub fn id(self) -> u8 {
        self as u8
    }

    /// Op token the instrument uses when answering this operation
    pub fn reply_op(self) -> String {
        format!("{}_reply", self.as_str())
    }

    /// Whether the reply to this operation carries a `status` parameter
    ///
    /// `ping` answers with `text_out` only.
    pub fn reply_has_status(self) -> bool {
        !matches!(self, Operation::Ping)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = SolstisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Operation::from_wire(s)
            .ok_or_else(|| SolstisError::InvalidParameter(format!("unknown operation '{}'", s)))
    }
}

// =============================================================================
// Parameter Values
// =============================================================================

/// A primitive value carried in a command parameter or reply field
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    Str(String),
    /// Multi-element array, as some readouts return
    List(Vec<Value>),
}

impl Value {
    /// Numeric value as f64 (integers widen)
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Integer value; floats with no fractional part are accepted
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            Value::Float(f) if f.fract() == 0.0 && f.is_finite() => Some(*f as i64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n.into())
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Int(n.into())
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(v) => write!(f, "{}", v),
            Value::Str(s) => f.write_str(s),
            Value::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
        }
    }
}

// =============================================================================
// Command
// =============================================================================

/// A single outbound request
///
/// Built per call and discarded after it is sent. A retry must build a new
/// command with a fresh transmission id.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    transmission_id: u32,
    operation: Operation,
    parameters: Vec<(String, Value)>,
}

impl Command {
    /// Create a command with no parameters
    pub fn new(transmission_id: u32, operation: Operation) -> Self {
        Self {
            transmission_id,
            operation,
            parameters: Vec::new(),
        }
    }

    /// Append a named parameter (order is kept on the wire)
    pub fn param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.push((name.into(), value.into()));
        self
    }

    pub fn transmission_id(&self) -> u32 {
        self.transmission_id
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    pub fn parameters(&self) -> &[(String, Value)] {
        &self.parameters
    }

    /// Look up a parameter by name
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.parameters
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }
}
