//! Reply definitions
//!
//! Represents frames received from the instrument.

use std::fmt;

use crate::error::{Result, SolstisError};
use super::{Operation, Value};

/// Op token the instrument sends when it cannot parse a command
pub const PARSE_FAIL_OP: &str = "parse_fail";

/// Suffix of final-report op tokens (`set_wave_m_f_r`)
pub const REPORT_SUFFIX: &str = "_f_r";

/// Status carried in a reply's `status` parameter
///
/// Most operations report a small integer; a few (`start_link`,
/// `pba_reference_status`) report a word.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StatusCode {
    Code(i64),
    Word(String),
}

impl From<i64> for StatusCode {
    fn from(code: i64) -> Self {
        StatusCode::Code(code)
    }
}

impl From<&str> for StatusCode {
    fn from(word: &str) -> Self {
        StatusCode::Word(word.to_string())
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusCode::Code(code) => write!(f, "{}", code),
            StatusCode::Word(word) => write!(f, "'{}'", word),
        }
    }
}

/// What kind of frame arrived, decided from its op token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// Answer to a command (`<op>_reply`)
    Reply,
    /// Unsolicited final report (`<op>_f_r`)
    Report,
    /// The instrument rejected an unparseable message
    ParseFail,
}

impl FrameKind {
    pub fn classify(op: &str) -> Self {
        if op == PARSE_FAIL_OP {
            FrameKind::ParseFail
        } else if op.ends_with(REPORT_SUFFIX) {
            FrameKind::Report
        } else {
            FrameKind::Reply
        }
    }
}

/// A decoded frame from the instrument
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    /// Transmission id echoed from the command
    pub transmission_id: u32,

    /// Raw op token (`move_wave_t_reply`, `parse_fail`, ...)
    pub op: String,

    /// Value of the `status` parameter, if present
    pub status: Option<StatusCode>,

    /// Remaining parameters in received order
    pub fields: Vec<(String, Value)>,
}

impl Reply {
    /// Create the reply the instrument would send for `operation`
    pub fn to(transmission_id: u32, operation: Operation, status: Option<StatusCode>) -> Self {
        Self {
            transmission_id,
            op: operation.reply_op(),
            status,
            fields: Vec::new(),
        }
    }

    /// Create a `parse_fail` frame
    pub fn parse_fail(transmission_id: u32) -> Self {
        Self {
            transmission_id,
            op: PARSE_FAIL_OP.to_string(),
            status: None,
            fields: Vec::new(),
        }
    }

    /// Append a payload field
    pub fn field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.push((name.into(), value.into()));
        self
    }

    pub fn kind(&self) -> FrameKind {
        FrameKind::classify(&self.op)
    }

    /// True if this frame is the reply to `operation`
    pub fn answers(&self, operation: Operation) -> bool {
        self.op.strip_suffix("_reply") == Some(operation.as_str())
    }

    /// Look up a payload field by name
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }

    fn require(&self, name: &str) -> Result<&Value> {
        self.get(name).ok_or_else(|| {
            SolstisError::MalformedReply(format!("{}: missing field '{}'", self.op, name))
        })
    }

    /// Required numeric field
    pub fn f64_field(&self, name: &str) -> Result<f64> {
        let value = self.require(name)?;
        value.as_f64().ok_or_else(|| {
            SolstisError::MalformedReply(format!(
                "{}: field '{}' is not a number: {}",
                self.op, name, value
            ))
        })
    }

    /// Required integer field
    pub fn i64_field(&self, name: &str) -> Result<i64> {
        let value = self.require(name)?;
        value.as_i64().ok_or_else(|| {
            SolstisError::MalformedReply(format!(
                "{}: field '{}' is not an integer: {}",
                self.op, name, value
            ))
        })
    }

    /// Required string field
    pub fn str_field(&self, name: &str) -> Result<&str> {
        let value = self.require(name)?;
        value.as_str().ok_or_else(|| {
            SolstisError::MalformedReply(format!(
                "{}: field '{}' is not a string: {}",
                self.op, name, value
            ))
        })
    }

    /// Required 0/1 flag field
    pub fn flag_field(&self, name: &str) -> Result<bool> {
        match self.i64_field(name)? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(SolstisError::MalformedReply(format!(
                "{}: field '{}' is not a 0/1 flag: {}",
                self.op, name, other
            ))),
        }
    }
}
