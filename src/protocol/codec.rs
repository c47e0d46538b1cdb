//! Protocol codec
//!
//! Encoding and decoding functions for the wire protocol.
//!
//! ## Wire Format
//!
//! Every frame is one JSON object, in both directions:
//! ```text
//! {"message":{"transmission_id":[7],"op":"move_wave_t","parameters":{"wavelength":[780.25]}}}
//! ```
//!
//! - Numeric parameters travel as one-element arrays, strings travel bare
//! - `parameters` is omitted for commands that take none
//! - Replies answer with op `<op>_reply` and a `status` parameter
//!
//! ### Terminator
//! There is no delimiter byte. A frame ends at the brace that closes the
//! top-level object, so completeness is detected by a brace-depth scan that
//! skips over string literals.

use std::io::{self, Read, Write};

use bytes::BytesMut;
use serde::Deserialize;
use serde_json::{Map, Number, Value as Json};

use crate::error::{Result, SolstisError};
use super::{Command, Operation, Reply, StatusCode, Value};

/// Default upper bound for a single frame (64 KB)
pub const MAX_FRAME_SIZE: usize = 64 * 1024;

/// Bytes requested from the socket per read
const READ_CHUNK: usize = 1024;

// =============================================================================
// Frame Completeness
// =============================================================================

/// Result of scanning a receive buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scan {
    /// More bytes are needed
    Incomplete,
    /// A full frame occupies `buf[..len]`
    Complete(usize),
    /// Byte at this offset cannot start a frame
    Invalid(usize),
}

/// Resumable frame-boundary scanner
///
/// Feed it the whole accumulated buffer each time; it only looks at bytes
/// it has not seen yet.
#[derive(Debug, Default, Clone)]
pub struct FrameScanner {
    pos: usize,
    depth: usize,
    started: bool,
    in_string: bool,
    escaped: bool,
    end: Option<usize>,
}

impl FrameScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Continue scanning `buf` from where the previous call stopped
    pub fn feed(&mut self, buf: &[u8]) -> Scan {
        if let Some(end) = self.end {
            return Scan::Complete(end);
        }

        while self.pos < buf.len() {
            let i = self.pos;
            let byte = buf[i];
            self.pos += 1;

            if !self.started {
                if byte.is_ascii_whitespace() {
                    continue;
                }
                if byte != b'{' {
                    self.pos = i;
                    return Scan::Invalid(i);
                }
                self.started = true;
                self.depth = 1;
                continue;
            }

            if self.in_string {
                if self.escaped {
                    self.escaped = false;
                } else if byte == b'\\' {
                    self.escaped = true;
                } else if byte == b'"' {
                    self.in_string = false;
                }
                continue;
            }

            match byte {
                b'"' => self.in_string = true,
                b'{' | b'[' => self.depth += 1,
                b'}' | b']' => {
                    self.depth -= 1;
                    if self.depth == 0 {
                        self.end = Some(i + 1);
                        return Scan::Complete(i + 1);
                    }
                }
                _ => {}
            }
        }

        Scan::Incomplete
    }

    /// Forget all state and start at the beginning of a new buffer
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Report whether `buf` holds a full terminated frame
///
/// Never true for a strict prefix of a frame.
pub fn is_complete(buf: &[u8]) -> bool {
    matches!(FrameScanner::new().feed(buf), Scan::Complete(_))
}

/// True if `bytes` holds only whitespace
pub fn is_blank(bytes: &[u8]) -> bool {
    bytes.iter().all(u8::is_ascii_whitespace)
}

// =============================================================================
// Value Conversion
// =============================================================================

/// Encode a value the way the instrument expects: numbers wrapped in a
/// one-element array, strings bare
fn value_to_wire(value: &Value) -> Json {
    match value {
        Value::Int(_) | Value::Float(_) => Json::Array(vec![scalar_to_json(value)]),
        _ => scalar_to_json(value),
    }
}

fn scalar_to_json(value: &Value) -> Json {
    match value {
        Value::Int(n) => Json::Number(Number::from(*n)),
        Value::Float(f) => Number::from_f64(*f).map(Json::Number).unwrap_or(Json::Null),
        Value::Str(s) => Json::String(s.clone()),
        Value::List(items) => Json::Array(items.iter().map(scalar_to_json).collect()),
    }
}

fn value_from_wire(op: &str, name: &str, json: Json) -> Result<Value> {
    match json {
        Json::Number(n) => number_from_wire(op, name, &n),
        Json::String(s) => Ok(Value::Str(s)),
        Json::Array(mut items) if items.len() == 1 => {
            let only = items.remove(0);
            if only.is_array() {
                return Err(bad_field(op, name, "nested array"));
            }
            value_from_wire(op, name, only)
        }
        Json::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Json::Array(_) => Err(bad_field(op, name, "nested array")),
                other => value_from_wire(op, name, other),
            })
            .collect::<Result<Vec<_>>>()
            .map(Value::List),
        Json::Bool(_) => Err(bad_field(op, name, "boolean")),
        Json::Null => Err(bad_field(op, name, "null")),
        Json::Object(_) => Err(bad_field(op, name, "object")),
    }
}

fn number_from_wire(op: &str, name: &str, n: &Number) -> Result<Value> {
    if let Some(i) = n.as_i64() {
        Ok(Value::Int(i))
    } else if let Some(f) = n.as_f64() {
        Ok(Value::Float(f))
    } else {
        Err(bad_field(op, name, "number out of range"))
    }
}

fn bad_field(op: &str, name: &str, what: &str) -> SolstisError {
    SolstisError::MalformedReply(format!("{}: field '{}' holds unsupported {}", op, name, what))
}

fn status_to_wire(status: &StatusCode) -> Json {
    match status {
        StatusCode::Code(code) => Json::Array(vec![Json::Number(Number::from(*code))]),
        StatusCode::Word(word) => Json::String(word.clone()),
    }
}

fn status_from_wire(op: &str, json: Json) -> Result<StatusCode> {
    match value_from_wire(op, "status", json)? {
        Value::Int(code) => Ok(StatusCode::Code(code)),
        Value::Str(word) => Ok(StatusCode::Word(word)),
        other => Err(SolstisError::MalformedReply(format!(
            "{}: status is not an integer or word: {}",
            op, other
        ))),
    }
}

// =============================================================================
// Envelope
// =============================================================================

#[derive(Debug, Deserialize)]
struct WireEnvelope {
    message: WireMessage,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    transmission_id: WireId,
    op: String,
    #[serde(default)]
    parameters: Option<Map<String, Json>>,
}

/// The id is normally `[n]`; a bare number is tolerated
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireId {
    Wrapped([u32; 1]),
    Bare(u32),
}

impl WireId {
    fn get(&self) -> u32 {
        match self {
            WireId::Wrapped([id]) | WireId::Bare(id) => *id,
        }
    }
}

fn envelope(transmission_id: u32, op: &str, parameters: Option<Map<String, Json>>) -> Vec<u8> {
    let mut message = Map::new();
    message.insert(
        "transmission_id".to_string(),
        Json::Array(vec![Json::Number(Number::from(transmission_id))]),
    );
    message.insert("op".to_string(), Json::String(op.to_string()));
    if let Some(parameters) = parameters {
        message.insert("parameters".to_string(), Json::Object(parameters));
    }

    let mut root = Map::new();
    root.insert("message".to_string(), Json::Object(message));
    Json::Object(root).to_string().into_bytes()
}

/// Parse exactly one complete frame from `bytes`
fn parse_envelope(bytes: &[u8]) -> Result<WireMessage> {
    let len = match FrameScanner::new().feed(bytes) {
        Scan::Complete(len) => len,
        Scan::Incomplete => {
            return Err(SolstisError::MalformedReply(format!(
                "missing frame terminator after {} bytes",
                bytes.len()
            )))
        }
        Scan::Invalid(at) => {
            return Err(SolstisError::MalformedReply(format!(
                "unexpected byte 0x{:02x} at offset {} before frame start",
                bytes[at], at
            )))
        }
    };

    if !is_blank(&bytes[len..]) {
        return Err(SolstisError::MalformedReply(format!(
            "{} unexpected bytes after frame terminator",
            bytes.len() - len
        )));
    }

    let envelope: WireEnvelope = serde_json::from_slice(&bytes[..len])
        .map_err(|e| SolstisError::MalformedReply(format!("invalid message envelope: {}", e)))?;
    Ok(envelope.message)
}

// =============================================================================
// Command Encoding/Decoding
// =============================================================================

/// Encode a command to bytes
///
/// Deterministic: parameters are written in the order they were added.
pub fn encode_command(command: &Command) -> Vec<u8> {
    let parameters = if command.parameters().is_empty() {
        None
    } else {
        Some(
            command
                .parameters()
                .iter()
                .map(|(name, value)| (name.clone(), value_to_wire(value)))
                .collect::<Map<_, _>>(),
        )
    };

    envelope(command.transmission_id(), command.operation().as_str(), parameters)
}

/// Decode a command from bytes (instrument side)
pub fn decode_command(bytes: &[u8]) -> Result<Command> {
    let message = parse_envelope(bytes)?;
    let operation = Operation::from_wire(&message.op).ok_or_else(|| {
        SolstisError::MalformedReply(format!("unknown operation '{}'", message.op))
    })?;

    let mut command = Command::new(message.transmission_id.get(), operation);
    for (name, json) in message.parameters.unwrap_or_default() {
        let value = value_from_wire(&message.op, &name, json)?;
        command = command.param(name, value);
    }

    Ok(command)
}

// =============================================================================
// Reply Encoding/Decoding
// =============================================================================

/// Encode a reply to bytes (instrument side); `status` is written first
pub fn encode_reply(reply: &Reply) -> Vec<u8> {
    let mut parameters = Map::new();
    if let Some(status) = &reply.status {
        parameters.insert("status".to_string(), status_to_wire(status));
    }
    for (name, value) in &reply.fields {
        parameters.insert(name.clone(), value_to_wire(value));
    }

    let parameters = if parameters.is_empty() { None } else { Some(parameters) };
    envelope(reply.transmission_id, &reply.op, parameters)
}

/// Decode a reply from bytes
///
/// `bytes` must hold exactly one terminated frame (trailing whitespace is
/// allowed).
pub fn decode_reply(bytes: &[u8]) -> Result<Reply> {
    let message = parse_envelope(bytes)?;

    let mut status = None;
    let mut fields = Vec::new();
    for (name, json) in message.parameters.unwrap_or_default() {
        if name == "status" {
            status = Some(status_from_wire(&message.op, json)?);
        } else {
            let value = value_from_wire(&message.op, &name, json)?;
            fields.push((name, value));
        }
    }

    Ok(Reply {
        transmission_id: message.transmission_id.get(),
        op: message.op,
        status,
        fields,
    })
}

// =============================================================================
// Stream-based I/O helpers
// =============================================================================

/// Read one complete frame from a stream
///
/// Bytes are accumulated in `buf`; on success the frame is split off the
/// front and returned, and anything received after it stays in `buf`.
/// I/O failures map to `Transport`; framing problems map to `MalformedReply`.
pub fn read_frame<R: Read>(reader: &mut R, buf: &mut BytesMut, max_frame: usize) -> Result<Vec<u8>> {
    let mut scanner = FrameScanner::new();
    let mut chunk = [0u8; READ_CHUNK];

    loop {
        match scanner.feed(buf) {
            Scan::Complete(len) => return Ok(buf.split_to(len).to_vec()),
            Scan::Invalid(at) => {
                return Err(SolstisError::MalformedReply(format!(
                    "unexpected byte 0x{:02x} at offset {} before frame start",
                    buf[at], at
                )))
            }
            Scan::Incomplete => {}
        }

        if buf.len() > max_frame {
            return Err(SolstisError::MalformedReply(format!(
                "frame exceeds {} bytes without terminator",
                max_frame
            )));
        }

        let n = match reader.read(&mut chunk) {
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(SolstisError::Transport(e)),
        };

        if n == 0 {
            if is_blank(buf) {
                return Err(SolstisError::Transport(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed by peer",
                )));
            }
            return Err(SolstisError::MalformedReply(format!(
                "connection closed after {} bytes without frame terminator",
                buf.len()
            )));
        }

        tracing::trace!("Read {} bytes ({} buffered)", n, buf.len() + n);
        buf.extend_from_slice(&chunk[..n]);
    }
}

/// Write a command to a stream
pub fn write_command<W: Write>(writer: &mut W, command: &Command) -> Result<()> {
    write_frame(writer, &encode_command(command))
}

/// Write a reply to a stream
pub fn write_reply<W: Write>(writer: &mut W, reply: &Reply) -> Result<()> {
    write_frame(writer, &encode_reply(reply))
}

/// Write pre-encoded frame bytes and flush
pub fn write_frame<W: Write>(writer: &mut W, bytes: &[u8]) -> Result<()> {
    writer.write_all(bytes).map_err(SolstisError::Transport)?;
    writer.flush().map_err(SolstisError::Transport)?;
    Ok(())
}
