//! Protocol Module
//!
//! Defines the JSON command protocol spoken by the instrument.
//!
//! ## Message Format
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ {"message": {                                                │
//! │     "transmission_id": [id],     client-allocated, echoed    │
//! │     "op": "<op>",                "<op>_reply" in answers     │
//! │     "parameters": {...}          omitted when empty          │
//! │ }}                                                           │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ### Frame Kinds
//! - `<op>_reply`: answer to a command
//! - `parse_fail`: the instrument could not parse a command
//! - `<op>_f_r`: final report (never requested by this client)
//!
//! ### Status Codes
//! Meanings are per operation; see [`status`].

mod command;
mod response;
mod codec;
pub mod status;

pub use command::{Command, Operation, Value};
pub use response::{FrameKind, Reply, StatusCode, PARSE_FAIL_OP, REPORT_SUFFIX};
pub use codec::{
    decode_command, decode_reply, encode_command, encode_reply, is_blank, is_complete,
    read_frame, write_command, write_frame, write_reply, FrameScanner, Scan, MAX_FRAME_SIZE,
};
pub use status::{Outcome, StatusEntry, StatusKey};
