//! Network Module
//!
//! TCP transport to the instrument, and a simulator that plays the
//! instrument's side.
//!
//! ## Architecture
//! - `Session`: one blocking connection, one command in flight
//! - `Simulator`: acceptor thread plus a thread per connection
//! - Framing lives in the protocol codec; reading a frame is separate from
//!   deciding what kind of frame it is

mod session;
mod simulator;

pub use session::{Session, SessionState};
pub use simulator::{Script, Simulator};
