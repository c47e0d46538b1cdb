//! # Solstis
//!
//! A blocking TCP client for the SolsTiS tunable laser controller:
//! - JSON command codec with brace-balanced framing
//! - One connection, one command in flight
//! - Typed commands with per-operation status interpretation
//! - An in-process simulator of the instrument for tests and demos
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      SolstisClient                           │
//! │        (transmission ids, correlation, typed results)        │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │   Session   │          │   Status    │
//!   │ (TcpStream) │          │   Table     │
//!   └──────┬──────┘          └─────────────┘
//!          │
//!          ▼
//!   ┌─────────────┐
//!   │    Codec    │
//!   │   (JSON)    │
//!   └─────────────┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use solstis::{Config, SolstisClient};
//!
//! let config = Config::builder().host("192.168.1.222").port(39933).build();
//! let mut client = SolstisClient::connect(&config)?;
//! client.start_link()?;
//! client.set_wave_m(780.25)?;
//! let poll = client.poll_wave_m()?;
//! println!("at {} nm", poll.current_wavelength);
//! # Ok::<(), solstis::SolstisError>(())
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod protocol;
pub mod network;
pub mod client;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{Result, SolstisError};
pub use config::Config;
pub use client::SolstisClient;
pub use protocol::{Operation, StatusCode};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of the solstis crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
