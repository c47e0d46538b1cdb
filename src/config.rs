//! Configuration for the SolsTiS client
//!
//! Centralized configuration with sensible defaults. Values are passed
//! explicitly to [`crate::SolstisClient::connect`]; nothing is read from
//! process-wide state unless [`Config::from_env`] is called.

use std::net::IpAddr;
use std::time::Duration;

use crate::error::{Result, SolstisError};
use crate::protocol::MAX_FRAME_SIZE;

/// Environment variable holding the instrument host
pub const ENV_HOST: &str = "SOLSTIS_HOST";
/// Environment variable holding the instrument TCP port
pub const ENV_PORT: &str = "SOLSTIS_PORT";
/// Environment variable holding the local address to connect from
pub const ENV_CLIENT_IP: &str = "SOLSTIS_CLIENT_IP";
/// Environment variable holding the read timeout in milliseconds
pub const ENV_READ_TIMEOUT_MS: &str = "SOLSTIS_READ_TIMEOUT_MS";

/// Where the instrument lives and which address we announce to it
///
/// Fixed for the lifetime of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Instrument host name or IP address
    pub host: String,

    /// Instrument TCP port
    pub port: u16,

    /// Local address the connection is made from, also announced in
    /// `start_link`; the OS picks the source address when unset
    pub local_address: Option<IpAddr>,
}

impl Endpoint {
    /// `host:port` string suitable for `ToSocketAddrs`
    pub fn remote(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Main configuration for a SolsTiS client
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Endpoint Configuration
    // -------------------------------------------------------------------------
    /// Instrument host name or IP address
    pub host: String,

    /// Instrument TCP port
    pub port: u16,

    /// Local address to connect from and announce in `start_link`
    pub client_address: Option<IpAddr>,

    // -------------------------------------------------------------------------
    // Transport Configuration
    // -------------------------------------------------------------------------
    /// Connect timeout (None blocks until the OS gives up)
    pub connect_timeout: Option<Duration>,

    /// Read timeout per reply (None blocks until a reply or a fault)
    pub read_timeout: Option<Duration>,

    /// Write timeout per command
    pub write_timeout: Option<Duration>,

    /// Largest reply frame accepted, in bytes
    pub max_frame_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 39933,
            client_address: None,
            connect_timeout: Some(Duration::from_secs(5)),
            read_timeout: None,
            write_timeout: None,
            max_frame_size: MAX_FRAME_SIZE,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// The endpoint a session connects to
    pub fn endpoint(&self) -> Endpoint {
        Endpoint {
            host: self.host.clone(),
            port: self.port,
            local_address: self.client_address,
        }
    }

    /// Build a config from the `SOLSTIS_*` environment variables
    ///
    /// Unset variables keep their defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_vars(std::env::vars())
    }

    /// Build a config from `(name, value)` pairs, as [`Config::from_env`] does
    pub fn from_vars<I, K, V>(vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut builder = Config::builder();

        for (key, value) in vars {
            let value = value.as_ref().trim();
            match key.as_ref() {
                ENV_HOST => {
                    if value.is_empty() {
                        return Err(SolstisError::Config(format!("{} is empty", ENV_HOST)));
                    }
                    builder = builder.host(value);
                }
                ENV_PORT => {
                    let port = value.parse::<u16>().map_err(|e| {
                        SolstisError::Config(format!("{}='{}': {}", ENV_PORT, value, e))
                    })?;
                    builder = builder.port(port);
                }
                ENV_CLIENT_IP => {
                    let ip = value.parse::<IpAddr>().map_err(|e| {
                        SolstisError::Config(format!("{}='{}': {}", ENV_CLIENT_IP, value, e))
                    })?;
                    builder = builder.client_address(ip);
                }
                ENV_READ_TIMEOUT_MS => {
                    let ms = value.parse::<u64>().map_err(|e| {
                        SolstisError::Config(format!("{}='{}': {}", ENV_READ_TIMEOUT_MS, value, e))
                    })?;
                    builder = builder.read_timeout_ms(ms);
                }
                _ => {}
            }
        }

        Ok(builder.build())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the instrument host
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    /// Set the instrument port
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Set the local address to connect from and announce in `start_link`
    pub fn client_address(mut self, addr: IpAddr) -> Self {
        self.config.client_address = Some(addr);
        self
    }

    /// Set the connect timeout (0 disables it)
    pub fn connect_timeout_ms(mut self, ms: u64) -> Self {
        self.config.connect_timeout = (ms > 0).then(|| Duration::from_millis(ms));
        self
    }

    /// Set the read timeout (0 disables it)
    pub fn read_timeout_ms(mut self, ms: u64) -> Self {
        self.config.read_timeout = (ms > 0).then(|| Duration::from_millis(ms));
        self
    }

    /// Set the write timeout (0 disables it)
    pub fn write_timeout_ms(mut self, ms: u64) -> Self {
        self.config.write_timeout = (ms > 0).then(|| Duration::from_millis(ms));
        self
    }

    /// Set the largest accepted reply frame
    pub fn max_frame_size(mut self, bytes: usize) -> Self {
        self.config.max_frame_size = bytes;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
