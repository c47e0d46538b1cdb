//! Config Tests
//!
//! Tests for defaults, the builder and environment parsing.

use std::net::IpAddr;
use std::time::Duration;

use solstis::config::{ENV_CLIENT_IP, ENV_HOST, ENV_PORT, ENV_READ_TIMEOUT_MS};
use solstis::protocol::MAX_FRAME_SIZE;
use solstis::{Config, SolstisError};

// =============================================================================
// Default / Builder Tests
// =============================================================================

#[test]
fn test_defaults() {
    let config = Config::default();

    assert_eq!(config.host, "127.0.0.1");
    assert_eq!(config.port, 39933);
    assert_eq!(config.client_address, None);
    assert_eq!(config.connect_timeout, Some(Duration::from_secs(5)));
    assert_eq!(config.read_timeout, None);
    assert_eq!(config.write_timeout, None);
    assert_eq!(config.max_frame_size, MAX_FRAME_SIZE);
}

#[test]
fn test_builder() {
    let ip: IpAddr = "10.0.0.5".parse().unwrap();
    let config = Config::builder()
        .host("192.168.1.222")
        .port(40000)
        .client_address(ip)
        .connect_timeout_ms(250)
        .read_timeout_ms(1500)
        .write_timeout_ms(500)
        .max_frame_size(4096)
        .build();

    assert_eq!(config.host, "192.168.1.222");
    assert_eq!(config.port, 40000);
    assert_eq!(config.client_address, Some(ip));
    assert_eq!(config.connect_timeout, Some(Duration::from_millis(250)));
    assert_eq!(config.read_timeout, Some(Duration::from_millis(1500)));
    assert_eq!(config.write_timeout, Some(Duration::from_millis(500)));
    assert_eq!(config.max_frame_size, 4096);
}

#[test]
fn test_zero_timeout_disables() {
    let config = Config::builder().connect_timeout_ms(0).read_timeout_ms(0).build();

    assert_eq!(config.connect_timeout, None);
    assert_eq!(config.read_timeout, None);
}

#[test]
fn test_endpoint() {
    let config = Config::builder().host("laser.local").port(39900).build();
    let endpoint = config.endpoint();

    assert_eq!(endpoint.remote(), "laser.local:39900");
    assert_eq!(endpoint.local_address, None);
}

// =============================================================================
// Environment Tests
// =============================================================================

#[test]
fn test_from_vars() {
    let config = Config::from_vars(vec![
        (ENV_HOST, "192.168.1.222"),
        (ENV_PORT, "39933"),
        (ENV_CLIENT_IP, "192.168.1.100"),
        (ENV_READ_TIMEOUT_MS, "750"),
        ("PATH", "/usr/bin"),
    ])
    .unwrap();

    assert_eq!(config.host, "192.168.1.222");
    assert_eq!(config.port, 39933);
    assert_eq!(config.client_address, Some("192.168.1.100".parse().unwrap()));
    assert_eq!(config.read_timeout, Some(Duration::from_millis(750)));
}

#[test]
fn test_from_vars_empty_keeps_defaults() {
    let config = Config::from_vars(Vec::<(String, String)>::new()).unwrap();
    assert_eq!(config.host, Config::default().host);
    assert_eq!(config.port, Config::default().port);
}

#[test]
fn test_from_vars_rejects_bad_values() {
    let cases = [
        (ENV_HOST, "  "),
        (ENV_PORT, "seventy"),
        (ENV_PORT, "70000"),
        (ENV_CLIENT_IP, "not-an-ip"),
        (ENV_READ_TIMEOUT_MS, "-5"),
    ];

    for (key, value) in cases {
        match Config::from_vars(vec![(key, value)]) {
            Err(SolstisError::Config(msg)) => assert!(msg.contains(key), "{}", msg),
            other => panic!("Expected Config error for {}={}, got {:?}", key, value, other),
        }
    }
}
