//! Session Tests
//!
//! Tests for the transport session lifecycle and fault handling.

use std::net::{IpAddr, TcpListener};
use std::time::Duration;

use solstis::network::{Script, Session, SessionState, Simulator};
use solstis::protocol::{decode_reply, encode_command, encode_reply, Command, Operation, Reply, StatusCode};
use solstis::{Config, SolstisError};

fn config_for(sim: &Simulator) -> Config {
    Config::builder().port(sim.port()).read_timeout_ms(2000).build()
}

/// A localhost port with nothing listening on it
fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

fn ping_bytes(id: u32) -> Vec<u8> {
    encode_command(&Command::new(id, Operation::Ping).param("text_in", "abc"))
}

// =============================================================================
// Lifecycle Tests
// =============================================================================

#[test]
fn test_new_session_is_unconnected() {
    let session = Session::new(&Config::default());
    assert_eq!(session.state(), SessionState::Unconnected);
    assert!(!session.is_connected());
    assert!(session.local_addr().is_none());
}

#[test]
fn test_open_refused_stays_unconnected() {
    let config = Config::builder().port(closed_port()).build();
    let mut session = Session::new(&config);

    match session.open() {
        Err(SolstisError::Connection { addr, .. }) => assert!(addr.starts_with("127.0.0.1:")),
        other => panic!("Expected Connection error, got {:?}", other),
    }
    assert_eq!(session.state(), SessionState::Unconnected);
}

#[test]
fn test_open_and_exchange() {
    let sim = Simulator::start().unwrap();
    let mut session = Session::connect(&config_for(&sim)).unwrap();

    assert!(session.is_connected());
    assert_eq!(session.peer_addr(), Some(sim.addr()));

    let frame = session.send_and_receive(&ping_bytes(1)).unwrap();
    let reply = decode_reply(&frame).unwrap();
    assert_eq!(reply.transmission_id, 1);
    assert_eq!(reply.str_field("text_out").unwrap(), "ABC");
}

#[test]
fn test_connects_from_configured_local_address() {
    let sim = Simulator::start().unwrap();
    let config = Config::builder()
        .port(sim.port())
        .client_address("127.0.0.1".parse().unwrap())
        .build();
    let session = Session::connect(&config).unwrap();

    assert_eq!(session.local_addr().unwrap().ip(), config.client_address.unwrap());
}

// Linux routes all of 127.0.0.0/8 to loopback
#[cfg(target_os = "linux")]
#[test]
fn test_connects_from_secondary_loopback_address() {
    let sim = Simulator::start().unwrap();
    let local: IpAddr = "127.0.0.2".parse().unwrap();
    let config = Config::builder().port(sim.port()).client_address(local).build();
    let session = Session::connect(&config).unwrap();

    assert_eq!(session.local_addr().unwrap().ip(), local);
    assert_eq!(session.peer_addr(), Some(sim.addr()));
}

#[test]
fn test_unusable_local_address() {
    let sim = Simulator::start().unwrap();

    // TEST-NET-1 is never assigned to a local interface
    let config = Config::builder()
        .port(sim.port())
        .client_address("192.0.2.1".parse().unwrap())
        .build();
    let mut session = Session::new(&config);
    assert!(matches!(session.open(), Err(SolstisError::Connection { .. })));
    assert_eq!(session.state(), SessionState::Unconnected);

    // An IPv6 source cannot reach an IPv4 peer
    let config = Config::builder()
        .port(sim.port())
        .client_address("::1".parse().unwrap())
        .build();
    let mut session = Session::new(&config);
    assert!(matches!(session.open(), Err(SolstisError::Connection { .. })));
}

#[test]
fn test_send_before_open() {
    let mut session = Session::new(&Config::default());

    match session.send_and_receive(&ping_bytes(1)) {
        Err(SolstisError::InvalidState { state, .. }) => assert_eq!(state, SessionState::Unconnected),
        other => panic!("Expected InvalidState, got {:?}", other),
    }
}

#[test]
fn test_close_is_idempotent() {
    let sim = Simulator::start().unwrap();
    let mut session = Session::connect(&config_for(&sim)).unwrap();

    session.close();
    session.close();
    assert_eq!(session.state(), SessionState::Closed);
}

#[test]
fn test_closed_session_rejects_use() {
    let sim = Simulator::start().unwrap();
    let mut session = Session::connect(&config_for(&sim)).unwrap();
    session.close();

    assert!(matches!(
        session.send_and_receive(&ping_bytes(1)),
        Err(SolstisError::InvalidState { state: SessionState::Closed, .. })
    ));
    assert!(matches!(
        session.open(),
        Err(SolstisError::InvalidState { state: SessionState::Closed, .. })
    ));
}

#[test]
fn test_open_twice_rejected() {
    let sim = Simulator::start().unwrap();
    let mut session = Session::connect(&config_for(&sim)).unwrap();

    assert!(matches!(
        session.open(),
        Err(SolstisError::InvalidState { state: SessionState::Connected, .. })
    ));
    assert!(session.is_connected());
}

#[test]
fn test_sequential_exchanges() {
    let sim = Simulator::start().unwrap();
    let mut session = Session::connect(&config_for(&sim)).unwrap();

    for id in 1..=5 {
        let frame = session.send_and_receive(&ping_bytes(id)).unwrap();
        assert_eq!(decode_reply(&frame).unwrap().transmission_id, id);
    }
}

// =============================================================================
// Fault Tests
// =============================================================================

#[test]
fn test_truncated_reply_then_close() {
    let sim = Simulator::start().unwrap();
    let full = encode_reply(&Reply::to(1, Operation::Ping, None).field("text_out", "ABC"));
    sim.script(Operation::Ping, Script::RawThenClose(full[..full.len() / 2].to_vec()));

    let mut session = Session::connect(&config_for(&sim)).unwrap();
    let result = session.send_and_receive(&ping_bytes(1));

    assert!(matches!(result, Err(SolstisError::MalformedReply(_))));
    assert_eq!(session.state(), SessionState::Closed);

    // The next call fails fast instead of touching the socket
    assert!(matches!(
        session.send_and_receive(&ping_bytes(2)),
        Err(SolstisError::InvalidState { .. })
    ));
}

#[test]
fn test_peer_closes_without_reply() {
    let sim = Simulator::start().unwrap();
    sim.script(Operation::Ping, Script::Close);

    let mut session = Session::connect(&config_for(&sim)).unwrap();
    let result = session.send_and_receive(&ping_bytes(1));

    assert!(matches!(result, Err(SolstisError::Transport(_))));
    assert_eq!(session.state(), SessionState::Closed);
}

#[test]
fn test_read_timeout_closes_session() {
    let sim = Simulator::start().unwrap();
    sim.script(Operation::Ping, Script::Silent);

    let config = Config::builder().port(sim.port()).read_timeout_ms(100).build();
    let mut session = Session::connect(&config).unwrap();

    assert!(matches!(
        session.send_and_receive(&ping_bytes(1)),
        Err(SolstisError::Transport(_))
    ));
    assert_eq!(session.state(), SessionState::Closed);
}

#[test]
fn test_bytes_after_reply_rejected() {
    let sim = Simulator::start().unwrap();
    let mut bytes = encode_reply(&Reply::to(1, Operation::Ping, None).field("text_out", "ABC"));
    bytes.extend_from_slice(&encode_reply(&Reply::to(1, Operation::Ping, None)));
    sim.script(Operation::Ping, Script::Raw(bytes));

    let mut session = Session::connect(&config_for(&sim)).unwrap();
    let result = session.send_and_receive(&ping_bytes(1));

    assert!(matches!(result, Err(SolstisError::MalformedReply(_))));
    assert_eq!(session.state(), SessionState::Closed);
}

#[test]
fn test_garbage_before_frame_rejected() {
    let sim = Simulator::start().unwrap();
    sim.script(Operation::SetWaveM, Script::Raw(b"OK\r\n".to_vec()));

    let mut session = Session::connect(&config_for(&sim)).unwrap();
    let cmd = Command::new(1, Operation::SetWaveM).param("wavelength", 780.0);

    assert!(matches!(
        session.send_and_receive(&encode_command(&cmd)),
        Err(SolstisError::MalformedReply(_))
    ));
    assert_eq!(session.state(), SessionState::Closed);
}

#[test]
fn test_decode_error_leaves_session_open() {
    let sim = Simulator::start().unwrap();
    sim.script(
        Operation::Ping,
        Script::Raw(br#"{"message":{"transmission_id":[1],"op":"ping_reply","parameters":{"text_out":null}}}"#.to_vec()),
    );

    let mut session = Session::connect(&config_for(&sim)).unwrap();

    // The frame is well delimited; only its content is bad
    let frame = session.send_and_receive(&ping_bytes(1)).unwrap();
    assert!(matches!(decode_reply(&frame), Err(SolstisError::MalformedReply(_))));
    assert!(session.is_connected());

    let frame = session.send_and_receive(&ping_bytes(2)).unwrap();
    let reply = decode_reply(&frame).unwrap();
    assert_eq!(reply.status, None::<StatusCode>);
    assert!(sim.next_command(Duration::from_secs(1)).is_some());
}
