//! Simulator Tests
//!
//! Tests for the instrument simulator's default and scripted behaviour.

use std::time::Duration;

use solstis::network::{Script, Session, Simulator};
use solstis::protocol::{decode_reply, encode_command, Command, FrameKind, Operation, Reply, StatusCode, Value};
use solstis::Config;

fn connect(sim: &Simulator) -> Session {
    let config = Config::builder().port(sim.port()).read_timeout_ms(2000).build();
    Session::connect(&config).unwrap()
}

fn exchange(session: &mut Session, cmd: &Command) -> Reply {
    let frame = session.send_and_receive(&encode_command(cmd)).unwrap();
    decode_reply(&frame).unwrap()
}

// =============================================================================
// Default Behaviour Tests
// =============================================================================

#[test]
fn test_ping_swaps_case() {
    let sim = Simulator::start().unwrap();
    let mut session = connect(&sim);

    let reply = exchange(&mut session, &Command::new(1, Operation::Ping).param("text_in", "Hello World"));
    assert_eq!(reply.op, "ping_reply");
    assert_eq!(reply.status, None);
    assert_eq!(reply.str_field("text_out").unwrap(), "hELLO wORLD");
}

#[test]
fn test_start_link_answers_ok() {
    let sim = Simulator::start().unwrap();
    let mut session = connect(&sim);

    let reply = exchange(
        &mut session,
        &Command::new(1, Operation::StartLink).param("ip_address", "127.0.0.1"),
    );
    assert_eq!(reply.status, Some(StatusCode::Word("ok".to_string())));
}

#[test]
fn test_set_wave_m_updates_wavelength() {
    let sim = Simulator::start().unwrap();
    let mut session = connect(&sim);

    let reply = exchange(&mut session, &Command::new(1, Operation::SetWaveM).param("wavelength", 852.5));
    assert_eq!(reply.status, Some(StatusCode::Code(0)));
    assert_eq!(reply.f64_field("current_wavelength").unwrap(), 852.5);
    assert_eq!(sim.wavelength(), 852.5);
}

#[test]
fn test_lock_reflected_in_poll() {
    let sim = Simulator::start().unwrap();
    let mut session = connect(&sim);

    let poll = exchange(&mut session, &Command::new(1, Operation::PollWaveM));
    assert_eq!(poll.status, Some(StatusCode::Code(0)));
    assert!(!poll.flag_field("lock_status").unwrap());

    exchange(&mut session, &Command::new(2, Operation::LockWaveM).param("operation", "on"));
    assert!(sim.is_locked());

    let poll = exchange(&mut session, &Command::new(3, Operation::PollWaveM));
    assert_eq!(poll.status, Some(StatusCode::Code(3)));
    assert!(poll.flag_field("lock_status").unwrap());
}

#[test]
fn test_other_operations_answer_success() {
    let sim = Simulator::start().unwrap();
    let mut session = connect(&sim);

    let reply = exchange(&mut session, &Command::new(4, Operation::EtalonLock).param("operation", "on"));
    assert_eq!(reply.transmission_id, 4);
    assert!(reply.answers(Operation::EtalonLock));
    assert_eq!(reply.status, Some(StatusCode::Code(0)));

    let reply = exchange(&mut session, &Command::new(5, Operation::PbaReferenceStatus));
    assert_eq!(reply.status, Some(StatusCode::Word("off".to_string())));
}

#[test]
fn test_unparseable_command_gets_parse_fail() {
    let sim = Simulator::start().unwrap();
    let mut session = connect(&sim);

    let frame = session
        .send_and_receive(br#"{"message":{"transmission_id":[1],"op":"warp_drive"}}"#)
        .unwrap();
    let reply = decode_reply(&frame).unwrap();
    assert_eq!(reply.kind(), FrameKind::ParseFail);
    assert!(session.is_connected());
}

// =============================================================================
// Scripting Tests
// =============================================================================

#[test]
fn test_script_is_one_shot() {
    let sim = Simulator::start().unwrap();
    sim.script(Operation::MoveWaveT, Script::status(2));
    let mut session = connect(&sim);

    let cmd = |id| Command::new(id, Operation::MoveWaveT).param("wavelength", 780.0);

    assert_eq!(exchange(&mut session, &cmd(1)).status, Some(StatusCode::Code(2)));
    assert_eq!(exchange(&mut session, &cmd(2)).status, Some(StatusCode::Code(0)));
}

#[test]
fn test_scripts_queue_in_order() {
    let sim = Simulator::start().unwrap();
    sim.script(Operation::PollMoveWaveT, Script::reply(1, vec![("current_wavelength", Value::Float(779.0))]));
    sim.script(Operation::PollMoveWaveT, Script::reply(0, vec![("current_wavelength", Value::Float(780.0))]));
    let mut session = connect(&sim);

    let first = exchange(&mut session, &Command::new(1, Operation::PollMoveWaveT));
    let second = exchange(&mut session, &Command::new(2, Operation::PollMoveWaveT));

    assert_eq!(first.status, Some(StatusCode::Code(1)));
    assert_eq!(first.f64_field("current_wavelength").unwrap(), 779.0);
    assert_eq!(second.status, Some(StatusCode::Code(0)));
}

#[test]
fn test_build_script_sees_command() {
    let sim = Simulator::start().unwrap();
    sim.script(
        Operation::TuneEtalon,
        Script::Build(Box::new(|cmd: &Command| {
            Reply::to(cmd.transmission_id() + 100, cmd.operation(), Some(StatusCode::Code(0)))
        })),
    );
    let mut session = connect(&sim);

    let reply = exchange(&mut session, &Command::new(7, Operation::TuneEtalon).param("setting", 50.0));
    assert_eq!(reply.transmission_id, 107);
}

#[test]
fn test_received_commands_are_recorded() {
    let sim = Simulator::start().unwrap();
    let mut session = connect(&sim);

    exchange(&mut session, &Command::new(1, Operation::Ping).param("text_in", "a"));
    exchange(&mut session, &Command::new(2, Operation::StopWaveM));

    let first = sim.next_command(Duration::from_secs(1)).unwrap();
    assert_eq!(first.operation(), Operation::Ping);
    assert_eq!(first.get("text_in"), Some(&Value::from("a")));

    let rest = sim.received();
    assert_eq!(rest.len(), 1);
    assert_eq!(rest[0].operation(), Operation::StopWaveM);
    assert_eq!(rest[0].transmission_id(), 2);
}

#[test]
fn test_serves_several_clients() {
    let sim = Simulator::start().unwrap();
    let mut a = connect(&sim);
    let mut b = connect(&sim);

    let ra = exchange(&mut a, &Command::new(1, Operation::Ping).param("text_in", "a"));
    let rb = exchange(&mut b, &Command::new(1, Operation::Ping).param("text_in", "b"));

    assert_eq!(ra.str_field("text_out").unwrap(), "A");
    assert_eq!(rb.str_field("text_out").unwrap(), "B");
}
