//! End-to-end tests against real spawned workers.
//!
//! The echo worker mirrors every frame back, so a supervisor-side
//! send/receive pair exercises both directions, the descriptor handoff, and
//! the capacity handshake in one round trip. Two deliberately misbehaving
//! workers cover the handshake's failure side.

use chime::{ChannelError, EstablishError, establish};

const ECHO_WORKER: &str = env!("CARGO_BIN_EXE_echo-worker");
const SHRUNK_WORKER: &str = env!("CARGO_BIN_EXE_shrunk-worker");
const GARBLED_WORKER: &str = env!("CARGO_BIN_EXE_garbled-worker");

#[test]
fn ping_pong_five_rounds_in_order() {
    let mut link = establish(ECHO_WORKER, 1024).expect("establish echo worker");

    for i in 0..5 {
        let msg = format!("ping-{i}");
        link.send(msg.as_bytes()).expect("send");
        let reply = link.receive().expect("receive");
        assert_eq!(reply, msg.as_bytes(), "round {i} reordered or corrupted");
    }

    link.close().expect("close reaps the worker");
}

#[test]
fn full_capacity_frame_then_one_byte_has_no_residue() {
    let capacity = 256;
    let mut link = establish(ECHO_WORKER, capacity).expect("establish echo worker");

    let big = vec![0xAB_u8; capacity];
    link.send(&big).unwrap();
    assert_eq!(link.receive().unwrap(), big);

    link.send(b"!").unwrap();
    assert_eq!(link.receive().unwrap(), b"!");

    link.close().unwrap();
}

#[test]
fn oversized_payload_fails_locally() {
    let mut link = establish(ECHO_WORKER, 32).expect("establish echo worker");

    let err = link.send(&[0u8; 33]).unwrap_err();
    assert!(matches!(
        err,
        ChannelError::PayloadTooLarge {
            len: 33,
            capacity: 32
        }
    ));

    // The channel is untouched; a well-formed frame still round-trips.
    link.send(b"still alive").unwrap();
    assert_eq!(link.receive().unwrap(), b"still alive");

    link.close().unwrap();
}

#[test]
fn establish_then_immediate_close_reaps_the_worker() {
    let link = establish(ECHO_WORKER, 64).expect("establish echo worker");
    let pid = link.worker_pid().expect("live worker has a pid");
    assert!(pid > 0);

    // close() waits on the child, so returning at all means the process
    // table entry is gone.
    link.close().expect("close reaps the worker");
}

#[test]
fn spawn_failure_surfaces_as_establish_error() {
    let err = establish("/nonexistent/chime-test-worker", 64).unwrap_err();
    assert!(matches!(err, EstablishError::Spawn(_)));
}

#[test]
fn below_minimum_capacity_is_rejected_before_spawn() {
    // A worker whose buffer cannot hold the 8-byte hello exits without ever
    // ringing the doorbell, and the handshake wait would never return. The
    // minimum is enforced up front, so this errors instead of hanging.
    let err = establish(ECHO_WORKER, 4).unwrap_err();
    assert!(matches!(err, EstablishError::CapacityTooSmall(4)));
}

#[test]
fn capacity_mismatch_fails_establishment() {
    // The shrunk worker maps and announces half the allocated capacity.
    let err = establish(SHRUNK_WORKER, 64).unwrap_err();
    assert!(matches!(
        err,
        EstablishError::CapacityMismatch {
            ours: 64,
            theirs: 32
        }
    ));
}

#[test]
fn garbled_hello_fails_establishment() {
    // The garbled worker's first frame is 3 bytes, not the capacity echo.
    let err = establish(GARBLED_WORKER, 64).unwrap_err();
    assert!(matches!(err, EstablishError::MalformedHello(3)));
}
