//! Misbehaving worker for the integration tests: its first outbound frame is
//! 3 bytes instead of the 8-byte capacity echo, so establishment must fail
//! with a malformed-hello error.
//!
//! Built from the raw pieces rather than `bind`, which always sends a
//! well-formed hello.

use std::os::fd::{FromRawFd, OwnedFd};
use std::process::ExitCode;

use chime::handoff::{OUTBOUND_ACK_FD, OUTBOUND_BUFFER_FD, OUTBOUND_SIGNAL_FD};
use chime::{Doorbell, SendChannel, SharedBuffer};

fn main() -> ExitCode {
    let Some(capacity) = chime::capacity_from_args() else {
        eprintln!("garbled-worker: missing --capacity");
        return ExitCode::FAILURE;
    };

    // Safety: launched through the launcher contract, so these ordinals are
    // open and owned by this process.
    let signal = unsafe { Doorbell::from_raw_fd(OUTBOUND_SIGNAL_FD) };
    let ack = unsafe { Doorbell::from_raw_fd(OUTBOUND_ACK_FD) };
    let buffer_fd = unsafe { OwnedFd::from_raw_fd(OUTBOUND_BUFFER_FD) };
    let buffer = match SharedBuffer::map_existing(buffer_fd, capacity, true) {
        Ok(b) => b,
        Err(e) => {
            eprintln!("garbled-worker: map failed: {e}");
            return ExitCode::FAILURE;
        }
    };

    let mut outbound = SendChannel::new(signal, ack, buffer);
    match outbound.send(b"hi!") {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("garbled-worker: send failed: {e}");
            ExitCode::FAILURE
        }
    }
}
