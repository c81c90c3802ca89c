//! Worker side: binding to the inherited descriptors.
//!
//! A process launched through the launcher finds the six channel descriptors
//! at the fixed ordinals of the handoff contract; it does not need to parse
//! the fd list on its command line. The capacity is the one out-of-band
//! parameter, passed as `--capacity <n>`, and `bind` echoes it back as the
//! first outbound frame so the supervisor can verify agreement.

use std::os::fd::{FromRawFd, OwnedFd};

use crate::channel::{RecvChannel, SendChannel};
use crate::doorbell::Doorbell;
use crate::endpoint::Endpoint;
use crate::error::BindError;
use crate::handoff::{
    INBOUND_ACK_FD, INBOUND_BUFFER_FD, INBOUND_SIGNAL_FD, OUTBOUND_ACK_FD, OUTBOUND_BUFFER_FD,
    OUTBOUND_SIGNAL_FD,
};
use crate::shm::SharedBuffer;

/// Bind to the fixed descriptor numbering and return this side's endpoint.
///
/// The inbound buffer is mapped read-only (this side only drains it), the
/// outbound buffer read-write. `capacity` must be the value the launcher
/// passed on the command line; [`capacity_from_args`] extracts it.
///
/// Fails if `capacity` is below [`crate::MIN_CAPACITY`] or if a mapping
/// fails, which usually means the process was not launched through the
/// launcher contract.
///
/// The returned endpoint's two channels are fully independent: run `listen`
/// on one thread and `send` from another freely, but never `send` on the
/// same channel from two threads.
pub fn bind(capacity: usize) -> Result<Endpoint, BindError> {
    // The hello frame below is 8 bytes; a buffer that cannot hold it can
    // never complete the handshake.
    if capacity < crate::MIN_CAPACITY {
        return Err(BindError::CapacityTooSmall(capacity));
    }

    // Safety: the launcher contract guarantees these six ordinals are open
    // and owned by this process, and nothing else adopts them.
    let inbound_signal = unsafe { Doorbell::from_raw_fd(INBOUND_SIGNAL_FD) };
    let inbound_ack = unsafe { Doorbell::from_raw_fd(INBOUND_ACK_FD) };
    let inbound_fd = unsafe { OwnedFd::from_raw_fd(INBOUND_BUFFER_FD) };
    let inbound_buffer = SharedBuffer::map_existing(inbound_fd, capacity, false)?;

    let outbound_signal = unsafe { Doorbell::from_raw_fd(OUTBOUND_SIGNAL_FD) };
    let outbound_ack = unsafe { Doorbell::from_raw_fd(OUTBOUND_ACK_FD) };
    let outbound_fd = unsafe { OwnedFd::from_raw_fd(OUTBOUND_BUFFER_FD) };
    let outbound_buffer = SharedBuffer::map_existing(outbound_fd, capacity, true)?;

    let inbound = RecvChannel::new(inbound_signal, inbound_ack, inbound_buffer);
    let mut outbound = SendChannel::new(outbound_signal, outbound_ack, outbound_buffer);

    // Capacity hello: first outbound frame, verified by the supervisor
    // before it hands the link to its caller.
    outbound
        .send(&(capacity as u64).to_le_bytes())
        .map_err(BindError::Handshake)?;

    tracing::debug!(capacity, "worker bound to inherited descriptors");
    Ok(Endpoint::new(inbound, outbound))
}

/// Extract the `--capacity <n>` argument the launcher passed.
pub fn capacity_from_args() -> Option<usize> {
    parse_capacity(std::env::args())
}

fn parse_capacity(mut args: impl Iterator<Item = String>) -> Option<usize> {
    while let Some(arg) = args.next() {
        if arg == "--capacity" {
            return args.next()?.parse().ok();
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(parts: &[&str]) -> impl Iterator<Item = String> {
        parts
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
            .into_iter()
    }

    #[test]
    fn capacity_is_parsed_from_launcher_argv() {
        let args = argv(&["worker", "--capacity", "4096", "--fds", "3,4,5,6,7,8"]);
        assert_eq!(parse_capacity(args), Some(4096));
    }

    #[test]
    fn below_minimum_capacity_is_rejected_before_adopting_fds() {
        assert!(matches!(bind(4), Err(BindError::CapacityTooSmall(4))));
    }

    #[test]
    fn missing_or_malformed_capacity_is_none() {
        assert_eq!(parse_capacity(argv(&["worker"])), None);
        assert_eq!(parse_capacity(argv(&["worker", "--capacity"])), None);
        assert_eq!(parse_capacity(argv(&["worker", "--capacity", "lots"])), None);
    }
}
