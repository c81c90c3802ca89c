//! Descriptor-numbering contract and the pre-exec handoff.
//!
//! The wire-level contract of the whole system is six inherited descriptors
//! at fixed ordinals in the worker's table, immediately above the standard
//! streams. The numbering is a compile-time constant shared by both sides;
//! the launcher also echoes it on the worker's command line, but that is
//! diagnostics, not the contract.
//!
//! The remap itself is a one-shot, order-sensitive operation that runs
//! between fork and exec. It is isolated here as an explicit manifest of
//! {source descriptor, target ordinal} pairs consumed exactly once.
//!
//! ## Safety contracts
//!
//! `HandoffManifest::apply` runs in the forked child before exec (std's
//! `pre_exec`). It only issues dup/dup2/close syscalls on descriptors the
//! parent recorded before forking, and any failure makes the child exit with
//! a non-zero status instead of returning into shared state.

use std::io;
use std::mem;
use std::os::fd::{BorrowedFd, FromRawFd, OwnedFd, RawFd};

use nix::fcntl::{FcntlArg, fcntl};
use nix::unistd::dup2;

/// Worker-relative ordinals, in contract order. "Inbound" is the direction
/// the worker receives on (supervisor -> worker).
pub const INBOUND_SIGNAL_FD: RawFd = 3;
pub const INBOUND_ACK_FD: RawFd = 4;
pub const INBOUND_BUFFER_FD: RawFd = 5;
pub const OUTBOUND_SIGNAL_FD: RawFd = 6;
pub const OUTBOUND_ACK_FD: RawFd = 7;
pub const OUTBOUND_BUFFER_FD: RawFd = 8;

/// All six target ordinals, in contract order.
pub const WORKER_FDS: [RawFd; 6] = [
    INBOUND_SIGNAL_FD,
    INBOUND_ACK_FD,
    INBOUND_BUFFER_FD,
    OUTBOUND_SIGNAL_FD,
    OUTBOUND_ACK_FD,
    OUTBOUND_BUFFER_FD,
];

/// First descriptor safely above every target ordinal, used for the
/// intermediate duplicates while sources are moved into place.
const PARK_FD_MIN: RawFd = 16;

/// Ordered {source descriptor, target ordinal} list, consumed once in the
/// forked child before exec.
#[derive(Debug, Clone, Copy)]
pub struct HandoffManifest {
    entries: [(RawFd, RawFd); 6],
}

impl HandoffManifest {
    /// Build the manifest from the supervisor's six live descriptors, in
    /// contract order.
    pub fn new(sources: [RawFd; 6]) -> Self {
        let mut entries = [(0, 0); 6];
        for (slot, (src, target)) in entries.iter_mut().zip(sources.into_iter().zip(WORKER_FDS)) {
            *slot = (src, target);
        }
        Self { entries }
    }

    /// Remap every source onto its fixed ordinal and close the leftovers.
    ///
    /// Two phases: first every source is duplicated above the target range,
    /// then the duplicates are moved onto the targets. A source that already
    /// sits on another entry's target ordinal would otherwise be clobbered
    /// mid-remap.
    ///
    /// # Safety
    ///
    /// Must run in the forked child before exec, exactly once. After it
    /// returns, the original source descriptors are closed.
    pub unsafe fn apply(&self) -> io::Result<()> {
        // Phase 1: park every source above the target range.
        let mut parked = [0 as RawFd; 6];
        for (slot, (src, _)) in parked.iter_mut().zip(self.entries) {
            let fd = unsafe { BorrowedFd::borrow_raw(src) };
            *slot = fcntl(fd, FcntlArg::F_DUPFD(PARK_FD_MIN))
                .map_err(|e| io::Error::from_raw_os_error(e as i32))?;
        }

        // Sources are now redundant; close them so the exec'd image sees the
        // contract ordinals only (plus the standard streams).
        for (src, _) in self.entries {
            let _ = unsafe { OwnedFd::from_raw_fd(src) };
        }

        // Phase 2: move the parked duplicates onto the contract ordinals.
        for (park, (_, target)) in parked.into_iter().zip(self.entries) {
            let park_fd = unsafe { BorrowedFd::borrow_raw(park) };
            // Safety: dup2 to an arbitrary ordinal; forget keeps the target
            // open for the exec'd image.
            let mut target_fd = unsafe { OwnedFd::from_raw_fd(target) };
            dup2(park_fd, &mut target_fd).map_err(|e| io::Error::from_raw_os_error(e as i32))?;
            mem::forget(target_fd);
        }

        for (park, _) in parked.into_iter().zip(self.entries) {
            let _ = unsafe { OwnedFd::from_raw_fd(park) };
        }

        Ok(())
    }

    /// The contract echoed as command-line text, e.g. `3,4,5,6,7,8`.
    pub fn target_args() -> String {
        let mut out = String::new();
        for (i, fd) in WORKER_FDS.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            out.push_str(&fd.to_string());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordinals_are_contiguous_above_stderr() {
        assert_eq!(WORKER_FDS, [3, 4, 5, 6, 7, 8]);
        for pair in WORKER_FDS.windows(2) {
            assert_eq!(pair[1], pair[0] + 1);
        }
    }

    #[test]
    fn manifest_pairs_sources_with_contract_order() {
        let m = HandoffManifest::new([10, 11, 12, 13, 14, 15]);
        assert_eq!(m.entries[0], (10, INBOUND_SIGNAL_FD));
        assert_eq!(m.entries[5], (15, OUTBOUND_BUFFER_FD));
    }

    #[test]
    fn target_args_render_the_contract() {
        assert_eq!(HandoffManifest::target_args(), "3,4,5,6,7,8");
    }
}
