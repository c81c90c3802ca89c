//! Doorbell primitive over a Linux eventfd.
//!
//! An eventfd is a kernel counter: writes add to it, a blocking read drains
//! it to zero and returns the accumulated value, waking one waiter. The
//! channel layer uses one doorbell to carry the pending frame length and a
//! second one for the receiver's completion ack.
//!
//! The counter is additive, not a queue: two rings before a wait are observed
//! as their sum. The channel's single-outstanding-message discipline is what
//! keeps a counter value meaningful as a length.

use std::fs::File;
use std::io::{self, Read, Write};
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, FromRawFd, RawFd};

use nix::sys::eventfd::{EfdFlags, EventFd};

use crate::error::{ChannelError, ResourceError};

/// One kernel event-counter descriptor.
///
/// `ring` and `wait` take `&mut self`: a doorbell is owned by exactly one
/// channel role, and the 8-byte counter read/write is not meant to be shared
/// across threads within that role.
#[derive(Debug)]
pub struct Doorbell {
    file: File,
}

impl Doorbell {
    /// Create a doorbell with its counter at zero.
    ///
    /// The descriptor is created without CLOEXEC so the launcher can hand it
    /// across exec to the worker.
    pub fn create() -> Result<Self, ResourceError> {
        let efd = EventFd::from_value_and_flags(0, EfdFlags::empty())
            .map_err(|e| ResourceError::Doorbell(io::Error::from_raw_os_error(e as i32)))?;
        Ok(Self {
            file: File::from(std::os::fd::OwnedFd::from(efd)),
        })
    }

    /// Adopt an inherited descriptor at a fixed ordinal.
    ///
    /// # Safety
    ///
    /// `fd` must be an open eventfd this process owns and nothing else may
    /// close it; the worker's fixed-numbering contract guarantees both when
    /// the process was launched through the launcher.
    pub unsafe fn from_raw_fd(fd: RawFd) -> Self {
        Self {
            file: unsafe { File::from_raw_fd(fd) },
        }
    }

    /// Duplicate the underlying descriptor. Both handles drive the same
    /// kernel counter.
    pub fn try_clone(&self) -> Result<Self, ResourceError> {
        Ok(Self {
            file: self.file.try_clone().map_err(ResourceError::Doorbell)?,
        })
    }

    /// Atomically add `value` to the counter, waking one blocked waiter.
    ///
    /// `value` must be non-zero; the kernel ignores zero-valued writes and a
    /// lost wakeup would wedge the rendezvous.
    pub fn ring(&mut self, value: u64) -> Result<(), ChannelError> {
        debug_assert!(value > 0, "eventfd ignores zero-valued writes");
        self.file.write_all(&value.to_ne_bytes())?;
        Ok(())
    }

    /// Block until the counter is non-zero, then read-and-reset it,
    /// returning the value that had accumulated.
    ///
    /// Suspends only the calling thread.
    pub fn wait(&mut self) -> Result<u64, ChannelError> {
        let mut buf = [0u8; 8];
        match self.file.read_exact(&mut buf) {
            Ok(()) => Ok(u64::from_ne_bytes(buf)),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Err(ChannelError::Closed),
            Err(e) => Err(ChannelError::Io(e)),
        }
    }
}

impl AsFd for Doorbell {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.file.as_fd()
    }
}

impl AsRawFd for Doorbell {
    fn as_raw_fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }
}
