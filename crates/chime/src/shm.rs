//! Shared buffer over a memfd mapping.
//!
//! One anonymous memory-file backs each channel direction. Both processes map
//! it `MAP_SHARED` at independent addresses, so a write on one side is
//! visible to the other without crossing a kernel buffer.
//!
//! The buffer itself performs no locking. Callers must hold the channel's
//! send/receive discipline to avoid torn reads and writes; the channel layer
//! enforces it by handing the write capability to the sender role and the
//! read capability to the receiver role.

use std::ffi::CString;
use std::fs::File;
use std::io;
use std::num::NonZeroUsize;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, OwnedFd, RawFd};
use std::ptr::{self, NonNull};

use nix::sys::memfd::{MFdFlags, memfd_create};
use nix::sys::mman::{MapFlags, ProtFlags, mmap, munmap};
use nix::unistd::ftruncate;

use crate::error::ResourceError;

fn errno_to_io(e: nix::errno::Errno) -> io::Error {
    io::Error::from_raw_os_error(e as i32)
}

/// One memory-file descriptor plus this process's mapping of it.
///
/// The creating side owns the descriptor and maps read-write. The inheriting
/// side adopts the descriptor at its fixed ordinal and maps with the
/// permissions its role needs. Each side unmaps its own view on drop.
#[derive(Debug)]
pub struct SharedBuffer {
    file: File,
    ptr: NonNull<u8>,
    capacity: usize,
    writable: bool,
}

// The mapping is plain bytes and the write/read split is enforced one level
// up by the channel roles, so moving a view to another thread is sound.
unsafe impl Send for SharedBuffer {}

impl SharedBuffer {
    /// Allocate a memfd of `capacity` bytes and map it read-write.
    ///
    /// Created without CLOEXEC so the launcher can hand the descriptor across
    /// exec to the worker.
    pub fn create(capacity: usize) -> Result<Self, ResourceError> {
        let alloc_err = |source| ResourceError::Buffer { capacity, source };

        let name = CString::new("chime-shm").expect("static name has no NUL");
        let memfd = memfd_create(name.as_c_str(), MFdFlags::empty())
            .map_err(|e| alloc_err(errno_to_io(e)))?;
        ftruncate(&memfd, capacity as i64).map_err(|e| alloc_err(errno_to_io(e)))?;

        Self::map(memfd, capacity, true)
    }

    /// Map an inherited descriptor (the non-creating side).
    pub fn map_existing(fd: OwnedFd, capacity: usize, writable: bool) -> Result<Self, ResourceError> {
        Self::map(fd, capacity, writable)
    }

    fn map(fd: OwnedFd, capacity: usize, writable: bool) -> Result<Self, ResourceError> {
        let len = NonZeroUsize::new(capacity).ok_or_else(|| ResourceError::Map {
            capacity,
            source: io::Error::new(io::ErrorKind::InvalidInput, "capacity must be non-zero"),
        })?;

        let mut prot = ProtFlags::PROT_READ;
        if writable {
            prot |= ProtFlags::PROT_WRITE;
        }

        // Safety: mapping a freshly sized (or launcher-inherited) memfd; the
        // resulting range is owned by this struct until Drop unmaps it.
        let addr = unsafe { mmap(None, len, prot, MapFlags::MAP_SHARED, &fd, 0) }.map_err(|e| {
            ResourceError::Map {
                capacity,
                source: errno_to_io(e),
            }
        })?;

        Ok(Self {
            file: File::from(fd),
            ptr: addr.cast(),
            capacity,
            writable,
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Raw, unsynchronized copy into the mapping.
    pub fn write_at(&mut self, offset: usize, bytes: &[u8]) -> io::Result<()> {
        if !self.writable {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "buffer view is mapped read-only",
            ));
        }
        let end = offset.checked_add(bytes.len()).ok_or_else(bounds_err)?;
        if end > self.capacity {
            return Err(bounds_err());
        }
        // Safety: bounds checked against the mapping above.
        unsafe {
            ptr::copy_nonoverlapping(bytes.as_ptr(), self.ptr.as_ptr().add(offset), bytes.len());
        }
        Ok(())
    }

    /// Raw, unsynchronized copy out of the mapping.
    pub fn read_at(&self, offset: usize, length: usize) -> io::Result<Vec<u8>> {
        let end = offset.checked_add(length).ok_or_else(bounds_err)?;
        if end > self.capacity {
            return Err(bounds_err());
        }
        let mut out = vec![0u8; length];
        // Safety: bounds checked against the mapping above.
        unsafe {
            ptr::copy_nonoverlapping(self.ptr.as_ptr().add(offset), out.as_mut_ptr(), length);
        }
        Ok(out)
    }
}

fn bounds_err() -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidInput,
        "range exceeds shared buffer capacity",
    )
}

impl AsFd for SharedBuffer {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.file.as_fd()
    }
}

impl AsRawFd for SharedBuffer {
    fn as_raw_fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }
}

impl Drop for SharedBuffer {
    fn drop(&mut self) {
        // Safety: ptr/capacity describe the live mapping created in map();
        // drop runs at most once per view.
        if let Err(e) = unsafe { munmap(self.ptr.cast(), self.capacity) } {
            tracing::warn!(error = %e, capacity = self.capacity, "failed to unmap shared buffer");
        }
    }
}
