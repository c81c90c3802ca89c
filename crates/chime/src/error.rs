//! Error taxonomy for channel establishment and steady-state transfer.
//!
//! Establishment failures (`ResourceError`, `EstablishError`, `BindError`) are
//! fatal to startup and surface synchronously from `establish`/`bind`.
//! Steady-state failures (`ChannelError`) are scoped to one direction: an
//! `Io`/`Closed` error ends that direction's `listen` loop but leaves the
//! opposite channel usable.

use std::io;

/// Descriptor or mapping allocation failure.
#[derive(Debug, thiserror::Error)]
pub enum ResourceError {
    #[error("failed to create doorbell descriptor: {0}")]
    Doorbell(#[source] io::Error),

    #[error("failed to allocate shared buffer of {capacity} bytes: {source}")]
    Buffer {
        capacity: usize,
        #[source]
        source: io::Error,
    },

    #[error("failed to map shared buffer of {capacity} bytes: {source}")]
    Map {
        capacity: usize,
        #[source]
        source: io::Error,
    },
}

/// Steady-state send/receive failure on one channel.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// Caller-side validation, checked before any syscall. The channel state
    /// is untouched: no doorbell ring, no buffer write.
    #[error("payload of {len} bytes exceeds channel capacity of {capacity} bytes")]
    PayloadTooLarge { len: usize, capacity: usize },

    /// A zero-length frame cannot be signaled: the doorbell counter ignores
    /// zero-valued rings, so the receiver would never wake. Checked before
    /// any syscall, like `PayloadTooLarge`.
    #[error("empty payloads cannot be signaled through the doorbell")]
    EmptyPayload,

    /// The peer signaled a length larger than the shared buffer. The frame is
    /// discarded; the receive loop stays alive and waits for the next signal.
    #[error("peer signaled {len} bytes but channel capacity is {capacity} bytes")]
    Protocol { len: u64, capacity: usize },

    /// The peer end of the doorbell is gone.
    #[error("peer closed the channel")]
    Closed,

    #[error("channel i/o failed: {0}")]
    Io(#[from] io::Error),
}

impl ChannelError {
    /// Recoverable errors leave the channel usable for the next frame;
    /// everything else means the direction is dead.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ChannelError::PayloadTooLarge { .. }
                | ChannelError::EmptyPayload
                | ChannelError::Protocol { .. }
        )
    }
}

/// Supervisor-side establishment failure.
#[derive(Debug, thiserror::Error)]
pub enum EstablishError {
    #[error("capacity {0} is below the 8-byte handshake frame minimum")]
    CapacityTooSmall(usize),

    #[error(transparent)]
    Resource(#[from] ResourceError),

    #[error("failed to spawn worker: {0}")]
    Spawn(#[source] io::Error),

    #[error("capacity handshake with worker failed: {0}")]
    Handshake(#[source] ChannelError),

    #[error("malformed capacity handshake frame ({0} bytes, expected 8)")]
    MalformedHello(usize),

    #[error("worker mapped capacity {theirs} but supervisor allocated {ours}")]
    CapacityMismatch { ours: u64, theirs: u64 },
}

/// Worker-side binding failure.
#[derive(Debug, thiserror::Error)]
pub enum BindError {
    #[error("capacity {0} is below the 8-byte handshake frame minimum")]
    CapacityTooSmall(usize),

    #[error(transparent)]
    Resource(#[from] ResourceError),

    #[error("capacity handshake with supervisor failed: {0}")]
    Handshake(#[source] ChannelError),
}
