//! chime: shared-memory message channel between a supervisor and a worker it
//! spawns, synchronized with eventfd doorbells instead of pipes or sockets.
//!
//! Each direction is a single-slot rendezvous: a signal doorbell carries the
//! pending frame's byte length, an ack doorbell carries the receiver's
//! completion notice, and a memfd-backed shared mapping holds the payload.
//! Payloads move by reference through the mapping; only the two 8-byte
//! doorbell counters cross the kernel per frame.
//!
//! Establishment is a fixed descriptor-numbering contract (fds 3..=8 in the
//! worker), so the worker may be a process of any implementation.
//!
//! # Architecture
//!
//! - **doorbell / shm**: the two kernel primitives
//! - **channel**: the send/receive protocol over them, one direction
//! - **endpoint**: an inbound/outbound channel pair, one side's view
//! - **handoff**: the fd contract and the fork/exec remap manifest
//! - **launcher / worker**: supervisor-side establish, worker-side bind

/// Smallest allowed buffer capacity. The establishment handshake's first
/// frame is an 8-byte capacity echo and must fit in the buffer; `establish`
/// and `bind` reject anything smaller before touching a descriptor.
pub const MIN_CAPACITY: usize = 8;

mod channel;
mod doorbell;
mod endpoint;
mod error;
pub mod handoff;
pub mod launcher;
mod shm;
pub mod worker;

pub use channel::{RecvChannel, SendChannel};
pub use doorbell::Doorbell;
pub use endpoint::Endpoint;
pub use error::{BindError, ChannelError, EstablishError, ResourceError};
pub use launcher::{ProcessLink, establish};
pub use shm::SharedBuffer;
pub use worker::{bind, capacity_from_args};
