//! One side's view of the bidirectional connection.
//!
//! An endpoint pairs an inbound and an outbound channel built over disjoint
//! descriptors and disjoint buffers, so the two directions never block or
//! corrupt each other. `split` hands the roles out for use on separate
//! threads; a worker typically runs `listen` on one thread and sends replies
//! from another.

use crate::channel::{RecvChannel, SendChannel};
use crate::error::ChannelError;

#[derive(Debug)]
pub struct Endpoint {
    inbound: RecvChannel,
    outbound: SendChannel,
}

impl Endpoint {
    pub fn new(inbound: RecvChannel, outbound: SendChannel) -> Self {
        Self { inbound, outbound }
    }

    pub fn capacity(&self) -> usize {
        self.outbound.capacity()
    }

    /// Send one frame on the outbound channel, blocking until the peer acks.
    pub fn send(&mut self, bytes: &[u8]) -> Result<(), ChannelError> {
        self.outbound.send(bytes)
    }

    /// Receive one frame from the inbound channel.
    pub fn receive(&mut self) -> Result<Vec<u8>, ChannelError> {
        self.inbound.receive()
    }

    /// Run the inbound service loop. See [`RecvChannel::listen`].
    pub fn listen<F>(&mut self, handler: F) -> Result<(), ChannelError>
    where
        F: FnMut(&[u8]),
    {
        self.inbound.listen(handler)
    }

    /// Take the two directions apart, typically to move them onto separate
    /// threads. They share no descriptors or memory.
    pub fn split(self) -> (RecvChannel, SendChannel) {
        (self.inbound, self.outbound)
    }
}
