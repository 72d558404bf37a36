//! Bounded local channels between pipeline stages.
//!
//! Every stage runs on its own thread; stages talk through crossbeam
//! channels with a fixed capacity, so a slow consumer blocks its producer
//! instead of letting queues grow without bound.

use crate::types::StreamElement;
use anyhow::{Result, anyhow};
use crossbeam_channel::{Receiver, Sender, bounded};

/// Channel buffer size used when none is configured.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Sending half of a stage-to-stage channel.
#[derive(Clone)]
pub struct LocalChannelSender<T> {
    sender: Sender<StreamElement<T>>,
}

impl<T> LocalChannelSender<T> {
    /// Send an element, blocking while the channel is full.
    pub fn send(&self, element: StreamElement<T>) -> Result<()> {
        self.sender
            .send(element)
            .map_err(|_| anyhow!("channel closed: receiver dropped"))
    }
}

/// Receiving half of a stage-to-stage channel.
pub struct LocalChannelReceiver<T> {
    pub(crate) receiver: Receiver<StreamElement<T>>,
}

impl<T> LocalChannelReceiver<T> {
    /// Receive the next element, blocking until one is available.
    pub fn recv(&self) -> Result<StreamElement<T>> {
        self.receiver
            .recv()
            .map_err(|_| anyhow!("channel closed: sender dropped"))
    }
}

/// Create a bounded channel pair with the given capacity.
pub fn local_channel<T>(capacity: usize) -> (LocalChannelSender<T>, LocalChannelReceiver<T>) {
    let (sender, receiver) = bounded(capacity);
    (
        LocalChannelSender { sender },
        LocalChannelReceiver { receiver },
    )
}

#[cfg(test)]
#[path = "tests/channel_tests.rs"]
mod tests;
