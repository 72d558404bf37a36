//! Fan-out from one stage to its downstream channels.
//!
//! - Partitioned: records routed by key hash, so every record of one key
//!   lands on the same downstream worker
//! - Broadcast: watermarks and `End` go to every downstream channel

use super::channel::LocalChannelSender;
use crate::runtime::partitioner::Partitioner;
use crate::types::StreamElement;
use anyhow::{Result, bail};

/// Sends elements to a fixed set of downstream channels.
pub struct OutputGate<T> {
    channels: Vec<LocalChannelSender<T>>,
}

impl<T> OutputGate<T> {
    pub fn new(channels: Vec<LocalChannelSender<T>>) -> Self {
        Self { channels }
    }

    /// Emit an element to a specific channel (by index).
    pub fn emit_to(&self, channel_idx: usize, element: StreamElement<T>) -> Result<()> {
        match self.channels.get(channel_idx) {
            Some(channel) => channel.send(element),
            None => bail!(
                "output channel {} out of range ({} channels)",
                channel_idx,
                self.channels.len()
            ),
        }
    }

    /// Emit an element to the channel chosen by `partitioner` for `key`.
    pub fn emit_partitioned<K, P>(
        &self,
        element: StreamElement<T>,
        key: &K,
        partitioner: &P,
    ) -> Result<()>
    where
        P: Partitioner<K>,
    {
        let target = partitioner.partition(key, self.channels.len());
        self.emit_to(target, element)
    }

    /// Broadcast an element to all output channels.
    pub fn broadcast(&self, element: StreamElement<T>) -> Result<()>
    where
        T: Clone,
    {
        let Some((last, rest)) = self.channels.split_last() else {
            return Ok(());
        };
        for channel in rest {
            channel.send(element.clone())?;
        }
        last.send(element)
    }

    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }
}

#[cfg(test)]
#[path = "tests/output_gate_tests.rs"]
mod tests;
