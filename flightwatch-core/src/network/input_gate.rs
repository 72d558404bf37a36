//! Fan-in of several upstream channels into one stage.
//!
//! - Fair selection across channels
//! - Per-channel `End` tracking: a stage sees a single `End` once every
//!   upstream channel has finished

use super::channel::LocalChannelReceiver;
use crate::types::StreamElement;
use anyhow::{Result, anyhow};
use crossbeam_channel::Select;
use tracing::trace;

/// Channel identifier (index in the input gate).
pub type ChannelIndex = usize;

/// Reads from multiple upstream channels.
pub struct InputGate<T> {
    channels: Vec<LocalChannelReceiver<T>>,
    ended_channels: Vec<bool>,
    ended_count: usize,
}

impl<T> InputGate<T> {
    /// Create a gate over the given upstream channels.
    pub fn new(channels: Vec<LocalChannelReceiver<T>>) -> Self {
        let num_channels = channels.len();
        Self {
            channels,
            ended_channels: vec![false; num_channels],
            ended_count: 0,
        }
    }

    /// Get the next element from any channel that has not ended yet.
    ///
    /// Returns `(channel_index, element)`. `End` markers of individual
    /// channels are consumed here; the last one is returned so the caller
    /// can finish. Errors once all channels have ended, or when an upstream
    /// sender disappears without sending `End`.
    pub fn next(&mut self) -> Result<(ChannelIndex, StreamElement<T>)> {
        if self.all_ended() {
            return Err(anyhow!("all input channels have ended"));
        }

        loop {
            let mut select = Select::new();
            let mut active_indices = Vec::with_capacity(self.channels.len());
            for (idx, receiver) in self.channels.iter().enumerate() {
                if !self.ended_channels[idx] {
                    select.recv(&receiver.receiver);
                    active_indices.push(idx);
                }
            }

            let oper = select.select();
            let channel_idx = active_indices[oper.index()];
            let element = oper
                .recv(&self.channels[channel_idx].receiver)
                .map_err(|_| anyhow!("input channel {} closed without End", channel_idx))?;

            if matches!(element, StreamElement::End) {
                self.mark_ended(channel_idx);
                trace!(
                    channel = channel_idx,
                    ended = self.num_ended(),
                    channels = self.num_channels(),
                    "input channel ended"
                );
                if self.all_ended() {
                    return Ok((channel_idx, element));
                }
                continue;
            }

            return Ok((channel_idx, element));
        }
    }

    /// Mark a channel as ended.
    pub fn mark_ended(&mut self, channel_idx: ChannelIndex) {
        if !self.ended_channels[channel_idx] {
            self.ended_channels[channel_idx] = true;
            self.ended_count += 1;
        }
    }

    /// Check if all input channels have ended.
    pub fn all_ended(&self) -> bool {
        self.ended_count == self.channels.len()
    }

    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    pub fn num_ended(&self) -> usize {
        self.ended_count
    }
}

#[cfg(test)]
#[path = "tests/input_gate_tests.rs"]
mod tests;
