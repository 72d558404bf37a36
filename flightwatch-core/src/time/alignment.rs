use super::*;

/// Aligns the watermarks of several upstream channels feeding one stage.
///
/// A stage can only advance its event-time clock to the minimum of its
/// input watermarks: a channel that is behind may still deliver records
/// for windows the others consider finished.
pub struct WatermarkAligner {
    /// Per-channel last-seen watermark timestamp. Starts at EVENT_TIME_MIN.
    channel_watermarks: Vec<EventTime>,
    /// The aligned watermark last handed to the stage.
    current_min: EventTime,
}

impl WatermarkAligner {
    /// Create an aligner for `num_channels` upstream channels.
    pub fn new(num_channels: usize) -> Self {
        Self {
            channel_watermarks: vec![EVENT_TIME_MIN; num_channels],
            current_min: EVENT_TIME_MIN,
        }
    }

    /// Notify the aligner that `channel_id` delivered a watermark.
    ///
    /// Returns `Some(watermark)` when the aligned minimum advanced, `None`
    /// otherwise. A stale watermark on one channel never pulls that
    /// channel, or the aligned minimum, backwards.
    pub fn advance(&mut self, channel_id: usize, watermark: Watermark) -> Option<Watermark> {
        let slot = &mut self.channel_watermarks[channel_id];
        *slot = (*slot).max(watermark.timestamp);

        let new_min = self
            .channel_watermarks
            .iter()
            .copied()
            .min()
            .unwrap_or(EVENT_TIME_MIN);
        if new_min > self.current_min {
            self.current_min = new_min;
            Some(Watermark::new(new_min))
        } else {
            None
        }
    }

    /// The aligned watermark, `EVENT_TIME_MIN` until every channel reported.
    pub fn current_min_timestamp(&self) -> EventTime {
        self.current_min
    }

    pub fn num_channels(&self) -> usize {
        self.channel_watermarks.len()
    }
}
