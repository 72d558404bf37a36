use super::*;

/// Minimum possible event time. Used as the initial "no watermark" sentinel.
pub const EVENT_TIME_MIN: EventTime = i64::MIN;

/// Maximum possible event time. Used to represent no upper bound.
pub const EVENT_TIME_MAX: EventTime = i64::MAX;

/// Derives a bounded out-of-orderness watermark from the records of one source.
///
/// The watermark is `max_seen_timestamp - max_delay`: the source tolerates
/// records arriving up to `max_delay` behind the newest one seen so far.
/// The watermark never moves backwards, whatever order records arrive in.
///
/// # Example
/// ```
/// use std::time::Duration;
/// use flightwatch_core::time::WatermarkTracker;
///
/// let mut tracker = WatermarkTracker::new(Duration::from_secs(15), |ts: &i64| *ts);
/// assert_eq!(tracker.observe(60_000).timestamp, 45_000);
/// assert_eq!(tracker.observe(10_000).timestamp, 45_000);
/// ```
pub struct WatermarkTracker<T, F> {
    max_delay_ms: i64,
    timestamp_extractor: F,
    max_seen_timestamp: EventTime,
    _phantom: PhantomData<fn(&T)>,
}

impl<T, F: Fn(&T) -> EventTime> WatermarkTracker<T, F> {
    /// Create a tracker with the given maximum out-of-order delay and
    /// timestamp extractor.
    pub fn new(max_delay: Duration, timestamp_extractor: F) -> Self {
        Self {
            max_delay_ms: max_delay.as_millis() as i64,
            timestamp_extractor,
            max_seen_timestamp: EVENT_TIME_MIN,
            _phantom: PhantomData,
        }
    }

    /// Extract the event time of an element.
    pub fn extract_timestamp(&self, element: &T) -> EventTime {
        (self.timestamp_extractor)(element)
    }

    /// Record an event time and return the resulting watermark.
    pub fn observe(&mut self, event_time: EventTime) -> Watermark {
        if event_time > self.max_seen_timestamp {
            self.max_seen_timestamp = event_time;
        }
        Watermark::new(self.max_seen_timestamp.saturating_sub(self.max_delay_ms))
    }

    /// Extract the event time of `element`, record it, and return both the
    /// event time and the resulting watermark.
    pub fn observe_element(&mut self, element: &T) -> (EventTime, Watermark) {
        let event_time = self.extract_timestamp(element);
        (event_time, self.observe(event_time))
    }

    /// The current watermark, or `None` before the first event.
    pub fn current_watermark(&self) -> Option<Watermark> {
        if self.max_seen_timestamp == EVENT_TIME_MIN {
            return None;
        }
        Some(Watermark::new(
            self.max_seen_timestamp.saturating_sub(self.max_delay_ms),
        ))
    }
}
