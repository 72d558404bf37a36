use super::*;

/// A half-open event-time window `[start, end)`.
///
/// Windows order by start, then end, so per-key close order follows time.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
pub struct TimeWindow {
    pub start: EventTime,
    pub end: EventTime,
}

impl TimeWindow {
    pub fn new(start: EventTime, end: EventTime) -> Self {
        Self { start, end }
    }

    /// The maximum timestamp that belongs to this window.
    pub fn max_timestamp(&self) -> EventTime {
        self.end - 1
    }

    /// Return true if `timestamp` falls inside this window.
    pub fn contains(&self, timestamp: EventTime) -> bool {
        timestamp >= self.start && timestamp < self.end
    }

    /// The watermark at which this window closes: `end + allowed_lateness`.
    pub fn close_deadline(&self, allowed_lateness_ms: i64) -> EventTime {
        self.end.saturating_add(allowed_lateness_ms)
    }

    /// Whether `watermark` has reached this window's close deadline.
    pub fn is_closed_at(&self, watermark: EventTime, allowed_lateness_ms: i64) -> bool {
        self.close_deadline(allowed_lateness_ms) <= watermark
    }
}

impl std::fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TimeWindow([{}, {}))", self.start, self.end)
    }
}

/// Assigns one or more [`TimeWindow`]s to each event time.
pub trait WindowAssigner: Send + Sync {
    /// Return the windows that contain `timestamp`, in ascending start order.
    fn assign_windows(&self, timestamp: EventTime) -> Vec<TimeWindow>;
}
