use super::*;

/// Fixed-size, overlapping event-time windows.
///
/// Window starts are multiples of `slide` (shifted by `offset`); an event at
/// `t` belongs to every window with `start <= t < start + size`, i.e. to
/// `ceil(size / slide)` windows when `size` is a multiple of `slide`.
#[derive(Debug, Clone)]
pub struct SlidingEventTimeWindows {
    size_ms: i64,
    slide_ms: i64,
    offset_ms: i64,
}

impl SlidingEventTimeWindows {
    /// Create sliding windows of the given `size` advancing every `slide`.
    pub fn of(size: Duration, slide: Duration) -> Result<Self> {
        Self::of_with_offset(size, slide, Duration::ZERO)
    }

    /// Create sliding windows with a non-zero alignment `offset`.
    pub fn of_with_offset(size: Duration, slide: Duration, offset: Duration) -> Result<Self> {
        let size_ms = size.as_millis() as i64;
        let slide_ms = slide.as_millis() as i64;
        if size_ms <= 0 || slide_ms <= 0 {
            bail!("window size and slide must be positive (size={size_ms}ms, slide={slide_ms}ms)");
        }
        if slide_ms > size_ms {
            bail!("window slide {slide_ms}ms exceeds window size {size_ms}ms");
        }
        Ok(Self {
            size_ms,
            slide_ms,
            offset_ms: offset.as_millis() as i64,
        })
    }

    pub fn size_ms(&self) -> i64 {
        self.size_ms
    }

    pub fn slide_ms(&self) -> i64 {
        self.slide_ms
    }

    /// Start timestamps of every window containing `timestamp`, ascending.
    ///
    /// Computed in `i128`; near the ends of the `i64` range, windows whose
    /// start is not representable are left out.
    pub fn window_starts(&self, timestamp: EventTime) -> Vec<EventTime> {
        let (ts, size, slide) = (
            timestamp as i128,
            self.size_ms as i128,
            self.slide_ms as i128,
        );
        let last_start = ts - (ts - self.offset_ms as i128).rem_euclid(slide);
        let mut starts = Vec::with_capacity((self.size_ms / self.slide_ms + 1) as usize);
        let mut start = last_start;
        while start > ts - size {
            if let Ok(start) = EventTime::try_from(start) {
                starts.push(start);
            }
            start -= slide;
        }
        starts.reverse();
        starts
    }
}

impl WindowAssigner for SlidingEventTimeWindows {
    fn assign_windows(&self, timestamp: EventTime) -> Vec<TimeWindow> {
        self.window_starts(timestamp)
            .into_iter()
            .map(|start| TimeWindow::new(start, start.saturating_add(self.size_ms)))
            .collect()
    }
}
