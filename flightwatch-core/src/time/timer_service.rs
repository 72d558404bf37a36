use super::*;

/// Event-time timers ordered by fire time.
///
/// Used by window operators to find every `(key, window)` whose close
/// deadline has been reached by the watermark with a range scan instead of
/// walking all open windows.
///
/// # Invariant
/// A `(fire_at, target)` pair is registered at most once; re-registering it
/// is a no-op.
#[derive(Debug, Clone)]
pub struct TimerService<T: Ord> {
    timers: BTreeMap<EventTime, BTreeSet<T>>,
}

impl<T: Ord> TimerService<T> {
    pub fn new() -> Self {
        Self {
            timers: BTreeMap::new(),
        }
    }

    /// Register `target` to fire once the watermark reaches `fire_at`.
    pub fn register(&mut self, fire_at: EventTime, target: T) {
        self.timers.entry(fire_at).or_default().insert(target);
    }

    /// Remove and return every timer with `fire_at <= watermark_ts`, in
    /// ascending `fire_at` order.
    pub fn drain_due(&mut self, watermark_ts: EventTime) -> Vec<(EventTime, T)> {
        let pending = match watermark_ts.checked_add(1) {
            Some(bound) => self.timers.split_off(&bound),
            None => BTreeMap::new(),
        };
        let due = std::mem::replace(&mut self.timers, pending);
        due.into_iter()
            .flat_map(|(fire_at, targets)| targets.into_iter().map(move |t| (fire_at, t)))
            .collect()
    }

    /// Remove and return every registered timer, in ascending `fire_at` order.
    pub fn drain_all(&mut self) -> Vec<(EventTime, T)> {
        self.drain_due(EVENT_TIME_MAX)
    }

    /// Total number of registered timers.
    pub fn len(&self) -> usize {
        self.timers.values().map(|targets| targets.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }
}

impl<T: Ord> Default for TimerService<T> {
    fn default() -> Self {
        Self::new()
    }
}
