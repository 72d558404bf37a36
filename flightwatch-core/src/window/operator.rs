use super::*;

// ── WindowAggregateOperator ───────────────────────────────────────────────────

/// Converts a finished window into an output value, or drops it with `None`.
pub type FinishFn<K, T, OUT> = fn(&K, AggregateValue<T>) -> Option<OUT>;

/// What happened to a record handed to
/// [`WindowAggregateOperator::process_record`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FoldOutcome {
    /// Folded into this many still-open windows.
    Folded(usize),
    /// Every window the record belongs to had already closed.
    Late,
}

/// Keyed event-time window aggregation.
///
/// # Processing model
///
/// - **Records**: assigned to windows by the `WindowAssigner` and folded
///   into one accumulator per `(key, window)`. Windows that already closed
///   refuse the record; if all of them did, the record is counted as late.
/// - **Watermarks**: every window with `end + allowed_lateness <= watermark`
///   is finished exactly once, in ascending `end` order, and its state is
///   released. Results are emitted before the watermark is forwarded.
/// - **End**: all remaining windows are finished, then `End` is forwarded.
///
/// Each result is stamped with its window's `end`.
pub struct WindowAggregateOperator<K, T, OUT, WA>
where
    K: StreamData,
    T: Clone,
    WA: WindowAssigner,
{
    key_fn: fn(&T) -> K,
    timestamp_fn: fn(&T) -> EventTime,
    assigner: WA,
    aggregate: AggregateKind<T>,
    finish: FinishFn<K, T, OUT>,
    allowed_lateness_ms: i64,
    /// Open windows: (key_bytes, window) -> (original_key, accumulator).
    buffers: HashMap<(Vec<u8>, TimeWindow), (K, Accumulator<T>)>,
    /// Close deadlines of the open windows.
    timer_service: TimerService<(Vec<u8>, TimeWindow)>,
    current_watermark: EventTime,
    late_events: u64,
    closed_windows: u64,
}

impl<K, T, OUT, WA> WindowAggregateOperator<K, T, OUT, WA>
where
    K: StreamData,
    T: Clone,
    WA: WindowAssigner,
{
    /// Create a new operator.
    ///
    /// - `key_fn`: extracts the grouping key from each item
    /// - `timestamp_fn`: event time for records that carry none
    /// - `assigner`: assigns windows to event times
    /// - `aggregate`: the accumulator every window starts from
    /// - `finish`: maps `(key, aggregate value)` to the output
    pub fn new(
        key_fn: fn(&T) -> K,
        timestamp_fn: fn(&T) -> EventTime,
        assigner: WA,
        aggregate: AggregateKind<T>,
        finish: FinishFn<K, T, OUT>,
    ) -> Self {
        Self {
            key_fn,
            timestamp_fn,
            assigner,
            aggregate,
            finish,
            allowed_lateness_ms: 0,
            buffers: HashMap::new(),
            timer_service: TimerService::new(),
            current_watermark: EVENT_TIME_MIN,
            late_events: 0,
            closed_windows: 0,
        }
    }

    /// Keep windows open for `lateness` past their end.
    pub fn with_allowed_lateness(mut self, lateness: Duration) -> Self {
        self.allowed_lateness_ms = lateness.as_millis() as i64;
        self
    }

    /// Process one stream element and return what should go downstream.
    pub fn process(
        &mut self,
        element: StreamElement<T>,
    ) -> Result<Vec<StreamElement<TimestampedEntry<K, OUT>>>> {
        match element {
            StreamElement::Record(record) => {
                let timestamp = record
                    .timestamp
                    .unwrap_or_else(|| (self.timestamp_fn)(&record.value));
                let key = (self.key_fn)(&record.value);
                self.process_record(key, timestamp, &record.value)?;
                Ok(Vec::new())
            }
            StreamElement::Watermark(watermark) => {
                let mut output = Self::into_elements(self.try_close(watermark.timestamp));
                output.push(StreamElement::Watermark(watermark));
                Ok(output)
            }
            StreamElement::End => {
                let mut output = Self::into_elements(self.drain());
                output.push(StreamElement::End);
                Ok(output)
            }
        }
    }

    /// Fold `value` into every still-open window containing `timestamp`.
    pub fn process_record(&mut self, key: K, timestamp: EventTime, value: &T) -> Result<FoldOutcome> {
        let windows = self.assigner.assign_windows(timestamp);
        let mut folded = 0;
        for window in &windows {
            if self.fold(window, &key, value)? {
                folded += 1;
            }
        }

        if folded == 0 {
            self.late_events += 1;
            trace!(
                timestamp,
                watermark = self.current_watermark,
                "dropping late record"
            );
            return Ok(FoldOutcome::Late);
        }
        Ok(FoldOutcome::Folded(folded))
    }

    /// Fold `value` into the accumulator of `(key, window)`.
    ///
    /// Returns `false` without touching any state if the window has
    /// already closed.
    pub fn fold(&mut self, window: &TimeWindow, key: &K, value: &T) -> Result<bool> {
        if window.is_closed_at(self.current_watermark, self.allowed_lateness_ms) {
            return Ok(false);
        }

        let key_bytes = bincode::serialize(key)?;
        let map_key = (key_bytes, window.clone());
        if let Some((_, accumulator)) = self.buffers.get_mut(&map_key) {
            accumulator.accumulate(value);
            return Ok(true);
        }

        let mut accumulator = self.aggregate.create_accumulator();
        accumulator.accumulate(value);
        self.timer_service.register(
            window.close_deadline(self.allowed_lateness_ms),
            map_key.clone(),
        );
        self.buffers.insert(map_key, (key.clone(), accumulator));
        Ok(true)
    }

    /// Advance the watermark and finish every window whose deadline it
    /// reached. A watermark behind the current one closes nothing.
    pub fn try_close(&mut self, watermark: EventTime) -> Vec<TimestampedEntry<K, OUT>> {
        if watermark > self.current_watermark {
            self.current_watermark = watermark;
        }
        let due = self.timer_service.drain_due(self.current_watermark);
        let output = self.finish_windows(due);
        if !output.is_empty() {
            debug!(
                watermark = self.current_watermark,
                results = output.len(),
                open = self.buffered_window_count(),
                pending_timers = self.timer_service.len(),
                "closed windows"
            );
        }
        output
    }

    /// Finish every open window regardless of the watermark.
    pub fn drain(&mut self) -> Vec<TimestampedEntry<K, OUT>> {
        let due = self.timer_service.drain_all();
        let output = self.finish_windows(due);
        debug!(results = output.len(), "drained all windows");
        output
    }

    fn finish_windows(
        &mut self,
        due: Vec<(EventTime, (Vec<u8>, TimeWindow))>,
    ) -> Vec<TimestampedEntry<K, OUT>> {
        let mut output = Vec::new();
        for (_, map_key) in due {
            let Some((key, accumulator)) = self.buffers.remove(&map_key) else {
                continue;
            };
            self.closed_windows += 1;
            let window_end = map_key.1.end;
            if let Some(value) = (self.finish)(&key, accumulator.finish()) {
                output.push(TimestampedEntry::new(window_end, key, value));
            }
        }
        output
    }

    fn into_elements(
        entries: Vec<TimestampedEntry<K, OUT>>,
    ) -> Vec<StreamElement<TimestampedEntry<K, OUT>>> {
        entries
            .into_iter()
            .map(|entry| {
                let timestamp = entry.timestamp;
                StreamElement::timestamped_record(entry, timestamp)
            })
            .collect()
    }

    pub fn current_watermark(&self) -> EventTime {
        self.current_watermark
    }

    /// Records dropped because every window they belong to had closed.
    pub fn late_events(&self) -> u64 {
        self.late_events
    }

    pub fn buffered_window_count(&self) -> usize {
        self.buffers.len()
    }

    pub fn closed_window_count(&self) -> u64 {
        self.closed_windows
    }
}
