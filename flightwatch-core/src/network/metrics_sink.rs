//! Asynchronous Graphite pickle sink.
//!
//! A single writer task owns the TCP connection. Producers hand metrics to
//! it through a bounded queue, so a slow receiver pushes back on the
//! pipeline instead of growing memory. While the receiver is unreachable,
//! metrics wait in a bounded retry buffer and the oldest are dropped first.

use std::collections::VecDeque;
use std::slice;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use anyhow::{Result, anyhow};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep, sleep_until, timeout};
use tracing::{debug, info, warn};

use super::frame::write_frame;
use super::pickle::{TimestampedMetric, encode_metrics};

/// Connection and buffering parameters of a [`MetricsSink`].
#[derive(Debug, Clone)]
pub struct MetricsSinkConfig {
    /// `host:port` of the pickle receiver.
    pub address: String,
    /// Capacity of the producer queue.
    pub queue_capacity: usize,
    /// Metrics kept while disconnected before the oldest is dropped.
    pub retry_buffer_capacity: usize,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub connect_timeout: Duration,
    /// Flush attempts made for buffered metrics once producers are gone.
    pub shutdown_attempts: u32,
}

impl Default for MetricsSinkConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:2004".to_string(),
            queue_capacity: 1024,
            retry_buffer_capacity: 10_000,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(5),
            shutdown_attempts: 3,
        }
    }
}

#[derive(Debug, Default)]
struct SinkCounters {
    sent: AtomicU64,
    dropped: AtomicU64,
    reconnects: AtomicU64,
}

impl SinkCounters {
    fn snapshot(&self) -> SinkStats {
        SinkStats {
            sent: self.sent.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
        }
    }
}

/// Delivery counters of a [`MetricsSink`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SinkStats {
    /// Metrics written to the receiver.
    pub sent: u64,
    /// Metrics given up on: retry buffer overflow or unsent at shutdown.
    pub dropped: u64,
    /// Connection attempts after the first one.
    pub reconnects: u64,
}

/// Producer handle of the sink. Clone it for every producer; the writer
/// task flushes and exits once all handles are dropped.
#[derive(Clone)]
pub struct MetricsSink {
    tx: mpsc::Sender<TimestampedMetric>,
    counters: Arc<SinkCounters>,
}

impl MetricsSink {
    /// Start the writer task on the current tokio runtime.
    ///
    /// The returned join handle resolves to the final counters.
    pub fn spawn(config: MetricsSinkConfig) -> (Self, JoinHandle<SinkStats>) {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let counters = Arc::new(SinkCounters::default());
        let writer = SinkWriter {
            backoff: config.initial_backoff,
            next_attempt: Instant::now(),
            pending: VecDeque::new(),
            stream: None,
            attempts: 0,
            counters: counters.clone(),
            rx,
            config,
        };
        let handle = tokio::spawn(writer.run());
        (Self { tx, counters }, handle)
    }

    /// Queue a metric, waiting while the queue is full.
    pub async fn emit(&self, metric: TimestampedMetric) -> Result<()> {
        self.tx
            .send(metric)
            .await
            .map_err(|_| anyhow!("metrics sink closed"))
    }

    /// Queue a metric from a non-async thread, blocking while the queue is
    /// full. Must not be called from within an async context.
    pub fn blocking_emit(&self, metric: TimestampedMetric) -> Result<()> {
        self.tx
            .blocking_send(metric)
            .map_err(|_| anyhow!("metrics sink closed"))
    }

    pub fn stats(&self) -> SinkStats {
        self.counters.snapshot()
    }
}

struct SinkWriter {
    config: MetricsSinkConfig,
    rx: mpsc::Receiver<TimestampedMetric>,
    counters: Arc<SinkCounters>,
    pending: VecDeque<TimestampedMetric>,
    stream: Option<TcpStream>,
    backoff: Duration,
    next_attempt: Instant,
    attempts: u64,
}

impl SinkWriter {
    async fn run(mut self) -> SinkStats {
        loop {
            let retry_at = (self.stream.is_none() && !self.pending.is_empty())
                .then_some(self.next_attempt);
            tokio::select! {
                maybe_metric = self.rx.recv() => match maybe_metric {
                    Some(metric) => {
                        self.buffer(metric);
                        while let Ok(metric) = self.rx.try_recv() {
                            self.buffer(metric);
                        }
                    }
                    None => break,
                },
                _ = sleep_until(retry_at.unwrap_or_else(Instant::now)), if retry_at.is_some() => {}
            }
            self.flush(false).await;
        }

        self.shutdown().await;
        let stats = self.counters.snapshot();
        info!(
            sent = stats.sent,
            dropped = stats.dropped,
            reconnects = stats.reconnects,
            "metrics sink stopped"
        );
        stats
    }

    fn buffer(&mut self, metric: TimestampedMetric) {
        if self.pending.len() >= self.config.retry_buffer_capacity.max(1) {
            self.pending.pop_front();
            let dropped = self.counters.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            if dropped == 1 || dropped % 1000 == 0 {
                warn!(
                    dropped,
                    capacity = self.config.retry_buffer_capacity,
                    "retry buffer full, dropping oldest metric"
                );
            }
        }
        self.pending.push_back(metric);
    }

    async fn shutdown(&mut self) {
        for attempt in 0..self.config.shutdown_attempts {
            if self.pending.is_empty() {
                break;
            }
            if attempt > 0 {
                sleep(self.backoff).await;
            }
            self.flush(true).await;
        }

        let unsent = self.pending.len() as u64;
        if unsent > 0 {
            self.counters.dropped.fetch_add(unsent, Ordering::Relaxed);
            warn!(unsent, "dropping metrics left unsent at shutdown");
            self.pending.clear();
        }
    }

    /// Write every buffered metric, connecting first if needed. `force`
    /// ignores the reconnect backoff.
    async fn flush(&mut self, force: bool) {
        if self.pending.is_empty() {
            return;
        }
        if self.stream.is_none() && !self.connect(force).await {
            return;
        }
        let Some(stream) = self.stream.as_mut() else {
            return;
        };

        while let Some(metric) = self.pending.front() {
            let payload = encode_metrics(slice::from_ref(metric));
            if let Err(e) = write_frame(stream, &payload).await {
                warn!(address = %self.config.address, error = %e, "metrics write failed, reconnecting");
                self.stream = None;
                self.next_attempt = Instant::now();
                return;
            }
            self.pending.pop_front();
            self.counters.sent.fetch_add(1, Ordering::Relaxed);
        }
    }

    async fn connect(&mut self, force: bool) -> bool {
        if !force && Instant::now() < self.next_attempt {
            return false;
        }
        if self.attempts > 0 {
            self.counters.reconnects.fetch_add(1, Ordering::Relaxed);
        }
        self.attempts += 1;

        let result = timeout(
            self.config.connect_timeout,
            TcpStream::connect(self.config.address.as_str()),
        )
        .await;
        match result {
            Ok(Ok(stream)) => {
                info!(address = %self.config.address, "connected to metrics receiver");
                self.stream = Some(stream);
                self.backoff = self.config.initial_backoff;
                true
            }
            Ok(Err(e)) => {
                self.schedule_retry(&e.to_string());
                false
            }
            Err(_) => {
                self.schedule_retry("connect timed out");
                false
            }
        }
    }

    fn schedule_retry(&mut self, reason: &str) {
        warn!(
            address = %self.config.address,
            error = reason,
            retry_in_ms = self.backoff.as_millis() as u64,
            buffered = self.pending.len(),
            "metrics receiver unreachable"
        );
        self.next_attempt = Instant::now() + self.backoff;
        self.backoff = (self.backoff * 2).min(self.config.max_backoff);
        debug!(next_backoff_ms = self.backoff.as_millis() as u64, "backoff increased");
    }
}

#[cfg(test)]
#[path = "tests/metrics_sink_tests.rs"]
mod tests;
