//! Maps the job's three result streams onto Graphite metrics and hands
//! them to one shared emitter.

use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::Result;
use flightwatch_core::network::{MetricsSink, TimestampedMetric};
use flightwatch_core::types::TimestampedEntry;

use crate::aircraft::ClassifiedAircraft;

/// Destination of finished metrics. Called concurrently from every
/// producing stage.
pub trait MetricEmitter: Send + Sync {
    fn emit_metric(&self, metric: TimestampedMetric) -> Result<()>;
}

impl MetricEmitter for MetricsSink {
    /// Blocks the calling stage while the sink queue is full.
    fn emit_metric(&self, metric: TimestampedMetric) -> Result<()> {
        self.blocking_emit(metric)
    }
}

/// One result of the job, in the shape of the stream that produced it.
#[derive(Debug, Clone, PartialEq)]
pub enum TelemetryOutput {
    /// A classified aircraft, keyed by aircraft id.
    Position(TimestampedEntry<i64, ClassifiedAircraft>),
    /// Maximum noise level of an airport, keyed `<airport>_AVG_NOISE`.
    Noise(TimestampedEntry<String, f64>),
    /// Total CO2 of an airport, keyed `<airport>_C02_EMISSION`.
    Co2(TimestampedEntry<String, f64>),
}

fn metric_name(raw: &str) -> String {
    raw.replace(' ', "_")
}

impl TelemetryOutput {
    /// Positions become `<airport>.<DIRECTION>` with value 1 at the
    /// aircraft's own time; airport results use their key as the name and
    /// the window end as the time. Times are floored to whole seconds.
    /// Positions without an airport yield no metric.
    pub fn to_metric(&self) -> Option<TimestampedMetric> {
        match self {
            Self::Position(entry) => {
                let aircraft = &entry.value;
                let airport = aircraft.airport.as_deref()?;
                Some(TimestampedMetric::new(
                    metric_name(&format!("{}.{}", airport, aircraft.direction)),
                    aircraft.pos_time().div_euclid(1000),
                    1.0,
                ))
            }
            Self::Noise(entry) | Self::Co2(entry) => Some(TimestampedMetric::new(
                metric_name(&entry.key),
                entry.timestamp.div_euclid(1000),
                entry.value,
            )),
        }
    }
}

/// The single entry point all stages emit through.
pub struct TelemetrySink<E> {
    emitter: E,
    emitted: AtomicU64,
}

impl<E: MetricEmitter> TelemetrySink<E> {
    pub fn new(emitter: E) -> Self {
        Self {
            emitter,
            emitted: AtomicU64::new(0),
        }
    }

    /// Convert `output` and pass it on. Returns `false` if it maps to no
    /// metric.
    pub fn emit(&self, output: TelemetryOutput) -> Result<bool> {
        let Some(metric) = output.to_metric() else {
            return Ok(false);
        };
        self.emitter.emit_metric(metric)?;
        self.emitted.fetch_add(1, Ordering::Relaxed);
        Ok(true)
    }

    pub fn emitted(&self) -> u64 {
        self.emitted.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
#[path = "tests/metric_tests.rs"]
mod tests;
