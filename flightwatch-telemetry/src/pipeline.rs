//! The telemetry job as a thread-per-stage dataflow.
//!
//! ```text
//! Source (1 thread): watermarks, low-altitude filter, airport geofence
//!     |
//!     | hash partition by aircraft id, watermarks broadcast
//!     v
//! Classify (parallelism threads): sliding-window trend per aircraft
//!     |                          \
//!     | broadcast                 +--> position metrics
//!     v
//! Noise (1 thread)   CO2 (1 thread): sliding-window aggregate per airport
//!     |                  |
//!     +------------------+--> airport metrics
//! ```
//!
//! Every stage owns its operator state. Stages with several inputs align
//! their watermarks to the slowest input before closing windows.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use anyhow::{Context, Result, anyhow};
use flightwatch_core::network::{InputGate, LocalChannelReceiver, OutputGate, local_channel};
use flightwatch_core::runtime::HashPartitioner;
use flightwatch_core::time::{WatermarkAligner, WatermarkTracker};
use flightwatch_core::types::{EventTime, StreamElement, TimestampedEntry};
use flightwatch_core::window::{AggregateKind, SlidingEventTimeWindows, WindowAggregateOperator};
use tracing::{debug, info, trace};

use crate::aircraft::{ClassifiedAircraft, PositionReport};
use crate::classifier::{finish_classification, trend_aggregate};
use crate::config::PipelineSettings;
use crate::enrichment::{AirportMeasurement, Enricher, is_low_altitude};
use crate::metric::{MetricEmitter, TelemetryOutput, TelemetrySink};
use crate::reference::ReferenceData;

/// Output of the classification pass, keyed by aircraft id.
pub type ClassifiedEntry = TimestampedEntry<i64, ClassifiedAircraft>;

type ClassifyOperator =
    WindowAggregateOperator<i64, ClassifiedAircraft, ClassifiedAircraft, SlidingEventTimeWindows>;
type AirportOperator =
    WindowAggregateOperator<String, AirportMeasurement, f64, SlidingEventTimeWindows>;

/// Counters of one pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineReport {
    pub records_read: u64,
    /// Reports dropped by the altitude filter or the airport geofence.
    pub records_filtered: u64,
    pub classified: u64,
    pub noise_entries: u64,
    pub co2_entries: u64,
    pub late_classification: u64,
    pub late_noise: u64,
    pub late_co2: u64,
    pub metrics_emitted: u64,
}

impl PipelineReport {
    pub fn late_events(&self) -> u64 {
        self.late_classification + self.late_noise + self.late_co2
    }
}

#[derive(Debug, Default)]
struct SourceCounts {
    read: u64,
    filtered: u64,
}

#[derive(Debug, Default)]
struct StageCounts {
    entries: u64,
    late: u64,
}

/// Which airport aggregate a pass-two stage computes.
#[derive(Debug, Clone, Copy)]
enum AirportAggregate {
    MaxNoise,
    TotalCo2,
}

impl AirportAggregate {
    fn name(self) -> &'static str {
        match self {
            Self::MaxNoise => "noise",
            Self::TotalCo2 => "co2",
        }
    }

    fn measure(self, enricher: &Enricher, aircraft: &ClassifiedAircraft) -> f64 {
        match self {
            Self::MaxNoise => enricher.lookup_noise(aircraft),
            Self::TotalCo2 => enricher.lookup_co2(aircraft),
        }
    }

    fn operator(self, assigner: SlidingEventTimeWindows) -> AirportOperator {
        match self {
            Self::MaxNoise => WindowAggregateOperator::new(
                |m: &AirportMeasurement| m.noise_key(),
                |m: &AirportMeasurement| m.timestamp,
                assigner,
                AggregateKind::max_by(|a: &AirportMeasurement, b: &AirportMeasurement| {
                    a.value.total_cmp(&b.value)
                }),
                |_key: &String, value| value.into_max().map(|m| m.value),
            ),
            Self::TotalCo2 => WindowAggregateOperator::new(
                |m: &AirportMeasurement| m.co2_key(),
                |m: &AirportMeasurement| m.timestamp,
                assigner,
                AggregateKind::summing(|m: &AirportMeasurement| m.value),
                |_key: &String, value| value.into_sum(),
            ),
        }
    }

    fn output(self, entry: TimestampedEntry<String, f64>) -> TelemetryOutput {
        match self {
            Self::MaxNoise => TelemetryOutput::Noise(entry),
            Self::TotalCo2 => TelemetryOutput::Co2(entry),
        }
    }
}

/// The complete job: source, classification pass and both airport passes.
pub struct TelemetryPipeline {
    settings: PipelineSettings,
    enricher: Enricher,
    assigner: SlidingEventTimeWindows,
    shutdown: Arc<AtomicBool>,
}

impl TelemetryPipeline {
    pub fn new(settings: PipelineSettings, reference: &ReferenceData) -> Result<Self> {
        let assigner =
            SlidingEventTimeWindows::of(settings.window_length(), settings.window_slide())
                .context("invalid window configuration")?;
        if settings.parallelism == 0 {
            return Err(anyhow!("parallelism must be at least 1"));
        }
        Ok(Self {
            settings,
            enricher: Enricher::new(reference),
            assigner,
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Use `flag` to stop reading input. Once it is set the source ends the
    /// stream and every stage drains its open windows.
    pub fn with_shutdown(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown = flag;
        self
    }

    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Run the job over `input` until it ends or shutdown is requested, and
    /// send every result through `emitter`.
    pub fn run<I, E>(&self, input: I, emitter: E) -> Result<PipelineReport>
    where
        I: IntoIterator<Item = PositionReport>,
        I::IntoIter: Send,
        E: MetricEmitter,
    {
        let parallelism = self.settings.parallelism;
        let capacity = self.settings.channel_capacity.max(1);
        info!(
            parallelism,
            window_length_ms = self.settings.window_length_ms,
            window_slide_ms = self.settings.window_slide_ms,
            "starting telemetry pipeline"
        );

        let sink = TelemetrySink::new(emitter);

        // Source -> Classify
        let (source_senders, classify_receivers): (Vec<_>, Vec<_>) = (0..parallelism)
            .map(|_| local_channel::<ClassifiedAircraft>(capacity))
            .unzip();
        // Classify -> Noise, Classify -> CO2
        let (noise_senders, noise_receivers): (Vec<_>, Vec<_>) = (0..parallelism)
            .map(|_| local_channel::<ClassifiedEntry>(capacity))
            .unzip();
        let (co2_senders, co2_receivers): (Vec<_>, Vec<_>) = (0..parallelism)
            .map(|_| local_channel::<ClassifiedEntry>(capacity))
            .unzip();

        let input = input.into_iter();
        let mut report = thread::scope(|scope| -> Result<PipelineReport> {
            let sink = &sink;

            let source = thread::Builder::new()
                .name("source".to_string())
                .spawn_scoped(scope, move || {
                    self.run_source(input, OutputGate::new(source_senders))
                })
                .context("failed to spawn source thread")?;

            let mut classify_handles = Vec::with_capacity(parallelism);
            for (index, ((receiver, noise), co2)) in classify_receivers
                .into_iter()
                .zip(noise_senders)
                .zip(co2_senders)
                .enumerate()
            {
                let downstream = OutputGate::new(vec![noise, co2]);
                let handle = thread::Builder::new()
                    .name(format!("classify-{index}"))
                    .spawn_scoped(scope, move || {
                        self.run_classifier(index, receiver, downstream, sink)
                    })
                    .context("failed to spawn classification thread")?;
                classify_handles.push(handle);
            }

            let noise = thread::Builder::new()
                .name("noise".to_string())
                .spawn_scoped(scope, move || {
                    self.run_airport_stage(AirportAggregate::MaxNoise, noise_receivers, sink)
                })
                .context("failed to spawn noise thread")?;
            let co2 = thread::Builder::new()
                .name("co2".to_string())
                .spawn_scoped(scope, move || {
                    self.run_airport_stage(AirportAggregate::TotalCo2, co2_receivers, sink)
                })
                .context("failed to spawn co2 thread")?;

            // Join every stage before reporting the first failure.
            let source = source
                .join()
                .map_err(|_| anyhow!("source thread panicked"));
            let classified: Vec<_> = classify_handles
                .into_iter()
                .map(|h| {
                    h.join()
                        .map_err(|_| anyhow!("classification thread panicked"))
                })
                .collect();
            let noise = noise.join().map_err(|_| anyhow!("noise thread panicked"));
            let co2 = co2.join().map_err(|_| anyhow!("co2 thread panicked"));

            let source = source??;
            let mut report = PipelineReport {
                records_read: source.read,
                records_filtered: source.filtered,
                ..PipelineReport::default()
            };
            for stage in classified {
                let stage = stage??;
                report.classified += stage.entries;
                report.late_classification += stage.late;
            }
            let noise = noise??;
            report.noise_entries = noise.entries;
            report.late_noise = noise.late;
            let co2 = co2??;
            report.co2_entries = co2.entries;
            report.late_co2 = co2.late;
            Ok(report)
        })?;

        report.metrics_emitted = sink.emitted();
        info!(
            records_read = report.records_read,
            records_filtered = report.records_filtered,
            classified = report.classified,
            noise_entries = report.noise_entries,
            co2_entries = report.co2_entries,
            late_events = report.late_events(),
            metrics_emitted = report.metrics_emitted,
            "telemetry pipeline finished"
        );
        Ok(report)
    }

    fn run_source<I>(&self, input: I, output: OutputGate<ClassifiedAircraft>) -> Result<SourceCounts>
    where
        I: Iterator<Item = PositionReport>,
    {
        let partitioner = HashPartitioner::new(|id: &i64| *id);
        let mut tracker = WatermarkTracker::new(
            self.settings.max_out_of_orderness(),
            |report: &PositionReport| report.pos_time,
        );
        let mut last_watermark: Option<EventTime> = None;
        let mut counts = SourceCounts::default();

        for report in input {
            if self.shutdown.load(Ordering::Relaxed) {
                info!(records_read = counts.read, "shutdown requested, ending input");
                break;
            }
            counts.read += 1;

            // Every report advances event time, including the ones filtered below.
            let (timestamp, watermark) = tracker.observe_element(&report);

            let located = if is_low_altitude(&report, self.settings.altitude_ceiling_ft) {
                self.enricher.assign_airport(report)
            } else {
                None
            };
            match located {
                Some(aircraft) => {
                    let id = aircraft.id();
                    output.emit_partitioned(
                        StreamElement::timestamped_record(aircraft, timestamp),
                        &id,
                        &partitioner,
                    )?;
                }
                None => counts.filtered += 1,
            }

            if last_watermark.is_none_or(|last| watermark.timestamp > last) {
                trace!(watermark = watermark.timestamp, "source watermark advanced");
                last_watermark = Some(watermark.timestamp);
                output.broadcast(StreamElement::Watermark(watermark))?;
            }
        }

        output.broadcast(StreamElement::End)?;
        debug!(
            records_read = counts.read,
            records_filtered = counts.filtered,
            workers = output.num_channels(),
            "source finished"
        );
        Ok(counts)
    }

    fn run_classifier<E: MetricEmitter>(
        &self,
        index: usize,
        input: LocalChannelReceiver<ClassifiedAircraft>,
        downstream: OutputGate<ClassifiedEntry>,
        sink: &TelemetrySink<E>,
    ) -> Result<StageCounts> {
        let mut operator: ClassifyOperator = WindowAggregateOperator::new(
            |aircraft: &ClassifiedAircraft| aircraft.id(),
            |aircraft: &ClassifiedAircraft| aircraft.pos_time(),
            self.assigner.clone(),
            trend_aggregate(),
            finish_classification,
        )
        .with_allowed_lateness(self.settings.allowed_lateness());
        let mut counts = StageCounts::default();

        'stream: loop {
            let element = input.recv()?;
            for output in operator.process(element)? {
                match output {
                    StreamElement::Record(record) => {
                        let entry = record.value;
                        counts.entries += 1;
                        sink.emit(TelemetryOutput::Position(entry.clone()))?;
                        if entry.value.airport.is_some() {
                            let timestamp = entry.timestamp;
                            downstream.broadcast(StreamElement::timestamped_record(entry, timestamp))?;
                        }
                    }
                    StreamElement::Watermark(watermark) => {
                        downstream.broadcast(StreamElement::Watermark(watermark))?;
                    }
                    StreamElement::End => {
                        downstream.broadcast(StreamElement::End)?;
                        break 'stream;
                    }
                }
            }
        }

        counts.late = operator.late_events();
        debug!(
            worker = index,
            classified = counts.entries,
            late = counts.late,
            windows = operator.closed_window_count(),
            watermark = operator.current_watermark(),
            "classification worker finished"
        );
        Ok(counts)
    }

    fn run_airport_stage<E: MetricEmitter>(
        &self,
        aggregate: AirportAggregate,
        inputs: Vec<LocalChannelReceiver<ClassifiedEntry>>,
        sink: &TelemetrySink<E>,
    ) -> Result<StageCounts> {
        let mut gate = InputGate::new(inputs);
        let mut aligner = WatermarkAligner::new(gate.num_channels());
        let mut operator = aggregate
            .operator(self.assigner.clone())
            .with_allowed_lateness(self.settings.allowed_lateness());
        let mut counts = StageCounts::default();

        'stream: loop {
            let (channel, element) = gate.next()?;
            let element = match element {
                StreamElement::Record(record) => {
                    let entry = record.value;
                    let Some(airport) = entry.value.airport.clone() else {
                        continue;
                    };
                    let measurement = AirportMeasurement {
                        airport,
                        timestamp: entry.timestamp,
                        value: aggregate.measure(&self.enricher, &entry.value),
                    };
                    StreamElement::timestamped_record(measurement, entry.timestamp)
                }
                StreamElement::Watermark(watermark) => match aligner.advance(channel, watermark) {
                    Some(aligned) => {
                        trace!(
                            stage = aggregate.name(),
                            watermark = aligned.timestamp,
                            "aligned watermark advanced"
                        );
                        StreamElement::Watermark(aligned)
                    }
                    None => continue,
                },
                StreamElement::End => StreamElement::End,
            };

            for output in operator.process(element)? {
                match output {
                    StreamElement::Record(record) => {
                        counts.entries += 1;
                        sink.emit(aggregate.output(record.value))?;
                    }
                    StreamElement::Watermark(_) => {}
                    StreamElement::End => break 'stream,
                }
            }
        }

        counts.late = operator.late_events();
        if counts.late > 0 {
            info!(stage = aggregate.name(), late = counts.late, "dropped late records");
        }
        debug!(
            stage = aggregate.name(),
            entries = counts.entries,
            windows = operator.closed_window_count(),
            inputs = aligner.num_channels(),
            aligned_watermark = aligner.current_min_timestamp(),
            "airport stage finished"
        );
        Ok(counts)
    }
}

#[cfg(test)]
#[path = "tests/pipeline_tests.rs"]
mod tests;
