//! # Flightwatch telemetry
//!
//! Airport telemetry over a stream of aircraft position reports: vertical
//! trend per aircraft, then maximum noise and total CO2 per airport, all
//! over sliding event-time windows and shipped to a Graphite-compatible
//! metrics store.
//!
//! - [`source`]: position reports from newline-delimited JSON
//! - [`enrichment`] and [`reference`]: airport geofences, noise and CO2 tables
//! - [`classifier`]: least-squares altitude trend of a window
//! - [`pipeline`]: [`TelemetryPipeline`](pipeline::TelemetryPipeline), the
//!   thread-per-stage job
//! - [`metric`]: results to metric triples
//! - [`config`]: layered settings
//!
//! ```rust,no_run
//! use flightwatch_telemetry::config::Settings;
//! use flightwatch_telemetry::pipeline::TelemetryPipeline;
//! use flightwatch_telemetry::source::JsonLinesSource;
//! use flightwatch_core::network::MetricsSink;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let settings = Settings::load(None)?;
//! let (sink, writer) = MetricsSink::spawn(settings.sink.to_sink_config());
//! let pipeline = TelemetryPipeline::new(settings.pipeline.clone(), &settings.reference)?;
//! let report = tokio::task::spawn_blocking(move || {
//!     let input = JsonLinesSource::new(std::io::BufReader::new(std::io::stdin()));
//!     pipeline.run(input, sink)
//! })
//! .await??;
//! let stats = writer.await?;
//! println!("{} records, {} metrics sent", report.records_read, stats.sent);
//! # Ok(())
//! # }
//! ```

pub mod aircraft;
pub mod classifier;
pub mod config;
pub mod enrichment;
pub mod metric;
pub mod pipeline;
pub mod reference;
pub mod source;

pub use flightwatch_core;
