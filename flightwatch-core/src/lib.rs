//! # Flightwatch Core
//!
//! Event-time streaming building blocks used by the flight telemetry job.
//!
//! - [`types`]: stream elements ([`StreamElement`](types::StreamElement),
//!   [`Watermark`](types::Watermark)) and keyed window results
//!   ([`TimestampedEntry`](types::TimestampedEntry)).
//! - [`time`]: bounded out-of-orderness watermarks, multi-input alignment
//!   and event-time timers.
//! - [`window`]: sliding window assignment, accumulators and the keyed
//!   window aggregation operator.
//! - [`network`]: bounded channels and gates between stages, length-prefixed
//!   framing, Graphite pickle encoding and the metrics sink.
//! - [`runtime`]: key partitioning across parallel workers.

pub mod network;
pub mod runtime;
pub mod time;
pub mod types;
pub mod window;
