//! Event-time windowing: window assignment, accumulator kinds and the
//! keyed window aggregation operator.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Result, bail};
use tracing::{debug, trace};

use crate::time::{EVENT_TIME_MIN, TimerService};
use crate::types::{EventTime, StreamData, StreamElement, TimestampedEntry};

mod accumulators;
mod assigners;
mod operator;
mod primitives;

pub use accumulators::*;
pub use assigners::*;
pub use operator::*;
pub use primitives::*;

#[cfg(test)]
#[path = "tests/window_tests.rs"]
mod tests;

#[cfg(test)]
#[path = "tests/accumulator_tests.rs"]
mod accumulator_tests;

#[cfg(test)]
#[path = "tests/operator_tests.rs"]
mod operator_tests;
