//! Event time: watermark generation, multi-input alignment and timers.

use std::collections::{BTreeMap, BTreeSet};
use std::marker::PhantomData;
use std::time::Duration;

use crate::types::{EventTime, Watermark};

mod alignment;
mod timer_service;
mod watermark;

pub use alignment::*;
pub use timer_service::*;
pub use watermark::*;

#[cfg(test)]
#[path = "tests/time_tests.rs"]
mod tests;
