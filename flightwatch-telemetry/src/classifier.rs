//! Vertical trend classification of one aircraft's window of positions.

use flightwatch_core::types::EventTime;
use flightwatch_core::window::{AggregateKind, AggregateValue, LinearTrendAccumulator};

use crate::aircraft::{ClassifiedAircraft, VerticalDirection};

/// Least-squares slope of altitude over time and the direction it implies.
///
/// Fewer than two distinct sample times give a `NaN` slope and
/// [`VerticalDirection::Unknown`].
pub fn classify(samples: &[(EventTime, i64)]) -> (f64, VerticalDirection) {
    let mut trend = LinearTrendAccumulator::new();
    for &(time, altitude) in samples {
        trend.accumulate(time, altitude);
    }
    let slope = trend.slope();
    (slope, VerticalDirection::from_slope(slope))
}

/// Window aggregation of the classification pass: all positions of the
/// window paired with the streaming altitude trend.
pub fn trend_aggregate() -> AggregateKind<ClassifiedAircraft> {
    AggregateKind::all_of(
        AggregateKind::to_list(),
        AggregateKind::linear_trend(
            |a: &ClassifiedAircraft| a.pos_time(),
            |a: &ClassifiedAircraft| a.report.alt,
        ),
    )
}

/// The latest position of the window, tagged with the direction of `slope`.
///
/// Ties on event time resolve to the later arrival. Returns `None` for an
/// empty window.
pub fn assign_vertical_direction(
    samples: Vec<ClassifiedAircraft>,
    slope: f64,
) -> Option<ClassifiedAircraft> {
    samples
        .into_iter()
        .max_by_key(|a| a.pos_time())
        .map(|last| last.with_direction(VerticalDirection::from_slope(slope)))
}

/// Finish function of the classification pass.
pub fn finish_classification(
    _id: &i64,
    value: AggregateValue<ClassifiedAircraft>,
) -> Option<ClassifiedAircraft> {
    let (samples, slope) = value.into_pair()?;
    assign_vertical_direction(samples.into_list()?, slope.into_slope()?)
}

#[cfg(test)]
#[path = "tests/classifier_tests.rs"]
mod tests;
