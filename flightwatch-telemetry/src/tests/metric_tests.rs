use super::*;
use crate::aircraft::{PositionReport, VerticalDirection, WakeTurbulenceCategory};
use std::sync::Mutex;

#[derive(Default)]
struct Collect(Mutex<Vec<TimestampedMetric>>);

impl MetricEmitter for &Collect {
    fn emit_metric(&self, metric: TimestampedMetric) -> Result<()> {
        self.0.lock().unwrap().push(metric);
        Ok(())
    }
}

fn position(airport: Option<&str>, direction: VerticalDirection) -> TelemetryOutput {
    let report = PositionReport {
        id: 42,
        pos_time: 1_700_000_055_500,
        lat: 40.64,
        lon: -73.78,
        alt: 1_500,
        gnd: false,
        wtc: WakeTurbulenceCategory::Medium,
        aircraft_type: "A320".to_string(),
    };
    let aircraft = ClassifiedAircraft::located(report, airport.map(str::to_string))
        .with_direction(direction);
    TelemetryOutput::Position(TimestampedEntry::new(1_700_000_060_000, 42, aircraft))
}

#[test]
fn test_position_metric() {
    let metric = position(Some("New York"), VerticalDirection::Ascending)
        .to_metric()
        .unwrap();
    assert_eq!(metric.name, "New_York.ASCENDING");
    assert_eq!(metric.timestamp, 1_700_000_055);
    assert_eq!(metric.value, 1.0);
}

#[test]
fn test_position_without_airport_has_no_metric() {
    assert_eq!(position(None, VerticalDirection::Cruise).to_metric(), None);
}

#[test]
fn test_airport_metrics_use_key_and_window_end() {
    let noise = TelemetryOutput::Noise(TimestampedEntry::new(
        1_700_000_060_000,
        "New York_AVG_NOISE".to_string(),
        91.0,
    ));
    assert_eq!(
        noise.to_metric(),
        Some(TimestampedMetric::new("New_York_AVG_NOISE", 1_700_000_060, 91.0))
    );

    let co2 = TelemetryOutput::Co2(TimestampedEntry::new(
        120_000,
        "London_C02_EMISSION".to_string(),
        20.0,
    ));
    assert_eq!(
        co2.to_metric(),
        Some(TimestampedMetric::new("London_C02_EMISSION", 120, 20.0))
    );
}

#[test]
fn test_metric_times_before_epoch_round_down() {
    let co2 = TelemetryOutput::Co2(TimestampedEntry::new(
        -1_500,
        "London_C02_EMISSION".to_string(),
        20.0,
    ));
    assert_eq!(co2.to_metric().unwrap().timestamp, -2);

    let report = PositionReport {
        id: 7,
        pos_time: -1,
        lat: 51.47,
        lon: -0.45,
        alt: 900,
        gnd: false,
        wtc: WakeTurbulenceCategory::Medium,
        aircraft_type: "A320".to_string(),
    };
    let aircraft = ClassifiedAircraft::located(report, Some("London".to_string()));
    let output = TelemetryOutput::Position(TimestampedEntry::new(0, 7, aircraft));
    assert_eq!(output.to_metric().unwrap().timestamp, -1);
}

#[test]
fn test_sink_counts_emitted_metrics() {
    let collect = Collect::default();
    let sink = TelemetrySink::new(&collect);
    assert!(sink.emit(position(Some("Paris"), VerticalDirection::Descending)).unwrap());
    assert!(!sink.emit(position(None, VerticalDirection::Descending)).unwrap());
    assert_eq!(sink.emitted(), 1);

    drop(sink);
    let collected = collect.0.into_inner().unwrap();
    assert_eq!(collected.len(), 1);
    assert_eq!(collected[0].name, "Paris.DESCENDING");
}

#[test]
fn test_sink_is_shared_across_threads() {
    let collect = Collect::default();
    let sink = TelemetrySink::new(&collect);
    std::thread::scope(|scope| {
        for _ in 0..3 {
            scope.spawn(|| {
                for _ in 0..100 {
                    sink.emit(position(Some("Tokyo"), VerticalDirection::Cruise))
                        .unwrap();
                }
            });
        }
    });
    assert_eq!(sink.emitted(), 300);
    assert_eq!(collect.0.lock().unwrap().len(), 300);
}
