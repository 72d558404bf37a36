use std::sync::Mutex;

use anyhow::Result;
use flightwatch_core::network::TimestampedMetric;
use flightwatch_telemetry::aircraft::{PositionReport, WakeTurbulenceCategory};
use flightwatch_telemetry::config::PipelineSettings;
use flightwatch_telemetry::metric::MetricEmitter;
use flightwatch_telemetry::pipeline::{PipelineReport, TelemetryPipeline};
use flightwatch_telemetry::reference::ReferenceData;
use flightwatch_telemetry::source::JsonLinesSource;

#[derive(Default)]
struct Collect(Mutex<Vec<TimestampedMetric>>);

impl MetricEmitter for &Collect {
    fn emit_metric(&self, metric: TimestampedMetric) -> Result<()> {
        self.0.lock().unwrap().push(metric);
        Ok(())
    }
}

impl Collect {
    fn sorted(&self) -> Vec<TimestampedMetric> {
        let mut metrics = self.0.lock().unwrap().clone();
        metrics.sort_by(|a, b| {
            (a.name.as_str(), a.timestamp)
                .cmp(&(b.name.as_str(), b.timestamp))
                .then(a.value.total_cmp(&b.value))
        });
        metrics
    }
}

fn run(settings: PipelineSettings, input: Vec<PositionReport>) -> (PipelineReport, Vec<TimestampedMetric>) {
    let pipeline = TelemetryPipeline::new(settings, &ReferenceData::default()).unwrap();
    let collect = Collect::default();
    let report = pipeline.run(input, &collect).unwrap();
    (report, collect.sorted())
}

fn report_at(id: i64, pos_time: i64, (lat, lon): (f64, f64), alt: i64, wtc: u8, kind: &str) -> PositionReport {
    PositionReport {
        id,
        pos_time,
        lat,
        lon,
        alt,
        gnd: false,
        wtc: WakeTurbulenceCategory::from(wtc),
        aircraft_type: kind.to_string(),
    }
}

const LONDON: (f64, f64) = (51.47, -0.45);
const NEW_YORK: (f64, f64) = (40.64, -73.78);
const TOKYO: (f64, f64) = (35.77, 140.39);
const NOWHERE: (f64, f64) = (0.0, -30.0);

fn metric(name: &str, timestamp: i64, value: f64) -> TimestampedMetric {
    TimestampedMetric::new(name, timestamp, value)
}

#[test]
fn test_ascending_aircraft_end_to_end() {
    let input = vec![
        report_at(42, 0, LONDON, 1_000, 2, "A320"),
        report_at(42, 30_000, LONDON, 1_500, 2, "A320"),
        report_at(42, 60_000, LONDON, 2_000, 2, "A320"),
    ];
    let (report, metrics) = run(PipelineSettings::default(), input);

    assert_eq!(report.classified, 4);
    assert_eq!(report.late_events(), 0);
    assert_eq!(
        metrics,
        vec![
            metric("London.ASCENDING", 30, 1.0),
            metric("London.ASCENDING", 60, 1.0),
            metric("London.UNKNOWN", 0, 1.0),
            metric("London.UNKNOWN", 60, 1.0),
            metric("London_AVG_NOISE", 60, 0.0),
            metric("London_AVG_NOISE", 90, 84.0),
            metric("London_AVG_NOISE", 120, 84.0),
            metric("London_AVG_NOISE", 150, 82.0),
            metric("London_AVG_NOISE", 180, 0.0),
            metric("London_C02_EMISSION", 60, 2440.0),
            metric("London_C02_EMISSION", 90, 4880.0),
            metric("London_C02_EMISSION", 120, 4880.0),
            metric("London_C02_EMISSION", 150, 4880.0),
            metric("London_C02_EMISSION", 180, 2440.0),
        ]
    );
}

#[test]
fn test_airport_names_with_spaces_use_underscores() {
    let input = vec![
        report_at(1, 0, NEW_YORK, 2_500, 3, "B744"),
        report_at(1, 10_000, NEW_YORK, 2_000, 3, "B744"),
    ];
    let (_, metrics) = run(PipelineSettings::default(), input);

    assert!(metrics.contains(&metric("New_York.DESCENDING", 10, 1.0)));
    // Heavy and descending at 2000 ft.
    assert!(metrics.contains(&metric("New_York_AVG_NOISE", 60, 85.0)));
    assert!(metrics.contains(&metric("New_York_C02_EMISSION", 60, 10_406.0)));
    assert!(metrics.contains(&metric("New_York_C02_EMISSION", 90, 20_812.0)));
    assert!(metrics.iter().all(|m| !m.name.contains(' ')));
}

#[test]
fn test_aircraft_away_from_airports_produce_nothing() {
    let input = vec![
        report_at(5, 0, NOWHERE, 1_000, 2, "A320"),
        report_at(5, 30_000, NOWHERE, 1_200, 2, "A320"),
    ];
    let (report, metrics) = run(PipelineSettings::default(), input);

    assert_eq!(report.records_read, 2);
    assert_eq!(report.records_filtered, 2);
    assert_eq!(report.classified, 0);
    assert!(metrics.is_empty());
}

#[test]
fn test_late_report_is_dropped() {
    let input = vec![
        report_at(42, 0, LONDON, 1_000, 2, "A320"),
        report_at(42, 120_000, LONDON, 1_500, 2, "A320"),
        // Every window of t=0 closed once the watermark reached 105000.
        report_at(7, 0, TOKYO, 1_000, 2, "A320"),
    ];
    let (report, metrics) = run(PipelineSettings::default(), input);

    assert_eq!(report.late_classification, 1);
    assert!(metrics.iter().all(|m| !m.name.starts_with("Tokyo")));
}

#[test]
fn test_filtered_reports_advance_the_watermark() {
    let input = vec![
        report_at(42, 0, LONDON, 1_000, 2, "A320"),
        // Cruising far from any airport: filtered, but moves the watermark to 185000.
        report_at(9, 200_000, NOWHERE, 35_000, 3, "B77W"),
        report_at(42, 10_000, LONDON, 1_200, 2, "A320"),
    ];
    let (report, metrics) = run(PipelineSettings::default(), input);

    assert_eq!(report.records_filtered, 1);
    assert_eq!(report.late_classification, 1);
    assert_eq!(report.classified, 2);
    assert!(metrics.contains(&metric("London.UNKNOWN", 0, 1.0)));
    assert!(metrics.iter().all(|m| m.name != "London.ASCENDING"));
}

#[test]
fn test_json_lines_input() {
    let lines = [
        r#"{"acList":[{"Id":42,"PosTime":0,"Lat":51.47,"Long":-0.45,"Alt":1000,"WTC":2,"Type":"A320"}]}"#,
        "garbage",
        r#"{"Id":42,"PosTime":30000,"Lat":51.47,"Long":-0.45,"Alt":1500,"WTC":2,"Type":"A320"}"#,
        r#"{"Id":42,"PosTime":60000,"Lat":51.47,"Long":-0.45,"Alt":2000,"WTC":2,"Type":"A320"}"#,
    ]
    .join("\n");
    let source = JsonLinesSource::new(lines.as_bytes());
    let pipeline =
        TelemetryPipeline::new(PipelineSettings::default(), &ReferenceData::default()).unwrap();
    let collect = Collect::default();

    let report = pipeline.run(source, &collect).unwrap();
    assert_eq!(report.records_read, 3);
    assert_eq!(report.metrics_emitted, 14);
    assert!(collect.sorted().contains(&metric("London.ASCENDING", 30, 1.0)));
}

fn lcg_next(state: &mut u64) -> u64 {
    *state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
    *state
}

/// Reports from `aircraft` aircraft around three airports, roughly in time
/// order with jitter inside the out-of-orderness bound.
fn gen_reports(seed: u64, n: usize, aircraft: i64) -> Vec<PositionReport> {
    let airports = [LONDON, NEW_YORK, TOKYO];
    let kinds = ["A320", "B738", "B77W", "UNKNOWN"];
    let mut state = seed;
    let mut out = Vec::with_capacity(n);
    for i in 0..n {
        let id = (lcg_next(&mut state) % aircraft as u64) as i64;
        let jitter = (lcg_next(&mut state) % 10_000) as i64;
        let pos_time = i as i64 * 2_000 + jitter;
        let alt = 200 + (lcg_next(&mut state) % 2_700) as i64;
        out.push(report_at(
            id,
            pos_time,
            airports[id as usize % airports.len()],
            alt,
            (id % 4) as u8,
            kinds[id as usize % kinds.len()],
        ));
    }
    out
}

#[test]
fn test_results_do_not_depend_on_parallelism() {
    let input = gen_reports(7, 600, 12);

    let (serial_report, serial) = run(
        PipelineSettings {
            parallelism: 1,
            ..PipelineSettings::default()
        },
        input.clone(),
    );
    let (parallel_report, parallel) = run(
        PipelineSettings {
            parallelism: 4,
            channel_capacity: 16,
            ..PipelineSettings::default()
        },
        input,
    );

    assert_eq!(serial_report.late_events(), 0);
    assert_eq!(serial_report, parallel_report);
    assert!(!serial.is_empty());
    assert_eq!(serial, parallel);
}
