use super::*;
use crate::types::StreamRecord;

#[derive(Debug, Clone, PartialEq)]
struct Reading {
    id: u64,
    airport: String,
    time: i64,
    emission: f64,
}

fn reading(id: u64, time: i64) -> Reading {
    Reading {
        id,
        airport: "London".to_string(),
        time,
        emission: 0.0,
    }
}

fn count_finish(_id: &u64, value: AggregateValue<Reading>) -> Option<usize> {
    value.into_list().map(|items| items.len())
}

type CountingOperator = WindowAggregateOperator<u64, Reading, usize, SlidingEventTimeWindows>;

fn counting_operator() -> CountingOperator {
    WindowAggregateOperator::new(
        |r: &Reading| r.id,
        |r: &Reading| r.time,
        SlidingEventTimeWindows::of(Duration::from_secs(60), Duration::from_secs(30)).unwrap(),
        AggregateKind::to_list(),
        count_finish,
    )
}

fn fold_reading(op: &mut CountingOperator, r: Reading) -> FoldOutcome {
    op.process_record(r.id, r.time, &r).unwrap()
}

fn ends<K, V>(entries: &[TimestampedEntry<K, V>]) -> Vec<EventTime> {
    entries.iter().map(|e| e.timestamp).collect()
}

#[test]
fn test_record_folds_into_two_windows() {
    let mut op = counting_operator();
    assert_eq!(fold_reading(&mut op, reading(42, 10_000)), FoldOutcome::Folded(2));
    assert_eq!(op.buffered_window_count(), 2);

    // Same key, one shared window and one new one.
    assert_eq!(fold_reading(&mut op, reading(42, 40_000)), FoldOutcome::Folded(2));
    assert_eq!(op.buffered_window_count(), 3);
}

#[test]
fn test_watermark_closes_windows_in_end_order() {
    let mut op = counting_operator();
    fold_reading(&mut op, reading(42, 10_000));
    fold_reading(&mut op, reading(42, 40_000));

    let out = op.try_close(75_000);
    assert_eq!(ends(&out), vec![30_000, 60_000]);
    assert_eq!(out[0].value, 1);
    assert_eq!(out[1].value, 2, "[0, 60000) holds both readings");
    assert!(out.iter().all(|e| e.key == 42));

    // [30000, 90000) stays open.
    assert_eq!(op.buffered_window_count(), 1);
    assert_eq!(op.closed_window_count(), 2);
}

#[test]
fn test_window_closes_exactly_at_end() {
    let mut op = counting_operator();
    fold_reading(&mut op, reading(1, 10_000));

    assert!(op.try_close(29_999).is_empty());
    assert_eq!(ends(&op.try_close(30_000)), vec![30_000]);
}

#[test]
fn test_close_is_idempotent() {
    let mut op = counting_operator();
    fold_reading(&mut op, reading(42, 10_000));

    assert_eq!(op.try_close(75_000).len(), 2);
    assert!(op.try_close(75_000).is_empty());
    assert!(op.try_close(80_000).is_empty());
    assert_eq!(op.buffered_window_count(), 0);
}

#[test]
fn test_stale_watermark_is_ignored() {
    let mut op = counting_operator();
    op.try_close(75_000);
    fold_reading(&mut op, reading(7, 80_000));

    assert!(op.try_close(10_000).is_empty());
    assert_eq!(op.current_watermark(), 75_000);
}

#[test]
fn test_late_record_is_dropped_and_counted() {
    let mut op = counting_operator();
    op.try_close(75_000);

    // [-30000, 30000) and [0, 60000) are both closed.
    assert_eq!(fold_reading(&mut op, reading(42, 20_000)), FoldOutcome::Late);
    assert_eq!(op.late_events(), 1);
    assert_eq!(op.buffered_window_count(), 0);

    // [0, 60000) is closed but [30000, 90000) is still open.
    assert_eq!(fold_reading(&mut op, reading(42, 50_000)), FoldOutcome::Folded(1));
    assert_eq!(op.late_events(), 1);
}

#[test]
fn test_fold_into_closed_window_is_refused() {
    let mut op = counting_operator();
    op.try_close(75_000);
    let r = reading(1, 10_000);

    assert!(!op.fold(&TimeWindow::new(0, 60_000), &r.id, &r).unwrap());
    assert!(op.fold(&TimeWindow::new(60_000, 120_000), &r.id, &r).unwrap());
    assert_eq!(op.buffered_window_count(), 1);
}

#[test]
fn test_allowed_lateness_delays_close() {
    let mut op = counting_operator().with_allowed_lateness(Duration::from_secs(5));
    fold_reading(&mut op, reading(1, 40_000));

    assert!(op.try_close(60_000).is_empty());
    // Still accepted: [0, 60000) closes at 65000.
    assert_eq!(fold_reading(&mut op, reading(1, 59_000)), FoldOutcome::Folded(2));

    let out = op.try_close(65_000);
    assert_eq!(ends(&out), vec![60_000]);
    assert_eq!(out[0].value, 2);
}

#[test]
fn test_per_key_results_ascend() {
    let mut op = counting_operator();
    for id in [3, 1, 2] {
        for time in [5_000, 35_000, 65_000] {
            fold_reading(&mut op, reading(id, time));
        }
    }

    let out = op.try_close(150_000);
    for id in [1, 2, 3] {
        let per_key: Vec<_> = out.iter().filter(|e| e.key == id).map(|e| e.timestamp).collect();
        assert_eq!(per_key, vec![30_000, 60_000, 90_000, 120_000]);
    }
}

#[test]
fn test_drain_flushes_everything() {
    let mut op = counting_operator();
    fold_reading(&mut op, reading(1, 10_000));
    fold_reading(&mut op, reading(2, 100_000));

    let out = op.drain();
    assert_eq!(out.len(), 4);
    assert_eq!(op.buffered_window_count(), 0);
    assert!(op.drain().is_empty());
}

#[test]
fn test_finish_can_drop_results() {
    fn only_pairs(_id: &u64, value: AggregateValue<Reading>) -> Option<usize> {
        value.into_list().map(|items| items.len()).filter(|n| *n >= 2)
    }

    let mut op = WindowAggregateOperator::new(
        |r: &Reading| r.id,
        |r: &Reading| r.time,
        SlidingEventTimeWindows::of(Duration::from_secs(60), Duration::from_secs(30)).unwrap(),
        AggregateKind::to_list(),
        only_pairs,
    );
    op.process_record(1, 10_000, &reading(1, 10_000)).unwrap();
    op.process_record(1, 40_000, &reading(1, 40_000)).unwrap();

    let out = op.try_close(75_000);
    assert_eq!(ends(&out), vec![60_000]);
    assert_eq!(op.closed_window_count(), 2);
}

#[test]
fn test_summing_by_airport() {
    fn total(_airport: &String, value: AggregateValue<Reading>) -> Option<f64> {
        value.into_sum()
    }

    let mut op = WindowAggregateOperator::new(
        |r: &Reading| r.airport.clone(),
        |r: &Reading| r.time,
        SlidingEventTimeWindows::of(Duration::from_secs(60), Duration::from_secs(30)).unwrap(),
        AggregateKind::summing(|r: &Reading| r.emission),
        total,
    );
    for (time, emission) in [(40_000, 12.5), (50_000, 7.5)] {
        let r = Reading {
            emission,
            ..reading(1, time)
        };
        op.process(StreamElement::timestamped_record(r, time)).unwrap();
    }

    let out = op.try_close(60_000);
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].key, "London");
    assert_eq!(out[0].value, 20.0);
    assert_eq!(out[0].timestamp, 60_000);
}

#[test]
fn test_process_emits_results_before_watermark() {
    let mut op = counting_operator();
    // No stream timestamp: the operator reads event time from the value.
    let untimed = StreamElement::Record(StreamRecord {
        value: reading(9, 10_000),
        timestamp: None,
    });
    assert!(op.process(untimed).unwrap().is_empty());

    let out = op.process(StreamElement::watermark(30_000)).unwrap();
    assert_eq!(
        out,
        vec![
            StreamElement::timestamped_record(TimestampedEntry::new(30_000, 9, 1), 30_000),
            StreamElement::watermark(30_000),
        ]
    );

    let out = op.process(StreamElement::End).unwrap();
    assert_eq!(
        out,
        vec![
            StreamElement::timestamped_record(TimestampedEntry::new(60_000, 9, 1), 60_000),
            StreamElement::End,
        ]
    );
}

#[test]
fn test_record_timestamp_takes_precedence() {
    let mut op = counting_operator();
    // The record says 100000 even though the payload says 10000.
    op.process(StreamElement::timestamped_record(reading(5, 10_000), 100_000))
        .unwrap();
    assert!(op.try_close(75_000).is_empty());
    assert_eq!(op.buffered_window_count(), 2);
}
