use super::*;
use crate::network::frame::read_frame;
use crate::network::pickle::decode_metrics;
use tokio::net::TcpListener;

fn config_for(address: String) -> MetricsSinkConfig {
    MetricsSinkConfig {
        address,
        queue_capacity: 8,
        initial_backoff: Duration::from_millis(20),
        max_backoff: Duration::from_millis(200),
        connect_timeout: Duration::from_secs(1),
        ..MetricsSinkConfig::default()
    }
}

/// An address nothing listens on.
async fn closed_address() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr.to_string()
}

async fn read_metric(stream: &mut TcpStream) -> TimestampedMetric {
    let payload = timeout(Duration::from_secs(5), read_frame(stream))
        .await
        .unwrap()
        .unwrap();
    let mut metrics = decode_metrics(&payload).unwrap();
    assert_eq!(metrics.len(), 1, "one metric per frame");
    metrics.remove(0)
}

#[tokio::test]
async fn test_sink_delivers_one_frame_per_metric() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (sink, handle) = MetricsSink::spawn(config_for(addr.to_string()));

    let metrics = vec![
        TimestampedMetric::new("London.ASCENDING", 1_700_000_000, 1.0),
        TimestampedMetric::new("London_AVG_NOISE", 1_700_000_060, 72.5),
        TimestampedMetric::new("London_C02_EMISSION", 1_700_000_060, 2440.0),
    ];
    for metric in &metrics {
        sink.emit(metric.clone()).await.unwrap();
    }

    let (mut stream, _) = listener.accept().await.unwrap();
    for expected in &metrics {
        assert_eq!(&read_metric(&mut stream).await, expected);
    }

    drop(sink);
    let stats = handle.await.unwrap();
    assert_eq!(stats.sent, 3);
    assert_eq!(stats.dropped, 0);
}

#[tokio::test]
async fn test_sink_buffers_until_receiver_comes_up() {
    let address = closed_address().await;
    let (sink, handle) = MetricsSink::spawn(config_for(address.clone()));

    sink.emit(TimestampedMetric::new("Tokyo.CRUISE", 1_700_000_000, 1.0))
        .await
        .unwrap();
    sleep(Duration::from_millis(50)).await;

    let listener = TcpListener::bind(address.as_str()).await.unwrap();
    let (mut stream, _) = timeout(Duration::from_secs(5), listener.accept())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(read_metric(&mut stream).await.name, "Tokyo.CRUISE");

    drop(sink);
    let stats = handle.await.unwrap();
    assert_eq!(stats.sent, 1);
    assert!(stats.reconnects >= 1);
}

#[tokio::test]
async fn test_sink_drops_oldest_when_retry_buffer_overflows() {
    let config = MetricsSinkConfig {
        retry_buffer_capacity: 2,
        initial_backoff: Duration::from_secs(60),
        max_backoff: Duration::from_secs(60),
        shutdown_attempts: 1,
        ..config_for(closed_address().await)
    };
    let (sink, handle) = MetricsSink::spawn(config);

    for i in 0..5 {
        sink.emit(TimestampedMetric::new("Paris.ASCENDING", i, 1.0))
            .await
            .unwrap();
    }
    drop(sink);

    let stats = handle.await.unwrap();
    assert_eq!(stats.sent, 0);
    assert_eq!(stats.dropped, 5, "three overflowed, two unsent at shutdown");
}

#[tokio::test]
async fn test_blocking_emit_from_worker_thread() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (sink, handle) = MetricsSink::spawn(config_for(addr.to_string()));

    let producer = sink.clone();
    tokio::task::spawn_blocking(move || {
        producer
            .blocking_emit(TimestampedMetric::new("Atlanta.DESCENDING", 42, 1.0))
            .unwrap();
    })
    .await
    .unwrap();

    let (mut stream, _) = listener.accept().await.unwrap();
    assert_eq!(read_metric(&mut stream).await.timestamp, 42);

    drop(sink);
    assert_eq!(handle.await.unwrap().sent, 1);
}

#[tokio::test]
async fn test_emit_fails_once_writer_is_gone() {
    let (sink, handle) = MetricsSink::spawn(config_for(closed_address().await));
    handle.abort();
    let _ = handle.await;

    let err = sink
        .emit(TimestampedMetric::new("New_York.CRUISE", 1, 1.0))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("closed"));
}

#[tokio::test]
async fn test_stats_visible_from_handle() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (sink, handle) = MetricsSink::spawn(config_for(addr.to_string()));
    assert_eq!(sink.stats(), SinkStats::default());

    sink.emit(TimestampedMetric::new("Frankfurt.CRUISE", 7, 1.0))
        .await
        .unwrap();
    let (mut stream, _) = listener.accept().await.unwrap();
    read_metric(&mut stream).await;
    for _ in 0..100 {
        if sink.stats().sent == 1 {
            break;
        }
        sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(sink.stats().sent, 1);

    drop(sink);
    handle.await.unwrap();
}
