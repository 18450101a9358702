//! End-to-end tests: simulated transport through session, batcher and buffer actor.

use picova::adapters::SimulatedMeter;
use picova::config::AcquisitionSettings;
use picova::data::storage::{export_csv, CSV_HEADER};
use picova::data::{BufferState, FilterKind, WindowedBuffer};
use picova::measurement::{parse_record, Channel};
use picova::{BufferHandle, MeterSession};
use std::time::Duration;

fn settings(window: Duration) -> AcquisitionSettings {
    AcquisitionSettings {
        time_window: window,
        batch_interval: Duration::from_millis(20),
        ..Default::default()
    }
}

async fn wait_until_disconnected(session: &MeterSession) {
    let mut connected = session.connected();
    tokio::time::timeout(Duration::from_secs(10), connected.wait_for(|c| !*c))
        .await
        .expect("source should end")
        .expect("session alive");
}

#[tokio::test]
async fn test_simulated_stream_fills_and_evicts() {
    // 2000 samples, 1 ms apart, into a 500 ms window.
    let settings = AcquisitionSettings {
        filter: FilterKind::median(),
        ..settings(Duration::from_millis(500))
    };
    let (buffer, actor) = BufferHandle::spawn(WindowedBuffer::new());
    let mut session = MeterSession::new(buffer.clone(), settings);

    let meter = SimulatedMeter::new().with_seed(42).with_samples(2_000);
    session.connect(Box::new(meter)).await.unwrap();
    wait_until_disconnected(&session).await;
    session.disconnect().await.unwrap();

    let stats = session.stats().unwrap();
    assert_eq!(stats.records(), 2_000);
    assert_eq!(stats.rejected(), 0);

    let snapshot = buffer.snapshot().await.unwrap();
    assert_eq!(snapshot.state, BufferState::SteadyState);
    assert_eq!(snapshot.filter_kind, FilterKind::median());
    assert_eq!(snapshot.time_window, Duration::from_millis(500));
    let latest = snapshot.latest.unwrap();
    assert_eq!(latest.timestamp, 1_999_000);

    let records = buffer.records().await.unwrap();
    let min_t = latest.timestamp - 500_000;
    assert_eq!(records.first().unwrap().timestamp, min_t);
    assert_eq!(records.len(), 501);
    assert!(records.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
    for channel in Channel::ALL {
        assert_eq!(snapshot.series(channel).len(), records.len());
    }

    buffer.shutdown().await.unwrap();
    actor.await.unwrap();
}

#[tokio::test]
async fn test_corrupt_lines_are_skipped() {
    let (buffer, _actor) = BufferHandle::spawn(WindowedBuffer::new());
    let mut session = MeterSession::new(buffer.clone(), settings(Duration::from_secs(60)));

    let meter = SimulatedMeter::new()
        .with_seed(8)
        .with_samples(500)
        .with_corrupt_ratio(0.2);
    session.connect(Box::new(meter)).await.unwrap();
    wait_until_disconnected(&session).await;

    let stats = session.stats().unwrap();
    assert_eq!(stats.lines(), 500);
    assert!(stats.rejected() > 0);
    assert_eq!(stats.records() + stats.rejected(), 500);
    assert_eq!(buffer.records().await.unwrap().len() as u64, stats.records());
}

#[tokio::test]
async fn test_filter_change_while_streaming() {
    let window = Duration::from_secs(60);
    let (buffer, _actor) = BufferHandle::spawn(WindowedBuffer::new());
    let mut session = MeterSession::new(buffer.clone(), settings(window));

    let meter = SimulatedMeter::new().with_seed(13).with_samples(1_000).with_max_chunk(7);
    session.connect(Box::new(meter)).await.unwrap();
    buffer.set_filter(FilterKind::Median(5)).await.unwrap();
    wait_until_disconnected(&session).await;

    // Whatever was buffered when the filter changed was replayed, and every
    // later batch used the same filter, so the series equals a fresh replay.
    let records = buffer.records().await.unwrap();
    let mut reference = WindowedBuffer::with_settings(FilterKind::Median(5), window).unwrap();
    reference.add_measurements(&records);

    let snapshot = buffer.snapshot().await.unwrap();
    for channel in Channel::ALL {
        assert_eq!(snapshot.series(channel), reference.series(channel));
    }
}

#[tokio::test]
async fn test_export_after_disconnect() {
    let dir = tempfile::tempdir().unwrap();
    let (buffer, _actor) = BufferHandle::spawn(WindowedBuffer::new());
    let mut session = MeterSession::new(buffer.clone(), settings(Duration::from_secs(60)));

    session
        .connect(Box::new(SimulatedMeter::new().with_seed(21).with_samples(40)))
        .await
        .unwrap();
    wait_until_disconnected(&session).await;
    session.disconnect().await.unwrap();

    let records = buffer.records().await.unwrap();
    let path = export_csv(&records, &dir.path().join("exports")).unwrap();
    let name = path.file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.starts_with("picova_") && name.ends_with(".csv"));

    let text = std::fs::read_to_string(&path).unwrap();
    let mut lines = text.lines();
    assert_eq!(lines.next(), Some(CSV_HEADER.join(",").as_str()));
    let rows: Vec<_> = lines.map(|l| parse_record(l).unwrap()).collect();
    assert_eq!(rows.len(), 40);
    assert_eq!(rows[0].timestamp, records[0].timestamp);
    assert_eq!(rows[39].timestamp, records[39].timestamp);
}
