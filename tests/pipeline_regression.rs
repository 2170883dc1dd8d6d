//! Pipeline Regression Tests
//!
//! Drives snapshots through the EventDetector and BroadcastService together
//! and asserts on the resulting broadcasts: scenario replays, listener
//! isolation, history bounds and dedup behaviour across a storm day.

use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use heliocast::broadcast::BroadcastService;
use heliocast::config::{BroadcastConfig, BroadcastConfigUpdate, DetectorConfig};
use heliocast::detector::EventDetector;
use heliocast::pipeline::{JsonLinesSource, ProcessingLoop, ReplaySource};
use heliocast::types::{
    BroadcastPriority, BroadcastTone, BroadcastType, EventSeverity, EventType, FlareRecord,
    Snapshot,
};
use tokio_util::sync::CancellationToken;

fn ts(s: &str) -> DateTime<Utc> {
    s.parse().unwrap()
}

fn flare(id: &str, class_type: &str, magnitude: Option<f64>) -> FlareRecord {
    FlareRecord {
        id: id.to_string(),
        class_type: class_type.to_string(),
        magnitude,
        begin_time: None,
        peak_time: None,
        source_region: None,
    }
}

fn reading(at: DateTime<Utc>, kp: Option<f64>, speed: Option<f64>, flares: Vec<FlareRecord>) -> Snapshot {
    let mut s = Snapshot::at(at);
    s.geomagnetic.kp_index = kp;
    s.solar_wind.speed = speed;
    s.flares = flares;
    s
}

/// Run every snapshot through detector → service, returning all events.
fn run(detector: &mut EventDetector, service: &BroadcastService, snapshots: &[Snapshot]) -> usize {
    let mut total = 0;
    for snapshot in snapshots {
        for event in detector.analyze(snapshot) {
            service.broadcast_event(&event);
            total += 1;
        }
    }
    total
}

#[test]
fn test_extreme_snapshot_produces_four_events_and_critical_compound() {
    let mut detector = EventDetector::new(DetectorConfig::default());
    let service = BroadcastService::new(BroadcastConfig::default());

    let snapshot = reading(
        ts("2024-05-10T17:00:00Z"),
        Some(8.6),
        Some(950.0),
        vec![flare("f1", "X", Some(2.1))],
    );
    let events = detector.analyze(&snapshot);

    let kinds: Vec<EventType> = events.iter().map(|e| e.event_type).collect();
    assert_eq!(
        kinds,
        vec![
            EventType::MajorFlare,
            EventType::SevereStorm,
            EventType::ExtremeSolarWind,
            EventType::CompoundEvent,
        ]
    );
    assert_eq!(events[0].severity, EventSeverity::Severe);
    assert_eq!(events[1].severity, EventSeverity::Extreme);
    assert_eq!(events[2].severity, EventSeverity::Extreme);
    assert_eq!(events[3].severity, EventSeverity::Extreme);
    assert_eq!(events[3].sub_events.len(), 3);

    let compound = events
        .iter()
        .map(|e| service.broadcast_event(e))
        .last()
        .unwrap();
    assert_eq!(compound.priority, BroadcastPriority::Critical);
    assert_eq!(compound.ttl, 20_000);
    assert_eq!(compound.tone, BroadcastTone::Danger);
    assert_eq!(
        service.get_current_broadcast().unwrap().id,
        compound.id,
        "the last admitted event is current"
    );
    assert_eq!(service.get_history(None).len(), 4);
}

#[test]
fn test_storm_day_is_not_rebroadcast_every_poll() {
    let mut detector = EventDetector::new(DetectorConfig::default());
    let service = BroadcastService::new(BroadcastConfig::default());

    // Kp climbs through the tiers and stays high for an hour of polls
    let start = ts("2024-05-10T12:00:00Z");
    let kps = [4.0, 5.3, 5.7, 7.3, 7.0, 8.7, 8.7, 9.0, 6.0];
    let snapshots: Vec<Snapshot> = kps
        .iter()
        .enumerate()
        .map(|(i, kp)| reading(start + Duration::minutes(i as i64 * 10), Some(*kp), None, vec![]))
        .collect();

    let emitted = run(&mut detector, &service, &snapshots);
    assert_eq!(emitted, 3, "one event per storm tier per day");

    let severities: Vec<EventSeverity> = service
        .get_recent_by_type(BroadcastType::Event, 10)
        .into_iter()
        .rev()
        .map(|m| m.event.unwrap().severity)
        .collect();
    assert_eq!(
        severities,
        vec![EventSeverity::High, EventSeverity::Severe, EventSeverity::Extreme]
    );

    // Next UTC day the same tier fires again
    let next_day = reading(ts("2024-05-11T00:30:00Z"), Some(7.5), None, vec![]);
    assert_eq!(run(&mut detector, &service, &[next_day]), 1);
}

#[test]
fn test_flare_list_repeats_are_deduplicated() {
    let mut detector = EventDetector::new(DetectorConfig::default());
    let service = BroadcastService::new(BroadcastConfig::default());
    let start = ts("2024-05-10T00:00:00Z");

    // Upstream keeps reporting the last few flares on every poll
    let polls = vec![
        reading(start, None, None, vec![flare("a", "M", Some(1.2))]),
        reading(
            start + Duration::minutes(15),
            None,
            None,
            vec![flare("a", "M", Some(1.2)), flare("b", "C", Some(3.0))],
        ),
        reading(
            start + Duration::minutes(30),
            None,
            None,
            vec![flare("a", "M", Some(1.2)), flare("c", "X", Some(6.4))],
        ),
    ];

    assert_eq!(run(&mut detector, &service, &polls), 2, "C-class is ignored by default");
    let history = service.get_history(None);
    assert_eq!(history[0].broadcast.priority, BroadcastPriority::Critical);
    assert_eq!(history[1].broadcast.priority, BroadcastPriority::High);
}

#[test]
fn test_system_message_defaults() {
    let service = BroadcastService::new(BroadcastConfig::default());
    let msg = service.broadcast_system("T", "C", None);
    assert_eq!(msg.priority, BroadcastPriority::Low);
    assert_eq!(msg.tone, BroadcastTone::Neutral);
    assert_eq!(msg.ttl, 8_000);
    assert_eq!(msg.broadcast_type, BroadcastType::System);
}

#[test]
fn test_history_keeps_fifty_most_recent() {
    let service = BroadcastService::new(BroadcastConfig::default());
    let ids: Vec<String> = (0..51)
        .map(|i| service.broadcast_system(format!("msg {i}"), "c", None).id)
        .collect();

    let history = service.get_history(None);
    assert_eq!(history.len(), 50);
    assert_eq!(history[0].broadcast.id, ids[50]);
    assert_eq!(history[49].broadcast.id, ids[1]);
    assert!(history.iter().all(|e| e.broadcast.id != ids[0]));
    assert!(history.windows(2).all(|w| w[0].received_at >= w[1].received_at));
}

#[test]
fn test_failing_listeners_do_not_block_delivery() {
    let service = BroadcastService::new(BroadcastConfig::default());
    let delivered = Arc::new(AtomicUsize::new(0));

    let _erroring = service.subscribe(|_| Err(anyhow::anyhow!("speech engine offline")));
    let _panicking = service.subscribe(|_| panic!("listener bug"));
    let counter = delivered.clone();
    let _counting = service.subscribe(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    service.broadcast_alert("Storm", "Shelter", None);
    service.broadcast_system("T", "C", None);

    assert_eq!(delivered.load(Ordering::SeqCst), 2);
    assert_eq!(service.get_history(None).len(), 2);
    assert_eq!(service.subscriber_count(), 3);
}

#[test]
fn test_unsubscribe_stops_delivery() {
    let service = BroadcastService::new(BroadcastConfig::default());
    let delivered = Arc::new(AtomicUsize::new(0));
    let counter = delivered.clone();
    let sub = service.subscribe(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    service.broadcast_system("one", "c", None);
    assert!(sub.unsubscribe());
    service.broadcast_system("two", "c", None);

    assert_eq!(delivered.load(Ordering::SeqCst), 1);
    assert_eq!(service.subscriber_count(), 0);
}

#[test]
fn test_admission_filters_reject_without_side_effects() {
    let service = BroadcastService::new(BroadcastConfig::default());
    service.update_config(BroadcastConfigUpdate {
        min_display_priority: Some(BroadcastPriority::High),
        ..Default::default()
    });

    let dropped = service.broadcast_system("low", "c", None);
    assert_eq!(dropped.priority, BroadcastPriority::Low, "message is still returned");
    assert!(service.get_history(None).is_empty());

    service.broadcast_alert("high", "c", None);
    let stats = service.get_stats();
    assert_eq!(stats.total_broadcasts, 1);
    assert_eq!(stats.rejected, 1);
}

#[test]
fn test_suppressed_constituents_emit_only_compound() {
    let mut detector = EventDetector::new(DetectorConfig {
        suppress_compound_constituents: true,
        ..DetectorConfig::default()
    });
    let service = BroadcastService::new(BroadcastConfig::default());

    let snapshot = reading(ts("2024-05-10T17:00:00Z"), Some(6.0), Some(650.0), vec![]);
    assert_eq!(run(&mut detector, &service, &[snapshot]), 1);

    let current = service.get_current_broadcast().unwrap();
    let event = current.event.unwrap();
    assert_eq!(event.event_type, EventType::CompoundEvent);
    assert_eq!(event.sub_events.len(), 2);
}

#[tokio::test]
async fn test_replay_file_through_processing_loop() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    let recording = serde_json::json!([
        {
            "timestamp": "2024-05-10T16:00:00Z",
            "solarWind": { "speed": 420.0 },
            "geomagnetic": { "kp_index": 3.0 },
            "flares": []
        },
        {
            "timestamp": "2024-05-10T17:00:00Z",
            "solarWind": { "speed": 950.0 },
            "geomagnetic": { "kp_index": 8.6 },
            "flares": [{ "id": "f1", "classType": "X2.1" }]
        }
    ]);
    write!(file, "{recording}").unwrap();

    let service = BroadcastService::new(BroadcastConfig::default());
    let processing = ProcessingLoop::new(
        EventDetector::new(DetectorConfig::default()),
        service.clone(),
        CancellationToken::new(),
    )
    .with_weather_updates(true);

    let mut source = ReplaySource::from_file(file.path(), 0).unwrap();
    let stats = processing.run(&mut source).await;

    assert_eq!(stats.snapshots_processed, 2);
    assert_eq!(stats.events_detected, 4);
    assert_eq!(stats.compound_events, 1);
    assert_eq!(stats.weather_updates, 2);

    let weather = service.get_recent_by_type(BroadcastType::WeatherUpdate, 5);
    assert_eq!(weather.len(), 2);
    assert_eq!(weather[0].tone, BroadcastTone::Danger);
    assert_eq!(weather[1].tone, BroadcastTone::Neutral);

    let current = service.get_current_broadcast().unwrap();
    assert_eq!(current.event.unwrap().event_type, EventType::CompoundEvent);
}

#[tokio::test]
async fn test_bad_input_lines_do_not_stop_the_pipeline() {
    let mut input = Vec::new();
    input.extend_from_slice(b"{\"timestamp\":\"2024-05-10T16:00:00Z\",\"solarWind\":{\"speed\":420}}\n");
    input.extend_from_slice(b"\xff\xfe garbage\n");
    input.extend_from_slice(b"not json at all\n");
    // kp is unreadable, but the wind reading must still raise its event
    input.extend_from_slice(
        b"{\"timestamp\":\"2024-05-10T17:00:00Z\",\"solarWind\":{\"speed\":950},\"geomagnetic\":{\"kp_index\":\"n/a\"},\"flares\":[{\"id\":7}]}\n",
    );

    let service = BroadcastService::new(BroadcastConfig::default());
    let processing = ProcessingLoop::new(
        EventDetector::new(DetectorConfig::default()),
        service.clone(),
        CancellationToken::new(),
    )
    .with_weather_updates(false);

    let mut source = JsonLinesSource::new(std::io::Cursor::new(input), "stdin");
    let stats = processing.run(&mut source).await;

    assert_eq!(stats.snapshots_processed, 2);
    assert_eq!(stats.events_detected, 1);
    let current = service.get_current_broadcast().unwrap();
    assert_eq!(current.event.unwrap().event_type, EventType::ExtremeSolarWind);
}
