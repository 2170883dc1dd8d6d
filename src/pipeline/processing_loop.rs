//! Snapshot processing loop shared across all input modes.
//!
//! One cycle per snapshot: optional weather summary, detector pass, one
//! broadcast per detected event. The loop is the single serialized writer
//! for the detector; the broadcast service is shared with the HTTP API.

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::source::{SnapshotEvent, SnapshotSource};
use crate::broadcast::BroadcastService;
use crate::detector::EventDetector;
use crate::types::{Snapshot, SpaceWeatherEvent};

/// Counters returned when the loop ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub snapshots_processed: u64,
    pub events_detected: u64,
    pub compound_events: u64,
    pub weather_updates: u64,
}

/// Owns the detector and drives snapshots into the broadcast service.
pub struct ProcessingLoop {
    detector: EventDetector,
    service: BroadcastService,
    weather_updates: bool,
    cancel_token: CancellationToken,
    stats: PipelineStats,
}

impl ProcessingLoop {
    pub fn new(
        detector: EventDetector,
        service: BroadcastService,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            detector,
            service,
            weather_updates: true,
            cancel_token,
            stats: PipelineStats::default(),
        }
    }

    /// Publish a weather summary for every snapshot (default on).
    pub fn with_weather_updates(mut self, enabled: bool) -> Self {
        self.weather_updates = enabled;
        self
    }

    pub fn detector(&self) -> &EventDetector {
        &self.detector
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats
    }

    /// Run one cycle. The weather summary goes first so that the last
    /// dispatched (and therefore current) message is the most relevant event.
    pub fn process(&mut self, snapshot: &Snapshot) -> Vec<SpaceWeatherEvent> {
        self.stats.snapshots_processed += 1;

        if self.weather_updates {
            self.service.broadcast_weather_update(snapshot);
            self.stats.weather_updates += 1;
        }

        let events = self.detector.analyze(snapshot);
        for event in &events {
            self.service.broadcast_event(event);
            if event.is_compound() {
                self.stats.compound_events += 1;
            }
        }
        self.stats.events_detected += events.len() as u64;
        events
    }

    /// Run until the source is exhausted or cancellation.
    ///
    /// Returns final pipeline statistics.
    pub async fn run<S: SnapshotSource + ?Sized>(mut self, source: &mut S) -> PipelineStats {
        info!(source = source.source_name(), "Processing snapshots");

        loop {
            let event = tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    info!("[ProcessingLoop] Shutdown signal received");
                    break;
                }
                result = source.next_snapshot() => {
                    match result {
                        Ok(ev) => ev,
                        Err(e) => {
                            warn!(error = %e, "[ProcessingLoop] Source error");
                            break;
                        }
                    }
                }
            };

            let snapshot = match event {
                SnapshotEvent::Snapshot(s) => s,
                SnapshotEvent::Eof => {
                    info!(
                        snapshots = self.stats.snapshots_processed,
                        "[ProcessingLoop] Source reached end"
                    );
                    break;
                }
            };

            let events = self.process(&snapshot);
            if !events.is_empty() {
                info!(
                    timestamp = %snapshot.timestamp,
                    events = events.len(),
                    kp = snapshot.kp_index(),
                    speed = snapshot.wind_speed(),
                    "Space-weather events broadcast"
                );
            }
        }

        info!(
            snapshots = self.stats.snapshots_processed,
            events = self.stats.events_detected,
            compound = self.stats.compound_events,
            "[ProcessingLoop] Finished"
        );
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BroadcastConfig, DetectorConfig};
    use crate::pipeline::source::ReplaySource;
    use crate::types::{BroadcastType, EventType, FlareRecord};
    use chrono::{DateTime, Utc};

    fn storm_snapshot(at: &str) -> Snapshot {
        let t: DateTime<Utc> = at.parse().unwrap();
        let mut s = Snapshot::at(t);
        s.geomagnetic.kp_index = Some(8.6);
        s.solar_wind.speed = Some(950.0);
        s.flares.push(FlareRecord {
            id: "f1".to_string(),
            class_type: "X".to_string(),
            magnitude: Some(2.1),
            begin_time: None,
            peak_time: None,
            source_region: None,
        });
        s
    }

    fn pipeline(weather: bool) -> (ProcessingLoop, BroadcastService) {
        let service = BroadcastService::new(BroadcastConfig::default());
        let detector = EventDetector::new(DetectorConfig::default());
        let lp = ProcessingLoop::new(detector, service.clone(), CancellationToken::new())
            .with_weather_updates(weather);
        (lp, service)
    }

    #[test]
    fn test_process_broadcasts_each_event() {
        let (mut lp, service) = pipeline(true);
        let events = lp.process(&storm_snapshot("2024-05-10T17:00:00Z"));
        assert_eq!(events.len(), 4);

        let history = service.get_history(None);
        assert_eq!(history.len(), 5);
        assert_eq!(history[4].broadcast.broadcast_type, BroadcastType::WeatherUpdate);

        let current = service.get_current_broadcast().unwrap();
        let event = current.event.as_ref().unwrap();
        assert_eq!(event.event_type, EventType::CompoundEvent);
    }

    #[tokio::test]
    async fn test_run_until_eof() {
        let (lp, service) = pipeline(false);
        let mut source = ReplaySource::new(
            vec![
                storm_snapshot("2024-05-10T17:00:00Z"),
                storm_snapshot("2024-05-10T17:01:00Z"),
            ],
            0,
        );
        let stats = lp.run(&mut source).await;
        assert_eq!(stats.snapshots_processed, 2);
        assert_eq!(stats.events_detected, 4, "second snapshot is fully deduplicated");
        assert_eq!(stats.compound_events, 1);
        assert_eq!(stats.weather_updates, 0);
        assert_eq!(service.get_stats().total_broadcasts, 4);
    }

    #[tokio::test]
    async fn test_cancelled_loop_stops() {
        let service = BroadcastService::default();
        let token = CancellationToken::new();
        let lp = ProcessingLoop::new(EventDetector::new(DetectorConfig::default()), service, token.clone());
        token.cancel();
        let mut source = crate::pipeline::source::SyntheticSource::seeded(1, 10, Utc::now());
        let stats = lp.run(&mut source).await;
        assert!(stats.snapshots_processed <= 1);
    }
}
