//! Event Detector - snapshot classification
//!
//! Turns one telemetry snapshot into zero or more typed events.
//!
//! ## Rules (evaluated in this order, output keeps the order)
//! 1. **Flares**: each flare of a configured class not seen before becomes a
//!    `MAJOR_FLARE` (M → HIGH, X → SEVERE, X ≥ 5 → EXTREME). Dedup by flare id
//!    over a 48 h window.
//! 2. **Storm**: Kp ≥ 5 raises `GEOMAGNETIC_STORM` (HIGH); Kp ≥ 7 raises
//!    `SEVERE_STORM` (SEVERE, or EXTREME once Kp rounds to 9). Dedup by
//!    (tier, calendar day).
//! 3. **Wind**: speed ≥ 700 raises `EXTREME_SOLAR_WIND`, ≥ 600
//!    `HIGH_SOLAR_WIND`. Dedup by (tier, calendar day).
//! 4. **Compound**: when two or more rule families fired in the same call,
//!    one `COMPOUND_EVENT` at the maximum constituent severity is appended.
//!
//! The detector performs no I/O and never fails: a missing or non-finite
//! field simply means its rule does not fire.

mod dedup;

pub use dedup::{DedupMemory, TierRule};

use chrono::Duration;
use tracing::{debug, info};

use crate::config::defaults::TIER_DEDUP_RETENTION_DAYS;
use crate::config::DetectorConfig;
use crate::types::{
    EventSeverity, EventType, FlareClass, FlareRecord, Snapshot, SpaceWeatherEvent,
};

/// Running counters for logging and the status endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DetectorStats {
    pub snapshots_analyzed: u64,
    pub events_emitted: u64,
    pub compound_events: u64,
}

/// Stateful threshold detector.
#[derive(Debug, Clone)]
pub struct EventDetector {
    config: DetectorConfig,
    memory: DedupMemory,
    stats: DetectorStats,
}

impl EventDetector {
    pub fn new(config: DetectorConfig) -> Self {
        Self {
            config,
            memory: DedupMemory::new(),
            stats: DetectorStats::default(),
        }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    pub fn stats(&self) -> DetectorStats {
        self.stats
    }

    pub fn memory(&self) -> &DedupMemory {
        &self.memory
    }

    /// Forget every reported occurrence.
    pub fn reset(&mut self) {
        self.memory.clear();
    }

    /// Classify a snapshot into events.
    ///
    /// Output order: flares (in snapshot order), storm, wind, compound.
    pub fn analyze(&mut self, snapshot: &Snapshot) -> Vec<SpaceWeatherEvent> {
        self.memory.prune(
            snapshot.timestamp,
            Duration::try_hours(self.config.flare_dedup_window_hours).unwrap_or(Duration::MAX),
            TIER_DEDUP_RETENTION_DAYS,
        );
        self.stats.snapshots_analyzed += 1;

        let flares = self.detect_flares(snapshot);
        let storm = self.detect_storm(snapshot);
        let wind = self.detect_wind(snapshot);

        let families_fired = usize::from(!flares.is_empty())
            + usize::from(storm.is_some())
            + usize::from(wind.is_some());

        let mut events = flares;
        events.extend(storm);
        events.extend(wind);

        if self.config.detect_compound_events && families_fired >= 2 {
            let compound = Self::compound_event(snapshot, &events);
            info!(
                severity = %compound.severity,
                constituents = compound.sub_events.len(),
                "Compound space-weather event"
            );
            if self.config.suppress_compound_constituents {
                events.clear();
            }
            events.push(compound);
            self.stats.compound_events += 1;
        }

        self.stats.events_emitted += events.len() as u64;
        if !events.is_empty() {
            debug!(
                timestamp = %snapshot.timestamp,
                count = events.len(),
                "Snapshot produced events"
            );
        }
        events
    }

    // ========================================================================
    // Flare rule
    // ========================================================================

    fn detect_flares(&mut self, snapshot: &Snapshot) -> Vec<SpaceWeatherEvent> {
        let mut events = Vec::new();
        for flare in &snapshot.flares {
            let Some(class) = flare.class() else {
                debug!(id = %flare.id, class_type = %flare.class_type, "Skipping flare with unparseable class");
                continue;
            };
            if flare.id.trim().is_empty() || !self.config.flare_classes_to_detect.contains(&class) {
                continue;
            }
            if !self.memory.first_flare(&flare.id, snapshot.timestamp) {
                continue;
            }

            let severity = self.flare_severity(class, flare);
            let label = flare.label();
            let mut description = format!("{label} solar flare detected");
            if let Some(region) = flare.source_region.as_deref().filter(|r| !r.is_empty()) {
                description.push_str(&format!(" from active region {region}"));
            }
            if let Some(peak) = flare.peak_time {
                description.push_str(&format!(", peaking at {}", peak.format("%H:%M UTC")));
            }
            description.push('.');

            info!(flare_id = %flare.id, class = %label, severity = %severity, "Major flare detected");
            events.push(SpaceWeatherEvent::new(
                format!("flare-{}", flare.id),
                EventType::MajorFlare,
                severity,
                description,
                snapshot,
            ));
        }
        events
    }

    fn flare_severity(&self, class: FlareClass, flare: &FlareRecord) -> EventSeverity {
        match class {
            FlareClass::X => {
                let extreme = flare
                    .resolved_magnitude()
                    .is_some_and(|m| m >= self.config.x_flare_extreme_magnitude);
                if extreme {
                    EventSeverity::Extreme
                } else {
                    EventSeverity::Severe
                }
            }
            FlareClass::M => EventSeverity::High,
            FlareClass::C => EventSeverity::Moderate,
            FlareClass::A | FlareClass::B => EventSeverity::Low,
        }
    }

    // ========================================================================
    // Storm rule
    // ========================================================================

    fn detect_storm(&mut self, snapshot: &Snapshot) -> Option<SpaceWeatherEvent> {
        let kp = snapshot.kp_index()?;
        if kp < self.config.min_kp_for_storm {
            return None;
        }

        let severity = if kp.round() >= self.config.min_kp_for_extreme_storm {
            EventSeverity::Extreme
        } else if kp >= self.config.min_kp_for_severe_storm {
            EventSeverity::Severe
        } else {
            EventSeverity::High
        };

        if !self.memory.first_tier(TierRule::Storm, severity, snapshot.timestamp) {
            return None;
        }

        let event_type = if severity == EventSeverity::High {
            EventType::GeomagneticStorm
        } else {
            EventType::SevereStorm
        };
        let g_scale = noaa_g_scale(kp);
        let description = match severity {
            EventSeverity::Extreme => format!(
                "Extreme geomagnetic storm (G{g_scale}) in progress: Kp {kp:.1}. Widespread aurora and grid disturbances possible."
            ),
            EventSeverity::Severe => format!(
                "Severe geomagnetic storm (G{g_scale}) in progress: Kp {kp:.1}. Aurora visible at mid-latitudes."
            ),
            _ => format!("Geomagnetic storm (G{g_scale}) in progress: Kp {kp:.1}."),
        };

        info!(kp = kp, severity = %severity, "Geomagnetic storm detected");
        Some(SpaceWeatherEvent::new(
            format!("storm-{severity}-{}", snapshot.timestamp.date_naive()),
            event_type,
            severity,
            description,
            snapshot,
        ))
    }

    // ========================================================================
    // Wind rule
    // ========================================================================

    fn detect_wind(&mut self, snapshot: &Snapshot) -> Option<SpaceWeatherEvent> {
        let speed = snapshot.wind_speed()?;

        let (event_type, severity) = if speed >= self.config.min_speed_for_extreme_wind {
            (EventType::ExtremeSolarWind, EventSeverity::Extreme)
        } else if speed >= self.config.min_speed_for_high_wind {
            (EventType::HighSolarWind, EventSeverity::High)
        } else {
            return None;
        };

        if !self.memory.first_tier(TierRule::Wind, severity, snapshot.timestamp) {
            return None;
        }

        let description = if severity == EventSeverity::Extreme {
            format!("Extreme solar wind stream: {speed:.0} km/s. Expect strong geomagnetic coupling.")
        } else {
            format!("High-speed solar wind stream: {speed:.0} km/s.")
        };

        info!(speed = speed, severity = %severity, "Solar wind event detected");
        Some(SpaceWeatherEvent::new(
            format!("wind-{severity}-{}", snapshot.timestamp.date_naive()),
            event_type,
            severity,
            description,
            snapshot,
        ))
    }

    // ========================================================================
    // Compound rule
    // ========================================================================

    fn compound_event(snapshot: &Snapshot, constituents: &[SpaceWeatherEvent]) -> SpaceWeatherEvent {
        let severity = constituents
            .iter()
            .map(|e| e.severity)
            .max()
            .unwrap_or(EventSeverity::High);
        let parts: Vec<String> = constituents
            .iter()
            .map(|e| e.event_type.to_string())
            .collect();

        let mut event = SpaceWeatherEvent::new(
            format!("compound-{}", snapshot.timestamp.timestamp_millis()),
            EventType::CompoundEvent,
            severity,
            format!(
                "Multiple space-weather hazards active at once: {}.",
                parts.join(", ")
            ),
            snapshot,
        );
        event.sub_events = constituents.iter().map(|e| e.id.clone()).collect();
        event
    }
}

/// NOAA G-scale level (1-5) for a storm-level Kp.
fn noaa_g_scale(kp: f64) -> u8 {
    // G1 = Kp 5 ... G5 = Kp 9; Kp is >= 5 here so the cast cannot go negative
    (kp.round().clamp(5.0, 9.0) - 4.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FlareRecord, Geomagnetic, SolarWind};
    use chrono::{DateTime, Utc};

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

    fn snapshot(at: &str, kp: Option<f64>, speed: Option<f64>, flares: Vec<FlareRecord>) -> Snapshot {
        Snapshot {
            timestamp: ts(at),
            solar_wind: SolarWind {
                speed,
                density: Some(5.0),
                temperature: Some(100_000.0),
            },
            geomagnetic: Geomagnetic {
                kp_index: kp,
                storm: kp.is_some_and(|k| k >= 5.0),
                storm_level: None,
            },
            flares,
        }
    }

    fn detector() -> EventDetector {
        EventDetector::new(DetectorConfig::default())
    }

    fn types(events: &[SpaceWeatherEvent]) -> Vec<EventType> {
        events.iter().map(|e| e.event_type).collect()
    }

    #[test]
    fn test_quiet_snapshot_produces_nothing() {
        let mut d = detector();
        let events = d.analyze(&snapshot("2024-05-10T12:00:00Z", Some(2.0), Some(400.0), vec![]));
        assert!(events.is_empty());
        assert_eq!(d.stats().snapshots_analyzed, 1);
    }

    #[test]
    fn test_full_storm_scenario() {
        let mut d = detector();
        let snap = snapshot(
            "2024-05-10T17:00:00Z",
            Some(8.6),
            Some(950.0),
            vec![flare("f1", "X", Some(2.1))],
        );
        let events = d.analyze(&snap);

        assert_eq!(
            types(&events),
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
        assert_eq!(
            events[3].sub_events,
            vec![events[0].id.clone(), events[1].id.clone(), events[2].id.clone()]
        );
    }

    #[test]
    fn test_flare_severity_by_class_and_magnitude() {
        let mut d = detector();
        let events = d.analyze(&snapshot(
            "2024-05-10T12:00:00Z",
            None,
            None,
            vec![
                flare("m", "M", Some(3.0)),
                flare("x", "X", Some(4.9)),
                flare("xx", "X9.3", None),
                flare("c", "C", Some(5.0)),
            ],
        ));
        let sev: Vec<EventSeverity> = events.iter().map(|e| e.severity).collect();
        assert_eq!(
            sev,
            vec![EventSeverity::High, EventSeverity::Severe, EventSeverity::Extreme]
        );
        assert!(events.iter().all(|e| e.event_type == EventType::MajorFlare));
    }

    #[test]
    fn test_flare_id_emitted_once() {
        let mut d = detector();
        let s1 = snapshot("2024-05-10T12:00:00Z", None, None, vec![flare("f1", "M", Some(1.0))]);
        let s2 = snapshot("2024-05-10T12:01:00Z", None, None, vec![flare("f1", "M", Some(1.0))]);
        assert_eq!(d.analyze(&s1).len(), 1);
        assert!(d.analyze(&s2).is_empty());
    }

    #[test]
    fn test_flare_reemitted_after_window() {
        let mut d = detector();
        let first = snapshot("2024-05-10T00:00:00Z", None, None, vec![flare("f1", "M", None)]);
        let late = snapshot("2024-05-12T01:00:00Z", None, None, vec![flare("f1", "M", None)]);
        assert_eq!(d.analyze(&first).len(), 1);
        assert_eq!(d.analyze(&late).len(), 1);
    }

    #[test]
    fn test_storm_once_per_tier_per_day() {
        let mut d = detector();
        let a = d.analyze(&snapshot("2024-05-10T01:00:00Z", Some(5.3), None, vec![]));
        let b = d.analyze(&snapshot("2024-05-10T02:00:00Z", Some(6.0), None, vec![]));
        let c = d.analyze(&snapshot("2024-05-10T03:00:00Z", Some(7.3), None, vec![]));
        let e = d.analyze(&snapshot("2024-05-10T04:00:00Z", Some(5.0), None, vec![]));
        let next_day = d.analyze(&snapshot("2024-05-11T00:10:00Z", Some(5.0), None, vec![]));

        assert_eq!(types(&a), vec![EventType::GeomagneticStorm]);
        assert!(b.is_empty(), "same tier same day");
        assert_eq!(types(&c), vec![EventType::SevereStorm], "higher tier re-triggers");
        assert!(e.is_empty(), "falling back to a reported tier stays quiet");
        assert_eq!(types(&next_day), vec![EventType::GeomagneticStorm]);
    }

    #[test]
    fn test_wind_tiers() {
        let mut d = detector();
        let high = d.analyze(&snapshot("2024-05-10T01:00:00Z", None, Some(650.0), vec![]));
        let extreme = d.analyze(&snapshot("2024-05-10T02:00:00Z", None, Some(700.0), vec![]));
        let again = d.analyze(&snapshot("2024-05-10T03:00:00Z", None, Some(720.0), vec![]));
        assert_eq!(types(&high), vec![EventType::HighSolarWind]);
        assert_eq!(high[0].severity, EventSeverity::High);
        assert_eq!(types(&extreme), vec![EventType::ExtremeSolarWind]);
        assert!(again.is_empty());
    }

    #[test]
    fn test_compound_can_suppress_constituents() {
        let config = DetectorConfig {
            suppress_compound_constituents: true,
            ..DetectorConfig::default()
        };
        let mut d = EventDetector::new(config);
        let events = d.analyze(&snapshot("2024-05-10T01:00:00Z", Some(7.0), Some(620.0), vec![]));
        assert_eq!(types(&events), vec![EventType::CompoundEvent]);
        assert_eq!(events[0].severity, EventSeverity::Severe);
        assert_eq!(events[0].sub_events.len(), 2);
    }

    #[test]
    fn test_compound_disabled() {
        let config = DetectorConfig {
            detect_compound_events: false,
            ..DetectorConfig::default()
        };
        let mut d = EventDetector::new(config);
        let events = d.analyze(&snapshot("2024-05-10T01:00:00Z", Some(7.0), Some(620.0), vec![]));
        assert_eq!(types(&events), vec![EventType::SevereStorm, EventType::HighSolarWind]);
    }

    #[test]
    fn test_two_flares_alone_are_not_compound() {
        let mut d = detector();
        let events = d.analyze(&snapshot(
            "2024-05-10T01:00:00Z",
            None,
            None,
            vec![flare("a", "M", None), flare("b", "X", None)],
        ));
        assert_eq!(types(&events), vec![EventType::MajorFlare, EventType::MajorFlare]);
    }

    #[test]
    fn test_malformed_fields_degrade_per_rule() {
        let mut d = detector();
        let events = d.analyze(&snapshot(
            "2024-05-10T01:00:00Z",
            Some(f64::NAN),
            Some(800.0),
            vec![flare("", "X", Some(9.0)), flare("bad", "??", None)],
        ));
        assert_eq!(types(&events), vec![EventType::ExtremeSolarWind]);
    }

    #[test]
    fn test_analyze_is_deterministic() {
        let mut warm = detector();
        warm.analyze(&snapshot("2024-05-10T01:00:00Z", Some(5.5), None, vec![flare("f0", "M", None)]));

        let snap = snapshot(
            "2024-05-10T05:00:00Z",
            Some(7.7),
            Some(610.0),
            vec![flare("f0", "M", None), flare("f1", "X", Some(6.0))],
        );
        let mut a = warm.clone();
        let mut b = warm.clone();
        assert_eq!(a.analyze(&snap), b.analyze(&snap));
    }

    #[test]
    fn test_oversized_dedup_window_does_not_panic() {
        let mut d = EventDetector::new(DetectorConfig {
            flare_dedup_window_hours: i64::MAX,
            ..DetectorConfig::default()
        });
        let first = snapshot("2024-05-10T00:00:00Z", None, None, vec![flare("f1", "M", None)]);
        let much_later = snapshot("2030-01-01T00:00:00Z", None, None, vec![flare("f1", "M", None)]);
        assert_eq!(d.analyze(&first).len(), 1);
        assert!(d.analyze(&much_later).is_empty(), "id is remembered for the whole window");
    }

    #[test]
    fn test_g_scale() {
        assert_eq!(noaa_g_scale(5.0), 1);
        assert_eq!(noaa_g_scale(7.3), 3);
        assert_eq!(noaa_g_scale(8.6), 5);
    }
}
