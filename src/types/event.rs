//! Detected space-weather events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::snapshot::Snapshot;

/// Classified event type produced by the detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    MajorFlare,
    GeomagneticStorm,
    SevereStorm,
    HighSolarWind,
    ExtremeSolarWind,
    CompoundEvent,
}

impl EventType {
    pub const ALL: [Self; 6] = [
        Self::MajorFlare,
        Self::GeomagneticStorm,
        Self::SevereStorm,
        Self::HighSolarWind,
        Self::ExtremeSolarWind,
        Self::CompoundEvent,
    ];
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MajorFlare => write!(f, "MAJOR_FLARE"),
            Self::GeomagneticStorm => write!(f, "GEOMAGNETIC_STORM"),
            Self::SevereStorm => write!(f, "SEVERE_STORM"),
            Self::HighSolarWind => write!(f, "HIGH_SOLAR_WIND"),
            Self::ExtremeSolarWind => write!(f, "EXTREME_SOLAR_WIND"),
            Self::CompoundEvent => write!(f, "COMPOUND_EVENT"),
        }
    }
}

/// Event magnitude, totally ordered from `Low` to `Extreme`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventSeverity {
    #[default]
    Low = 0,
    Moderate = 1,
    High = 2,
    Severe = 3,
    Extreme = 4,
}

impl EventSeverity {
    pub const ALL: [Self; 5] = [
        Self::Low,
        Self::Moderate,
        Self::High,
        Self::Severe,
        Self::Extreme,
    ];
}

impl std::fmt::Display for EventSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "LOW"),
            Self::Moderate => write!(f, "MODERATE"),
            Self::High => write!(f, "HIGH"),
            Self::Severe => write!(f, "SEVERE"),
            Self::Extreme => write!(f, "EXTREME"),
        }
    }
}

/// A typed, severity-ranked occurrence derived from a snapshot.
///
/// Owns a copy of the triggering snapshot. `announced` is flipped by the
/// downstream speech collaborator once the event has been read out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpaceWeatherEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub severity: EventSeverity,
    pub detected_at: DateTime<Utc>,
    pub description: String,
    pub snapshot: Snapshot,
    #[serde(default)]
    pub announced: bool,
    /// Ids of the constituent events (compound events only)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sub_events: Vec<String>,
}

impl SpaceWeatherEvent {
    pub fn new(
        id: impl Into<String>,
        event_type: EventType,
        severity: EventSeverity,
        description: impl Into<String>,
        snapshot: &Snapshot,
    ) -> Self {
        Self {
            id: id.into(),
            event_type,
            severity,
            detected_at: snapshot.timestamp,
            description: description.into(),
            snapshot: snapshot.clone(),
            announced: false,
            sub_events: Vec::new(),
        }
    }

    pub fn mark_announced(&mut self) {
        self.announced = true;
    }

    pub fn is_compound(&self) -> bool {
        self.event_type == EventType::CompoundEvent
    }
}
