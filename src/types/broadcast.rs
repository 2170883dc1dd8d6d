//! Broadcast messages and history entries (wire shapes are camelCase JSON).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::event::SpaceWeatherEvent;
use super::snapshot::Snapshot;

/// Channel a message was produced on. Used for the channel allow-list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BroadcastType {
    Event,
    WeatherUpdate,
    DjAnnouncement,
    System,
    Alert,
}

impl BroadcastType {
    pub const ALL: [Self; 5] = [
        Self::Event,
        Self::WeatherUpdate,
        Self::DjAnnouncement,
        Self::System,
        Self::Alert,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Event => "event",
            Self::WeatherUpdate => "weather_update",
            Self::DjAnnouncement => "dj_announcement",
            Self::System => "system",
            Self::Alert => "alert",
        }
    }
}

impl std::fmt::Display for BroadcastType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Delivery urgency. Serialized as its ordinal (0-4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum BroadcastPriority {
    /// Reserved for system-internal messages
    #[default]
    Low = 0,
    Normal = 1,
    High = 2,
    Urgent = 3,
    Critical = 4,
}

impl BroadcastPriority {
    pub const ALL: [Self; 5] = [
        Self::Low,
        Self::Normal,
        Self::High,
        Self::Urgent,
        Self::Critical,
    ];

    pub const fn ordinal(self) -> u8 {
        self as u8
    }
}

impl From<BroadcastPriority> for u8 {
    fn from(p: BroadcastPriority) -> Self {
        p.ordinal()
    }
}

impl TryFrom<u8> for BroadcastPriority {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Low),
            1 => Ok(Self::Normal),
            2 => Ok(Self::High),
            3 => Ok(Self::Urgent),
            4 => Ok(Self::Critical),
            other => Err(format!("priority must be 0-4, got {other}")),
        }
    }
}

impl std::fmt::Display for BroadcastPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "LOW"),
            Self::Normal => write!(f, "NORMAL"),
            Self::High => write!(f, "HIGH"),
            Self::Urgent => write!(f, "URGENT"),
            Self::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// Presentation hint, independent of priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BroadcastTone {
    Neutral,
    Positive,
    Warning,
    Danger,
    Cinematic,
}

impl std::fmt::Display for BroadcastTone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Neutral => write!(f, "neutral"),
            Self::Positive => write!(f, "positive"),
            Self::Warning => write!(f, "warning"),
            Self::Danger => write!(f, "danger"),
            Self::Cinematic => write!(f, "cinematic"),
        }
    }
}

/// A ranked, time-boxed notification.
///
/// Only `acknowledged` changes after creation. `ttl` is always > 0 (ms).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastMessage {
    pub id: String,
    #[serde(rename = "type")]
    pub broadcast_type: BroadcastType,
    pub priority: BroadcastPriority,
    pub tone: BroadcastTone,
    pub headline: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub ttl: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<SpaceWeatherEvent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<Snapshot>,
    pub icon: String,
    #[serde(default)]
    pub acknowledged: bool,
    #[serde(default)]
    pub has_audio: bool,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// What ended a message's time as the current broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserAction {
    Acknowledged,
    Dismissed,
    Expired,
}

/// A dispatched message plus its delivery bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastHistoryEntry {
    pub broadcast: BroadcastMessage,
    pub received_at: DateTime<Utc>,
    /// Milliseconds the message stayed current (0 while still current)
    pub displayed_for: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_action: Option<UserAction>,
}
