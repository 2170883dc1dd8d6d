//! Heliocast: space-weather event detection and broadcast dissemination
//!
//! Turns a stream of telemetry snapshots (solar wind, Kp index, X-ray
//! flares) into typed, severity-ranked events and republishes them as
//! prioritised, time-boxed broadcast messages for display clients.
//!
//! ## Architecture
//!
//! - **Event Detector**: threshold rules with per-occurrence dedup
//! - **Severity Mapper**: severity → priority / tone / TTL
//! - **Broadcast Service**: admission queue, bounded history, listeners
//! - **Dissemination API**: incremental HTTP polling with per-client cursors

pub mod api;
pub mod broadcast;
pub mod config;
pub mod detector;
pub mod pipeline;
pub mod severity;
pub mod types;

// Re-export configuration
pub use config::HelioConfig;

// Re-export commonly used types
pub use types::{
    BroadcastHistoryEntry, BroadcastMessage, BroadcastPriority, BroadcastTone, BroadcastType,
    EventSeverity, EventType, FlareRecord, Snapshot, SpaceWeatherEvent,
};

pub use broadcast::BroadcastService;
pub use detector::EventDetector;
