//! Core data model: telemetry snapshots, detected events, broadcast messages.

mod broadcast;
mod event;
mod snapshot;

pub use broadcast::{
    BroadcastHistoryEntry, BroadcastMessage, BroadcastPriority, BroadcastTone, BroadcastType,
    UserAction,
};
pub use event::{EventSeverity, EventType, SpaceWeatherEvent};
pub use snapshot::{FlareClass, FlareRecord, Geomagnetic, SolarWind, Snapshot};

pub(crate) use snapshot::finite;
