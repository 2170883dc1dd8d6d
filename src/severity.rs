//! Severity mapping: event severity → broadcast priority / tone, and the
//! priority → TTL ladder.
//!
//! Every function matches exhaustively, so adding a severity or priority
//! variant fails to compile until each mapping is updated.

use crate::types::{BroadcastPriority, BroadcastTone, EventSeverity};

/// Map event severity to delivery priority.
///
/// `BroadcastPriority::Low` is reserved for system-internal messages and is
/// never produced here.
pub const fn severity_to_priority(severity: EventSeverity) -> BroadcastPriority {
    match severity {
        EventSeverity::Low | EventSeverity::Moderate => BroadcastPriority::Normal,
        EventSeverity::High => BroadcastPriority::High,
        EventSeverity::Severe => BroadcastPriority::Urgent,
        EventSeverity::Extreme => BroadcastPriority::Critical,
    }
}

/// Map event severity to presentation tone.
pub const fn severity_to_tone(severity: EventSeverity) -> BroadcastTone {
    match severity {
        EventSeverity::Low | EventSeverity::Moderate => BroadcastTone::Neutral,
        EventSeverity::High => BroadcastTone::Warning,
        EventSeverity::Severe | EventSeverity::Extreme => BroadcastTone::Danger,
    }
}

/// Time-to-live (ms) for a message of the given priority. Monotonic in priority.
pub const fn calculate_ttl(priority: BroadcastPriority) -> u64 {
    match priority {
        BroadcastPriority::Low => 5_000,
        BroadcastPriority::Normal => 8_000,
        BroadcastPriority::High => 12_000,
        BroadcastPriority::Urgent => 15_000,
        BroadcastPriority::Critical => 20_000,
    }
}
