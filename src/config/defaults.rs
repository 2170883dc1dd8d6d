//! System-wide default constants.
//!
//! Grouped by subsystem for easy discovery.

// ============================================================================
// Detector
// ============================================================================

/// Kp index at which a geomagnetic storm is reported (G1).
pub const MIN_KP_FOR_STORM: f64 = 5.0;

/// Kp index at which a storm is routed as `SEVERE_STORM` (G3).
pub const MIN_KP_FOR_SEVERE_STORM: f64 = 7.0;

/// Rounded Kp index at which a storm is EXTREME (G5; "9-" = 8.67 rounds up).
pub const MIN_KP_FOR_EXTREME_STORM: f64 = 9.0;

/// Solar wind speed for `HIGH_SOLAR_WIND` (km/s).
pub const MIN_SPEED_FOR_HIGH_WIND: f64 = 600.0;

/// Solar wind speed for `EXTREME_SOLAR_WIND` (km/s).
pub const MIN_SPEED_FOR_EXTREME_WIND: f64 = 700.0;

/// X-class magnitude at or above which a flare is EXTREME.
pub const X_FLARE_EXTREME_MAGNITUDE: f64 = 5.0;

/// How long an emitted flare id is remembered (hours).
pub const FLARE_DEDUP_WINDOW_HOURS: i64 = 48;

/// Upper bound accepted for the flare dedup window (one year).
pub const MAX_FLARE_DEDUP_WINDOW_HOURS: i64 = 8_760;

/// How many calendar days of storm/wind tier keys are retained.
pub const TIER_DEDUP_RETENTION_DAYS: i64 = 2;

// ============================================================================
// Broadcast Service
// ============================================================================

/// History ring-buffer capacity.
pub const MAX_HISTORY_SIZE: usize = 50;

/// Fixed TTL for weather summaries (ms).
pub const WEATHER_UPDATE_TTL_MS: u64 = 60_000;

/// Fixed TTL for announcer scripts (ms).
pub const DJ_ANNOUNCEMENT_TTL_MS: u64 = 15_000;

/// Fixed TTL for system notices (ms).
pub const SYSTEM_TTL_MS: u64 = 8_000;

/// Weather tone escalates to DANGER at this Kp or speed.
pub const WEATHER_DANGER_KP: f64 = 7.0;
pub const WEATHER_DANGER_SPEED: f64 = 700.0;

/// Weather tone escalates to WARNING at this Kp or speed.
pub const WEATHER_WARNING_KP: f64 = 5.0;
pub const WEATHER_WARNING_SPEED: f64 = 550.0;

// ============================================================================
// Dissemination API
// ============================================================================

/// Number of most-recent history entries considered per poll.
pub const POLL_HISTORY_WINDOW: usize = 20;

/// Suggested client poll interval (ms).
pub const NEXT_POLL_IN_MS: u64 = 5_000;

/// Client id used when the request omits one.
pub const DEFAULT_CLIENT_ID: &str = "default";

/// Upper bound on tracked poll cursors.
pub const MAX_TRACKED_CLIENTS: usize = 10_000;

/// Cursors idle longer than this are evicted first (seconds).
pub const CLIENT_IDLE_TIMEOUT_SECS: u64 = 3_600;

// ============================================================================
// Pipeline
// ============================================================================

/// Delay between snapshots for replay / synthetic sources (ms).
pub const SNAPSHOT_INTERVAL_MS: u64 = 30_000;
