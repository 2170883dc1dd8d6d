//! Heliocast configuration: detector thresholds, broadcast policy, API and
//! server settings as operator-tunable TOML values.
//!
//! Each struct implements `Default` with the built-in constants from
//! [`super::defaults`], so an empty or missing file behaves identically to
//! the stock configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::defaults;
use crate::types::{BroadcastPriority, BroadcastType, FlareClass};

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV_VAR: &str = "HELIOCAST_CONFIG";

/// Config file looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "heliocast.toml";

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration.
///
/// Load with `HelioConfig::load()` which searches:
/// 1. `$HELIOCAST_CONFIG`
/// 2. `./heliocast.toml`
/// 3. Built-in defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HelioConfig {
    #[serde(default)]
    pub detector: DetectorConfig,

    #[serde(default)]
    pub broadcast: BroadcastConfig,

    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,
}

impl HelioConfig {
    /// Load configuration using the standard search order.
    pub fn load() -> Self {
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), "Loaded config from {}", CONFIG_ENV_VAR);
                        return config;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from {}, falling back", CONFIG_ENV_VAR);
                    }
                }
            } else {
                warn!(path = %path, "{} points to non-existent file, falling back", CONFIG_ENV_VAR);
            }
        }

        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!("Loaded config from ./{}", LOCAL_CONFIG_FILE);
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./{}, using defaults", LOCAL_CONFIG_FILE);
                }
            }
        }

        info!("No {} found — using built-in defaults", LOCAL_CONFIG_FILE);
        Self::default()
    }

    /// Load from a specific TOML file path.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        Self::from_toml_str(&contents).map_err(|e| match e {
            ConfigError::Parse(_, err) => ConfigError::Parse(path.to_path_buf(), err),
            other => other,
        })
    }

    /// Parse and validate a TOML document. Unknown keys are logged, not fatal.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        for w in super::validation::validate_unknown_keys(contents) {
            warn!("{}", w);
        }

        let config: Self = toml::from_str(contents)
            .map_err(|e| ConfigError::Parse(PathBuf::from("<inline>"), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let d = &self.detector;
        let mut errors: Vec<String> = Vec::new();

        Self::check_escalation(d.min_kp_for_storm, d.min_kp_for_severe_storm, "detector.min_kp_for_storm / min_kp_for_severe_storm", &mut errors);
        Self::check_escalation(d.min_kp_for_severe_storm, d.min_kp_for_extreme_storm, "detector.min_kp_for_severe_storm / min_kp_for_extreme_storm", &mut errors);
        Self::check_escalation(d.min_speed_for_high_wind, d.min_speed_for_extreme_wind, "detector.min_speed_for_high_wind / min_speed_for_extreme_wind", &mut errors);

        let (range_errors, range_warnings) = super::validation::validate_physical_ranges(self);
        errors.extend(range_errors);
        for w in range_warnings {
            warn!("{}", w);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    fn check_escalation(lower: f64, upper: f64, name: &str, errors: &mut Vec<String>) {
        if upper < lower {
            errors.push(format!("{name}: {upper:.1} must be >= {lower:.1}"));
        }
    }

    /// Serialize back to TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }
}

/// Errors that can occur while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config I/O error ({}): {}", .0.display(), .1)]
    Io(PathBuf, std::io::Error),
    #[error("Config parse error ({}): {}", .0.display(), .1)]
    Parse(PathBuf, toml::de::Error),
    #[error("Config serialization error: {0}")]
    Serialize(toml::ser::Error),
    #[error("Config validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),
}

// ============================================================================
// Detector
// ============================================================================

/// Event detector thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Flare classes that produce `MAJOR_FLARE` events.
    #[serde(default = "default_flare_classes")]
    pub flare_classes_to_detect: Vec<FlareClass>,

    #[serde(default = "default_min_kp_for_storm")]
    pub min_kp_for_storm: f64,

    #[serde(default = "default_min_kp_for_severe_storm")]
    pub min_kp_for_severe_storm: f64,

    /// Compared against the Kp index rounded to the nearest integer.
    #[serde(default = "default_min_kp_for_extreme_storm")]
    pub min_kp_for_extreme_storm: f64,

    #[serde(default = "default_min_speed_for_high_wind")]
    pub min_speed_for_high_wind: f64,

    #[serde(default = "default_min_speed_for_extreme_wind")]
    pub min_speed_for_extreme_wind: f64,

    #[serde(default = "default_true")]
    pub detect_compound_events: bool,

    /// Emit only the compound event, dropping its constituents.
    #[serde(default)]
    pub suppress_compound_constituents: bool,

    #[serde(default = "default_x_flare_extreme_magnitude")]
    pub x_flare_extreme_magnitude: f64,

    #[serde(default = "default_flare_dedup_window_hours")]
    pub flare_dedup_window_hours: i64,
}

fn default_flare_classes() -> Vec<FlareClass> { vec![FlareClass::M, FlareClass::X] }
fn default_min_kp_for_storm() -> f64 { defaults::MIN_KP_FOR_STORM }
fn default_min_kp_for_severe_storm() -> f64 { defaults::MIN_KP_FOR_SEVERE_STORM }
fn default_min_kp_for_extreme_storm() -> f64 { defaults::MIN_KP_FOR_EXTREME_STORM }
fn default_min_speed_for_high_wind() -> f64 { defaults::MIN_SPEED_FOR_HIGH_WIND }
fn default_min_speed_for_extreme_wind() -> f64 { defaults::MIN_SPEED_FOR_EXTREME_WIND }
fn default_x_flare_extreme_magnitude() -> f64 { defaults::X_FLARE_EXTREME_MAGNITUDE }
fn default_flare_dedup_window_hours() -> i64 { defaults::FLARE_DEDUP_WINDOW_HOURS }
fn default_true() -> bool { true }

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            flare_classes_to_detect: default_flare_classes(),
            min_kp_for_storm: default_min_kp_for_storm(),
            min_kp_for_severe_storm: default_min_kp_for_severe_storm(),
            min_kp_for_extreme_storm: default_min_kp_for_extreme_storm(),
            min_speed_for_high_wind: default_min_speed_for_high_wind(),
            min_speed_for_extreme_wind: default_min_speed_for_extreme_wind(),
            detect_compound_events: true,
            suppress_compound_constituents: false,
            x_flare_extreme_magnitude: default_x_flare_extreme_magnitude(),
            flare_dedup_window_hours: default_flare_dedup_window_hours(),
        }
    }
}

// ============================================================================
// Broadcast Service
// ============================================================================

/// Admission and retention policy for the broadcast service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BroadcastConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Messages below this priority are rejected.
    #[serde(default)]
    pub min_display_priority: BroadcastPriority,

    /// Channel allow-list.
    #[serde(default = "default_channels")]
    pub channels: Vec<BroadcastType>,

    #[serde(default = "default_max_history_size")]
    pub max_history_size: usize,

    /// Delay before a dispatched message is acknowledged automatically; 0 disables.
    #[serde(default)]
    pub auto_acknowledge_delay_ms: u64,

    /// Clear the current message once its TTL elapses.
    #[serde(default = "default_true")]
    pub auto_dismiss: bool,
}

fn default_channels() -> Vec<BroadcastType> { BroadcastType::ALL.to_vec() }
fn default_max_history_size() -> usize { defaults::MAX_HISTORY_SIZE }

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_display_priority: BroadcastPriority::Low,
            channels: default_channels(),
            max_history_size: default_max_history_size(),
            auto_acknowledge_delay_ms: 0,
            auto_dismiss: true,
        }
    }
}

impl BroadcastConfig {
    pub fn allows(&self, channel: BroadcastType) -> bool {
        self.channels.contains(&channel)
    }
}

/// Partial update applied by `BroadcastService::update_config`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastConfigUpdate {
    pub enabled: Option<bool>,
    pub min_display_priority: Option<BroadcastPriority>,
    pub channels: Option<Vec<BroadcastType>>,
    pub max_history_size: Option<usize>,
    pub auto_acknowledge_delay_ms: Option<u64>,
    pub auto_dismiss: Option<bool>,
}

impl BroadcastConfig {
    /// Overlay the fields present in `update`.
    pub fn apply(&mut self, update: BroadcastConfigUpdate) {
        if let Some(v) = update.enabled {
            self.enabled = v;
        }
        if let Some(v) = update.min_display_priority {
            self.min_display_priority = v;
        }
        if let Some(v) = update.channels {
            self.channels = v;
        }
        if let Some(v) = update.max_history_size {
            self.max_history_size = v;
        }
        if let Some(v) = update.auto_acknowledge_delay_ms {
            self.auto_acknowledge_delay_ms = v;
        }
        if let Some(v) = update.auto_dismiss {
            self.auto_dismiss = v;
        }
    }
}

// ============================================================================
// Dissemination API
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiConfig {
    /// History entries considered per poll.
    #[serde(default = "default_poll_history_window")]
    pub poll_history_window: usize,

    /// Poll interval suggested to clients (ms).
    #[serde(default = "default_next_poll_in_ms")]
    pub next_poll_in_ms: u64,

    #[serde(default = "default_max_tracked_clients")]
    pub max_tracked_clients: usize,

    #[serde(default = "default_client_idle_timeout_secs")]
    pub client_idle_timeout_secs: u64,
}

fn default_poll_history_window() -> usize { defaults::POLL_HISTORY_WINDOW }
fn default_next_poll_in_ms() -> u64 { defaults::NEXT_POLL_IN_MS }
fn default_max_tracked_clients() -> usize { defaults::MAX_TRACKED_CLIENTS }
fn default_client_idle_timeout_secs() -> u64 { defaults::CLIENT_IDLE_TIMEOUT_SECS }

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            poll_history_window: default_poll_history_window(),
            next_poll_in_ms: default_next_poll_in_ms(),
            max_tracked_clients: default_max_tracked_clients(),
            client_idle_timeout_secs: default_client_idle_timeout_secs(),
        }
    }
}

// ============================================================================
// Server / Pipeline
// ============================================================================

/// HTTP server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address. Overridden by `HELIOCAST_SERVER_ADDR` or `--addr`.
    #[serde(default = "default_server_addr")]
    pub addr: String,
}

fn default_server_addr() -> String {
    "0.0.0.0:8080".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: default_server_addr(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Publish a weather summary for every snapshot.
    #[serde(default = "default_true")]
    pub weather_updates: bool,

    /// Delay between snapshots for replay / synthetic sources (ms).
    #[serde(default = "default_snapshot_interval_ms")]
    pub snapshot_interval_ms: u64,
}

fn default_snapshot_interval_ms() -> u64 { defaults::SNAPSHOT_INTERVAL_MS }

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            weather_updates: true,
            snapshot_interval_ms: default_snapshot_interval_ms(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
