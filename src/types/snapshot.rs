//! Telemetry snapshot: one space-weather reading per polling cycle.
//!
//! Snapshots are produced by the upstream fetcher and are immutable once
//! built. Every numeric field is optional: a missing, wrongly typed or
//! non-finite value is treated as absent by the detector instead of failing
//! the whole reading. Flare records that cannot be read are dropped one by
//! one; a missing or unparseable timestamp falls back to the receipt time.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::debug;

/// One timestamped space-weather reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// Time the reading was taken (UTC)
    #[serde(default = "Utc::now", deserialize_with = "timestamp_or_now")]
    pub timestamp: DateTime<Utc>,

    /// Solar wind plasma measurements
    #[serde(default, deserialize_with = "lenient")]
    pub solar_wind: SolarWind,

    /// Planetary geomagnetic activity
    #[serde(default, deserialize_with = "lenient")]
    pub geomagnetic: Geomagnetic,

    /// Recent flare records, in the order reported upstream
    #[serde(default, deserialize_with = "readable_flares")]
    pub flares: Vec<FlareRecord>,
}

/// Solar wind plasma readings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SolarWind {
    /// Bulk speed (km/s)
    #[serde(default, deserialize_with = "lenient")]
    pub speed: Option<f64>,
    /// Proton density (p/cm³)
    #[serde(default, deserialize_with = "lenient")]
    pub density: Option<f64>,
    /// Proton temperature (K)
    #[serde(default, deserialize_with = "lenient")]
    pub temperature: Option<f64>,
}

/// Geomagnetic index and storm flags.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Geomagnetic {
    /// Planetary K-index (0-9)
    #[serde(default, rename = "kp_index", alias = "kpIndex", deserialize_with = "lenient")]
    pub kp_index: Option<f64>,
    /// Upstream storm flag
    #[serde(default, deserialize_with = "lenient")]
    pub storm: bool,
    /// Upstream storm level label (e.g. "G3")
    #[serde(default, deserialize_with = "lenient")]
    pub storm_level: Option<String>,
}

/// A single X-ray flare record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlareRecord {
    /// Upstream flare identifier (dedup key)
    pub id: String,
    /// GOES class, either a bare letter ("X") or a full class ("X2.1")
    #[serde(default, deserialize_with = "lenient")]
    pub class_type: String,
    /// Class magnitude; parsed from `class_type` when absent
    #[serde(default, deserialize_with = "lenient")]
    pub magnitude: Option<f64>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub begin_time: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub peak_time: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub source_region: Option<String>,
}

/// GOES X-ray flare class letter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FlareClass {
    A,
    B,
    C,
    M,
    X,
}

impl FlareClass {
    /// Parse the leading class letter (case-insensitive).
    pub fn from_letter(c: char) -> Option<Self> {
        match c.to_ascii_uppercase() {
            'A' => Some(Self::A),
            'B' => Some(Self::B),
            'C' => Some(Self::C),
            'M' => Some(Self::M),
            'X' => Some(Self::X),
            _ => None,
        }
    }
}

impl std::fmt::Display for FlareClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let letter = match self {
            Self::A => "A",
            Self::B => "B",
            Self::C => "C",
            Self::M => "M",
            Self::X => "X",
        };
        f.write_str(letter)
    }
}

impl std::str::FromStr for FlareClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.trim().chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Self::from_letter(c).ok_or_else(|| format!("unknown flare class '{s}'")),
            _ => Err(format!("flare class must be a single letter, got '{s}'")),
        }
    }
}

/// Read a field, falling back to its default when the value has the wrong
/// shape (`"kp_index": "n/a"`, `"speed": null`, ...).
fn lenient<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).unwrap_or_default())
}

fn timestamp_or_now<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).unwrap_or_else(|_| Utc::now()))
}

/// Decode flare records one by one, dropping those that cannot be read.
fn readable_flares<'de, D>(deserializer: D) -> Result<Vec<FlareRecord>, D::Error>
where
    D: Deserializer<'de>,
{
    let serde_json::Value::Array(items) = serde_json::Value::deserialize(deserializer)? else {
        return Ok(Vec::new());
    };
    Ok(items
        .into_iter()
        .filter_map(|item| match serde_json::from_value::<FlareRecord>(item) {
            Ok(flare) => Some(flare),
            Err(e) => {
                debug!(error = %e, "Dropping unreadable flare record");
                None
            }
        })
        .collect())
}

/// Keep only finite readings.
pub(crate) fn finite(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}

impl FlareRecord {
    /// Class letter of this flare, or `None` if `class_type` is unparseable.
    pub fn class(&self) -> Option<FlareClass> {
        self.class_type.trim().chars().next().and_then(FlareClass::from_letter)
    }

    /// Magnitude within the class: the explicit field, else the numeric
    /// suffix of `class_type` ("X2.1" → 2.1).
    pub fn resolved_magnitude(&self) -> Option<f64> {
        finite(self.magnitude).or_else(|| {
            let trimmed = self.class_type.trim();
            let suffix = trimmed.get(1..)?;
            finite(suffix.parse::<f64>().ok())
        })
    }

    /// Human-readable class label, e.g. "X2.1".
    pub fn label(&self) -> String {
        match (self.class(), self.resolved_magnitude()) {
            (Some(class), Some(mag)) => format!("{class}{mag:.1}"),
            (Some(class), None) => class.to_string(),
            _ => self.class_type.clone(),
        }
    }
}

impl Snapshot {
    /// Empty reading at `timestamp`.
    pub fn at(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            solar_wind: SolarWind::default(),
            geomagnetic: Geomagnetic::default(),
            flares: Vec::new(),
        }
    }

    pub fn wind_speed(&self) -> Option<f64> {
        finite(self.solar_wind.speed)
    }

    pub fn kp_index(&self) -> Option<f64> {
        finite(self.geomagnetic.kp_index)
    }
}
