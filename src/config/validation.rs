//! Config validation: unknown-key detection with "did you mean?" hints and
//! range checks on detector / broadcast / API values.
//!
//! The raw TOML is walked first and every dotted key is compared against
//! the known key set. Unknown keys only warn, so older config files keep
//! loading after a rename.

use std::collections::HashSet;

use super::defaults::MAX_FLARE_DEDUP_WINDOW_HOURS;

/// A non-fatal config warning (typo, suspicious value).
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(ref s) = self.suggestion {
            write!(f, " (did you mean '{s}'?)")?;
        }
        Ok(())
    }
}

// ============================================================================
// Known Config Keys
// ============================================================================

/// Every valid dotted key path for `HelioConfig`.
///
/// Kept in sync with the structs in `helio_config.rs` by hand.
pub fn known_config_keys() -> HashSet<&'static str> {
    let keys: &[&str] = &[
        "detector",
        "detector.flare_classes_to_detect",
        "detector.min_kp_for_storm",
        "detector.min_kp_for_severe_storm",
        "detector.min_kp_for_extreme_storm",
        "detector.min_speed_for_high_wind",
        "detector.min_speed_for_extreme_wind",
        "detector.detect_compound_events",
        "detector.suppress_compound_constituents",
        "detector.x_flare_extreme_magnitude",
        "detector.flare_dedup_window_hours",
        "broadcast",
        "broadcast.enabled",
        "broadcast.min_display_priority",
        "broadcast.channels",
        "broadcast.max_history_size",
        "broadcast.auto_acknowledge_delay_ms",
        "broadcast.auto_dismiss",
        "api",
        "api.poll_history_window",
        "api.next_poll_in_ms",
        "api.max_tracked_clients",
        "api.client_idle_timeout_secs",
        "server",
        "server.addr",
        "pipeline",
        "pipeline.weather_updates",
        "pipeline.snapshot_interval_ms",
    ];
    keys.iter().copied().collect()
}

// ============================================================================
// TOML Key Walking
// ============================================================================

/// Collect all dotted key paths of a TOML tree.
///
/// `{ a = { b = 1, c = 2 } }` yields `["a", "a.b", "a.c"]`.
pub fn walk_toml_keys(value: &toml::Value, prefix: &str) -> Vec<String> {
    let mut keys = Vec::new();
    let Some(table) = value.as_table() else {
        return keys;
    };
    for (k, v) in table {
        let path = if prefix.is_empty() {
            k.clone()
        } else {
            format!("{prefix}.{k}")
        };
        if v.is_table() {
            keys.extend(walk_toml_keys(v, &path));
        }
        keys.push(path);
    }
    keys
}

// ============================================================================
// Levenshtein Distance
// ============================================================================

/// Edit distance between two strings (two-row dynamic programming).
fn levenshtein(a: &str, b: &str) -> usize {
    let b_chars: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b_chars.len();
    }

    let mut prev: Vec<usize> = (0..=b_chars.len()).collect();
    let mut curr = vec![0; b_chars.len() + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b_chars.iter().enumerate() {
            let substitution = prev[j] + usize::from(ca != *cb);
            curr[j + 1] = substitution.min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b_chars.len()]
}

/// Closest known key within edit distance 3, if any.
pub fn suggest_correction(unknown: &str, known: &HashSet<&str>) -> Option<String> {
    known
        .iter()
        .map(|k| (*k, levenshtein(unknown, k)))
        .filter(|(_, dist)| *dist <= 3)
        .min_by(|(ka, da), (kb, db)| da.cmp(db).then_with(|| ka.cmp(kb)))
        .map(|(k, _)| k.to_string())
}

/// Warnings for every unknown key in a raw TOML document.
///
/// Parse errors are left to serde and produce no warnings here.
pub fn validate_unknown_keys(raw_toml: &str) -> Vec<ValidationWarning> {
    let Ok(value) = raw_toml.parse::<toml::Value>() else {
        return Vec::new();
    };

    let known = known_config_keys();
    walk_toml_keys(&value, "")
        .into_iter()
        .filter(|key| !known.contains(key.as_str()))
        .map(|key| ValidationWarning {
            suggestion: suggest_correction(&key, &known),
            message: format!("Unknown config key '{key}'"),
            field: key,
        })
        .collect()
}

// ============================================================================
// Range Validation
// ============================================================================

/// Range checks on a parsed config.
///
/// Returns (errors, warnings). Errors are impossible values that must
/// prevent startup; warnings are suspicious but usable.
pub fn validate_physical_ranges(
    config: &super::HelioConfig,
) -> (Vec<String>, Vec<ValidationWarning>) {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();
    let d = &config.detector;

    // Kp is a 0-9 quasi-logarithmic index
    for (name, kp) in [
        ("min_kp_for_storm", d.min_kp_for_storm),
        ("min_kp_for_severe_storm", d.min_kp_for_severe_storm),
        ("min_kp_for_extreme_storm", d.min_kp_for_extreme_storm),
    ] {
        if !(0.0..=9.0).contains(&kp) {
            errors.push(format!("detector.{name} = {kp:.1} is outside the Kp range (0-9)"));
        }
    }

    if d.min_speed_for_high_wind <= 0.0 {
        errors.push(format!(
            "detector.min_speed_for_high_wind = {:.1} must be > 0",
            d.min_speed_for_high_wind
        ));
    }

    if !(1..=MAX_FLARE_DEDUP_WINDOW_HOURS).contains(&d.flare_dedup_window_hours) {
        errors.push(format!(
            "detector.flare_dedup_window_hours = {} must be between 1 and {MAX_FLARE_DEDUP_WINDOW_HOURS}",
            d.flare_dedup_window_hours
        ));
    }

    if config.broadcast.max_history_size == 0 {
        errors.push("broadcast.max_history_size must be > 0".to_string());
    }
    if config.api.next_poll_in_ms == 0 {
        errors.push("api.next_poll_in_ms must be > 0".to_string());
    }
    if config.api.max_tracked_clients == 0 {
        errors.push("api.max_tracked_clients must be > 0".to_string());
    }

    if d.flare_classes_to_detect.is_empty() {
        warnings.push(ValidationWarning {
            field: "detector.flare_classes_to_detect".to_string(),
            message: "flare_classes_to_detect is empty: no flare events will be raised".to_string(),
            suggestion: None,
        });
    }

    // Ambient slow wind is ~300-500 km/s; thresholds below that fire constantly
    if d.min_speed_for_high_wind > 0.0 && d.min_speed_for_high_wind < 400.0 {
        warnings.push(ValidationWarning {
            field: "detector.min_speed_for_high_wind".to_string(),
            message: format!(
                "min_speed_for_high_wind = {:.0} km/s is below typical ambient solar wind",
                d.min_speed_for_high_wind
            ),
            suggestion: None,
        });
    }

    if config.api.poll_history_window > config.broadcast.max_history_size {
        warnings.push(ValidationWarning {
            field: "api.poll_history_window".to_string(),
            message: format!(
                "poll_history_window ({}) exceeds broadcast.max_history_size ({})",
                config.api.poll_history_window, config.broadcast.max_history_size
            ),
            suggestion: None,
        });
    }

    (errors, warnings)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levenshtein_basics() {
        assert_eq!(levenshtein("hello", "hello"), 0);
        assert_eq!(levenshtein("min_kp_for_strom", "min_kp_for_storm"), 2);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("abc", ""), 3);
    }

    #[test]
    fn test_walk_toml_keys_nested() {
        let toml: toml::Value = r#"
            [detector]
            min_kp_for_storm = 5.0
        "#
        .parse()
        .unwrap();
        let keys = walk_toml_keys(&toml, "");
        assert!(keys.contains(&"detector".to_string()));
        assert!(keys.contains(&"detector.min_kp_for_storm".to_string()));
    }

    #[test]
    fn test_typo_key_produces_warning_with_suggestion() {
        let toml_str = r#"
[broadcast]
max_histroy_size = 20
"#;
        let warnings = validate_unknown_keys(toml_str);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].field, "broadcast.max_histroy_size");
        assert_eq!(
            warnings[0].suggestion.as_deref(),
            Some("broadcast.max_history_size")
        );
    }

    #[test]
    fn test_all_valid_keys_produce_zero_warnings() {
        let toml_str = r#"
[detector]
min_kp_for_storm = 5.0
detect_compound_events = false

[api]
next_poll_in_ms = 3000
"#;
        let warnings = validate_unknown_keys(toml_str);
        assert!(warnings.is_empty(), "Expected 0 warnings, got: {:?}", warnings);
    }

    #[test]
    fn test_suggest_correction_no_match_for_garbage() {
        let known = known_config_keys();
        assert!(suggest_correction("completely_unrelated_garbage_key_xyz", &known).is_none());
    }

    #[test]
    fn test_ranges_defaults_clean() {
        let config = crate::config::HelioConfig::default();
        let (errors, warnings) = validate_physical_ranges(&config);
        assert!(errors.is_empty(), "Defaults should produce no errors: {errors:?}");
        assert!(warnings.is_empty(), "Defaults should produce no warnings: {warnings:?}");
    }

    #[test]
    fn test_kp_out_of_range_is_error() {
        let mut config = crate::config::HelioConfig::default();
        config.detector.min_kp_for_extreme_storm = 12.0;
        let (errors, _) = validate_physical_ranges(&config);
        assert!(errors.iter().any(|e| e.contains("min_kp_for_extreme_storm")));
    }

    #[test]
    fn test_zero_history_is_error() {
        let mut config = crate::config::HelioConfig::default();
        config.broadcast.max_history_size = 0;
        let (errors, _) = validate_physical_ranges(&config);
        assert!(errors.iter().any(|e| e.contains("max_history_size")));
    }

    #[test]
    fn test_empty_flare_classes_warns() {
        let mut config = crate::config::HelioConfig::default();
        config.detector.flare_classes_to_detect.clear();
        let (errors, warnings) = validate_physical_ranges(&config);
        assert!(errors.is_empty());
        assert!(warnings.iter().any(|w| w.field == "detector.flare_classes_to_detect"));
    }
}
