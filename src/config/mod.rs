//! Configuration Module
//!
//! Detector thresholds, broadcast admission policy and API settings loaded
//! from TOML.
//!
//! ## Loading Order
//!
//! 1. `HELIOCAST_CONFIG` environment variable (path to TOML file)
//! 2. `heliocast.toml` in the current working directory
//! 3. Built-in defaults
//!
//! The loaded config is an ordinary value: `main` owns it and hands the
//! relevant sections to the detector, the broadcast service and the API.

mod helio_config;
pub mod defaults;
pub mod validation;

pub use helio_config::*;
