//! TOML config file loading and validation for the hub.
//!
//! Deployment basics (broker host, alarm file path) come from the
//! environment in `main`; this file carries the tuning knobs.  A
//! missing file is fine — every section has defaults.

use anyhow::{bail, Context, Result};
use serde::Deserialize;

// ---------------------------------------------------------------------------
// Config file structures
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub hub: HubSection,
    #[serde(default)]
    pub node: NodeSection,
    #[serde(default)]
    pub weather: WeatherSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HubSection {
    pub web_port: u16,
    /// Schedule evaluator poll interval, seconds.
    pub poll_interval_sec: u64,
}

impl Default for HubSection {
    fn default() -> Self {
        Self {
            web_port: 8080,
            poll_interval_sec: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NodeSection {
    /// Where the edge node listens for the discovery handshake.
    pub host: String,
    pub discovery_port: u16,
}

impl Default for NodeSection {
    fn default() -> Self {
        Self {
            host: "192.168.1.42".to_string(),
            discovery_port: 8266,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WeatherSection {
    pub enabled: bool,
    pub latitude: f64,
    pub longitude: f64,
}

impl Default for WeatherSection {
    fn default() -> Self {
        Self {
            enabled: true,
            latitude: 43.6158,
            longitude: 13.5189,
        }
    }
}

// ---------------------------------------------------------------------------
// Loading & validation
// ---------------------------------------------------------------------------

/// Load and validate the config file; a missing file yields defaults.
pub fn load(path: &str) -> Result<Config> {
    let cfg = match std::fs::read_to_string(path) {
        Ok(raw) => toml::from_str::<Config>(&raw)
            .with_context(|| format!("failed to parse config file {path}"))?,
        Err(_) => {
            tracing::info!(path, "no config file, using defaults");
            Config::default()
        }
    };
    cfg.validate()?;
    Ok(cfg)
}

impl Config {
    /// Validate all entries. Returns `Ok(())` or an error describing
    /// every violation found (not just the first one).
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        if self.hub.web_port == 0 {
            errors.push("hub.web_port must be nonzero".to_string());
        }
        if !(1..=3600).contains(&self.hub.poll_interval_sec) {
            errors.push(format!(
                "hub.poll_interval_sec {} out of range [1, 3600]",
                self.hub.poll_interval_sec
            ));
        }
        if self.node.host.trim().is_empty() {
            errors.push("node.host is empty".to_string());
        }
        if self.node.discovery_port == 0 {
            errors.push("node.discovery_port must be nonzero".to_string());
        }
        if !(-90.0..=90.0).contains(&self.weather.latitude) {
            errors.push(format!(
                "weather.latitude {} out of range [-90, 90]",
                self.weather.latitude
            ));
        }
        if !(-180.0..=180.0).contains(&self.weather.longitude) {
            errors.push(format!(
                "weather.longitude {} out of range [-180, 180]",
                self.weather.longitude
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            bail!(
                "config validation failed ({} error{}):\n  - {}",
                errors.len(),
                if errors.len() == 1 { "" } else { "s" },
                errors.join("\n  - ")
            );
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
