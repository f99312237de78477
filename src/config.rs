use serde::{Deserialize, Deserializer};
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::geometry::Site;
use crate::guide::DispatchSettings;
use crate::platform::DEFAULT_STROKE_DEGREES;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error("missing configuration: {0}")]
    Missing(&'static str),
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub platform: PlatformSection,
    #[serde(default)]
    pub guide: GuideSection,
    pub simulator: Option<SimulatorSection>,
    #[serde(default)]
    pub web: WebConfig,
    #[serde(default)]
    pub api_keys: Vec<ApiKey>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlatformSection {
    /// Used until a stroke has been saved to the settings file.
    #[serde(default = "default_stroke_degrees")]
    pub stroke_degrees: f64,
    #[serde(default = "default_settings_file")]
    pub settings_file: PathBuf,
}

impl Default for PlatformSection {
    fn default() -> Self {
        PlatformSection {
            stroke_degrees: default_stroke_degrees(),
            settings_file: default_settings_file(),
        }
    }
}

fn default_stroke_degrees() -> f64 {
    DEFAULT_STROKE_DEGREES
}

fn default_settings_file() -> PathBuf {
    PathBuf::from("eqplatform.yaml")
}

#[derive(Debug, Clone, Deserialize)]
pub struct GuideSection {
    #[serde(default = "default_max_pulse_ms")]
    pub max_pulse_ms: u32,
    #[serde(default = "default_poll_interval", deserialize_with = "humantime_duration")]
    pub poll_interval: Duration,
    #[serde(default = "default_timeout_margin", deserialize_with = "humantime_duration")]
    pub timeout_margin: Duration,
    #[serde(default)]
    pub wait_for_final_pulse: bool,
    #[serde(default = "default_watchdog_interval", deserialize_with = "humantime_duration")]
    pub watchdog_interval: Duration,
}

impl Default for GuideSection {
    fn default() -> Self {
        GuideSection {
            max_pulse_ms: default_max_pulse_ms(),
            poll_interval: default_poll_interval(),
            timeout_margin: default_timeout_margin(),
            wait_for_final_pulse: false,
            watchdog_interval: default_watchdog_interval(),
        }
    }
}

impl GuideSection {
    pub fn dispatch_settings(&self) -> DispatchSettings {
        DispatchSettings {
            poll_interval: self.poll_interval,
            timeout_margin: self.timeout_margin,
            wait_for_final_pulse: self.wait_for_final_pulse,
        }
    }
}

fn default_max_pulse_ms() -> u32 {
    2500
}

fn default_poll_interval() -> Duration {
    Duration::from_millis(10)
}

fn default_timeout_margin() -> Duration {
    Duration::from_secs(5)
}

fn default_watchdog_interval() -> Duration {
    Duration::from_secs(1)
}

fn humantime_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    humantime::parse_duration(s.trim()).map_err(serde::de::Error::custom)
}

/// In-process rig standing in for real hardware.
#[derive(Debug, Clone, Deserialize)]
pub struct SimulatorSection {
    pub latitude_deg: f64,
    pub longitude_deg: f64,
    #[serde(default)]
    pub ra_hours: f64,
    #[serde(default)]
    pub dec_deg: f64,
    #[serde(default = "default_true")]
    pub motor: bool,
}

impl SimulatorSection {
    pub fn site(&self) -> Site {
        Site {
            latitude_deg: self.latitude_deg,
            longitude_deg: self.longitude_deg,
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for WebConfig {
    fn default() -> Self {
        WebConfig {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiKey {
    pub key: String,
    pub name: String,
    pub permissions: HashSet<Permission>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    /// Start, pause, resume and reset the platform.
    Control,
    /// Send guide pulses and syncs.
    Guide,
    /// Change the stroke length.
    Configure,
}

impl Config {
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.platform.stroke_degrees.is_finite() || self.platform.stroke_degrees <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "platform.stroke_degrees must be positive, got {}",
                self.platform.stroke_degrees
            )));
        }
        if self.guide.max_pulse_ms == 0 {
            return Err(ConfigError::Invalid(
                "guide.max_pulse_ms must be positive".to_string(),
            ));
        }
        if self.guide.poll_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "guide.poll_interval must be positive".to_string(),
            ));
        }
        if let Some(sim) = &self.simulator {
            if !(-90.0..=90.0).contains(&sim.latitude_deg) {
                return Err(ConfigError::Invalid(format!(
                    "simulator.latitude_deg out of range: {}",
                    sim.latitude_deg
                )));
            }
        }
        Ok(())
    }

    /// The device backend; there is no other than the simulator yet.
    pub fn simulator(&self) -> Result<&SimulatorSection, ConfigError> {
        self.simulator.as_ref().ok_or(ConfigError::Missing("simulator"))
    }

    pub fn find_api_key(&self, key: &str) -> Option<&ApiKey> {
        self.api_keys.iter().find(|k| k.key == key)
    }
}
