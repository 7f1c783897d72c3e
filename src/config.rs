//! Pipeline configuration, loaded from JSON. Missing fields take defaults.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::control::Power;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub control: ControlConfig,
    pub telemetry: TelemetryConfig,
    pub trigger: CycleTrigger,
    /// Host runner only: stop after this many cycles.
    pub max_cycles: Option<u64>,
    pub simulation: SimulationConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            control: ControlConfig::default(),
            telemetry: TelemetryConfig::default(),
            trigger: CycleTrigger::BufferReady,
            max_cycles: None,
            simulation: SimulationConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    pub attention_threshold: u8,
    pub meditation_threshold: u8,
    pub drive_power: u8,
    pub spin_power: u8,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            attention_threshold: 60,
            meditation_threshold: 80,
            drive_power: 30,
            spin_power: 50,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub enabled: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// What starts an analysis cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CycleTrigger {
    /// Run once the producer has filled the ring with fresh samples.
    BufferReady,
    /// Run on a fixed period regardless of how many samples arrived.
    Periodic { period_ms: u64 },
}

impl CycleTrigger {
    pub fn period(&self) -> Option<Duration> {
        match self {
            CycleTrigger::BufferReady => None,
            CycleTrigger::Periodic { period_ms } => Some(Duration::from_millis(*period_ms)),
        }
    }
}

/// Synthetic headset used by the host runner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Raw samples per second (the headset streams 512 Hz).
    pub sample_rate_hz: u32,
    /// Frequency bin of the synthetic tone.
    pub tone_bin: usize,
    pub tone_amplitude: i16,
    /// eSense readings are sent once per this many raw samples.
    pub esense_every: u32,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            sample_rate_hz: 512,
            tone_bin: 10,
            tone_amplitude: 1000,
            esense_every: 512,
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(serde_json::Error),
    Invalid(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "config read failed: {e}"),
            ConfigError::Parse(e) => write!(f, "config parse failed: {e}"),
            ConfigError::Invalid(msg) => write!(f, "invalid config: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io(e) => Some(e),
            ConfigError::Parse(e) => Some(e),
            ConfigError::Invalid(_) => None,
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(e: serde_json::Error) -> Self {
        ConfigError::Parse(e)
    }
}

impl PipelineConfig {
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, power) in [
            ("drive_power", self.control.drive_power),
            ("spin_power", self.control.spin_power),
        ] {
            if Power::new(power).is_none() {
                return Err(ConfigError::Invalid(format!(
                    "{name} {power} exceeds {}",
                    Power::MAX
                )));
            }
        }
        if let CycleTrigger::Periodic { period_ms: 0 } = self.trigger {
            return Err(ConfigError::Invalid("trigger period must be non-zero".into()));
        }
        if self.simulation.sample_rate_hz == 0 {
            return Err(ConfigError::Invalid("sample_rate_hz must be non-zero".into()));
        }
        Ok(())
    }
}
