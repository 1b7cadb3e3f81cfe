//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Shared configuration and logging primitives."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds, DurationSeconds};
use tracing::debug;

use crate::error::ConfigError;
use crate::logging::LogFormat;

/// Number of luminaires simulated per fleet.
pub const FLEET_SIZE: usize = 3;

fn default_host() -> String {
    "localhost".to_owned()
}

fn default_port() -> u16 {
    1883
}

fn default_client_id() -> String {
    "lumicert-simulator".to_owned()
}

fn default_keep_alive() -> Duration {
    Duration::from_secs(60)
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_channel_capacity() -> usize {
    64
}

fn default_topic() -> String {
    "lumicert/telemetry".to_owned()
}

fn default_status_suffix() -> String {
    "status".to_owned()
}

fn default_tick_interval() -> Duration {
    Duration::from_secs(5)
}

fn default_device_ids() -> Vec<u32> {
    vec![4, 5, 6]
}

/// Primary configuration object for the simulator daemon.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Metadata describing where an [`AppConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedAppConfig {
    pub config: AppConfig,
    /// `None` when built-in defaults were used.
    pub source: Option<PathBuf>,
}

impl AppConfig {
    pub const ENV_CONFIG_PATH: &str = "LUMICERT_CONFIG";

    /// Load configuration from disk, respecting the `LUMICERT_CONFIG` override.
    ///
    /// An explicitly requested file must exist. When nothing was requested and
    /// none of the candidates exist, the built-in defaults are returned.
    pub fn load_with_source<P: AsRef<Path>>(
        explicit: Option<&Path>,
        candidates: &[P],
    ) -> Result<LoadedAppConfig> {
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                let path = PathBuf::from(env_path);
                let config = Self::from_path(&path)?;
                return Ok(LoadedAppConfig {
                    config,
                    source: Some(path),
                });
            }
        }

        if let Some(path) = explicit {
            if !path.exists() {
                return Err(anyhow!("configuration file {} not found", path.display()));
            }
            let config = Self::from_path(path)?;
            return Ok(LoadedAppConfig {
                config,
                source: Some(path.to_path_buf()),
            });
        }

        for candidate in candidates {
            let candidate = candidate.as_ref();
            if candidate.exists() {
                let config = Self::from_path(candidate)?;
                return Ok(LoadedAppConfig {
                    config,
                    source: Some(candidate.to_path_buf()),
                });
            }
        }

        debug!("no configuration file found; using built-in defaults");
        Ok(LoadedAppConfig {
            config: AppConfig::default(),
            source: None,
        })
    }

    fn from_path(path: &Path) -> Result<Self> {
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        contents
            .parse::<AppConfig>()
            .with_context(|| format!("invalid config file {}", path.display()))
    }

    /// Validate every section; called at load time and again before the
    /// simulator is built.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        self.broker.validate()?;
        self.telemetry.validate()?;
        self.simulation.validate()
    }
}

impl std::str::FromStr for AppConfig {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        let config: AppConfig =
            toml::from_str(content).with_context(|| "failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }
}

/// Connection settings for the MQTT broker.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_client_id")]
    pub client_id: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
    #[serde(default)]
    pub tls: bool,
    #[serde(default = "default_keep_alive")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub keep_alive: Duration,
    #[serde(default = "default_connect_timeout")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub connect_timeout: Duration,
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            client_id: default_client_id(),
            username: None,
            password: None,
            tls: false,
            keep_alive: default_keep_alive(),
            connect_timeout: default_connect_timeout(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl BrokerConfig {
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::Broker("host must not be empty".into()));
        }
        if self.port == 0 {
            return Err(ConfigError::Broker("port must not be zero".into()));
        }
        if self.client_id.trim().is_empty() {
            return Err(ConfigError::Broker("client_id must not be empty".into()));
        }
        if self.keep_alive < Duration::from_secs(1) {
            return Err(ConfigError::Broker(
                "keep_alive must be at least one second".into(),
            ));
        }
        if self.channel_capacity == 0 {
            return Err(ConfigError::Broker(
                "channel_capacity must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

/// Where and how often telemetry is published.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_topic")]
    pub topic: String,
    #[serde(default = "default_status_suffix")]
    pub status_suffix: String,
    #[serde(default = "default_tick_interval", rename = "interval_ms")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub interval: Duration,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            topic: default_topic(),
            status_suffix: default_status_suffix(),
            interval: default_tick_interval(),
        }
    }
}

impl TelemetryConfig {
    /// Subtopic carrying the retained online/offline announcements.
    pub fn status_topic(&self) -> String {
        format!("{}/{}", self.topic, self.status_suffix)
    }

    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        for topic in [&self.topic, &self.status_suffix] {
            if topic.is_empty() || topic.contains(['#', '+']) || topic.contains('\0') {
                return Err(ConfigError::Topic(topic.clone()));
            }
        }
        if self.interval.is_zero() {
            return Err(ConfigError::ZeroInterval);
        }
        Ok(())
    }
}

/// Fleet-wide relay control mode.
///
/// Configuration files may spell it in lower case; the wire format always
/// uses the upper-case form.
#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum OperatingMode {
    #[default]
    #[serde(rename = "AUTO", alias = "auto")]
    Auto,
    #[serde(rename = "MANUAL", alias = "manual")]
    Manual,
}

impl OperatingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperatingMode::Auto => "AUTO",
            OperatingMode::Manual => "MANUAL",
        }
    }
}

impl std::str::FromStr for OperatingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(OperatingMode::Auto),
            "manual" => Ok(OperatingMode::Manual),
            other => Err(format!("unknown mode: {}", other)),
        }
    }
}

/// Uniform sampling bounds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValueRange {
    pub min: f64,
    pub max: f64,
}

impl ValueRange {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// `true` when `value` lies in `[min, max)`.
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value < self.max
    }

    fn validate_half_open(&self, name: &'static str) -> std::result::Result<(), ConfigError> {
        self.validate_finite(name)?;
        if self.min < self.max {
            Ok(())
        } else {
            Err(ConfigError::Range {
                name,
                min: self.min,
                max: self.max,
            })
        }
    }

    fn validate_closed(&self, name: &'static str) -> std::result::Result<(), ConfigError> {
        self.validate_finite(name)?;
        if self.min <= self.max {
            Ok(())
        } else {
            Err(ConfigError::Range {
                name,
                min: self.min,
                max: self.max,
            })
        }
    }

    fn validate_finite(&self, name: &'static str) -> std::result::Result<(), ConfigError> {
        for value in [self.min, self.max] {
            if !value.is_finite() {
                return Err(ConfigError::NonFinite { name, value });
            }
        }
        Ok(())
    }
}

/// Per-tick probabilities of each simulated condition.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnomalyProbabilities {
    pub fail: f64,
    pub overcurrent: f64,
    pub theft: f64,
    pub day_consumption: f64,
    /// Fleet-level `bh1_fail` alarm.
    pub sensor_fail: f64,
    /// Fleet-level `bh_discrep` alarm.
    pub sensor_discrepancy: f64,
}

impl Default for AnomalyProbabilities {
    fn default() -> Self {
        Self {
            fail: 0.03,
            overcurrent: 0.05,
            theft: 0.02,
            day_consumption: 0.10,
            sensor_fail: 0.01,
            sensor_discrepancy: 0.01,
        }
    }
}

impl AnomalyProbabilities {
    fn validate(&self) -> std::result::Result<(), ConfigError> {
        let entries = [
            ("fail", self.fail),
            ("overcurrent", self.overcurrent),
            ("theft", self.theft),
            ("day_consumption", self.day_consumption),
            ("sensor_fail", self.sensor_fail),
            ("sensor_discrepancy", self.sensor_discrepancy),
        ];
        for (name, value) in entries {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Probability { name, value });
            }
        }
        Ok(())
    }
}

/// Sampling ranges for electrical readings (V, mA) and ambient light (lux).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadingRanges {
    pub voltage: ValueRange,
    pub current: ValueRange,
    pub fail_current: ValueRange,
    pub overcurrent: ValueRange,
    pub theft_current: ValueRange,
    pub day_lux: ValueRange,
    pub night_lux: ValueRange,
}

impl Default for ReadingRanges {
    fn default() -> Self {
        Self {
            voltage: ValueRange::new(11.5, 12.5),
            current: ValueRange::new(40.0, 100.0),
            fail_current: ValueRange::new(0.0, 4.0),
            overcurrent: ValueRange::new(115.0, 150.0),
            theft_current: ValueRange::new(10.0, 30.0),
            day_lux: ValueRange::new(200.0, 1000.0),
            night_lux: ValueRange::new(0.0, 50.0),
        }
    }
}

impl ReadingRanges {
    fn validate(&self) -> std::result::Result<(), ConfigError> {
        self.voltage.validate_closed("voltage")?;
        self.current.validate_closed("current")?;
        self.fail_current.validate_half_open("fail_current")?;
        self.overcurrent.validate_half_open("overcurrent")?;
        self.theft_current.validate_half_open("theft_current")?;
        self.day_lux.validate_half_open("day_lux")?;
        self.night_lux.validate_half_open("night_lux")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// Auto mode switches the relay on below this lux level.
    pub relay_on_below_lux: f64,
    /// Relay-on consumption above this lux level counts as daytime consumption.
    pub day_consumption_above_lux: f64,
    pub day_start_hour: u32,
    pub day_end_hour: u32,
    /// Streak length at which a warning is surfaced.
    pub streak_warning: u32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            relay_on_below_lux: 60.0,
            day_consumption_above_lux: 200.0,
            day_start_hour: 6,
            day_end_hour: 18,
            streak_warning: 3,
        }
    }
}

impl Thresholds {
    fn validate(&self) -> std::result::Result<(), ConfigError> {
        for (name, value) in [
            ("relay_on_below_lux", self.relay_on_below_lux),
            ("day_consumption_above_lux", self.day_consumption_above_lux),
        ] {
            if !value.is_finite() {
                return Err(ConfigError::NonFinite { name, value });
            }
        }
        if self.day_start_hour >= self.day_end_hour || self.day_end_hour > 24 {
            return Err(ConfigError::DayWindow {
                start: self.day_start_hour,
                end: self.day_end_hour,
            });
        }
        if self.streak_warning == 0 {
            return Err(ConfigError::StreakThreshold);
        }
        Ok(())
    }
}

/// Settings for the fleet simulation itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    #[serde(default)]
    pub mode: OperatingMode,
    /// Seed for a reproducible run; OS entropy when absent.
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default = "default_device_ids")]
    pub device_ids: Vec<u32>,
    #[serde(default)]
    pub bank: [bool; 3],
    #[serde(default)]
    pub probabilities: AnomalyProbabilities,
    #[serde(default)]
    pub ranges: ReadingRanges,
    #[serde(default)]
    pub thresholds: Thresholds,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            mode: OperatingMode::default(),
            seed: None,
            device_ids: default_device_ids(),
            bank: [false; 3],
            probabilities: AnomalyProbabilities::default(),
            ranges: ReadingRanges::default(),
            thresholds: Thresholds::default(),
        }
    }
}

impl SimulationConfig {
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.device_ids.len() != FLEET_SIZE {
            return Err(ConfigError::FleetSize {
                expected: FLEET_SIZE,
                actual: self.device_ids.len(),
            });
        }
        let mut seen = HashSet::new();
        for id in &self.device_ids {
            if !seen.insert(*id) {
                return Err(ConfigError::DuplicateDevice(*id));
            }
        }
        self.probabilities.validate()?;
        self.ranges.validate()?;
        self.thresholds.validate()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Directory for the rolling log file; stdout only when absent.
    #[serde(default)]
    pub directory: Option<PathBuf>,
    #[serde(default)]
    pub format: LogFormat,
    #[serde(default)]
    pub file_prefix: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: None,
            format: LogFormat::Pretty,
            file_prefix: None,
        }
    }
}
