//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Shared configuration and logging primitives."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
//! Shared primitives for the LumiCert simulator workspace.
//! This crate exposes configuration loading and validation together with the
//! tracing bootstrap consumed by the daemon.

pub mod config;
pub mod error;
pub mod logging;

pub use config::{
    AnomalyProbabilities, AppConfig, BrokerConfig, LoadedAppConfig, LoggingConfig, OperatingMode,
    ReadingRanges, SimulationConfig, TelemetryConfig, Thresholds, ValueRange, FLEET_SIZE,
};
pub use error::ConfigError;
pub use logging::{init_tracing, LogFormat};
