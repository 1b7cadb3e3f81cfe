//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Shared configuration and logging primitives."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---

/// Validation failures raised before the simulator is allowed to tick.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// Probability outside of `[0, 1]`.
    #[error("probability `{name}` must lie within [0, 1], got {value}")]
    Probability { name: &'static str, value: f64 },
    /// Range that would be empty or inverted when sampled.
    #[error("range `{name}` is empty or inverted: [{min}, {max}]")]
    Range {
        name: &'static str,
        min: f64,
        max: f64,
    },
    /// NaN or infinite numeric setting.
    #[error("value `{name}` must be finite, got {value}")]
    NonFinite { name: &'static str, value: f64 },
    #[error("fleet must contain exactly {expected} devices, got {actual}")]
    FleetSize { expected: usize, actual: usize },
    #[error("device id {0} is declared more than once")]
    DuplicateDevice(u32),
    #[error("tick interval must be greater than zero")]
    ZeroInterval,
    #[error("invalid topic `{0}`")]
    Topic(String),
    #[error("day window must satisfy start < end <= 24, got {start}..{end}")]
    DayWindow { start: u32, end: u32 },
    #[error("streak warning threshold must be at least 1")]
    StreakThreshold,
    #[error("invalid broker settings: {0}")]
    Broker(String),
}
