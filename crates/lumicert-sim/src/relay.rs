//! ---
//! ems_section: "11-simulation"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Relay decision for one tick."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
use lumicert_common::OperatingMode;

/// Relay state for the coming tick.
///
/// Auto mode switches on below `on_below_lux`; manual mode keeps whatever
/// was last commanded.
pub fn decide_relay(mode: OperatingMode, lux: f64, previous: bool, on_below_lux: f64) -> bool {
    match mode {
        OperatingMode::Auto => lux < on_below_lux,
        OperatingMode::Manual => previous,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_follows_threshold() {
        assert!(decide_relay(OperatingMode::Auto, 10.0, false, 60.0));
        assert!(decide_relay(OperatingMode::Auto, 59.9, false, 60.0));
        assert!(!decide_relay(OperatingMode::Auto, 60.0, true, 60.0));
        assert!(!decide_relay(OperatingMode::Auto, 800.0, true, 60.0));
    }

    #[test]
    fn manual_keeps_previous_state() {
        assert!(decide_relay(OperatingMode::Manual, 800.0, true, 60.0));
        assert!(!decide_relay(OperatingMode::Manual, 0.0, false, 60.0));
    }
}
