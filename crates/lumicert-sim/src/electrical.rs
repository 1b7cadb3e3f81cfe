//! ---
//! ems_section: "11-simulation"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Baseline electrical readings."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
use lumicert_common::ReadingRanges;

use crate::entropy::Entropy;

/// Voltage (V) and current (mA) of one luminaire.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ElectricalReading {
    pub voltage: f64,
    pub current_ma: f64,
}

impl ElectricalReading {
    pub const OFF: ElectricalReading = ElectricalReading {
        voltage: 0.0,
        current_ma: 0.0,
    };

    /// Power in watts.
    pub fn power_w(&self) -> f64 {
        self.voltage * self.current_ma / 1000.0
    }
}

/// Baseline reading before anomalies are applied.
///
/// An open relay reads exactly zero and consumes no entropy. A closed relay
/// draws voltage first, then current, both from closed ranges.
pub fn baseline<E: Entropy + ?Sized>(
    relay_on: bool,
    ranges: &ReadingRanges,
    entropy: &mut E,
) -> ElectricalReading {
    if !relay_on {
        return ElectricalReading::OFF;
    }
    let voltage = entropy.within(ranges.voltage);
    let current_ma = entropy.within(ranges.current);
    ElectricalReading {
        voltage,
        current_ma,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entropy::ScriptedEntropy;

    #[test]
    fn open_relay_reads_zero_without_drawing() {
        let mut entropy = ScriptedEntropy::constant(0.3);
        let reading = baseline(false, &ReadingRanges::default(), &mut entropy);
        assert_eq!(reading, ElectricalReading::OFF);
        assert_eq!(reading.power_w(), 0.0);
        assert_eq!(entropy.consumed(), 0);
    }

    #[test]
    fn closed_relay_draws_voltage_then_current() {
        let mut entropy = ScriptedEntropy::new([0.5, 0.5]);
        let reading = baseline(true, &ReadingRanges::default(), &mut entropy);
        assert_eq!(reading.voltage, 12.0);
        assert_eq!(reading.current_ma, 70.0);
        assert!((reading.power_w() - 0.84).abs() < 1e-12);
        assert_eq!(entropy.consumed(), 2);
    }

    #[test]
    fn closed_range_includes_upper_bound() {
        let mut entropy = ScriptedEntropy::constant(1.0);
        let reading = baseline(true, &ReadingRanges::default(), &mut entropy);
        assert_eq!(reading.voltage, 12.5);
        assert_eq!(reading.current_ma, 100.0);
    }
}
