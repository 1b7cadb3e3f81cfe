//! ---
//! ems_section: "11-simulation"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Time-of-day ambient light model."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
use lumicert_common::{ReadingRanges, Thresholds, ValueRange};

use crate::entropy::Entropy;

/// Samples ambient light from the local hour of day.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AmbientModel {
    pub day_start_hour: u32,
    pub day_end_hour: u32,
    pub day_lux: ValueRange,
    pub night_lux: ValueRange,
}

impl Default for AmbientModel {
    fn default() -> Self {
        Self::from_config(&ReadingRanges::default(), &Thresholds::default())
    }
}

impl AmbientModel {
    pub fn from_config(ranges: &ReadingRanges, thresholds: &Thresholds) -> Self {
        Self {
            day_start_hour: thresholds.day_start_hour,
            day_end_hour: thresholds.day_end_hour,
            day_lux: ranges.day_lux,
            night_lux: ranges.night_lux,
        }
    }

    /// Day window is `[day_start_hour, day_end_hour)`.
    pub fn is_day(&self, hour: u32) -> bool {
        (self.day_start_hour..self.day_end_hour).contains(&hour)
    }

    /// One uniform draw from the day or night band.
    pub fn lux<E: Entropy + ?Sized>(&self, hour: u32, entropy: &mut E) -> f64 {
        let band = if self.is_day(hour) {
            self.day_lux
        } else {
            self.night_lux
        };
        entropy.between(band)
    }
}
