//! ---
//! ems_section: "11-simulation"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Ordered probabilistic anomaly checks and streak bookkeeping."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
//! Anomaly injection.
//!
//! Every tick each [`AnomalyKind`] is evaluated once, in [`AnomalyKind::PRECEDENCE`]
//! order, and yields a [`Verdict`]. A check that fires may override the working
//! current; later checks win, so overcurrent masks a failure reading in the same
//! tick while both streaks still advance.

use lumicert_common::{AnomalyProbabilities, ReadingRanges, SimulationConfig};
use serde::Serialize;
use tracing::trace;

use crate::device::{StreakKind, Streaks};
use crate::entropy::Entropy;

/// Simulated abnormal condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    /// Relay closed but the lamp draws almost nothing.
    Fail,
    /// Relay closed and the lamp draws well above nominal.
    Overcurrent,
    /// Relay open yet current flows.
    Theft,
    /// Relay closed in full daylight.
    DayConsumption,
}

impl AnomalyKind {
    /// Evaluation order. A later override replaces an earlier one.
    pub const PRECEDENCE: [AnomalyKind; 4] = [
        AnomalyKind::Fail,
        AnomalyKind::Overcurrent,
        AnomalyKind::Theft,
        AnomalyKind::DayConsumption,
    ];

    /// Streak counter tracking this anomaly, if any.
    pub fn streak(&self) -> Option<StreakKind> {
        match self {
            AnomalyKind::Fail => Some(StreakKind::Fail),
            AnomalyKind::Overcurrent => Some(StreakKind::Overcurrent),
            AnomalyKind::Theft => None,
            AnomalyKind::DayConsumption => Some(StreakKind::DayConsumption),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AnomalyKind::Fail => "fail",
            AnomalyKind::Overcurrent => "overcurrent",
            AnomalyKind::Theft => "theft",
            AnomalyKind::DayConsumption => "day_consumption",
        }
    }
}

/// Result of one anomaly check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Verdict {
    /// Preconditions not met; nothing drawn and the streak is left untouched.
    Inapplicable,
    /// Evaluated and not reproduced; the streak resets.
    Clear,
    /// Reproduced this tick; the streak advances and `current_ma`, when set,
    /// replaces the working current.
    Fired { current_ma: Option<f64> },
}

/// Transient per-tick detections carried in the telemetry record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AnomalyFlags {
    pub fail_low_current: bool,
    pub theft: bool,
    pub overcurrent: bool,
}

/// Final current and flags after all checks ran.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnomalyOutcome {
    pub current_ma: f64,
    pub flags: AnomalyFlags,
    /// Whether the daytime consumption check fired; only visible via streaks
    /// on the wire.
    pub day_consumption: bool,
}

/// Applies the configured anomaly probabilities to one device reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnomalyInjector {
    probabilities: AnomalyProbabilities,
    ranges: ReadingRanges,
    day_consumption_above_lux: f64,
}

impl AnomalyInjector {
    pub fn new(
        probabilities: AnomalyProbabilities,
        ranges: ReadingRanges,
        day_consumption_above_lux: f64,
    ) -> Self {
        Self {
            probabilities,
            ranges,
            day_consumption_above_lux,
        }
    }

    pub fn from_config(config: &SimulationConfig) -> Self {
        Self::new(
            config.probabilities,
            config.ranges,
            config.thresholds.day_consumption_above_lux,
        )
    }

    /// Evaluate one check. Draws the roll first and the override value only
    /// when the roll succeeds.
    pub fn check<E: Entropy + ?Sized>(
        &self,
        kind: AnomalyKind,
        relay_on: bool,
        lux: f64,
        entropy: &mut E,
    ) -> Verdict {
        match kind {
            AnomalyKind::Fail => {
                if !relay_on {
                    return Verdict::Inapplicable;
                }
                self.roll(self.probabilities.fail, entropy, |e| {
                    Some(e.between(self.ranges.fail_current))
                })
            }
            AnomalyKind::Overcurrent => {
                if !relay_on {
                    return Verdict::Inapplicable;
                }
                self.roll(self.probabilities.overcurrent, entropy, |e| {
                    Some(e.between(self.ranges.overcurrent))
                })
            }
            AnomalyKind::Theft => {
                if relay_on {
                    return Verdict::Inapplicable;
                }
                self.roll(self.probabilities.theft, entropy, |e| {
                    Some(e.between(self.ranges.theft_current))
                })
            }
            AnomalyKind::DayConsumption => {
                if !relay_on || lux <= self.day_consumption_above_lux {
                    return Verdict::Clear;
                }
                self.roll(self.probabilities.day_consumption, entropy, |_| None)
            }
        }
    }

    fn roll<E: Entropy + ?Sized>(
        &self,
        probability: f64,
        entropy: &mut E,
        value: impl FnOnce(&mut E) -> Option<f64>,
    ) -> Verdict {
        if entropy.chance(probability) {
            Verdict::Fired {
                current_ma: value(entropy),
            }
        } else {
            Verdict::Clear
        }
    }

    /// Run every check against one device and update its streaks.
    pub fn inject<E: Entropy + ?Sized>(
        &self,
        streaks: &mut Streaks,
        relay_on: bool,
        lux: f64,
        baseline_current_ma: f64,
        entropy: &mut E,
    ) -> AnomalyOutcome {
        let mut outcome = AnomalyOutcome {
            current_ma: baseline_current_ma,
            flags: AnomalyFlags::default(),
            day_consumption: false,
        };

        for kind in AnomalyKind::PRECEDENCE {
            match self.check(kind, relay_on, lux, entropy) {
                Verdict::Inapplicable => {}
                Verdict::Clear => {
                    if let Some(streak) = kind.streak() {
                        streaks.reset(streak);
                    }
                }
                Verdict::Fired { current_ma } => {
                    trace!(anomaly = kind.as_str(), ?current_ma, "anomaly fired");
                    if let Some(current_ma) = current_ma {
                        outcome.current_ma = current_ma;
                    }
                    if let Some(streak) = kind.streak() {
                        streaks.bump(streak);
                    }
                    match kind {
                        AnomalyKind::Fail => outcome.flags.fail_low_current = true,
                        AnomalyKind::Overcurrent => outcome.flags.overcurrent = true,
                        AnomalyKind::Theft => outcome.flags.theft = true,
                        AnomalyKind::DayConsumption => outcome.day_consumption = true,
                    }
                }
            }
        }
        outcome
    }
}

impl Default for AnomalyInjector {
    fn default() -> Self {
        Self::from_config(&SimulationConfig::default())
    }
}
