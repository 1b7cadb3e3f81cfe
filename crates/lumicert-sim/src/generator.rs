//! ---
//! ems_section: "11-simulation"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Per-device reading generation and fleet payload assembly."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
use chrono::{DateTime, FixedOffset, Timelike};
use lumicert_common::{
    AnomalyProbabilities, ConfigError, OperatingMode, ReadingRanges, SimulationConfig,
};
use tracing::debug;

use crate::ambient::AmbientModel;
use crate::anomaly::AnomalyInjector;
use crate::device::{Device, Fleet, StreakWarning};
use crate::electrical::{baseline, ElectricalReading};
use crate::entropy::Entropy;
use crate::frames::{round_to, Alarms, BankStates, FleetPayload, LuminaireTelemetry};
use crate::relay::decide_relay;

/// Produces one device's telemetry record per tick.
#[derive(Debug, Clone)]
pub struct LuminaireGenerator {
    ranges: ReadingRanges,
    relay_on_below_lux: f64,
    injector: AnomalyInjector,
}

impl LuminaireGenerator {
    pub fn from_config(config: &SimulationConfig) -> Self {
        Self {
            ranges: config.ranges,
            relay_on_below_lux: config.thresholds.relay_on_below_lux,
            injector: AnomalyInjector::from_config(config),
        }
    }

    /// Update the relay, draw the baseline, run the anomaly checks and round
    /// the final reading for the wire.
    pub fn generate<E: Entropy + ?Sized>(
        &self,
        device: &mut Device,
        lux: f64,
        mode: OperatingMode,
        entropy: &mut E,
    ) -> LuminaireTelemetry {
        let relay_on = decide_relay(mode, lux, device.relay_on(), self.relay_on_below_lux);
        device.set_relay(relay_on);

        let base = baseline(relay_on, &self.ranges, entropy);
        let outcome =
            self.injector
                .inject(device.streaks_mut(), relay_on, lux, base.current_ma, entropy);
        let reading = ElectricalReading {
            voltage: base.voltage,
            current_ma: outcome.current_ma,
        };

        LuminaireTelemetry {
            id: device.id(),
            name: device.name(),
            relay: relay_on,
            ok: true,
            voltage: round_to(reading.voltage, 2),
            current_ma: round_to(reading.current_ma, 1),
            power_w: round_to(reading.power_w(), 3),
            fail_low_current: outcome.flags.fail_low_current,
            theft: outcome.flags.theft,
            overcurrent: outcome.flags.overcurrent,
        }
    }
}

/// Single-writer owner of the fleet state; produces one [`FleetPayload`] per tick.
#[derive(Debug, Clone)]
pub struct FleetSimulator {
    fleet: Fleet,
    mode: OperatingMode,
    bank: BankStates,
    ambient: AmbientModel,
    generator: LuminaireGenerator,
    probabilities: AnomalyProbabilities,
    streak_threshold: u32,
}

impl FleetSimulator {
    /// Validate the settings and create the fleet with every relay open.
    pub fn new(config: &SimulationConfig) -> Result<Self, ConfigError> {
        let fleet = Fleet::from_config(config)?;
        Ok(Self {
            fleet,
            mode: config.mode,
            bank: BankStates::from(config.bank),
            ambient: AmbientModel::from_config(&config.ranges, &config.thresholds),
            generator: LuminaireGenerator::from_config(config),
            probabilities: config.probabilities,
            streak_threshold: config.thresholds.streak_warning,
        })
    }

    /// Produce the payload for the tick at `now`.
    ///
    /// Draw order: lux once, then each device in slot order, then the two
    /// fleet alarms.
    pub fn assemble<E: Entropy + ?Sized>(
        &mut self,
        now: &DateTime<FixedOffset>,
        entropy: &mut E,
    ) -> FleetPayload {
        let lux = self.ambient.lux(now.hour(), entropy);
        let mode = self.mode;
        let mut luminarias = Vec::with_capacity(self.fleet.len());
        for device in self.fleet.devices_mut() {
            luminarias.push(self.generator.generate(device, lux, mode, entropy));
        }
        let alarms = Alarms {
            bh1_fail: entropy.chance(self.probabilities.sensor_fail),
            bh_discrep: entropy.chance(self.probabilities.sensor_discrepancy),
        };
        let (ts, ts_iso) = FleetPayload::timestamps(now);
        debug!(ts, lux, mode = mode.as_str(), "assembled fleet payload");

        FleetPayload {
            ts,
            ts_iso,
            modo: mode,
            // rounded after sampling, so the band's open upper edge can appear
            lux: round_to(lux, 1),
            alarms,
            bank: self.bank,
            luminarias,
        }
    }

    pub fn fleet(&self) -> &Fleet {
        &self.fleet
    }

    pub fn mode(&self) -> OperatingMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: OperatingMode) {
        self.mode = mode;
    }

    /// Command a relay. Only sticks in manual mode; auto mode recomputes it
    /// on the next tick. Returns `false` for an unknown id.
    pub fn set_relay(&mut self, id: u32, on: bool) -> bool {
        match self.fleet.device_mut(id) {
            Some(device) => {
                device.set_relay(on);
                true
            }
            None => false,
        }
    }

    pub fn bank(&self) -> BankStates {
        self.bank
    }

    /// Set bank flag `index` (0-based). Returns `false` when out of range.
    pub fn set_bank(&mut self, index: usize, on: bool) -> bool {
        let mut flags: [bool; 3] = self.bank.into();
        match flags.get_mut(index) {
            Some(flag) => {
                *flag = on;
                self.bank = BankStates::from(flags);
                true
            }
            None => false,
        }
    }

    pub fn streak_threshold(&self) -> u32 {
        self.streak_threshold
    }

    /// Streaks at or above the configured warning threshold.
    pub fn streak_warnings(&self) -> Vec<StreakWarning> {
        self.fleet.streak_warnings(self.streak_threshold)
    }
}
