//! ---
//! ems_section: "11-simulation"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Per-luminaire state and the fixed fleet table."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
use lumicert_common::{ConfigError, SimulationConfig};
use serde::Serialize;

/// Anomaly conditions that track consecutive occurrences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StreakKind {
    Overcurrent,
    Fail,
    DayConsumption,
}

impl StreakKind {
    pub const ALL: [StreakKind; 3] = [
        StreakKind::Overcurrent,
        StreakKind::Fail,
        StreakKind::DayConsumption,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StreakKind::Overcurrent => "overcurrent",
            StreakKind::Fail => "fail",
            StreakKind::DayConsumption => "day_consumption",
        }
    }
}

/// Consecutive-tick counters for one device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Streaks {
    pub overcurrent: u32,
    pub fail: u32,
    pub day_consumption: u32,
}

impl Streaks {
    pub fn get(&self, kind: StreakKind) -> u32 {
        match kind {
            StreakKind::Overcurrent => self.overcurrent,
            StreakKind::Fail => self.fail,
            StreakKind::DayConsumption => self.day_consumption,
        }
    }

    fn slot_mut(&mut self, kind: StreakKind) -> &mut u32 {
        match kind {
            StreakKind::Overcurrent => &mut self.overcurrent,
            StreakKind::Fail => &mut self.fail,
            StreakKind::DayConsumption => &mut self.day_consumption,
        }
    }

    /// Extend the streak by one tick.
    pub fn bump(&mut self, kind: StreakKind) {
        let counter = self.slot_mut(kind);
        *counter = counter.saturating_add(1);
    }

    /// Break the streak.
    pub fn reset(&mut self, kind: StreakKind) {
        *self.slot_mut(kind) = 0;
    }
}

/// Mutable state of one simulated luminaire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    id: u32,
    slot: usize,
    relay_on: bool,
    streaks: Streaks,
}

impl Device {
    pub fn new(id: u32, slot: usize) -> Self {
        Self {
            id,
            slot,
            relay_on: false,
            streaks: Streaks::default(),
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn relay_on(&self) -> bool {
        self.relay_on
    }

    pub fn set_relay(&mut self, on: bool) {
        self.relay_on = on;
    }

    pub fn streaks(&self) -> &Streaks {
        &self.streaks
    }

    pub fn streaks_mut(&mut self) -> &mut Streaks {
        &mut self.streaks
    }

    /// Display name carried in the telemetry record.
    pub fn name(&self) -> String {
        format!("Luminaria {}", self.id)
    }
}

/// Advisory raised when a streak reaches the configured threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StreakWarning {
    pub device_id: u32,
    pub kind: StreakKind,
    pub length: u32,
}

/// Ordered, fixed-size table of devices.
///
/// The slot of a device is its position in the configured id list and never
/// changes after construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fleet {
    devices: Vec<Device>,
}

impl Fleet {
    /// Build the fleet after validating the simulation settings.
    pub fn from_config(config: &SimulationConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::with_ids(&config.device_ids))
    }

    fn with_ids(ids: &[u32]) -> Self {
        Self {
            devices: ids
                .iter()
                .enumerate()
                .map(|(slot, id)| Device::new(*id, slot))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn slot_of(&self, id: u32) -> Option<usize> {
        self.devices.iter().position(|device| device.id == id)
    }

    pub fn device(&self, id: u32) -> Option<&Device> {
        self.devices.iter().find(|device| device.id == id)
    }

    pub fn device_mut(&mut self, id: u32) -> Option<&mut Device> {
        self.devices.iter_mut().find(|device| device.id == id)
    }

    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    pub fn devices_mut(&mut self) -> &mut [Device] {
        &mut self.devices
    }

    /// Every streak at or above `threshold`, in slot order.
    pub fn streak_warnings(&self, threshold: u32) -> Vec<StreakWarning> {
        self.devices
            .iter()
            .flat_map(|device| {
                StreakKind::ALL.into_iter().filter_map(move |kind| {
                    let length = device.streaks.get(kind);
                    (length >= threshold).then_some(StreakWarning {
                        device_id: device.id,
                        kind,
                        length,
                    })
                })
            })
            .collect()
    }
}
