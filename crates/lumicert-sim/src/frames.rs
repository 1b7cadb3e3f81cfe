//! ---
//! ems_section: "11-simulation"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Wire records emitted for every simulated tick."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
use chrono::{DateTime, FixedOffset};
use lumicert_common::OperatingMode;
use serde::{Deserialize, Serialize};

/// Local timestamp layout used by `ts_iso`.
pub const TS_ISO_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Round half away from zero to `decimals` places.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Telemetry snapshot of one luminaire for one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LuminaireTelemetry {
    pub id: u32,
    pub name: String,
    pub relay: bool,
    /// Health placeholder; always `true`.
    pub ok: bool,
    #[serde(rename = "V")]
    pub voltage: f64,
    #[serde(rename = "mA")]
    pub current_ma: f64,
    #[serde(rename = "W")]
    pub power_w: f64,
    pub fail_low_current: bool,
    pub theft: bool,
    pub overcurrent: bool,
}

impl LuminaireTelemetry {
    /// Compact console form, e.g. `L4:ON [FAIL,OVER]`.
    pub fn summary(&self) -> String {
        let state = if self.relay { "ON" } else { "OFF" };
        let flags: Vec<&str> = [
            (self.fail_low_current, "FAIL"),
            (self.overcurrent, "OVER"),
            (self.theft, "THEFT"),
        ]
        .into_iter()
        .filter_map(|(set, label)| set.then_some(label))
        .collect();
        if flags.is_empty() {
            format!("L{}:{}", self.id, state)
        } else {
            format!("L{}:{} [{}]", self.id, state, flags.join(","))
        }
    }
}

/// Fleet-level light sensor alarms.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alarms {
    pub bh1_fail: bool,
    pub bh_discrep: bool,
}

/// Auxiliary contactor bank flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankStates {
    #[serde(rename = "C1")]
    pub c1: bool,
    #[serde(rename = "C2")]
    pub c2: bool,
    #[serde(rename = "C3")]
    pub c3: bool,
}

impl From<[bool; 3]> for BankStates {
    fn from([c1, c2, c3]: [bool; 3]) -> Self {
        Self { c1, c2, c3 }
    }
}

impl From<BankStates> for [bool; 3] {
    fn from(bank: BankStates) -> Self {
        [bank.c1, bank.c2, bank.c3]
    }
}

/// Complete envelope published once per tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FleetPayload {
    /// Epoch seconds.
    pub ts: i64,
    /// Local wall-clock time of the same instant as `ts`.
    pub ts_iso: String,
    pub modo: OperatingMode,
    pub lux: f64,
    pub alarms: Alarms,
    pub bank: BankStates,
    pub luminarias: Vec<LuminaireTelemetry>,
}

impl FleetPayload {
    /// Both timestamps derived from `now`.
    pub fn timestamps(now: &DateTime<FixedOffset>) -> (i64, String) {
        (now.timestamp(), now.format(TS_ISO_FORMAT).to_string())
    }

    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    pub fn luminaire(&self, id: u32) -> Option<&LuminaireTelemetry> {
        self.luminarias.iter().find(|record| record.id == id)
    }

    /// One-line tick summary for the console log.
    pub fn summary_line(&self) -> String {
        let devices: Vec<String> = self.luminarias.iter().map(|l| l.summary()).collect();
        format!("lux={:.1} {}", self.lux, devices.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::Value;

    fn record(id: u32) -> LuminaireTelemetry {
        LuminaireTelemetry {
            id,
            name: format!("Luminaria {id}"),
            relay: true,
            ok: true,
            voltage: 12.04,
            current_ma: 71.3,
            power_w: 0.858,
            fail_low_current: false,
            theft: false,
            overcurrent: false,
        }
    }

    fn payload() -> FleetPayload {
        let now = FixedOffset::east_opt(-5 * 3600)
            .expect("offset")
            .with_ymd_and_hms(2024, 3, 9, 23, 15, 0)
            .single()
            .expect("instant");
        let (ts, ts_iso) = FleetPayload::timestamps(&now);
        FleetPayload {
            ts,
            ts_iso,
            modo: OperatingMode::Auto,
            lux: 12.3,
            alarms: Alarms::default(),
            bank: BankStates::from([true, false, false]),
            luminarias: vec![record(4), record(5), record(6)],
        }
    }

    #[test]
    fn rounding_matches_wire_precision() {
        assert_eq!(round_to(12.345_67, 2), 12.35);
        assert_eq!(round_to(71.26, 1), 71.3);
        assert_eq!(round_to(0.858_449, 3), 0.858);
        assert_eq!(round_to(0.0, 3), 0.0);
    }

    #[test]
    fn timestamps_share_one_instant() {
        let payload = payload();
        assert_eq!(payload.ts_iso, "2024-03-09T23:15:00");
        assert_eq!(payload.ts, 1_710_044_100);
    }

    #[test]
    fn wire_field_names_are_stable() {
        let json: Value = serde_json::from_slice(&payload().to_json().expect("encode")).expect("json");
        assert_eq!(json["modo"], "AUTO");
        assert_eq!(json["bank"]["C1"], true);
        assert_eq!(json["alarms"]["bh_discrep"], false);
        let first = &json["luminarias"][0];
        assert_eq!(first["name"], "Luminaria 4");
        assert_eq!(first["V"], 12.04);
        assert_eq!(first["mA"], 71.3);
        assert_eq!(first["W"], 0.858);
        for key in ["id", "relay", "ok", "fail_low_current", "theft", "overcurrent"] {
            assert!(first.get(key).is_some(), "missing {key}");
        }
        assert_eq!(json["luminarias"].as_array().map(Vec::len), Some(3));
    }

    #[test]
    fn summary_lists_flags() {
        let mut payload = payload();
        payload.luminarias[0].fail_low_current = true;
        payload.luminarias[0].overcurrent = true;
        payload.luminarias[2].relay = false;
        payload.luminarias[2].theft = true;
        assert_eq!(
            payload.summary_line(),
            "lux=12.3 L4:ON [FAIL,OVER] L5:ON L6:OFF [THEFT]"
        );
    }
}
