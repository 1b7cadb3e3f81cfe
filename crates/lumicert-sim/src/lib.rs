//! ---
//! ems_section: "11-simulation"
//! ems_subsection: "01-bootstrap"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Simulation engine module exports and shared types."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
//! Luminaire fleet simulation for the LumiCert telemetry generator.
//!
//! Each tick the [`FleetSimulator`] samples ambient light once, decides every
//! device's relay state, draws baseline electrical readings, runs the ordered
//! anomaly checks and assembles a [`FleetPayload`]. All randomness flows
//! through an explicit [`Entropy`] handle so tests can script every draw.

pub mod ambient;
pub mod anomaly;
pub mod device;
pub mod electrical;
pub mod entropy;
pub mod frames;
pub mod generator;
pub mod relay;

pub use ambient::AmbientModel;
pub use anomaly::{AnomalyFlags, AnomalyInjector, AnomalyKind, AnomalyOutcome, Verdict};
pub use device::{Device, Fleet, StreakKind, StreakWarning, Streaks};
pub use electrical::{baseline, ElectricalReading};
pub use entropy::{Entropy, RngEntropy, ScriptedEntropy};
pub use frames::{Alarms, BankStates, FleetPayload, LuminaireTelemetry};
pub use generator::{FleetSimulator, LuminaireGenerator};
pub use lumicert_common::OperatingMode;
pub use relay::decide_relay;
