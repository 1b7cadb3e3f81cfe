//! ---
//! ems_section: "02-messaging-ipc-data-model"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Publish transports and delivery primitives."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
#![warn(missing_docs)]
//! Messaging primitives for the LumiCert simulator.
//!
//! The simulation core only needs a `publish(topic, bytes, qos, retain)`
//! capability plus a connect/disconnect lifecycle; [`Transport`] captures that
//! seam. [`MqttTransport`] talks to a real broker, [`InMemoryTransport`] records
//! traffic for tests.

pub mod mqtt;
pub mod qos;
pub mod transport;
pub mod types;

/// Shared result type for messaging operations.
pub type Result<T> = std::result::Result<T, MessagingError>;

/// Failures surfaced by transports.
#[derive(Debug, thiserror::Error)]
pub enum MessagingError {
    /// The broker could not be reached or refused the session.
    #[error("connection failed: {0}")]
    Connection(String),
    /// The transport did not accept a publish request.
    #[error("publish to `{topic}` failed: {reason}")]
    Publish {
        /// Topic the message was addressed to.
        topic: String,
        /// Transport supplied failure description.
        reason: String,
    },
    /// A publish or disconnect was attempted before `connect`.
    #[error("transport is not connected")]
    NotConnected,
    /// QoS level outside of `{0, 1, 2}`.
    #[error("invalid qos level {0}")]
    InvalidQos(u8),
    /// Wrapper for JSON serialization problems.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

pub use mqtt::MqttTransport;
pub use qos::DeliveryGuarantee;
pub use transport::{InMemoryTransport, Transport};
pub use types::{Ack, LinkEvent, PublishedMessage, Status};
