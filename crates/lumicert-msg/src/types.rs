//! ---
//! ems_section: "02-messaging-ipc-data-model"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Publish transports and delivery primitives."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
use bytes::Bytes;

use crate::DeliveryGuarantee;

/// Retained availability announcement published on the status subtopic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Simulator is connected and publishing.
    Online,
    /// Simulator shut down gracefully.
    Offline,
}

impl Status {
    /// Payload text expected by subscribers.
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Online => "online",
            Status::Offline => "offline",
        }
    }

    /// Payload bytes for the publish call.
    pub fn payload(&self) -> Bytes {
        Bytes::from_static(self.as_str().as_bytes())
    }
}

/// Receipt returned once a transport has accepted a publish request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ack {
    /// Topic the message was published on.
    pub topic: String,
    /// Number of payload bytes handed to the transport.
    pub bytes: usize,
}

/// Connection state changes observed after `connect` returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// Session (re-)established with the broker.
    Connected,
    /// Session lost; the transport keeps trying to reconnect.
    Disconnected {
        /// Transport supplied reason.
        reason: String,
    },
}

/// Copy of a publish request, as recorded by the in-memory transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    /// Destination topic.
    pub topic: String,
    /// Raw payload.
    pub payload: Bytes,
    /// Requested delivery guarantee.
    pub qos: DeliveryGuarantee,
    /// Whether the broker should retain the message.
    pub retain: bool,
}

impl PublishedMessage {
    /// Payload interpreted as UTF-8, lossy.
    pub fn payload_str(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}
