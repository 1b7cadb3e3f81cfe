//! ---
//! ems_section: "02-messaging-ipc-data-model"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Publish transports and delivery primitives."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
use crate::MessagingError;

/// Delivery guarantees understood by the publish capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeliveryGuarantee {
    /// QoS 0: fire and forget.
    AtMostOnce,
    /// QoS 1: retried by the broker session until acknowledged.
    AtLeastOnce,
    /// QoS 2: four-way handshake, no duplicates.
    ExactlyOnce,
}

impl DeliveryGuarantee {
    /// Numeric QoS level as carried on the wire.
    pub fn level(&self) -> u8 {
        match self {
            DeliveryGuarantee::AtMostOnce => 0,
            DeliveryGuarantee::AtLeastOnce => 1,
            DeliveryGuarantee::ExactlyOnce => 2,
        }
    }
}

impl TryFrom<u8> for DeliveryGuarantee {
    type Error = MessagingError;

    fn try_from(level: u8) -> Result<Self, Self::Error> {
        match level {
            0 => Ok(DeliveryGuarantee::AtMostOnce),
            1 => Ok(DeliveryGuarantee::AtLeastOnce),
            2 => Ok(DeliveryGuarantee::ExactlyOnce),
            other => Err(MessagingError::InvalidQos(other)),
        }
    }
}

impl From<DeliveryGuarantee> for u8 {
    fn from(value: DeliveryGuarantee) -> Self {
        value.level()
    }
}

impl From<DeliveryGuarantee> for rumqttc::QoS {
    fn from(value: DeliveryGuarantee) -> Self {
        match value {
            DeliveryGuarantee::AtMostOnce => rumqttc::QoS::AtMostOnce,
            DeliveryGuarantee::AtLeastOnce => rumqttc::QoS::AtLeastOnce,
            DeliveryGuarantee::ExactlyOnce => rumqttc::QoS::ExactlyOnce,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_map_both_ways() {
        for level in 0..=2u8 {
            let guarantee = DeliveryGuarantee::try_from(level).expect("valid level");
            assert_eq!(guarantee.level(), level);
        }
    }

    #[test]
    fn level_three_is_rejected() {
        assert!(matches!(
            DeliveryGuarantee::try_from(3),
            Err(MessagingError::InvalidQos(3))
        ));
    }

    #[test]
    fn maps_onto_mqtt_qos() {
        assert_eq!(
            rumqttc::QoS::from(DeliveryGuarantee::AtLeastOnce),
            rumqttc::QoS::AtLeastOnce
        );
    }
}
