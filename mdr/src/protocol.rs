//! Wire formats and domain constants.
//!
//! Everything on the wire is big-endian. Bitfields are packed and unpacked
//! with explicit shifts and masks; nothing here relies on compiler layout.

pub mod group;
pub mod itm;
pub mod mpls;
pub mod timing;

/// Largest datagram any endpoint will receive.
pub const MAX_UDP_PACKET_SIZE: usize = 65535;

/// Payload bytes in a fixed-size ITM (total ITM size is `5 + 43 = 48`).
pub const FIXED_ITM_PAYLOAD_SIZE: usize = 43;

/// Smallest VITM payload. The first two bytes are the ITE common header.
pub const MIN_VITM_PAYLOAD_SIZE: usize = 3;

/// Largest VITM payload (bus MTU minus MPLS and ITM framing).
pub const MAX_VITM_PAYLOAD_SIZE: usize = 1467;

/// Payload type values carried in the ITM header `plt` field.
pub mod payload_type {
    /// Mission data, voice.
    pub const MDV: u8 = 0;
    /// Mission data, data.
    pub const MDD: u8 = 1;
    /// Mission control data.
    pub const MCD_ISU: u8 = 3;
}

/// MPLS QoS code points used on the uplink framing path.
pub mod qos {
    /// Operations/administration/maintenance traffic (VITM control default).
    pub const OAM: u8 = 7;
}

/// True for the payload types that carry mission data (0, 1 and 3).
#[must_use]
pub const fn is_mission_data_payload(plt: u8) -> bool {
    matches!(
        plt,
        payload_type::MDV | payload_type::MDD | payload_type::MCD_ISU
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mission_data_payload_set() {
        let mission: Vec<u8> = (0u8..8).filter(|&p| is_mission_data_payload(p)).collect();
        assert_eq!(mission, vec![0, 1, 3]);
    }
}
