//! ITM header parsing.
//!
//! An ITM starts with a 5-byte header. Byte 0 is a big-endian bitfield
//! (`ci:1, plt:3, hpc:4`), byte 1 is the destination node id, and the
//! trailing three bytes take one of three layouts selected by the payload
//! type. The original hardware overlays these layouts in a union; here they
//! are a tagged variant produced by a bounds-checked parse.

use crate::protocol::is_mission_data_payload;

/// Size of the common ITM header in bytes.
pub const HEADER_SIZE: usize = 5;

/// Parsed 5-byte ITM header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItmHeader {
    /// Congestion-indicator bit, repurposed as the VITM marker.
    pub vitm: bool,
    /// Payload type (`plt`, 0..=7).
    pub payload_type: u8,
    /// Hop count. Opaque to the routing core.
    pub hop_count: u8,
    /// Destination node id.
    pub dest_node: u8,
    /// Payload-type-specific trailing bytes.
    pub trailer: ItmTrailer,
}

/// The final three header bytes, discriminated on the payload type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItmTrailer {
    /// Payload types 0, 1 and 3: routing channel number plus checksum.
    MissionData { lcn: [u8; 2], checksum: u8 },
    /// Payload types 2, 4, 6 and 7: SAPI, source node, checksum.
    Control {
        sapi: u8,
        source_node: u8,
        checksum: u8,
    },
    /// Payload type 5: software version word, source node, checksum.
    Status {
        parity: bool,
        online_svarc: u8,
        software_version: u8,
        source_node: u8,
        checksum: u8,
    },
}

impl ItmHeader {
    /// Parses the header from the first five bytes of `buf`.
    ///
    /// Returns `None` when `buf` is shorter than the header.
    #[must_use]
    pub fn parse(buf: &[u8]) -> Option<Self> {
        if buf.len() < HEADER_SIZE {
            return None;
        }

        let b0 = buf[0];
        let vitm = (b0 >> 7) & 0x01 == 1;
        let payload_type = (b0 >> 4) & 0x07;
        let hop_count = b0 & 0x0f;
        let dest_node = buf[1];

        let trailer = match payload_type {
            0 | 1 | 3 => ItmTrailer::MissionData {
                lcn: [buf[2], buf[3]],
                checksum: buf[4],
            },
            5 => ItmTrailer::Status {
                parity: (buf[2] >> 7) & 0x01 == 1,
                online_svarc: (buf[2] >> 4) & 0x07,
                software_version: buf[2] & 0x0f,
                source_node: buf[3],
                checksum: buf[4],
            },
            _ => ItmTrailer::Control {
                sapi: buf[2] & 0x07,
                source_node: buf[3],
                checksum: buf[4],
            },
        };

        Some(Self {
            vitm,
            payload_type,
            hop_count,
            dest_node,
            trailer,
        })
    }

    /// True when the `ci` bit marks a variable-size ITM.
    #[must_use]
    pub const fn is_vitm(&self) -> bool {
        self.vitm
    }

    /// True when the payload type carries mission data.
    #[must_use]
    pub const fn is_mission_data(&self) -> bool {
        is_mission_data_payload(self.payload_type)
    }
}

/// Source node id of an ITM that originated at the ground simulator.
///
/// Mission-data ITMs arriving from the ground carry the source node where
/// the common layout keeps the header checksum (byte 4). Only the 5-byte
/// minimum is guaranteed by the caller's size check, so for a short-but-valid
/// buffer this reads the last header byte regardless of what the sender put
/// there. That mirrors the deployed behaviour.
#[must_use]
pub fn ground_source_node(itm: &[u8]) -> u8 {
    itm[HEADER_SIZE - 1]
}

/// ITE common header: the first two bytes of every VITM payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IteHeader {
    /// Data/control bit; `true` marks an ITE data message.
    pub data_message: bool,
    /// Source node id.
    pub source_node: u8,
}

impl IteHeader {
    /// Size of the ITE common header in bytes.
    pub const SIZE: usize = 2;

    /// Parses the ITE common header from the first two payload bytes.
    #[must_use]
    pub fn parse(payload: &[u8]) -> Option<Self> {
        if payload.len() < Self::SIZE {
            return None;
        }
        Some(Self {
            data_message: (payload[0] >> 7) & 0x01 == 1,
            source_node: payload[1],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header_byte(vitm: bool, plt: u8, hpc: u8) -> u8 {
        (u8::from(vitm) << 7) | ((plt & 0x07) << 4) | (hpc & 0x0f)
    }

    #[test]
    fn parse_mission_data_header() {
        let buf = [header_byte(false, 1, 9), 4, 0xaa, 0xbb, 0xcc];
        let hdr = ItmHeader::parse(&buf).unwrap();
        assert!(!hdr.is_vitm());
        assert!(hdr.is_mission_data());
        assert_eq!(hdr.payload_type, 1);
        assert_eq!(hdr.hop_count, 9);
        assert_eq!(hdr.dest_node, 4);
        assert_eq!(
            hdr.trailer,
            ItmTrailer::MissionData {
                lcn: [0xaa, 0xbb],
                checksum: 0xcc
            }
        );
    }

    #[test]
    fn parse_control_header() {
        let buf = [header_byte(true, 2, 0), 7, 0b0000_0101, 3, 0x5a];
        let hdr = ItmHeader::parse(&buf).unwrap();
        assert!(hdr.is_vitm());
        assert!(!hdr.is_mission_data());
        assert_eq!(
            hdr.trailer,
            ItmTrailer::Control {
                sapi: 5,
                source_node: 3,
                checksum: 0x5a
            }
        );
    }

    #[test]
    fn parse_status_header() {
        let buf = [header_byte(false, 5, 2), 1, 0b1011_0100, 6, 0x00];
        let hdr = ItmHeader::parse(&buf).unwrap();
        assert_eq!(
            hdr.trailer,
            ItmTrailer::Status {
                parity: true,
                online_svarc: 3,
                software_version: 4,
                source_node: 6,
                checksum: 0
            }
        );
    }

    #[test]
    fn parse_rejects_short_buffer() {
        assert!(ItmHeader::parse(&[0, 1, 2, 3]).is_none());
    }

    #[test]
    fn ground_source_node_is_last_header_byte() {
        let buf = [header_byte(false, 0, 0), 4, 0, 0, 3];
        assert_eq!(ground_source_node(&buf), 3);
    }

    #[test]
    fn ite_header_data_bit() {
        assert_eq!(
            IteHeader::parse(&[0x80, 9]),
            Some(IteHeader {
                data_message: true,
                source_node: 9
            })
        );
        assert_eq!(
            IteHeader::parse(&[0x00, 9]),
            Some(IteHeader {
                data_message: false,
                source_node: 9
            })
        );
        assert!(IteHeader::parse(&[0x80]).is_none());
    }
}
