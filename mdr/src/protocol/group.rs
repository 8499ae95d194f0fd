//! Group-message wire codec.
//!
//! A group message batches MPLS packets into one datagram:
//!
//! `[message_id:4][message_length:4][num_packets:2]` followed by
//! `num_packets` records of `[length:2][mpls_header:4][itm:5..]`.
//!
//! All integers are big-endian and `message_length` covers the whole buffer
//! including the 8-byte header.

use thiserror::Error;

use crate::protocol::{
    itm, mpls, FIXED_ITM_PAYLOAD_SIZE, MAX_VITM_PAYLOAD_SIZE, MIN_VITM_PAYLOAD_SIZE,
};

/// Group header size: message id + message length.
pub const HEADER_SIZE: usize = 8;

/// Message id stamped on every uplink group this crate emits.
pub const KBAND_RECV_MSG_ID: u32 = 0x0000_0031;

/// Smallest legal per-record length: MPLS header plus ITM header.
pub const MIN_PACKET_SIZE: usize = mpls::HEADER_SIZE + itm::HEADER_SIZE;

const FIXED_PACKET_SIZE: usize = MIN_PACKET_SIZE + FIXED_ITM_PAYLOAD_SIZE;
const MIN_VITM_PACKET_SIZE: usize = MIN_PACKET_SIZE + MIN_VITM_PAYLOAD_SIZE;
const MAX_VITM_PACKET_SIZE: usize = MIN_PACKET_SIZE + MAX_VITM_PAYLOAD_SIZE;

/// One uplink MPLS packet awaiting batching.
///
/// `bytes` holds the MPLS header followed by the ITM; the per-record length
/// prefix is written by [`encode_group`]. The payload type is cached so the
/// batcher never re-parses the ITM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UplinkPacket {
    pub payload_type: u8,
    pub bytes: Vec<u8>,
}

impl UplinkPacket {
    /// On-the-wire contribution of this packet inside a group: the 2-byte
    /// length prefix plus the packet bytes.
    #[must_use]
    pub fn wire_size(&self) -> usize {
        2 + self.bytes.len()
    }
}

/// Decode failure. Any failure abandons the entire message.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GroupDecodeError {
    /// Fewer bytes than the group header.
    #[error("message shorter than the {HEADER_SIZE}-byte group header: {0} bytes")]
    TruncatedHeader(usize),
    /// Header's `message_length` disagrees with the received size.
    #[error("message length field {declared} does not match received size {actual}")]
    LengthMismatch { declared: u32, actual: usize },
    /// Ran out of bytes mid-field.
    #[error("message truncated while reading {0}")]
    Truncated(&'static str),
    /// A record's declared length cannot hold the MPLS + ITM headers.
    #[error("packet length {0} below the {MIN_PACKET_SIZE}-byte minimum")]
    PacketTooShort(u16),
    /// A record's declared length exceeds the remaining buffer.
    #[error("packet length {declared} exceeds the {remaining} remaining bytes")]
    PacketOverrun { declared: u16, remaining: usize },
    /// Fixed-size ITM record with the wrong total length.
    #[error("fixed ITM packet length {0}, expected {FIXED_PACKET_SIZE}")]
    BadFixedItmSize(u16),
    /// VITM record outside the allowed length range.
    #[error(
        "VITM packet length {0} outside [{MIN_VITM_PACKET_SIZE}, {MAX_VITM_PACKET_SIZE}]"
    )]
    BadVitmSize(u16),
}

/// A successfully decoded group, borrowing the input buffer.
#[derive(Debug)]
pub struct GroupView<'a> {
    /// Message id from the group header (not validated; peers stamp their own).
    pub message_id: u32,
    /// One slice per MPLS packet, in wire order, length prefix stripped.
    pub packets: Vec<&'a [u8]>,
    /// Bytes left over after the last record. Tolerated, but worth a warning.
    pub trailing_bytes: usize,
}

struct Reader<'a> {
    buf: &'a [u8],
    cursor: usize,
}

impl<'a> Reader<'a> {
    const fn new(buf: &'a [u8]) -> Self {
        Self { buf, cursor: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.cursor
    }

    fn take_u16(&mut self, what: &'static str) -> Result<u16, GroupDecodeError> {
        let bytes = self.take_bytes(2, what)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    fn take_u32(&mut self, what: &'static str) -> Result<u32, GroupDecodeError> {
        let bytes = self.take_bytes(4, what)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn take_bytes(&mut self, len: usize, what: &'static str) -> Result<&'a [u8], GroupDecodeError> {
        if self.remaining() < len {
            return Err(GroupDecodeError::Truncated(what));
        }
        let slice = &self.buf[self.cursor..self.cursor + len];
        self.cursor += len;
        Ok(slice)
    }
}

/// Decodes a received group message into per-packet slices.
///
/// Validation order follows the wire: header presence, `message_length`
/// against the received size, then each record's length against the header
/// minimum, the remaining buffer, and the embedded ITM's size class.
///
/// # Errors
///
/// Returns a [`GroupDecodeError`] describing the first violation; the caller
/// is expected to discard the entire message.
pub fn decode_group(buf: &[u8]) -> Result<GroupView<'_>, GroupDecodeError> {
    if buf.len() < HEADER_SIZE {
        return Err(GroupDecodeError::TruncatedHeader(buf.len()));
    }

    let mut r = Reader::new(buf);
    let message_id = r.take_u32("message id")?;
    let message_length = r.take_u32("message length")?;

    if message_length as usize != buf.len() {
        return Err(GroupDecodeError::LengthMismatch {
            declared: message_length,
            actual: buf.len(),
        });
    }

    let num_packets = r.take_u16("packet count")?;
    let mut packets = Vec::with_capacity(num_packets as usize);

    for _ in 0..num_packets {
        let length = r.take_u16("packet length")?;
        if (length as usize) < MIN_PACKET_SIZE {
            return Err(GroupDecodeError::PacketTooShort(length));
        }
        if (length as usize) > r.remaining() {
            return Err(GroupDecodeError::PacketOverrun {
                declared: length,
                remaining: r.remaining(),
            });
        }
        let packet = r.take_bytes(length as usize, "packet body")?;

        // The ci bit of the embedded ITM selects the size class.
        let vitm = (packet[mpls::HEADER_SIZE] >> 7) & 0x01 == 1;
        if vitm {
            if (length as usize) < MIN_VITM_PACKET_SIZE || (length as usize) > MAX_VITM_PACKET_SIZE
            {
                return Err(GroupDecodeError::BadVitmSize(length));
            }
        } else if length as usize != FIXED_PACKET_SIZE {
            return Err(GroupDecodeError::BadFixedItmSize(length));
        }

        packets.push(packet);
    }

    Ok(GroupView {
        message_id,
        packets,
        trailing_bytes: r.remaining(),
    })
}

/// Encodes pending uplink packets into one group-message buffer.
///
/// The `message_length` field is patched after the records are appended, so
/// it always equals the final buffer length.
#[must_use]
pub fn encode_group(packets: &[UplinkPacket]) -> Vec<u8> {
    let body: usize = packets.iter().map(UplinkPacket::wire_size).sum();
    let mut buf = Vec::with_capacity(HEADER_SIZE + 2 + body);

    buf.extend_from_slice(&KBAND_RECV_MSG_ID.to_be_bytes());
    buf.extend_from_slice(&[0u8; 4]); // message_length, patched below
    buf.extend_from_slice(&(packets.len() as u16).to_be_bytes());

    for packet in packets {
        buf.extend_from_slice(&(packet.bytes.len() as u16).to_be_bytes());
        buf.extend_from_slice(&packet.bytes);
    }

    let total = buf.len() as u32;
    buf[4..8].copy_from_slice(&total.to_be_bytes());
    buf
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::mpls::MplsHeader;

    fn fixed_packet(plt: u8, dest_node: u8) -> UplinkPacket {
        let mut bytes = MplsHeader::synthetic(plt).to_be_bytes().to_vec();
        bytes.push((plt & 0x07) << 4); // fixed ITM, hop count 0
        bytes.push(dest_node);
        bytes.extend_from_slice(&[0u8; 3]);
        bytes.extend_from_slice(&[0x11; FIXED_ITM_PAYLOAD_SIZE]);
        UplinkPacket {
            payload_type: plt,
            bytes,
        }
    }

    fn vitm_packet(payload_len: usize) -> UplinkPacket {
        let mut bytes = MplsHeader::synthetic(7).to_be_bytes().to_vec();
        bytes.push(0x80 | (2 << 4)); // VITM, payload type 2
        bytes.push(9);
        bytes.extend_from_slice(&[0u8; 3]);
        bytes.extend_from_slice(&vec![0x22; payload_len]);
        UplinkPacket {
            payload_type: 2,
            bytes,
        }
    }

    #[test]
    fn roundtrip_preserves_packets_and_lengths() {
        let packets = vec![fixed_packet(0, 4), vitm_packet(10), fixed_packet(1, 7)];
        let buf = encode_group(&packets);

        let view = decode_group(&buf).unwrap();
        assert_eq!(view.message_id, KBAND_RECV_MSG_ID);
        assert_eq!(view.trailing_bytes, 0);
        assert_eq!(view.packets.len(), packets.len());
        for (slice, packet) in view.packets.iter().zip(&packets) {
            assert_eq!(*slice, packet.bytes.as_slice());
        }

        // message_length equals the buffer, and the per-record accounting
        // adds back up to it.
        let declared = u32::from_be_bytes(buf[4..8].try_into().unwrap());
        assert_eq!(declared as usize, buf.len());
        let records: usize = packets.iter().map(UplinkPacket::wire_size).sum();
        assert_eq!(records + HEADER_SIZE + 2, buf.len());
    }

    #[test]
    fn empty_group_is_ten_bytes() {
        let buf = encode_group(&[]);
        assert_eq!(buf.len(), 10);
        assert!(decode_group(&buf).unwrap().packets.is_empty());
    }

    #[test]
    fn rejects_truncated_header() {
        assert!(matches!(
            decode_group(&[0u8; 5]),
            Err(GroupDecodeError::TruncatedHeader(5))
        ));
    }

    #[test]
    fn rejects_length_mismatch() {
        let mut buf = encode_group(&[fixed_packet(0, 1)]);
        buf.push(0); // one extra byte the header does not account for
        assert!(matches!(
            decode_group(&buf),
            Err(GroupDecodeError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn rejects_record_length_beyond_buffer() {
        let mut buf = encode_group(&[fixed_packet(0, 1)]);
        // Inflate the first record's length prefix past the end of the
        // message, keeping message_length correct.
        buf[10] = 0xff;
        buf[11] = 0xff;
        assert!(matches!(
            decode_group(&buf),
            Err(GroupDecodeError::PacketOverrun { .. })
        ));
    }

    #[test]
    fn rejects_wrong_fixed_itm_size() {
        let mut short = fixed_packet(0, 1);
        short.bytes.truncate(short.bytes.len() - 1);
        let buf = encode_group(&[short]);
        assert!(matches!(
            decode_group(&buf),
            Err(GroupDecodeError::BadFixedItmSize(_))
        ));
    }

    #[test]
    fn rejects_vitm_outside_bounds() {
        let buf = encode_group(&[vitm_packet(MIN_VITM_PAYLOAD_SIZE - 1)]);
        assert!(matches!(
            decode_group(&buf),
            Err(GroupDecodeError::BadVitmSize(_))
        ));
    }

    #[test]
    fn one_bad_record_abandons_the_whole_group() {
        let mut bad = fixed_packet(0, 1);
        bad.bytes.pop();
        let buf = encode_group(&[fixed_packet(0, 1), bad]);
        assert!(decode_group(&buf).is_err());
    }

    #[test]
    fn trailing_bytes_are_reported_not_fatal() {
        let inner = encode_group(&[fixed_packet(3, 2)]);
        // Rebuild with two bytes of padding accounted for in message_length.
        let mut buf = inner.clone();
        buf.extend_from_slice(&[0xde, 0xad]);
        let total = buf.len() as u32;
        buf[4..8].copy_from_slice(&total.to_be_bytes());

        let view = decode_group(&buf).unwrap();
        assert_eq!(view.packets.len(), 1);
        assert_eq!(view.trailing_bytes, 2);
    }
}
