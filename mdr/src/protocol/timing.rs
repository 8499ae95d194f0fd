//! SOKF timing datagram.
//!
//! The start-of-K-Frame signal arrives as a 12-byte datagram of three
//! big-endian words: message id, message length (always 12) and the K-Frame
//! offset, which cycles through 0..=9.

use thiserror::Error;

/// Exact size of a SOKF datagram.
pub const SOKF_SIZE: usize = 12;

/// Message id carried by every SOKF datagram.
pub const SOKF_MSG_ID: u32 = 0x0000_0030;

/// Largest legal K-Frame offset.
pub const MAX_KFRAME_OFFSET: u32 = 9;

/// Size of the K-Frame offset ring.
pub const NUM_KFRAME_OFFSETS: u32 = MAX_KFRAME_OFFSET + 1;

/// Content validation failure. All of these are fatal to the timing endpoint.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SokfError {
    #[error("unexpected message id {0:#x} on timing endpoint")]
    UnexpectedMessageId(u32),
    #[error("unexpected message length {0} on timing endpoint")]
    BadLength(u32),
    #[error("K-Frame offset {0} out of range (max {MAX_KFRAME_OFFSET})")]
    OffsetOutOfRange(u32),
}

/// Decodes and validates a SOKF datagram.
///
/// The caller has already checked the datagram is exactly [`SOKF_SIZE`]
/// bytes; that check is a non-fatal warning, unlike these.
///
/// # Errors
///
/// Returns the first failing validation in wire order: message id, message
/// length, then offset range.
pub fn decode_sokf(buf: &[u8; SOKF_SIZE]) -> Result<u32, SokfError> {
    let msg_id = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
    let msg_len = u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]);
    let kframe_offset = u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]);

    if msg_id != SOKF_MSG_ID {
        return Err(SokfError::UnexpectedMessageId(msg_id));
    }
    if msg_len != SOKF_SIZE as u32 {
        return Err(SokfError::BadLength(msg_len));
    }
    if kframe_offset > MAX_KFRAME_OFFSET {
        return Err(SokfError::OffsetOutOfRange(kframe_offset));
    }
    Ok(kframe_offset)
}

/// Builds a valid SOKF datagram for the given offset.
#[must_use]
pub fn encode_sokf(kframe_offset: u32) -> [u8; SOKF_SIZE] {
    let mut buf = [0u8; SOKF_SIZE];
    buf[0..4].copy_from_slice(&SOKF_MSG_ID.to_be_bytes());
    buf[4..8].copy_from_slice(&(SOKF_SIZE as u32).to_be_bytes());
    buf[8..12].copy_from_slice(&kframe_offset.to_be_bytes());
    buf
}

/// K-Frames elapsed between two consecutive offsets.
///
/// Nominal advance is one step around the ring of ten. A repeated offset
/// still counts as one elapsed frame: the wire reporting the same slot twice
/// means at least one full revolution of nothing, which the protocol treats
/// as a single frame rather than ten. Anything above one means
/// `elapsed - 1` frames were missed.
#[must_use]
pub const fn elapsed_kframes(prev_offset: u32, offset: u32) -> u32 {
    let elapsed = (offset + NUM_KFRAME_OFFSETS - prev_offset) % NUM_KFRAME_OFFSETS;
    if elapsed == 0 {
        1
    } else {
        elapsed
    }
}
