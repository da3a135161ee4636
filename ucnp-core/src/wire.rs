//! UCNP envelope codec: fixed 24-byte little-endian header + payload.

use crate::integrity::checksum16;

/// Protocol tag, first four bytes of every frame.
pub const MAGIC: [u8; 4] = *b"UCNP";

/// Current protocol version. The only one decode accepts.
pub const PROTOCOL_VERSION: u8 = 1;

/// Serialized header size in bytes.
pub const HEADER_LEN: usize = 24;

/// Payload length is carried in a u16.
pub const MAX_PAYLOAD_LEN: usize = u16::MAX as usize;

const CHECKSUM_OFFSET: usize = 20;

/// Wire message type codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MsgType {
    Discovery = 0x01,
    DiscoveryAck = 0x02,
    Handshake = 0x03,
    HandshakeAck = 0x04,
    Data = 0x10,
    /// Defined on the wire; the link layer does not emit or consume it yet.
    DataAck = 0x11,
    /// Defined on the wire; the link layer does not emit or consume it yet.
    Keepalive = 0x20,
    Disconnect = 0xFF,
}

impl MsgType {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0x01 => Some(Self::Discovery),
            0x02 => Some(Self::DiscoveryAck),
            0x03 => Some(Self::Handshake),
            0x04 => Some(Self::HandshakeAck),
            0x10 => Some(Self::Data),
            0x11 => Some(Self::DataAck),
            0x20 => Some(Self::Keepalive),
            0xFF => Some(Self::Disconnect),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        self as u8
    }
}

/// Decoded envelope header. The reserved field is not exposed; it must
/// be 0 on send and is ignored on receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub msg_type: MsgType,
    pub length: u16,
    pub src_id: u32,
    /// Intended recipient; [`crate::BROADCAST_ID`] means broadcast.
    pub dst_id: u32,
    pub seq: u32,
    pub checksum: u16,
}

/// Error encoding or decoding a frame.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("payload too large for length field")]
    PayloadTooLarge,
    #[error("frame shorter than header")]
    Truncated,
    #[error("bad magic")]
    BadMagic,
    #[error("unsupported protocol version {0}")]
    VersionMismatch(u8),
    #[error("unknown message type {0:#04x}")]
    UnknownType(u8),
    #[error("payload shorter than declared length")]
    Incomplete,
    #[error("checksum mismatch (stored {stored:#06x}, computed {computed:#06x})")]
    ChecksumMismatch { stored: u16, computed: u16 },
}

/// Encode one frame. The checksum is computed over the full serialized
/// span with its own field zeroed, then written in place.
pub fn encode_frame(
    msg_type: MsgType,
    src_id: u32,
    dst_id: u32,
    seq: u32,
    payload: &[u8],
) -> Result<Vec<u8>, WireError> {
    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(WireError::PayloadTooLarge);
    }
    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.extend_from_slice(&MAGIC);
    out.push(PROTOCOL_VERSION);
    out.push(msg_type.code());
    out.extend_from_slice(&(payload.len() as u16).to_le_bytes());
    out.extend_from_slice(&src_id.to_le_bytes());
    out.extend_from_slice(&dst_id.to_le_bytes());
    out.extend_from_slice(&seq.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes()); // checksum, written below
    out.extend_from_slice(&0u16.to_le_bytes()); // reserved
    out.extend_from_slice(payload);
    let sum = checksum16(&out);
    out[CHECKSUM_OFFSET..CHECKSUM_OFFSET + 2].copy_from_slice(&sum.to_le_bytes());
    Ok(out)
}

/// Decode one frame from the front of `bytes`. Trailing bytes beyond
/// the declared payload length are ignored. The payload is returned
/// borrowed at its full wire length; callers copy into their own
/// buffer, truncating to its capacity as needed.
pub fn decode_frame(bytes: &[u8]) -> Result<(Header, &[u8]), WireError> {
    if bytes.len() < HEADER_LEN {
        return Err(WireError::Truncated);
    }
    if bytes[0..4] != MAGIC {
        return Err(WireError::BadMagic);
    }
    if bytes[4] != PROTOCOL_VERSION {
        return Err(WireError::VersionMismatch(bytes[4]));
    }
    let msg_type = MsgType::from_code(bytes[5]).ok_or(WireError::UnknownType(bytes[5]))?;
    let length = u16::from_le_bytes([bytes[6], bytes[7]]);
    if bytes.len() < HEADER_LEN + usize::from(length) {
        return Err(WireError::Incomplete);
    }
    let frame = &bytes[..HEADER_LEN + usize::from(length)];
    let stored = u16::from_le_bytes([frame[20], frame[21]]);
    // The sum over the span with the checksum field zeroed equals the
    // full sum minus the stored checksum bytes.
    let computed = checksum16(frame)
        .wrapping_sub(u16::from(frame[20]))
        .wrapping_sub(u16::from(frame[21]));
    if computed != stored {
        return Err(WireError::ChecksumMismatch { stored, computed });
    }
    let header = Header {
        msg_type,
        length,
        src_id: u32::from_le_bytes([frame[8], frame[9], frame[10], frame[11]]),
        dst_id: u32::from_le_bytes([frame[12], frame[13], frame[14], frame[15]]),
        seq: u32::from_le_bytes([frame[16], frame[17], frame[18], frame[19]]),
        checksum: stored,
    };
    Ok((header, &frame[HEADER_LEN..]))
}
