//! Packet and frame header structures
//!
//! A frame on the wire is a fixed 8-byte header followed by the payload:
//!
//! ```text
//! [u16 BE subsystem] [u16 BE command] [u32 BE payload_len] [payload: payload_len bytes]
//! ```
//!
//! The declared length alone determines where a frame ends.

use bytes::{BufMut, Bytes, BytesMut};

use crate::types::Subsystem;

// ----------------------------------------------------------------------------
// Constants
// ----------------------------------------------------------------------------

/// Size of the fixed frame header
pub const HEADER_LEN: usize = 8;

// ----------------------------------------------------------------------------
// Packet Header
// ----------------------------------------------------------------------------

/// Fixed-size frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub subsystem: u16,
    pub command: u16,
    pub payload_len: u32,
}

impl PacketHeader {
    /// Serialize the header to its wire form
    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut bytes = [0u8; HEADER_LEN];
        bytes[0..2].copy_from_slice(&self.subsystem.to_be_bytes());
        bytes[2..4].copy_from_slice(&self.command.to_be_bytes());
        bytes[4..8].copy_from_slice(&self.payload_len.to_be_bytes());
        bytes
    }

    /// Parse a header from its wire form
    pub fn from_bytes(bytes: &[u8; HEADER_LEN]) -> Self {
        Self {
            subsystem: u16::from_be_bytes([bytes[0], bytes[1]]),
            command: u16::from_be_bytes([bytes[2], bytes[3]]),
            payload_len: u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
        }
    }
}

// ----------------------------------------------------------------------------
// Packet
// ----------------------------------------------------------------------------

/// In-memory representation of one frame
///
/// Packets are deliberately not `Clone`: a packet has exactly one owner and
/// moves between tasks through the packet queues.
#[derive(Debug, PartialEq, Eq)]
pub struct Packet {
    header: PacketHeader,
    payload: Vec<u8>,
}

impl Packet {
    /// Create a packet, deriving the header length from the payload
    ///
    /// Callers bound the payload length (see `MsgCodec`); lengths beyond
    /// `u32::MAX` are not representable on the wire.
    pub fn new(subsystem: u16, command: u16, payload: Vec<u8>) -> Self {
        Self {
            header: PacketHeader {
                subsystem,
                command,
                payload_len: payload.len() as u32,
            },
            payload,
        }
    }

    /// Assemble a packet from a parsed header and its payload
    pub(crate) fn from_parts(header: PacketHeader, payload: Vec<u8>) -> Self {
        debug_assert_eq!(header.payload_len as usize, payload.len());
        Self { header, payload }
    }

    pub fn header(&self) -> &PacketHeader {
        &self.header
    }

    pub fn subsystem(&self) -> u16 {
        self.header.subsystem
    }

    pub fn command(&self) -> u16 {
        self.header.command
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Take the payload, consuming the packet
    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }

    /// Total encoded length, header included
    pub fn len(&self) -> usize {
        HEADER_LEN + self.payload.len()
    }

    /// A packet always carries a header, so it is never empty on the wire
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Whether the packet belongs to the signalling subsystem
    pub fn is_signalling(&self) -> bool {
        Subsystem::from_u16(self.header.subsystem) == Some(Subsystem::Signalling)
    }

    /// Encode header and payload into one contiguous buffer
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.len());
        buf.put_slice(&self.header.to_bytes());
        buf.put_slice(&self.payload);
        buf.freeze()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::command_id;

    #[test]
    fn test_header_layout_is_big_endian() {
        let header = PacketHeader {
            subsystem: 0x0102,
            command: 0x0304,
            payload_len: 0x0506_0708,
        };
        assert_eq!(header.to_bytes(), [1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(PacketHeader::from_bytes(&header.to_bytes()), header);
    }

    #[test]
    fn test_packet_encoding() {
        let packet = Packet::new(
            Subsystem::Command.as_u16(),
            command_id::JSON,
            b"{}".to_vec(),
        );
        assert_eq!(packet.len(), HEADER_LEN + 2);
        assert!(!packet.is_signalling());

        let bytes = packet.to_bytes();
        assert_eq!(&bytes[..HEADER_LEN], &[0, 2, 0, 1, 0, 0, 0, 2]);
        assert_eq!(&bytes[HEADER_LEN..], b"{}");
    }

    #[test]
    fn test_signalling_detection() {
        let packet = Packet::new(Subsystem::Signalling.as_u16(), command_id::JSON, Vec::new());
        assert!(packet.is_signalling());
        let unknown = Packet::new(0x7777, command_id::JSON, Vec::new());
        assert!(!unknown.is_signalling());
    }
}
