//! Message codec
//!
//! Converts application-level `Msg` values to packets and back. Decoding is
//! always fallible: a bad frame from the peer is an error value for the caller
//! to log and drop, never a panic.

use serde::Serialize;

use crate::config::DEFAULT_MAX_PAYLOAD_LEN;
use crate::errors::CodecError;
use crate::packet::Packet;
use crate::types::{command_id, Subsystem};

// ----------------------------------------------------------------------------
// Msg
// ----------------------------------------------------------------------------

/// Application-level message: subsystem, command and JSON payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Msg {
    pub subsystem: Subsystem,
    pub command: u16,
    pub payload: String,
}

impl Msg {
    /// JSON message on the signalling subsystem
    pub fn signalling<S: Into<String>>(json: S) -> Self {
        Self {
            subsystem: Subsystem::Signalling,
            command: command_id::JSON,
            payload: json.into(),
        }
    }

    /// JSON message on the application subsystem
    pub fn command<S: Into<String>>(json: S) -> Self {
        Self {
            subsystem: Subsystem::Command,
            command: command_id::JSON,
            payload: json.into(),
        }
    }

    /// Serialize a value as the JSON payload of a new message
    pub fn from_json<T: Serialize>(subsystem: Subsystem, value: &T) -> Result<Self, CodecError> {
        Ok(Self {
            subsystem,
            command: command_id::JSON,
            payload: serde_json::to_string(value)?,
        })
    }
}

// ----------------------------------------------------------------------------
// Codec
// ----------------------------------------------------------------------------

/// Converts between `Msg` and `Packet`
#[derive(Debug, Clone, Copy)]
pub struct MsgCodec {
    max_payload_len: usize,
}

impl Default for MsgCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PAYLOAD_LEN)
    }
}

impl MsgCodec {
    pub fn new(max_payload_len: usize) -> Self {
        Self { max_payload_len }
    }

    pub fn max_payload_len(&self) -> usize {
        self.max_payload_len
    }

    /// Encode a message into a packet
    pub fn msg_to_packet(&self, msg: &Msg) -> Result<Packet, CodecError> {
        let len = msg.payload.len();
        if len > self.max_payload_len || len > u32::MAX as usize {
            return Err(CodecError::PayloadTooLarge {
                len,
                max: self.max_payload_len,
            });
        }
        Ok(Packet::new(
            msg.subsystem.as_u16(),
            msg.command,
            msg.payload.as_bytes().to_vec(),
        ))
    }

    /// Decode a packet into a message
    pub fn packet_to_msg(&self, packet: &Packet) -> Result<Msg, CodecError> {
        let subsystem = Subsystem::from_u16(packet.subsystem())
            .ok_or(CodecError::UnknownSubsystem(packet.subsystem()))?;
        if packet.command() != command_id::JSON {
            return Err(CodecError::UnknownCommand {
                subsystem: packet.subsystem(),
                command: packet.command(),
            });
        }
        let payload = String::from_utf8(packet.payload().to_vec())?;
        Ok(Msg {
            subsystem,
            command: packet.command(),
            payload,
        })
    }

    /// Decode a packet into a message and its parsed JSON payload
    pub fn packet_to_json(
        &self,
        packet: &Packet,
    ) -> Result<(Msg, serde_json::Value), CodecError> {
        let msg = self.packet_to_msg(packet)?;
        let json = serde_json::from_str(&msg.payload)?;
        Ok((msg, json))
    }
}
