//! Core types for the HyperCube client
//!
//! Subsystem and command identifiers used in frame headers, plus the
//! handshake identity and the generator that produces it.

use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ----------------------------------------------------------------------------
// Subsystems and Commands
// ----------------------------------------------------------------------------

/// Subsystem a frame belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u16)]
pub enum Subsystem {
    /// Control plane, consumed by the session
    Signalling = 0x0001,
    /// Application data, delivered to the caller
    Command = 0x0002,
}

impl Subsystem {
    /// Convert from the wire value, returning None for unknown values
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            0x0001 => Some(Self::Signalling),
            0x0002 => Some(Self::Command),
            _ => None,
        }
    }

    /// Wire value of this subsystem
    pub fn as_u16(self) -> u16 {
        self as u16
    }
}

impl fmt::Display for Subsystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Subsystem::Signalling => write!(f, "SIGNALLING"),
            Subsystem::Command => write!(f, "COMMAND"),
        }
    }
}

/// Command identifiers carried in the frame header
pub mod command_id {
    /// Payload is a UTF-8 JSON document
    pub const JSON: u16 = 0x0001;
}

// ----------------------------------------------------------------------------
// Identity
// ----------------------------------------------------------------------------

/// Source of numeric identifiers for a client instance
pub trait IdGenerator: Send + Sync {
    /// Produce the next identifier
    fn next_id(&self) -> u64;
}

/// Random identifiers derived from v4 UUIDs
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomIdGenerator;

impl IdGenerator for RandomIdGenerator {
    fn next_id(&self) -> u64 {
        Uuid::new_v4().as_u128() as u64
    }
}

/// Deterministic identifiers counting up from a seed
#[derive(Debug)]
pub struct SequentialIdGenerator {
    next: AtomicU64,
}

impl SequentialIdGenerator {
    pub fn new(seed: u64) -> Self {
        Self {
            next: AtomicU64::new(seed),
        }
    }
}

impl IdGenerator for SequentialIdGenerator {
    fn next_id(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

/// Handshake identity record sent once per successful connect
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionInfo {
    pub connection_name: String,
    pub instance_id: u64,
}

/// Identity of one client for its whole lifetime
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Carried as `systemId` on every outbound signalling message
    pub system_id: u64,
    pub connection_info: ConnectionInfo,
}

impl Identity {
    /// Draw a fresh identity from the generator
    pub fn generate<S: Into<String>>(connection_name: S, ids: &dyn IdGenerator) -> Self {
        let system_id = ids.next_id();
        let instance_id = ids.next_id();
        Self {
            system_id,
            connection_info: ConnectionInfo {
                connection_name: connection_name.into(),
                instance_id,
            },
        }
    }
}
