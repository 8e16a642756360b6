//! HyperCube Core
//!
//! Building blocks for the HyperCube group messaging client:
//! - Wire format: `Packet`, `PacketHeader` and the `MsgCodec`
//! - Signalling message model used by the session handshake
//! - Framing state machines for partial reads and partial writes
//! - `PacketQueue` and `Signal` for handing work between tasks
//! - `RawSocket` trait with a tokio TCP implementation
//!
//! The long-running tasks that tie these together live in `hypercube-runtime`.

pub mod codec;
pub mod config;
pub mod errors;
pub mod framing;
pub mod packet;
pub mod queue;
pub mod signal;
pub mod signalling;
pub mod socket;
pub mod types;

// ----------------------------------------------------------------------------
// Re-exports
// ----------------------------------------------------------------------------

pub use codec::{Msg, MsgCodec};
pub use config::{
    ClientConfig, DEFAULT_MAX_PAYLOAD_LEN, DEFAULT_READ_CHUNK_LEN, DEFAULT_RECONNECT_DELAY,
    DEFAULT_RECONNECT_INTERVAL, DEFAULT_SERVER_PORT,
};
pub use errors::{
    CodecError, FrameError, HyperCubeError, HyperCubeResult, Result, SignallingError,
    TransportError,
};
pub use framing::{FrameReader, FrameWriter, ReadOutcome};
pub use packet::{Packet, PacketHeader, HEADER_LEN};
pub use queue::PacketQueue;
pub use signal::Signal;
pub use signalling::SignallingMessage;
pub use socket::{RawSocket, TcpClient};
pub use types::{
    command_id, ConnectionInfo, IdGenerator, Identity, RandomIdGenerator, SequentialIdGenerator,
    Subsystem,
};
