//! HyperCube Runtime
//!
//! This crate contains the long-running parts of the HyperCube client:
//! - `HyperCubeClient`: the coordinator the application talks to
//! - `SignallingSession`: connect, handshake, disconnect detection and reconnect
//! - `RecvActivity` / `SendActivity`: one task per I/O direction
//!
//! `hypercube-core` provides the wire format, framing and socket primitives
//! these tasks are built from.

pub mod activities;
pub mod client;
pub mod hooks;
pub mod session;

pub use activities::{RecvActivity, RecvStats, SendActivity, SendStats};
pub use client::{ClientStats, HyperCubeClient};
pub use hooks::{CoreHooks, SessionHooks};
pub use session::{SessionState, SessionStatus, SignallingSession};

// Re-export core types for convenience
pub use hypercube_core::{
    ClientConfig, HyperCubeError, HyperCubeResult, IdGenerator, Identity, Msg, MsgCodec, Packet,
    RandomIdGenerator, RawSocket, SequentialIdGenerator, SignallingMessage, Subsystem, TcpClient,
};
