//! Lifecycle callbacks between the session and the rest of the client
//!
//! The session never holds the coordinator and the activities never hold the
//! session directly. Each side sees the other only through these traits,
//! injected when the client starts.

use hypercube_core::{CodecError, Msg, Packet};

/// Callbacks the session makes into the coordinator
pub trait CoreHooks: Send + Sync {
    /// Encode a message and queue it for sending
    fn send_msg(&self, msg: &Msg) -> Result<(), CodecError>;

    /// A connection was established
    ///
    /// `handshake` must be the first traffic written on it; anything queued
    /// before the call is discarded.
    fn on_connect(&self, handshake: &[Msg]);

    /// The connection was lost or closed
    fn on_disconnect(&self);

    /// A peer subscribed to this client's group
    fn on_open_for_data(&self);

    /// No peer is subscribed any more, or the connection went away
    fn on_closed_for_data(&self);
}

/// Callbacks the receive activity makes into the session
pub trait SessionHooks: Send + Sync {
    /// Consume the packet if it belongs to the signalling subsystem
    ///
    /// Returns true when the packet was signalling and must not reach the
    /// application.
    fn is_signalling_packet(&self, packet: &Packet) -> bool;

    /// The socket reported an orderly close or a read error
    fn notify_socket_closed(&self);
}
