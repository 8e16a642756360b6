//! Per-direction I/O activities

pub mod recv;
pub mod send;

pub use recv::{RecvActivity, RecvStats};
pub use send::{SendActivity, SendStats};
