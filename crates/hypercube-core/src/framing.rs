//! Read-side and write-side framing state machines
//!
//! Neither type touches a socket. The receive and send activities perform the
//! raw I/O and feed each result back in, so the framing locks are never held
//! across an await.

use std::io;

use bytes::Bytes;

use crate::errors::FrameError;
use crate::packet::{Packet, PacketHeader, HEADER_LEN};

// ----------------------------------------------------------------------------
// Frame Reader
// ----------------------------------------------------------------------------

/// Result of applying one raw read to the reader
#[derive(Debug)]
pub enum ReadOutcome {
    /// The frame is incomplete; read again
    MoreDataNeeded,
    /// A whole frame has been assembled and handed over
    FrameReady(Packet),
    /// The peer closed the stream (zero-length read)
    PeerShutdown,
    /// The read failed or the stream cannot be framed
    ReadError(FrameError),
}

/// Reassembles frames from arbitrarily chunked reads
#[derive(Debug)]
pub struct FrameReader {
    max_payload_len: usize,
    header_buf: [u8; HEADER_LEN],
    header_filled: usize,
    header: Option<PacketHeader>,
    payload: Vec<u8>,
}

impl FrameReader {
    pub fn new(max_payload_len: usize) -> Self {
        Self {
            max_payload_len,
            header_buf: [0u8; HEADER_LEN],
            header_filled: 0,
            header: None,
            payload: Vec::new(),
        }
    }

    /// Bytes the current stage still needs
    ///
    /// Never zero: a completed frame is handed over immediately, a rejected
    /// header resets the reader, and either way it starts on the next header.
    pub fn wanted(&self) -> usize {
        match &self.header {
            None => HEADER_LEN - self.header_filled,
            Some(header) => header.payload_len as usize - self.payload.len(),
        }
    }

    /// Whether part of a frame has been consumed
    pub fn in_progress(&self) -> bool {
        self.header_filled > 0 || self.header.is_some()
    }

    /// Apply the result of one raw read
    pub fn ingest(&mut self, read: io::Result<&[u8]>) -> ReadOutcome {
        let bytes = match read {
            Ok([]) => return ReadOutcome::PeerShutdown,
            Ok(bytes) => bytes,
            Err(e) => return ReadOutcome::ReadError(FrameError::Io(e)),
        };

        let wanted = self.wanted();
        if bytes.len() > wanted {
            return ReadOutcome::ReadError(FrameError::Overrun {
                offered: bytes.len(),
                wanted,
            });
        }

        if self.header.is_none() {
            let start = self.header_filled;
            self.header_buf[start..start + bytes.len()].copy_from_slice(bytes);
            self.header_filled += bytes.len();
            if self.header_filled < HEADER_LEN {
                return ReadOutcome::MoreDataNeeded;
            }

            let header = PacketHeader::from_bytes(&self.header_buf);
            let len = header.payload_len as usize;
            if len > self.max_payload_len {
                self.reset();
                return ReadOutcome::ReadError(FrameError::PayloadTooLarge {
                    len,
                    max: self.max_payload_len,
                });
            }
            self.payload = Vec::with_capacity(len);
            self.header = Some(header);
        } else {
            self.payload.extend_from_slice(bytes);
        }

        match self.header {
            Some(header) if self.payload.len() == header.payload_len as usize => {
                self.header = None;
                self.header_filled = 0;
                let payload = std::mem::take(&mut self.payload);
                ReadOutcome::FrameReady(Packet::from_parts(header, payload))
            }
            _ => ReadOutcome::MoreDataNeeded,
        }
    }

    /// Discard any partially assembled frame
    pub fn reset(&mut self) {
        self.header_filled = 0;
        self.header = None;
        self.payload = Vec::new();
    }
}

// ----------------------------------------------------------------------------
// Frame Writer
// ----------------------------------------------------------------------------

/// Drains one encoded frame into the socket across partial writes
#[derive(Debug, Default)]
pub struct FrameWriter {
    current: Option<Bytes>,
    sent: usize,
    epoch: u64,
}

impl FrameWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when no frame is loaded
    pub fn is_empty(&self) -> bool {
        self.current.is_none()
    }

    /// Load the next frame; only valid when the writer is empty
    pub fn add_new(&mut self, packet: Packet) -> Result<(), FrameError> {
        if !self.is_empty() {
            return Err(FrameError::WriterBusy {
                remaining: self.remaining(),
            });
        }
        self.current = Some(packet.to_bytes());
        self.sent = 0;
        Ok(())
    }

    /// Unsent tail of the current frame
    pub fn pending(&self) -> Bytes {
        match &self.current {
            Some(frame) => frame.slice(self.sent..),
            None => Bytes::new(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.current
            .as_ref()
            .map(|frame| frame.len() - self.sent)
            .unwrap_or(0)
    }

    /// Record the result of one raw write, returning true once the frame is done
    ///
    /// An error counts as zero bytes sent so the same tail is retried later.
    pub fn set_num_sent(&mut self, written: io::Result<usize>) -> bool {
        let Some(frame) = &self.current else {
            return true;
        };
        let n = written.unwrap_or(0);
        self.sent = (self.sent + n).min(frame.len());
        if self.sent == frame.len() {
            self.current = None;
            self.sent = 0;
            true
        } else {
            false
        }
    }

    /// Apply a write completion only if no reset happened since it started
    ///
    /// Returns None for a stale completion.
    pub fn complete_write(&mut self, epoch: u64, written: io::Result<usize>) -> Option<bool> {
        if epoch != self.epoch {
            return None;
        }
        Some(self.set_num_sent(written))
    }

    /// Generation counter, bumped on every reset
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Abandon the current frame
    pub fn reset(&mut self) {
        self.current = None;
        self.sent = 0;
        self.epoch = self.epoch.wrapping_add(1);
    }
}
