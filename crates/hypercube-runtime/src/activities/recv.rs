//! Receive activity
//!
//! One task per client that turns socket reads into packets. It idles until a
//! connection is announced, then reads frame by frame. Signalling frames are
//! handed to the session; everything else lands in the inbound queue.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use hypercube_core::{
    FrameReader, HyperCubeError, Packet, PacketQueue, RawSocket, ReadOutcome, Result, Signal,
};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::hooks::SessionHooks;

// ----------------------------------------------------------------------------
// Statistics
// ----------------------------------------------------------------------------

/// Counters for the receive direction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RecvStats {
    pub frames_received: u64,
    pub signalling_frames: u64,
    pub bytes_received: u64,
    pub read_errors: u64,
}

#[derive(Debug, Default)]
struct RecvCounters {
    frames_received: AtomicU64,
    signalling_frames: AtomicU64,
    bytes_received: AtomicU64,
    read_errors: AtomicU64,
}

// ----------------------------------------------------------------------------
// Receive Activity
// ----------------------------------------------------------------------------

pub struct RecvActivity {
    socket: Arc<dyn RawSocket>,
    read_chunk_len: usize,
    reader: Mutex<FrameReader>,
    inbound: PacketQueue,
    /// Raised while a connection is open and should be read
    ready: Signal,
    data_received: Signal,
    exit: AtomicBool,
    /// Bumped on every connect and disconnect so a read that straddles one is dropped
    generation: AtomicU64,
    session: Mutex<Option<Weak<dyn SessionHooks>>>,
    counters: RecvCounters,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl RecvActivity {
    pub fn new(socket: Arc<dyn RawSocket>, max_payload_len: usize, read_chunk_len: usize) -> Self {
        Self {
            socket,
            read_chunk_len: read_chunk_len.max(1),
            reader: Mutex::new(FrameReader::new(max_payload_len)),
            inbound: PacketQueue::new(),
            ready: Signal::new(),
            data_received: Signal::new(),
            exit: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            session: Mutex::new(None),
            counters: RecvCounters::default(),
            handle: Mutex::new(None),
        }
    }

    /// Spawn the activity task, routing signalling frames to `session`
    pub fn start(self: &Arc<Self>, session: Weak<dyn SessionHooks>) -> Result<()> {
        let mut handle = self.handle.lock();
        if handle.is_some() {
            return Err(HyperCubeError::AlreadyRunning);
        }
        *self.session.lock() = Some(session);
        self.exit.store(false, Ordering::SeqCst);

        let activity = Arc::clone(self);
        *handle = Some(tokio::spawn(async move { activity.run().await }));
        Ok(())
    }

    /// Ask the task to finish without waiting for it
    pub fn request_exit(&self) {
        self.exit.store(true, Ordering::SeqCst);
        self.ready.notify();
    }

    /// Stop the task and release per-connection state
    ///
    /// The socket must already be closed so a pending read returns.
    pub async fn stop(&self) {
        self.request_exit();
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!("Receive activity task failed: {}", e);
            }
        }
        self.ready.reset();
        self.reader.lock().reset();
        let dropped = self.inbound.drain();
        if dropped > 0 {
            debug!("Released {} undelivered inbound packets", dropped);
        }
        self.session.lock().take();
    }

    /// A connection is open: start reading from a clean frame boundary
    pub fn on_connect(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.reader.lock().reset();
        self.ready.notify();
    }

    /// The connection is gone: stop reading and drop any partial frame
    ///
    /// Completed packets already in the inbound queue stay deliverable.
    pub fn on_disconnect(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.ready.reset();
        self.reader.lock().reset();
    }

    /// Take the oldest inbound application packet
    pub fn pop(&self) -> Option<Packet> {
        self.inbound.pop()
    }

    /// Inspect the oldest inbound packet without taking it
    pub fn peek_with<R>(&self, f: impl FnOnce(&Packet) -> R) -> Option<R> {
        self.inbound.peek_with(f)
    }

    pub fn queued(&self) -> usize {
        self.inbound.len()
    }

    /// Wait until an inbound packet is available or the timeout elapses
    pub async fn wait_for_data(&self, timeout: Duration) -> bool {
        if !self.inbound.is_empty() {
            return true;
        }
        self.data_received.reset();
        if !self.inbound.is_empty() {
            return true;
        }
        self.data_received.wait_timeout(timeout).await || !self.inbound.is_empty()
    }

    pub fn stats(&self) -> RecvStats {
        RecvStats {
            frames_received: self.counters.frames_received.load(Ordering::Relaxed),
            signalling_frames: self.counters.signalling_frames.load(Ordering::Relaxed),
            bytes_received: self.counters.bytes_received.load(Ordering::Relaxed),
            read_errors: self.counters.read_errors.load(Ordering::Relaxed),
        }
    }

    fn should_exit(&self) -> bool {
        self.exit.load(Ordering::SeqCst)
    }

    fn session(&self) -> Option<Arc<dyn SessionHooks>> {
        self.session.lock().as_ref().and_then(Weak::upgrade)
    }

    // ------------------------------------------------------------------------
    // Task loop
    // ------------------------------------------------------------------------

    async fn run(self: Arc<Self>) {
        info!("Receive activity started");
        let mut buf = vec![0u8; self.read_chunk_len];

        while !self.should_exit() {
            if !self.ready.is_set() {
                self.ready.wait().await;
                continue;
            }

            let generation = self.generation.load(Ordering::SeqCst);
            let wanted = self.reader.lock().wanted().min(buf.len());
            let result = self.socket.recv(&mut buf[..wanted]).await;

            if self.should_exit() {
                break;
            }
            if generation != self.generation.load(Ordering::SeqCst) {
                debug!("Discarding read from a previous connection");
                continue;
            }

            let outcome = self.reader.lock().ingest(result.map(|n| &buf[..n]));
            match outcome {
                ReadOutcome::MoreDataNeeded => {}
                ReadOutcome::FrameReady(packet) => self.dispatch(packet),
                ReadOutcome::PeerShutdown => {
                    info!("Server closed the connection");
                    self.connection_lost();
                }
                ReadOutcome::ReadError(e) => {
                    warn!("Read failed: {}", e);
                    self.counters.read_errors.fetch_add(1, Ordering::Relaxed);
                    self.connection_lost();
                }
            }
        }

        info!("Receive activity stopped");
    }

    fn dispatch(&self, packet: Packet) {
        self.counters
            .bytes_received
            .fetch_add(packet.len() as u64, Ordering::Relaxed);

        if let Some(session) = self.session() {
            if session.is_signalling_packet(&packet) {
                self.counters.signalling_frames.fetch_add(1, Ordering::Relaxed);
                return;
            }
        } else if packet.is_signalling() {
            return;
        }

        debug!(
            "Received frame: subsystem {} command {} ({} bytes)",
            packet.subsystem(),
            packet.command(),
            packet.len()
        );
        self.counters.frames_received.fetch_add(1, Ordering::Relaxed);
        self.inbound.push(packet);
        self.data_received.notify();
    }

    fn connection_lost(&self) {
        self.ready.reset();
        self.reader.lock().reset();
        if let Some(session) = self.session() {
            session.notify_socket_closed();
        }
    }
}

impl std::fmt::Debug for RecvActivity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecvActivity")
            .field("ready", &self.ready.is_set())
            .field("queued", &self.inbound.len())
            .field("stats", &self.stats())
            .finish()
    }
}
