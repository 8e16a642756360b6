//! Send activity
//!
//! One task per client that drains the outbound queue through the frame
//! writer. Producers never block: they push a packet and raise the signal.
//!
//! The task only writes while armed. Arming happens in `on_connect`, after
//! the queue has been swapped for the handshake, so the handshake is always
//! the first traffic on a connection.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use hypercube_core::{FrameWriter, HyperCubeError, Packet, PacketQueue, RawSocket, Result, Signal};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Counters for the send direction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SendStats {
    pub frames_sent: u64,
    pub bytes_sent: u64,
    pub write_errors: u64,
}

#[derive(Debug, Default)]
struct SendCounters {
    frames_sent: AtomicU64,
    bytes_sent: AtomicU64,
    write_errors: AtomicU64,
}

pub struct SendActivity {
    socket: Arc<dyn RawSocket>,
    writer: Mutex<FrameWriter>,
    outbound: PacketQueue,
    packets_available: Signal,
    exit: AtomicBool,
    armed: AtomicBool,
    counters: SendCounters,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl SendActivity {
    pub fn new(socket: Arc<dyn RawSocket>) -> Self {
        Self {
            socket,
            writer: Mutex::new(FrameWriter::new()),
            outbound: PacketQueue::new(),
            packets_available: Signal::new(),
            exit: AtomicBool::new(false),
            armed: AtomicBool::new(false),
            counters: SendCounters::default(),
            handle: Mutex::new(None),
        }
    }

    pub fn start(self: &Arc<Self>) -> Result<()> {
        let mut handle = self.handle.lock();
        if handle.is_some() {
            return Err(HyperCubeError::AlreadyRunning);
        }
        self.exit.store(false, Ordering::SeqCst);

        let activity = Arc::clone(self);
        *handle = Some(tokio::spawn(async move { activity.run().await }));
        Ok(())
    }

    pub fn request_exit(&self) {
        self.exit.store(true, Ordering::SeqCst);
        self.packets_available.notify();
    }

    /// Stop the task, then drop the writer state and anything still queued
    pub async fn stop(&self) {
        self.armed.store(false, Ordering::SeqCst);
        self.request_exit();
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!("Send activity task failed: {}", e);
            }
        }
        self.packets_available.reset();
        self.writer.lock().reset();
        let dropped = self.outbound.drain();
        if dropped > 0 {
            debug!("Released {} unsent outbound packets", dropped);
        }
    }

    /// Queue a packet for sending; never blocks
    pub fn send_packet(&self, packet: Packet) {
        self.outbound.push(packet);
        self.packets_available.notify();
    }

    /// Replace traffic queued while no connection existed with `handshake`
    /// and start writing
    pub fn on_connect(&self, handshake: Vec<Packet>) {
        self.writer.lock().reset();
        let stale = self.outbound.replace(handshake);
        if stale > 0 {
            debug!("Discarded {} packets queued before connect", stale);
        }
        self.armed.store(true, Ordering::SeqCst);
        self.packets_available.notify();
    }

    /// Abandon the frame in flight and everything queued behind it
    pub fn on_disconnect(&self) {
        self.armed.store(false, Ordering::SeqCst);
        self.writer.lock().reset();
        let dropped = self.outbound.drain();
        if dropped > 0 {
            debug!("Dropped {} unsent packets on disconnect", dropped);
        }
    }

    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::SeqCst)
    }

    pub fn queued(&self) -> usize {
        self.outbound.len()
    }

    pub fn stats(&self) -> SendStats {
        SendStats {
            frames_sent: self.counters.frames_sent.load(Ordering::Relaxed),
            bytes_sent: self.counters.bytes_sent.load(Ordering::Relaxed),
            write_errors: self.counters.write_errors.load(Ordering::Relaxed),
        }
    }

    fn should_exit(&self) -> bool {
        self.exit.load(Ordering::SeqCst)
    }

    // ------------------------------------------------------------------------
    // Task loop
    // ------------------------------------------------------------------------

    async fn run(self: Arc<Self>) {
        info!("Send activity started");
        while !self.should_exit() {
            self.packets_available.wait().await;
            self.packets_available.reset();
            if self.should_exit() {
                break;
            }
            self.write_packets().await;
        }
        info!("Send activity stopped");
    }

    /// Write queued frames head first until the queue is empty or a write fails
    async fn write_packets(&self) {
        while !self.should_exit() && self.is_armed() {
            let (pending, epoch) = {
                let mut writer = self.writer.lock();
                if writer.is_empty() {
                    let Some(packet) = self.outbound.pop() else {
                        return;
                    };
                    if let Err(e) = writer.add_new(packet) {
                        warn!("Could not load frame: {}", e);
                        return;
                    }
                }
                (writer.pending(), writer.epoch())
            };

            // A reconnect may have reset the writer since the frame was loaded
            if !self.is_armed() || self.writer.lock().epoch() != epoch {
                continue;
            }

            let result = match self.socket.send(&pending).await {
                Ok(0) => Err(std::io::Error::new(
                    std::io::ErrorKind::WriteZero,
                    "socket accepted no bytes",
                )),
                other => other,
            };
            let failed = match &result {
                Ok(n) => {
                    self.counters.bytes_sent.fetch_add(*n as u64, Ordering::Relaxed);
                    false
                }
                Err(e) => {
                    warn!("Write failed: {}", e);
                    self.counters.write_errors.fetch_add(1, Ordering::Relaxed);
                    true
                }
            };

            if let Some(true) = self.writer.lock().complete_write(epoch, result) {
                self.counters.frames_sent.fetch_add(1, Ordering::Relaxed);
            }

            // Retry on the next wake-up rather than spin on a failing socket
            if failed {
                return;
            }
        }
    }
}

impl std::fmt::Debug for SendActivity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SendActivity")
            .field("queued", &self.outbound.len())
            .field("stats", &self.stats())
            .finish()
    }
}
