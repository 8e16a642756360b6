//! HyperCube client coordinator
//!
//! Composes the session and the two I/O activities around one shared socket,
//! routes outbound messages to the send activity and hands inbound
//! application messages to the caller.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use hypercube_core::{
    ClientConfig, CodecError, HyperCubeError, IdGenerator, Identity, Msg, MsgCodec, Packet,
    RandomIdGenerator, RawSocket, Result, TcpClient,
};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::activities::{RecvActivity, RecvStats, SendActivity, SendStats};
use crate::hooks::{CoreHooks, SessionHooks};
use crate::session::{SessionStatus, SignallingSession};

// ----------------------------------------------------------------------------
// Statistics
// ----------------------------------------------------------------------------

/// Combined view of the session and both activities
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientStats {
    pub session: SessionStatus,
    pub recv: RecvStats,
    pub send: SendStats,
    pub inbound_queued: usize,
    pub outbound_queued: usize,
    pub open_for_data: bool,
}

// ----------------------------------------------------------------------------
// Core Link
// ----------------------------------------------------------------------------

/// The coordinator's side of the session callbacks
///
/// Holds the activities but not the session, so no reference cycle forms.
struct CoreLink {
    recv: Arc<RecvActivity>,
    send: Arc<SendActivity>,
    codec: MsgCodec,
    open_for_data: AtomicBool,
}

impl CoreHooks for CoreLink {
    fn send_msg(&self, msg: &Msg) -> core::result::Result<(), CodecError> {
        let packet = self.codec.msg_to_packet(msg)?;
        self.send.send_packet(packet);
        Ok(())
    }

    fn on_connect(&self, handshake: &[Msg]) {
        let packets = handshake
            .iter()
            .filter_map(|msg| match self.codec.msg_to_packet(msg) {
                Ok(packet) => Some(packet),
                Err(e) => {
                    warn!("Could not encode handshake message: {}", e);
                    None
                }
            })
            .collect();
        self.recv.on_connect();
        self.send.on_connect(packets);
    }

    fn on_disconnect(&self) {
        self.recv.on_disconnect();
        self.send.on_disconnect();
        self.on_closed_for_data();
    }

    fn on_open_for_data(&self) {
        if !self.open_for_data.swap(true, Ordering::SeqCst) {
            info!("Open for data");
        }
    }

    fn on_closed_for_data(&self) {
        if self.open_for_data.swap(false, Ordering::SeqCst) {
            info!("Closed for data");
        }
    }
}

// ----------------------------------------------------------------------------
// HyperCube Client
// ----------------------------------------------------------------------------

/// Persistent client connection to a HyperCube server
pub struct HyperCubeClient {
    config: ClientConfig,
    socket: Arc<dyn RawSocket>,
    codec: MsgCodec,
    link: Arc<CoreLink>,
    recv: Arc<RecvActivity>,
    send: Arc<SendActivity>,
    session: Arc<SignallingSession>,
    running: AtomicBool,
}

impl HyperCubeClient {
    /// Build a client over `socket` with an identity drawn from `ids`
    pub fn new(
        config: ClientConfig,
        socket: Arc<dyn RawSocket>,
        ids: &dyn IdGenerator,
    ) -> Result<Self> {
        config.validate()?;

        let codec = MsgCodec::new(config.max_payload_len);
        let recv = Arc::new(RecvActivity::new(
            Arc::clone(&socket),
            config.max_payload_len,
            config.read_chunk_len,
        ));
        let send = Arc::new(SendActivity::new(Arc::clone(&socket)));
        let link = Arc::new(CoreLink {
            recv: Arc::clone(&recv),
            send: Arc::clone(&send),
            codec,
            open_for_data: AtomicBool::new(false),
        });

        let identity = Identity::generate(config.connection_name.clone(), ids);
        let core: Arc<dyn CoreHooks> = link.clone();
        let session = Arc::new(SignallingSession::new(
            core,
            Arc::clone(&socket),
            config.clone(),
            identity,
        ));

        Ok(Self {
            config,
            socket,
            codec,
            link,
            recv,
            send,
            session,
            running: AtomicBool::new(false),
        })
    }

    /// Build a client over a real TCP socket with a random identity
    pub fn with_tcp(config: ClientConfig) -> Result<Self> {
        let socket: Arc<dyn RawSocket> = Arc::new(TcpClient::new(config.connect_timeout));
        Self::new(config, socket, &RandomIdGenerator)
    }

    /// Start the activities, then the session loop connecting to `server`
    pub fn init(&self, server: &str) -> Result<()> {
        if server.trim().is_empty() {
            return Err(HyperCubeError::config_error("server address must not be empty"));
        }
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(HyperCubeError::AlreadyRunning);
        }

        info!(
            "Starting HyperCube client '{}' for {}:{}",
            self.config.connection_name, server, self.config.server_port
        );

        let session: Arc<dyn SessionHooks> = self.session.clone();
        let hooks: Weak<dyn SessionHooks> = Arc::downgrade(&session);
        let started = self
            .recv
            .start(hooks)
            .and_then(|_| self.send.start())
            .and_then(|_| self.session.start(server));

        if let Err(e) = started {
            self.running.store(false, Ordering::SeqCst);
            return Err(e);
        }
        Ok(())
    }

    /// Stop the session, close the socket, then stop the activities
    pub async fn deinit(&self) -> Result<()> {
        if !self.running.swap(false, Ordering::SeqCst) {
            return Err(HyperCubeError::NotRunning);
        }

        self.session.stop().await;
        self.socket.close();
        self.recv.stop().await;
        self.send.stop().await;
        self.link.on_closed_for_data();

        info!("HyperCube client stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    // ------------------------------------------------------------------------
    // Application data
    // ------------------------------------------------------------------------

    /// Queue a message for sending; never blocks
    ///
    /// Only encoding problems are reported. Transport failures show up in
    /// `status()`, and messages queued while disconnected are dropped.
    pub fn send_msg(&self, msg: &Msg) -> Result<()> {
        let packet = self.codec.msg_to_packet(msg)?;
        self.send.send_packet(packet);
        Ok(())
    }

    /// Take the next inbound application message, if any
    ///
    /// Packets that do not decode are logged and skipped.
    pub fn recv_msg(&self) -> Option<Msg> {
        while let Some(packet) = self.recv.pop() {
            match self.codec.packet_to_msg(&packet) {
                Ok(msg) => return Some(msg),
                Err(e) => warn!("Dropping undecodable packet: {}", e),
            }
        }
        None
    }

    /// Decode the next inbound application message without taking it
    ///
    /// Undecodable packets at the head are dropped, as `recv_msg` would.
    pub fn peek_msg(&self) -> Option<Msg> {
        loop {
            match self.recv.peek_with(|packet| self.codec.packet_to_msg(packet))? {
                Ok(msg) => return Some(msg),
                Err(e) => {
                    warn!("Dropping undecodable packet: {}", e);
                    self.recv.pop();
                }
            }
        }
    }

    /// Take the next inbound application packet without decoding it
    pub fn get_packet(&self) -> Option<Packet> {
        self.recv.pop()
    }

    /// Wait until inbound data is available or the timeout elapses
    pub async fn wait_for_data(&self, timeout: Duration) -> bool {
        self.recv.wait_for_data(timeout).await
    }

    // ------------------------------------------------------------------------
    // Status
    // ------------------------------------------------------------------------

    pub fn status(&self) -> SessionStatus {
        self.session.status()
    }

    pub fn identity(&self) -> &Identity {
        self.session.identity()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Whether a peer is subscribed to this client's group
    pub fn is_open_for_data(&self) -> bool {
        self.link.open_for_data.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> ClientStats {
        ClientStats {
            session: self.session.status(),
            recv: self.recv.stats(),
            send: self.send.stats(),
            inbound_queued: self.recv.queued(),
            outbound_queued: self.send.queued(),
            open_for_data: self.is_open_for_data(),
        }
    }

    // ------------------------------------------------------------------------
    // Signalling helpers
    // ------------------------------------------------------------------------

    pub fn create_group(&self, group_name: &str) -> Result<()> {
        Ok(self.session.create_group(group_name)?)
    }

    pub fn subscribe(&self, group_name: &str) -> Result<()> {
        Ok(self.session.subscribe(group_name)?)
    }

    pub fn publish(&self, group_id: u64) -> Result<()> {
        Ok(self.session.publish(group_id)?)
    }

    pub fn send_echo(&self, data: &str) -> Result<()> {
        Ok(self.session.send_echo(data)?)
    }

    pub fn send_local_ping(&self) -> Result<()> {
        Ok(self.session.send_local_ping()?)
    }
}

impl Drop for HyperCubeClient {
    fn drop(&mut self) {
        if self.running.swap(false, Ordering::SeqCst) {
            debug!("Client dropped while running, asking tasks to exit");
            self.session.request_exit();
            self.socket.close();
            self.recv.request_exit();
            self.send.request_exit();
        }
    }
}

impl std::fmt::Debug for HyperCubeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HyperCubeClient")
            .field("config", &self.config)
            .field("running", &self.is_running())
            .field("session", &self.session)
            .finish()
    }
}
