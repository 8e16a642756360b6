//! Signalling session
//!
//! Owns the connection lifecycle: connect, handshake, interpreting signalling
//! frames, noticing disconnects and reconnecting on a schedule.
//!
//! ```text
//! Disconnected -> Connecting -> Connected -> Handshaking -> Open
//!      ^                                                     |
//!      +------------------ read or connect failure ----------+
//! ```

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use hypercube_core::{
    ClientConfig, CodecError, HyperCubeError, Identity, Msg, MsgCodec, Packet, RawSocket, Result,
    Signal, SignallingError, SignallingMessage,
};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::hooks::{CoreHooks, SessionHooks};

// ----------------------------------------------------------------------------
// Session State
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    Handshaking,
    Open,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Connecting => "connecting",
            SessionState::Connected => "connected",
            SessionState::Handshaking => "handshaking",
            SessionState::Open => "open",
        };
        f.write_str(name)
    }
}

/// Snapshot of the session state and its counters
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionStatus {
    pub state: SessionState,
    /// Set by a disconnect, cleared once the reconnect grace period starts
    pub just_disconnected: bool,
    pub connection_attempts: u64,
    pub successful_connections: u64,
    pub failed_connections: u64,
    pub handshake_failures: u64,
    /// A failed connect in the current streak has been logged
    pub warned: bool,
}

impl Default for SessionStatus {
    fn default() -> Self {
        Self {
            state: SessionState::Disconnected,
            just_disconnected: false,
            connection_attempts: 0,
            successful_connections: 0,
            failed_connections: 0,
            handshake_failures: 0,
            warned: false,
        }
    }
}

impl SessionStatus {
    pub fn is_connected(&self) -> bool {
        !matches!(
            self.state,
            SessionState::Disconnected | SessionState::Connecting
        )
    }
}

// ----------------------------------------------------------------------------
// Signalling Session
// ----------------------------------------------------------------------------

pub struct SignallingSession {
    core: Arc<dyn CoreHooks>,
    socket: Arc<dyn RawSocket>,
    codec: MsgCodec,
    config: ClientConfig,
    identity: Identity,
    server: Mutex<String>,
    status: Mutex<SessionStatus>,
    connected: AtomicBool,
    disconnected: Signal,
    stop: Signal,
    exit: AtomicBool,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl SignallingSession {
    pub fn new(
        core: Arc<dyn CoreHooks>,
        socket: Arc<dyn RawSocket>,
        config: ClientConfig,
        identity: Identity,
    ) -> Self {
        Self {
            core,
            socket,
            codec: MsgCodec::new(config.max_payload_len),
            config,
            identity,
            server: Mutex::new(String::new()),
            status: Mutex::new(SessionStatus::default()),
            connected: AtomicBool::new(false),
            disconnected: Signal::new(),
            stop: Signal::new(),
            exit: AtomicBool::new(false),
            handle: Mutex::new(None),
        }
    }

    /// Spawn the session loop against `server`
    pub fn start(self: &Arc<Self>, server: &str) -> Result<()> {
        let mut handle = self.handle.lock();
        if handle.is_some() {
            return Err(HyperCubeError::AlreadyRunning);
        }
        *self.server.lock() = server.to_string();
        self.exit.store(false, Ordering::SeqCst);
        self.stop.reset();

        let session = Arc::clone(self);
        *handle = Some(tokio::spawn(async move { session.run().await }));
        Ok(())
    }

    pub fn request_exit(&self) {
        self.exit.store(true, Ordering::SeqCst);
        self.stop.notify();
        self.disconnected.notify();
    }

    /// Stop the loop, then tear down any open connection
    pub async fn stop(&self) {
        self.request_exit();
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!("Session task failed: {}", e);
            }
        }
        self.on_disconnect();
        self.disconnected.reset();
        self.status.lock().just_disconnected = false;
    }

    pub fn status(&self) -> SessionStatus {
        self.status.lock().clone()
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Run the disconnect cascade once per connection
    pub fn on_disconnect(&self) {
        if !self.connected.swap(false, Ordering::SeqCst) {
            return;
        }
        {
            let mut status = self.status.lock();
            status.state = SessionState::Disconnected;
            status.just_disconnected = true;
        }
        info!("Disconnected from {}", self.server.lock());

        self.socket.close();
        self.core.on_disconnect();
        self.disconnected.notify();
    }

    fn should_exit(&self) -> bool {
        self.exit.load(Ordering::SeqCst)
    }

    // ------------------------------------------------------------------------
    // Session loop
    // ------------------------------------------------------------------------

    async fn run(self: Arc<Self>) {
        info!(
            "Session started for {} (systemId {})",
            self.identity.connection_info.connection_name, self.identity.system_id
        );

        while !self.should_exit() {
            if !self.is_connected() {
                if self.take_just_disconnected() {
                    self.disconnected.reset();
                    self.pause(self.config.reconnect_delay).await;
                    if self.should_exit() {
                        break;
                    }
                }
                if !self.connect_and_handshake().await && !self.should_exit() {
                    self.pause(self.config.reconnect_interval).await;
                }
            } else {
                self.pause(self.config.reconnect_interval).await;
                self.disconnected.reset();
                if self.is_connected() && !self.socket.is_valid() {
                    debug!("Heartbeat found the socket closed");
                    self.on_disconnect();
                }
            }
        }

        info!("Session stopped");
    }

    /// Sleep for `duration`, cut short by a disconnect or a stop request
    async fn pause(&self, duration: Duration) {
        tokio::select! {
            _ = self.disconnected.wait_timeout(duration) => {}
            _ = self.stop.wait() => {}
        }
    }

    fn take_just_disconnected(&self) -> bool {
        std::mem::take(&mut self.status.lock().just_disconnected)
    }

    async fn connect_and_handshake(&self) -> bool {
        let server = self.server.lock().clone();
        let port = self.config.server_port;
        {
            let mut status = self.status.lock();
            status.state = SessionState::Connecting;
            status.connection_attempts += 1;
        }

        let result = tokio::select! {
            result = self.socket.connect(&server, port) => result,
            _ = self.stop.wait() => {
                self.socket.close();
                self.status.lock().state = SessionState::Disconnected;
                return false;
            }
        };

        if let Err(e) = result {
            let first_in_streak = {
                let mut status = self.status.lock();
                status.state = SessionState::Disconnected;
                status.failed_connections += 1;
                !std::mem::replace(&mut status.warned, true)
            };
            if first_in_streak {
                warn!("Failed to connect to {}:{}: {}", server, port, e);
            }
            return false;
        }

        {
            let mut status = self.status.lock();
            status.state = SessionState::Connected;
            status.successful_connections += 1;
            status.warned = false;
        }
        self.connected.store(true, Ordering::SeqCst);
        info!(
            "Connected to {}:{} from {:?}",
            server,
            port,
            self.socket.local_addr()
        );

        {
            let mut status = self.status.lock();
            if status.state == SessionState::Connected {
                status.state = SessionState::Handshaking;
            }
        }
        self.core.on_connect(&self.handshake());
        true
    }

    /// Best effort: failures are logged and the handshake is not retried
    fn handshake(&self) -> Vec<Msg> {
        let system_id = self.identity.system_id;
        let handshake = [
            SignallingMessage::connection_info(self.identity.connection_info.clone(), system_id),
            SignallingMessage::create_group(self.config.group_name.clone(), system_id),
            SignallingMessage::local_ping(system_id),
        ];
        handshake
            .iter()
            .filter_map(|message| match message.to_msg() {
                Ok(msg) => {
                    debug!("Sending {}", message.command_name());
                    Some(msg)
                }
                Err(e) => {
                    warn!("Could not send {}: {}", message.command_name(), e);
                    None
                }
            })
            .collect()
    }

    // ------------------------------------------------------------------------
    // Outbound signalling
    // ------------------------------------------------------------------------

    fn send_signalling(&self, message: &SignallingMessage) -> core::result::Result<(), CodecError> {
        debug!("Sending {}", message.command_name());
        self.core.send_msg(&message.to_msg()?)
    }

    pub fn create_group(&self, group_name: &str) -> core::result::Result<(), CodecError> {
        self.send_signalling(&SignallingMessage::create_group(
            group_name,
            self.identity.system_id,
        ))
    }

    pub fn subscribe(&self, group_name: &str) -> core::result::Result<(), CodecError> {
        self.send_signalling(&SignallingMessage::subscribe(
            group_name,
            self.identity.system_id,
        ))
    }

    pub fn publish(&self, group_id: u64) -> core::result::Result<(), CodecError> {
        self.send_signalling(&SignallingMessage::publish(
            group_id,
            self.identity.system_id,
        ))
    }

    pub fn send_echo(&self, data: &str) -> core::result::Result<(), CodecError> {
        self.send_signalling(&SignallingMessage::echo(data, self.identity.system_id))
    }

    pub fn send_local_ping(&self) -> core::result::Result<(), CodecError> {
        self.send_signalling(&SignallingMessage::local_ping(self.identity.system_id))
    }

    // ------------------------------------------------------------------------
    // Inbound signalling
    // ------------------------------------------------------------------------

    fn handle_signalling(&self, packet: &Packet) {
        let json = match self.codec.packet_to_json(packet) {
            Ok((_, json)) => json,
            Err(e) => {
                warn!("Malformed signalling frame: {}", e);
                return;
            }
        };

        let message = match SignallingMessage::from_value(json) {
            Ok(message) => message,
            Err(SignallingError::UnknownCommand(command)) => {
                info!("Ignoring unknown signalling command '{}'", command);
                return;
            }
            Err(e) => {
                warn!("{}", e);
                return;
            }
        };

        self.apply(message);
    }

    fn apply(&self, message: SignallingMessage) {
        if let Some(reply) = message.reply(self.identity.system_id) {
            debug!("Answering {}", message.command_name());
            if let Err(e) = self.send_signalling(&reply) {
                warn!("Could not answer {}: {}", message.command_name(), e);
            }
            return;
        }

        match message {
            SignallingMessage::ConnectionInfo {
                status: Some(true), ..
            } => {
                let opened = {
                    let mut status = self.status.lock();
                    if status.state == SessionState::Handshaking {
                        status.state = SessionState::Open;
                        true
                    } else {
                        false
                    }
                };
                if opened {
                    info!("Handshake accepted, session open");
                }
            }
            SignallingMessage::ConnectionInfo {
                status: Some(false),
                ..
            } => {
                self.status.lock().handshake_failures += 1;
                warn!("Server rejected connectionInfo");
            }
            SignallingMessage::CreateGroupAck {
                status: true,
                group_name,
                group_id,
            } => {
                info!(
                    "Group {} created (groupId {:?})",
                    group_name.as_deref().unwrap_or(&self.config.group_name),
                    group_id
                );
            }
            SignallingMessage::CreateGroupAck {
                status: false,
                group_name,
                ..
            } => {
                self.status.lock().handshake_failures += 1;
                warn!(
                    "createGroup failed for '{}': possible duplicate name",
                    group_name.as_deref().unwrap_or(&self.config.group_name)
                );
            }
            SignallingMessage::LocalPing { data, .. }
            | SignallingMessage::RemotePing { data, .. } => {
                debug!("Ping acknowledged: {}", data);
            }
            SignallingMessage::EchoData { data, .. } => {
                info!("Echo returned: {}", data);
            }
            SignallingMessage::Subscriber { group_id, .. } => {
                info!("Subscriber joined group {:?}", group_id);
                self.core.on_open_for_data();
            }
            SignallingMessage::Unsubscriber { group_id, .. } => {
                info!("Subscriber left group {:?}", group_id);
                self.core.on_closed_for_data();
            }
            other => {
                debug!("Ignoring inbound {}", other.command_name());
            }
        }
    }
}

impl SessionHooks for SignallingSession {
    fn is_signalling_packet(&self, packet: &Packet) -> bool {
        if !packet.is_signalling() {
            return false;
        }
        self.handle_signalling(packet);
        true
    }

    fn notify_socket_closed(&self) {
        self.on_disconnect();
    }
}

impl fmt::Debug for SignallingSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignallingSession")
            .field("identity", &self.identity)
            .field("status", &self.status())
            .finish()
    }
}
