//! Shared helpers for runtime integration tests

#![allow(dead_code)]

use std::collections::VecDeque;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use hypercube_core::{command_id, PacketHeader, RawSocket, Subsystem, HEADER_LEN};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::Layer;

// ----------------------------------------------------------------------------
// Stub Server Helpers
// ----------------------------------------------------------------------------

/// Listener on an ephemeral local port
pub async fn stub_listener() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, port)
}

/// Encode one frame the way the server would
pub fn encode_frame(subsystem: Subsystem, payload: &str) -> Vec<u8> {
    let header = PacketHeader {
        subsystem: subsystem.as_u16(),
        command: command_id::JSON,
        payload_len: payload.len() as u32,
    };
    let mut frame = header.to_bytes().to_vec();
    frame.extend_from_slice(payload.as_bytes());
    frame
}

/// Read one whole frame, or None once the client hangs up
pub async fn read_frame(stream: &mut TcpStream) -> Option<(PacketHeader, String)> {
    let mut header = [0u8; HEADER_LEN];
    stream.read_exact(&mut header).await.ok()?;
    let header = PacketHeader::from_bytes(&header);
    let mut payload = vec![0u8; header.payload_len as usize];
    stream.read_exact(&mut payload).await.ok()?;
    Some((header, String::from_utf8(payload).ok()?))
}

/// Read frames until a signalling frame with `command` arrives
pub async fn read_until_command(stream: &mut TcpStream, command: &str) -> Option<serde_json::Value> {
    while let Some((header, payload)) = read_frame(stream).await {
        if header.subsystem != Subsystem::Signalling.as_u16() {
            continue;
        }
        let json: serde_json::Value = serde_json::from_str(&payload).ok()?;
        if json["command"] == command {
            return Some(json);
        }
    }
    None
}

pub async fn write_signalling(stream: &mut TcpStream, json: serde_json::Value) {
    let frame = encode_frame(Subsystem::Signalling, &json.to_string());
    stream.write_all(&frame).await.unwrap();
}

/// Split a captured byte stream into whole frames
pub fn split_frames(mut bytes: &[u8]) -> Vec<(PacketHeader, String)> {
    let mut frames = Vec::new();
    while bytes.len() >= HEADER_LEN {
        let mut header = [0u8; HEADER_LEN];
        header.copy_from_slice(&bytes[..HEADER_LEN]);
        let header = PacketHeader::from_bytes(&header);
        let end = HEADER_LEN + header.payload_len as usize;
        if bytes.len() < end {
            break;
        }
        let payload = String::from_utf8(bytes[HEADER_LEN..end].to_vec()).unwrap();
        frames.push((header, payload));
        bytes = &bytes[end..];
    }
    frames
}

/// Command names of the signalling frames in a captured stream
pub fn signalling_commands(bytes: &[u8]) -> Vec<String> {
    split_frames(bytes)
        .into_iter()
        .filter(|(header, _)| header.subsystem == Subsystem::Signalling.as_u16())
        .map(|(_, payload)| {
            let json: serde_json::Value = serde_json::from_str(&payload).unwrap();
            json["command"].as_str().unwrap_or_default().to_string()
        })
        .collect()
}

/// Poll `check` until it holds or the deadline passes
pub async fn eventually<F: Fn() -> bool>(timeout: Duration, check: F) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    check()
}

// ----------------------------------------------------------------------------
// Scripted Mock Socket
// ----------------------------------------------------------------------------

/// What the mock does on one connect attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectBehaviour {
    /// Connect fails with `ConnectionRefused`
    Refuse,
    /// Connect succeeds, then the first read reports an orderly close
    AcceptThenHangup,
    /// Connect succeeds and stays open until closed locally
    Accept,
}

/// What the mock does on one `send` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendBehaviour {
    /// Accept at most this many bytes
    Partial(usize),
    /// Fail with `BrokenPipe` without accepting anything
    Fail,
}

/// `RawSocket` whose connects follow a script and are timestamped
///
/// Once the connect script runs out every further attempt is refused. Once
/// the send script runs out every send is accepted whole.
#[derive(Default)]
pub struct MockSocket {
    script: Mutex<VecDeque<ConnectBehaviour>>,
    send_script: Mutex<VecDeque<SendBehaviour>>,
    connect_hold: Mutex<Option<Duration>>,
    attempts: Mutex<Vec<Instant>>,
    current: Mutex<Option<ConnectBehaviour>>,
    sent: Mutex<Vec<u8>>,
    valid: AtomicBool,
    closed: Notify,
}

impl MockSocket {
    pub fn scripted(script: &[ConnectBehaviour]) -> Arc<Self> {
        let socket = Self::default();
        socket.script.lock().unwrap().extend(script.iter().copied());
        Arc::new(socket)
    }

    /// Script the results of the next `send` calls
    pub fn script_sends(&self, sends: &[SendBehaviour]) {
        self.send_script.lock().unwrap().extend(sends.iter().copied());
    }

    /// Keep `connect` pending for `hold` after the socket turns valid
    pub fn hold_connect(&self, hold: Duration) {
        *self.connect_hold.lock().unwrap() = Some(hold);
    }

    pub fn attempts(&self) -> Vec<Instant> {
        self.attempts.lock().unwrap().clone()
    }

    pub fn sent_bytes(&self) -> Vec<u8> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl RawSocket for MockSocket {
    async fn connect(&self, _address: &str, _port: u16) -> io::Result<()> {
        self.attempts.lock().unwrap().push(Instant::now());
        let behaviour = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(ConnectBehaviour::Refuse);
        if behaviour == ConnectBehaviour::Refuse {
            return Err(io::Error::new(io::ErrorKind::ConnectionRefused, "scripted refusal"));
        }
        *self.current.lock().unwrap() = Some(behaviour);
        self.valid.store(true, Ordering::SeqCst);
        let hold = *self.connect_hold.lock().unwrap();
        if let Some(hold) = hold {
            tokio::time::sleep(hold).await;
        }
        Ok(())
    }

    async fn recv(&self, _buf: &mut [u8]) -> io::Result<usize> {
        let closed = self.closed.notified();
        tokio::pin!(closed);
        closed.as_mut().enable();
        if !self.is_valid() {
            return Err(io::Error::from(io::ErrorKind::NotConnected));
        }
        if *self.current.lock().unwrap() == Some(ConnectBehaviour::AcceptThenHangup) {
            return Ok(0);
        }
        closed.await;
        Err(io::Error::from(io::ErrorKind::NotConnected))
    }

    async fn send(&self, buf: &[u8]) -> io::Result<usize> {
        if !self.is_valid() {
            return Err(io::Error::from(io::ErrorKind::NotConnected));
        }
        let step = self.send_script.lock().unwrap().pop_front();
        let accepted = match step {
            Some(SendBehaviour::Fail) => {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "scripted failure"));
            }
            Some(SendBehaviour::Partial(max)) => buf.len().min(max),
            None => buf.len(),
        };
        self.sent.lock().unwrap().extend_from_slice(&buf[..accepted]);
        Ok(accepted)
    }

    fn close(&self) {
        self.valid.store(false, Ordering::SeqCst);
        self.current.lock().unwrap().take();
        self.closed.notify_waiters();
    }

    fn is_valid(&self) -> bool {
        self.valid.load(Ordering::SeqCst)
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        None
    }
}

// ----------------------------------------------------------------------------
// Log Capture
// ----------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct CapturedEvent {
    pub level: Level,
    pub message: String,
}

/// Handle to the events recorded by a capture layer
#[derive(Debug, Clone, Default)]
pub struct CapturedLogs {
    events: Arc<Mutex<Vec<CapturedEvent>>>,
}

impl CapturedLogs {
    pub fn events(&self) -> Vec<CapturedEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn contains(&self, level: Level, needle: &str) -> bool {
        self.events()
            .iter()
            .any(|event| event.level == level && event.message.contains(needle))
    }
}

struct CaptureLayer {
    logs: CapturedLogs,
}

struct MessageVisitor {
    message: String,
}

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{:?}", value);
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        }
    }
}

impl<S: Subscriber> Layer<S> for CaptureLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = MessageVisitor {
            message: String::new(),
        };
        event.record(&mut visitor);
        self.logs.events.lock().unwrap().push(CapturedEvent {
            level: *event.metadata().level(),
            message: visitor.message,
        });
    }
}

/// Capture every event on the current thread until the guard drops
///
/// Pair with a current-thread runtime so spawned tasks log on this thread.
pub fn capture_logs() -> (CapturedLogs, tracing::subscriber::DefaultGuard) {
    let logs = CapturedLogs::default();
    let subscriber = tracing_subscriber::registry().with(CaptureLayer { logs: logs.clone() });
    let guard = tracing::subscriber::set_default(subscriber);
    (logs, guard)
}
