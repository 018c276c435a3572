//! Connection status and the transport seam.
//!
//! The state machine never touches a socket directly. It asks a
//! [`Connector`] to open a [`Transport`], and the connector reports what
//! happens on that transport through a [`TransportSink`]. Each sink is
//! stamped with the generation of the attempt that created it, so events
//! from a superseded transport are recognized and dropped.

use tokio::sync::mpsc::UnboundedSender;

use crate::error::ClientError;

/// Connection status. Exactly one value at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Authenticated,
}

impl ConnectionStatus {
    /// Whether a transport is open (handshake pending or complete).
    pub fn is_open(&self) -> bool {
        matches!(self, ConnectionStatus::Connected | ConnectionStatus::Authenticated)
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, ConnectionStatus::Authenticated)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Authenticated => "authenticated",
        }
    }
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a transport reports back to the connection loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The connection is established and ready for frames.
    Opened,
    /// One text payload, in transport order.
    Frame(String),
    /// A low-level fault. Always followed by [`TransportEvent::Closed`].
    Error(String),
    /// The connection is gone. Nothing is reported after this.
    Closed { code: u16, reason: String },
}

/// An open (or opening) transport, exclusively owned by the state machine.
pub trait Transport: Send {
    /// Queue one text payload for sending.
    fn send_text(&mut self, text: String) -> Result<(), ClientError>;

    /// Close with the given code and reason.
    fn close(&mut self, code: u16, reason: &str);
}

/// Opens transports.
pub trait Connector: Send + Sync + 'static {
    /// Start opening a transport to `url`. Returns immediately; the outcome
    /// is reported through `sink`.
    fn open(&self, url: &str, sink: TransportSink) -> Box<dyn Transport>;
}

/// Everything the connection loop reacts to, in arrival order.
#[derive(Debug)]
pub(crate) enum Input {
    Connect,
    Disconnect,
    Send { receiver_id: i64, content: String },
    Transport { generation: u64, event: TransportEvent },
    HeartbeatTick { epoch: u64 },
    ReconnectDue { epoch: u64 },
    CredentialRefreshed { epoch: u64, result: Result<String, ClientError> },
    Shutdown,
}

/// Reports events of one transport back to the connection loop.
#[derive(Debug, Clone)]
pub struct TransportSink {
    generation: u64,
    inputs: UnboundedSender<Input>,
}

impl TransportSink {
    pub(crate) fn new(generation: u64, inputs: UnboundedSender<Input>) -> Self {
        Self { generation, inputs }
    }

    /// The connection attempt this sink belongs to.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Report an event. Returns `false` once the client has shut down.
    pub fn emit(&self, event: TransportEvent) -> bool {
        self.inputs
            .send(Input::Transport {
                generation: self.generation,
                event,
            })
            .is_ok()
    }

    /// Whether the client is still listening.
    pub fn is_closed(&self) -> bool {
        self.inputs.is_closed()
    }
}

mod connection_native;
pub use connection_native::WsConnector;
