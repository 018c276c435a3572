//! The connection state machine.
//!
//! `disconnected → connecting → connected → authenticated`, and back to
//! `disconnected` from any state on closure or teardown. The machine owns
//! the transport, the heartbeat and reconnection timers, and the session
//! context. It is driven by [`Input`]s processed one at a time on a single
//! loop, so none of its state needs locking.

use std::sync::Arc;

use parley_shared::{FrameError, Identity, Message, WireFrame, CLOSE_NORMAL};
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::{broadcast, watch};

use super::connection::{
    ConnectionStatus, Connector, Input, Transport, TransportEvent, TransportSink,
};
use super::event::{ClientEvent, MessageDirection};
use super::heartbeat::Heartbeat;
use super::reconnect::ReconnectPolicy;
use crate::config::ClientConfig;
use crate::credentials::CredentialProvider;
use crate::error::ClientError;
use crate::session::Session;
use crate::stores::LiveMessages;

/// Where the machine publishes its state.
pub(crate) struct Outputs {
    status: watch::Sender<ConnectionStatus>,
    session: watch::Sender<Session>,
    live: watch::Sender<LiveMessages>,
    events: broadcast::Sender<ClientEvent>,
}

/// Read side of [`Outputs`].
pub(crate) struct Observers {
    pub(crate) status: watch::Receiver<ConnectionStatus>,
    pub(crate) session: watch::Receiver<Session>,
    pub(crate) live: watch::Receiver<LiveMessages>,
    pub(crate) events: broadcast::Sender<ClientEvent>,
}

impl Outputs {
    pub(crate) fn channel(event_capacity: usize) -> (Self, Observers) {
        let (status, status_rx) = watch::channel(ConnectionStatus::Disconnected);
        let (session, session_rx) = watch::channel(Session::default());
        let (live, live_rx) = watch::channel(LiveMessages::default());
        let (events, _) = broadcast::channel(event_capacity.max(1));

        let observers = Observers {
            status: status_rx,
            session: session_rx,
            live: live_rx,
            events: events.clone(),
        };
        let outputs = Self {
            status,
            session,
            live,
            events,
        };
        (outputs, observers)
    }

    fn emit(&self, event: ClientEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

#[derive(Debug, Default)]
struct RefreshState {
    epoch: u64,
    in_flight: bool,
    /// A refresh already happened during this credential's lifetime.
    used: bool,
}

fn signals_expiry(text: &str) -> bool {
    text.to_ascii_lowercase().contains("expired")
}

pub(crate) struct ConnectionMachine {
    config: ClientConfig,
    credentials: Arc<dyn CredentialProvider>,
    connector: Arc<dyn Connector>,
    inputs: UnboundedSender<Input>,
    outputs: Outputs,

    status: ConnectionStatus,
    transport: Option<Box<dyn Transport>>,
    /// Bumped on every open and teardown; events stamped otherwise are stale.
    generation: u64,
    /// Credential to present once the pending transport opens.
    pending_credential: Option<String>,
    session: Session,
    heartbeat: Heartbeat,
    reconnect: ReconnectPolicy,
    refresh: RefreshState,
}

impl ConnectionMachine {
    pub(crate) fn new(
        config: ClientConfig,
        credentials: Arc<dyn CredentialProvider>,
        connector: Arc<dyn Connector>,
        inputs: UnboundedSender<Input>,
        outputs: Outputs,
    ) -> Self {
        Self {
            heartbeat: Heartbeat::new(config.heartbeat_interval),
            reconnect: ReconnectPolicy::new(config.reconnect_delay),
            config,
            credentials,
            connector,
            inputs,
            outputs,
            status: ConnectionStatus::Disconnected,
            transport: None,
            generation: 0,
            pending_credential: None,
            session: Session::default(),
            refresh: RefreshState::default(),
        }
    }

    #[cfg(test)]
    pub(crate) fn status(&self) -> ConnectionStatus {
        self.status
    }

    #[cfg(test)]
    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    #[cfg(test)]
    pub(crate) fn session(&self) -> &Session {
        &self.session
    }

    #[cfg(test)]
    pub(crate) fn reconnect_pending(&self) -> bool {
        self.reconnect.is_pending()
    }

    #[cfg(test)]
    pub(crate) fn heartbeat_running(&self) -> bool {
        self.heartbeat.is_running()
    }

    /// Process one input. Returns `false` once the loop should stop.
    pub(crate) fn handle(&mut self, input: Input) -> bool {
        match input {
            Input::Connect => {
                let _ = self.connect();
            }
            Input::Disconnect => self.disconnect(),
            Input::Send {
                receiver_id,
                content,
            } => {
                if let Err(e) = self.send(receiver_id, &content) {
                    crate::log_warn!("Message to {} not sent: {}", receiver_id, e);
                    self.outputs.emit(ClientEvent::Error(e));
                }
            }
            Input::Transport { generation, event } => self.on_transport(generation, event),
            Input::HeartbeatTick { epoch } => self.on_heartbeat(epoch),
            Input::ReconnectDue { epoch } => self.on_reconnect_due(epoch),
            Input::CredentialRefreshed { epoch, result } => self.on_refreshed(epoch, result),
            Input::Shutdown => {
                self.disconnect();
                return false;
            }
        }
        true
    }

    /// Open a transport with the current credential.
    ///
    /// No-op while a connection is already pending or open.
    pub(crate) fn connect(&mut self) -> Result<(), ClientError> {
        if self.status != ConnectionStatus::Disconnected {
            crate::log_debug!("connect ignored: already {}", self.status);
            return Ok(());
        }

        let Some(token) = self.credentials.current() else {
            crate::log_warn!("Cannot connect: no credential available");
            self.outputs.emit(ClientEvent::Error(ClientError::CredentialMissing));
            return Err(ClientError::CredentialMissing);
        };

        self.open_with(token)
    }

    /// Tear everything down with a clean closure. Idempotent.
    pub(crate) fn disconnect(&mut self) {
        self.refresh.in_flight = false;
        self.refresh.epoch = self.refresh.epoch.wrapping_add(1);

        if self.teardown(CLOSE_NORMAL, "Client disconnect") {
            crate::log_info!("Disconnected by client");
        }
    }

    /// Send a direct message. Only permitted once authenticated; nothing is
    /// queued otherwise.
    pub(crate) fn send(&mut self, receiver_id: i64, content: &str) -> Result<(), ClientError> {
        if !self.status.is_authenticated() {
            return Err(ClientError::NotReady);
        }
        self.transmit(&WireFrame::message(receiver_id, content))
    }

    fn open_with(&mut self, token: String) -> Result<(), ClientError> {
        let url = match self.config.ws_url() {
            Ok(url) => url,
            Err(e) => {
                crate::log_error!("Cannot connect: {}", e);
                self.outputs.emit(ClientEvent::Error(e.clone()));
                return Err(e);
            }
        };

        self.reconnect.cancel();
        self.generation = self.generation.wrapping_add(1);
        let sink = TransportSink::new(self.generation, self.inputs.clone());

        crate::log_info!("Connecting to {} (attempt #{})", url, self.generation);
        self.pending_credential = Some(token);
        self.set_status(ConnectionStatus::Connecting);
        self.transport = Some(self.connector.open(&url, sink));
        Ok(())
    }

    /// Stop timers, close the transport if any, and forget the session.
    /// Returns whether a transport was closed.
    fn teardown(&mut self, code: u16, reason: &str) -> bool {
        self.reconnect.cancel();
        self.heartbeat.stop();
        self.pending_credential = None;

        let closed = match self.transport.take() {
            Some(mut transport) => {
                transport.close(code, reason);
                true
            }
            None => false,
        };
        // Whatever the old transport still reports is stale now
        self.generation = self.generation.wrapping_add(1);

        self.clear_session();
        self.set_status(ConnectionStatus::Disconnected);
        if closed {
            self.outputs.emit(ClientEvent::Closed {
                code,
                reason: reason.to_string(),
            });
        }
        closed
    }

    fn set_status(&mut self, status: ConnectionStatus) {
        if self.status == status {
            return;
        }
        crate::log_info!("Connection status: {} -> {}", self.status, status);
        self.status = status;
        self.outputs.status.send_replace(status);
        self.outputs.emit(ClientEvent::StatusChanged(status));
    }

    fn clear_session(&mut self) {
        if self.session.clear() {
            self.outputs.session.send_replace(Session::default());
        }
    }

    fn transmit(&mut self, frame: &WireFrame) -> Result<(), ClientError> {
        let text = frame.encode()?;
        let transport = self.transport.as_mut().ok_or(ClientError::NotReady)?;
        crate::log_debug!("Sending {} frame", frame.kind());
        transport.send_text(text)
    }

    fn on_transport(&mut self, generation: u64, event: TransportEvent) {
        if generation != self.generation || self.transport.is_none() {
            crate::log_debug!("Dropping {:?} from superseded transport #{}", event, generation);
            return;
        }

        match event {
            TransportEvent::Opened => self.on_open(),
            TransportEvent::Frame(text) => self.on_frame(&text),
            TransportEvent::Error(detail) => {
                crate::log_error!("Transport error: {}", detail);
                self.outputs
                    .emit(ClientEvent::Error(ClientError::TransportError(detail)));
            }
            TransportEvent::Closed { code, reason } => self.on_closed(code, reason),
        }
    }

    fn on_open(&mut self) {
        if self.status != ConnectionStatus::Connecting {
            crate::log_debug!("Ignoring open while {}", self.status);
            return;
        }
        self.set_status(ConnectionStatus::Connected);

        match self.pending_credential.take() {
            Some(token) => {
                if let Err(e) = self.transmit(&WireFrame::auth(token)) {
                    crate::log_error!("Failed to send auth frame: {}", e);
                    self.outputs.emit(ClientEvent::Error(e));
                }
            }
            None => crate::log_error!("Transport opened without a credential to present"),
        }

        self.heartbeat.start(&self.inputs);
    }

    fn on_frame(&mut self, text: &str) {
        let frame = match WireFrame::decode(text) {
            Ok(frame) => frame,
            Err(FrameError::UnknownType(tag)) => {
                crate::log_warn!("Ignoring frame with unknown type `{}`", tag);
                return;
            }
            Err(err) => {
                crate::log_warn!("Dropping {}", err);
                return;
            }
        };

        match frame {
            WireFrame::AuthSuccess { user } => self.on_authenticated(user),
            WireFrame::Error { content } => {
                self.on_server_error(content.unwrap_or_else(|| "Unknown error".to_string()))
            }
            WireFrame::Pong => {
                crate::log_debug!("Pong");
                self.outputs.emit(ClientEvent::Pong);
            }
            WireFrame::MessageSent(message) => self.on_message(message, MessageDirection::Sent),
            WireFrame::NewMessage(message) => self.on_message(message, MessageDirection::Received),
            other @ (WireFrame::Auth { .. } | WireFrame::Ping | WireFrame::Message { .. }) => {
                crate::log_warn!(
                    "Ignoring client-to-server `{}` frame sent by the server",
                    other.kind()
                );
            }
        }
    }

    fn on_authenticated(&mut self, user: Identity) {
        if self.status != ConnectionStatus::Connected {
            crate::log_warn!("Ignoring auth_success while {}", self.status);
            return;
        }
        crate::log_info!("Authenticated as {} (id {})", user.username, user.id);

        let mut discarded = false;
        self.outputs.live.send_if_modified(|live| {
            let owner_changed = live.owner() != Some(user.id);
            discarded = live.adopt(user.id);
            owner_changed
        });
        if discarded {
            crate::log_info!("Discarded live messages of the previous user");
        }

        self.session.establish(user.clone());
        self.outputs.session.send_replace(self.session.clone());
        self.refresh.used = false;
        self.set_status(ConnectionStatus::Authenticated);
        self.outputs.emit(ClientEvent::Authenticated(user));
    }

    fn on_server_error(&mut self, text: String) {
        crate::log_warn!("Server error: {}", text);
        let error = if self.status.is_authenticated() {
            ClientError::ServerError(text.clone())
        } else {
            ClientError::HandshakeRejected(text.clone())
        };
        self.outputs.emit(ClientEvent::Error(error));

        if signals_expiry(&text) {
            self.begin_refresh();
        }
    }

    fn on_message(&mut self, message: Message, direction: MessageDirection) {
        crate::log_debug!(
            "Message {} ({:?}) {} -> {}",
            message.id,
            direction,
            message.sender_id,
            message.receiver_id
        );
        self.outputs.live.send_modify(|live| {
            live.insert(message.clone());
        });
        self.outputs
            .emit(ClientEvent::MessageArrived { message, direction });
    }

    fn on_closed(&mut self, code: u16, reason: String) {
        crate::log_info!("Connection closed ({}: {})", code, reason);

        self.transport = None;
        self.heartbeat.stop();
        self.pending_credential = None;
        self.clear_session();
        self.set_status(ConnectionStatus::Disconnected);
        self.outputs.emit(ClientEvent::Closed {
            code,
            reason,
        });

        if code == CLOSE_NORMAL {
            crate::log_info!("Clean closure; not reconnecting");
        } else if self.refresh.in_flight {
            crate::log_info!("Awaiting credential refresh before reconnecting");
        } else {
            self.schedule_reconnect();
        }
    }

    fn schedule_reconnect(&mut self) {
        if self.credentials.current().is_none() {
            crate::log_info!("No credential available; not reconnecting");
            return;
        }
        if self.reconnect.schedule(&self.inputs) {
            crate::log_info!("Reconnecting in {:?}", self.reconnect.delay());
        }
    }

    fn on_heartbeat(&mut self, epoch: u64) {
        if !self.heartbeat.accepts(epoch) || !self.status.is_open() {
            crate::log_debug!("Ignoring stale heartbeat tick");
            return;
        }
        if let Err(e) = self.transmit(&WireFrame::Ping) {
            crate::log_warn!("Heartbeat ping failed: {}", e);
        }
    }

    fn on_reconnect_due(&mut self, epoch: u64) {
        if !self.reconnect.take_due(epoch) {
            crate::log_debug!("Ignoring stale reconnect timer");
            return;
        }
        crate::log_info!("Reconnect timer fired");
        let _ = self.connect();
    }

    fn begin_refresh(&mut self) {
        if self.refresh.in_flight {
            return;
        }
        if self.refresh.used {
            crate::log_warn!("Credential was already refreshed once; not refreshing again");
            return;
        }

        self.refresh.in_flight = true;
        self.refresh.epoch = self.refresh.epoch.wrapping_add(1);
        let epoch = self.refresh.epoch;
        let credentials = self.credentials.clone();
        let inputs = self.inputs.clone();

        crate::log_info!("Credential expired; requesting a renewed one");
        tokio::spawn(async move {
            let result = credentials.refresh().await;
            let _ = inputs.send(Input::CredentialRefreshed { epoch, result });
        });
    }

    fn on_refreshed(&mut self, epoch: u64, result: Result<String, ClientError>) {
        if !self.refresh.in_flight || epoch != self.refresh.epoch {
            crate::log_debug!("Ignoring stale credential refresh");
            return;
        }
        self.refresh.in_flight = false;
        self.refresh.used = true;

        match result {
            Ok(token) => {
                crate::log_info!("Credential renewed; reconnecting");
                self.teardown(CLOSE_NORMAL, "Credential renewed");
                let _ = self.open_with(token);
            }
            Err(ClientError::RefreshUnsupported) => {
                crate::log_info!("Credential refresh unsupported; falling back to reconnection");
                if self.status == ConnectionStatus::Disconnected {
                    self.schedule_reconnect();
                }
            }
            Err(e) => {
                crate::log_error!("Credential refresh failed: {}", e);
                self.outputs.emit(ClientEvent::Error(e));
            }
        }
    }
}
