//! The client facade and its connection loop.

use std::sync::Arc;

use parley_shared::{Identity, Message};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::sync::{broadcast, watch};

use super::connection::{ConnectionStatus, Connector, Input, WsConnector};
use super::event::ClientEvent;
use super::machine::{ConnectionMachine, Outputs};
use crate::config::ClientConfig;
use crate::credentials::CredentialProvider;
use crate::error::ClientError;
use crate::session::Session;
use crate::stores::{Conversation, LiveMessages};

/// Handle to one chat connection.
///
/// Commands are queued to a background loop that owns the connection state
/// machine; state is observed through cheap snapshots and the event stream
/// from [`ChatClient::subscribe`]. Must be created inside a Tokio runtime.
/// Dropping the handle disconnects cleanly and stops the loop.
pub struct ChatClient {
    inputs: UnboundedSender<Input>,
    credentials: Arc<dyn CredentialProvider>,
    status: watch::Receiver<ConnectionStatus>,
    session: watch::Receiver<Session>,
    live: watch::Receiver<LiveMessages>,
    events: broadcast::Sender<ClientEvent>,
}

impl ChatClient {
    /// Start a client that dials with `connector`.
    pub fn spawn(
        config: ClientConfig,
        credentials: Arc<dyn CredentialProvider>,
        connector: Arc<dyn Connector>,
    ) -> Self {
        let (inputs, receiver) = unbounded_channel();
        let (outputs, observers) = Outputs::channel(config.event_capacity);

        let machine = ConnectionMachine::new(
            config,
            credentials.clone(),
            connector,
            inputs.clone(),
            outputs,
        );
        tokio::spawn(run(machine, receiver));

        Self {
            inputs,
            credentials,
            status: observers.status,
            session: observers.session,
            live: observers.live,
            events: observers.events,
        }
    }

    /// Start a client over real WebSockets.
    pub fn with_websocket(config: ClientConfig, credentials: Arc<dyn CredentialProvider>) -> Self {
        Self::spawn(config, credentials, Arc::new(WsConnector::default()))
    }

    /// Open the connection and authenticate with the current credential.
    ///
    /// Fails immediately when no credential is available. Otherwise the
    /// outcome is reported through status changes and events; calling this
    /// while a connection is pending or open does nothing.
    pub fn connect(&self) -> Result<(), ClientError> {
        if self.credentials.current().is_none() {
            crate::log_warn!("connect refused: no credential available");
            let _ = self
                .events
                .send(ClientEvent::Error(ClientError::CredentialMissing));
            return Err(ClientError::CredentialMissing);
        }
        self.post(Input::Connect)
    }

    /// Close the connection cleanly and cancel any pending reconnect.
    pub fn disconnect(&self) -> Result<(), ClientError> {
        self.post(Input::Disconnect)
    }

    /// Send a direct message to `receiver_id`.
    ///
    /// Only permitted while authenticated. Nothing is queued for later:
    /// callers retry once the status returns to authenticated.
    pub fn send(&self, receiver_id: i64, content: impl Into<String>) -> Result<(), ClientError> {
        if !self.status().is_authenticated() {
            return Err(ClientError::NotReady);
        }
        self.post(Input::Send {
            receiver_id,
            content: content.into(),
        })
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    /// The identity of the authenticated connection, if any.
    pub fn identity(&self) -> Option<Identity> {
        self.session.borrow().identity().cloned()
    }

    pub fn session(&self) -> Session {
        self.session.borrow().clone()
    }

    /// Subscribe to client events from this point on.
    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    /// Snapshot of every message delivered live so far.
    pub fn live_messages(&self) -> LiveMessages {
        self.live.borrow().clone()
    }

    /// The reconciled timeline of `conversation`: its history merged with
    /// live messages exchanged with its peer.
    pub fn timeline(&self, conversation: &Conversation) -> Vec<Message> {
        conversation.timeline(&self.live.borrow())
    }

    /// Wait until the status equals `target`.
    pub async fn wait_for_status(&self, target: ConnectionStatus) -> Result<(), ClientError> {
        let mut status = self.status.clone();
        if status.wait_for(|current| *current == target).await.is_err() {
            return Err(ClientError::Shutdown);
        }
        Ok(())
    }

    fn post(&self, input: Input) -> Result<(), ClientError> {
        self.inputs.send(input).map_err(|_| ClientError::Shutdown)
    }
}

impl Drop for ChatClient {
    fn drop(&mut self) {
        let _ = self.inputs.send(Input::Shutdown);
    }
}

async fn run(mut machine: ConnectionMachine, mut inputs: UnboundedReceiver<Input>) {
    crate::log_debug!("Connection loop started");
    while let Some(input) = inputs.recv().await {
        if !machine.handle(input) {
            break;
        }
    }
    machine.disconnect();
    crate::log_debug!("Connection loop stopped");
}
