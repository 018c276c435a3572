//! Events dispatched to subscribers of a [`crate::ChatClient`].

use parley_shared::{Identity, Message};

use super::connection::ConnectionStatus;
use crate::error::ClientError;

/// Which side originated a live message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageDirection {
    /// Echo of a message this client sent (`message_sent`).
    Sent,
    /// Pushed by another user (`new_message`).
    Received,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    StatusChanged(ConnectionStatus),
    /// The handshake succeeded.
    Authenticated(Identity),
    /// A live message arrived and was added to the live set.
    MessageArrived {
        message: Message,
        direction: MessageDirection,
    },
    Pong,
    /// A failure worth showing the user. Never carries wire-level detail.
    Error(ClientError),
    /// The transport closed.
    Closed { code: u16, reason: String },
}
