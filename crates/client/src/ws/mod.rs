//! Real-time connection to the chat server.
//!
//! ```text
//!   ChatClient ──commands──▶ ┌──────────────────────┐ ◀── heartbeat ticks
//!       ▲                    │  connection loop     │ ◀── reconnect timer
//!       │  status/session    │  (ConnectionMachine) │ ◀── credential refresh
//!       │  live messages     └──────────────────────┘
//!       │  ClientEvent              │        ▲
//!       └───────────────────────────┘        │ TransportEvent
//!                                  open/send/close
//!                                           ▼
//!                                    Connector / Transport
//! ```
//!
//! Everything that changes connection state arrives as an input on one
//! queue and is handled in order by the machine, so a late timer or a
//! superseded transport can never act on a connection it does not own.

mod connection;
mod event;
mod heartbeat;
mod machine;
mod manager;
mod reconnect;

pub use connection::{
    ConnectionStatus, Connector, Transport, TransportEvent, TransportSink, WsConnector,
};
pub use event::{ClientEvent, MessageDirection};
pub use manager::ChatClient;
