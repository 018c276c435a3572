//! Parley client - real-time transport core for the parley chat application.
//!
//! Owns the persistent connection to the chat server: the authentication
//! handshake, liveness pings, reconnection after network loss, and the
//! reconciliation of live-delivered messages with fetched history into one
//! ordered timeline per conversation. [`ChatClient`] is the single entry
//! point the rest of an application depends on.

pub mod logging;

pub mod api_client;
pub mod config;
pub mod credentials;
pub mod error;
pub mod session;
pub mod storage;
pub mod stores;
pub mod ws;

pub use api_client::{ApiClient, HistorySource};
pub use config::ClientConfig;
pub use credentials::{CredentialProvider, StaticCredential, StoredCredential};
pub use error::ClientError;
pub use session::Session;
pub use stores::{reconcile, Conversation, LiveMessages};
pub use ws::{
    ChatClient, ClientEvent, ConnectionStatus, Connector, MessageDirection, Transport,
    TransportEvent, TransportSink, WsConnector,
};

pub use parley_shared::{ConversationSummary, Identity, Message, WireFrame};
