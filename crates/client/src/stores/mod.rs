//! Client-side message state: live messages and per-conversation history.

pub mod messages;

pub use messages::{reconcile, Conversation, LiveMessages};
