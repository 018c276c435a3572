//! Data model exchanged between the chat server and its clients.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// --- Identity ---

/// The authenticated user, as resolved by the server during the handshake.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Identity {
    pub id: i64,
    pub username: String,
    pub email: String,
}

// --- Messaging ---

/// A direct message between two users.
///
/// `id` is the identity of a message: a historical copy and a live push
/// carrying the same `id` are the same logical message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub id: i64,
    pub sender_id: i64,
    #[serde(alias = "reciever_id")]
    pub receiver_id: i64,
    pub content: String,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub is_read: bool,
}

impl Message {
    /// Whether this message was exchanged with `peer_id`, in either direction.
    pub fn involves(&self, peer_id: i64) -> bool {
        self.sender_id == peer_id || self.receiver_id == peer_id
    }
}

/// One row of the conversation list: the latest message exchanged with a peer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConversationSummary {
    pub other_user_id: i64,
    pub username: String,
    pub last_message: String,
    #[serde(with = "timestamp")]
    pub last_message_time: DateTime<Utc>,
}

/// Lenient timestamp (de)serialization.
///
/// Serializes as RFC 3339. Deserializes RFC 3339 with an offset, or a naive
/// ISO-8601 date-time which is taken to be UTC.
pub mod timestamp {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{de, Deserialize, Deserializer, Serializer};

    const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&ts.to_rfc3339())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| de::Error::custom(format!("invalid timestamp `{raw}`")))
    }

    /// Parse a wire timestamp.
    pub fn parse(raw: &str) -> Option<DateTime<Utc>> {
        if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
            return Some(ts.with_timezone(&Utc));
        }
        NAIVE_FORMATS
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
            .map(|naive| naive.and_utc())
    }
}
