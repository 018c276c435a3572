//! Message reconciliation.
//!
//! History for a conversation is fetched once per selected peer over REST,
//! while live messages stream in over the transport for every peer at once.
//! [`reconcile`] merges the two into a single timeline: unique by message
//! id, live copies taking precedence, ordered by `created_at`.

use std::collections::HashMap;

use parley_shared::{ApiError, Message};

use crate::api_client::HistorySource;

/// Merge a historical batch with live messages into one timeline.
///
/// Messages are keyed by `id`; a live message replaces a historical one with
/// the same id. The result is sorted ascending by `created_at`, ties broken
/// by `id` so the output does not depend on the order of either input.
pub fn reconcile<'a, H, L>(historical: H, live: L) -> Vec<Message>
where
    H: IntoIterator<Item = &'a Message>,
    L: IntoIterator<Item = &'a Message>,
{
    let mut by_id: HashMap<i64, &Message> = HashMap::new();
    for msg in historical {
        by_id.entry(msg.id).or_insert(msg);
    }
    for msg in live {
        by_id.insert(msg.id, msg);
    }

    let mut timeline: Vec<Message> = by_id.into_values().cloned().collect();
    timeline.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
    timeline
}

/// Every message delivered over the transport to one user, across all peers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LiveMessages {
    /// The authenticated user the messages were delivered to.
    owner: Option<i64>,
    messages: HashMap<i64, Message>,
}

impl LiveMessages {
    /// Bind the set to the user `owner_id`. Messages delivered to a different
    /// user are discarded. Returns whether anything was discarded.
    pub fn adopt(&mut self, owner_id: i64) -> bool {
        let switched = self.owner.is_some_and(|owner| owner != owner_id);
        self.owner = Some(owner_id);
        if switched && !self.messages.is_empty() {
            self.messages.clear();
            return true;
        }
        false
    }

    pub fn owner(&self) -> Option<i64> {
        self.owner
    }

    /// Record a pushed message. A later push with the same id replaces the
    /// earlier one. Returns `false` if the id was already present.
    pub fn insert(&mut self, msg: Message) -> bool {
        self.messages.insert(msg.id, msg).is_none()
    }

    pub fn get(&self, id: i64) -> Option<&Message> {
        self.messages.get(&id)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// Live messages exchanged between the owner and `peer_id`.
    pub fn with_peer(&self, peer_id: i64) -> impl Iterator<Item = &Message> {
        let owner = self.owner;
        self.messages
            .values()
            .filter(move |m| m.involves(peer_id) && owner.map_or(true, |me| m.involves(me)))
    }
}

/// The conversation with one peer, and the history fetched for it.
#[derive(Debug, Clone, PartialEq)]
pub struct Conversation {
    peer_id: i64,
    history: Vec<Message>,
    is_loaded: bool,
}

impl Conversation {
    pub fn new(peer_id: i64) -> Self {
        Self {
            peer_id,
            history: Vec::new(),
            is_loaded: false,
        }
    }

    /// Fetch the conversation's history from `source`.
    pub async fn load<S>(source: &S, peer_id: i64, limit: u32) -> Result<Self, ApiError>
    where
        S: HistorySource + ?Sized,
    {
        let mut conversation = Self::new(peer_id);
        conversation.set_history(source.fetch_history(peer_id, limit, 0).await?);
        Ok(conversation)
    }

    pub fn peer_id(&self) -> i64 {
        self.peer_id
    }

    /// Replace the history (from a REST fetch), in whatever order it came.
    /// Marks the conversation as loaded.
    pub fn set_history(&mut self, messages: Vec<Message>) {
        self.history = messages;
        self.is_loaded = true;
    }

    pub fn history(&self) -> &[Message] {
        &self.history
    }

    /// Whether history has been fetched for this conversation.
    pub fn is_loaded(&self) -> bool {
        self.is_loaded
    }

    /// The reconciled timeline of this conversation.
    pub fn timeline(&self, live: &LiveMessages) -> Vec<Message> {
        reconcile(&self.history, live.with_peer(self.peer_id))
    }
}
