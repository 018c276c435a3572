//! Session context: who the connection is authenticated as.

use parley_shared::Identity;

/// Identity and authentication status of the current connection.
///
/// Populated exactly once per successful handshake and cleared whenever the
/// connection leaves the authenticated state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    identity: Option<Identity>,
}

impl Session {
    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.identity.is_some()
    }

    /// Record the identity the server resolved during the handshake.
    pub(crate) fn establish(&mut self, identity: Identity) {
        self.identity = Some(identity);
    }

    /// Forget the identity. Returns whether there was one.
    pub(crate) fn clear(&mut self) -> bool {
        self.identity.take().is_some()
    }
}
