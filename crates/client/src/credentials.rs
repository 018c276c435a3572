//! Credential providers: where the bearer token for each connection attempt comes from.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::ClientError;
use crate::storage::Storage;

/// Storage key the token lives under.
pub const ACCESS_TOKEN_KEY: &str = "access_token";

/// Source of the bearer credential presented in the `auth` frame.
///
/// The transport core only reads it. It is asked for the current value on
/// every connection attempt and, when the server reports the credential as
/// expired, asked once to renew it.
#[async_trait]
pub trait CredentialProvider: Send + Sync + 'static {
    /// The current credential, if any.
    fn current(&self) -> Option<String>;

    /// Obtain a renewed credential.
    async fn refresh(&self) -> Result<String, ClientError> {
        Err(ClientError::RefreshUnsupported)
    }
}

/// A fixed credential, for tools and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticCredential(Option<String>);

impl StaticCredential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(Some(token.into()))
    }

    pub fn none() -> Self {
        Self(None)
    }
}

#[async_trait]
impl CredentialProvider for StaticCredential {
    fn current(&self) -> Option<String> {
        self.0.clone()
    }
}

/// Credential persisted in [`Storage`] by whatever performed the login.
///
/// Refresh re-reads storage: it succeeds only if a token different from the
/// last one handed out has been written in the meantime.
#[derive(Debug, Clone)]
pub struct StoredCredential {
    storage: Storage,
    key: String,
    last_issued: Arc<Mutex<Option<String>>>,
}

impl StoredCredential {
    pub fn new(storage: Storage) -> Self {
        Self::with_key(storage, ACCESS_TOKEN_KEY)
    }

    pub fn with_key(storage: Storage, key: impl Into<String>) -> Self {
        Self {
            storage,
            key: key.into(),
            last_issued: Arc::new(Mutex::new(None)),
        }
    }

    /// Persist a token, e.g. after login.
    pub fn store(&self, token: &str) -> bool {
        self.storage.save(&self.key, &token)
    }

    /// Forget the persisted token, e.g. on logout.
    pub fn clear(&self) {
        self.storage.remove(&self.key);
    }

    fn read(&self) -> Option<String> {
        self.storage
            .load::<String>(&self.key)
            .filter(|token| !token.trim().is_empty())
    }

    fn issue(&self, token: Option<String>) -> Option<String> {
        let mut last = self.last_issued.lock().unwrap_or_else(|p| p.into_inner());
        *last = token.clone();
        token
    }
}

#[async_trait]
impl CredentialProvider for StoredCredential {
    fn current(&self) -> Option<String> {
        self.issue(self.read())
    }

    async fn refresh(&self) -> Result<String, ClientError> {
        let previous = self
            .last_issued
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone();

        match self.read() {
            Some(token) if Some(&token) != previous.as_ref() => {
                self.issue(Some(token.clone()));
                Ok(token)
            }
            Some(_) => Err(ClientError::RefreshFailed(
                "stored credential has not been renewed".to_string(),
            )),
            None => Err(ClientError::RefreshFailed("no stored credential".to_string())),
        }
    }
}
