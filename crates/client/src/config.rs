//! Client configuration from environment variables.

use std::time::Duration;

use url::Url;

use crate::error::ClientError;

const DEFAULT_SERVER_URL: &str = "http://localhost:8000";
const DEFAULT_WS_PATH: &str = "/ws";
const DEFAULT_HEARTBEAT_MS: u64 = 3000;
const DEFAULT_RECONNECT_DELAY_MS: u64 = 5000;
const DEFAULT_EVENT_CAPACITY: usize = 256;
const DEFAULT_HISTORY_PAGE_SIZE: u32 = 50;

/// Settings for one [`crate::ChatClient`].
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// HTTP origin of the chat server. REST calls go here, and the
    /// transport endpoint is derived from it.
    pub server_url: String,
    /// Path of the transport endpoint on the same origin.
    pub ws_path: String,
    /// Period between `ping` frames while the connection is open.
    pub heartbeat_interval: Duration,
    /// Fixed wait before re-attempting a connection after an unintended closure.
    pub reconnect_delay: Duration,
    /// Buffer size of the event broadcast; slow subscribers lag past it.
    pub event_capacity: usize,
    /// `limit` used when fetching conversation history.
    pub history_page_size: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            ws_path: DEFAULT_WS_PATH.to_string(),
            heartbeat_interval: Duration::from_millis(DEFAULT_HEARTBEAT_MS),
            reconnect_delay: Duration::from_millis(DEFAULT_RECONNECT_DELAY_MS),
            event_capacity: DEFAULT_EVENT_CAPACITY,
            history_page_size: DEFAULT_HISTORY_PAGE_SIZE,
        }
    }
}

impl ClientConfig {
    /// Parse configuration from environment variables.
    ///
    /// Environment variables:
    /// - `PARLEY_SERVER_URL`: HTTP origin of the server (default: "http://localhost:8000")
    /// - `PARLEY_WS_PATH`: transport endpoint path (default: "/ws")
    /// - `PARLEY_HEARTBEAT_MS`: ping period in milliseconds (default: 3000)
    /// - `PARLEY_RECONNECT_DELAY_MS`: reconnect delay in milliseconds (default: 5000)
    /// - `PARLEY_EVENT_CAPACITY`: event broadcast buffer (default: 256)
    /// - `PARLEY_HISTORY_PAGE_SIZE`: history fetch limit (default: 50)
    pub fn from_env() -> Self {
        Self {
            server_url: std::env::var("PARLEY_SERVER_URL")
                .unwrap_or_else(|_| DEFAULT_SERVER_URL.to_string()),
            ws_path: std::env::var("PARLEY_WS_PATH")
                .unwrap_or_else(|_| DEFAULT_WS_PATH.to_string()),
            heartbeat_interval: Duration::from_millis(env_number(
                "PARLEY_HEARTBEAT_MS",
                DEFAULT_HEARTBEAT_MS,
            )),
            reconnect_delay: Duration::from_millis(env_number(
                "PARLEY_RECONNECT_DELAY_MS",
                DEFAULT_RECONNECT_DELAY_MS,
            )),
            event_capacity: env_number("PARLEY_EVENT_CAPACITY", DEFAULT_EVENT_CAPACITY),
            history_page_size: env_number("PARLEY_HISTORY_PAGE_SIZE", DEFAULT_HISTORY_PAGE_SIZE),
        }
    }

    /// Transport URL on the server's origin: `http` becomes `ws`, `https` becomes `wss`.
    pub fn ws_url(&self) -> Result<String, ClientError> {
        let mut url = Url::parse(&self.server_url)
            .map_err(|e| {
                ClientError::InvalidConfig(format!("server url `{}`: {}", self.server_url, e))
            })?;

        let scheme = match url.scheme() {
            "https" | "wss" => "wss",
            "http" | "ws" => "ws",
            other => {
                return Err(ClientError::InvalidConfig(format!(
                    "unsupported scheme `{other}` in server url"
                )))
            }
        };
        url.set_scheme(scheme)
            .map_err(|_| ClientError::InvalidConfig(format!("cannot use scheme `{scheme}`")))?;

        let path = if self.ws_path.starts_with('/') {
            self.ws_path.clone()
        } else {
            format!("/{}", self.ws_path)
        };
        url.set_path(&path);
        url.set_query(None);

        Ok(url.to_string())
    }
}

fn env_number<T: std::str::FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            crate::log_warn!("{} has unparseable value `{}`; using the default", key, raw);
            default
        }),
        Err(_) => default,
    }
}
