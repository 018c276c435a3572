//! HTTP API client for the chat server's REST endpoints.

use async_trait::async_trait;
use parley_shared::{ApiError, ConversationSummary, Message};
use reqwest::Client;
use serde::de::DeserializeOwned;

/// Where conversation history comes from.
#[async_trait]
pub trait HistorySource: Send + Sync {
    /// Messages exchanged with `peer_id`, in any order.
    async fn fetch_history(
        &self,
        peer_id: i64,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Message>, ApiError>;
}

/// HTTP client for bearer-authenticated requests to the chat server.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    bearer: Option<String>,
}

impl Default for ApiClient {
    fn default() -> Self {
        Self::new()
    }
}

impl ApiClient {
    /// Create a new API client
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            base_url: String::new(),
            bearer: None,
        }
    }

    /// Set the base URL for API requests
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Authenticate requests with a bearer token
    pub fn with_bearer(mut self, token: Option<String>) -> Self {
        self.bearer = token;
        self
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        if self.base_url.is_empty() {
            if path.starts_with('/') {
                path.to_string()
            } else {
                format!("/{path}")
            }
        } else {
            let base = self.base_url.trim_end_matches('/');
            let path = path.trim_start_matches('/');
            format!("{base}/{path}")
        }
    }

    /// Make an authenticated GET request
    pub async fn get_json<TRes: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<TRes, ApiError> {
        let url = self.url(path);
        let mut rb = self.client.get(&url).query(query);

        if let Some(token) = &self.bearer {
            rb = rb.bearer_auth(token);
        }

        let resp = rb.send().await.map_err(|e| ApiError::Network(e.to_string()))?;

        let status = resp.status().as_u16();
        let is_success = resp.status().is_success();

        let text = resp
            .text()
            .await
            .map_err(|e| ApiError::Network(format!("failed to read body: {e}")))?;

        if !is_success {
            crate::log_warn!("GET {} failed with HTTP {}", url, status);
            return Err(ApiError::Http { status, body: text });
        }

        serde_json::from_str(&text).map_err(|e| ApiError::Deserialize(e.to_string()))
    }

    /// Messages exchanged with `peer_id`, newest first.
    pub async fn conversation_history(
        &self,
        peer_id: i64,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Message>, ApiError> {
        self.get_json(
            &format!("/messages/conversations/{peer_id}"),
            &[("limit", limit.to_string()), ("offset", offset.to_string())],
        )
        .await
    }

    /// The latest message of each conversation, most recent conversation first.
    pub async fn conversations(
        &self,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<ConversationSummary>, ApiError> {
        self.get_json(
            "/messages/conversations",
            &[("limit", limit.to_string()), ("offset", offset.to_string())],
        )
        .await
    }
}

#[async_trait]
impl HistorySource for ApiClient {
    async fn fetch_history(
        &self,
        peer_id: i64,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Message>, ApiError> {
        self.conversation_history(peer_id, limit, offset).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::{Conversation, LiveMessages};
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn history_is_fetched_with_bearer_and_paging() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/messages/conversations/2"))
            .and(query_param("limit", "50"))
            .and(query_param("offset", "0"))
            .and(header("authorization", "Bearer abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": 11, "sender_id": 2, "reciever_id": 1, "content": "later",
                 "created_at": "2024-05-01T10:00:05", "is_read": false},
                {"id": 10, "sender_id": 1, "reciever_id": 2, "content": "earlier",
                 "created_at": "2024-05-01T10:00:00", "is_read": true}
            ])))
            .mount(&server)
            .await;

        let api = ApiClient::new()
            .with_base_url(server.uri())
            .with_bearer(Some("abc".to_string()));

        let conversation = Conversation::load(&api, 2, 50).await.unwrap();
        assert!(conversation.is_loaded());
        let ids: Vec<i64> = conversation
            .timeline(&LiveMessages::default())
            .iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(ids, vec![10, 11]);
    }

    #[tokio::test]
    async fn conversation_list_decodes_summaries() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/messages/conversations"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"other_user_id": 2, "username": "grace", "last_message": "hi",
                 "last_message_time": "2024-05-01T10:00:00+00:00"}
            ])))
            .mount(&server)
            .await;

        let api = ApiClient::new().with_base_url(server.uri());
        let list = api.conversations(50, 0).await.unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].username, "grace");
    }

    #[tokio::test]
    async fn http_failures_carry_status_and_detail() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(401).set_body_json(json!({"detail": "Not authenticated"})),
            )
            .mount(&server)
            .await;

        let api = ApiClient::new().with_base_url(server.uri());
        let err = api.conversation_history(2, 50, 0).await.unwrap_err();
        assert_eq!(err.status(), Some(401));
        assert_eq!(err.to_string(), "HTTP 401: Not authenticated");
    }
}
