//! End-to-end behaviour of `ChatClient` against a scripted transport.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{TimeZone, Utc};
use parley_client::storage::Storage;
use parley_client::{
    ChatClient, ClientConfig, ClientError, ClientEvent, ConnectionStatus, Connector, Conversation,
    Message, MessageDirection, StaticCredential, StoredCredential, Transport, TransportEvent,
    TransportSink,
};
use serde_json::{json, Value};
use tokio::sync::broadcast;

const AUTH_SUCCESS: &str =
    r#"{"type":"auth_success","user":{"id":1,"username":"ada","email":"ada@example.com"}}"#;

struct Connection {
    url: String,
    sink: TransportSink,
    sent: Arc<Mutex<Vec<String>>>,
    closed_with: Arc<Mutex<Option<u16>>>,
}

/// Stands in for the server: records every dial and lets the test script
/// what each transport reports.
#[derive(Clone, Default)]
struct ScriptedServer {
    connections: Arc<Mutex<Vec<Connection>>>,
}

struct ScriptedTransport {
    sent: Arc<Mutex<Vec<String>>>,
    closed_with: Arc<Mutex<Option<u16>>>,
}

impl Transport for ScriptedTransport {
    fn send_text(&mut self, text: String) -> Result<(), ClientError> {
        self.sent.lock().unwrap().push(text);
        Ok(())
    }

    fn close(&mut self, code: u16, _reason: &str) {
        *self.closed_with.lock().unwrap() = Some(code);
    }
}

impl Connector for ScriptedServer {
    fn open(&self, url: &str, sink: TransportSink) -> Box<dyn Transport> {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let closed_with = Arc::new(Mutex::new(None));
        self.connections.lock().unwrap().push(Connection {
            url: url.to_string(),
            sink,
            sent: sent.clone(),
            closed_with: closed_with.clone(),
        });
        Box::new(ScriptedTransport { sent, closed_with })
    }
}

impl ScriptedServer {
    fn dials(&self) -> usize {
        self.connections.lock().unwrap().len()
    }

    fn report(&self, index: usize, event: TransportEvent) {
        let connections = self.connections.lock().unwrap();
        assert!(connections[index].sink.emit(event));
    }

    fn push(&self, index: usize, frame: &str) {
        self.report(index, TransportEvent::Frame(frame.to_string()));
    }

    fn close(&self, index: usize, code: u16) {
        self.report(
            index,
            TransportEvent::Closed {
                code,
                reason: String::new(),
            },
        );
    }

    fn sent(&self, index: usize) -> Vec<Value> {
        self.connections.lock().unwrap()[index]
            .sent
            .lock()
            .unwrap()
            .iter()
            .map(|text| serde_json::from_str(text).unwrap())
            .collect()
    }

    fn closed_with(&self, index: usize) -> Option<u16> {
        *self.connections.lock().unwrap()[index].closed_with.lock().unwrap()
    }

    fn url(&self, index: usize) -> String {
        self.connections.lock().unwrap()[index].url.clone()
    }
}

fn client_with(token: Option<&str>) -> (ChatClient, ScriptedServer) {
    let server = ScriptedServer::default();
    let credentials = Arc::new(match token {
        Some(token) => StaticCredential::new(token),
        None => StaticCredential::none(),
    });
    let client = ChatClient::spawn(ClientConfig::default(), credentials, Arc::new(server.clone()));
    (client, server)
}

/// Let the connection loop drain its queue.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

async fn authenticate(client: &ChatClient, server: &ScriptedServer) -> usize {
    client.connect().unwrap();
    settle().await;
    let index = server.dials() - 1;
    server.report(index, TransportEvent::Opened);
    server.push(index, AUTH_SUCCESS);
    client
        .wait_for_status(ConnectionStatus::Authenticated)
        .await
        .unwrap();
    index
}

fn drain(events: &mut broadcast::Receiver<ClientEvent>) -> Vec<ClientEvent> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}

fn message(id: i64, sender_id: i64, receiver_id: i64, secs: i64, content: &str) -> Message {
    Message {
        id,
        sender_id,
        receiver_id,
        content: content.to_string(),
        created_at: Utc.timestamp_opt(1_714_557_600 + secs, 0).unwrap(),
        is_read: false,
    }
}

#[tokio::test(start_paused = true)]
async fn handshake_sends_the_credential_and_exposes_the_identity() {
    let (client, server) = client_with(Some("abc"));
    assert_eq!(client.status(), ConnectionStatus::Disconnected);

    client.connect().unwrap();
    settle().await;
    assert_eq!(client.status(), ConnectionStatus::Connecting);
    assert_eq!(server.url(0), "ws://localhost:8000/ws");

    server.report(0, TransportEvent::Opened);
    settle().await;
    assert_eq!(client.status(), ConnectionStatus::Connected);
    assert_eq!(server.sent(0), vec![json!({"type": "auth", "content": "abc"})]);
    assert!(client.identity().is_none());

    server.push(0, AUTH_SUCCESS);
    client
        .wait_for_status(ConnectionStatus::Authenticated)
        .await
        .unwrap();
    let identity = client.identity().unwrap();
    assert_eq!(identity.id, 1);
    assert_eq!(identity.username, "ada");
}

#[tokio::test(start_paused = true)]
async fn connect_without_a_credential_fails_and_dials_nothing() {
    let (client, server) = client_with(None);
    let mut events = client.subscribe();

    assert_eq!(client.connect(), Err(ClientError::CredentialMissing));
    settle().await;
    assert_eq!(server.dials(), 0);
    assert_eq!(client.status(), ConnectionStatus::Disconnected);
    assert_eq!(
        drain(&mut events),
        vec![ClientEvent::Error(ClientError::CredentialMissing)]
    );
}

#[tokio::test(start_paused = true)]
async fn sending_before_authentication_is_refused() {
    let (client, server) = client_with(Some("abc"));
    assert_eq!(client.send(2, "hi"), Err(ClientError::NotReady));

    client.connect().unwrap();
    settle().await;
    assert_eq!(client.send(2, "hi"), Err(ClientError::NotReady));

    server.report(0, TransportEvent::Opened);
    settle().await;
    assert_eq!(client.send(2, "hi"), Err(ClientError::NotReady));
    settle().await;
    assert_eq!(server.sent(0).len(), 1, "only the auth frame was sent");

    server.push(0, AUTH_SUCCESS);
    client
        .wait_for_status(ConnectionStatus::Authenticated)
        .await
        .unwrap();
    client.send(2, "hi").unwrap();
    settle().await;
    assert_eq!(
        server.sent(0).last(),
        Some(&json!({"type": "message", "receiver_id": 2, "reciever_id": 2, "content": "hi"}))
    );
}

#[tokio::test(start_paused = true)]
async fn abnormal_closure_reconnects_after_the_fixed_delay() {
    let (client, server) = client_with(Some("abc"));
    authenticate(&client, &server).await;

    server.close(0, 1006);
    settle().await;
    assert_eq!(client.status(), ConnectionStatus::Disconnected);
    assert!(client.identity().is_none());

    tokio::time::sleep(Duration::from_millis(4_900)).await;
    assert_eq!(server.dials(), 1);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(server.dials(), 2);
    assert_eq!(client.status(), ConnectionStatus::Connecting);

    server.report(1, TransportEvent::Opened);
    server.push(1, AUTH_SUCCESS);
    client
        .wait_for_status(ConnectionStatus::Authenticated)
        .await
        .unwrap();
    assert_eq!(server.sent(1)[0], json!({"type": "auth", "content": "abc"}));
}

#[tokio::test(start_paused = true)]
async fn a_failed_reconnect_keeps_retrying_at_the_same_rate() {
    let (client, server) = client_with(Some("abc"));
    authenticate(&client, &server).await;

    server.close(0, 1006);
    tokio::time::sleep(Duration::from_millis(5_100)).await;
    assert_eq!(server.dials(), 2);

    // The dial itself fails.
    server.report(1, TransportEvent::Error("refused".to_string()));
    server.close(1, 1006);
    tokio::time::sleep(Duration::from_millis(5_100)).await;
    assert_eq!(server.dials(), 3);
}

#[tokio::test(start_paused = true)]
async fn clean_closure_does_not_reconnect() {
    let (client, server) = client_with(Some("abc"));
    authenticate(&client, &server).await;

    server.close(0, 1000);
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(server.dials(), 1);
    assert_eq!(client.status(), ConnectionStatus::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn disconnect_closes_cleanly_and_cancels_the_reconnect() {
    let (client, server) = client_with(Some("abc"));
    authenticate(&client, &server).await;

    client.disconnect().unwrap();
    settle().await;
    assert_eq!(server.closed_with(0), Some(1000));
    assert_eq!(client.status(), ConnectionStatus::Disconnected);
    assert!(client.identity().is_none());

    // Second connection drops abnormally, then the user disconnects while
    // the reconnect timer is pending.
    authenticate(&client, &server).await;
    server.close(1, 1006);
    settle().await;
    client.disconnect().unwrap();
    client.disconnect().unwrap();

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(server.dials(), 2);
    assert_eq!(client.status(), ConnectionStatus::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn heartbeat_pings_every_interval_while_open() {
    let (client, server) = client_with(Some("abc"));
    authenticate(&client, &server).await;

    tokio::time::sleep(Duration::from_millis(6_100)).await;
    let pings = server
        .sent(0)
        .iter()
        .filter(|frame| frame["type"] == "ping")
        .count();
    assert_eq!(pings, 2);

    server.close(0, 1000);
    settle().await;
    tokio::time::sleep(Duration::from_secs(10)).await;
    let pings_after = server
        .sent(0)
        .iter()
        .filter(|frame| frame["type"] == "ping")
        .count();
    assert_eq!(pings_after, 2);
}

#[tokio::test(start_paused = true)]
async fn live_messages_join_the_conversation_timeline() {
    let (client, server) = client_with(Some("abc"));
    let index = authenticate(&client, &server).await;
    let mut events = client.subscribe();

    let mut conversation = Conversation::new(2);
    conversation.set_history(vec![
        message(11, 2, 1, 5, "later"),
        message(10, 1, 2, 0, "earlier"),
    ]);

    server.push(
        index,
        r#"{"type":"new_message","id":11,"sender_id":2,"reciever_id":1,"content":"edited","created_at":"2024-05-01T10:00:05","is_read":true}"#,
    );
    server.push(
        index,
        r#"{"type":"message_sent","id":12,"sender_id":1,"reciever_id":2,"content":"between","created_at":"2024-05-01T10:00:03","is_read":false}"#,
    );
    server.push(
        index,
        r#"{"type":"new_message","id":20,"sender_id":3,"reciever_id":1,"content":"elsewhere","created_at":"2024-05-01T10:00:01","is_read":false}"#,
    );
    settle().await;

    let timeline = client.timeline(&conversation);
    let ids: Vec<i64> = timeline.iter().map(|m| m.id).collect();
    assert_eq!(ids, vec![10, 12, 11]);
    assert_eq!(timeline[2].content, "edited");
    assert_eq!(client.live_messages().len(), 3);

    let arrivals: Vec<(i64, MessageDirection)> = drain(&mut events)
        .into_iter()
        .filter_map(|event| match event {
            ClientEvent::MessageArrived { message, direction } => Some((message.id, direction)),
            _ => None,
        })
        .collect();
    assert_eq!(
        arrivals,
        vec![
            (11, MessageDirection::Received),
            (12, MessageDirection::Sent),
            (20, MessageDirection::Received),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn unreadable_frames_change_nothing() {
    let (client, server) = client_with(Some("abc"));
    let index = authenticate(&client, &server).await;
    let mut events = client.subscribe();

    server.push(index, "not json at all");
    server.push(index, r#"{"type":"typing","user_id":2}"#);
    server.push(index, r#"{"type":"new_message","id":"x"}"#);
    server.push(index, r#"{"type":"pong"}"#);
    settle().await;

    assert_eq!(client.status(), ConnectionStatus::Authenticated);
    assert!(client.live_messages().is_empty());
    assert_eq!(drain(&mut events), vec![ClientEvent::Pong]);
}

#[tokio::test(start_paused = true)]
async fn expired_credential_is_renewed_from_storage() {
    let dir = tempfile::tempdir().unwrap();
    let credential = StoredCredential::new(Storage::at(dir.path()));
    assert!(credential.store("old"));

    let server = ScriptedServer::default();
    let client = ChatClient::spawn(
        ClientConfig::default(),
        Arc::new(credential.clone()),
        Arc::new(server.clone()),
    );
    let mut events = client.subscribe();

    client.connect().unwrap();
    settle().await;
    server.report(0, TransportEvent::Opened);
    settle().await;
    assert_eq!(server.sent(0), vec![json!({"type": "auth", "content": "old"})]);

    assert!(credential.store("new"));
    server.push(0, r#"{"type":"error","content":"Token expired"}"#);
    settle().await;
    settle().await;

    assert_eq!(server.closed_with(0), Some(1000));
    assert_eq!(server.dials(), 2);
    assert!(drain(&mut events).contains(&ClientEvent::Error(ClientError::HandshakeRejected(
        "Token expired".to_string()
    ))));

    server.report(1, TransportEvent::Opened);
    server.push(1, AUTH_SUCCESS);
    client
        .wait_for_status(ConnectionStatus::Authenticated)
        .await
        .unwrap();
    assert_eq!(server.sent(1)[0], json!({"type": "auth", "content": "new"}));
}

#[tokio::test(start_paused = true)]
async fn dropping_the_client_closes_the_connection() {
    let (client, server) = client_with(Some("abc"));
    authenticate(&client, &server).await;

    drop(client);
    settle().await;
    assert_eq!(server.closed_with(0), Some(1000));
}

#[tokio::test(start_paused = true)]
async fn another_users_session_does_not_see_earlier_live_messages() {
    let (client, server) = client_with(Some("abc"));
    let first = authenticate(&client, &server).await;
    server.push(
        first,
        r#"{"type":"message_sent","id":7,"sender_id":1,"reciever_id":2,"content":"mine","created_at":"2024-05-01T10:00:00","is_read":false}"#,
    );
    settle().await;
    assert_eq!(client.timeline(&Conversation::new(2)).len(), 1);

    server.close(first, 1006);
    tokio::time::sleep(Duration::from_millis(5_100)).await;
    assert_eq!(server.dials(), 2);
    server.report(1, TransportEvent::Opened);
    server.push(
        1,
        r#"{"type":"auth_success","user":{"id":3,"username":"grace","email":"grace@example.com"}}"#,
    );
    client
        .wait_for_status(ConnectionStatus::Authenticated)
        .await
        .unwrap();

    assert_eq!(client.identity().map(|user| user.id), Some(3));
    assert!(client.timeline(&Conversation::new(2)).is_empty());
    assert!(client.live_messages().is_empty());
}

#[tokio::test(start_paused = true)]
async fn the_same_user_keeps_live_messages_across_a_reconnect() {
    let (client, server) = client_with(Some("abc"));
    let first = authenticate(&client, &server).await;
    server.push(
        first,
        r#"{"type":"new_message","id":8,"sender_id":2,"reciever_id":1,"content":"yo","created_at":"2024-05-01T10:00:00","is_read":false}"#,
    );
    settle().await;

    server.close(first, 1006);
    tokio::time::sleep(Duration::from_millis(5_100)).await;
    server.report(1, TransportEvent::Opened);
    server.push(1, AUTH_SUCCESS);
    client
        .wait_for_status(ConnectionStatus::Authenticated)
        .await
        .unwrap();

    let ids: Vec<i64> = client
        .timeline(&Conversation::new(2))
        .iter()
        .map(|m| m.id)
        .collect();
    assert_eq!(ids, vec![8]);
}
