//! Parley console client.
//!
//! Connects with `PARLEY_TOKEN` (or the token saved in the platform config
//! directory) and reads commands from stdin:
//!
//! ```text
//! <peer_id> <text>     send a direct message
//! /history <peer_id>   print the reconciled conversation
//! /quit                disconnect and exit
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use parley_client::storage::Storage;
use parley_client::{
    ApiClient, ChatClient, ClientConfig, ClientEvent, ConnectionStatus, Conversation,
    CredentialProvider, Message, MessageDirection, StaticCredential, StoredCredential,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: <peer_id> <text> | /history <peer_id> | /quit";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("parley_client=info")),
        )
        .init();

    let config = ClientConfig::from_env();
    let credentials = credentials_from_env()?;

    let client = ChatClient::with_websocket(config.clone(), credentials.clone());
    let mut events = client.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => print_event(&event),
                Err(RecvError::Lagged(skipped)) => eprintln!("({skipped} events skipped)"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    client.connect().context("cannot connect")?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "/quit" {
            break;
        }
        if let Some(peer) = line.strip_prefix("/history") {
            match peer.trim().parse::<i64>() {
                Ok(peer_id) => show_history(&client, &config, credentials.as_ref(), peer_id).await,
                Err(_) => eprintln!("{USAGE}"),
            }
            continue;
        }

        let Some((peer, text)) = line.split_once(char::is_whitespace) else {
            eprintln!("{USAGE}");
            continue;
        };
        let Ok(peer_id) = peer.parse::<i64>() else {
            eprintln!("{USAGE}");
            continue;
        };
        if let Err(e) = client.send(peer_id, text.trim()) {
            eprintln!("not sent: {e}");
        }
    }

    client.disconnect()?;
    let _ = tokio::time::timeout(
        Duration::from_secs(1),
        client.wait_for_status(ConnectionStatus::Disconnected),
    )
    .await;
    Ok(())
}

fn credentials_from_env() -> anyhow::Result<Arc<dyn CredentialProvider>> {
    if let Ok(token) = std::env::var("PARLEY_TOKEN") {
        let token = token.trim();
        if !token.is_empty() {
            return Ok(Arc::new(StaticCredential::new(token)));
        }
    }

    let storage = Storage::platform()
        .context("no config directory for a saved token; set PARLEY_TOKEN")?;
    Ok(Arc::new(StoredCredential::new(storage)))
}

async fn show_history(
    client: &ChatClient,
    config: &ClientConfig,
    credentials: &dyn CredentialProvider,
    peer_id: i64,
) {
    let api = ApiClient::new()
        .with_base_url(config.server_url.clone())
        .with_bearer(credentials.current());

    match Conversation::load(&api, peer_id, config.history_page_size).await {
        Ok(conversation) => {
            for message in client.timeline(&conversation) {
                print_message(&message);
            }
        }
        Err(e) => eprintln!("history unavailable: {e}"),
    }
}

fn print_event(event: &ClientEvent) {
    match event {
        ClientEvent::StatusChanged(status) => println!("* {status}"),
        ClientEvent::Authenticated(user) => {
            println!("* signed in as {} (#{})", user.username, user.id)
        }
        ClientEvent::MessageArrived { message, direction } => {
            let marker = match direction {
                MessageDirection::Sent => ">",
                MessageDirection::Received => "<",
            };
            print!("{marker} ");
            print_message(message);
        }
        ClientEvent::Pong => {}
        ClientEvent::Error(e) => eprintln!("! {e}"),
        ClientEvent::Closed { code, reason } => println!("* closed ({code}) {reason}"),
    }
}

fn print_message(message: &Message) {
    println!(
        "[{}] {} -> {}: {}",
        message.created_at.format("%Y-%m-%d %H:%M:%S"),
        message.sender_id,
        message.receiver_id,
        message.content
    );
}
