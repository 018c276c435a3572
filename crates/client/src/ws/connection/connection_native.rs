//! Native WebSocket transport using tokio-tungstenite.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parley_shared::{CLOSE_ABNORMAL, CLOSE_NORMAL, CLOSE_NO_STATUS};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use super::{Connector, Transport, TransportEvent, TransportSink};
use crate::error::ClientError;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Opens WebSocket transports, one background task per connection.
///
/// A failed dial reports an error followed by an abnormal (1006) closure,
/// the way a browser socket does.
#[derive(Debug, Clone)]
pub struct WsConnector {
    connect_timeout: Duration,
}

impl Default for WsConnector {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

impl WsConnector {
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

impl Connector for WsConnector {
    fn open(&self, url: &str, sink: TransportSink) -> Box<dyn Transport> {
        let (sender, receiver) = unbounded_channel();
        tokio::spawn(run_connection(
            url.to_string(),
            self.connect_timeout,
            sink,
            receiver,
        ));
        Box::new(WsTransport { sender })
    }
}

enum Outbound {
    Text(String),
    Close { code: u16, reason: String },
}

/// Handle for the write half of one connection task.
struct WsTransport {
    sender: UnboundedSender<Outbound>,
}

impl Transport for WsTransport {
    fn send_text(&mut self, text: String) -> Result<(), ClientError> {
        self.sender
            .send(Outbound::Text(text))
            .map_err(|_| ClientError::TransportError("connection task has ended".to_string()))
    }

    fn close(&mut self, code: u16, reason: &str) {
        let _ = self.sender.send(Outbound::Close {
            code,
            reason: reason.to_string(),
        });
    }
}

async fn run_connection(
    url: String,
    connect_timeout: Duration,
    sink: TransportSink,
    mut outbound: UnboundedReceiver<Outbound>,
) {
    let generation = sink.generation();

    let dial = tokio::time::timeout(connect_timeout, connect_async(url.as_str())).await;
    let mut stream = match dial {
        Ok(Ok((stream, _response))) => stream,
        Ok(Err(e)) => {
            crate::log_error!("WebSocket error for {}: {}", url, e);
            sink.emit(TransportEvent::Error(e.to_string()));
            sink.emit(TransportEvent::Closed {
                code: CLOSE_ABNORMAL,
                reason: e.to_string(),
            });
            return;
        }
        Err(_) => {
            crate::log_error!("WebSocket to {} timed out after {:?}", url, connect_timeout);
            sink.emit(TransportEvent::Error("connection timeout".to_string()));
            sink.emit(TransportEvent::Closed {
                code: CLOSE_ABNORMAL,
                reason: "connection timeout".to_string(),
            });
            return;
        }
    };

    crate::log_info!("WebSocket connected to {} (attempt #{})", url, generation);
    if !sink.emit(TransportEvent::Opened) {
        let _ = stream.close(None).await;
        return;
    }

    let (code, reason) = loop {
        tokio::select! {
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    crate::log_debug!("WebSocket received: {}", text.as_str());
                    if !sink.emit(TransportEvent::Frame(text.as_str().to_owned())) {
                        let _ = stream.close(None).await;
                        return;
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    crate::log_info!("WebSocket to {} received close frame", url);
                    break frame
                        .map(|f| (u16::from(f.code), f.reason.as_str().to_owned()))
                        .unwrap_or((CLOSE_NO_STATUS, String::new()));
                }
                Some(Ok(Message::Binary(data))) => {
                    crate::log_warn!("Ignoring {} byte binary payload", data.len());
                }
                Some(Ok(_)) => {
                    // Protocol-level ping/pong is answered by tungstenite
                }
                Some(Err(e)) => {
                    crate::log_error!("WebSocket read error: {}", e);
                    sink.emit(TransportEvent::Error(e.to_string()));
                    break (CLOSE_ABNORMAL, e.to_string());
                }
                None => break (CLOSE_ABNORMAL, "connection dropped".to_string()),
            },
            command = outbound.recv() => match command {
                Some(Outbound::Text(text)) => {
                    crate::log_debug!("Sending to {}: {}", url, text);
                    if let Err(e) = stream.send(Message::Text(text.into())).await {
                        crate::log_error!("Send failed: {}", e);
                        sink.emit(TransportEvent::Error(e.to_string()));
                        break (CLOSE_ABNORMAL, e.to_string());
                    }
                }
                Some(Outbound::Close { code, reason }) => {
                    let frame = CloseFrame {
                        code: CloseCode::from(code),
                        reason: reason.clone().into(),
                    };
                    if let Err(e) = stream.close(Some(frame)).await {
                        crate::log_debug!("Close handshake with {} failed: {}", url, e);
                    }
                    break (code, reason);
                }
                None => {
                    // Transport handle dropped
                    let _ = stream.close(None).await;
                    break (CLOSE_NORMAL, "transport dropped".to_string());
                }
            }
        }
    };

    crate::log_info!("WebSocket to {} closed ({}: {})", url, code, reason);
    sink.emit(TransportEvent::Closed { code, reason });
}
