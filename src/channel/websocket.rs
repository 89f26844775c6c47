use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderValue, StatusCode, header};
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};

use super::{EventChannel, EventRouter};
use crate::error::{ChatSyncError, Result};
use crate::events::{InboundEvent, OutboundEvent};

/// [`EventChannel`] over a single WebSocket connection.
///
/// Outbound events are queued on a bounded buffer drained by a writer task;
/// a reader task parses inbound frames and hands them to the [`EventRouter`].
#[derive(Debug)]
pub struct WsEventChannel {
    outbound: mpsc::Sender<OutboundEvent>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl WsEventChannel {
    pub async fn connect(
        url: &str,
        token: &str,
        router: Arc<EventRouter>,
        buffer: usize,
    ) -> Result<Self> {
        let mut request = url
            .into_client_request()
            .map_err(|e| ChatSyncError::Configuration(format!("Invalid socket url {url}: {e}")))?;
        let bearer = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|e| ChatSyncError::Configuration(format!("Invalid token: {e}")))?;
        request.headers_mut().insert(header::AUTHORIZATION, bearer);

        let (stream, _response) = connect_async(request).await.map_err(map_connect_error)?;
        tracing::info!(
            target: "chatsync::channel::websocket::connect",
            "Connected event channel to {}",
            url
        );

        let (mut write, mut read) = stream.split();
        let (outbound, mut outbound_rx) = mpsc::channel::<OutboundEvent>(buffer.max(1));

        let writer = tokio::spawn(async move {
            while let Some(event) = outbound_rx.recv().await {
                let frame = match serde_json::to_string(&event) {
                    Ok(frame) => frame,
                    Err(e) => {
                        tracing::error!(
                            target: "chatsync::channel::websocket::writer",
                            "Failed to encode outbound event: {}",
                            e
                        );
                        continue;
                    }
                };
                if let Err(e) = write.send(WsMessage::Text(frame)).await {
                    tracing::warn!(
                        target: "chatsync::channel::websocket::writer",
                        "Event channel send failed: {}",
                        e
                    );
                    break;
                }
            }
            let _ = write.close().await;
            tracing::debug!(target: "chatsync::channel::websocket::writer", "Writer task ended");
        });

        let reader = tokio::spawn(async move {
            while let Some(frame) = read.next().await {
                match frame {
                    Ok(WsMessage::Text(text)) => {
                        if let Some(event) = parse_frame(text.as_bytes()) {
                            router.route(event);
                        }
                    }
                    Ok(WsMessage::Binary(data)) => {
                        if let Some(event) = parse_frame(&data) {
                            router.route(event);
                        }
                    }
                    Ok(WsMessage::Close(_)) => {
                        tracing::info!(
                            target: "chatsync::channel::websocket::reader",
                            "Server closed the event channel"
                        );
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!(
                            target: "chatsync::channel::websocket::reader",
                            "Event channel read failed: {}",
                            e
                        );
                        break;
                    }
                }
            }
        });

        Ok(Self {
            outbound,
            reader,
            writer,
        })
    }

    pub fn is_connected(&self) -> bool {
        !self.reader.is_finished() && !self.writer.is_finished()
    }

    pub fn shutdown(&self) {
        self.reader.abort();
        self.writer.abort();
    }
}

impl EventChannel for WsEventChannel {
    fn emit(&self, event: OutboundEvent) -> Result<()> {
        self.outbound.try_send(event).map_err(|e| match e {
            TrySendError::Full(event) => ChatSyncError::Channel(format!(
                "Outbound buffer full, dropped {:?}",
                event
            )),
            TrySendError::Closed(_) => ChatSyncError::ChannelClosed,
        })
    }
}

impl Drop for WsEventChannel {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Parses one inbound frame. Unknown or malformed frames are logged and skipped.
fn parse_frame(frame: &[u8]) -> Option<InboundEvent> {
    match serde_json::from_slice(frame) {
        Ok(event) => Some(event),
        Err(e) => {
            tracing::debug!(
                target: "chatsync::channel::websocket::parse_frame",
                "Skipping unrecognised frame: {}",
                e
            );
            None
        }
    }
}

fn map_connect_error(err: WsError) -> ChatSyncError {
    match err {
        WsError::Http(response) if response.status() == StatusCode::UNAUTHORIZED => {
            ChatSyncError::SessionExpired
        }
        WsError::Http(response) => {
            ChatSyncError::Channel(format!("Handshake rejected with {}", response.status()))
        }
        other => ChatSyncError::Channel(other.to_string()),
    }
}
