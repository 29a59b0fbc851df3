//! tokio-tungstenite backed [`SocketConnector`]

use async_trait::async_trait;
use futures::{SinkExt as _, StreamExt as _};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, trace, warn};

use super::{OpenedSocket, Outbound, SocketConnector, SocketEvent, SocketHandle};
use crate::error::{FoundryError, FoundryResult};

/// Connects with `tokio_tungstenite::connect_async` and drives the split
/// stream with one writer task and one reader task.
#[derive(Debug, Clone, Copy, Default)]
pub struct TungsteniteConnector;

impl TungsteniteConnector {
    /// New connector.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SocketConnector for TungsteniteConnector {
    async fn open(&self, url: &str) -> FoundryResult<OpenedSocket> {
        let (stream, _response) = connect_async(url)
            .await
            .map_err(|e| FoundryError::WebSocket(e.to_string()))?;

        let (mut sink, mut source) = stream.split();
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let handle = SocketHandle::new(outbound_tx);
        let socket_id = handle.id();

        let writer_events = events_tx.clone();
        tokio::spawn(async move {
            while let Some(command) = outbound_rx.recv().await {
                match command {
                    Outbound::Text(text) => {
                        if let Err(e) = sink.send(Message::Text(text.into())).await {
                            warn!("WebSocket send failed on socket {}: {}", socket_id, e);
                            let _ = writer_events.send(SocketEvent::Error(e.to_string()));
                            break;
                        }
                    }
                    Outbound::Close => {
                        if let Err(e) = sink.close().await {
                            debug!("WebSocket close on socket {} reported: {}", socket_id, e);
                        }
                        break;
                    }
                }
            }
            trace!("Writer task finished for socket {}", socket_id);
        });

        tokio::spawn(async move {
            let mut code = None;
            let mut reason = String::new();

            while let Some(message) = source.next().await {
                match message {
                    Ok(Message::Text(text)) => {
                        if events_tx.send(SocketEvent::Frame(text.as_str().to_owned())).is_err() {
                            break;
                        }
                    }
                    Ok(Message::Close(frame)) => {
                        if let Some(frame) = frame {
                            code = Some(u16::from(frame.code));
                            reason = frame.reason.as_str().to_owned();
                        }
                        break;
                    }
                    Ok(Message::Binary(data)) => {
                        trace!("Ignoring {} byte binary frame on socket {}", data.len(), socket_id);
                    }
                    Ok(_) => {}
                    Err(e) => {
                        let _ = events_tx.send(SocketEvent::Error(e.to_string()));
                        break;
                    }
                }
            }

            let _ = events_tx.send(SocketEvent::Closed { code, reason });
            trace!("Reader task finished for socket {}", socket_id);
        });

        Ok(OpenedSocket {
            handle,
            events: events_rx,
        })
    }
}
