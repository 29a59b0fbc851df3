//! Websocket connection to one host and session
//!
//! A [`SocketConnector`] opens the socket and hands back an [`OpenedSocket`]:
//! a cloneable [`SocketHandle`] for sending plus a receiver of
//! [`SocketEvent`]s. The per-socket dispatcher in [`dispatcher`] consumes
//! those events, answers the Engine.IO handshake and feeds everything else to
//! the pending-request registry.

pub(crate) mod dispatcher;
mod tungstenite;

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::FRAME_LOG_TARGET;
use crate::config::ClientConfig;
use crate::error::{FoundryError, FoundryResult};

pub use self::tungstenite::TungsteniteConnector;

static NEXT_SOCKET_ID: AtomicU64 = AtomicU64::new(1);

/// Command for a socket's writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Send one text frame
    Text(String),
    /// Close the socket
    Close,
}

/// Something that happened on a socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    /// An inbound text frame
    Frame(String),
    /// A transport error; the socket may still be usable
    Error(String),
    /// The socket is gone
    Closed {
        /// Close code, when the peer sent one
        code: Option<u16>,
        /// Close reason text
        reason: String,
    },
}

/// Sending side of one socket.
///
/// Clones share the same socket. Each socket gets a process-unique id so a
/// close can be matched against the socket currently in use.
#[derive(Debug, Clone)]
pub struct SocketHandle {
    id: u64,
    outbound: mpsc::UnboundedSender<Outbound>,
    open: Arc<AtomicBool>,
}

impl SocketHandle {
    /// Wraps the writer channel of a freshly opened socket.
    pub fn new(outbound: mpsc::UnboundedSender<Outbound>) -> Self {
        Self {
            id: NEXT_SOCKET_ID.fetch_add(1, Ordering::Relaxed),
            outbound,
            open: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Process-unique socket id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// True until the socket closes or [`close`](Self::close) is called.
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire) && !self.outbound.is_closed()
    }

    /// Queues a text frame.
    ///
    /// # Errors
    ///
    /// [`FoundryError::NotConnected`] when the socket is closed.
    pub fn send_text(&self, text: impl Into<String>) -> FoundryResult<()> {
        if !self.is_open() {
            return Err(FoundryError::NotConnected);
        }
        let text = text.into();
        debug!(target: FRAME_LOG_TARGET, direction = "outbound", socket = self.id, "{}", text);
        self.outbound
            .send(Outbound::Text(text))
            .map_err(|_| FoundryError::NotConnected)
    }

    /// Closes the socket; later calls do nothing.
    pub fn close(&self) {
        if self.open.swap(false, Ordering::AcqRel) {
            let _ = self.outbound.send(Outbound::Close);
        }
    }

    pub(crate) fn mark_closed(&self) {
        self.open.store(false, Ordering::Release);
    }
}

/// A socket that finished opening.
#[derive(Debug)]
pub struct OpenedSocket {
    /// Sending side
    pub handle: SocketHandle,
    /// Inbound frames, errors and the final close
    pub events: mpsc::UnboundedReceiver<SocketEvent>,
}

/// Opens websockets.
#[async_trait]
pub trait SocketConnector: Send + Sync + fmt::Debug {
    /// Resolves once the socket is open; errors if it fails to open.
    async fn open(&self, url: &str) -> FoundryResult<OpenedSocket>;
}

/// Builds socket URLs and bounds the upgrade by the connect timeout.
#[derive(Debug, Clone)]
pub struct Connection {
    connector: Arc<dyn SocketConnector>,
    scheme: &'static str,
    connect_timeout: Duration,
}

impl Connection {
    /// New connection factory using `connector`.
    pub fn new(connector: Arc<dyn SocketConnector>, config: &ClientConfig) -> Self {
        Self {
            connector,
            scheme: config.ws_scheme(),
            connect_timeout: config.connect_timeout,
        }
    }

    /// `wss://{host}/socket.io/?session={id}&EIO=4&transport=websocket`
    pub fn socket_url(&self, hostname: &str, session_id: &str) -> String {
        format!(
            "{}://{}/socket.io/?session={}&EIO=4&transport=websocket",
            self.scheme, hostname, session_id
        )
    }

    /// Opens a socket, failing with [`FoundryError::ConnectTimeout`] if the
    /// upgrade does not finish in time.
    pub async fn open(&self, hostname: &str, session_id: &str) -> FoundryResult<OpenedSocket> {
        let url = self.socket_url(hostname, session_id);
        info!("Connecting to WebSocket on {}", hostname);

        match tokio::time::timeout(self.connect_timeout, self.connector.open(&url)).await {
            Ok(Ok(opened)) => {
                info!("WebSocket connection established to {}", hostname);
                Ok(opened)
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(FoundryError::ConnectTimeout(self.connect_timeout)),
        }
    }
}
