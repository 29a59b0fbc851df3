//! In-memory transports for client scenario tests.

#![allow(dead_code, unreachable_pub)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use foundry_client::connection::{OpenedSocket, Outbound, SocketEvent};
use foundry_client::{
    ClientConfig, Credential, CredentialStore, FixedClock, FoundryClient, FoundryError,
    FoundryResult, SessionNegotiator, SocketConnector, SocketHandle,
};
use parking_lot::Mutex;
use tokio::sync::mpsc;

/// Server side of one fake socket.
#[derive(Debug)]
pub struct FakePeer {
    pub url: String,
    sent: tokio::sync::Mutex<mpsc::UnboundedReceiver<Outbound>>,
    events: mpsc::UnboundedSender<SocketEvent>,
}

impl FakePeer {
    /// Delivers an inbound frame to the client.
    pub fn push(&self, text: impl Into<String>) {
        let _ = self.events.send(SocketEvent::Frame(text.into()));
    }

    /// Simulates the server dropping the connection.
    pub fn drop_connection(&self) {
        let _ = self.events.send(SocketEvent::Closed {
            code: Some(1006),
            reason: "abnormal closure".into(),
        });
    }

    /// Next command the client wrote to this socket.
    pub async fn next_sent(&self) -> Outbound {
        tokio::time::timeout(Duration::from_secs(5), self.sent.lock().await.recv())
            .await
            .expect("client wrote nothing")
            .expect("writer channel closed")
    }

    /// Next text frame the client wrote to this socket.
    pub async fn next_text(&self) -> String {
        match self.next_sent().await {
            Outbound::Text(text) => text,
            Outbound::Close => panic!("expected a text frame, got close"),
        }
    }
}

/// Hands out [`FakePeer`]s instead of real sockets.
#[derive(Debug, Default)]
pub struct FakeConnector {
    peers: Mutex<Vec<Arc<FakePeer>>>,
    dead_on_open: Mutex<Vec<usize>>,
}

impl FakeConnector {
    /// The `index`-th socket opened is already unusable and never reports
    /// its close.
    pub fn open_dead(&self, index: usize) {
        self.dead_on_open.lock().push(index);
    }

    pub fn opened(&self) -> usize {
        self.peers.lock().len()
    }

    /// The `index`-th socket opened, waiting for it if necessary.
    pub async fn peer(&self, index: usize) -> Arc<FakePeer> {
        for _ in 0..500 {
            if let Some(peer) = self.peers.lock().get(index) {
                return Arc::clone(peer);
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("socket {index} was never opened");
    }
}

#[async_trait]
impl SocketConnector for FakeConnector {
    async fn open(&self, url: &str) -> FoundryResult<OpenedSocket> {
        let (mut out_tx, out_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let mut peers = self.peers.lock();
        if self.dead_on_open.lock().contains(&peers.len()) {
            let (dead_tx, _) = mpsc::unbounded_channel();
            out_tx = dead_tx;
        }
        peers.push(Arc::new(FakePeer {
            url: url.to_string(),
            sent: tokio::sync::Mutex::new(out_rx),
            events: event_tx,
        }));
        Ok(OpenedSocket {
            handle: SocketHandle::new(out_tx),
            events: event_rx,
        })
    }
}

/// Negotiator with per-host behavior and a script of authentication answers.
#[derive(Debug, Default)]
pub struct ScriptedNegotiator {
    rejected_hosts: Vec<String>,
    unreachable_hosts: Vec<String>,
    auth_script: Mutex<VecDeque<bool>>,
    get_session_calls: AtomicUsize,
    auth_calls: Mutex<Vec<(String, String)>>,
}

impl ScriptedNegotiator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rejecting(mut self, host: &str) -> Self {
        self.rejected_hosts.push(host.to_string());
        self
    }

    pub fn unreachable(mut self, host: &str) -> Self {
        self.unreachable_hosts.push(host.to_string());
        self
    }

    /// Answers for the next authentications, in order; `true` afterwards.
    pub fn with_auth_script(self, answers: &[bool]) -> Self {
        self.auth_script.lock().extend(answers.iter().copied());
        self
    }

    pub fn get_session_calls(&self) -> usize {
        self.get_session_calls.load(Ordering::SeqCst)
    }

    /// `(hostname, session_id)` of every authentication attempt.
    pub fn auth_calls(&self) -> Vec<(String, String)> {
        self.auth_calls.lock().clone()
    }
}

#[async_trait]
impl SessionNegotiator for ScriptedNegotiator {
    async fn get_session(&self, hostname: &str) -> FoundryResult<String> {
        if self.unreachable_hosts.iter().any(|h| h == hostname) {
            return Err(FoundryError::Request {
                operation: "GET /join",
                host: hostname.to_string(),
                reason: "connection refused".into(),
            });
        }
        let n = self.get_session_calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("sid-{hostname}-{n}"))
    }

    async fn authenticate(
        &self,
        hostname: &str,
        session_id: &str,
        _credential: &Credential,
    ) -> FoundryResult<bool> {
        self.auth_calls
            .lock()
            .push((hostname.to_string(), session_id.to_string()));
        if self.rejected_hosts.iter().any(|h| h == hostname) {
            return Ok(false);
        }
        Ok(self.auth_script.lock().pop_front().unwrap_or(true))
    }
}

pub fn credential(host: &str) -> Credential {
    Credential {
        id: format!("cred-{host}"),
        hostname: host.to_string(),
        userid: "gamemaster".into(),
        password: "hunter2".into(),
    }
}

pub struct Harness {
    pub client: FoundryClient,
    pub negotiator: Arc<ScriptedNegotiator>,
    pub connector: Arc<FakeConnector>,
}

pub fn harness(hosts: &[&str], negotiator: ScriptedNegotiator) -> Harness {
    let negotiator = Arc::new(negotiator);
    let connector = Arc::new(FakeConnector::default());
    let store = CredentialStore::from_credentials(hosts.iter().map(|h| credential(h)).collect());
    let client = FoundryClient::builder()
        .with_config(ClientConfig::default())
        .with_negotiator(negotiator.clone())
        .with_connector(connector.clone())
        .with_clock(Arc::new(FixedClock(1_700_000_000_000)))
        .with_credentials(store)
        .build()
        .expect("client builds");
    Harness {
        client,
        negotiator,
        connector,
    }
}

/// Ack frame carrying `payload` as its only element.
pub fn ack(ack_id: u64, payload: serde_json::Value) -> String {
    format!("43{ack_id}{}", serde_json::json!([payload]))
}
