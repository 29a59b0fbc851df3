//! Request correlation
//!
//! Foundry does not echo ack ids in a way that can be relied on, so inbound
//! frames are bound to requests by content. Each outstanding request carries a
//! [`ResponseMatcher`]; every inbound frame is decoded once and offered to the
//! pending requests in registration order. Requests of different
//! [`MatcherKind`]s judge every frame independently; among requests of the
//! same kind the first one that settles takes the frame.
//!
//! ```text
//!  register(matcher) ──► send 42<ack>[...] ──► wait(timeout)
//!                                                 ▲
//!  dispatcher: frame ──► decode ──► first Settle per kind ─┘
//! ```
//!
//! A [`PendingRequest`] removes its entry when dropped, so timeouts and
//! cancelled callers never leave a stale matcher behind.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use foundry_wire::{Parsed, build_event_frame, parse_ack, parse_world_response};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::debug;

use crate::connection::SocketHandle;
use crate::error::{FoundryError, FoundryResult};

/// What a document operation expects to find in its acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentExpectation {
    /// `result` contains an entry whose `_id` is this id
    Updated {
        /// Updated document id
        id: String,
    },
    /// `action == "create"`
    Created,
    /// `action == "delete"` and `result` shares an id with this list
    Deleted {
        /// Requested ids
        ids: Vec<String>,
    },
}

/// Compendium management actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompendiumAction {
    /// Create a compendium pack
    Create,
    /// Delete a compendium pack
    Delete,
}

impl CompendiumAction {
    /// Wire name of the action.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Delete => "delete",
        }
    }

    fn operation(self) -> &'static str {
        match self {
            Self::Create => "Create compendium",
            Self::Delete => "Delete compendium",
        }
    }
}

/// Decides whether an inbound frame answers a pending request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseMatcher {
    /// The next `430` frame, malformed or not
    WorldSnapshot,
    /// A `modifyDocument` acknowledgement for `doc_type`
    Document {
        /// Document type, e.g. `Actor`
        doc_type: String,
        /// Content check applied after the type check
        expectation: DocumentExpectation,
    },
    /// A file browser listing: the payload has a `dirs` key
    FileListing,
    /// A `manageCompendium` acknowledgement whose `request.action` matches
    Compendium {
        /// Requested action
        action: CompendiumAction,
    },
}

/// Family of a matcher; a frame settles at most one request per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatcherKind {
    /// World snapshot requests
    World,
    /// `modifyDocument` requests
    Document,
    /// File browser requests
    FileListing,
    /// `manageCompendium` requests
    Compendium,
}

impl MatcherKind {
    const COUNT: usize = 4;

    fn index(self) -> usize {
        match self {
            Self::World => 0,
            Self::Document => 1,
            Self::FileListing => 2,
            Self::Compendium => 3,
        }
    }
}

/// Result of offering a frame to a matcher.
#[derive(Debug)]
pub enum Disposition {
    /// Not an answer to this request
    Skip,
    /// Settle the request with this outcome
    Settle(FoundryResult<Value>),
}

/// An inbound frame decoded once for every matcher.
#[derive(Debug)]
pub struct InboundFrame {
    world: Parsed<Value>,
    ack: Parsed<Vec<Value>>,
}

impl InboundFrame {
    /// Runs both parsers over `text`.
    pub fn decode(text: &str) -> Self {
        Self {
            world: parse_world_response(text),
            ack: parse_ack(text),
        }
    }

    /// First element of a well-formed ack, if any.
    fn ack_payload(&self) -> Option<&Value> {
        match &self.ack {
            Parsed::Mine(Ok(items)) => items.first(),
            _ => None,
        }
    }
}

/// JavaScript-style truthiness of an optional field.
pub(crate) fn truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) | Some(Value::Bool(false)) => false,
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(_) => true,
    }
}

impl ResponseMatcher {
    /// The family this matcher competes within.
    pub fn kind(&self) -> MatcherKind {
        match self {
            Self::WorldSnapshot => MatcherKind::World,
            Self::Document { .. } => MatcherKind::Document,
            Self::FileListing => MatcherKind::FileListing,
            Self::Compendium { .. } => MatcherKind::Compendium,
        }
    }

    /// Offers one decoded frame to this matcher.
    pub fn evaluate(&self, frame: &InboundFrame) -> Disposition {
        match self {
            Self::WorldSnapshot => match &frame.world {
                Parsed::NotMine => Disposition::Skip,
                Parsed::Mine(Ok(data)) => Disposition::Settle(Ok(data.clone())),
                Parsed::Mine(Err(e)) => Disposition::Settle(Err(e.clone().into())),
            },

            // Malformed acks are skipped: they may belong to anyone.
            Self::Document {
                doc_type,
                expectation,
            } => {
                let Some(payload) = frame.ack_payload() else {
                    return Disposition::Skip;
                };
                if payload.get("type").and_then(Value::as_str) != Some(doc_type.as_str()) {
                    return Disposition::Skip;
                }
                if truthy(payload.get("error")) || expectation.accepts(payload) {
                    Disposition::Settle(Ok(payload.clone()))
                } else {
                    Disposition::Skip
                }
            }

            Self::FileListing => {
                let Some(payload) = frame.ack_payload() else {
                    return Disposition::Skip;
                };
                let has_dirs = payload.get("dirs").is_some();
                let error = payload.get("error");
                if truthy(error) {
                    let error = error.cloned().unwrap_or_default();
                    return Disposition::Settle(Err(FoundryError::server("Browse files", &error)));
                }
                if has_dirs {
                    Disposition::Settle(Ok(payload.clone()))
                } else {
                    Disposition::Skip
                }
            }

            Self::Compendium { action } => {
                let Some(payload) = frame.ack_payload() else {
                    return Disposition::Skip;
                };
                let requested = payload
                    .get("request")
                    .and_then(|r| r.get("action"))
                    .and_then(Value::as_str);
                if requested != Some(action.as_str()) {
                    return Disposition::Skip;
                }
                match payload.get("error") {
                    error if truthy(error) => Disposition::Settle(Err(FoundryError::server(
                        action.operation(),
                        error.unwrap_or(&Value::Null),
                    ))),
                    _ => Disposition::Settle(Ok(payload.clone())),
                }
            }
        }
    }
}

impl DocumentExpectation {
    fn accepts(&self, payload: &Value) -> bool {
        let result = payload.get("result").and_then(Value::as_array);
        match self {
            Self::Updated { id } => result.is_some_and(|entries| {
                entries
                    .iter()
                    .any(|entry| entry.get("_id").and_then(Value::as_str) == Some(id.as_str()))
            }),
            Self::Created => payload.get("action").and_then(Value::as_str) == Some("create"),
            Self::Deleted { ids } => {
                payload.get("action").and_then(Value::as_str) == Some("delete")
                    && result.is_some_and(|entries| {
                        entries
                            .iter()
                            .filter_map(Value::as_str)
                            .any(|deleted| ids.iter().any(|id| id == deleted))
                    })
            }
        }
    }
}

#[derive(Debug)]
struct PendingEntry {
    id: u64,
    matcher: ResponseMatcher,
    tx: oneshot::Sender<FoundryResult<Value>>,
}

/// Outstanding requests in registration order.
#[derive(Debug, Default)]
pub struct PendingRegistry {
    entries: Mutex<Vec<PendingEntry>>,
    next_entry: AtomicU64,
}

impl PendingRegistry {
    /// Registers a matcher; the returned request unregisters itself on drop.
    pub fn register(self: &Arc<Self>, matcher: ResponseMatcher) -> PendingRequest {
        let id = self.next_entry.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.entries.lock().push(PendingEntry { id, matcher, tx });
        PendingRequest {
            id,
            registry: Arc::clone(self),
            rx,
        }
    }

    /// Offers a frame to the pending requests; returns whether any settled.
    ///
    /// Each kind settles at most its earliest eligible request, so a frame
    /// one kind claims stays visible to every other kind.
    pub fn dispatch(&self, text: &str) -> bool {
        let settled = {
            let mut entries = self.entries.lock();
            if entries.is_empty() {
                return false;
            }
            let frame = InboundFrame::decode(text);
            let mut claimed = [false; MatcherKind::COUNT];
            let mut outcomes = Vec::new();
            for (index, entry) in entries.iter().enumerate() {
                let kind = entry.matcher.kind().index();
                if claimed[kind] {
                    continue;
                }
                if let Disposition::Settle(outcome) = entry.matcher.evaluate(&frame) {
                    claimed[kind] = true;
                    outcomes.push((index, outcome));
                }
            }
            // Highest index first so earlier indices stay valid.
            outcomes
                .into_iter()
                .rev()
                .map(|(index, outcome)| (entries.remove(index), outcome))
                .collect::<Vec<_>>()
        };

        let any = !settled.is_empty();
        for (entry, outcome) in settled.into_iter().rev() {
            debug!("Settled pending request {} ({:?})", entry.id, entry.matcher);
            let _ = entry.tx.send(outcome);
        }
        any
    }

    /// Number of outstanding requests.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// True when nothing is outstanding.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    fn remove(&self, id: u64) {
        self.entries.lock().retain(|entry| entry.id != id);
    }
}

/// A registered request awaiting its frame.
#[derive(Debug)]
pub struct PendingRequest {
    id: u64,
    registry: Arc<PendingRegistry>,
    rx: oneshot::Receiver<FoundryResult<Value>>,
}

impl PendingRequest {
    /// Waits for the settling frame or the timeout, whichever comes first.
    pub async fn wait(
        mut self,
        limit: Duration,
        waiting_for: &'static str,
        subject: Option<String>,
    ) -> FoundryResult<Value> {
        match tokio::time::timeout(limit, &mut self.rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(FoundryError::Protocol(format!(
                "Pending request for {waiting_for} was dropped"
            ))),
            Err(_) => {
                debug!("Timed out waiting for {}", waiting_for);
                Err(FoundryError::timeout(waiting_for, limit, subject))
            }
        }
    }
}

impl Drop for PendingRequest {
    fn drop(&mut self) {
        self.registry.remove(self.id);
    }
}

/// Allocates ack ids and runs send-then-wait round trips.
#[derive(Debug)]
pub struct Correlator {
    registry: Arc<PendingRegistry>,
    next_ack: AtomicU64,
    request_timeout: Duration,
}

impl Correlator {
    /// New correlator over `registry`; ack ids start at 1.
    pub fn new(registry: Arc<PendingRegistry>, request_timeout: Duration) -> Self {
        Self {
            registry,
            next_ack: AtomicU64::new(1),
            request_timeout,
        }
    }

    /// Next ack id; strictly increasing.
    pub fn next_ack_id(&self) -> u64 {
        self.next_ack.fetch_add(1, Ordering::Relaxed)
    }

    /// The shared registry.
    pub fn registry(&self) -> &Arc<PendingRegistry> {
        &self.registry
    }

    /// Registers `matcher`, sends `frame`, and waits for the answer.
    ///
    /// The matcher is registered before the frame is sent so a fast reply is
    /// never missed.
    pub async fn round_trip(
        &self,
        socket: &SocketHandle,
        frame: String,
        matcher: ResponseMatcher,
        waiting_for: &'static str,
        subject: Option<String>,
    ) -> FoundryResult<Value> {
        let pending = self.registry.register(matcher);
        socket.send_text(frame)?;
        pending.wait(self.request_timeout, waiting_for, subject).await
    }

    /// [`round_trip`](Self::round_trip) for a `42<ack>` event built from `payload`.
    pub async fn emit(
        &self,
        socket: &SocketHandle,
        payload: &Value,
        matcher: ResponseMatcher,
        waiting_for: &'static str,
        subject: Option<String>,
    ) -> FoundryResult<Value> {
        let ack_id = self.next_ack_id();
        let frame = build_event_frame(ack_id, payload);
        debug!("Sending {} request with ack id {}", waiting_for, ack_id);
        self.round_trip(socket, frame, matcher, waiting_for, subject)
            .await
    }
}
