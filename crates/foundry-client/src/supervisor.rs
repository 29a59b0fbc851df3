//! Session ownership and reconnection
//!
//! The [`Supervisor`] is the only writer of the active [`Session`]. Everything
//! else reads a snapshot through [`Supervisor::current`] or
//! [`Supervisor::socket`].
//!
//! ## Reconnection
//!
//! When the socket in use closes unexpectedly the supervisor moves from
//! `Idle` to `Reconnecting` and:
//!
//! 1. re-authenticates the cached session id; on success reopens with it;
//! 2. otherwise fetches a fresh session id, authenticates it once, and on
//!    success reopens with the new id;
//! 3. otherwise gives up until the next close.
//!
//! The return to `Idle` happens in a drop guard, whatever the outcome. Closes
//! of sockets that were already replaced or torn down are ignored, as are
//! closes that arrive while a reconnect is running. A replacement socket that
//! is found closed once the guard is released gets another attempt.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::connection::{Connection, OpenedSocket, SocketHandle, dispatcher};
use crate::correlator::PendingRegistry;
use crate::credentials::Credential;
use crate::error::{FoundryError, FoundryResult};
use crate::session::SessionNegotiator;

/// The live authenticated connection.
#[derive(Debug, Clone)]
pub struct Session {
    /// Connected host
    pub hostname: String,
    /// Credential used to authenticate
    pub credential: Credential,
    /// Position of that credential in the store
    pub credential_index: usize,
    /// Current session id
    pub session_id: String,
    /// Current socket
    pub socket: SocketHandle,
}

/// Reconnection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    /// Waiting for a close
    Idle,
    /// A reconnect attempt is running
    Reconnecting,
}

/// Lifecycle notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorEvent {
    /// A session was installed by connect or instance selection
    Connected {
        /// Host
        hostname: String,
    },
    /// Reconnected after an unexpected close
    Reconnected {
        /// Host
        hostname: String,
        /// Whether a fresh session id had to be negotiated
        renewed_session: bool,
    },
    /// A reconnect attempt gave up
    ReconnectFailed {
        /// Host
        hostname: String,
        /// Why
        reason: String,
    },
    /// The session was torn down on request
    Disconnected {
        /// Host
        hostname: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReconnectOutcome {
    Resumed,
    Renewed,
    Rejected,
    Superseded,
}

struct ReconnectGuard<'a>(&'a AtomicBool);

impl<'a> ReconnectGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for ReconnectGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Owner of the active session.
#[derive(Debug)]
pub struct Supervisor {
    negotiator: Arc<dyn SessionNegotiator>,
    connection: Connection,
    registry: Arc<PendingRegistry>,
    slot: RwLock<Option<Session>>,
    reconnecting: AtomicBool,
    events: broadcast::Sender<SupervisorEvent>,
}

impl Supervisor {
    /// New supervisor with no session.
    pub fn new(
        negotiator: Arc<dyn SessionNegotiator>,
        connection: Connection,
        registry: Arc<PendingRegistry>,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(16);
        Arc::new(Self {
            negotiator,
            connection,
            registry,
            slot: RwLock::new(None),
            reconnecting: AtomicBool::new(false),
            events,
        })
    }

    /// Snapshot of the active session.
    pub fn current(&self) -> Option<Session> {
        self.slot.read().clone()
    }

    /// The active socket if it is open.
    ///
    /// # Errors
    ///
    /// [`FoundryError::NotConnected`] without a session or with a closed socket.
    pub fn socket(&self) -> FoundryResult<SocketHandle> {
        self.slot
            .read()
            .as_ref()
            .map(|session| session.socket.clone())
            .filter(SocketHandle::is_open)
            .ok_or(FoundryError::NotConnected)
    }

    /// Current reconnection state.
    pub fn state(&self) -> SupervisorState {
        if self.reconnecting.load(Ordering::Acquire) {
            SupervisorState::Reconnecting
        } else {
            SupervisorState::Idle
        }
    }

    /// Subscribe to lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<SupervisorEvent> {
        self.events.subscribe()
    }

    /// Negotiates, opens and installs a session for one credential.
    ///
    /// Returns `Ok(false)` when the server rejects the credential.
    pub(crate) async fn establish(
        self: &Arc<Self>,
        credential: &Credential,
        credential_index: usize,
    ) -> FoundryResult<bool> {
        let hostname = credential.hostname.clone();
        let session_id = self.negotiator.get_session(&hostname).await?;
        debug!("Got session id for {}", hostname);

        if !self
            .negotiator
            .authenticate(&hostname, &session_id, credential)
            .await?
        {
            return Ok(false);
        }

        let socket = self.open(&hostname, &session_id).await?;
        let session = Session {
            hostname: hostname.clone(),
            credential: credential.clone(),
            credential_index,
            session_id,
            socket,
        };
        if let Some(previous) = self.slot.write().replace(session) {
            previous.socket.close();
        }
        let _ = self.events.send(SupervisorEvent::Connected { hostname });
        Ok(true)
    }

    /// Removes the session and closes its socket. The resulting close does
    /// not trigger a reconnect.
    pub(crate) fn teardown(&self) -> Option<Session> {
        let session = self.slot.write().take()?;
        session.socket.close();
        info!("Disconnected from {}", session.hostname);
        let _ = self.events.send(SupervisorEvent::Disconnected {
            hostname: session.hostname.clone(),
        });
        Some(session)
    }

    /// Reacts to a socket close reported by its dispatcher.
    pub(crate) async fn handle_close(self: Arc<Self>, socket_id: u64) {
        let mut closed = socket_id;
        while let Some(dead) = self.recover(closed).await {
            debug!("Socket {} closed before reconnect finished, retrying", dead);
            closed = dead;
        }
    }

    /// Runs one reconnect attempt for `socket_id`.
    ///
    /// Returns the installed socket's id when it is already closed once the
    /// guard is released; its own close may have been ignored meanwhile.
    async fn recover(self: &Arc<Self>, socket_id: u64) -> Option<u64> {
        let Some(session) = self.current() else {
            debug!("Socket {} closed after teardown", socket_id);
            return None;
        };
        if session.socket.id() != socket_id {
            debug!("Socket {} closed after being replaced", socket_id);
            return None;
        }
        let Some(guard) = ReconnectGuard::acquire(&self.reconnecting) else {
            debug!("Reconnect already in progress, ignoring close of socket {}", socket_id);
            return None;
        };

        info!("Attempting to reconnect to {}...", session.hostname);
        let hostname = session.hostname.clone();
        let (event, installed) = match self.reconnect(&session).await {
            Ok((ReconnectOutcome::Resumed, installed)) => {
                info!("Reconnection to {} successful", hostname);
                let event = SupervisorEvent::Reconnected {
                    hostname,
                    renewed_session: false,
                };
                (event, installed)
            }
            Ok((ReconnectOutcome::Renewed, installed)) => {
                info!("Reconnection to {} with new session successful", hostname);
                let event = SupervisorEvent::Reconnected {
                    hostname,
                    renewed_session: true,
                };
                (event, installed)
            }
            Ok((ReconnectOutcome::Rejected, _)) => {
                error!("Reconnection to {} failed - authentication failed", hostname);
                let event = SupervisorEvent::ReconnectFailed {
                    hostname,
                    reason: "authentication failed".into(),
                };
                (event, None)
            }
            Ok((ReconnectOutcome::Superseded, _)) => {
                warn!("Session for {} changed during reconnect, discarding new socket", hostname);
                let event = SupervisorEvent::ReconnectFailed {
                    hostname,
                    reason: "session replaced during reconnect".into(),
                };
                (event, None)
            }
            Err(e) => {
                error!("Reconnection to {} failed: {}", hostname, e);
                let event = SupervisorEvent::ReconnectFailed {
                    hostname,
                    reason: e.to_string(),
                };
                (event, None)
            }
        };
        drop(guard);
        let _ = self.events.send(event);

        let installed = installed?;
        let still_installed_and_dead = self
            .slot
            .read()
            .as_ref()
            .is_some_and(|session| session.socket.id() == installed && !session.socket.is_open());
        still_installed_and_dead.then_some(installed)
    }

    /// Returns the outcome and, when a socket was installed, its id.
    async fn reconnect(
        self: &Arc<Self>,
        session: &Session,
    ) -> FoundryResult<(ReconnectOutcome, Option<u64>)> {
        let hostname = session.hostname.as_str();
        let stale_socket = session.socket.id();

        if self
            .negotiator
            .authenticate(hostname, &session.session_id, &session.credential)
            .await?
        {
            let socket = self.open(hostname, &session.session_id).await?;
            return Ok(self.swap_socket(stale_socket, socket, None, ReconnectOutcome::Resumed));
        }

        let fresh = self.negotiator.get_session(hostname).await?;
        if !self
            .negotiator
            .authenticate(hostname, &fresh, &session.credential)
            .await?
        {
            return Ok((ReconnectOutcome::Rejected, None));
        }

        let socket = self.open(hostname, &fresh).await?;
        Ok(self.swap_socket(stale_socket, socket, Some(fresh), ReconnectOutcome::Renewed))
    }

    async fn open(self: &Arc<Self>, hostname: &str, session_id: &str) -> FoundryResult<SocketHandle> {
        let opened: OpenedSocket = self.connection.open(hostname, session_id).await?;
        Ok(dispatcher::spawn(
            opened,
            Arc::clone(&self.registry),
            Arc::downgrade(self),
        ))
    }

    /// Installs a reconnected socket unless the session moved on meanwhile.
    fn swap_socket(
        &self,
        stale_socket: u64,
        socket: SocketHandle,
        session_id: Option<String>,
        outcome: ReconnectOutcome,
    ) -> (ReconnectOutcome, Option<u64>) {
        let mut slot = self.slot.write();
        match slot.as_mut() {
            Some(session) if session.socket.id() == stale_socket => {
                let installed = socket.id();
                session.socket = socket;
                if let Some(session_id) = session_id {
                    session.session_id = session_id;
                }
                (outcome, Some(installed))
            }
            _ => {
                socket.close();
                (ReconnectOutcome::Superseded, None)
            }
        }
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        if let Some(session) = self.slot.get_mut().take() {
            session.socket.close();
        }
    }
}
