//! Foundry client facade
//!
//! [`FoundryClient`] is cheaply cloneable; every clone shares one
//! [`Supervisor`] (and therefore one session) and one pending-request
//! registry. Operations live in `operations/`, each adding an `impl` block.

mod builder;
pub mod operations;

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::clock::Clock;
use crate::config::ClientConfig;
use crate::connection::SocketHandle;
use crate::correlator::Correlator;
use crate::credentials::{CredentialInfo, CredentialStore, Selector};
use crate::error::{FoundryError, FoundryResult};
use crate::supervisor::{Session, Supervisor, SupervisorEvent, SupervisorState};

pub use builder::FoundryClientBuilder;

#[derive(Debug)]
pub(crate) struct ClientInner {
    pub(crate) config: ClientConfig,
    pub(crate) credentials_path: PathBuf,
    pub(crate) credentials: Mutex<Option<Arc<CredentialStore>>>,
    pub(crate) supervisor: Arc<Supervisor>,
    pub(crate) correlator: Correlator,
    pub(crate) http: reqwest::Client,
    pub(crate) clock: Arc<dyn Clock>,
}

/// Client for one Foundry VTT server at a time.
#[derive(Debug, Clone)]
pub struct FoundryClient {
    pub(crate) inner: Arc<ClientInner>,
}

impl FoundryClient {
    /// Start building a client.
    pub fn builder() -> FoundryClientBuilder {
        FoundryClientBuilder::new()
    }

    /// Client with default configuration and production transports.
    ///
    /// # Errors
    ///
    /// See [`FoundryClientBuilder::build`].
    pub fn new(config: ClientConfig) -> FoundryResult<Self> {
        Self::builder().with_config(config).build()
    }

    /// The active configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// The credential store, loading it from disk on first use.
    ///
    /// # Errors
    ///
    /// [`FoundryError::Credentials`] when the file cannot be read or parsed.
    pub fn credentials(&self) -> FoundryResult<Arc<CredentialStore>> {
        let mut slot = self.inner.credentials.lock();
        if let Some(store) = slot.as_ref() {
            return Ok(Arc::clone(store));
        }
        let store = Arc::new(CredentialStore::load(&self.inner.credentials_path)?);
        *slot = Some(Arc::clone(&store));
        Ok(store)
    }

    /// Connects using the first credential that works, in file order.
    ///
    /// A rejected credential or a transport failure moves on to the next
    /// entry.
    ///
    /// # Errors
    ///
    /// [`FoundryError::NoCredentials`] for an empty store,
    /// [`FoundryError::NoServerAvailable`] when every entry failed.
    pub async fn connect(&self) -> FoundryResult<()> {
        let store = self.credentials()?;
        if store.is_empty() {
            return Err(FoundryError::NoCredentials);
        }

        for (index, credential) in store.iter().enumerate() {
            info!("Trying to connect to {}", credential.hostname);
            match self.inner.supervisor.establish(credential, index).await {
                Ok(true) => {
                    info!("Connected to {}", credential.hostname);
                    return Ok(());
                }
                Ok(false) => warn!("Authentication failed for {}", credential.hostname),
                Err(e) => warn!("Failed to connect to {}: {}", credential.hostname, e),
            }
        }
        Err(FoundryError::NoServerAvailable)
    }

    /// Switches to the selected instance.
    ///
    /// The current session is torn down before negotiating, so a failure
    /// leaves the client disconnected.
    ///
    /// # Errors
    ///
    /// Selector resolution errors, transport errors, or
    /// [`FoundryError::AuthenticationFailed`].
    pub async fn choose_instance(&self, selector: &Selector) -> FoundryResult<CredentialInfo> {
        let store = self.credentials()?;
        let index = store.resolve(selector)?;
        let credential = store.get(index).ok_or(FoundryError::NoCredentials)?;

        self.inner.supervisor.teardown();
        if !self.inner.supervisor.establish(credential, index).await? {
            return Err(FoundryError::AuthenticationFailed {
                host: credential.hostname.clone(),
            });
        }
        info!("Switched to {}", credential.hostname);

        store
            .infos(Some(index))
            .into_iter()
            .nth(index)
            .ok_or(FoundryError::NoCredentials)
    }

    /// Closes the socket and forgets the session.
    pub fn disconnect(&self) {
        self.inner.supervisor.teardown();
    }

    /// True when a session exists and its socket is open.
    pub fn is_connected(&self) -> bool {
        self.inner.supervisor.socket().is_ok()
    }

    /// Host of the active session.
    pub fn hostname(&self) -> Option<String> {
        self.inner.supervisor.current().map(|s| s.hostname)
    }

    /// Session id of the active session.
    pub fn session_id(&self) -> Option<String> {
        self.inner.supervisor.current().map(|s| s.session_id)
    }

    /// Configured instances without passwords, flagging the active one.
    ///
    /// # Errors
    ///
    /// Credential loading errors.
    pub fn credentials_info(&self) -> FoundryResult<Vec<CredentialInfo>> {
        let active = self
            .inner
            .supervisor
            .current()
            .map(|s| s.credential_index);
        Ok(self.credentials()?.infos(active))
    }

    /// Sends a raw frame on the active socket.
    ///
    /// # Errors
    ///
    /// [`FoundryError::NotConnected`] without an open socket.
    pub fn send_raw(&self, text: impl Into<String>) -> FoundryResult<()> {
        self.socket()?.send_text(text)
    }

    /// Lifecycle notifications from the reconnection supervisor.
    pub fn subscribe(&self) -> broadcast::Receiver<SupervisorEvent> {
        self.inner.supervisor.subscribe()
    }

    /// Reconnection state.
    pub fn state(&self) -> SupervisorState {
        self.inner.supervisor.state()
    }

    /// Number of requests waiting for a response frame.
    pub fn pending_requests(&self) -> usize {
        self.inner.correlator.registry().len()
    }

    pub(crate) fn socket(&self) -> FoundryResult<SocketHandle> {
        self.inner.supervisor.socket()
    }

    pub(crate) fn session(&self) -> FoundryResult<Session> {
        self.inner.supervisor.current().ok_or(FoundryError::NotConnected)
    }
}
