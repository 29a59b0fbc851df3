//! Builder for [`FoundryClient`]
//!
//! Every collaborator has a production default; tests swap in fakes.

use std::sync::Arc;

use parking_lot::Mutex;

use super::{ClientInner, FoundryClient};
use crate::clock::{Clock, SystemClock};
use crate::config::ClientConfig;
use crate::connection::{Connection, SocketConnector, TungsteniteConnector};
use crate::correlator::{Correlator, PendingRegistry};
use crate::credentials::CredentialStore;
use crate::error::{FoundryError, FoundryResult};
use crate::session::{HttpNegotiator, SessionNegotiator};
use crate::supervisor::Supervisor;

/// Builder for configuring and creating a [`FoundryClient`]
///
/// ```rust,no_run
/// use foundry_client::{ClientConfig, FoundryClient};
///
/// # async fn example() -> foundry_client::FoundryResult<()> {
/// let client = FoundryClient::builder()
///     .with_config(ClientConfig::default().with_credentials_path("creds.json"))
///     .build()?;
/// client.connect().await?;
/// println!("connected to {:?}", client.hostname());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct FoundryClientBuilder {
    config: ClientConfig,
    negotiator: Option<Arc<dyn SessionNegotiator>>,
    connector: Option<Arc<dyn SocketConnector>>,
    clock: Option<Arc<dyn Clock>>,
    credentials: Option<CredentialStore>,
}

impl FoundryClientBuilder {
    /// Builder with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the configuration.
    pub fn with_config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Use a custom join handshake.
    pub fn with_negotiator(mut self, negotiator: Arc<dyn SessionNegotiator>) -> Self {
        self.negotiator = Some(negotiator);
        self
    }

    /// Use a custom websocket connector.
    pub fn with_connector(mut self, connector: Arc<dyn SocketConnector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Use a custom clock for `modifiedTime`.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Supply credentials directly instead of reading the credential file.
    pub fn with_credentials(mut self, credentials: CredentialStore) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Build the client.
    ///
    /// # Errors
    ///
    /// [`FoundryError::HttpClient`] if an HTTP client cannot be created.
    pub fn build(self) -> FoundryResult<FoundryClient> {
        let config = self.config;

        let negotiator: Arc<dyn SessionNegotiator> = match self.negotiator {
            Some(negotiator) => negotiator,
            None => Arc::new(HttpNegotiator::new(&config)?),
        };
        let connector = self
            .connector
            .unwrap_or_else(|| Arc::new(TungsteniteConnector::new()));

        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| FoundryError::HttpClient(e.to_string()))?;

        let registry = Arc::new(PendingRegistry::default());
        let supervisor = Supervisor::new(
            negotiator,
            Connection::new(connector, &config),
            Arc::clone(&registry),
        );
        let correlator = Correlator::new(registry, config.request_timeout);

        Ok(FoundryClient {
            inner: Arc::new(ClientInner {
                credentials_path: config.credentials_path_from_env(),
                credentials: Mutex::new(self.credentials.map(Arc::new)),
                supervisor,
                correlator,
                http,
                clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
                config,
            }),
        })
    }
}
