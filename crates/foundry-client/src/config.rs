//! Client configuration
//!
//! Durations are written in seconds when the configuration is loaded from a
//! file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Environment variable naming the credential file.
pub const CREDENTIALS_ENV: &str = "FOUNDRY_CREDENTIALS";

/// Credential file used when neither a path nor [`CREDENTIALS_ENV`] is given,
/// relative to the working directory.
pub const DEFAULT_CREDENTIALS_FILE: &str = "config/foundry_credentials.json";

/// Default timeout for the websocket upgrade.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default timeout for world, document, file and compendium round trips.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration for [`FoundryClient`](crate::FoundryClient)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Explicit credential file; resolved through [`ClientConfig::resolve_credentials_path`]
    pub credentials_path: Option<PathBuf>,

    /// Use `https`/`wss` (default) instead of plain `http`/`ws`
    pub secure: bool,

    /// Websocket upgrade timeout
    #[serde(with = "duration_secs")]
    pub connect_timeout: Duration,

    /// Round-trip timeout for correlated requests
    #[serde(with = "duration_secs")]
    pub request_timeout: Duration,

    /// Random bytes in a generated session id (hex encoded, so twice as many characters)
    pub session_id_bytes: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            credentials_path: None,
            secure: true,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            session_id_bytes: 12,
        }
    }
}

impl ClientConfig {
    /// Create a configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the credential file
    pub fn with_credentials_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.credentials_path = Some(path.into());
        self
    }

    /// Toggle TLS for HTTP and websocket traffic
    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// Set the websocket upgrade timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the round-trip timeout
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the session id length in random bytes
    pub fn with_session_id_bytes(mut self, bytes: usize) -> Self {
        self.session_id_bytes = bytes;
        self
    }

    /// `https` or `http`
    pub fn http_scheme(&self) -> &'static str {
        if self.secure { "https" } else { "http" }
    }

    /// `wss` or `ws`
    pub fn ws_scheme(&self) -> &'static str {
        if self.secure { "wss" } else { "ws" }
    }

    /// Credential file location: explicit path, then the
    /// `FOUNDRY_CREDENTIALS` variable, then `config/foundry_credentials.json`
    /// under `cwd`.
    pub fn resolve_credentials_path(&self, env_value: Option<String>, cwd: &Path) -> PathBuf {
        if let Some(path) = &self.credentials_path {
            return path.clone();
        }
        match env_value.filter(|v| !v.is_empty()) {
            Some(value) => PathBuf::from(value),
            None => cwd.join(DEFAULT_CREDENTIALS_FILE),
        }
    }

    /// [`resolve_credentials_path`](Self::resolve_credentials_path) against the process environment.
    pub fn credentials_path_from_env(&self) -> PathBuf {
        let cwd = std::env::current_dir().unwrap_or_default();
        self.resolve_credentials_path(std::env::var(CREDENTIALS_ENV).ok(), &cwd)
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
