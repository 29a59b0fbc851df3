//! Session negotiation
//!
//! Two HTTP exchanges bind a session id to one host:
//!
//! 1. `GET /join` yields the id from a `session=` cookie, or the client
//!    invents one.
//! 2. `POST /join` with `{userid, password, action: "join"}` and the cookie
//!    authenticates it.
//!
//! A rejected credential is `Ok(false)`; only a request that never completes
//! is an error.

use std::fmt;

use async_trait::async_trait;
use rand::RngCore;
use reqwest::header::{COOKIE, SET_COOKIE};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::credentials::Credential;
use crate::error::{FoundryError, FoundryResult};

const SESSION_COOKIE: &str = "session=";

/// The two-step join handshake.
#[async_trait]
pub trait SessionNegotiator: Send + Sync + fmt::Debug {
    /// Fetches or synthesizes a session id for `hostname`.
    async fn get_session(&self, hostname: &str) -> FoundryResult<String>;

    /// Authenticates `session_id` with `credential`; `false` means rejected.
    async fn authenticate(
        &self,
        hostname: &str,
        session_id: &str,
        credential: &Credential,
    ) -> FoundryResult<bool>;
}

#[derive(Serialize)]
struct JoinRequest<'a> {
    userid: &'a str,
    password: &'a str,
    action: &'static str,
}

/// [`SessionNegotiator`] over reqwest.
#[derive(Debug, Clone)]
pub struct HttpNegotiator {
    http: reqwest::Client,
    scheme: &'static str,
    session_id_bytes: usize,
}

impl HttpNegotiator {
    /// Builds a negotiator using the scheme and id length from `config`.
    ///
    /// Redirects are not followed so the `Set-Cookie` of the join page itself
    /// is the one inspected.
    pub fn new(config: &ClientConfig) -> FoundryResult<Self> {
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| FoundryError::HttpClient(e.to_string()))?;
        Ok(Self {
            http,
            scheme: config.http_scheme(),
            session_id_bytes: config.session_id_bytes,
        })
    }

    fn join_url(&self, hostname: &str) -> String {
        format!("{}://{}/join", self.scheme, hostname)
    }
}

#[async_trait]
impl SessionNegotiator for HttpNegotiator {
    async fn get_session(&self, hostname: &str) -> FoundryResult<String> {
        let response = self
            .http
            .get(self.join_url(hostname))
            .send()
            .await
            .map_err(|e| request_error("GET /join", hostname, e))?;

        let cookies = response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok());

        match extract_session_id(cookies) {
            Some(id) => {
                debug!("Got session cookie from {}", hostname);
                Ok(id)
            }
            None => {
                debug!("No session cookie from {}, generating one", hostname);
                Ok(generate_session_id(self.session_id_bytes))
            }
        }
    }

    async fn authenticate(
        &self,
        hostname: &str,
        session_id: &str,
        credential: &Credential,
    ) -> FoundryResult<bool> {
        let body = JoinRequest {
            userid: &credential.userid,
            password: &credential.password,
            action: "join",
        };

        let response = self
            .http
            .post(self.join_url(hostname))
            .header(COOKIE, format!("{SESSION_COOKIE}{session_id}"))
            .json(&body)
            .send()
            .await
            .map_err(|e| request_error("POST /join", hostname, e))?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| request_error("POST /join", hostname, e))?;

        if join_accepted(status, &text) {
            info!("Authentication successful for {}", hostname);
            Ok(true)
        } else {
            warn!("Authentication failed for {}: {} - {}", hostname, status, text);
            Ok(false)
        }
    }
}

fn request_error(operation: &'static str, host: &str, err: impl fmt::Display) -> FoundryError {
    FoundryError::Request {
        operation,
        host: host.to_string(),
        reason: err.to_string(),
    }
}

/// First `session=<value>` found across `Set-Cookie` headers.
pub fn extract_session_id<'a>(cookies: impl IntoIterator<Item = &'a str>) -> Option<String> {
    cookies.into_iter().find_map(|cookie| {
        let start = cookie.find(SESSION_COOKIE)? + SESSION_COOKIE.len();
        let value = cookie[start..].split(';').next().unwrap_or_default();
        (!value.is_empty()).then(|| value.to_string())
    })
}

/// Hex encoded random id of `bytes` bytes from the thread-local CSPRNG.
pub fn generate_session_id(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::rng().fill_bytes(&mut buf);
    buf.iter().map(|b| format!("{b:02x}")).collect()
}

/// True iff the status is exactly 200 and the body is JSON with `status: "success"`.
pub fn join_accepted(status: u16, body: &str) -> bool {
    status == 200
        && serde_json::from_str::<Value>(body)
            .ok()
            .and_then(|v| v.get("status").and_then(Value::as_str).map(|s| s == "success"))
            .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn extracts_session_cookie_among_others() {
        let cookies = ["foo=bar", "session=abc123; Path=/"];
        assert_eq!(extract_session_id(cookies), Some("abc123".into()));
    }

    #[test]
    fn missing_cookie_yields_none() {
        assert_eq!(extract_session_id(["foo=bar; HttpOnly"]), None);
        assert_eq!(extract_session_id(Vec::<&str>::new()), None);
    }

    #[test]
    fn cookie_without_attributes() {
        assert_eq!(extract_session_id(["session=xyz"]), Some("xyz".into()));
    }

    #[test]
    fn generated_ids_are_hex_of_configured_length() {
        let id = generate_session_id(12);
        assert_eq!(id.len(), 24);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(id, generate_session_id(12));
    }

    #[test]
    fn join_acceptance_rules() {
        assert!(join_accepted(200, r#"{"status":"success","message":"ok"}"#));
        assert!(!join_accepted(401, r#"{"status":"success"}"#));
        assert!(!join_accepted(200, "<html>nope</html>"));
        assert!(!join_accepted(200, r#"{"status":"failed"}"#));
        assert!(!join_accepted(302, ""));
    }
}
