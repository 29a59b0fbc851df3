//! Credential store
//!
//! The credential file is a JSON array of `{_id, hostname, userid, password}`
//! objects. Order matters: `connect` tries them front to back and
//! `item_order` selects by position.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{FoundryError, FoundryResult};

/// One configured Foundry instance.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    /// Stable identifier chosen by the operator
    #[serde(rename = "_id")]
    pub id: String,
    /// Host (and optional port) of the Foundry server
    pub hostname: String,
    /// Foundry user id to join as
    pub userid: String,
    /// Password for that user
    pub password: String,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("id", &self.id)
            .field("hostname", &self.hostname)
            .field("userid", &self.userid)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Password-free view of a credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CredentialInfo {
    /// Credential identifier
    #[serde(rename = "_id")]
    pub id: String,
    /// Host of the instance
    pub hostname: String,
    /// User id
    pub userid: String,
    /// Position in the credential file
    pub item_order: usize,
    /// Whether the current session uses this credential
    pub currently_active: bool,
}

/// How a caller picks one credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    /// Position in the file; signed so out-of-range input can be reported
    ByOrder(i64),
    /// Value of `_id`
    ById(String),
}

impl Selector {
    /// Builds a selector from optional tool arguments; `item_order` wins when
    /// both are present.
    pub fn from_parts(item_order: Option<i64>, id: Option<String>) -> FoundryResult<Self> {
        match (item_order, id) {
            (Some(order), _) => Ok(Self::ByOrder(order)),
            (None, Some(id)) => Ok(Self::ById(id)),
            (None, None) => Err(FoundryError::InvalidArgument(
                "Must provide either item_order or _id".into(),
            )),
        }
    }
}

/// Ordered list of credentials.
#[derive(Debug, Clone, Default)]
pub struct CredentialStore {
    source: Option<PathBuf>,
    credentials: Vec<Credential>,
}

impl CredentialStore {
    /// Wraps an in-memory list.
    pub fn from_credentials(credentials: Vec<Credential>) -> Self {
        Self {
            source: None,
            credentials,
        }
    }

    /// Reads and parses a credential file.
    pub fn load(path: &Path) -> FoundryResult<Self> {
        let wrap = |reason: String| FoundryError::Credentials {
            path: path.to_path_buf(),
            reason,
        };
        let raw = std::fs::read_to_string(path).map_err(|e| wrap(e.to_string()))?;
        let credentials = Self::parse(&raw).map_err(|e| wrap(e.to_string()))?;
        tracing::debug!(
            "Loaded {} credential(s) from {}",
            credentials.len(),
            path.display()
        );
        Ok(Self {
            source: Some(path.to_path_buf()),
            credentials,
        })
    }

    /// Parses the JSON text of a credential file.
    pub fn parse(raw: &str) -> FoundryResult<Vec<Credential>> {
        let value: Value = serde_json::from_str(raw)?;
        if !value.is_array() {
            return Err(FoundryError::InvalidArgument(
                "Credentials JSON must be an array".into(),
            ));
        }
        Ok(serde_json::from_value(value)?)
    }

    /// File the store was loaded from, if any.
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Number of credentials.
    pub fn len(&self) -> usize {
        self.credentials.len()
    }

    /// True when no credentials are configured.
    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty()
    }

    /// Credential at `index`.
    pub fn get(&self, index: usize) -> Option<&Credential> {
        self.credentials.get(index)
    }

    /// Credentials in file order.
    pub fn iter(&self) -> impl Iterator<Item = &Credential> {
        self.credentials.iter()
    }

    /// Password-free listing, flagging `active` as the current one.
    pub fn infos(&self, active: Option<usize>) -> Vec<CredentialInfo> {
        self.credentials
            .iter()
            .enumerate()
            .map(|(index, cred)| CredentialInfo {
                id: cred.id.clone(),
                hostname: cred.hostname.clone(),
                userid: cred.userid.clone(),
                item_order: index,
                currently_active: active == Some(index),
            })
            .collect()
    }

    /// Resolves a selector to an index.
    pub fn resolve(&self, selector: &Selector) -> FoundryResult<usize> {
        match selector {
            Selector::ByOrder(order) => usize::try_from(*order)
                .ok()
                .filter(|index| *index < self.credentials.len())
                .ok_or_else(|| {
                    FoundryError::InvalidArgument(format!(
                        "Invalid item_order: {order}. Valid range is 0-{}",
                        self.credentials.len() as i64 - 1
                    ))
                }),
            Selector::ById(id) => self
                .credentials
                .iter()
                .position(|cred| &cred.id == id)
                .ok_or_else(|| {
                    let valid = self
                        .credentials
                        .iter()
                        .map(|cred| cred.id.as_str())
                        .collect::<Vec<_>>()
                        .join(", ");
                    FoundryError::InvalidArgument(format!(
                        "No credential found with _id: \"{id}\". Valid _ids are: {valid}"
                    ))
                }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn store() -> CredentialStore {
        CredentialStore::from_credentials(vec![
            Credential {
                id: "main".into(),
                hostname: "a.example".into(),
                userid: "u1".into(),
                password: "p1".into(),
            },
            Credential {
                id: "backup".into(),
                hostname: "b.example".into(),
                userid: "u2".into(),
                password: "p2".into(),
            },
        ])
    }

    #[test]
    fn parse_requires_array() {
        let err = CredentialStore::parse(r#"{"_id":"x"}"#).unwrap_err();
        assert_eq!(err.to_string(), "Credentials JSON must be an array");
    }

    #[test]
    fn parse_reads_underscore_id() {
        let creds = CredentialStore::parse(
            r#"[{"_id":"main","hostname":"h","userid":"u","password":"p"}]"#,
        )
        .unwrap();
        assert_eq!(creds[0].id, "main");
    }

    #[test]
    fn infos_hide_passwords_and_flag_active() {
        let infos = store().infos(Some(1));
        assert_eq!(infos.len(), 2);
        assert!(!infos[0].currently_active);
        assert!(infos[1].currently_active);
        assert_eq!(infos[1].item_order, 1);
        let json = serde_json::to_string(&infos).unwrap();
        assert!(!json.contains("p1"));
        assert!(json.contains("\"_id\":\"main\""));
    }

    #[test]
    fn resolve_by_order_checks_range() {
        let store = store();
        assert_eq!(store.resolve(&Selector::ByOrder(1)).unwrap(), 1);
        let err = store.resolve(&Selector::ByOrder(2)).unwrap_err();
        assert_eq!(err.to_string(), "Invalid item_order: 2. Valid range is 0-1");
        let err = store.resolve(&Selector::ByOrder(-1)).unwrap_err();
        assert_eq!(err.to_string(), "Invalid item_order: -1. Valid range is 0-1");
    }

    #[test]
    fn resolve_by_id_lists_valid_ids() {
        let store = store();
        assert_eq!(store.resolve(&Selector::ById("backup".into())).unwrap(), 1);
        let err = store.resolve(&Selector::ById("nope".into())).unwrap_err();
        assert_eq!(
            err.to_string(),
            "No credential found with _id: \"nope\". Valid _ids are: main, backup"
        );
    }

    #[test]
    fn selector_requires_one_field() {
        assert!(Selector::from_parts(None, None).is_err());
        assert_eq!(
            Selector::from_parts(Some(0), Some("main".into())).unwrap(),
            Selector::ByOrder(0)
        );
    }

    #[test]
    fn load_wraps_errors_with_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.json");
        let err = CredentialStore::load(&path).unwrap_err();
        assert!(err.to_string().starts_with("Failed to load credentials from"));
        assert!(err.to_string().contains("missing.json"));
    }

    #[test]
    fn debug_redacts_password() {
        let rendered = format!("{:?}", store().get(0).unwrap());
        assert!(!rendered.contains("p1"));
    }
}
