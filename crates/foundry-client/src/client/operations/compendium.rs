//! Compendium pack management over `manageCompendium`

use serde_json::{Value, json};

use crate::client::FoundryClient;
use crate::correlator::{CompendiumAction, ResponseMatcher};
use crate::error::FoundryResult;

impl FoundryClient {
    /// Creates a compendium pack holding documents of `doc_type`.
    pub async fn create_compendium(&self, label: &str, doc_type: &str) -> FoundryResult<Value> {
        let payload = json!([
            "manageCompendium",
            {
                "action": "create",
                "data": {"label": label, "type": doc_type},
                "options": {},
            }
        ]);
        self.manage_compendium(payload, CompendiumAction::Create, "createCompendium response")
            .await
    }

    /// Deletes the compendium pack `name`.
    pub async fn delete_compendium(&self, name: &str) -> FoundryResult<Value> {
        let payload = json!([
            "manageCompendium",
            {
                "action": "delete",
                "data": name,
                "options": {},
            }
        ]);
        self.manage_compendium(payload, CompendiumAction::Delete, "deleteCompendium response")
            .await
    }

    async fn manage_compendium(
        &self,
        payload: Value,
        action: CompendiumAction,
        waiting_for: &'static str,
    ) -> FoundryResult<Value> {
        let socket = self.socket()?;
        self.inner
            .correlator
            .emit(
                &socket,
                &payload,
                ResponseMatcher::Compendium { action },
                waiting_for,
                None,
            )
            .await
    }
}
