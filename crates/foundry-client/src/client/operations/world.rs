//! World snapshot operations
//!
//! The snapshot is the only read primitive Foundry exposes; every list and
//! lookup fetches it and filters locally.

use foundry_wire::WORLD_REQUEST_FRAME;
use serde_json::{Map, Value};

use crate::client::FoundryClient;
use crate::correlator::ResponseMatcher;
use crate::error::{FoundryError, FoundryResult};
use crate::filter::{self, DocumentLookup, DocumentQuery};

impl FoundryClient {
    /// Fetches the full world state.
    ///
    /// # Errors
    ///
    /// [`FoundryError::NotConnected`], a decode error for a malformed `430`
    /// frame, or a timeout.
    pub async fn request_world_snapshot(&self) -> FoundryResult<Value> {
        let socket = self.socket()?;
        self.inner
            .correlator
            .round_trip(
                &socket,
                WORLD_REQUEST_FRAME.to_string(),
                ResponseMatcher::WorldSnapshot,
                "world data",
                None,
            )
            .await
    }

    /// The snapshot without the named top-level keys.
    pub async fn world(&self, exclude: &[&str]) -> FoundryResult<Map<String, Value>> {
        let world = self.request_world_snapshot().await?;
        Ok(filter::filter_world(&world, exclude))
    }

    /// Documents of one collection after filtering, projection and truncation.
    ///
    /// # Errors
    ///
    /// [`FoundryError::Protocol`] when the snapshot has no such array.
    pub async fn documents(&self, collection: &str, query: &DocumentQuery) -> FoundryResult<Vec<Value>> {
        let docs = collection_of(self.request_world_snapshot().await?, collection)?;
        Ok(filter::query_documents(docs, query))
    }

    /// One document of a collection, or `None` when nothing matches.
    pub async fn document(
        &self,
        collection: &str,
        lookup: &DocumentLookup,
        requested_fields: Option<&[String]>,
    ) -> FoundryResult<Option<Value>> {
        let docs = collection_of(self.request_world_snapshot().await?, collection)?;
        Ok(filter::find_document(&docs, lookup, requested_fields))
    }
}

fn collection_of(mut world: Value, collection: &str) -> FoundryResult<Vec<Value>> {
    match world.get_mut(collection).map(Value::take) {
        Some(Value::Array(docs)) => Ok(docs),
        _ => Err(FoundryError::Protocol(format!(
            "Response does not contain {collection} array"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_collection_is_a_protocol_error() {
        let err = collection_of(json!({"items": []}), "actors").unwrap_err();
        assert_eq!(err.to_string(), "Response does not contain actors array");
        let err = collection_of(json!({"actors": {}}), "actors").unwrap_err();
        assert!(matches!(err, FoundryError::Protocol(_)));
    }

    #[test]
    fn collection_is_moved_out() {
        let docs = collection_of(json!({"actors": [{"_id": "a"}]}), "actors").unwrap();
        assert_eq!(docs, vec![json!({"_id": "a"})]);
    }
}
