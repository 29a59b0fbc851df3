//! Document mutations over `modifyDocument`
//!
//! Each mutation sends `42<ack>["modifyDocument", {type, action, operation}]`
//! and settles on the first ack of the same type whose content matches the
//! request (see [`DocumentExpectation`]). Server-side validation failures
//! come back as ordinary payloads with an `error` field; callers inspect them.

use serde_json::{Map, Value, json};

use crate::client::FoundryClient;
use crate::correlator::{DocumentExpectation, ResponseMatcher};
use crate::error::{FoundryError, FoundryResult};

/// Optional targeting shared by every document mutation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentOptions {
    /// Compendium pack id; `None` targets the world
    pub pack: Option<String>,
    /// Parent document for embedded documents, e.g. `Actor.abc123`
    pub parent_uuid: Option<String>,
}

impl DocumentOptions {
    /// Options targeting an embedded collection of `parent_uuid`.
    pub fn with_parent(parent_uuid: impl Into<String>) -> Self {
        Self {
            parent_uuid: Some(parent_uuid.into()),
            ..Self::default()
        }
    }

    fn apply(&self, mut operation: Map<String, Value>) -> Value {
        operation.insert("pack".into(), json!(self.pack));
        if let Some(parent) = &self.parent_uuid {
            operation.insert("parentUuid".into(), Value::String(parent.clone()));
        }
        Value::Object(operation)
    }
}

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// Operation body for an update; every entry gets `_id` set to `id`.
pub fn update_operation(id: &str, updates: Vec<Value>, modified_time: i64, options: &DocumentOptions) -> Value {
    let updates: Vec<Value> = updates
        .into_iter()
        .map(|update| {
            let mut entry = object(update);
            entry.insert("_id".into(), Value::String(id.to_string()));
            Value::Object(entry)
        })
        .collect();
    options.apply(object(json!({
        "diff": false,
        "updates": updates,
        "action": "update",
        "modifiedTime": modified_time,
        "recursive": true,
        "render": true,
    })))
}

/// Operation body for a create.
pub fn create_operation(data: Vec<Value>, modified_time: i64, options: &DocumentOptions) -> Value {
    options.apply(object(json!({
        "data": data,
        "action": "create",
        "modifiedTime": modified_time,
        "renderSheet": true,
        "render": true,
    })))
}

/// Operation body for a delete.
pub fn delete_operation(ids: &[String], modified_time: i64, options: &DocumentOptions) -> Value {
    options.apply(object(json!({
        "ids": ids,
        "action": "delete",
        "modifiedTime": modified_time,
        "deleteAll": false,
        "render": true,
    })))
}

impl FoundryClient {
    /// Updates document `id` of `doc_type` with `updates`.
    ///
    /// Resolves with the ack whose `result` contains `id`, or with an error
    /// payload for the same type.
    pub async fn modify_document(
        &self,
        doc_type: &str,
        id: &str,
        updates: Vec<Value>,
        options: &DocumentOptions,
    ) -> FoundryResult<Value> {
        let operation = update_operation(id, updates, self.inner.clock.now_millis(), options);
        self.send_document_operation(
            doc_type,
            "update",
            operation,
            DocumentExpectation::Updated { id: id.to_string() },
            "modifyDocument response",
            format!("{doc_type} {id}"),
        )
        .await
    }

    /// Creates documents of `doc_type` from `data`.
    pub async fn create_document(
        &self,
        doc_type: &str,
        data: Vec<Value>,
        options: &DocumentOptions,
    ) -> FoundryResult<Value> {
        let operation = create_operation(data, self.inner.clock.now_millis(), options);
        self.send_document_operation(
            doc_type,
            "create",
            operation,
            DocumentExpectation::Created,
            "createDocument response",
            doc_type.to_string(),
        )
        .await
    }

    /// Deletes the documents of `doc_type` named by `ids`.
    ///
    /// # Errors
    ///
    /// [`FoundryError::InvalidArgument`] for an empty id list.
    pub async fn delete_document(
        &self,
        doc_type: &str,
        ids: &[String],
        options: &DocumentOptions,
    ) -> FoundryResult<Value> {
        if ids.is_empty() {
            return Err(FoundryError::InvalidArgument("ids must not be empty".into()));
        }
        let operation = delete_operation(ids, self.inner.clock.now_millis(), options);
        self.send_document_operation(
            doc_type,
            "delete",
            operation,
            DocumentExpectation::Deleted { ids: ids.to_vec() },
            "deleteDocument response",
            doc_type.to_string(),
        )
        .await
    }

    async fn send_document_operation(
        &self,
        doc_type: &str,
        action: &str,
        operation: Value,
        expectation: DocumentExpectation,
        waiting_for: &'static str,
        subject: String,
    ) -> FoundryResult<Value> {
        let socket = self.socket()?;
        let payload = json!([
            "modifyDocument",
            {
                "type": doc_type,
                "action": action,
                "operation": operation,
            }
        ]);
        self.inner
            .correlator
            .emit(
                &socket,
                &payload,
                ResponseMatcher::Document {
                    doc_type: doc_type.to_string(),
                    expectation,
                },
                waiting_for,
                Some(subject),
            )
            .await
    }
}
