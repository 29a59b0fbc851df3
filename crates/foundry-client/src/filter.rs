//! Client-side reads over a decoded world snapshot.
//!
//! Foundry offers no narrower query than the full world, so every list or
//! lookup is a filter over the snapshot.

use serde_json::{Map, Value};

/// Options for listing one collection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentQuery {
    /// Byte budget for the JSON encoded list; `0` is unlimited
    pub max_length: usize,
    /// Fields to keep; `_id` and `name` are always kept
    pub requested_fields: Option<Vec<String>>,
    /// Key/value pairs that must all be equal
    pub where_clause: Option<Map<String, Value>>,
}

/// How to find one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentLookup {
    /// Matches either `id` or `_id`
    Id(String),
    /// Matches `name`
    Name(String),
}

impl DocumentLookup {
    /// `id` wins over `_id`, which wins over `name`.
    pub fn from_parts(id: Option<String>, underscore_id: Option<String>, name: Option<String>) -> Option<Self> {
        let non_empty = |v: Option<String>| v.filter(|s| !s.is_empty());
        non_empty(id)
            .or_else(|| non_empty(underscore_id))
            .map(Self::Id)
            .or_else(|| non_empty(name).map(Self::Name))
    }

    fn matches(&self, doc: &Value) -> bool {
        let field = |key: &str| doc.get(key).and_then(Value::as_str);
        match self {
            Self::Id(id) => field("id") == Some(id.as_str()) || field("_id") == Some(id.as_str()),
            Self::Name(name) => field("name") == Some(name.as_str()),
        }
    }
}

/// Keeps the requested fields plus `_id` and `name`; no request keeps everything.
pub fn filter_fields(doc: &Value, requested: Option<&[String]>) -> Value {
    let (Some(fields), Value::Object(object)) = (requested.filter(|f| !f.is_empty()), doc) else {
        return doc.clone();
    };

    let mut kept = Map::new();
    let always = ["_id", "name"];
    for field in fields.iter().map(String::as_str).chain(always) {
        if let Some(value) = object.get(field)
            && !kept.contains_key(field)
        {
            kept.insert(field.to_string(), value.clone());
        }
    }
    Value::Object(kept)
}

/// Drops documents from the end until the JSON encoding fits `max_length` bytes.
pub fn truncate_documents(mut docs: Vec<Value>, max_length: usize) -> Vec<Value> {
    if max_length == 0 {
        return docs;
    }
    // `[` + `]`, then each document plus its separating comma.
    let mut encoded = 2usize;
    let mut fits = 0;
    for (index, doc) in docs.iter().enumerate() {
        let len = serde_json::to_string(doc).map(|s| s.len()).unwrap_or(usize::MAX);
        encoded = encoded.saturating_add(len).saturating_add(usize::from(index > 0));
        if encoded > max_length {
            break;
        }
        fits = index + 1;
    }
    docs.truncate(fits);
    docs
}

/// Keeps documents whose fields equal every pair in `where_clause`.
pub fn filter_where(docs: Vec<Value>, where_clause: Option<&Map<String, Value>>) -> Vec<Value> {
    let Some(conditions) = where_clause.filter(|w| !w.is_empty()) else {
        return docs;
    };
    docs.into_iter()
        .filter(|doc| {
            conditions
                .iter()
                .all(|(key, expected)| doc.get(key) == Some(expected))
        })
        .collect()
}

/// Applies where-filter, projection and truncation in that order.
pub fn query_documents(docs: Vec<Value>, query: &DocumentQuery) -> Vec<Value> {
    let filtered = filter_where(docs, query.where_clause.as_ref());
    let projected = filtered
        .iter()
        .map(|doc| filter_fields(doc, query.requested_fields.as_deref()))
        .collect();
    truncate_documents(projected, query.max_length)
}

/// First document matching `lookup`, projected to `requested`.
pub fn find_document(docs: &[Value], lookup: &DocumentLookup, requested: Option<&[String]>) -> Option<Value> {
    docs.iter()
        .find(|doc| lookup.matches(doc))
        .map(|doc| filter_fields(doc, requested))
}

/// The snapshot without the named top-level keys.
pub fn filter_world(world: &Value, exclude: &[&str]) -> Map<String, Value> {
    world
        .as_object()
        .map(|object| {
            object
                .iter()
                .filter(|(key, _)| !exclude.contains(&key.as_str()))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect()
        })
        .unwrap_or_default()
}
