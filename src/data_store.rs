//! # Data Storage Abstraction
//!
//! This module defines the collection store the CRUD layer forwards operations to. The
//! [`DataStore`] trait is the only thing the dispatcher knows about persistence; any backend
//! that can insert, find, replace, update and remove JSON documents by collection name can
//! sit behind it.
//!
//! ## Storage Model
//!
//! ```text
//! Collection (name) ──┬── Document { "_id": ..., ... }
//!                     ├── Document
//!                     └── ...
//! ```
//!
//! Documents are JSON objects identified by their `_id` member.
//!
//! ## Implementations
//!
//! - **InMemoryDataStore**: Thread-safe in-memory storage using `Mutex<HashMap>`, with
//!   Mongo-style criteria, sort, paging, projection and update operators
//!
//! ## Usage Examples
//!
//! ```rust
//! use crudlify::{DataStore, GetManyOptions, InMemoryDataStore};
//! use serde_json::json;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let store = InMemoryDataStore::new();
//! let inserted = store.insert_one("users", json!({"name": "Ada"})).await.unwrap();
//! let id = inserted["_id"].as_str().unwrap();
//!
//! let found = store.get_one("users", id).await.unwrap();
//! assert_eq!(found["name"], "Ada");
//!
//! let all = store.get_many("users", &GetManyOptions::default()).await.unwrap();
//! assert_eq!(all.len(), 1);
//! # }
//! ```

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use axum::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::DataStoreError;
use crate::filter::{self, ID_FIELD};
use crate::query::{NormalizedQuery, SortKey};

/// Options for [`DataStore::get_many`].
///
/// Only options that were actually requested are set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GetManyOptions {
    /// Mongo-style filter criteria.
    #[serde(default)]
    pub filter: Map<String, Value>,
    /// Maximum number of documents; `0` means no limit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    /// Number of matching documents to skip.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<u64>,
    /// Projection hints.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hints: Option<Hints>,
    /// Sort keys, most significant first.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<Vec<SortKey>>,
}

/// Store hints accompanying a read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Hints {
    /// Projection: field name to `1` (include) or `0` (exclude).
    #[serde(rename = "$fields")]
    pub fields: Map<String, Value>,
}

impl From<&NormalizedQuery> for GetManyOptions {
    fn from(query: &NormalizedQuery) -> Self {
        Self {
            filter: query.criteria.clone(),
            limit: query.limit,
            offset: query.offset,
            hints: query.projection().map(|fields| Hints { fields }),
            sort: query.sort.clone(),
        }
    }
}

/// Options for bulk updates and removes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterOptions {
    /// Mongo-style filter criteria selecting the affected documents.
    #[serde(default)]
    pub filter: Map<String, Value>,
}

/// Outcome of a bulk operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkResult {
    /// Number of documents affected.
    pub count: u64,
}

/// Trait defining the collection store interface.
///
/// All methods are async and take the collection name first. Implementors must be safe to
/// share across tasks; the dispatcher holds the store as `Arc<dyn DataStore>` and performs
/// exactly one call per operation.
///
/// # Error Handling
///
/// - `NotFound`: no document with the requested `_id`
/// - `AlreadyExists`: an insert reused an existing `_id`
/// - `InvalidDocument`: the document or update cannot be stored
/// - `InvalidQuery`: the filter or update cannot be evaluated
/// - `Internal`: the backend failed
#[async_trait]
pub trait DataStore: Send + Sync {
    /// Inserts a document, assigning an `_id` when it has none, and returns it as stored.
    async fn insert_one(&self, collection: &str, document: Value) -> Result<Value, DataStoreError>;

    /// Fetches one document by `_id`.
    async fn get_one(&self, collection: &str, id: &str) -> Result<Value, DataStoreError>;

    /// Fetches every document matching the options.
    async fn get_many(
        &self,
        collection: &str,
        options: &GetManyOptions,
    ) -> Result<Vec<Value>, DataStoreError>;

    /// Replaces one document, keeping its `_id`, and returns the new version.
    async fn replace_one(
        &self,
        collection: &str,
        id: &str,
        document: Value,
    ) -> Result<Value, DataStoreError>;

    /// Applies an update document to one document and returns the new version.
    async fn update_one(
        &self,
        collection: &str,
        id: &str,
        update: Value,
    ) -> Result<Value, DataStoreError>;

    /// Applies an update document to every matching document.
    async fn update_many(
        &self,
        collection: &str,
        update: Value,
        options: &FilterOptions,
    ) -> Result<BulkResult, DataStoreError>;

    /// Removes one document and returns it.
    async fn remove_one(&self, collection: &str, id: &str) -> Result<Value, DataStoreError>;

    /// Removes every matching document.
    async fn remove_many(
        &self,
        collection: &str,
        options: &FilterOptions,
    ) -> Result<BulkResult, DataStoreError>;
}

/// Thread-safe in-memory implementation of the [`DataStore`] trait.
///
/// Collections come into existence on first insert. Documents keep insertion order, which
/// is also the order `get_many` returns them in when no sort is requested.
#[derive(Debug, Default)]
pub struct InMemoryDataStore {
    collections: Mutex<HashMap<String, Vec<Value>>>,
}

impl InMemoryDataStore {
    /// Creates a new empty in-memory data store.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, Vec<Value>>>, DataStoreError> {
        self.collections
            .lock()
            .map_err(|_| DataStoreError::Internal("collection lock poisoned".to_string()))
    }
}

fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn has_id(document: &Value, id: &str) -> bool {
    document
        .get(ID_FIELD)
        .and_then(id_string)
        .is_some_and(|candidate| candidate == id)
}

fn not_found(collection: &str, id: &str) -> DataStoreError {
    DataStoreError::NotFound {
        collection: collection.to_string(),
        id: id.to_string(),
    }
}

fn into_object(document: Value) -> Result<Map<String, Value>, DataStoreError> {
    match document {
        Value::Object(object) => Ok(object),
        other => Err(DataStoreError::InvalidDocument(format!(
            "documents must be JSON objects, got {}",
            crate::validate::get_value_type(&other)
        ))),
    }
}

fn position(documents: &[Value], collection: &str, id: &str) -> Result<usize, DataStoreError> {
    documents
        .iter()
        .position(|doc| has_id(doc, id))
        .ok_or_else(|| not_found(collection, id))
}

fn matching(documents: &[Value], criteria: &Map<String, Value>) -> Result<Vec<bool>, DataStoreError> {
    documents
        .iter()
        .map(|doc| filter::matches(doc, criteria))
        .collect()
}

#[async_trait]
impl DataStore for InMemoryDataStore {
    async fn insert_one(&self, collection: &str, document: Value) -> Result<Value, DataStoreError> {
        let mut object = into_object(document)?;
        let id = match object.get(ID_FIELD) {
            None => {
                let id = uuid::Uuid::new_v4().to_string();
                object.insert(ID_FIELD.to_string(), Value::from(id.clone()));
                id
            }
            Some(id) => id_string(id).ok_or_else(|| {
                DataStoreError::InvalidDocument(format!(
                    "{} must be a string or a number",
                    ID_FIELD
                ))
            })?,
        };

        let mut collections = self.lock()?;
        let documents = collections.entry(collection.to_string()).or_default();
        if documents.iter().any(|doc| has_id(doc, &id)) {
            return Err(DataStoreError::AlreadyExists {
                collection: collection.to_string(),
                id,
            });
        }
        let document = Value::Object(object);
        documents.push(document.clone());
        Ok(document)
    }

    async fn get_one(&self, collection: &str, id: &str) -> Result<Value, DataStoreError> {
        let collections = self.lock()?;
        collections
            .get(collection)
            .and_then(|documents| documents.iter().find(|doc| has_id(doc, id)))
            .cloned()
            .ok_or_else(|| not_found(collection, id))
    }

    async fn get_many(
        &self,
        collection: &str,
        options: &GetManyOptions,
    ) -> Result<Vec<Value>, DataStoreError> {
        let mut selected = {
            let collections = self.lock()?;
            let Some(documents) = collections.get(collection) else {
                return Ok(Vec::new());
            };
            let mut selected = Vec::new();
            for doc in documents {
                if filter::matches(doc, &options.filter)? {
                    selected.push(doc.clone());
                }
            }
            selected
        };

        if let Some(sort) = &options.sort {
            filter::sort_documents(&mut selected, sort);
        }
        let offset = options.offset.unwrap_or(0) as usize;
        let limit = match options.limit {
            None | Some(0) => usize::MAX,
            Some(limit) => limit as usize,
        };
        let page = selected.into_iter().skip(offset).take(limit);

        Ok(match &options.hints {
            Some(hints) => page.map(|doc| filter::project(&doc, &hints.fields)).collect(),
            None => page.collect(),
        })
    }

    async fn replace_one(
        &self,
        collection: &str,
        id: &str,
        document: Value,
    ) -> Result<Value, DataStoreError> {
        let mut replacement = into_object(document)?;
        let mut collections = self.lock()?;
        let documents = collections
            .get_mut(collection)
            .ok_or_else(|| not_found(collection, id))?;
        let index = position(documents, collection, id)?;

        if let Some(existing_id) = documents[index].get(ID_FIELD) {
            replacement.insert(ID_FIELD.to_string(), existing_id.clone());
        }
        documents[index] = Value::Object(replacement);
        Ok(documents[index].clone())
    }

    async fn update_one(
        &self,
        collection: &str,
        id: &str,
        update: Value,
    ) -> Result<Value, DataStoreError> {
        let mut collections = self.lock()?;
        let documents = collections
            .get_mut(collection)
            .ok_or_else(|| not_found(collection, id))?;
        let index = position(documents, collection, id)?;

        let mut updated = into_object(documents[index].clone())?;
        filter::apply_update(&mut updated, &update)?;
        documents[index] = Value::Object(updated);
        Ok(documents[index].clone())
    }

    async fn update_many(
        &self,
        collection: &str,
        update: Value,
        options: &FilterOptions,
    ) -> Result<BulkResult, DataStoreError> {
        let mut collections = self.lock()?;
        let Some(documents) = collections.get_mut(collection) else {
            return Ok(BulkResult::default());
        };

        let selected = matching(documents, &options.filter)?;
        let mut updates = Vec::new();
        for (index, doc) in documents.iter().enumerate() {
            if selected[index] {
                let mut updated = into_object(doc.clone())?;
                filter::apply_update(&mut updated, &update)?;
                updates.push((index, Value::Object(updated)));
            }
        }

        let count = updates.len() as u64;
        for (index, updated) in updates {
            documents[index] = updated;
        }
        Ok(BulkResult { count })
    }

    async fn remove_one(&self, collection: &str, id: &str) -> Result<Value, DataStoreError> {
        let mut collections = self.lock()?;
        let documents = collections
            .get_mut(collection)
            .ok_or_else(|| not_found(collection, id))?;
        let index = position(documents, collection, id)?;
        Ok(documents.remove(index))
    }

    async fn remove_many(
        &self,
        collection: &str,
        options: &FilterOptions,
    ) -> Result<BulkResult, DataStoreError> {
        let mut collections = self.lock()?;
        let Some(documents) = collections.get_mut(collection) else {
            return Ok(BulkResult::default());
        };

        let selected = matching(documents, &options.filter)?;
        let before = documents.len();
        let mut flags = selected.into_iter();
        documents.retain(|_| !flags.next().unwrap_or(false));
        Ok(BulkResult {
            count: (before - documents.len()) as u64,
        })
    }
}
