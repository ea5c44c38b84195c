//! # Operation Dispatcher
//!
//! The eight CRUD operations. Each one snapshots the configuration and the store handle
//! once, consults the policy gate where the operation is gated, translates the query string
//! where the operation takes one, makes exactly one store call and shapes the result.
//!
//! | Operation | Gate | Store call |
//! |-----------|------|------------|
//! | [`create`](OperationDispatcher::create) | write | `insert_one` |
//! | [`read_one`](OperationDispatcher::read_one) | read | `get_one` |
//! | [`read_many`](OperationDispatcher::read_many) | read | `get_many` |
//! | [`replace`](OperationDispatcher::replace) | none | `replace_one` |
//! | [`patch_one`](OperationDispatcher::patch_one) | none | `update_one` |
//! | [`patch_many`](OperationDispatcher::patch_many) | read | `update_many` |
//! | [`delete_one`](OperationDispatcher::delete_one) | none | `remove_one` |
//! | [`delete_many`](OperationDispatcher::delete_many) | read | `remove_many` |
//!
//! Configuration and store live behind `RwLock<Arc<_>>`. Reconfiguring or swapping the store
//! replaces the whole `Arc`, so an operation in flight keeps the snapshot it started with.

use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::{CrudConfig, CrudOptions};
use crate::data_store::{BulkResult, DataStore, FilterOptions, GetManyOptions};
use crate::errors::{CrudError, DataStoreError};
use crate::policy::{PolicyError, PolicyGate};
use crate::query::translate;
use crate::schema::SchemaMap;
use crate::validate::SchemaError;

/// Response body of [`OperationDispatcher::read_many`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    /// The documents returned by the store.
    pub data: Vec<Value>,
    /// Number of documents in `data`.
    pub count: usize,
    /// The limit that was requested, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    /// The offset that was requested, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<u64>,
}

/// Routes CRUD operations through the policy gate to the store.
pub struct OperationDispatcher {
    config: RwLock<Arc<CrudConfig>>,
    store: RwLock<Arc<dyn DataStore>>,
}

impl OperationDispatcher {
    /// Compiles the schema map and creates a dispatcher over the store.
    pub fn new(
        store: Arc<dyn DataStore>,
        schema: &SchemaMap,
        options: CrudOptions,
    ) -> Result<Self, SchemaError> {
        Ok(Self::with_config(store, CrudConfig::new(schema, options)?))
    }

    /// Creates a dispatcher from an already compiled configuration.
    pub fn with_config(store: Arc<dyn DataStore>, config: CrudConfig) -> Self {
        info!(
            collections = config.registry.len(),
            strict = config.options.strict,
            "crud dispatcher configured"
        );
        Self {
            config: RwLock::new(Arc::new(config)),
            store: RwLock::new(store),
        }
    }

    /// The configuration snapshot new operations will use.
    pub fn config(&self) -> Arc<CrudConfig> {
        Arc::clone(&self.config.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// The store new operations will use.
    pub fn store(&self) -> Arc<dyn DataStore> {
        Arc::clone(&self.store.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Atomically replaces the whole configuration.
    pub fn reconfigure(&self, config: CrudConfig) {
        info!(
            collections = config.registry.len(),
            strict = config.options.strict,
            "crud dispatcher reconfigured"
        );
        *self.config.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(config);
    }

    /// Atomically swaps the store handle.
    pub fn replace_store(&self, store: Arc<dyn DataStore>) {
        info!("crud datastore replaced");
        *self.store.write().unwrap_or_else(PoisonError::into_inner) = store;
    }

    fn snapshot(&self) -> (Arc<CrudConfig>, Arc<dyn DataStore>) {
        (self.config(), self.store())
    }

    fn admit_read(config: &CrudConfig, collection: &str) -> Result<(), CrudError> {
        PolicyGate::new(config)
            .admit_read(collection)
            .map(|_| ())
            .map_err(|e| {
                warn!(collection, "rejected access to unknown collection");
                match e {
                    PolicyError::UnknownCollection(name) => CrudError::CollectionNotFound(name),
                    PolicyError::ValidationFailed(issues) => CrudError::Validation(issues),
                }
            })
    }

    /// Validates and inserts a document.
    pub async fn create(&self, collection: &str, mut document: Value) -> Result<Value, CrudError> {
        let (config, store) = self.snapshot();
        PolicyGate::new(&config)
            .admit_write(collection, &mut document)
            .map_err(|e| match e {
                PolicyError::UnknownCollection(name) => {
                    warn!(collection, "create rejected: collection not found");
                    CrudError::UnknownCollection(name)
                }
                PolicyError::ValidationFailed(issues) => {
                    warn!(collection, issues = issues.len(), "create rejected: validation failed");
                    CrudError::Validation(issues)
                }
            })?;

        let inserted = store
            .insert_one(collection, document)
            .await
            .map_err(|e| store_failure(collection, None, e))?;
        debug!(collection, "document created");
        Ok(inserted)
    }

    /// Fetches one document by id.
    pub async fn read_one(&self, collection: &str, id: &str) -> Result<Value, CrudError> {
        let (config, store) = self.snapshot();
        Self::admit_read(&config, collection)?;
        store
            .get_one(collection, id)
            .await
            .map_err(|e| store_failure(collection, Some(id), e))
    }

    /// Lists documents matching the query string.
    pub async fn read_many(&self, collection: &str, raw_query: &str) -> Result<Page, CrudError> {
        let (config, store) = self.snapshot();
        Self::admit_read(&config, collection)?;

        let query = translate(raw_query);
        let options = GetManyOptions::from(&query);
        debug!(collection, options = ?options, "reading documents");

        let data = store
            .get_many(collection, &options)
            .await
            .map_err(|e| store_failure(collection, None, e))?;
        Ok(Page {
            count: data.len(),
            data,
            limit: query.limit,
            offset: query.offset,
        })
    }

    /// Replaces one document. Not gated.
    pub async fn replace(
        &self,
        collection: &str,
        id: &str,
        document: Value,
    ) -> Result<Value, CrudError> {
        let store = self.store();
        store
            .replace_one(collection, id, document)
            .await
            .map_err(|e| store_failure(collection, Some(id), e))
    }

    /// Applies an update to one document. Not gated.
    pub async fn patch_one(
        &self,
        collection: &str,
        id: &str,
        update: Value,
    ) -> Result<Value, CrudError> {
        let store = self.store();
        store
            .update_one(collection, id, update)
            .await
            .map_err(|e| store_failure(collection, Some(id), e))
    }

    /// Applies an update to every document matching the query string.
    pub async fn patch_many(
        &self,
        collection: &str,
        raw_query: &str,
        update: Value,
    ) -> Result<BulkResult, CrudError> {
        let (config, store) = self.snapshot();
        Self::admit_read(&config, collection)?;
        let options = FilterOptions {
            filter: translate(raw_query).criteria,
        };
        let result = store
            .update_many(collection, update, &options)
            .await
            .map_err(|e| store_failure(collection, None, e))?;
        debug!(collection, count = result.count, "documents patched");
        Ok(result)
    }

    /// Removes one document. Not gated.
    pub async fn delete_one(&self, collection: &str, id: &str) -> Result<Value, CrudError> {
        let store = self.store();
        store
            .remove_one(collection, id)
            .await
            .map_err(|e| store_failure(collection, Some(id), e))
    }

    /// Removes every document matching the query string.
    pub async fn delete_many(
        &self,
        collection: &str,
        raw_query: &str,
    ) -> Result<BulkResult, CrudError> {
        let (config, store) = self.snapshot();
        Self::admit_read(&config, collection)?;
        let options = FilterOptions {
            filter: translate(raw_query).criteria,
        };
        let result = store
            .remove_many(collection, &options)
            .await
            .map_err(|e| store_failure(collection, None, e))?;
        debug!(collection, count = result.count, "documents deleted");
        Ok(result)
    }
}

fn store_failure(collection: &str, id: Option<&str>, error: DataStoreError) -> CrudError {
    warn!(collection, id, error = %error, "store operation failed");
    CrudError::Store(error)
}
