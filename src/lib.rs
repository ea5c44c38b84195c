//! # Crudlify: Schema-Validated REST CRUD over Collections
//!
//! Crudlify mounts a generic Create/Read/Update/Delete API over a collection-oriented data
//! store. Every collection gets the same eight operations; an optional per-collection JSON
//! schema decides which documents may be created, and the query string of list and bulk
//! requests is translated into Mongo-style filter criteria.
//!
//! - **Schema Registry**: compiles the schema map once; `null` entries declare collections
//!   that are known but unvalidated
//! - **Query Translation**: `age>18&tag=a,b&sort=-age&limit=10` becomes criteria, sort and
//!   paging options
//! - **Policy Gate**: rejects unknown collections and invalid documents; an empty schema map
//!   admits everything unless strict mode is on
//! - **Operation Dispatch**: one store call per request, errors mapped to 400 and 404
//!   responses
//! - **Pluggable Storage**: any [`DataStore`] implementation; [`InMemoryDataStore`] ships
//!   with the crate
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │ HTTP API Layer (Axum routes)            │
//! ├─────────────────────────────────────────┤
//! │ Operation Dispatcher                    │
//! ├───────────────────┬─────────────────────┤
//! │ Policy Gate       │ Query Translator    │
//! ├───────────────────┤                     │
//! │ Schema Registry   │                     │
//! ├───────────────────┴─────────────────────┤
//! │ Data Store (Trait-based abstraction)    │
//! └─────────────────────────────────────────┘
//! ```
//!
//! ## Usage Examples
//!
//! ### Mounting the API
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use axum::Router;
//! use crudlify::{CrudOptions, InMemoryDataStore, OperationDispatcher, SchemaMap, crudlify};
//! use serde_json::json;
//!
//! let mut schema = SchemaMap::new();
//! schema.insert(
//!     "users".to_string(),
//!     Some(json!({"type": "object", "required": ["email"]})),
//! );
//! schema.insert("notes".to_string(), None);
//!
//! let dispatcher = OperationDispatcher::new(
//!     Arc::new(InMemoryDataStore::new()),
//!     &schema,
//!     CrudOptions::default(),
//! )
//! .unwrap();
//!
//! let app: Router = Router::new().nest("/api", crudlify(Router::new(), Arc::new(dispatcher)));
//! ```
//!
//! ### Dispatching Without HTTP
//!
//! ```rust
//! # use std::sync::Arc;
//! # use crudlify::{CrudError, CrudOptions, InMemoryDataStore, OperationDispatcher, SchemaMap};
//! # use serde_json::json;
//! # #[tokio::main]
//! # async fn main() {
//! let dispatcher = OperationDispatcher::new(
//!     Arc::new(InMemoryDataStore::new()),
//!     &SchemaMap::new(),
//!     CrudOptions::default(),
//! )
//! .unwrap();
//!
//! dispatcher.create("books", json!({"title": "Dune", "year": 1965})).await.unwrap();
//! dispatcher.create("books", json!({"title": "Emma", "year": 1815})).await.unwrap();
//!
//! let page = dispatcher.read_many("books", "year>1900&fields=title").await.unwrap();
//! assert_eq!(page.count, 1);
//! assert_eq!(page.data[0]["title"], "Dune");
//! # }
//! ```

#![warn(missing_docs)]
mod config;
mod data_store;
mod dispatcher;
mod errors;
mod policy;
mod router;
mod schema;
mod test_utils;
mod validate;

/// Command-line interface utilities for program termination.
pub mod cli_utils;

/// Mongo-style criteria evaluation, projection, sort and update operators.
pub mod filter;

/// Query string translation into filter criteria and read options.
pub mod query;

pub use config::{ConfigError, ConfigFile, CrudConfig, CrudOptions};
pub use data_store::{BulkResult, DataStore, FilterOptions, GetManyOptions, Hints, InMemoryDataStore};
pub use dispatcher::{OperationDispatcher, Page};
pub use errors::{CrudError, DataStoreError, ErrorResponse};
pub use policy::{Decision, PolicyError, PolicyGate};
pub use query::{NormalizedQuery, SortDirection, SortKey, translate};
pub use router::{BY_QUERY, create_crud_router, crudlify};
pub use schema::{SchemaEntry, SchemaMap, SchemaRegistry, ValidationResult};
pub use validate::{CompiledSchema, SchemaError, ValidationIssue};
