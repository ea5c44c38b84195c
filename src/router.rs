//! HTTP routes for the CRUD operations.
//!
//! ```text
//! POST   /:collection                create
//! GET    /:collection                read_many (query string filters)
//! GET    /:collection/:id            read_one
//! PUT    /:collection/:id            replace
//! PATCH  /:collection/:id            patch_one
//! DELETE /:collection/:id            delete_one
//! PATCH  /:collection/_byquery       patch_many (query string filters)
//! DELETE /:collection/_byquery       delete_many (query string filters)
//! ```

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, RawQuery, State},
    response::{IntoResponse, Response},
    routing::get,
};
use serde_json::Value;

use crate::dispatcher::{OperationDispatcher, Page};
use crate::errors::CrudError;

/// Path segment that turns a PATCH or DELETE on a document into a bulk operation.
pub const BY_QUERY: &str = "_byquery";

type Dispatcher = State<Arc<OperationDispatcher>>;

////////////////////////////////////////////// Routes //////////////////////////////////////////////////

async fn create_document(
    State(dispatcher): Dispatcher,
    Path(collection): Path<String>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, CrudError> {
    Ok(Json(dispatcher.create(&collection, body).await?))
}

async fn get_documents(
    State(dispatcher): Dispatcher,
    Path(collection): Path<String>,
    RawQuery(query): RawQuery,
) -> Result<Json<Page>, CrudError> {
    let query = query.unwrap_or_default();
    Ok(Json(dispatcher.read_many(&collection, &query).await?))
}

async fn get_document(
    State(dispatcher): Dispatcher,
    Path((collection, id)): Path<(String, String)>,
) -> Result<Json<Value>, CrudError> {
    Ok(Json(dispatcher.read_one(&collection, &id).await?))
}

async fn replace_document(
    State(dispatcher): Dispatcher,
    Path((collection, id)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, CrudError> {
    Ok(Json(dispatcher.replace(&collection, &id, body).await?))
}

async fn patch_document(
    State(dispatcher): Dispatcher,
    Path((collection, id)): Path<(String, String)>,
    RawQuery(query): RawQuery,
    Json(body): Json<Value>,
) -> Result<Response, CrudError> {
    if id == BY_QUERY {
        let query = query.unwrap_or_default();
        let result = dispatcher.patch_many(&collection, &query, body).await?;
        Ok(Json(result).into_response())
    } else {
        let updated = dispatcher.patch_one(&collection, &id, body).await?;
        Ok(Json(updated).into_response())
    }
}

async fn delete_document(
    State(dispatcher): Dispatcher,
    Path((collection, id)): Path<(String, String)>,
    RawQuery(query): RawQuery,
) -> Result<Response, CrudError> {
    if id == BY_QUERY {
        let query = query.unwrap_or_default();
        let result = dispatcher.delete_many(&collection, &query).await?;
        Ok(Json(result).into_response())
    } else {
        let removed = dispatcher.delete_one(&collection, &id).await?;
        Ok(Json(removed).into_response())
    }
}

////////////////////////////////////////////// Router //////////////////////////////////////////////////

/// Creates a router serving the CRUD routes for every collection.
pub fn create_crud_router(dispatcher: Arc<OperationDispatcher>) -> Router {
    Router::new()
        .route("/:collection", get(get_documents).post(create_document))
        .route(
            "/:collection/:id",
            get(get_document)
                .put(replace_document)
                .patch(patch_document)
                .delete(delete_document),
        )
        .with_state(dispatcher)
}

/// Mounts the CRUD routes on an application router.
///
/// ```rust
/// use std::sync::Arc;
///
/// use axum::{Router, routing::get};
/// use crudlify::{CrudOptions, InMemoryDataStore, OperationDispatcher, SchemaMap, crudlify};
///
/// let dispatcher = OperationDispatcher::new(
///     Arc::new(InMemoryDataStore::new()),
///     &SchemaMap::new(),
///     CrudOptions::default(),
/// )
/// .unwrap();
/// let app = Router::new().route("/health", get(|| async { "ok" }));
/// let app = crudlify(app, Arc::new(dispatcher));
/// ```
pub fn crudlify(router: Router, dispatcher: Arc<OperationDispatcher>) -> Router {
    router.merge(create_crud_router(dispatcher))
}
