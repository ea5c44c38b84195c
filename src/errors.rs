//! Error types for crudlify operations.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

use crate::validate::ValidationIssue;

/// Errors that can occur during data store operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DataStoreError {
    /// No document with the given id exists in the collection.
    #[error("document {id} not found in collection {collection}")]
    NotFound {
        /// Collection that was searched.
        collection: String,
        /// The missing `_id`.
        id: String,
    },
    /// A document with the same `_id` already exists.
    #[error("document {id} already exists in collection {collection}")]
    AlreadyExists {
        /// Collection that holds the document.
        collection: String,
        /// The duplicate `_id`.
        id: String,
    },
    /// The document cannot be stored, for example because it is not a JSON object.
    #[error("invalid document: {0}")]
    InvalidDocument(String),
    /// The filter or update cannot be evaluated.
    #[error("invalid query: {0}")]
    InvalidQuery(String),
    /// An internal storage system error occurred.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Errors surfaced by the operation dispatcher.
///
/// Each variant maps to one HTTP status and body shape; see [`CrudError::status_code`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CrudError {
    /// A create targeted a collection the configuration does not allow.
    #[error("Collection not found {0}")]
    UnknownCollection(String),
    /// A read or bulk operation targeted a collection the configuration does not allow.
    #[error("No collection {0}")]
    CollectionNotFound(String),
    /// The document failed schema validation.
    #[error("document failed validation with {} issue(s)", .0.len())]
    Validation(Vec<ValidationIssue>),
    /// The store reported a failure.
    #[error("{0}")]
    Store(#[from] DataStoreError),
}

impl CrudError {
    /// HTTP status for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            CrudError::UnknownCollection(_) => StatusCode::BAD_REQUEST,
            CrudError::Validation(_) => StatusCode::BAD_REQUEST,
            CrudError::CollectionNotFound(_) => StatusCode::NOT_FOUND,
            CrudError::Store(_) => StatusCode::NOT_FOUND,
        }
    }
}

/// Body of every non-validation error response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Human readable error message.
    pub error: String,
}

impl IntoResponse for CrudError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        match self {
            CrudError::Validation(issues) => (status, Json(issues)).into_response(),
            other => {
                let body = ErrorResponse {
                    error: other.to_string(),
                };
                (status, Json(body)).into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes() {
        assert_eq!(
            CrudError::UnknownCollection("orders".to_string()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            CrudError::CollectionNotFound("orders".to_string()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(CrudError::Validation(vec![]).status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            CrudError::from(DataStoreError::Internal("boom".to_string())).status_code(),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn messages() {
        assert_eq!(
            CrudError::UnknownCollection("orders".to_string()).to_string(),
            "Collection not found orders"
        );
        assert_eq!(
            CrudError::CollectionNotFound("orders".to_string()).to_string(),
            "No collection orders"
        );
        let err = CrudError::from(DataStoreError::NotFound {
            collection: "users".to_string(),
            id: "42".to_string(),
        });
        assert_eq!(err.to_string(), "document 42 not found in collection users");
    }

    #[test]
    fn into_response_status() {
        let response = CrudError::CollectionNotFound("x".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let response = CrudError::Validation(vec![]).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
