//! # Policy Gate
//!
//! Decides, per collection and per operation kind, whether a request may reach the store.
//!
//! | Collection state | Read gate | Write gate |
//! |------------------|-----------|------------|
//! | declared with a schema | allow | validate, reject with the issue list |
//! | declared as `null` | allow | allow without validation |
//! | undeclared, map non-empty | reject | reject |
//! | undeclared, map empty | allow (open mode) | allow (open mode) |
//! | undeclared, strict mode | reject | reject |
//!
//! Single-document replace, patch and delete are not gated at all; the dispatcher simply
//! never consults the gate for them.

use serde_json::Value;
use tracing::debug;

use crate::config::CrudConfig;
use crate::validate::{CompiledSchema, ValidationIssue};

/// Why the gate refused an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyError {
    /// The collection is not declared and the configuration does not allow that.
    UnknownCollection(String),
    /// The document does not satisfy the collection's schema.
    ValidationFailed(Vec<ValidationIssue>),
}

/// How an admitted collection is governed.
#[derive(Debug, Clone, Copy)]
pub enum Decision<'a> {
    /// No schema map is configured; every collection is accepted.
    Open,
    /// The collection is declared without a schema.
    Unvalidated,
    /// The collection is declared with a schema.
    Validating(&'a CompiledSchema),
}

/// Per-request admission checks against one configuration snapshot.
pub struct PolicyGate<'a> {
    config: &'a CrudConfig,
}

impl<'a> PolicyGate<'a> {
    /// Creates a gate over a configuration snapshot.
    pub fn new(config: &'a CrudConfig) -> Self {
        Self { config }
    }

    fn classify(&self, collection: &str) -> Result<Decision<'a>, PolicyError> {
        let registry = &self.config.registry;
        match registry.entry(collection) {
            Some(entry) => Ok(match entry.schema() {
                Some(schema) => Decision::Validating(schema),
                None => Decision::Unvalidated,
            }),
            None if registry.is_empty() && !self.config.options.strict => Ok(Decision::Open),
            None => Err(PolicyError::UnknownCollection(collection.to_string())),
        }
    }

    /// Admits a read or bulk operation. Only the unknown collection check applies.
    pub fn admit_read(&self, collection: &str) -> Result<Decision<'a>, PolicyError> {
        let decision = self.classify(collection);
        debug!(collection, admitted = decision.is_ok(), "read gate");
        decision
    }

    /// Admits a create.
    ///
    /// For validating collections, schema defaults are filled into `document` first when the
    /// configuration asks for it, and the result is validated. The caller stores the document
    /// as left by this call.
    pub fn admit_write(
        &self,
        collection: &str,
        document: &mut Value,
    ) -> Result<Decision<'a>, PolicyError> {
        let decision = self.classify(collection)?;
        if let Decision::Validating(schema) = decision {
            if self.config.options.use_defaults {
                schema.apply_defaults(document);
            }
            schema
                .validate(document)
                .map_err(PolicyError::ValidationFailed)?;
        }
        debug!(collection, "write gate admitted document");
        Ok(decision)
    }
}
