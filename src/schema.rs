//! # Schema Registry
//!
//! The registry holds one [`SchemaEntry`] per declared collection. A collection mapped to
//! `null` is known but unvalidated; a collection mapped to a schema is validated against
//! the compiled form of that schema. Collections that are not in the map are unknown, which
//! the policy layer treats differently from "known, no validation".
//!
//! ```rust
//! use crudlify::{SchemaMap, SchemaRegistry};
//! use serde_json::json;
//!
//! let mut map = SchemaMap::new();
//! map.insert("notes".to_string(), None);
//! map.insert(
//!     "users".to_string(),
//!     Some(json!({"type": "object", "required": ["email"]})),
//! );
//!
//! let registry = SchemaRegistry::register(&map).unwrap();
//! assert!(registry.has("notes"));
//! assert!(!registry.is_validating("notes"));
//! assert!(registry.is_validating("users"));
//! assert!(!registry.has("orders"));
//!
//! let result = registry.validate("users", &json!({}));
//! assert!(!result.ok);
//! assert_eq!(result.errors[0].path, "/email");
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::validate::{CompiledSchema, SchemaError, ValidationIssue};

/// Collection name to optional JSON schema. `None` declares a collection without validation.
pub type SchemaMap = BTreeMap<String, Option<Value>>;

/// What the registry knows about one declared collection.
#[derive(Debug, Clone)]
pub enum SchemaEntry {
    /// The collection is declared but documents are not validated.
    NoValidation,
    /// Documents must satisfy the compiled schema.
    Validating(CompiledSchema),
}

impl SchemaEntry {
    /// Returns the compiled schema, if this entry validates.
    pub fn schema(&self) -> Option<&CompiledSchema> {
        match self {
            SchemaEntry::NoValidation => None,
            SchemaEntry::Validating(schema) => Some(schema),
        }
    }
}

/// Verdict of validating a document against a collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    /// True when the document is acceptable.
    pub ok: bool,
    /// Every issue found; empty exactly when `ok` is true.
    pub errors: Vec<ValidationIssue>,
}

impl ValidationResult {
    fn ok() -> Self {
        Self {
            ok: true,
            errors: Vec::new(),
        }
    }
}

impl From<Result<(), Vec<ValidationIssue>>> for ValidationResult {
    fn from(result: Result<(), Vec<ValidationIssue>>) -> Self {
        match result {
            Ok(()) => Self::ok(),
            Err(errors) => Self { ok: false, errors },
        }
    }
}

/// Compiled validators keyed by collection name.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    entries: BTreeMap<String, SchemaEntry>,
}

impl SchemaRegistry {
    /// Compiles every schema in the map.
    ///
    /// Registration is all or nothing: if any schema fails to compile, the error names the
    /// collection and no registry is produced.
    pub fn register(map: &SchemaMap) -> Result<Self, SchemaError> {
        let mut entries = BTreeMap::new();
        for (collection, schema) in map {
            let entry = match schema {
                None => SchemaEntry::NoValidation,
                Some(schema) => SchemaEntry::Validating(
                    CompiledSchema::compile(schema.clone())
                        .map_err(|e| e.for_collection(collection))?,
                ),
            };
            entries.insert(collection.clone(), entry);
        }
        Ok(Self { entries })
    }

    /// Creates a registry with no collections, which puts the gate in open mode.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Returns true if the collection is declared, with or without a schema.
    pub fn has(&self, collection: &str) -> bool {
        self.entries.contains_key(collection)
    }

    /// Returns true if the collection is declared with a schema.
    pub fn is_validating(&self, collection: &str) -> bool {
        matches!(self.entries.get(collection), Some(SchemaEntry::Validating(_)))
    }

    /// Returns the entry for a declared collection.
    pub fn entry(&self, collection: &str) -> Option<&SchemaEntry> {
        self.entries.get(collection)
    }

    /// Validates a document for a collection.
    ///
    /// Only validating collections can fail; unknown and unvalidated collections always
    /// produce an `ok` result.
    pub fn validate(&self, collection: &str, document: &Value) -> ValidationResult {
        match self.entries.get(collection) {
            Some(SchemaEntry::Validating(schema)) => schema.validate(document).into(),
            _ => ValidationResult::ok(),
        }
    }

    /// Returns true if no collection is declared.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of declared collections.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Declared collection names in sorted order.
    pub fn collections(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }
}
