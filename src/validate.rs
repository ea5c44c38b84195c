//! # JSON Schema Validation
//!
//! This module compiles JSON schemas and validates documents against them. A
//! [`CompiledSchema`] is checked for structural correctness once, when it is
//! compiled, so that request handling never has to deal with a malformed schema.
//!
//! ## Key Features
//!
//! - **Type Support**: null, boolean, integer, number, string, array and object, alone or as
//!   a list of alternatives
//! - **Structural Keywords**: `properties`, `required`, `additionalProperties`, `items`
//!   (single schema or tuple form)
//! - **Value Keywords**: `enum`, `const`, string length and `pattern`, numeric bounds,
//!   `multipleOf`, item and property counts, `uniqueItems`
//! - **Combinators**: `oneOf`, `anyOf`, `allOf` and `not`
//! - **Complete Reports**: every failing keyword is reported, in document order, with a JSON
//!   pointer to the offending value
//! - **Defaults**: `default` values under `properties` can be filled into a document
//!
//! ## Usage Examples
//!
//! ```rust
//! use crudlify::CompiledSchema;
//! use serde_json::json;
//!
//! let schema = CompiledSchema::compile(json!({
//!     "type": "object",
//!     "properties": {
//!         "name": {"type": "string"},
//!         "age": {"type": "integer", "minimum": 0}
//!     },
//!     "required": ["name"]
//! }))
//! .unwrap();
//!
//! assert!(schema.validate(&json!({"name": "Alice", "age": 30})).is_ok());
//!
//! let issues = schema.validate(&json!({"age": -1})).unwrap_err();
//! assert_eq!(issues.len(), 2);
//! assert_eq!(issues[0].path, "/name");
//! assert_eq!(issues[1].path, "/age");
//! ```

use std::collections::HashMap;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub(crate) const TYPE_KEY: &str = "type";
pub(crate) const ENUM_KEY: &str = "enum";
pub(crate) const CONST_KEY: &str = "const";
pub(crate) const PROPERTIES_KEY: &str = "properties";
pub(crate) const REQUIRED_KEY: &str = "required";
pub(crate) const ADDITIONAL_PROPERTIES_KEY: &str = "additionalProperties";
pub(crate) const ITEMS_KEY: &str = "items";
pub(crate) const ONE_OF_KEY: &str = "oneOf";
pub(crate) const ANY_OF_KEY: &str = "anyOf";
pub(crate) const ALL_OF_KEY: &str = "allOf";
pub(crate) const NOT_KEY: &str = "not";
pub(crate) const PATTERN_KEY: &str = "pattern";
pub(crate) const DEFAULT_KEY: &str = "default";

pub(crate) const TYPE_NULL: &str = "null";
pub(crate) const TYPE_BOOLEAN: &str = "boolean";
pub(crate) const TYPE_INTEGER: &str = "integer";
pub(crate) const TYPE_NUMBER: &str = "number";
pub(crate) const TYPE_STRING: &str = "string";
pub(crate) const TYPE_ARRAY: &str = "array";
pub(crate) const TYPE_OBJECT: &str = "object";

const KNOWN_TYPES: &[&str] = &[
    TYPE_NULL,
    TYPE_BOOLEAN,
    TYPE_INTEGER,
    TYPE_NUMBER,
    TYPE_STRING,
    TYPE_ARRAY,
    TYPE_OBJECT,
];

const COUNT_KEYWORDS: &[&str] = &[
    "minLength",
    "maxLength",
    "minItems",
    "maxItems",
    "minProperties",
    "maxProperties",
];

const BOUND_KEYWORDS: &[&str] = &["minimum", "maximum", "exclusiveMinimum", "exclusiveMaximum"];

/// One reason a document failed validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    /// JSON pointer to the offending value; `""` is the document root.
    pub path: String,
    /// The schema keyword that failed.
    pub keyword: String,
    /// Human readable description of the failure.
    pub message: String,
}

impl ValidationIssue {
    fn new(path: &str, keyword: &str, message: impl Into<String>) -> Self {
        Self {
            path: path.to_string(),
            keyword: keyword.to_string(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{}: {}", self.path, self.message)
        }
    }
}

/// Errors raised while compiling a schema.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    /// The schema, or one of its subschemas, is malformed.
    #[error("invalid schema at {path}: {message}")]
    InvalidSchema {
        /// Location of the malformed subschema, as a `#`-rooted pointer.
        path: String,
        /// What is wrong with it.
        message: String,
    },
    /// A `pattern` keyword does not hold a valid regular expression.
    #[error("invalid pattern {pattern:?} at {path}: {message}")]
    InvalidPattern {
        /// Location of the subschema holding the pattern.
        path: String,
        /// The pattern as written.
        pattern: String,
        /// The regex compiler's complaint.
        message: String,
    },
    /// The schema registered for a collection failed to compile.
    #[error("schema for collection {collection:?} does not compile: {source}")]
    Collection {
        /// The collection whose schema was rejected.
        collection: String,
        /// The underlying compile error.
        #[source]
        source: Box<SchemaError>,
    },
}

impl SchemaError {
    fn invalid(path: &str, message: impl Into<String>) -> Self {
        SchemaError::InvalidSchema {
            path: path.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn for_collection(self, collection: &str) -> Self {
        SchemaError::Collection {
            collection: collection.to_string(),
            source: Box::new(self),
        }
    }
}

/////////////////////////////////////////// CompiledSchema ////////////////////////////////////////////

/// A JSON schema that has been checked and is ready to validate documents.
///
/// Compilation verifies the shape of every keyword and compiles each `pattern` once, so
/// [`CompiledSchema::validate`] is infallible with respect to the schema itself. Validation
/// is a pure function of the schema and the document: the verdict and the list of issues
/// come back together and nothing is retained between calls, so one compiled schema can be
/// shared across concurrent requests.
#[derive(Debug, Clone)]
pub struct CompiledSchema {
    schema: Value,
    patterns: HashMap<String, Regex>,
}

impl CompiledSchema {
    /// Compiles a schema, rejecting it if any keyword is malformed.
    ///
    /// # Examples
    /// ```rust
    /// use crudlify::CompiledSchema;
    /// use serde_json::json;
    ///
    /// assert!(CompiledSchema::compile(json!({"type": "string"})).is_ok());
    /// assert!(CompiledSchema::compile(json!({"type": "text"})).is_err());
    /// assert!(CompiledSchema::compile(json!({"pattern": "("})).is_err());
    /// ```
    pub fn compile(schema: Value) -> Result<Self, SchemaError> {
        let mut patterns = HashMap::new();
        check_schema(&schema, "#", &mut patterns)?;
        Ok(Self { schema, patterns })
    }

    /// Returns the schema this validator was compiled from.
    pub fn as_value(&self) -> &Value {
        &self.schema
    }

    /// Validates a document, returning every issue found.
    ///
    /// The returned list is never empty on failure and is ordered by where the issues were
    /// encountered while walking the document.
    pub fn validate(&self, document: &Value) -> Result<(), Vec<ValidationIssue>> {
        let mut walker = Walker {
            patterns: &self.patterns,
            issues: Vec::new(),
        };
        walker.validate_value(document, &self.schema, "");
        if walker.issues.is_empty() {
            Ok(())
        } else {
            Err(walker.issues)
        }
    }

    /// Returns true if the document satisfies the schema.
    pub fn is_valid(&self, document: &Value) -> bool {
        self.validate(document).is_ok()
    }

    /// Fills `default` values declared under `properties` into missing object members.
    ///
    /// Defaults are applied recursively into nested objects and array items, and never
    /// overwrite a value that is already present.
    ///
    /// ```rust
    /// use crudlify::CompiledSchema;
    /// use serde_json::json;
    ///
    /// let schema = CompiledSchema::compile(json!({
    ///     "type": "object",
    ///     "properties": {"active": {"type": "boolean", "default": true}}
    /// }))
    /// .unwrap();
    ///
    /// let mut document = json!({"name": "x"});
    /// schema.apply_defaults(&mut document);
    /// assert_eq!(document, json!({"name": "x", "active": true}));
    /// ```
    pub fn apply_defaults(&self, document: &mut Value) {
        apply_defaults(&self.schema, document);
    }
}

fn apply_defaults(schema: &Value, document: &mut Value) {
    let Some(schema_obj) = schema.as_object() else {
        return;
    };

    match document {
        Value::Object(object) => {
            if let Some(Value::Object(properties)) = schema_obj.get(PROPERTIES_KEY) {
                for (name, prop_schema) in properties {
                    if !object.contains_key(name) {
                        if let Some(default) = prop_schema.get(DEFAULT_KEY) {
                            object.insert(name.clone(), default.clone());
                        }
                    }
                    if let Some(child) = object.get_mut(name) {
                        apply_defaults(prop_schema, child);
                    }
                }
            }
        }
        Value::Array(items) => match schema_obj.get(ITEMS_KEY) {
            Some(Value::Array(item_schemas)) => {
                for (item, item_schema) in items.iter_mut().zip(item_schemas) {
                    apply_defaults(item_schema, item);
                }
            }
            Some(item_schema) => {
                for item in items.iter_mut() {
                    apply_defaults(item_schema, item);
                }
            }
            None => {}
        },
        _ => {}
    }

    if let Some(Value::Array(all_of)) = schema_obj.get(ALL_OF_KEY) {
        for sub_schema in all_of {
            apply_defaults(sub_schema, document);
        }
    }
}

///////////////////////////////////////// Schema Structure ////////////////////////////////////////////

fn check_schema(
    schema: &Value,
    path: &str,
    patterns: &mut HashMap<String, Regex>,
) -> Result<(), SchemaError> {
    let schema_obj = match schema {
        Value::Bool(_) => return Ok(()),
        Value::Object(obj) => obj,
        _ => {
            return Err(SchemaError::invalid(
                path,
                "schema must be an object or a boolean",
            ));
        }
    };

    if let Some(schema_type) = schema_obj.get(TYPE_KEY) {
        check_type_keyword(schema_type, path)?;
    }

    if let Some(enum_values) = schema_obj.get(ENUM_KEY) {
        if !enum_values.is_array() {
            return Err(SchemaError::invalid(path, "enum must be an array"));
        }
    }

    if let Some(properties) = schema_obj.get(PROPERTIES_KEY) {
        let properties = properties
            .as_object()
            .ok_or_else(|| SchemaError::invalid(path, "properties must be an object"))?;
        for (prop_name, prop_schema) in properties {
            check_schema(
                prop_schema,
                &format!("{}/properties/{}", path, escape_pointer(prop_name)),
                patterns,
            )?;
        }
    }

    if let Some(required) = schema_obj.get(REQUIRED_KEY) {
        let all_strings = required
            .as_array()
            .map(|names| names.iter().all(Value::is_string))
            .unwrap_or(false);
        if !all_strings {
            return Err(SchemaError::invalid(
                path,
                "required must be an array of strings",
            ));
        }
    }

    if let Some(additional) = schema_obj.get(ADDITIONAL_PROPERTIES_KEY) {
        check_schema(
            additional,
            &format!("{}/{}", path, ADDITIONAL_PROPERTIES_KEY),
            patterns,
        )?;
    }

    match schema_obj.get(ITEMS_KEY) {
        Some(Value::Array(item_schemas)) => {
            for (index, item_schema) in item_schemas.iter().enumerate() {
                check_schema(item_schema, &format!("{}/items/{}", path, index), patterns)?;
            }
        }
        Some(item_schema) => {
            check_schema(item_schema, &format!("{}/items", path), patterns)?;
        }
        None => {}
    }

    for keyword in [ONE_OF_KEY, ANY_OF_KEY, ALL_OF_KEY] {
        if let Some(sub_schemas) = schema_obj.get(keyword) {
            let sub_schemas = sub_schemas
                .as_array()
                .filter(|schemas| !schemas.is_empty())
                .ok_or_else(|| {
                    SchemaError::invalid(path, format!("{} must be a non-empty array", keyword))
                })?;
            for (index, sub_schema) in sub_schemas.iter().enumerate() {
                check_schema(
                    sub_schema,
                    &format!("{}/{}/{}", path, keyword, index),
                    patterns,
                )?;
            }
        }
    }

    if let Some(not_schema) = schema_obj.get(NOT_KEY) {
        check_schema(not_schema, &format!("{}/not", path), patterns)?;
    }

    for keyword in COUNT_KEYWORDS {
        if let Some(count) = schema_obj.get(*keyword) {
            if count.as_u64().is_none() {
                return Err(SchemaError::invalid(
                    path,
                    format!("{} must be a non-negative integer", keyword),
                ));
            }
        }
    }

    for keyword in BOUND_KEYWORDS {
        if let Some(bound) = schema_obj.get(*keyword) {
            if !bound.is_number() {
                return Err(SchemaError::invalid(
                    path,
                    format!("{} must be a number", keyword),
                ));
            }
        }
    }

    if let Some(multiple_of) = schema_obj.get("multipleOf") {
        if !multiple_of.as_f64().is_some_and(|m| m > 0.0) {
            return Err(SchemaError::invalid(
                path,
                "multipleOf must be a number greater than 0",
            ));
        }
    }

    if let Some(unique) = schema_obj.get("uniqueItems") {
        if !unique.is_boolean() {
            return Err(SchemaError::invalid(path, "uniqueItems must be a boolean"));
        }
    }

    if let Some(pattern) = schema_obj.get(PATTERN_KEY) {
        let pattern = pattern
            .as_str()
            .ok_or_else(|| SchemaError::invalid(path, "pattern must be a string"))?;
        if !patterns.contains_key(pattern) {
            let regex = Regex::new(pattern).map_err(|e| SchemaError::InvalidPattern {
                path: path.to_string(),
                pattern: pattern.to_string(),
                message: e.to_string(),
            })?;
            patterns.insert(pattern.to_string(), regex);
        }
    }

    Ok(())
}

fn check_type_keyword(schema_type: &Value, path: &str) -> Result<(), SchemaError> {
    let check_name = |name: &Value| match name.as_str() {
        Some(name) if KNOWN_TYPES.contains(&name) => Ok(()),
        Some(name) => Err(SchemaError::invalid(
            path,
            format!("unknown schema type: {}", name),
        )),
        None => Err(SchemaError::invalid(path, "type names must be strings")),
    };

    match schema_type {
        Value::Array(names) if !names.is_empty() => names.iter().try_for_each(check_name),
        Value::Array(_) => Err(SchemaError::invalid(path, "type list must not be empty")),
        name => check_name(name),
    }
}

///////////////////////////////////////////// Validation //////////////////////////////////////////////

struct Walker<'a> {
    patterns: &'a HashMap<String, Regex>,
    issues: Vec<ValidationIssue>,
}

impl Walker<'_> {
    fn push(&mut self, path: &str, keyword: &str, message: impl Into<String>) {
        self.issues.push(ValidationIssue::new(path, keyword, message));
    }

    fn passes(&self, value: &Value, schema: &Value) -> bool {
        let mut trial = Walker {
            patterns: self.patterns,
            issues: Vec::new(),
        };
        trial.validate_value(value, schema, "");
        trial.issues.is_empty()
    }

    fn validate_value(&mut self, value: &Value, schema: &Value, path: &str) {
        let schema_obj = match schema {
            Value::Object(obj) => obj,
            Value::Bool(false) => {
                self.push(path, "false schema", "boolean schema is false");
                return;
            }
            _ => return,
        };

        if let Some(schema_type) = schema_obj.get(TYPE_KEY) {
            self.validate_type(value, schema_type, path);
        }

        if let Some(Value::Array(allowed)) = schema_obj.get(ENUM_KEY) {
            if !allowed.iter().any(|candidate| json_equal(candidate, value)) {
                self.push(path, ENUM_KEY, "must be equal to one of the allowed values");
            }
        }

        if let Some(constant) = schema_obj.get(CONST_KEY) {
            if !json_equal(constant, value) {
                self.push(path, CONST_KEY, "must be equal to constant");
            }
        }

        match value {
            Value::String(s) => self.validate_string(s, schema_obj, path),
            Value::Number(_) => self.validate_number(value, schema_obj, path),
            Value::Array(items) => self.validate_array(items, schema_obj, path),
            Value::Object(object) => self.validate_object(object, schema_obj, path),
            Value::Null | Value::Bool(_) => {}
        }

        self.validate_combinators(value, schema_obj, path);
    }

    fn validate_type(&mut self, value: &Value, schema_type: &Value, path: &str) {
        let names: Vec<&str> = match schema_type {
            Value::String(name) => vec![name.as_str()],
            Value::Array(names) => names.iter().filter_map(Value::as_str).collect(),
            _ => return,
        };

        if !names.iter().any(|name| value_has_type(value, name)) {
            self.push(path, TYPE_KEY, format!("must be {}", names.join(",")));
        }
    }

    fn validate_string(&mut self, s: &str, schema: &Map<String, Value>, path: &str) {
        let length = s.chars().count() as u64;

        if let Some(min) = schema.get("minLength").and_then(Value::as_u64) {
            if length < min {
                self.push(
                    path,
                    "minLength",
                    format!("must NOT have fewer than {} characters", min),
                );
            }
        }

        if let Some(max) = schema.get("maxLength").and_then(Value::as_u64) {
            if length > max {
                self.push(
                    path,
                    "maxLength",
                    format!("must NOT have more than {} characters", max),
                );
            }
        }

        if let Some(pattern) = schema.get(PATTERN_KEY).and_then(Value::as_str) {
            let matched = self
                .patterns
                .get(pattern)
                .is_some_and(|regex| regex.is_match(s));
            if !matched {
                self.push(
                    path,
                    PATTERN_KEY,
                    format!("must match pattern \"{}\"", pattern),
                );
            }
        }
    }

    fn validate_number(&mut self, value: &Value, schema: &Map<String, Value>, path: &str) {
        let Some(n) = value.as_f64() else {
            return;
        };

        let bounds: [(&str, &str, fn(f64, f64) -> bool); 4] = [
            ("minimum", ">=", |n, b| n >= b),
            ("maximum", "<=", |n, b| n <= b),
            ("exclusiveMinimum", ">", |n, b| n > b),
            ("exclusiveMaximum", "<", |n, b| n < b),
        ];
        for (keyword, comparison, holds) in bounds {
            if let Some(bound) = schema.get(keyword) {
                if let Some(b) = bound.as_f64() {
                    if !holds(n, b) {
                        self.push(path, keyword, format!("must be {} {}", comparison, bound));
                    }
                }
            }
        }

        if let Some(divisor) = schema.get("multipleOf") {
            if let Some(d) = divisor.as_f64() {
                let quotient = n / d;
                if (quotient - quotient.round()).abs() > f64::EPSILON * quotient.abs().max(1.0) {
                    self.push(path, "multipleOf", format!("must be multiple of {}", divisor));
                }
            }
        }
    }

    fn validate_array(&mut self, items: &[Value], schema: &Map<String, Value>, path: &str) {
        let count = items.len() as u64;

        if let Some(min) = schema.get("minItems").and_then(Value::as_u64) {
            if count < min {
                self.push(
                    path,
                    "minItems",
                    format!("must NOT have fewer than {} items", min),
                );
            }
        }

        if let Some(max) = schema.get("maxItems").and_then(Value::as_u64) {
            if count > max {
                self.push(
                    path,
                    "maxItems",
                    format!("must NOT have more than {} items", max),
                );
            }
        }

        if schema.get("uniqueItems").and_then(Value::as_bool) == Some(true) {
            'outer: for (j, later) in items.iter().enumerate() {
                for (i, earlier) in items[..j].iter().enumerate() {
                    if json_equal(earlier, later) {
                        self.push(
                            path,
                            "uniqueItems",
                            format!(
                                "must NOT have duplicate items (items ## {} and {} are identical)",
                                i, j
                            ),
                        );
                        break 'outer;
                    }
                }
            }
        }

        match schema.get(ITEMS_KEY) {
            Some(Value::Array(item_schemas)) => {
                for (index, (item, item_schema)) in items.iter().zip(item_schemas).enumerate() {
                    self.validate_value(item, item_schema, &format!("{}/{}", path, index));
                }
            }
            Some(item_schema) => {
                for (index, item) in items.iter().enumerate() {
                    self.validate_value(item, item_schema, &format!("{}/{}", path, index));
                }
            }
            None => {}
        }
    }

    fn validate_object(
        &mut self,
        object: &Map<String, Value>,
        schema: &Map<String, Value>,
        path: &str,
    ) {
        if let Some(Value::Array(required)) = schema.get(REQUIRED_KEY) {
            for prop_name in required.iter().filter_map(Value::as_str) {
                if !object.contains_key(prop_name) {
                    self.push(
                        &format!("{}/{}", path, escape_pointer(prop_name)),
                        REQUIRED_KEY,
                        format!("must have required property '{}'", prop_name),
                    );
                }
            }
        }

        let count = object.len() as u64;
        if let Some(min) = schema.get("minProperties").and_then(Value::as_u64) {
            if count < min {
                self.push(
                    path,
                    "minProperties",
                    format!("must NOT have fewer than {} properties", min),
                );
            }
        }
        if let Some(max) = schema.get("maxProperties").and_then(Value::as_u64) {
            if count > max {
                self.push(
                    path,
                    "maxProperties",
                    format!("must NOT have more than {} properties", max),
                );
            }
        }

        let properties = schema.get(PROPERTIES_KEY).and_then(Value::as_object);
        if let Some(properties) = properties {
            for (prop_name, prop_schema) in properties {
                if let Some(prop_value) = object.get(prop_name) {
                    self.validate_value(
                        prop_value,
                        prop_schema,
                        &format!("{}/{}", path, escape_pointer(prop_name)),
                    );
                }
            }
        }

        if let Some(additional) = schema.get(ADDITIONAL_PROPERTIES_KEY) {
            let extras = object
                .iter()
                .filter(|(name, _)| !properties.is_some_and(|p| p.contains_key(name.as_str())));
            for (name, extra) in extras {
                let extra_path = format!("{}/{}", path, escape_pointer(name));
                match additional {
                    Value::Bool(false) => self.push(
                        &extra_path,
                        ADDITIONAL_PROPERTIES_KEY,
                        "must NOT have additional properties",
                    ),
                    Value::Bool(true) => {}
                    sub_schema => self.validate_value(extra, sub_schema, &extra_path),
                }
            }
        }
    }

    fn validate_combinators(&mut self, value: &Value, schema: &Map<String, Value>, path: &str) {
        if let Some(Value::Array(all_of)) = schema.get(ALL_OF_KEY) {
            for sub_schema in all_of {
                self.validate_value(value, sub_schema, path);
            }
        }

        if let Some(Value::Array(any_of)) = schema.get(ANY_OF_KEY) {
            if !any_of.iter().any(|sub_schema| self.passes(value, sub_schema)) {
                self.push(path, ANY_OF_KEY, "must match a schema in anyOf");
            }
        }

        if let Some(Value::Array(one_of)) = schema.get(ONE_OF_KEY) {
            let matching = one_of
                .iter()
                .filter(|sub_schema| self.passes(value, sub_schema))
                .count();
            if matching != 1 {
                self.push(path, ONE_OF_KEY, "must match exactly one schema in oneOf");
            }
        }

        if let Some(not_schema) = schema.get(NOT_KEY) {
            if self.passes(value, not_schema) {
                self.push(path, NOT_KEY, "must NOT be valid");
            }
        }
    }
}

fn value_has_type(value: &Value, type_name: &str) -> bool {
    match (type_name, value) {
        (TYPE_NULL, Value::Null) => true,
        (TYPE_BOOLEAN, Value::Bool(_)) => true,
        (TYPE_INTEGER, Value::Number(n)) => {
            n.is_i64() || n.is_u64() || n.as_f64().is_some_and(|f| f.fract() == 0.0)
        }
        (TYPE_NUMBER, Value::Number(_)) => true,
        (TYPE_STRING, Value::String(_)) => true,
        (TYPE_ARRAY, Value::Array(_)) => true,
        (TYPE_OBJECT, Value::Object(_)) => true,
        _ => false,
    }
}

/// Returns a human readable JSON type name for the value.
pub(crate) fn get_value_type(value: &Value) -> &'static str {
    match value {
        Value::Null => TYPE_NULL,
        Value::Bool(_) => TYPE_BOOLEAN,
        Value::Number(n) if n.is_i64() || n.is_u64() => TYPE_INTEGER,
        Value::Number(_) => TYPE_NUMBER,
        Value::String(_) => TYPE_STRING,
        Value::Array(_) => TYPE_ARRAY,
        Value::Object(_) => TYPE_OBJECT,
    }
}

/// Structural equality that treats `1` and `1.0` as the same number.
pub(crate) fn json_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => x == y,
        },
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| json_equal(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(k, x)| ys.get(k).is_some_and(|y| json_equal(x, y)))
        }
        _ => a == b,
    }
}

fn escape_pointer(token: &str) -> String {
    token.replace('~', "~0").replace('/', "~1")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn compile(schema: Value) -> CompiledSchema {
        CompiledSchema::compile(schema).unwrap()
    }

    #[test]
    fn validate_primitive_types() {
        assert!(compile(json!({"type": "null"})).is_valid(&json!(null)));
        assert!(compile(json!({"type": "boolean"})).is_valid(&json!(false)));
        assert!(compile(json!({"type": "integer"})).is_valid(&json!(-10)));
        assert!(compile(json!({"type": "integer"})).is_valid(&json!(4.0)));
        assert!(!compile(json!({"type": "integer"})).is_valid(&json!(2.5)));
        assert!(compile(json!({"type": "number"})).is_valid(&json!(2.5)));
        assert!(compile(json!({"type": "string"})).is_valid(&json!("hello")));
        assert!(!compile(json!({"type": "string"})).is_valid(&json!(123)));
    }

    #[test]
    fn validate_type_list() {
        let schema = compile(json!({"type": ["string", "null"]}));
        assert!(schema.is_valid(&json!("x")));
        assert!(schema.is_valid(&json!(null)));

        let issues = schema.validate(&json!(3)).unwrap_err();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].keyword, "type");
        assert_eq!(issues[0].message, "must be string,null");
    }

    #[test]
    fn schema_without_type_accepts_anything() {
        let schema = compile(json!({}));
        assert!(schema.is_valid(&json!(42)));
        assert!(schema.is_valid(&json!({"extra": "field"})));
        assert!(compile(json!(true)).is_valid(&json!([1, 2])));
        assert!(!compile(json!(false)).is_valid(&json!([1, 2])));
    }

    #[test]
    fn missing_required_property_points_at_property() {
        let schema = compile(json!({
            "type": "object",
            "properties": {"email": {"type": "string"}},
            "required": ["email"]
        }));

        let issues = schema.validate(&json!({})).unwrap_err();
        assert_eq!(
            issues,
            vec![ValidationIssue {
                path: "/email".to_string(),
                keyword: "required".to_string(),
                message: "must have required property 'email'".to_string(),
            }]
        );
    }

    #[test]
    fn all_issues_are_reported_in_order() {
        let schema = compile(json!({
            "type": "object",
            "properties": {
                "name": {"type": "string", "minLength": 2},
                "tags": {"type": "array", "items": {"type": "string"}}
            },
            "required": ["name", "id"]
        }));

        let issues = schema
            .validate(&json!({"name": "a", "tags": ["ok", 1, false]}))
            .unwrap_err();
        let paths: Vec<&str> = issues.iter().map(|i| i.path.as_str()).collect();
        assert_eq!(paths, vec!["/id", "/name", "/tags/1", "/tags/2"]);
    }

    #[test]
    fn validate_nested_object_paths() {
        let schema = compile(json!({
            "type": "object",
            "properties": {
                "position": {
                    "type": "object",
                    "properties": {"x": {"type": "number"}, "y": {"type": "number"}},
                    "required": ["x", "y"]
                }
            }
        }));

        let issues = schema
            .validate(&json!({"position": {"x": "left"}}))
            .unwrap_err();
        assert_eq!(issues.len(), 2);
        assert_eq!(issues[0].path, "/position/y");
        assert_eq!(issues[1].path, "/position/x");
        assert_eq!(issues[1].message, "must be number");
    }

    #[test]
    fn validate_tuple_items() {
        let schema = compile(json!({
            "type": "array",
            "items": [{"type": "number"}, {"type": "string"}]
        }));
        assert!(schema.is_valid(&json!([1, "a"])));
        assert!(schema.is_valid(&json!([1, "a", true])));
        let issues = schema.validate(&json!(["a", 1])).unwrap_err();
        assert_eq!(issues.len(), 2);
        assert_eq!(issues[0].path, "/0");
    }

    #[test]
    fn validate_string_keywords() {
        let schema = compile(json!({
            "type": "string",
            "minLength": 3,
            "maxLength": 5,
            "pattern": "^[a-z]+$"
        }));
        assert!(schema.is_valid(&json!("abcd")));
        assert_eq!(schema.validate(&json!("ab")).unwrap_err()[0].keyword, "minLength");
        assert_eq!(schema.validate(&json!("abcdef")).unwrap_err()[0].keyword, "maxLength");
        let issues = schema.validate(&json!("ABC")).unwrap_err();
        assert_eq!(issues[0].message, "must match pattern \"^[a-z]+$\"");
    }

    #[test]
    fn validate_numeric_bounds() {
        let schema = compile(json!({
            "type": "number",
            "minimum": 0,
            "exclusiveMaximum": 10,
            "multipleOf": 0.5
        }));
        assert!(schema.is_valid(&json!(0)));
        assert!(schema.is_valid(&json!(9.5)));
        assert_eq!(schema.validate(&json!(-1)).unwrap_err()[0].message, "must be >= 0");
        assert_eq!(schema.validate(&json!(10)).unwrap_err()[0].message, "must be < 10");
        assert_eq!(
            schema.validate(&json!(1.25)).unwrap_err()[0].keyword,
            "multipleOf"
        );
    }

    #[test]
    fn validate_enum_and_const() {
        let schema = compile(json!({"enum": ["Red", "Green", 3]}));
        assert!(schema.is_valid(&json!("Red")));
        assert!(schema.is_valid(&json!(3.0)));
        assert!(!schema.is_valid(&json!("Yellow")));

        let schema = compile(json!({"const": {"a": 1}}));
        assert!(schema.is_valid(&json!({"a": 1})));
        assert!(!schema.is_valid(&json!({"a": 2})));
    }

    #[test]
    fn validate_additional_properties() {
        let closed = compile(json!({
            "type": "object",
            "properties": {"a": {"type": "integer"}},
            "additionalProperties": false
        }));
        assert!(closed.is_valid(&json!({"a": 1})));
        let issues = closed.validate(&json!({"a": 1, "b": 2})).unwrap_err();
        assert_eq!(issues[0].path, "/b");

        let typed = compile(json!({"additionalProperties": {"type": "string"}}));
        assert!(typed.is_valid(&json!({"x": "y"})));
        assert!(!typed.is_valid(&json!({"x": 1})));
    }

    #[test]
    fn validate_array_counts_and_uniqueness() {
        let schema = compile(json!({"minItems": 1, "maxItems": 3, "uniqueItems": true}));
        assert!(schema.is_valid(&json!([1, 2])));
        assert!(!schema.is_valid(&json!([])));
        assert!(!schema.is_valid(&json!([1, 2, 3, 4])));
        let issues = schema.validate(&json!([1, 2, 1])).unwrap_err();
        assert_eq!(issues[0].keyword, "uniqueItems");
    }

    #[test]
    fn validate_one_of() {
        let schema = json!({
            "oneOf": [
                {"type": "string", "enum": ["Red", "Green", "Blue"]},
                {
                    "type": "object",
                    "properties": {"Custom": {"type": "string"}},
                    "required": ["Custom"]
                }
            ]
        });
        let schema = compile(schema);

        assert!(schema.is_valid(&json!("Red")));
        assert!(schema.is_valid(&json!({"Custom": "purple"})));
        assert!(!schema.is_valid(&json!("Yellow")));
        assert!(!schema.is_valid(&json!({"Custom": 123})));
        assert!(!schema.is_valid(&json!(42)));
    }

    #[test]
    fn one_of_rejects_multiple_matches() {
        let schema = compile(json!({"oneOf": [{"type": "number"}, {"type": "integer"}]}));
        assert!(schema.is_valid(&json!(1.5)));
        assert!(!schema.is_valid(&json!(1)));
    }

    #[test]
    fn validate_any_all_not() {
        let any = compile(json!({"anyOf": [{"type": "string"}, {"type": "integer"}]}));
        assert!(any.is_valid(&json!(1)));
        assert!(!any.is_valid(&json!(true)));

        let all = compile(json!({"allOf": [{"minimum": 1}, {"maximum": 3}]}));
        assert!(all.is_valid(&json!(2)));
        assert_eq!(all.validate(&json!(5)).unwrap_err()[0].keyword, "maximum");

        let not = compile(json!({"not": {"type": "null"}}));
        assert!(not.is_valid(&json!(0)));
        assert!(!not.is_valid(&json!(null)));
    }

    #[test]
    fn compile_rejects_malformed_schemas() {
        assert!(matches!(
            CompiledSchema::compile(json!("not an object")),
            Err(SchemaError::InvalidSchema { .. })
        ));
        assert!(CompiledSchema::compile(json!({"type": "unknown"})).is_err());
        assert!(CompiledSchema::compile(json!({"type": []})).is_err());
        assert!(CompiledSchema::compile(json!({"properties": []})).is_err());
        assert!(CompiledSchema::compile(json!({"required": [1]})).is_err());
        assert!(CompiledSchema::compile(json!({"oneOf": []})).is_err());
        assert!(CompiledSchema::compile(json!({"minLength": -1})).is_err());
        assert!(CompiledSchema::compile(json!({"multipleOf": 0})).is_err());
        assert!(matches!(
            CompiledSchema::compile(json!({"properties": {"a": {"pattern": "(["}}})),
            Err(SchemaError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn compile_error_names_nested_location() {
        let err = CompiledSchema::compile(json!({
            "properties": {"user": {"properties": {"age": {"type": "int"}}}}
        }))
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid schema at #/properties/user/properties/age: unknown schema type: int"
        );
    }

    #[test]
    fn defaults_fill_missing_members_only() {
        let schema = compile(json!({
            "type": "object",
            "properties": {
                "status": {"type": "string", "default": "new"},
                "count": {"type": "integer", "default": 0},
                "meta": {
                    "type": "object",
                    "default": {},
                    "properties": {"source": {"type": "string", "default": "api"}}
                }
            }
        }));

        let mut document = json!({"count": 7});
        schema.apply_defaults(&mut document);
        assert_eq!(
            document,
            json!({"status": "new", "count": 7, "meta": {"source": "api"}})
        );
    }

    #[test]
    fn defaults_reach_array_items() {
        let schema = compile(json!({
            "type": "array",
            "items": {"type": "object", "properties": {"qty": {"default": 1}}}
        }));
        let mut document = json!([{}, {"qty": 3}]);
        schema.apply_defaults(&mut document);
        assert_eq!(document, json!([{"qty": 1}, {"qty": 3}]));
    }

    #[test]
    fn pointer_tokens_are_escaped() {
        let schema = compile(json!({"required": ["a/b", "c~d"]}));
        let issues = schema.validate(&json!({})).unwrap_err();
        assert_eq!(issues[0].path, "/a~1b");
        assert_eq!(issues[1].path, "/c~0d");
    }

    #[test]
    fn value_type_names() {
        assert_eq!(get_value_type(&json!(1)), "integer");
        assert_eq!(get_value_type(&json!(1.5)), "number");
        assert_eq!(get_value_type(&json!({})), "object");
    }

    #[test]
    fn issue_display() {
        let issue = ValidationIssue::new("/name", "type", "must be string");
        assert_eq!(issue.to_string(), "/name: must be string");
        let issue = ValidationIssue::new("", "type", "must be object");
        assert_eq!(issue.to_string(), "must be object");
    }
}
