//! # Document Filters, Projection, Sort and Updates
//!
//! Evaluation of Mongo-style criteria, projections, sort keys and update documents over JSON
//! documents. [`InMemoryDataStore`](crate::InMemoryDataStore) is built on these functions;
//! other stores may use them to post-filter results.
//!
//! Field names are dotted paths: `address.city` looks up `city` inside the `address`
//! object, and a numeric segment indexes into an array.
//!
//! ```rust
//! use crudlify::filter::matches;
//! use serde_json::json;
//!
//! let doc = json!({"name": "Ada", "age": 36, "tags": ["math", "engines"]});
//! let criteria = json!({"age": {"$gt": 30}, "tags": "math"});
//! assert!(matches(&doc, criteria.as_object().unwrap()).unwrap());
//! ```

use std::cmp::Ordering;

use regex::RegexBuilder;
use serde_json::{Map, Number, Value};

use crate::errors::DataStoreError;
use crate::query::{SortDirection, SortKey};
use crate::validate::json_equal;

/// Name of the identifier field every stored document carries.
pub const ID_FIELD: &str = "_id";

type FilterResult<T> = Result<T, DataStoreError>;

fn invalid(message: impl Into<String>) -> DataStoreError {
    DataStoreError::InvalidQuery(message.into())
}

/////////////////////////////////////////////// Paths /////////////////////////////////////////////////

/// Resolves a dotted path inside a document.
pub fn resolve_path<'a>(document: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(document, |current, segment| match current {
        Value::Object(object) => object.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

fn set_path(object: &mut Map<String, Value>, path: &str, value: Value) -> FilterResult<()> {
    match path.split_once('.') {
        None => {
            object.insert(path.to_string(), value);
            Ok(())
        }
        Some((head, rest)) => {
            let child = object
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            match child {
                Value::Object(child) => set_path(child, rest, value),
                _ => Err(invalid(format!("cannot set {} inside a non-object", path))),
            }
        }
    }
}

fn remove_path(object: &mut Map<String, Value>, path: &str) -> Option<Value> {
    match path.split_once('.') {
        None => object.remove(path),
        Some((head, rest)) => match object.get_mut(head) {
            Some(Value::Object(child)) => remove_path(child, rest),
            _ => None,
        },
    }
}

///////////////////////////////////////////// Matching ////////////////////////////////////////////////

/// Returns true if the document satisfies the criteria.
///
/// Fails with [`DataStoreError::InvalidQuery`] for unknown operators, malformed operands
/// and regexes that do not compile.
pub fn matches(document: &Value, criteria: &Map<String, Value>) -> FilterResult<bool> {
    for (key, condition) in criteria {
        let matched = match key.as_str() {
            "$and" => {
                let mut all = true;
                for sub in logical_operands(key, condition)? {
                    if !matches(document, sub)? {
                        all = false;
                        break;
                    }
                }
                all
            }
            "$or" => {
                let mut any = false;
                for sub in logical_operands(key, condition)? {
                    if matches(document, sub)? {
                        any = true;
                        break;
                    }
                }
                any
            }
            op if op.starts_with('$') => {
                return Err(invalid(format!("unsupported top-level operator {}", op)));
            }
            field => match_condition(resolve_path(document, field), condition)?,
        };
        if !matched {
            return Ok(false);
        }
    }
    Ok(true)
}

fn logical_operands<'a>(
    op: &str,
    condition: &'a Value,
) -> FilterResult<Vec<&'a Map<String, Value>>> {
    condition
        .as_array()
        .filter(|subs| !subs.is_empty())
        .and_then(|subs| subs.iter().map(Value::as_object).collect::<Option<Vec<_>>>())
        .ok_or_else(|| invalid(format!("{} needs a non-empty array of objects", op)))
}

fn is_operator_object(value: &Value) -> Option<&Map<String, Value>> {
    value
        .as_object()
        .filter(|object| !object.is_empty() && object.keys().all(|k| k.starts_with('$')))
}

fn match_condition(value: Option<&Value>, condition: &Value) -> FilterResult<bool> {
    match is_operator_object(condition) {
        Some(operators) => match_operators(value, operators),
        None => Ok(equals(value, condition)),
    }
}

fn match_operators(value: Option<&Value>, operators: &Map<String, Value>) -> FilterResult<bool> {
    for (op, operand) in operators {
        let matched = match op.as_str() {
            "$eq" => equals(value, operand),
            "$ne" => !equals(value, operand),
            "$gt" => compares(value, operand, |o| o == Ordering::Greater),
            "$gte" => compares(value, operand, |o| o != Ordering::Less),
            "$lt" => compares(value, operand, |o| o == Ordering::Less),
            "$lte" => compares(value, operand, |o| o != Ordering::Greater),
            "$in" => is_in(value, list_operand(op, operand)?)?,
            "$nin" => !is_in(value, list_operand(op, operand)?)?,
            "$exists" => value.is_some() == is_truthy(operand),
            "$regex" => {
                let options = operators.get("$options").and_then(Value::as_str).unwrap_or("");
                let pattern = operand
                    .as_str()
                    .ok_or_else(|| invalid("$regex needs a string pattern"))?;
                regex_matches(value, pattern, options)?
            }
            "$options" => true,
            "$not" => {
                let negated = is_operator_object(operand)
                    .ok_or_else(|| invalid("$not needs an operator object or a regex"))?;
                !match_operators(value, negated)?
            }
            "$size" => {
                let size = operand
                    .as_u64()
                    .ok_or_else(|| invalid("$size needs a non-negative integer"))?;
                matches!(value, Some(Value::Array(items)) if items.len() as u64 == size)
            }
            "$all" => {
                let required = list_operand(op, operand)?;
                match value {
                    Some(Value::Array(items)) => required
                        .iter()
                        .all(|r| items.iter().any(|item| json_equal(item, r))),
                    _ => false,
                }
            }
            other => return Err(invalid(format!("unsupported operator {}", other))),
        };
        if !matched {
            return Ok(false);
        }
    }
    Ok(true)
}

fn list_operand<'a>(op: &str, operand: &'a Value) -> FilterResult<&'a [Value]> {
    operand
        .as_array()
        .map(Vec::as_slice)
        .ok_or_else(|| invalid(format!("{} needs an array", op)))
}

fn equals(value: Option<&Value>, expected: &Value) -> bool {
    match value {
        None => expected.is_null(),
        Some(actual) if json_equal(actual, expected) => true,
        Some(Value::Array(items)) => items.iter().any(|item| json_equal(item, expected)),
        Some(_) => false,
    }
}

fn compares(value: Option<&Value>, operand: &Value, accept: fn(Ordering) -> bool) -> bool {
    let check = |actual: &Value| compare_same_kind(actual, operand).is_some_and(accept);
    match value {
        Some(Value::Array(items)) => items.iter().any(check),
        Some(actual) => check(actual),
        None => false,
    }
}

fn compare_same_kind(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn is_in(value: Option<&Value>, candidates: &[Value]) -> FilterResult<bool> {
    for candidate in candidates {
        let hit = match is_operator_object(candidate) {
            Some(regex) if regex.contains_key("$regex") => match_operators(value, regex)?,
            _ => equals(value, candidate),
        };
        if hit {
            return Ok(true);
        }
    }
    Ok(false)
}

fn regex_matches(value: Option<&Value>, pattern: &str, options: &str) -> FilterResult<bool> {
    let mut builder = RegexBuilder::new(pattern);
    for flag in options.chars() {
        match flag {
            'i' => builder.case_insensitive(true),
            'm' => builder.multi_line(true),
            's' => builder.dot_matches_new_line(true),
            'x' => builder.ignore_whitespace(true),
            other => return Err(invalid(format!("unsupported regex option {}", other))),
        };
    }
    let regex = builder
        .build()
        .map_err(|e| invalid(format!("invalid regex {:?}: {}", pattern, e)))?;

    Ok(match value {
        Some(Value::String(s)) => regex.is_match(s),
        Some(Value::Array(items)) => items
            .iter()
            .any(|item| item.as_str().is_some_and(|s| regex.is_match(s))),
        _ => false,
    })
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/////////////////////////////////////////////// Sort //////////////////////////////////////////////////

fn type_rank(value: Option<&Value>) -> u8 {
    match value {
        None | Some(Value::Null) => 0,
        Some(Value::Number(_)) => 1,
        Some(Value::String(_)) => 2,
        Some(Value::Object(_)) => 3,
        Some(Value::Array(_)) => 4,
        Some(Value::Bool(_)) => 5,
    }
}

/// Total order used for sorting: missing and null first, then numbers, strings, objects,
/// arrays and booleans.
pub fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let by_rank = type_rank(a).cmp(&type_rank(b));
    if by_rank != Ordering::Equal {
        return by_rank;
    }
    match (a, b) {
        (Some(x), Some(y)) => compare_same_kind(x, y).unwrap_or(Ordering::Equal),
        _ => Ordering::Equal,
    }
}

/// Sorts documents in place by the given keys. The sort is stable.
pub fn sort_documents(documents: &mut [Value], keys: &[SortKey]) {
    documents.sort_by(|a, b| {
        for key in keys {
            let ordering = compare_values(resolve_path(a, &key.field), resolve_path(b, &key.field));
            let ordering = match key.direction {
                SortDirection::Asc => ordering,
                SortDirection::Desc => ordering.reverse(),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
}

//////////////////////////////////////////// Projection ///////////////////////////////////////////////

/// Applies a `{field: 1 | 0}` projection.
///
/// If any field other than `_id` is included, only the included fields and `_id` are kept.
/// Excluded fields are then removed, which is also how `_id` can be dropped.
pub fn project(document: &Value, projection: &Map<String, Value>) -> Value {
    let Value::Object(source) = document else {
        return document.clone();
    };

    let included: Vec<&str> = projection
        .iter()
        .filter(|(field, flag)| is_truthy(flag) && field.as_str() != ID_FIELD)
        .map(|(field, _)| field.as_str())
        .collect();

    let mut projected = if included.is_empty() {
        source.clone()
    } else {
        let mut projected = Map::new();
        if let Some(id) = source.get(ID_FIELD) {
            projected.insert(ID_FIELD.to_string(), id.clone());
        }
        for field in included.iter().filter(|field| !has_included_prefix(field, &included)) {
            if let Some(value) = resolve_path(document, field) {
                // no other included path is a prefix, so every step on the way is a new object
                let _ = set_path(&mut projected, field, value.clone());
            }
        }
        projected
    };

    for (field, flag) in projection {
        if !is_truthy(flag) {
            remove_path(&mut projected, field);
        }
    }
    Value::Object(projected)
}

/// True when a strict dotted prefix of `field` is itself included; that prefix is copied whole.
fn has_included_prefix(field: &str, included: &[&str]) -> bool {
    field
        .match_indices('.')
        .any(|(at, _)| included.contains(&&field[..at]))
}

////////////////////////////////////////////// Updates ////////////////////////////////////////////////

/// Applies an update document to a stored object.
///
/// The update is either made only of operators (`$set`, `$unset`, `$inc`, `$push`, `$pull`)
/// or is a plain object whose members are merged into the document. The `_id` member can not
/// be changed; a merge that carries the same `_id` is accepted.
pub fn apply_update(document: &mut Map<String, Value>, update: &Value) -> FilterResult<()> {
    let update = update
        .as_object()
        .ok_or_else(|| DataStoreError::InvalidDocument("update must be a JSON object".into()))?;
    let original_id = document.get(ID_FIELD).cloned();

    let operator_count = update.keys().filter(|k| k.starts_with('$')).count();
    if operator_count == 0 {
        for (key, value) in update {
            document.insert(key.clone(), value.clone());
        }
    } else if operator_count == update.len() {
        for (op, fields) in update {
            let fields = fields
                .as_object()
                .ok_or_else(|| invalid(format!("{} needs an object of fields", op)))?;
            for (path, operand) in fields {
                apply_operator(document, op, path, operand)?;
            }
        }
    } else {
        return Err(invalid("update mixes operators and plain fields"));
    }

    if document.get(ID_FIELD) != original_id.as_ref() {
        return Err(DataStoreError::InvalidDocument(format!(
            "{} is immutable",
            ID_FIELD
        )));
    }
    Ok(())
}

fn apply_operator(
    document: &mut Map<String, Value>,
    op: &str,
    path: &str,
    operand: &Value,
) -> FilterResult<()> {
    let current = resolve_path_in(document, path).cloned();
    match op {
        "$set" => set_path(document, path, operand.clone()),
        "$unset" => {
            remove_path(document, path);
            Ok(())
        }
        "$inc" => {
            let increment = operand
                .as_number()
                .ok_or_else(|| invalid(format!("$inc on {} needs a number", path)))?;
            let next = match current {
                None | Some(Value::Null) => increment.clone(),
                Some(Value::Number(n)) => add_numbers(&n, increment)
                    .ok_or_else(|| invalid(format!("$inc on {} overflows", path)))?,
                Some(_) => return Err(invalid(format!("$inc on non-numeric field {}", path))),
            };
            set_path(document, path, Value::Number(next))
        }
        "$push" => {
            let mut items = match current {
                None | Some(Value::Null) => Vec::new(),
                Some(Value::Array(items)) => items,
                Some(_) => return Err(invalid(format!("$push on non-array field {}", path))),
            };
            items.push(operand.clone());
            set_path(document, path, Value::Array(items))
        }
        "$pull" => match current {
            Some(Value::Array(mut items)) => {
                items.retain(|item| !json_equal(item, operand));
                set_path(document, path, Value::Array(items))
            }
            None | Some(Value::Null) => Ok(()),
            Some(_) => Err(invalid(format!("$pull on non-array field {}", path))),
        },
        other => Err(invalid(format!("unsupported update operator {}", other))),
    }
}

fn resolve_path_in<'a>(document: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    match path.split_once('.') {
        None => document.get(path),
        Some((head, rest)) => resolve_path(document.get(head)?, rest),
    }
}

fn add_numbers(a: &Number, b: &Number) -> Option<Number> {
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        return x.checked_add(y).map(Number::from);
    }
    Number::from_f64(a.as_f64()? + b.as_f64()?)
}
