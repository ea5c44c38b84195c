//! # Query String Translation
//!
//! Turns the raw query string of a list, bulk patch or bulk delete request into a
//! [`NormalizedQuery`]: Mongo-style filter criteria plus paging, projection and sort options.
//!
//! ## Grammar
//!
//! Reserved keys configure the query rather than filter it:
//!
//! | Key | Effect |
//! |-----|--------|
//! | `limit=N` | at most N documents |
//! | `offset=N`, `skip=N` | skip the first N documents |
//! | `fields=a,b` | only return `a` and `b` |
//! | `omit=a,b` | return everything except `a` and `b` |
//! | `sort=a,-b` | sort ascending by `a`, then descending by `b` |
//!
//! Every other key is a filter:
//!
//! | Query | Criteria |
//! |-------|----------|
//! | `name=Ada` | `{"name": "Ada"}` |
//! | `tag=a,b` | `{"tag": {"$in": ["a", "b"]}}` |
//! | `tag!=a` | `{"tag": {"$ne": "a"}}` |
//! | `age>21`, `age>=21`, `age<21`, `age<=21` | `$gt`, `$gte`, `$lt`, `$lte` |
//! | `email`, `!email` | `{"email": {"$exists": true}}`, `{"email": {"$exists": false}}` |
//! | `age:mod=4,0` | `{"age": {"$mod": [4, 0]}}` |
//! | `age[gt]=18` | `{"age": {"$gt": 18}}` |
//! | `name=/^a/i` | `{"name": {"$regex": "^a", "$options": "i"}}` |
//!
//! Values are typed: `true` and `false` become booleans, numeric literals become numbers,
//! quoted values stay strings verbatim and `/pattern/flags` becomes a regex. Malformed input
//! never fails; keys that do not fit the grammar are dropped or treated as equality filters.
//!
//! ```rust
//! use crudlify::query::translate;
//! use serde_json::json;
//!
//! let query = translate("limit=10&skip=5&name=foo");
//! assert_eq!(query.limit, Some(10));
//! assert_eq!(query.offset, Some(5));
//! assert_eq!(serde_json::Value::Object(query.criteria), json!({"name": "foo"}));
//! ```

use std::collections::{BTreeSet, HashSet};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

const LIMIT_KEY: &str = "limit";
const OFFSET_KEY: &str = "offset";
const SKIP_KEY: &str = "skip";
const FIELDS_KEY: &str = "fields";
const OMIT_KEY: &str = "omit";
const SORT_KEY: &str = "sort";

const REGEX_OP: &str = "$regex";
const OPTIONS_OP: &str = "$options";

/// Operators accepted in the `key[op]=value` form.
const BRACKET_OPERATORS: &[&str] = &[
    "eq", "ne", "gt", "gte", "lt", "lte", "in", "nin", "all", "exists", "regex", "options",
    "not", "size",
];
const LIST_OPERATORS: &[&str] = &["in", "nin", "all"];

static BRACKET_KEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([^\[\]]+)\[([A-Za-z]+)\]$").expect("static regex")
});
static COMPARISON: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(!?[^><!=:]+)(?:=?([><]=?|!?=|:.+=)(.+))?$").expect("static regex")
});
static LIST_ITEM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""[^"]*"|'[^']*'|[^,]+"#).expect("static regex"));
static REGEX_LITERAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^/(.*)/([a-z]*)$").expect("static regex"));
static NUMBER_LITERAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[+-]?(\d+\.?\d*|\.\d+)([eE][+-]?\d+)?$").expect("static regex")
});
static INTEGER_LITERAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[+-]?\d+$").expect("static regex"));

/// Direction of one sort key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    /// Smallest first.
    Asc,
    /// Largest first.
    Desc,
}

/// One `(field, direction)` entry of a sort specification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortKey {
    /// Dotted path of the field to sort by.
    pub field: String,
    /// Sort direction.
    pub direction: SortDirection,
}

/// A query string decomposed into filter criteria and options.
///
/// Options are `None` unless the query string set them to a usable value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizedQuery {
    /// Mongo-style filter object.
    pub criteria: Map<String, Value>,
    /// Maximum number of documents to return.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    /// Number of matching documents to skip.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<u64>,
    /// Fields to include.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<BTreeSet<String>>,
    /// Fields to exclude.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub omit: Option<BTreeSet<String>>,
    /// Sort keys, most significant first.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<Vec<SortKey>>,
}

impl NormalizedQuery {
    /// Returns the projection for `fields` and `omit`: included names map to `1`, omitted
    /// names to `0`.
    pub fn projection(&self) -> Option<Map<String, Value>> {
        if self.fields.is_none() && self.omit.is_none() {
            return None;
        }
        let mut projection = Map::new();
        for field in self.fields.iter().flatten() {
            projection.insert(field.clone(), Value::from(1));
        }
        for field in self.omit.iter().flatten() {
            projection.insert(field.clone(), Value::from(0));
        }
        Some(projection)
    }

    /// Renders the query back into a query string that [`translate`] maps to an equal query.
    ///
    /// Each filter is written in the first spelling (`key[op]=value`, a comparison such as
    /// `key>=value`, or `key:op=value`) that reads back to the same condition. Strings are
    /// quoted when they would otherwise be retyped or split into a list.
    ///
    /// ```rust
    /// use crudlify::query::translate;
    ///
    /// let query = translate("age>18&tag=a,b&sort=-age&limit=5");
    /// let rendered = query.to_query_string();
    /// assert_eq!(translate(&rendered), query);
    /// ```
    pub fn to_query_string(&self) -> String {
        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        let mut used_keys = HashSet::new();

        for (field, value) in &self.criteria {
            for (key, rendered) in render_criterion(field, value, &mut used_keys) {
                serializer.append_pair(&key, &rendered);
            }
        }

        if let Some(limit) = self.limit {
            serializer.append_pair(LIMIT_KEY, &limit.to_string());
        }
        if let Some(offset) = self.offset {
            serializer.append_pair(OFFSET_KEY, &offset.to_string());
        }
        if let Some(fields) = &self.fields {
            serializer.append_pair(FIELDS_KEY, &join_names(fields));
        }
        if let Some(omit) = &self.omit {
            serializer.append_pair(OMIT_KEY, &join_names(omit));
        }
        if let Some(sort) = &self.sort {
            let keys: Vec<String> = sort.iter().map(render_sort_key).collect();
            serializer.append_pair(SORT_KEY, &keys.join(","));
        }

        serializer.finish()
    }
}

/// Translates a raw query string into a [`NormalizedQuery`].
///
/// A leading `?` is ignored. Repeated keys are joined with commas before interpretation, so
/// `tag=a&tag=b` is the same as `tag=a,b`.
pub fn translate(raw: &str) -> NormalizedQuery {
    let raw = raw.strip_prefix('?').unwrap_or(raw);
    let mut query = NormalizedQuery::default();

    for (key, value) in group_pairs(raw) {
        match key.as_str() {
            LIMIT_KEY => query.limit = parse_count(&value),
            OFFSET_KEY | SKIP_KEY => query.offset = parse_count(&value),
            FIELDS_KEY => query.fields = parse_names(&value),
            OMIT_KEY => query.omit = parse_names(&value),
            SORT_KEY => query.sort = parse_sort(&value),
            _ => {
                if let Some((field, condition)) = parse_criterion(&key, &value) {
                    merge_criterion(&mut query.criteria, field, condition);
                }
            }
        }
    }

    query
}

fn group_pairs(raw: &str) -> Vec<(String, String)> {
    let mut grouped: Vec<(String, String)> = Vec::new();
    for (key, value) in url::form_urlencoded::parse(raw.as_bytes()) {
        match grouped.iter_mut().find(|(existing, _)| *existing == key) {
            Some((_, joined)) => {
                joined.push(',');
                joined.push_str(&value);
            }
            None => grouped.push((key.into_owned(), value.into_owned())),
        }
    }
    grouped
}

fn parse_count(value: &str) -> Option<u64> {
    value.trim().parse().ok()
}

fn parse_names(value: &str) -> Option<BTreeSet<String>> {
    let names: BTreeSet<String> = value
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect();
    if names.is_empty() { None } else { Some(names) }
}

fn parse_sort(value: &str) -> Option<Vec<SortKey>> {
    let keys: Vec<SortKey> = value
        .split(',')
        .map(str::trim)
        .filter_map(|item| {
            let (direction, field) = match item.chars().next()? {
                '-' => (SortDirection::Desc, item[1..].trim()),
                '+' => (SortDirection::Asc, item[1..].trim()),
                _ => (SortDirection::Asc, item),
            };
            if field.is_empty() {
                return None;
            }
            Some(SortKey {
                field: field.to_string(),
                direction,
            })
        })
        .collect();
    if keys.is_empty() { None } else { Some(keys) }
}

fn parse_criterion(key: &str, value: &str) -> Option<(String, Value)> {
    if let Some(captures) = BRACKET_KEY.captures(key) {
        let op = captures[2].to_string();
        if BRACKET_OPERATORS.contains(&op.as_str()) {
            return Some((captures[1].to_string(), bracket_condition(&op, value)));
        }
    }
    comparison_condition(key, value)
}

fn bracket_condition(op: &str, value: &str) -> Value {
    let mut condition = Map::new();
    match op {
        "regex" => match REGEX_LITERAL.captures(value) {
            Some(literal) => {
                condition.insert(REGEX_OP.to_string(), Value::from(&literal[1]));
                if !literal[2].is_empty() {
                    condition.insert(OPTIONS_OP.to_string(), Value::from(&literal[2]));
                }
            }
            None => {
                condition.insert(REGEX_OP.to_string(), Value::from(value));
            }
        },
        "options" => {
            condition.insert(OPTIONS_OP.to_string(), Value::from(value));
        }
        op if LIST_OPERATORS.contains(&op) => {
            condition.insert(format!("${}", op), Value::Array(typed_values(value)));
        }
        op => {
            condition.insert(format!("${}", op), typed_value(value));
        }
    }
    Value::Object(condition)
}

fn comparison_condition(key: &str, value: &str) -> Option<(String, Value)> {
    let joined = if value.is_empty() {
        key.to_string()
    } else {
        format!("{}={}", key, value)
    };
    let captures = COMPARISON.captures(&joined)?;
    let mut field = captures[1].to_string();

    let (Some(op), Some(operand)) = (captures.get(2), captures.get(3)) else {
        let exists = match field.strip_prefix('!') {
            Some(stripped) => {
                field = stripped.to_string();
                false
            }
            None => true,
        };
        return Some((field, operator("$exists", Value::Bool(exists))));
    };
    let (mut op, mut operand) = (op.as_str(), operand.as_str());

    if op == "=" && operand == "!" {
        return Some((field, operator("$exists", Value::Bool(false))));
    }

    let condition = match op {
        "=" | "!=" => {
            if op == "=" {
                if let Some(negated) = operand.strip_prefix('!') {
                    op = "!=";
                    operand = negated;
                }
            }
            let mut values = typed_values(operand);
            if values.len() > 1 {
                let list_op = if op == "=" { "$in" } else { "$nin" };
                operator(list_op, Value::Array(values))
            } else {
                let single = values.pop().unwrap_or_else(|| typed_value(operand));
                match (op, is_regex_value(&single)) {
                    ("=", _) => single,
                    (_, true) => operator("$not", single),
                    (_, false) => operator("$ne", single),
                }
            }
        }
        ">" => operator("$gt", typed_value(operand)),
        ">=" => operator("$gte", typed_value(operand)),
        "<" => operator("$lt", typed_value(operand)),
        "<=" => operator("$lte", typed_value(operand)),
        custom => {
            let name = &custom[1..custom.len() - 1];
            let mut values = typed_values(operand);
            let operand = match values.len() {
                0 => typed_value(operand),
                1 => values.pop().unwrap_or(Value::Null),
                _ => Value::Array(values),
            };
            operator(&format!("${}", name), operand)
        }
    };

    Some((field, condition))
}

fn operator(name: &str, operand: Value) -> Value {
    let mut condition = Map::new();
    condition.insert(name.to_string(), operand);
    Value::Object(condition)
}

fn merge_criterion(criteria: &mut Map<String, Value>, field: String, condition: Value) {
    if let (Some(Value::Object(existing)), Value::Object(additional)) =
        (criteria.get_mut(&field), &condition)
    {
        existing.extend(additional.clone());
        return;
    }
    criteria.insert(field, condition);
}

fn typed_values(list: &str) -> Vec<Value> {
    LIST_ITEM
        .find_iter(list)
        .map(|item| typed_value(item.as_str()))
        .collect()
}

/// Interprets one query string value.
pub fn typed_value(value: &str) -> Value {
    if let Some(literal) = REGEX_LITERAL.captures(value) {
        let mut regex = Map::new();
        regex.insert(REGEX_OP.to_string(), Value::from(&literal[1]));
        if !literal[2].is_empty() {
            regex.insert(OPTIONS_OP.to_string(), Value::from(&literal[2]));
        }
        return Value::Object(regex);
    }
    if let Some(unquoted) = unquote(value) {
        return Value::from(unquoted);
    }
    match value {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        _ => {}
    }
    if let Some(number) = parse_number(value) {
        return Value::Number(number);
    }
    Value::from(value)
}

fn unquote(value: &str) -> Option<&str> {
    let first = value.chars().next()?;
    if value.len() >= 2 && (first == '"' || first == '\'') && value.ends_with(first) {
        Some(&value[1..value.len() - 1])
    } else {
        None
    }
}

fn parse_number(value: &str) -> Option<Number> {
    if !NUMBER_LITERAL.is_match(value) {
        return None;
    }
    if INTEGER_LITERAL.is_match(value) {
        if let Ok(i) = value.parse::<i64>() {
            return Some(Number::from(i));
        }
        if let Ok(u) = value.trim_start_matches('+').parse::<u64>() {
            return Some(Number::from(u));
        }
    }
    value
        .parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
}

fn is_regex_value(value: &Value) -> bool {
    regex_parts(value).is_some()
}

fn regex_parts(value: &Value) -> Option<(&str, &str)> {
    let object = value.as_object()?;
    let pattern = object.get(REGEX_OP)?.as_str()?;
    let options = match object.get(OPTIONS_OP) {
        None => "",
        Some(options) => options
            .as_str()
            .filter(|o| !o.is_empty() && o.chars().all(|c| c.is_ascii_lowercase()))?,
    };
    let expected = if object.contains_key(OPTIONS_OP) { 2 } else { 1 };
    if object.len() == expected {
        Some((pattern, options))
    } else {
        None
    }
}

fn is_operator_object(object: &Map<String, Value>) -> bool {
    !object.is_empty() && object.keys().all(|key| key.starts_with('$'))
}

///////////////////////////////////////////// Rendering ///////////////////////////////////////////////

/// A `(key, value)` pair of the rendered query string.
type Pair = (String, String);

fn render_criterion(field: &str, value: &Value, used_keys: &mut HashSet<String>) -> Vec<Pair> {
    let operators = match value {
        Value::Object(operators) if is_operator_object(operators) => operators,
        _ => return vec![pick(field, value, plain_candidates(field, value), used_keys)],
    };

    if regex_parts(value).is_some() {
        if let Some(pair) = find_candidate(field, value, plain_candidates(field, value), used_keys)
        {
            return vec![pair];
        }
    }

    operators
        .iter()
        .map(|(op, operand)| {
            let condition = operator(op, operand.clone());
            let candidates = operator_candidates(field, &op[1..], operand);
            pick(field, &condition, candidates, used_keys)
        })
        .collect()
}

/// Picks the first candidate that reads back as `condition`, or the first candidate when none
/// does.
fn pick(
    field: &str,
    condition: &Value,
    candidates: Vec<Pair>,
    used_keys: &mut HashSet<String>,
) -> Pair {
    let fallback = candidates.first().cloned().unwrap_or_default();
    let pair = find_candidate(field, condition, candidates, used_keys).unwrap_or(fallback);
    used_keys.insert(pair.0.clone());
    pair
}

fn find_candidate(
    field: &str,
    condition: &Value,
    candidates: Vec<Pair>,
    used_keys: &mut HashSet<String>,
) -> Option<Pair> {
    let pair = candidates.into_iter().find(|(key, rendered)| {
        !used_keys.contains(key) && parses_to(key, rendered, field, condition)
    })?;
    used_keys.insert(pair.0.clone());
    Some(pair)
}

fn parses_to(key: &str, rendered: &str, field: &str, condition: &Value) -> bool {
    let reserved = [LIMIT_KEY, OFFSET_KEY, SKIP_KEY, FIELDS_KEY, OMIT_KEY, SORT_KEY];
    !reserved.contains(&key)
        && parse_criterion(key, rendered)
            .is_some_and(|(parsed, parsed_condition)| parsed == field && parsed_condition == *condition)
}

/// Equality spellings: `field=value` split into a pair at any `=`, or kept whole in the key so
/// that a field that looks like `name[op]` is not read as the bracket form.
fn plain_candidates(field: &str, value: &Value) -> Vec<Pair> {
    value_renderings(value)
        .into_iter()
        .flat_map(|rendered| spellings(format!("{}={}", field, rendered)))
        .collect()
}

/// Operator spellings in order of preference: `field[op]=v`, the comparison forms, `field:op=v`.
fn operator_candidates(field: &str, name: &str, operand: &Value) -> Vec<Pair> {
    let mut candidates = Vec::new();

    if !field.contains(['[', ']']) && BRACKET_OPERATORS.contains(&name) {
        let key = format!("{}[{}]", field, name);
        let renderings = match (name, operand) {
            ("regex", Value::String(pattern)) => vec![format!("/{}/", pattern), pattern.clone()],
            ("options", Value::String(options)) => vec![options.clone()],
            (list, Value::Array(items)) if LIST_OPERATORS.contains(&list) => {
                vec![render_list(items, false)]
            }
            _ => value_renderings(operand),
        };
        candidates.extend(renderings.into_iter().map(|rendered| (key.clone(), rendered)));
    }

    let symbol = match name {
        "gt" => Some(">"),
        "gte" => Some(">="),
        "lt" => Some("<"),
        "lte" => Some("<="),
        "ne" | "not" | "nin" => Some("!="),
        "in" => Some("="),
        _ => None,
    };
    if let Some(symbol) = symbol {
        for rendered in value_renderings(operand) {
            candidates.extend(spellings(format!("{}{}{}", field, symbol, rendered)));
        }
    }
    if name == "exists" {
        candidates.extend(spellings(field.to_string()));
        candidates.extend(spellings(format!("{}=!", field)));
        candidates.extend(spellings(format!("!{}", field)));
    }

    for rendered in value_renderings(operand) {
        candidates.extend(spellings(format!("{}:{}={}", field, name, rendered)));
    }
    candidates
}

/// Every pair that joins back into `joined`: split at each `=` with a non-empty value, then the
/// whole string as a key with an empty value.
fn spellings(joined: String) -> Vec<Pair> {
    let mut pairs: Vec<Pair> = joined
        .match_indices('=')
        .map(|(at, _)| (joined[..at].to_string(), joined[at + 1..].to_string()))
        .filter(|(_, value)| !value.is_empty())
        .collect();
    pairs.push((joined, String::new()));
    pairs
}

/// Ways of writing a value, bare first and quoted after.
fn value_renderings(value: &Value) -> Vec<String> {
    if let Some((pattern, options)) = regex_parts(value) {
        return vec![format!("/{}/{}", pattern, options)];
    }
    match value {
        Value::String(s) => vec![s.clone(), format!("\"{}\"", s), format!("'{}'", s)],
        Value::Array(items) => vec![render_list(items, false), render_list(items, true)],
        other => vec![other.to_string()],
    }
}

/// Joins list elements. With `guard_first`, the first element never starts with a character
/// the comparison grammar would read as part of the operator.
fn render_list(items: &[Value], guard_first: bool) -> String {
    items
        .iter()
        .enumerate()
        .map(|(index, item)| render_item(item, guard_first && index == 0))
        .collect::<Vec<_>>()
        .join(",")
}

/// Renders a list element so that it reads back as exactly one element.
fn render_item(item: &Value, guarded: bool) -> String {
    let renderings = value_renderings(item);
    let single = renderings.iter().find(|rendered| {
        let found: Vec<&str> = LIST_ITEM.find_iter(rendered).map(|m| m.as_str()).collect();
        found == [rendered.as_str()]
            && typed_value(rendered) == *item
            && !(guarded && rendered.starts_with(['!', '=', '<', '>', ':']))
    });
    match single {
        Some(rendered) => rendered.clone(),
        None => renderings.into_iter().next().unwrap_or_default(),
    }
}

fn render_sort_key(key: &SortKey) -> String {
    match key.direction {
        SortDirection::Desc => format!("-{}", key.field),
        SortDirection::Asc if key.field.starts_with(['-', '+']) => format!("+{}", key.field),
        SortDirection::Asc => key.field.clone(),
    }
}

fn join_names(names: &BTreeSet<String>) -> String {
    names.iter().cloned().collect::<Vec<_>>().join(",")
}
