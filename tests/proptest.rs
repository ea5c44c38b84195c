use std::sync::Arc;

use axum::Router;
use axum::http::StatusCode;
use axum_test::TestServer;
use proptest::prelude::*;
use serde_json::{Value, json};

use crudlify::query::translate;
use crudlify::{
    CrudOptions, InMemoryDataStore, OperationDispatcher, SchemaMap, SchemaRegistry,
    ValidationIssue, crudlify,
};

/// Builds a test server with the CRUD routes mounted at the root
fn test_server(schema: &SchemaMap, options: CrudOptions) -> TestServer {
    let dispatcher = OperationDispatcher::new(Arc::new(InMemoryDataStore::new()), schema, options)
        .expect("schema map should compile");
    TestServer::new(crudlify(Router::new(), Arc::new(dispatcher))).unwrap()
}

/// Property test strategies for generating query strings, schemas and documents
pub mod strategies {
    use super::*;
    use proptest::collection::{btree_map, btree_set, hash_map, vec};
    use proptest::option;
    use proptest::string::string_regex;

    /// Field names that never collide with the reserved query keys, some with an index suffix
    pub fn field_strategy() -> impl Strategy<Value = String> {
        prop_oneof![
            string_regex(r"x[a-z]{0,5}").unwrap(),
            string_regex(r"x[a-z]{0,3}\[[0-9]\]").unwrap(),
        ]
    }

    /// Plain field names for the reserved `fields` and `sort` keys
    pub fn name_strategy() -> impl Strategy<Value = String> {
        string_regex(r"x[a-z]{0,5}").unwrap()
    }

    /// Collection names other than the declared `things`
    pub fn collection_strategy() -> impl Strategy<Value = String> {
        string_regex(r"[a-z]{1,8}")
            .unwrap()
            .prop_filter("declared collection", |name| name != "things")
    }

    /// A single query string value: a word, an integer, a decimal, or text with quotes and `=`
    pub fn scalar_strategy() -> impl Strategy<Value = String> {
        prop_oneof![
            string_regex(r"[a-z][a-z0-9]{0,6}").unwrap(),
            string_regex(r#"[a-z="'!][a-z0-9="'!]{0,5}"#).unwrap(),
            any::<i32>().prop_map(|i| i.to_string()),
            (0u16..1000, 1u8..100).prop_map(|(whole, frac)| format!("{}.{}", whole, frac)),
        ]
    }

    /// One `key=value` clause in any of the supported spellings
    pub fn clause_strategy() -> impl Strategy<Value = (String, String)> {
        let ops = prop_oneof![
            Just("="),
            Just("!="),
            Just(">"),
            Just(">="),
            Just("<"),
            Just("<="),
        ];
        prop_oneof![
            (ops, scalar_strategy()).prop_map(|(op, value)| (op.to_string(), value)),
            vec(scalar_strategy(), 2..4).prop_map(|values| ("=".to_string(), values.join(","))),
            vec(scalar_strategy(), 1..4)
                .prop_map(|values| ("[in]=".to_string(), values.join(","))),
            scalar_strategy().prop_map(|value| ("[ne]=".to_string(), value)),
            string_regex(r"[a-z.^$]{1,6}")
                .unwrap()
                .prop_map(|pattern| ("=".to_string(), format!("/{}/i", pattern))),
            Just(("".to_string(), "".to_string())),
            Just(("=".to_string(), "!".to_string())),
        ]
    }

    /// A raw query string with distinct filter fields and optional paging, projection and sort
    pub fn query_strategy() -> impl Strategy<Value = String> {
        (
            btree_map(field_strategy(), clause_strategy(), 0..4),
            option::of(0u64..500),
            option::of(0u64..500),
            option::of(btree_set(name_strategy(), 1..3)),
            option::of(vec((name_strategy(), any::<bool>()), 1..3)),
        )
            .prop_map(|(clauses, limit, offset, fields, sort)| {
                let mut parts: Vec<String> = clauses
                    .into_iter()
                    .map(|(field, (op, value))| format!("{}{}{}", field, op, value))
                    .collect();
                if let Some(limit) = limit {
                    parts.push(format!("limit={}", limit));
                }
                if let Some(offset) = offset {
                    parts.push(format!("skip={}", offset));
                }
                if let Some(fields) = fields {
                    let names: Vec<String> = fields.into_iter().collect();
                    parts.push(format!("fields={}", names.join(",")));
                }
                if let Some(sort) = sort {
                    let keys: Vec<String> = sort
                        .into_iter()
                        .map(|(field, desc)| {
                            if desc {
                                format!("-{}", field)
                            } else {
                                field
                            }
                        })
                        .collect();
                    parts.push(format!("sort={}", keys.join(",")));
                }
                parts.join("&")
            })
    }

    /// Strategy for generating flat JSON documents
    pub fn document_strategy() -> impl Strategy<Value = Value> {
        hash_map(
            string_regex(r"[a-c]").unwrap(),
            prop_oneof![
                string_regex(r"[a-z]{0,4}").unwrap().prop_map(Value::String),
                (-20i64..20).prop_map(|i| json!(i)),
                any::<bool>().prop_map(Value::Bool),
                Just(Value::Null),
            ],
            0..4,
        )
        .prop_map(|map| json!(map))
    }

    /// Create a JSON schema that matches a given JSON value. It declares no `default`, so the
    /// created document is validated as posted.
    pub fn schema_for_value(value: &Value) -> Value {
        match value {
            Value::Null => json!({"type": "null"}),
            Value::Bool(_) => json!({"type": "boolean"}),
            Value::Number(n) => {
                if n.is_i64() {
                    json!({"type": "integer", "minimum": 0})
                } else {
                    json!({"type": "number"})
                }
            }
            Value::String(_) => json!({"type": "string", "minLength": 1}),
            Value::Array(_) => json!({"type": "array"}),
            Value::Object(obj) => {
                let properties: serde_json::Map<String, Value> = obj
                    .iter()
                    .map(|(k, v)| (k.clone(), schema_for_value(v)))
                    .collect();
                let required: Vec<String> = obj.keys().cloned().collect();
                json!({
                    "type": "object",
                    "properties": properties,
                    "required": required
                })
            }
        }
    }

    /// A schema derived from one document paired with an unrelated document
    pub fn schema_and_document_strategy() -> impl Strategy<Value = (Value, Value)> {
        (document_strategy(), document_strategy())
            .prop_map(|(shape, document)| (schema_for_value(&shape), document))
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn translated_queries_render_back_to_the_same_query(
        raw in strategies::query_strategy()
    ) {
        let query = translate(&raw);
        let rendered = query.to_query_string();
        prop_assert_eq!(translate(&rendered), query, "rendered as {}", rendered);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn create_verdict_matches_registry_validation(
        (schema, document) in strategies::schema_and_document_strategy()
    ) {
        tokio::runtime::Runtime::new().unwrap().block_on(async {
            let mut map = SchemaMap::new();
            map.insert("things".to_string(), Some(schema));
            let registry = SchemaRegistry::register(&map).unwrap();
            let expected = registry.validate("things", &document);

            let server = test_server(&map, CrudOptions::default());
            let response = server.post("/things").json(&document).await;

            if expected.ok {
                response.assert_status_ok();
            } else {
                response.assert_status(StatusCode::BAD_REQUEST);
                let issues: Vec<ValidationIssue> = response.json();
                prop_assert_eq!(issues, expected.errors);
            }
            Ok(())
        }).unwrap()
    }

    #[test]
    fn undeclared_collections_are_rejected(
        (schema, document) in strategies::schema_and_document_strategy(),
        collection in strategies::collection_strategy()
    ) {
        tokio::runtime::Runtime::new().unwrap().block_on(async {
            let mut map = SchemaMap::new();
            map.insert("things".to_string(), Some(schema));
            let server = test_server(&map, CrudOptions::default());

            let response = server.post(&format!("/{}", collection)).json(&document).await;
            response.assert_status(StatusCode::BAD_REQUEST);

            let response = server.get(&format!("/{}", collection)).await;
            response.assert_status_not_found();
            Ok::<(), TestCaseError>(())
        }).unwrap()
    }

    #[test]
    fn open_mode_accepts_every_collection_unvalidated(
        document in strategies::document_strategy(),
        collection in strategies::collection_strategy()
    ) {
        tokio::runtime::Runtime::new().unwrap().block_on(async {
            let server = test_server(&SchemaMap::new(), CrudOptions::default());

            let response = server.post(&format!("/{}", collection)).json(&document).await;
            response.assert_status_ok();
            let mut created: Value = response.json();
            let id = created
                .as_object_mut()
                .and_then(|object| object.remove("_id"));
            prop_assert!(id.is_some());
            prop_assert_eq!(created, document);

            let response = server.get(&format!("/{}", collection)).await;
            response.assert_status_ok();
            Ok(())
        }).unwrap()
    }
}
