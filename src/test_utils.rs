#[cfg(test)]
pub mod test_helpers {
    use std::sync::Arc;

    use serde_json::json;

    use crate::{CrudOptions, DataStore, InMemoryDataStore, OperationDispatcher, SchemaMap};

    /// Creates a test data store instance
    pub fn test_data_store() -> Arc<dyn DataStore> {
        Arc::new(InMemoryDataStore::new())
    }

    /// Schema map with a validating `users` collection and an unvalidated `notes` collection
    pub fn users_and_notes() -> SchemaMap {
        let mut map = SchemaMap::new();
        map.insert(
            "users".to_string(),
            Some(json!({
                "type": "object",
                "properties": {
                    "email": {"type": "string"},
                    "age": {"type": "integer"},
                    "role": {"type": "string", "default": "member"}
                },
                "required": ["email"]
            })),
        );
        map.insert("notes".to_string(), None);
        map
    }

    /// Creates a dispatcher over a fresh in-memory store
    pub fn test_dispatcher(map: &SchemaMap) -> OperationDispatcher {
        OperationDispatcher::new(test_data_store(), map, CrudOptions::default())
            .expect("test schema map should compile")
    }
}
