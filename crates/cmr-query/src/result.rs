//! Result assembly: projecting matched objects into protocol-facing
//! records.
//!
//! The property-serialization facility is a seam ([`RowRenderer`]) so the
//! protocol layer can swap in its own marshalling; [`JsonRenderer`] is
//! the default and produces one JSON object per match, keyed by property
//! id.

use serde_json::{Map, Value};

use cmr_store::StoredObject;
use cmr_types::{
    PROP_CHANGE_TOKEN, PROP_CREATED_BY, PROP_CREATION_DATE, PROP_LAST_MODIFICATION_DATE,
    PROP_LAST_MODIFIED_BY, PROP_NAME, PROP_OBJECT_ID, PROP_OBJECT_TYPE_ID,
};

use crate::ast::SelectItem;

/// Converts one matched object into an output record.
pub trait RowRenderer {
    fn render(&self, object: &StoredObject, select: &[SelectItem]) -> Value;
}

/// Default renderer: a JSON object per row. `SELECT *` yields the system
/// properties plus the object's own property map; an explicit SELECT list
/// yields exactly the requested ids, with `null` for absent values.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonRenderer;

const SYSTEM_PROPERTIES: [&str; 8] = [
    PROP_NAME,
    PROP_OBJECT_ID,
    PROP_OBJECT_TYPE_ID,
    PROP_CREATED_BY,
    PROP_CREATION_DATE,
    PROP_LAST_MODIFIED_BY,
    PROP_LAST_MODIFICATION_DATE,
    PROP_CHANGE_TOKEN,
];

impl RowRenderer for JsonRenderer {
    fn render(&self, object: &StoredObject, select: &[SelectItem]) -> Value {
        let mut row = Map::new();
        let select_all =
            select.is_empty() || select.contains(&SelectItem::AllProperties);

        if select_all {
            for id in SYSTEM_PROPERTIES {
                if let Some(value) = object.property(id) {
                    row.insert(id.to_string(), value.to_json());
                }
            }
            for (id, value) in &object.core.properties {
                row.insert(id.clone(), value.to_json());
            }
        } else {
            for item in select {
                if let SelectItem::Property(id) = item {
                    let value = object
                        .property(id)
                        .map(|p| p.to_json())
                        .unwrap_or(Value::Null);
                    row.insert(id.clone(), value);
                }
            }
        }
        Value::Object(row)
    }
}

/// The outcome of one query evaluation.
#[derive(Clone, Debug, PartialEq)]
pub struct QueryResult {
    /// One record per match, in result order.
    pub rows: Vec<Value>,
    /// Total number of matching objects.
    pub num_items: usize,
    /// Whether matches exist beyond `rows`. The evaluator never trims the
    /// match list to the paging bounds, so this is always `false`.
    pub has_more_items: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use cmr_store::{ObjectStore, VersioningState};
    use cmr_types::TypedValue;

    fn sample_object() -> StoredObject {
        let store = ObjectStore::new("repo");
        let root = store.root_id().clone();
        let mut properties = HashMap::new();
        properties.insert(
            "doc:rating".to_string(),
            TypedValue::Integer(4).into(),
        );
        let doc = store
            .create_document(
                "a.txt",
                None,
                properties,
                "alice",
                Some(&root),
                None,
                &[],
                &[],
            )
            .unwrap();
        let id = store.persist(doc).unwrap();
        store.get_object_by_id(&id).unwrap()
    }

    #[test]
    fn select_star_includes_system_and_custom_properties() {
        let object = sample_object();
        let row = JsonRenderer.render(&object, &[SelectItem::AllProperties]);
        let map = row.as_object().unwrap();
        assert_eq!(map[PROP_NAME], serde_json::json!("a.txt"));
        assert_eq!(map["doc:rating"], serde_json::json!(4));
        assert!(map.contains_key(PROP_OBJECT_ID));
        assert!(map.contains_key(PROP_CREATION_DATE));
    }

    #[test]
    fn explicit_select_projects_exactly_the_requested_ids() {
        let object = sample_object();
        let row = JsonRenderer.render(
            &object,
            &[
                SelectItem::Property(PROP_NAME.to_string()),
                SelectItem::Property("doc:missing".to_string()),
            ],
        );
        let map = row.as_object().unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map[PROP_NAME], serde_json::json!("a.txt"));
        assert_eq!(map["doc:missing"], Value::Null);
    }

    #[test]
    fn version_series_rows_render_like_documents() {
        let store = ObjectStore::new("repo");
        let root = store.root_id().clone();
        let doc = store
            .create_versioned_document(
                "v.txt",
                None,
                HashMap::new(),
                "alice",
                Some(&root),
                None,
                VersioningState::Major,
                &[],
                &[],
            )
            .unwrap();
        let id = store.persist(doc).unwrap();
        let object = store.get_object_by_id(&id).unwrap();

        let row = JsonRenderer.render(&object, &[]);
        assert_eq!(row.as_object().unwrap()[PROP_NAME], serde_json::json!("v.txt"));
    }
}
