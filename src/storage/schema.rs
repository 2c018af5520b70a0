//! Collection/index schema declarations (spec.md §4.1 schema table).
//!
//! Both the memory adapter and the persistent adapter build their index
//! structures from the same [`SCHEMAS`] table, so adding a collection or
//! index only happens in one place.

use std::sync::{Arc, OnceLock};

use serde_json::Value;

/// Extracts the (possibly composite) key a row contributes to an index.
/// Composite keys are `Value::Array`s; [`value_sort_key`] flattens them
/// into a single sortable string.
pub type KeyFn = Arc<dyn Fn(&Value) -> Value + Send + Sync>;

#[derive(Clone)]
pub struct IndexSpec {
    pub name: String,
    pub key_fn: KeyFn,
    pub unique: bool,
}

#[derive(Clone)]
pub struct CollectionSchema {
    pub name: String,
    pub primary_key: KeyFn,
    pub indexes: Vec<IndexSpec>,
}

fn field(name: &'static str) -> KeyFn {
    Arc::new(move |row: &Value| row.get(name).cloned().unwrap_or(Value::Null))
}

fn composite(names: &'static [&'static str]) -> KeyFn {
    Arc::new(move |row: &Value| {
        Value::Array(
            names
                .iter()
                .map(|n| row.get(*n).cloned().unwrap_or(Value::Null))
                .collect(),
        )
    })
}

/// Encodes a (possibly composite) key value as a single string that sorts
/// the same way the underlying values would: numbers are zero-padded to 20
/// digits (sufficient for any `u64`), strings pass through, arrays join
/// their members' encodings with a NUL separator so composite keys compare
/// component-by-component.
pub fn value_sort_key(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Number(n) => {
            if let Some(u) = n.as_u64() {
                format!("{u:020}")
            } else {
                format!("{n}")
            }
        }
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        Value::Array(items) => items
            .iter()
            .map(value_sort_key)
            .collect::<Vec<_>>()
            .join("\u{0}"),
        Value::Object(_) => v.to_string(),
    }
}

/// Every collection's schema, built once and shared.
pub fn schemas() -> &'static [CollectionSchema] {
    static CELL: OnceLock<Vec<CollectionSchema>> = OnceLock::new();
    CELL.get_or_init(|| vec![
        CollectionSchema {
            name: "vnodes".to_string(),
            primary_key: field("nodeId"),
            indexes: vec![
                IndexSpec {
                    name: "by_module_path".to_string(),
                    key_fn: composite(&["moduleId", "systemPath"]),
                    unique: true,
                },
                IndexSpec {
                    name: "by_parent".to_string(),
                    key_fn: field("parentId"),
                    unique: false,
                },
                IndexSpec {
                    name: "by_module".to_string(),
                    key_fn: field("moduleId"),
                    unique: false,
                },
                IndexSpec {
                    name: "by_type".to_string(),
                    key_fn: field("type"),
                    unique: false,
                },
            ],
        },
        CollectionSchema {
            name: "contents".to_string(),
            primary_key: field("contentRef"),
            indexes: vec![IndexSpec {
                name: "by_node".to_string(),
                key_fn: field("nodeId"),
                unique: true,
            }],
        },
        CollectionSchema {
            name: "modules".to_string(),
            primary_key: field("name"),
            indexes: vec![],
        },
        CollectionSchema {
            name: "tags".to_string(),
            primary_key: field("name"),
            indexes: vec![],
        },
        CollectionSchema {
            name: "nodeTags".to_string(),
            // The spec describes an auto key with a unique (nodeId,
            // tagName) index; using that pair directly as the primary key
            // gives the same uniqueness guarantee without a surrogate
            // counter (see DESIGN.md).
            primary_key: composite(&["nodeId", "tagName"]),
            indexes: vec![
                IndexSpec {
                    name: "by_node".to_string(),
                    key_fn: field("nodeId"),
                    unique: false,
                },
                IndexSpec {
                    name: "by_tag".to_string(),
                    key_fn: field("tagName"),
                    unique: false,
                },
            ],
        },
        CollectionSchema {
            name: "srsItems".to_string(),
            primary_key: composite(&["nodeId", "clozeId"]),
            indexes: vec![
                IndexSpec {
                    name: "by_node".to_string(),
                    key_fn: field("nodeId"),
                    unique: false,
                },
                IndexSpec {
                    name: "by_module".to_string(),
                    key_fn: field("moduleId"),
                    unique: false,
                },
                IndexSpec {
                    name: "by_due".to_string(),
                    key_fn: field("dueAt"),
                    unique: false,
                },
            ],
        },
    ])
}

/// Names every collection the schema table declares, in order — the list
/// `StorageAdapter::begin_transaction` callers pass when they need every
/// collection at once (e.g. `unlink`'s cascading delete).
pub const ALL_COLLECTIONS: &[&str] =
    &["vnodes", "contents", "modules", "tags", "nodeTags", "srsItems"];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_sort_keys_preserve_order() {
        let a = value_sort_key(&Value::from(5u64));
        let b = value_sort_key(&Value::from(10u64));
        assert!(a < b);
    }

    #[test]
    fn composite_keys_are_stable() {
        let row = serde_json::json!({"moduleId": "notes", "systemPath": "/notes/a.md"});
        let key_fn = composite(&["moduleId", "systemPath"]);
        let k1 = value_sort_key(&key_fn(&row));
        let k2 = value_sort_key(&key_fn(&row));
        assert_eq!(k1, k2);
    }
}
