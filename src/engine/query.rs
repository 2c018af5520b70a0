//! `readdir` and `searchNodes` (spec.md §4.5).

use serde_json::Value;

use crate::engine::VfsEngine;
use crate::error::Result;
use crate::model::{NodeId, NodeType, VNode};
use crate::storage::adapter::QueryOptions;

/// Restricts [`SearchOptions`] to one module, every module, or an explicit
/// list of modules.
#[derive(Debug, Clone, Default)]
pub enum SearchScope {
    #[default]
    All,
    Module(String),
    Modules(Vec<String>),
}

/// Filters for [`VfsEngine::search_nodes`]. Ordering is unspecified; callers
/// must not depend on result order (spec.md §4.5).
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    pub node_type: Option<NodeType>,
    pub name_contains: Option<String>,
    pub tags: Vec<String>,
    pub scope: SearchScope,
    pub limit: Option<usize>,
}

impl VfsEngine {
    /// Direct children of `directory`, in no particular order.
    pub fn readdir(&self, directory: &VNode) -> Result<Vec<VNode>> {
        self.children_of(&directory.node_id)
    }

    /// Filters every `vnodes` row by type, name substring (case-insensitive),
    /// tag intersection (all of `options.tags` required), and module scope.
    pub fn search_nodes(&self, options: &SearchOptions) -> Result<Vec<VNode>> {
        let coll = self.storage.get_collection("vnodes")?;
        let rows = coll.query(&QueryOptions::new())?;

        let name_needle = options.name_contains.as_ref().map(|s| s.to_lowercase());
        let mut out = Vec::new();

        for row in rows {
            let node = Self::to_node(row)?;

            if let Some(t) = options.node_type {
                if node.node_type != t {
                    continue;
                }
            }
            if let Some(needle) = &name_needle {
                if !node.name.to_lowercase().contains(needle.as_str()) {
                    continue;
                }
            }
            if !options.tags.is_empty() && !options.tags.iter().all(|t| node.tags.contains(t)) {
                continue;
            }
            if !scope_matches(&options.scope, &node.module_id) {
                continue;
            }

            out.push(node);
            if let Some(limit) = options.limit {
                if out.len() >= limit {
                    break;
                }
            }
        }

        Ok(out)
    }

    /// Nodes tagged with `tag_name`, via the `nodeTags` `by_tag` index.
    pub fn nodes_with_tag(&self, tag_name: &str) -> Result<Vec<NodeId>> {
        let coll = self.storage.get_collection("nodeTags")?;
        let edges = coll.get_all_by_index("by_tag", &Value::String(tag_name.to_string()))?;
        Ok(edges
            .into_iter()
            .filter_map(|row| row.get("nodeId").and_then(Value::as_str).map(str::to_string))
            .collect())
    }
}

fn scope_matches(scope: &SearchScope, module_id: &str) -> bool {
    match scope {
        SearchScope::All => true,
        SearchScope::Module(m) => m == module_id,
        SearchScope::Modules(ms) => ms.iter().any(|m| m == module_id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_all_matches_everything() {
        assert!(scope_matches(&SearchScope::All, "notes"));
    }

    #[test]
    fn scope_module_matches_only_named_module() {
        assert!(scope_matches(&SearchScope::Module("notes".into()), "notes"));
        assert!(!scope_matches(&SearchScope::Module("notes".into()), "other"));
    }

    #[test]
    fn scope_modules_matches_any_listed() {
        let scope = SearchScope::Modules(vec!["a".into(), "b".into()]);
        assert!(scope_matches(&scope, "b"));
        assert!(!scope_matches(&scope, "c"));
    }
}
