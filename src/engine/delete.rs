//! Cascading delete (spec.md §4.5 `unlink`).

use serde_json::Value;

use crate::engine::VfsEngine;
use crate::error::{Result, VfsError};
use crate::event_bus::{Event, EventType};
use crate::model::{NodeId, VNode};
use crate::storage::adapter::{Mode, TransactionHandle};

impl VfsEngine {
    /// DFS-collects `node` and every descendant, root first.
    pub(crate) fn collect_subtree(&self, node: &VNode) -> Result<Vec<VNode>> {
        let mut out = vec![node.clone()];
        if node.is_directory() {
            let children = self.children_of(&node.node_id)?;
            for child in children {
                out.extend(self.collect_subtree(&child)?);
            }
        }
        Ok(out)
    }

    pub(crate) fn children_of(&self, node_id: &NodeId) -> Result<Vec<VNode>> {
        let coll = self.storage.get_collection("vnodes")?;
        let rows = coll.get_all_by_index("by_parent", &Value::String(node_id.clone()))?;
        rows.into_iter().map(Self::to_node).collect()
    }

    /// Deletes `node`; if it is a non-empty directory, `recursive` must be
    /// `true`. Returns the ids removed, root first.
    pub fn unlink(&self, node: &VNode, recursive: bool) -> Result<Vec<NodeId>> {
        let subtree = self.collect_subtree(node)?;

        if node.is_directory() && subtree.len() > 1 && !recursive {
            return Err(VfsError::invalid_operation(
                "directory is not empty; pass recursive=true",
            ));
        }

        if subtree.iter().any(|n| n.is_protected()) {
            return Err(VfsError::PermissionDenied(format!(
                "{} is protected",
                node.system_path
            )));
        }

        let mut tx = self.storage.begin_transaction(
            &["vnodes", "contents", "nodeTags", "srsItems"],
            Mode::ReadWrite,
        )?;

        let mut removed_ids = Vec::with_capacity(subtree.len());
        for n in &subtree {
            self.middlewares
                .read()
                .before_delete(n, tx.as_ref() as &dyn TransactionHandle)?;

            if let Some(content_ref) = &n.content_ref {
                tx.collection("contents")?
                    .delete(&Value::String(content_ref.clone()))?;
            }

            let edges = tx
                .collection("nodeTags")?
                .get_all_by_index("by_node", &Value::String(n.node_id.clone()))?;
            for edge in edges {
                if let (Some(node_id), Some(tag_name)) = (
                    edge.get("nodeId").and_then(Value::as_str),
                    edge.get("tagName").and_then(Value::as_str),
                ) {
                    let key = Value::Array(vec![
                        Value::String(node_id.to_string()),
                        Value::String(tag_name.to_string()),
                    ]);
                    tx.collection("nodeTags")?.delete(&key)?;
                }
            }

            let srs_rows = tx
                .collection("srsItems")?
                .get_all_by_index("by_node", &Value::String(n.node_id.clone()))?;
            for row in srs_rows {
                if let (Some(node_id), Some(cloze_id)) = (
                    row.get("nodeId").and_then(Value::as_str),
                    row.get("clozeId").and_then(Value::as_str),
                ) {
                    let key = Value::Array(vec![
                        Value::String(node_id.to_string()),
                        Value::String(cloze_id.to_string()),
                    ]);
                    tx.collection("srsItems")?.delete(&key)?;
                }
            }

            tx.collection("vnodes")?
                .delete(&Value::String(n.node_id.clone()))?;

            self.middlewares
                .read()
                .after_delete(n, tx.as_ref() as &dyn TransactionHandle)?;

            removed_ids.push(n.node_id.clone());
        }

        tx.commit()?;

        self.events.emit(
            Event::new(EventType::NodeDeleted)
                .with_node_id(node.node_id.clone())
                .with_path(node.system_path.clone())
                .with_module_id(node.module_id.clone())
                .with_data(serde_json::json!({ "removedIds": removed_ids })),
        );

        Ok(removed_ids)
    }
}
