//! `move` and `batchMove` (spec.md §4.5).

use std::collections::HashSet;

use serde_json::Value;

use crate::engine::VfsEngine;
use crate::error::{Result, VfsError};
use crate::event_bus::{Event, EventType};
use crate::model::{now_millis, NodeId, VNode};
use crate::path;
use crate::storage::adapter::Mode;

impl VfsEngine {
    /// Renames/reparents `node` within its own module.
    pub fn move_node(&self, node: &VNode, new_user_path: &str) -> Result<VNode> {
        let new_system_path = path::to_system_path(&node.module_id, new_user_path)?;
        if new_system_path != node.system_path
            && self
                .find_by_system_path(&node.module_id, &new_system_path)?
                .is_some()
        {
            return Err(VfsError::already_exists(new_system_path));
        }

        let subtree = self.collect_subtree(node)?;
        let old_prefix = node.system_path.clone();
        let parent_id = self.resolve_create_parent(&node.module_id, &new_system_path)?;
        let now = now_millis();

        let mut tx = self.storage.begin_transaction(&["vnodes"], Mode::ReadWrite)?;
        for n in &subtree {
            let mut updated = n.clone();
            if n.node_id == node.node_id {
                updated.parent_id = parent_id.clone();
                updated.name = path::basename(&new_system_path);
                updated.system_path = new_system_path.clone();
            } else {
                let suffix = n
                    .system_path
                    .strip_prefix(&old_prefix)
                    .unwrap_or(&n.system_path);
                updated.system_path = format!("{new_system_path}{suffix}");
            }
            updated.modified_at = now;
            tx.collection("vnodes")?.put(Self::node_value(&updated)?)?;
        }
        tx.commit()?;

        let moved = self
            .get_node(&node.node_id)?
            .ok_or_else(|| VfsError::not_found(format!("node {}", node.node_id)))?;

        self.events.emit(
            Event::new(EventType::NodeMoved)
                .with_node_id(moved.node_id.clone())
                .with_path(moved.system_path.clone())
                .with_module_id(moved.module_id.clone())
                .with_data(serde_json::json!({
                    "oldPath": old_prefix,
                    "newPath": new_system_path,
                })),
        );

        Ok(moved)
    }

    /// Moves a batch of nodes (possibly across modules) under
    /// `target_parent_id`, rewriting descendant system paths, module ids,
    /// and any SRS items' module ids in one transaction.
    pub fn batch_move(&self, node_ids: &[NodeId], target_parent_id: &NodeId) -> Result<()> {
        let target_parent = self.require_node(target_parent_id)?;
        if !target_parent.is_directory() {
            return Err(VfsError::invalid_operation("move target is not a directory"));
        }

        let mut nodes = Vec::with_capacity(node_ids.len());
        for id in node_ids {
            nodes.push(self.require_node(id)?);
        }

        for node in &nodes {
            if node.node_id == *target_parent_id {
                return Err(VfsError::invalid_operation("cannot move a node into itself"));
            }
            let mut ancestor = target_parent.parent_id.clone();
            while let Some(ancestor_id) = ancestor {
                if ancestor_id == node.node_id {
                    return Err(VfsError::invalid_operation(
                        "cannot move a node into its own descendant",
                    ));
                }
                ancestor = self.get_node(&ancestor_id)?.and_then(|n| n.parent_id);
            }
        }

        let mut tx = self
            .storage
            .begin_transaction(&["vnodes", "srsItems"], Mode::ReadWrite)?;
        let now = now_millis();
        let moved_ids: HashSet<NodeId> = nodes.iter().map(|n| n.node_id.clone()).collect();

        for node in &nodes {
            let subtree = self.collect_subtree(node)?;
            let old_prefix = node.system_path.clone();
            let new_system_path = format!("{}/{}", parent_system_path(&target_parent), node.name);

            for n in &subtree {
                let mut updated = n.clone();
                updated.module_id = target_parent.module_id.clone();
                if n.node_id == node.node_id {
                    updated.parent_id = Some(target_parent.node_id.clone());
                    updated.system_path = new_system_path.clone();
                } else {
                    let suffix = n.system_path.strip_prefix(&old_prefix).unwrap_or(&n.system_path);
                    updated.system_path = format!("{new_system_path}{suffix}");
                }
                updated.modified_at = now;
                tx.collection("vnodes")?.put(Self::node_value(&updated)?)?;

                let srs_rows = tx
                    .collection("srsItems")?
                    .get_all_by_index("by_node", &Value::String(n.node_id.clone()))?;
                for mut row in srs_rows {
                    if let Value::Object(map) = &mut row {
                        map.insert(
                            "moduleId".to_string(),
                            Value::String(target_parent.module_id.clone()),
                        );
                    }
                    tx.collection("srsItems")?.put(row)?;
                }
            }
        }
        tx.commit()?;

        self.events.emit(
            Event::new(EventType::NodesBatchMoved)
                .with_module_id(target_parent.module_id.clone())
                .with_data(serde_json::json!({ "nodeIds": moved_ids })),
        );

        Ok(())
    }
}

fn parent_system_path(parent: &VNode) -> String {
    if parent.system_path == "/" {
        String::new()
    } else {
        parent.system_path.clone()
    }
}
