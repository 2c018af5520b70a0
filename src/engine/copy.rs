//! `copy` (spec.md §4.5): read the whole source subtree first, then write
//! a wholly new subtree under fresh ids in one transaction.

use std::collections::HashMap;

use serde_json::Value;

use crate::engine::VfsEngine;
use crate::error::{Result, VfsError};
use crate::event_bus::{Event, EventType};
use crate::model::{content_ref_for, generate_node_id, now_millis, Content, NodeId, NodeTag, VNode};
use crate::path;
use crate::storage::adapter::Mode;

impl VfsEngine {
    /// Duplicates `source` (and, if a directory, its whole subtree) under
    /// `target_user_path` in `source.module_id`. SRS items are not copied —
    /// a copy starts with empty review state.
    pub fn copy(&self, source: &VNode, target_user_path: &str) -> Result<VNode> {
        let target_system_path = path::to_system_path(&source.module_id, target_user_path)?;
        if self
            .find_by_system_path(&source.module_id, &target_system_path)?
            .is_some()
        {
            return Err(VfsError::already_exists(target_system_path));
        }

        // Read phase: load the whole subtree plus every file's content row
        // before any write begins.
        let subtree = self.collect_subtree(source)?;
        let mut contents = HashMap::new();
        for n in &subtree {
            if let Some(content_ref) = &n.content_ref {
                if let Some(row) = self.read_content_row(content_ref)? {
                    contents.insert(n.node_id.clone(), row);
                }
            }
        }
        let mut tag_rows = HashMap::new();
        for n in &subtree {
            let coll = self.storage.get_collection("nodeTags")?;
            let edges = coll.get_all_by_index("by_node", &Value::String(n.node_id.clone()))?;
            tag_rows.insert(n.node_id.clone(), edges);
        }

        // Allocate fresh ids for every node up front so parent references
        // can be rewritten before anything is written.
        let mut id_map: HashMap<NodeId, NodeId> = HashMap::new();
        for n in &subtree {
            id_map.insert(n.node_id.clone(), generate_node_id());
        }

        let old_prefix = source.system_path.clone();
        let now = now_millis();

        let mut tx = self.storage.begin_transaction(
            &["vnodes", "contents", "nodeTags"],
            Mode::ReadWrite,
        )?;

        let mut new_root = None;
        for n in &subtree {
            let new_id = id_map.get(&n.node_id).expect("id allocated above").clone();
            let new_system_path = if n.node_id == source.node_id {
                target_system_path.clone()
            } else {
                let suffix = n.system_path.strip_prefix(&old_prefix).unwrap_or(&n.system_path);
                format!("{target_system_path}{suffix}")
            };
            let parent_id = if n.node_id == source.node_id {
                self.resolve_create_parent(&source.module_id, &target_system_path)?
            } else {
                n.parent_id.as_ref().and_then(|pid| id_map.get(pid).cloned())
            };

            let new_content_ref = if n.is_file() {
                Some(content_ref_for(&new_id))
            } else {
                None
            };

            let mut new_node = VNode {
                node_id: new_id.clone(),
                node_type: n.node_type,
                parent_id,
                name: path::basename(&new_system_path),
                system_path: new_system_path,
                module_id: source.module_id.clone(),
                content_ref: new_content_ref.clone(),
                size: n.size,
                created_at: now,
                modified_at: now,
                metadata: n.metadata.clone(),
                tags: n.tags.clone(),
            };

            if let (Some(old_row), Some(new_ref)) = (contents.get(&n.node_id), &new_content_ref) {
                let content_row = Content {
                    content_ref: new_ref.clone(),
                    node_id: new_id.clone(),
                    bytes: old_row.bytes.clone(),
                    size: old_row.size,
                    created_at: now,
                };
                tx.collection("contents")?
                    .put(serde_json::to_value(&content_row)?)?;
                new_node.size = old_row.size;
            }

            if let Some(edges) = tag_rows.get(&n.node_id) {
                for edge in edges {
                    if let Some(tag_name) = edge.get("tagName").and_then(Value::as_str) {
                        tx.collection("nodeTags")?.put(serde_json::to_value(&NodeTag {
                            node_id: new_id.clone(),
                            tag_name: tag_name.to_string(),
                        })?)?;
                    }
                }
            }

            tx.collection("vnodes")?.put(Self::node_value(&new_node)?)?;
            if n.node_id == source.node_id {
                new_root = Some(new_node);
            }
        }
        tx.commit()?;

        let new_root = new_root.expect("source is always in its own subtree");

        self.events.emit(
            Event::new(EventType::NodeCopied)
                .with_node_id(new_root.node_id.clone())
                .with_path(new_root.system_path.clone())
                .with_module_id(new_root.module_id.clone())
                .with_data(serde_json::json!({ "sourceNodeId": source.node_id })),
        );

        Ok(new_root)
    }
}
