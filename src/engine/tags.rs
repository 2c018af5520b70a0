//! Tag operations (spec.md §4.5).
//!
//! Tag-definition lifecycle: `removeTag`/`setTags` only ever touch edges and
//! `vnode.tags`; a definition in the `tags` collection is deleted solely by
//! the explicit [`VfsEngine::delete_tag_definition`] call (spec.md §9 open
//! question — no implicit ref-counted deletion).

use std::collections::BTreeSet;

use serde_json::Value;

use crate::engine::VfsEngine;
use crate::error::Result;
use crate::event_bus::{Event, EventType};
use crate::model::{now_millis, NodeId, NodeTag, Tag, VNode};
use crate::storage::adapter::{Mode, TransactionHandle};

impl VfsEngine {
    fn edge_key(node_id: &str, tag_name: &str) -> Value {
        Value::Array(vec![
            Value::String(node_id.to_string()),
            Value::String(tag_name.to_string()),
        ])
    }

    /// Creates a `tags` row for `tag_name` within `tx` if none exists yet.
    fn ensure_tag_definition_in_tx(tx: &mut dyn TransactionHandle, tag_name: &str) -> Result<()> {
        let tags = tx.collection("tags")?;
        if tags.get(&Value::String(tag_name.to_string()))?.is_none() {
            tags.put(serde_json::to_value(&Tag {
                name: tag_name.to_string(),
                color: None,
                created_at: now_millis(),
            })?)?;
        }
        Ok(())
    }

    /// Idempotent: no-op if the `(node, name)` edge already exists.
    pub fn add_tag(&self, node: &VNode, name: &str) -> Result<VNode> {
        if node.tags.iter().any(|t| t == name) {
            return Ok(node.clone());
        }

        let mut updated = node.clone();
        updated.tags.push(name.to_string());
        updated.modified_at = now_millis();

        let mut tx = self
            .storage
            .begin_transaction(&["vnodes", "nodeTags", "tags"], Mode::ReadWrite)?;
        Self::ensure_tag_definition_in_tx(tx.as_mut() as &mut dyn TransactionHandle, name)?;
        tx.collection("nodeTags")?.put(serde_json::to_value(&NodeTag {
            node_id: node.node_id.clone(),
            tag_name: name.to_string(),
        })?)?;
        tx.collection("vnodes")?.put(Self::node_value(&updated)?)?;
        tx.commit()?;

        self.emit_node_updated(&updated);
        Ok(updated)
    }

    /// Removes the edge and the name from `vnode.tags`. Does not delete the
    /// tag definition.
    pub fn remove_tag(&self, node: &VNode, name: &str) -> Result<VNode> {
        if !node.tags.iter().any(|t| t == name) {
            return Ok(node.clone());
        }

        let mut updated = node.clone();
        updated.tags.retain(|t| t != name);
        updated.modified_at = now_millis();

        let mut tx = self
            .storage
            .begin_transaction(&["vnodes", "nodeTags"], Mode::ReadWrite)?;
        tx.collection("nodeTags")?
            .delete(&Self::edge_key(&node.node_id, name))?;
        tx.collection("vnodes")?.put(Self::node_value(&updated)?)?;
        tx.commit()?;

        self.emit_node_updated(&updated);
        Ok(updated)
    }

    /// Atomic diff against `node.tags`: adds missing tags, removes dropped
    /// ones, in one transaction. Emits a single `NodeUpdated`.
    pub fn set_tags(&self, node: &VNode, new_tags: &[String]) -> Result<VNode> {
        let deduped: Vec<String> = {
            let mut seen = BTreeSet::new();
            new_tags
                .iter()
                .filter(|t| seen.insert((*t).clone()))
                .cloned()
                .collect()
        };

        let current: BTreeSet<&String> = node.tags.iter().collect();
        let target: BTreeSet<&String> = deduped.iter().collect();

        let mut updated = node.clone();
        updated.tags = deduped.clone();
        updated.modified_at = now_millis();

        let mut tx = self
            .storage
            .begin_transaction(&["vnodes", "nodeTags", "tags"], Mode::ReadWrite)?;
        for added in target.difference(&current) {
            Self::ensure_tag_definition_in_tx(tx.as_mut() as &mut dyn TransactionHandle, added)?;
        }
        for removed in current.difference(&target) {
            tx.collection("nodeTags")?
                .delete(&Self::edge_key(&node.node_id, removed))?;
        }
        for added in target.difference(&current) {
            tx.collection("nodeTags")?.put(serde_json::to_value(&NodeTag {
                node_id: node.node_id.clone(),
                tag_name: (*added).clone(),
            })?)?;
        }
        tx.collection("vnodes")?.put(Self::node_value(&updated)?)?;
        tx.commit()?;

        self.emit_node_updated(&updated);
        Ok(updated)
    }

    /// All-or-nothing batch of `set_tags`-style diffs. Emits a single
    /// `NodesBatchUpdated` event instead of one per node.
    pub fn batch_set_tags(&self, updates: &[(NodeId, Vec<String>)]) -> Result<()> {
        let mut nodes = Vec::with_capacity(updates.len());
        for (id, tags) in updates {
            nodes.push((self.require_node(id)?, tags.clone()));
        }

        let mut tx = self
            .storage
            .begin_transaction(&["vnodes", "nodeTags", "tags"], Mode::ReadWrite)?;
        let mut affected = Vec::with_capacity(nodes.len());

        for (node, new_tags) in &nodes {
            let deduped: Vec<String> = {
                let mut seen = BTreeSet::new();
                new_tags.iter().filter(|t| seen.insert((*t).clone())).cloned().collect()
            };
            let current: BTreeSet<&String> = node.tags.iter().collect();
            let target: BTreeSet<&String> = deduped.iter().collect();

            for added in target.difference(&current) {
                Self::ensure_tag_definition_in_tx(tx.as_mut() as &mut dyn TransactionHandle, added)?;
            }
            for removed in current.difference(&target) {
                tx.collection("nodeTags")?
                    .delete(&Self::edge_key(&node.node_id, removed))?;
            }
            for added in target.difference(&current) {
                tx.collection("nodeTags")?.put(serde_json::to_value(&NodeTag {
                    node_id: node.node_id.clone(),
                    tag_name: (*added).clone(),
                })?)?;
            }

            let mut updated = node.clone();
            updated.tags = deduped;
            updated.modified_at = now_millis();
            tx.collection("vnodes")?.put(Self::node_value(&updated)?)?;
            affected.push(updated.node_id.clone());
        }
        tx.commit()?;

        self.events.emit(
            Event::new(EventType::NodesBatchUpdated)
                .with_data(serde_json::json!({ "nodeIds": affected })),
        );
        Ok(())
    }

    /// Deletes a tag definition. Per spec.md §9, this is only ever explicit
    /// — ordinary tag removal never deletes the definition implicitly.
    pub fn delete_tag_definition(&self, name: &str) -> Result<()> {
        let mut tx = self.storage.begin_transaction(&["tags"], Mode::ReadWrite)?;
        tx.collection("tags")?.delete(&Value::String(name.to_string()))?;
        tx.commit()
    }

    fn emit_node_updated(&self, node: &VNode) {
        self.events.emit(
            Event::new(EventType::NodeUpdated)
                .with_node_id(node.node_id.clone())
                .with_path(node.system_path.clone())
                .with_module_id(node.module_id.clone()),
        );
    }
}
