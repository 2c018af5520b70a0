//! Data model for the virtual file system.
//!
//! This module defines the core entities the engine operates on.
//!
//! # Key types
//!
//! - [`VNode`] — the inode analogue: a file or directory.
//! - [`Content`] — the bytes/text owned by exactly one file `VNode`.
//! - [`Module`] — a named top-level namespace.
//! - [`Tag`] / [`NodeTag`] — the global tag registry and its edges.
//! - [`SrsItem`] — a spaced-repetition card state row.

use std::time::{SystemTime, UNIX_EPOCH};

use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Opaque node identifier: a timestamp prefix plus a random tail, so ids are
/// practically unique without a central counter (no multi-writer
/// coordination is assumed — see spec.md §1 Non-goals).
pub type NodeId = String;

/// `"content:" + nodeId"`, unique per file `VNode` (invariant I2).
pub type ContentRef = String;

/// Generates a fresh [`NodeId`].
pub fn generate_node_id() -> NodeId {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0);
    let tail = rand::thread_rng().next_u64();
    format!("{millis:x}-{tail:016x}")
}

/// Derives the content record key for a node, per spec.md §4.5 step 3.
pub fn content_ref_for(node_id: &NodeId) -> ContentRef {
    format!("content:{node_id}")
}

/// Current unix-millis timestamp, used for `createdAt`/`modifiedAt` fields.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// File or directory.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    #[default]
    File,
    Directory,
}

/// The inode analogue: a file or directory node.
///
/// Invariants (spec.md §3):
/// - (I1) `(module_id, system_path)` is unique across the whole store.
/// - (I2) a file's `content_ref` is unique.
/// - (I3) if `parent_id` is `Some`, the parent exists, is a directory, and
///   `system_path == parent.system_path + "/" + name` (root is `/<module>`).
/// - (I4) `module_id` equals the ancestor chain's root module.
/// - (I5) `metadata.isProtected == true` blocks ordinary deletion.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VNode {
    pub node_id: NodeId,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub parent_id: Option<NodeId>,
    pub name: String,
    /// Absolute, canonical system path: `/<moduleId>/<segments...>`.
    pub system_path: String,
    pub module_id: String,
    /// Files only; `None` for directories and for files with no content yet.
    pub content_ref: Option<ContentRef>,
    pub size: u64,
    pub created_at: u64,
    pub modified_at: u64,
    /// Open mapping of derived (middleware) and user attributes.
    pub metadata: Map<String, Value>,
    /// Ordered, deduplicated tag names.
    pub tags: Vec<String>,
}

impl VNode {
    pub fn is_directory(&self) -> bool {
        self.node_type == NodeType::Directory
    }

    pub fn is_file(&self) -> bool {
        self.node_type == NodeType::File
    }

    pub fn is_protected(&self) -> bool {
        matches!(self.metadata.get("isProtected"), Some(Value::Bool(true)))
    }

    pub fn task_count(&self) -> Option<u64> {
        self.metadata.get("taskCount").and_then(Value::as_u64)
    }

    pub fn cloze_count(&self) -> Option<u64> {
        self.metadata.get("clozeCount").and_then(Value::as_u64)
    }

    pub fn mermaid_count(&self) -> Option<u64> {
        self.metadata.get("mermaidCount").and_then(Value::as_u64)
    }

    pub fn is_asset_dir(&self) -> bool {
        matches!(self.metadata.get("isAssetDir"), Some(Value::Bool(true)))
    }

    pub fn owner_id(&self) -> Option<&str> {
        self.metadata.get("ownerId").and_then(Value::as_str)
    }

    pub fn mime_type(&self) -> Option<&str> {
        self.metadata.get("mimeType").and_then(Value::as_str)
    }

    pub fn icon(&self) -> Option<&str> {
        self.metadata.get("icon").and_then(Value::as_str)
    }

    /// Merges `derived` into `self.metadata`, later-wins, per spec.md §4.4:
    /// middleware `onAfterWrite` outputs are merged in invocation order
    /// with object-spread semantics.
    pub fn merge_metadata(&mut self, derived: Map<String, Value>) {
        for (k, v) in derived {
            self.metadata.insert(k, v);
        }
    }
}

/// Owned by exactly one `VNode`; lifetime equals that node's lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Content {
    pub content_ref: ContentRef,
    pub node_id: NodeId,
    pub bytes: ContentBytes,
    pub size: u64,
    pub created_at: u64,
}

/// Text or binary payload. `spec.md` describes content as `string | binary
/// blob`; both are modeled explicitly rather than collapsing to `Vec<u8>`
/// so text round-trips without a UTF-8 validation pass on every read.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data")]
pub enum ContentBytes {
    Text(String),
    Binary(Vec<u8>),
}

impl ContentBytes {
    pub fn len(&self) -> usize {
        match self {
            ContentBytes::Text(s) => s.len(),
            ContentBytes::Binary(b) => b.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the content as text, lossily decoding binary payloads. Used
    /// by `VfsEngine::read` which returns `String` per spec.md §4.5.
    pub fn as_text(&self) -> String {
        match self {
            ContentBytes::Text(s) => s.clone(),
            ContentBytes::Binary(b) => String::from_utf8_lossy(b).into_owned(),
        }
    }
}

impl From<String> for ContentBytes {
    fn from(s: String) -> Self {
        ContentBytes::Text(s)
    }
}

impl From<&str> for ContentBytes {
    fn from(s: &str) -> Self {
        ContentBytes::Text(s.to_string())
    }
}

impl From<Vec<u8>> for ContentBytes {
    fn from(b: Vec<u8>) -> Self {
        ContentBytes::Binary(b)
    }
}

/// A named top-level namespace. Its root is a directory `VNode` at
/// `/<name>` with `parent_id = None`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Module {
    pub name: String,
    pub root_node_id: NodeId,
    pub description: Option<String>,
    pub is_protected: Option<bool>,
    pub created_at: u64,
}

/// A global tag definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tag {
    pub name: String,
    pub color: Option<String>,
    pub created_at: u64,
}

/// `(nodeId, tagName)` edge with a unique composite key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "camelCase")]
pub struct NodeTag {
    pub node_id: NodeId,
    pub tag_name: String,
}

/// Spaced-repetition card state, keyed by `(nodeId, clozeId)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SrsItem {
    pub node_id: NodeId,
    pub cloze_id: String,
    pub module_id: String,
    pub due_at: u64,
    pub interval: u32,
    pub ease: f64,
    pub review_count: u32,
    pub last_reviewed_at: Option<u64>,
}

impl SrsItem {
    pub fn key(&self) -> (NodeId, String) {
        (self.node_id.clone(), self.cloze_id.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_ids_are_unique_and_monotonic_prefix() {
        let a = generate_node_id();
        let b = generate_node_id();
        assert_ne!(a, b);
        assert!(a.contains('-'));
    }

    #[test]
    fn content_ref_matches_convention() {
        assert_eq!(content_ref_for(&"abc".to_string()), "content:abc");
    }

    #[test]
    fn metadata_round_trips_unknown_keys() {
        let mut node = sample_node();
        node.metadata
            .insert("somethingCustom".to_string(), Value::String("x".into()));
        node.merge_metadata(Map::from_iter([(
            "taskCount".to_string(),
            Value::from(3),
        )]));
        assert_eq!(node.task_count(), Some(3));
        assert_eq!(
            node.metadata.get("somethingCustom"),
            Some(&Value::String("x".into()))
        );
    }

    fn sample_node() -> VNode {
        VNode {
            node_id: "n1".into(),
            node_type: NodeType::File,
            parent_id: None,
            name: "a.md".into(),
            system_path: "/notes/a.md".into(),
            module_id: "notes".into(),
            content_ref: Some("content:n1".into()),
            size: 0,
            created_at: 0,
            modified_at: 0,
            metadata: Map::new(),
            tags: Vec::new(),
        }
    }
}
