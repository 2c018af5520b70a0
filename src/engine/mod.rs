//! VFS Core: node CRUD, traversal, move/copy/delete, tag and SRS operations
//! (spec.md §4.5) atop the storage adapter, path resolver, middleware
//! registry, and event bus.
//!
//! Every public operation either commits a single transaction and emits
//! exactly one primary event, or returns an error and leaves the store
//! untouched — no operation here emits on a path that also returns `Err`.

mod copy;
mod delete;
mod mv;
mod query;
mod srs;
mod tags;

pub use query::{SearchOptions, SearchScope};

use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;

use crate::error::{Result, VfsError};
use crate::event_bus::{Event, EventBus, EventType};
use crate::middleware::MiddlewareRegistry;
use crate::model::{content_ref_for, generate_node_id, now_millis, Content, ContentBytes, NodeId, NodeType, VNode};
use crate::path;
use crate::storage::adapter::{Mode, StorageAdapter, TransactionHandle};

/// Options accepted by [`VfsEngine::create_node`].
#[derive(Debug, Clone, Default)]
pub struct CreateNodeOptions {
    pub module: String,
    pub path: String,
    pub node_type: NodeType,
    pub content: Option<String>,
    pub metadata: Option<serde_json::Map<String, Value>>,
}

/// Orchestrates every VFS operation atop a [`StorageAdapter`], the
/// [`MiddlewareRegistry`], and the [`EventBus`]. Cheap to clone: internal
/// state is `Arc`-shared.
#[derive(Clone)]
pub struct VfsEngine {
    pub(crate) storage: Arc<dyn StorageAdapter>,
    pub(crate) events: EventBus,
    pub(crate) middlewares: Arc<RwLock<MiddlewareRegistry>>,
}

impl VfsEngine {
    pub fn new(storage: Arc<dyn StorageAdapter>, events: EventBus, middlewares: Arc<RwLock<MiddlewareRegistry>>) -> Self {
        Self {
            storage,
            events,
            middlewares,
        }
    }

    pub fn storage(&self) -> &Arc<dyn StorageAdapter> {
        &self.storage
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.events
    }

    pub fn middleware_registry(&self) -> &Arc<RwLock<MiddlewareRegistry>> {
        &self.middlewares
    }

    pub(crate) fn to_node(value: Value) -> Result<VNode> {
        Ok(serde_json::from_value(value)?)
    }

    pub(crate) fn node_value(node: &VNode) -> Result<Value> {
        Ok(serde_json::to_value(node)?)
    }

    /// Looks a node up by id, outside any transaction.
    pub fn get_node(&self, node_id: &NodeId) -> Result<Option<VNode>> {
        let coll = self.storage.get_collection("vnodes")?;
        match coll.get(&Value::String(node_id.clone()))? {
            Some(v) => Ok(Some(Self::to_node(v)?)),
            None => Ok(None),
        }
    }

    fn require_node(&self, node_id: &NodeId) -> Result<VNode> {
        self.get_node(node_id)?
            .ok_or_else(|| VfsError::not_found(format!("node {node_id}")))
    }

    /// Resolves a module-relative path to a node id (spec.md §4.2).
    pub fn resolve(&self, module: &str, user_path: &str) -> Result<Option<NodeId>> {
        let system_path = path::to_system_path(module, user_path)?;
        Ok(self
            .find_by_system_path(module, &system_path)?
            .map(|n| n.node_id))
    }

    /// Resolves the parent directory of a module-relative path.
    pub fn resolve_parent(&self, module: &str, user_path: &str) -> Result<Option<NodeId>> {
        let system_path = path::to_system_path(module, user_path)?;
        let parent_path = path::dirname(&system_path);
        if parent_path == "/" {
            return Ok(None);
        }
        Ok(self
            .find_by_system_path(module, &parent_path)?
            .map(|n| n.node_id))
    }

    pub(crate) fn find_by_system_path(&self, module: &str, system_path: &str) -> Result<Option<VNode>> {
        let coll = self.storage.get_collection("vnodes")?;
        let key = Value::Array(vec![
            Value::String(module.to_string()),
            Value::String(system_path.to_string()),
        ]);
        match coll.get_by_index("by_module_path", &key)? {
            Some(v) => Ok(Some(Self::to_node(v)?)),
            None => Ok(None),
        }
    }

    fn read_content_row(&self, content_ref: &str) -> Result<Option<Content>> {
        let coll = self.storage.get_collection("contents")?;
        match coll.get(&Value::String(content_ref.to_string()))? {
            Some(v) => Ok(Some(serde_json::from_value(v)?)),
            None => Ok(None),
        }
    }

    /// Reads a file's content. Directories reject with `InvalidOperation`.
    pub fn read(&self, node: &VNode) -> Result<String> {
        if node.is_directory() {
            return Err(VfsError::invalid_operation("cannot read a directory"));
        }
        self.middlewares.read().before_read(node)?;
        let content = match &node.content_ref {
            Some(content_ref) => match self.read_content_row(content_ref)? {
                Some(row) => row.bytes.as_text(),
                None => String::new(),
            },
            None => String::new(),
        };
        self.middlewares.read().after_read(node, &content)?;
        Ok(content)
    }

    /// Creates a node (spec.md §4.5 `createNode`).
    pub fn create_node(&self, options: CreateNodeOptions) -> Result<VNode> {
        let system_path = path::to_system_path(&options.module, &options.path)?;

        if self.find_by_system_path(&options.module, &system_path)?.is_some() {
            return Err(VfsError::already_exists(system_path));
        }

        let parent_id = self.resolve_create_parent(&options.module, &system_path)?;

        let node_id = generate_node_id();
        let content_ref = match options.node_type {
            NodeType::File => Some(content_ref_for(&node_id)),
            NodeType::Directory => None,
        };
        let now = now_millis();
        let mut node = VNode {
            node_id: node_id.clone(),
            node_type: options.node_type,
            parent_id,
            name: path::basename(&system_path),
            system_path: system_path.clone(),
            module_id: options.module.clone(),
            content_ref: content_ref.clone(),
            size: 0,
            created_at: now,
            modified_at: now,
            metadata: options.metadata.unwrap_or_default(),
            tags: Vec::new(),
        };

        let raw_content = options.content.unwrap_or_default();
        if node.is_file() {
            self.middlewares.read().validate(&node, Some(&raw_content))?;
        }

        let mut tx = self
            .storage
            .begin_transaction(&["vnodes", "contents"], Mode::ReadWrite)?;

        if node.is_file() {
            let processed = self.middlewares.read().before_write(
                &node,
                raw_content,
                tx.as_ref() as &dyn TransactionHandle,
            )?;
            let size = processed.len() as u64;
            let content_row = Content {
                content_ref: content_ref.clone().expect("file has contentRef"),
                node_id: node_id.clone(),
                bytes: ContentBytes::from(processed.clone()),
                size,
                created_at: now,
            };
            tx.collection("contents")?
                .put(serde_json::to_value(&content_row)?)?;

            let derived = self.middlewares.read().after_write(
                &node,
                &processed,
                tx.as_ref() as &dyn TransactionHandle,
            )?;
            node.merge_metadata(derived);
            node.size = size;
        }

        tx.collection("vnodes")?.put(Self::node_value(&node)?)?;
        tx.commit()?;

        self.events.emit(
            Event::new(EventType::NodeCreated)
                .with_node_id(node.node_id.clone())
                .with_path(system_path)
                .with_module_id(node.module_id.clone()),
        );

        Ok(node)
    }

    fn resolve_create_parent(&self, module: &str, system_path: &str) -> Result<Option<NodeId>> {
        let parent_path = path::dirname(system_path);
        if parent_path == format!("/{module}") || parent_path == "/" {
            // Root of the module itself, or the module root is the implicit
            // parent and has no separate directory row above it.
            if let Some(root) = self.find_by_system_path(module, &format!("/{module}"))? {
                if root.system_path == *system_path {
                    return Ok(None);
                }
                return Ok(Some(root.node_id));
            }
            return Ok(None);
        }
        let parent = self
            .find_by_system_path(module, &parent_path)?
            .ok_or_else(|| VfsError::not_found(format!("parent directory {parent_path}")))?;
        if parent.is_file() {
            return Err(VfsError::invalid_operation("parent is a file"));
        }
        Ok(Some(parent.node_id))
    }

    /// Overwrites a file's content (spec.md §4.5 `write`).
    pub fn write(&self, node: &VNode, content: &str) -> Result<VNode> {
        if node.is_directory() {
            return Err(VfsError::invalid_operation("cannot write to a directory"));
        }
        self.middlewares.read().validate(node, Some(content))?;

        let content_ref = node
            .content_ref
            .clone()
            .unwrap_or_else(|| content_ref_for(&node.node_id));

        let mut tx = self
            .storage
            .begin_transaction(&["vnodes", "contents"], Mode::ReadWrite)?;

        let processed = self.middlewares.read().before_write(
            node,
            content.to_string(),
            tx.as_ref() as &dyn TransactionHandle,
        )?;
        let size = processed.len() as u64;
        let now = now_millis();
        let content_row = Content {
            content_ref: content_ref.clone(),
            node_id: node.node_id.clone(),
            bytes: ContentBytes::from(processed.clone()),
            size,
            created_at: now,
        };
        tx.collection("contents")?
            .put(serde_json::to_value(&content_row)?)?;

        let derived = self.middlewares.read().after_write(
            node,
            &processed,
            tx.as_ref() as &dyn TransactionHandle,
        )?;

        let mut updated = node.clone();
        updated.content_ref = Some(content_ref);
        updated.size = size;
        updated.modified_at = now;
        updated.merge_metadata(derived);

        tx.collection("vnodes")?.put(Self::node_value(&updated)?)?;
        tx.commit()?;

        self.events.emit(
            Event::new(EventType::NodeUpdated)
                .with_node_id(updated.node_id.clone())
                .with_path(updated.system_path.clone())
                .with_module_id(updated.module_id.clone()),
        );

        Ok(updated)
    }

    /// Merges `patch` into `node.metadata` and persists it directly — no
    /// middleware pipeline runs, since this isn't a content write (spec.md
    /// §4.8's `updateMetadata` session-engine operation, and the backup
    /// restore path in `facade::Facade::restore_system_backup*`). Emits
    /// `NodeUpdated`.
    pub fn update_metadata(&self, node: &VNode, patch: serde_json::Map<String, Value>) -> Result<VNode> {
        let mut updated = node.clone();
        updated.merge_metadata(patch);
        updated.modified_at = now_millis();

        let mut tx = self.storage.begin_transaction(&["vnodes"], Mode::ReadWrite)?;
        tx.collection("vnodes")?.put(Self::node_value(&updated)?)?;
        tx.commit()?;

        self.events.emit(
            Event::new(EventType::NodeUpdated)
                .with_node_id(updated.node_id.clone())
                .with_path(updated.system_path.clone())
                .with_module_id(updated.module_id.clone()),
        );

        Ok(updated)
    }
}
