//! Module-scoped facade wrapper for external UI/editor consumers (spec.md
//! §4.8).
//!
//! Restricts every operation to one configured module and filters hidden
//! paths (`.` sidecar directories and `__`-prefixed protected modules,
//! spec.md §5 and §9) out of search results and event notifications —
//! the same prefix convention [`crate::path::is_hidden_path`] encodes.

use serde_json::{Map, Value};

use crate::engine::{SearchOptions, SearchScope};
use crate::error::Result;
use crate::event_bus::{Event, EventType, SubscriptionId};
use crate::facade::Facade;
use crate::model::{NodeId, SrsItem, VNode};
use crate::path;

/// A `SessionEngine`: the capability set spec.md §4.8 describes for a
/// single-module-scoped consumer (editor host, node list, outline panel).
pub struct SessionEngine {
    facade: Facade,
    module: String,
}

impl SessionEngine {
    pub fn new(facade: Facade, module: impl Into<String>) -> Self {
        Self {
            facade,
            module: module.into(),
        }
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    /// The module's whole tree, rooted at `/`, with hidden nodes pruned.
    pub fn load_tree(&self) -> Result<Vec<VNode>> {
        self.get_children("/")
    }

    pub fn get_children(&self, path: &str) -> Result<Vec<VNode>> {
        let children = self.facade.readdir(&self.module, path)?;
        Ok(children.into_iter().filter(|n| !self.is_hidden(n)).collect())
    }

    pub fn read_content(&self, path: &str) -> Result<String> {
        self.facade.read(&self.module, path)
    }

    pub fn get_node(&self, path: &str) -> Result<Option<VNode>> {
        match self.facade.vfs().resolve(&self.module, path)? {
            Some(id) => Ok(self.facade.vfs().get_node(&id)?.filter(|n| !self.is_hidden(n))),
            None => Ok(None),
        }
    }

    /// Searches within this session's module only, then drops hidden
    /// results — a caller cannot widen scope past its own module (spec.md
    /// §4.8: "restricts reads to the configured module by default").
    pub fn search(&self, mut options: SearchOptions) -> Result<Vec<VNode>> {
        options.scope = SearchScope::Module(self.module.clone());
        let results = self.facade.search_nodes(&options)?;
        Ok(results.into_iter().filter(|n| !self.is_hidden(n)).collect())
    }

    pub fn create_file(&self, path: &str, content: Option<&str>, metadata: Option<Map<String, Value>>) -> Result<VNode> {
        self.facade.create_file(&self.module, path, content, metadata)
    }

    pub fn create_directory(&self, path: &str, metadata: Option<Map<String, Value>>) -> Result<VNode> {
        self.facade.create_directory(&self.module, path, metadata)
    }

    /// Creates a file under its owner's sidecar asset directory
    /// (`.<owner-name>/<path>`, spec.md §9's asset sidecar convention),
    /// creating the sidecar directory first if it doesn't yet exist.
    pub fn create_asset(&self, owner_path: &str, asset_name: &str, content: &[u8]) -> Result<VNode> {
        let owner_dir = path::dirname(owner_path);
        let owner_name = path::basename(owner_path);
        let sidecar_dir = path::join(&owner_dir, &[&format!(".{owner_name}")]);

        if self.facade.vfs().resolve(&self.module, &sidecar_dir)?.is_none() {
            self.facade.create_directory(&self.module, &sidecar_dir, None)?;
        }

        let asset_path = path::join(&sidecar_dir, &[asset_name]);
        let text = String::from_utf8_lossy(content).into_owned();
        self.facade.create_file(&self.module, &asset_path, Some(&text), None)
    }

    pub fn rename(&self, path: &str, new_path: &str) -> Result<VNode> {
        self.facade.rename(&self.module, path, new_path)
    }

    pub fn move_node(&self, path: &str, new_path: &str) -> Result<VNode> {
        self.facade.move_path(&self.module, path, new_path)
    }

    pub fn delete(&self, path: &str, recursive: bool) -> Result<Vec<NodeId>> {
        self.facade.delete(&self.module, path, recursive)
    }

    pub fn update_metadata(&self, path: &str, patch: Map<String, Value>) -> Result<VNode> {
        let node = self
            .get_node(path)?
            .ok_or_else(|| crate::error::VfsError::not_found(format!("{}:{path}", self.module)))?;
        self.facade.vfs().update_metadata(&node, patch)
    }

    pub fn set_tags(&self, path: &str, tags: &[String]) -> Result<VNode> {
        self.facade.set_tags(&self.module, path, tags)
    }

    /// All-or-nothing batch of `set_tags`, one entry per `(path, tags)` pair.
    pub fn set_tags_batch(&self, updates: &[(String, Vec<String>)]) -> Result<()> {
        let mut resolved = Vec::with_capacity(updates.len());
        for (path, tags) in updates {
            let node = self
                .get_node(path)?
                .ok_or_else(|| crate::error::VfsError::not_found(format!("{}:{path}", self.module)))?;
            resolved.push((node.node_id, tags.clone()));
        }
        self.facade.vfs().batch_set_tags(&resolved)
    }

    pub fn get_srs_status(&self, path: &str) -> Result<Vec<SrsItem>> {
        let node = self
            .get_node(path)?
            .ok_or_else(|| crate::error::VfsError::not_found(format!("{}:{path}", self.module)))?;
        self.facade.vfs().get_srs_items_by_node_id(&node.node_id)
    }

    pub fn update_srs_status(&self, path: &str, cloze_id: &str, due_at: u64, interval: u32, ease: f64) -> Result<SrsItem> {
        let node = self
            .get_node(path)?
            .ok_or_else(|| crate::error::VfsError::not_found(format!("{}:{path}", self.module)))?;
        self.facade
            .update_srs_item(&node.node_id, cloze_id, &self.module, due_at, interval, ease)
    }

    pub fn get_due_cards(&self, limit: Option<usize>) -> Result<Vec<SrsItem>> {
        self.facade.get_due_srs_items(Some(&self.module), limit)
    }

    /// Subscribes to `event_type`, filtering out events for hidden paths
    /// and events belonging to a different module.
    pub fn on(&self, event_type: EventType, callback: impl Fn(&Event) + Send + Sync + 'static) -> SubscriptionId {
        let module = self.module.clone();
        self.facade.event_bus().on(event_type, move |event| {
            if let Some(event_module) = &event.module_id {
                if event_module != &module {
                    return;
                }
            }
            if let Some(event_path) = &event.path {
                if path::is_hidden_path(event_path) {
                    return;
                }
            }
            callback(event);
        })
    }

    fn is_hidden(&self, node: &VNode) -> bool {
        path::is_hidden_path(&node.system_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryAdapter;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn session(db_name: &str, module: &str) -> SessionEngine {
        let facade = Facade::open(Arc::new(MemoryAdapter::new()), db_name).unwrap();
        facade.mount_module(module, Default::default()).unwrap();
        SessionEngine::new(facade, module)
    }

    #[test]
    fn get_children_hides_dot_prefixed_sidecars() {
        let session = session("session-hidden-test", "notes");
        session.create_file("/a.md", Some("x"), None).unwrap();
        session.create_directory("/.a.md", None).unwrap();

        let children = session.get_children("/").unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].name, "a.md");
        Facade::shutdown("session-hidden-test").unwrap();
    }

    #[test]
    fn create_asset_nests_under_sidecar_directory() {
        let session = session("session-asset-test", "notes");
        session.create_file("/a.md", Some("x"), None).unwrap();
        let asset = session.create_asset("/a.md", "image.png", b"binary").unwrap();
        assert_eq!(asset.system_path, "/notes/.a.md/image.png");
        Facade::shutdown("session-asset-test").unwrap();
    }

    #[test]
    fn on_filters_events_outside_own_module() {
        let session = session("session-events-test", "notes");
        let other = Facade::open(Arc::new(MemoryAdapter::new()), "session-events-other").unwrap();
        other.mount_module("other", Default::default()).unwrap();

        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        session.on(EventType::NodeCreated, move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        session.create_file("/a.md", Some("x"), None).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);

        Facade::shutdown("session-events-test").unwrap();
        Facade::shutdown("session-events-other").unwrap();
    }
}
