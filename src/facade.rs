//! Public-facing API surface and lifecycle owner (spec.md §4.7).
//!
//! `Facade` wires a [`StorageAdapter`] to the event bus, the middleware
//! registry, the engine, and the module registry, in the one order the
//! spec requires (§4.6): connect storage, build the ambient collaborators,
//! load every persisted module *before* mounting the default one. It also
//! owns backup/restore (§6) and exposes metrics/health as plain snapshots
//! rather than over any network surface — this crate has none.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::engine::{CreateNodeOptions, SearchOptions, VfsEngine};
use crate::error::{Result, VfsError};
use crate::event_bus::{Event, EventBus, EventType, ALL_EVENT_TYPES};
use crate::metrics::{MetricsSnapshot, VfsMetrics};
use crate::middleware::{ClozeCountMiddleware, MermaidCountMiddleware, Middleware, MiddlewareRegistry, TaskCountMiddleware};
use crate::model::{Module, NodeId, NodeType, SrsItem, VNode};
use crate::module_registry::{ModuleRegistry, MountOptions};
use crate::storage::adapter::{Mode, StorageAdapter};
use crate::storage::schema::ALL_COLLECTIONS;

/// Namespace mounted automatically on bootstrap if nothing else claims it.
pub const DEFAULT_MODULE: &str = "default";

fn singleton_registry() -> &'static Mutex<HashMap<String, Facade>> {
    static REGISTRY: OnceLock<Mutex<HashMap<String, Facade>>> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Orchestrates one database's worth of VFS state. Cheap to clone (every
/// field is `Arc`-shared); [`Facade::open`] returns the same instance for a
/// given `database_name` until [`Facade::shutdown`] drops it.
#[derive(Clone)]
pub struct Facade {
    database_name: String,
    storage: Arc<dyn StorageAdapter>,
    events: EventBus,
    middlewares: Arc<RwLock<MiddlewareRegistry>>,
    engine: VfsEngine,
    modules: ModuleRegistry,
    metrics: Arc<VfsMetrics>,
    #[cfg(feature = "persistent")]
    persistent: Option<Arc<crate::storage::persistent::PersistentAdapter>>,
}

impl Facade {
    /// Returns the existing facade for `database_name` if one is already
    /// open, otherwise bootstraps a fresh one atop `storage` and registers
    /// it as the singleton for that name (spec.md §5: "facade is a
    /// singleton keyed by database name").
    pub fn open(storage: Arc<dyn StorageAdapter>, database_name: impl Into<String>) -> Result<Facade> {
        let database_name = database_name.into();
        let mut registry = singleton_registry().lock();
        if let Some(existing) = registry.get(&database_name) {
            return Ok(existing.clone());
        }
        let facade = Self::bootstrap(storage, database_name.clone())?;
        registry.insert(database_name, facade.clone());
        Ok(facade)
    }

    /// Like [`Facade::open`], but backed by the durable, WAL-based adapter
    /// and retaining a handle to it for [`Facade::health`].
    #[cfg(feature = "persistent")]
    pub fn open_persistent(
        db_path: impl Into<std::path::PathBuf>,
        config: crate::config::Config,
        database_name: impl Into<String>,
    ) -> Result<Facade> {
        let database_name = database_name.into();
        let mut registry = singleton_registry().lock();
        if let Some(existing) = registry.get(&database_name) {
            return Ok(existing.clone());
        }
        let adapter = Arc::new(crate::storage::persistent::PersistentAdapter::open(db_path, config)?);
        let storage: Arc<dyn StorageAdapter> = adapter.clone();
        let mut facade = Self::bootstrap(storage, database_name.clone())?;
        facade.persistent = Some(adapter);
        registry.insert(database_name, facade.clone());
        Ok(facade)
    }

    fn bootstrap(storage: Arc<dyn StorageAdapter>, database_name: String) -> Result<Facade> {
        storage.connect()?;

        let events = EventBus::new();
        let mut registry = MiddlewareRegistry::new();
        registry.register(Box::new(TaskCountMiddleware));
        registry.register(Box::new(ClozeCountMiddleware));
        registry.register(Box::new(MermaidCountMiddleware));
        let middlewares = Arc::new(RwLock::new(registry));

        let engine = VfsEngine::new(storage.clone(), events.clone(), middlewares.clone());
        let modules = ModuleRegistry::new(engine.clone());

        // Load every persisted module before mounting the default one —
        // reversing this order silently shadows a module that already
        // exists on disk (spec.md §4.6).
        modules.load_persisted()?;
        modules.ensure_default(DEFAULT_MODULE)?;

        let metrics = Arc::new(VfsMetrics::new());
        let metrics_sink = metrics.clone();
        for event_type in ALL_EVENT_TYPES {
            events.on(*event_type, move |_| metrics_sink.record_event());
        }

        events.emit(Event::new(EventType::VfsReady));

        Ok(Facade {
            database_name,
            storage,
            events,
            middlewares,
            engine,
            modules,
            metrics,
            #[cfg(feature = "persistent")]
            persistent: None,
        })
    }

    /// Closes `database_name`'s singleton: disconnects storage and drops
    /// the cached instance so a later `open` builds a fresh one (spec.md
    /// §5: "`shutdown()` closes the handle and nulls the singleton").
    pub fn shutdown(database_name: &str) -> Result<()> {
        let mut registry = singleton_registry().lock();
        if let Some(facade) = registry.remove(database_name) {
            facade.storage.disconnect()?;
        }
        Ok(())
    }

    pub fn database_name(&self) -> &str {
        &self.database_name
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.events
    }

    pub fn vfs(&self) -> &VfsEngine {
        &self.engine
    }

    pub fn middleware_registry(&self) -> &Arc<RwLock<MiddlewareRegistry>> {
        &self.middlewares
    }

    pub fn register_middleware(&self, middleware: Box<dyn Middleware>) {
        self.middlewares.write().register(middleware);
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot(self.middlewares.read().hook_invocations())
    }

    /// Reports the durable adapter's health, or an always-healthy check
    /// with no sub-checks when this facade was opened over the memory
    /// adapter (which has no WAL/checkpoint signal to report).
    pub fn health(&self) -> Result<crate::health::HealthCheck> {
        #[cfg(feature = "persistent")]
        if let Some(adapter) = &self.persistent {
            return crate::health::check_persistent_adapter(adapter, 100 * 1024 * 1024, 300);
        }
        Ok(crate::health::HealthCheck::new())
    }

    fn track<T>(&self, result: Result<T>) -> Result<T> {
        match &result {
            Ok(_) => self.metrics.record_commit(),
            Err(_) => self.metrics.record_abort(),
        }
        result
    }

    fn require_node(&self, module: &str, path: &str) -> Result<VNode> {
        let id = self
            .engine
            .resolve(module, path)?
            .ok_or_else(|| VfsError::not_found(format!("{module}:{path}")))?;
        self.engine
            .get_node(&id)?
            .ok_or_else(|| VfsError::not_found(format!("{module}:{path}")))
    }

    pub fn mount_module(&self, name: &str, opts: MountOptions) -> Result<Module> {
        self.modules.mount(name, opts)
    }

    pub fn unmount_module(&self, name: &str) -> Result<()> {
        self.modules.unmount(name)
    }

    pub fn create_file(
        &self,
        module: &str,
        path: &str,
        content: Option<&str>,
        metadata: Option<Map<String, Value>>,
    ) -> Result<VNode> {
        self.track(self.engine.create_node(CreateNodeOptions {
            module: module.to_string(),
            path: path.to_string(),
            node_type: NodeType::File,
            content: content.map(str::to_string),
            metadata,
        }))
    }

    pub fn create_directory(&self, module: &str, path: &str, metadata: Option<Map<String, Value>>) -> Result<VNode> {
        self.track(self.engine.create_node(CreateNodeOptions {
            module: module.to_string(),
            path: path.to_string(),
            node_type: NodeType::Directory,
            content: None,
            metadata,
        }))
    }

    pub fn read(&self, module: &str, path: &str) -> Result<String> {
        let node = self.require_node(module, path)?;
        self.engine.read(&node)
    }

    pub fn write(&self, module: &str, path: &str, content: &str) -> Result<VNode> {
        let node = self.require_node(module, path)?;
        self.track(self.engine.write(&node, content))
    }

    pub fn delete(&self, module: &str, path: &str, recursive: bool) -> Result<Vec<NodeId>> {
        let node = self.require_node(module, path)?;
        self.track(self.engine.unlink(&node, recursive))
    }

    pub fn move_path(&self, module: &str, path: &str, new_path: &str) -> Result<VNode> {
        let node = self.require_node(module, path)?;
        self.track(self.engine.move_node(&node, new_path))
    }

    /// Alias for [`Facade::move_path`] — spec.md §4.7 names both `move` and
    /// `rename` as public operations; here they are the same operation.
    pub fn rename(&self, module: &str, path: &str, new_path: &str) -> Result<VNode> {
        self.move_path(module, path, new_path)
    }

    pub fn readdir(&self, module: &str, path: &str) -> Result<Vec<VNode>> {
        let node = self.require_node(module, path)?;
        self.engine.readdir(&node)
    }

    pub fn search_nodes(&self, options: &SearchOptions) -> Result<Vec<VNode>> {
        self.engine.search_nodes(options)
    }

    pub fn add_tag(&self, module: &str, path: &str, name: &str) -> Result<VNode> {
        let node = self.require_node(module, path)?;
        self.track(self.engine.add_tag(&node, name))
    }

    pub fn remove_tag(&self, module: &str, path: &str, name: &str) -> Result<VNode> {
        let node = self.require_node(module, path)?;
        self.track(self.engine.remove_tag(&node, name))
    }

    pub fn set_tags(&self, module: &str, path: &str, tags: &[String]) -> Result<VNode> {
        let node = self.require_node(module, path)?;
        self.track(self.engine.set_tags(&node, tags))
    }

    pub fn update_srs_item(
        &self,
        node_id: &NodeId,
        cloze_id: &str,
        module_id: &str,
        due_at: u64,
        interval: u32,
        ease: f64,
    ) -> Result<SrsItem> {
        self.track(
            self.engine
                .update_srs_item_by_id(node_id, cloze_id, module_id, due_at, interval, ease),
        )
    }

    pub fn get_due_srs_items(&self, module_id: Option<&str>, limit: Option<usize>) -> Result<Vec<SrsItem>> {
        self.engine.get_due_srs_items(module_id, limit)
    }

    /// Duplicates every row of every collection from `src` into `dst`,
    /// destroying whatever `dst` held first (spec.md §4.7: "destructive on
    /// destination").
    pub fn copy_database(src: &Facade, dst: &Facade) -> Result<()> {
        dst.storage.destroy()?;
        let mut tx = dst.storage.begin_transaction(ALL_COLLECTIONS, Mode::ReadWrite)?;
        for name in ALL_COLLECTIONS {
            let source = src.storage.get_collection(name)?;
            let target = tx.collection(name)?;
            for row in source.get_all()? {
                target.put(row)?;
            }
        }
        tx.commit()
    }

    // --- Backup & restore (spec.md §6) ---------------------------------

    pub fn create_system_backup(&self) -> Result<Backup> {
        let mut modules = Vec::new();
        for module in self.modules.list() {
            modules.push(self.export_module(&module.name)?);
        }
        Ok(Backup {
            version: 1,
            timestamp: crate::model::now_millis(),
            modules,
        })
    }

    pub fn export_module(&self, name: &str) -> Result<ModuleBackup> {
        let module = self
            .modules
            .get(name)
            .ok_or_else(|| VfsError::not_found(format!("module {name}")))?;
        let root = self
            .engine
            .get_node(&module.root_node_id)?
            .ok_or_else(|| VfsError::not_found(format!("module root {}", module.root_node_id)))?;
        let tree = self.build_tree_data(&root)?;
        Ok(ModuleBackup { module, tree })
    }

    fn build_tree_data(&self, node: &VNode) -> Result<TreeData> {
        let content = if node.is_file() {
            let text = self.engine.read(node)?;
            if text.is_empty() {
                None
            } else {
                Some(text)
            }
        } else {
            None
        };

        let srs = if node.is_file() {
            let rows = self.engine.get_srs_items_by_node_id(&node.node_id)?;
            if rows.is_empty() {
                None
            } else {
                Some(rows.into_iter().map(|item| (item.cloze_id.clone(), item)).collect())
            }
        } else {
            None
        };

        let mut children = Vec::new();
        if node.is_directory() {
            for child in self.engine.readdir(node)? {
                children.push(self.build_tree_data(&child)?);
            }
        }

        Ok(TreeData {
            name: node.name.clone(),
            node_type: node.node_type,
            metadata: if node.metadata.is_empty() { None } else { Some(node.metadata.clone()) },
            tags: node.tags.clone(),
            srs,
            content,
            children,
        })
    }

    /// Full restore (spec.md §6): wipes the store, re-mounts every
    /// module from `backup`, and rebuilds each tree from scratch.
    pub fn restore_system_backup(&self, backup: &Backup) -> Result<()> {
        self.storage.destroy()?;
        self.modules.clear();

        for module_backup in &backup.modules {
            let opts = MountOptions {
                description: module_backup.module.description.clone(),
                is_protected: module_backup.module.is_protected,
            };
            self.modules.mount(&module_backup.module.name, opts)?;
            for child in &module_backup.tree.children {
                self.restore_node(&module_backup.module.name, "/", child, MergeOptions::default())?;
            }
        }
        Ok(())
    }

    /// Merges `backup` into the live store without discarding existing
    /// data (spec.md §6 incremental restore).
    pub fn restore_system_backup_incrementally(&self, backup: &Backup, options: MergeOptions) -> Result<()> {
        for module_backup in &backup.modules {
            self.import_module(module_backup, options)?;
        }
        Ok(())
    }

    pub fn import_module(&self, backup: &ModuleBackup, options: MergeOptions) -> Result<()> {
        let opts = MountOptions {
            description: backup.module.description.clone(),
            is_protected: backup.module.is_protected,
        };
        self.modules.mount(&backup.module.name, opts)?;
        for child in &backup.tree.children {
            self.restore_node(&backup.module.name, "/", child, options)?;
        }
        Ok(())
    }

    /// Recreates (or merges) one `TreeData` node and its descendants under
    /// `parent_user_path` in `module`. Incremental merge rules (spec.md
    /// §6): content overwritten only when `options.overwrite`; metadata
    /// merged with `overwrite` choosing the winning side; tags unioned
    /// when `options.merge_tags`; SRS rows written only for a new node or
    /// when `overwrite` is set.
    fn restore_node(&self, module: &str, parent_user_path: &str, tree: &TreeData, options: MergeOptions) -> Result<()> {
        let path = crate::path::join(parent_user_path, &[&tree.name]);
        let existing = self
            .engine
            .resolve(module, &path)?
            .map(|id| self.engine.get_node(&id))
            .transpose()?
            .flatten();

        match existing {
            Some(node) => {
                if tree.node_type == NodeType::File && options.overwrite {
                    if let Some(content) = &tree.content {
                        self.engine.write(&node, content)?;
                    }
                }
                let refreshed = self.engine.get_node(&node.node_id)?.unwrap_or(node);
                if let Some(patch) = &tree.metadata {
                    let merged = if options.overwrite {
                        let mut m = refreshed.metadata.clone();
                        m.extend(patch.clone());
                        m
                    } else {
                        let mut m = patch.clone();
                        m.extend(refreshed.metadata.clone());
                        m
                    };
                    self.engine.update_metadata(&refreshed, merged)?;
                }
                if options.merge_tags {
                    let mut union: Vec<String> = refreshed.tags.clone();
                    for t in &tree.tags {
                        if !union.contains(t) {
                            union.push(t.clone());
                        }
                    }
                    self.engine.set_tags(&refreshed, &union)?;
                } else if options.overwrite {
                    self.engine.set_tags(&refreshed, &tree.tags)?;
                }
                if let Some(srs) = &tree.srs {
                    let existing_ids: std::collections::HashSet<String> = self
                        .engine
                        .get_srs_items_by_node_id(&refreshed.node_id)?
                        .into_iter()
                        .map(|i| i.cloze_id)
                        .collect();
                    for (cloze_id, item) in srs {
                        if options.overwrite || !existing_ids.contains(cloze_id) {
                            let mut restored = item.clone();
                            restored.node_id = refreshed.node_id.clone();
                            restored.module_id = module.to_string();
                            self.engine.restore_srs_item(&restored)?;
                        }
                    }
                }
            }
            None => {
                let created = self.engine.create_node(CreateNodeOptions {
                    module: module.to_string(),
                    path: path.clone(),
                    node_type: tree.node_type,
                    content: tree.content.clone(),
                    metadata: tree.metadata.clone(),
                })?;
                if !tree.tags.is_empty() {
                    self.engine.set_tags(&created, &tree.tags)?;
                }
                if let Some(srs) = &tree.srs {
                    for item in srs.values() {
                        let mut restored = item.clone();
                        restored.node_id = created.node_id.clone();
                        restored.module_id = module.to_string();
                        self.engine.restore_srs_item(&restored)?;
                    }
                }
            }
        };

        for child in &tree.children {
            self.restore_node(module, &path, child, options)?;
        }
        Ok(())
    }
}

/// Versioned backup document (spec.md §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Backup {
    pub version: u32,
    pub timestamp: u64,
    pub modules: Vec<ModuleBackup>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleBackup {
    pub module: Module,
    pub tree: TreeData,
}

/// One node's exported shape, recursively including its children.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeData {
    pub name: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub srs: Option<HashMap<String, SrsItem>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TreeData>,
}

/// Controls how [`Facade::restore_system_backup_incrementally`] reconciles
/// a backup with live data.
#[derive(Debug, Clone, Copy, Default)]
pub struct MergeOptions {
    pub overwrite: bool,
    pub merge_tags: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryAdapter;

    fn open(name: &str) -> Facade {
        Facade::open(Arc::new(MemoryAdapter::new()), name).unwrap()
    }

    #[test]
    fn open_mounts_default_module() {
        let facade = open("facade-open-test");
        assert!(facade.modules.get(DEFAULT_MODULE).is_some());
        Facade::shutdown("facade-open-test").unwrap();
    }

    #[test]
    fn open_returns_same_instance_for_same_name() {
        let a = open("facade-singleton-test");
        let b = Facade::open(Arc::new(MemoryAdapter::new()), "facade-singleton-test").unwrap();
        assert_eq!(a.database_name(), b.database_name());
        a.create_file(DEFAULT_MODULE, "/only-on-a.md", Some("x"), None).unwrap();
        assert!(b.read(DEFAULT_MODULE, "/only-on-a.md").is_ok());
        Facade::shutdown("facade-singleton-test").unwrap();
    }

    #[test]
    fn create_read_write_round_trip() {
        let facade = open("facade-crud-test");
        facade.create_file(DEFAULT_MODULE, "/a.md", Some("hello"), None).unwrap();
        assert_eq!(facade.read(DEFAULT_MODULE, "/a.md").unwrap(), "hello");
        facade.write(DEFAULT_MODULE, "/a.md", "world").unwrap();
        assert_eq!(facade.read(DEFAULT_MODULE, "/a.md").unwrap(), "world");
        Facade::shutdown("facade-crud-test").unwrap();
    }

    #[test]
    fn metrics_count_commits_and_events() {
        let facade = open("facade-metrics-test");
        facade.create_file(DEFAULT_MODULE, "/a.md", Some("x"), None).unwrap();
        let snapshot = facade.metrics();
        assert!(snapshot.transactions_committed >= 1);
        assert!(snapshot.events_emitted >= 1);
        Facade::shutdown("facade-metrics-test").unwrap();
    }

    #[test]
    fn backup_round_trips_a_module() {
        let facade = open("facade-backup-test");
        facade.create_file(DEFAULT_MODULE, "/a.md", Some("hello"), None).unwrap();
        facade.add_tag(DEFAULT_MODULE, "/a.md", "t1").unwrap();

        let backup = facade.create_system_backup().unwrap();
        facade.delete(DEFAULT_MODULE, "/a.md", false).unwrap();
        assert!(facade.read(DEFAULT_MODULE, "/a.md").is_err());

        facade.restore_system_backup(&backup).unwrap();
        assert_eq!(facade.read(DEFAULT_MODULE, "/a.md").unwrap(), "hello");
        let node = facade.require_node(DEFAULT_MODULE, "/a.md").unwrap();
        assert_eq!(node.tags, vec!["t1".to_string()]);
        Facade::shutdown("facade-backup-test").unwrap();
    }

    #[test]
    fn incremental_restore_keeps_newer_content_and_unions_tags() {
        let facade = open("facade-incremental-test");
        facade.create_file(DEFAULT_MODULE, "/n.md", Some("A"), None).unwrap();
        facade.add_tag(DEFAULT_MODULE, "/n.md", "t1").unwrap();
        let backup = facade.create_system_backup().unwrap();

        facade.write(DEFAULT_MODULE, "/n.md", "B").unwrap();
        facade.add_tag(DEFAULT_MODULE, "/n.md", "t2").unwrap();

        facade
            .restore_system_backup_incrementally(&backup, MergeOptions { overwrite: false, merge_tags: true })
            .unwrap();

        assert_eq!(facade.read(DEFAULT_MODULE, "/n.md").unwrap(), "B");
        let node = facade.require_node(DEFAULT_MODULE, "/n.md").unwrap();
        let mut tags = node.tags.clone();
        tags.sort();
        assert_eq!(tags, vec!["t1".to_string(), "t2".to_string()]);
        Facade::shutdown("facade-incremental-test").unwrap();
    }

    #[test]
    fn copy_database_duplicates_every_row() {
        let src = open("facade-copy-src");
        src.create_file(DEFAULT_MODULE, "/a.md", Some("x"), None).unwrap();
        let dst = open("facade-copy-dst");

        Facade::copy_database(&src, &dst).unwrap();
        assert_eq!(dst.read(DEFAULT_MODULE, "/a.md").unwrap(), "x");

        Facade::shutdown("facade-copy-src").unwrap();
        Facade::shutdown("facade-copy-dst").unwrap();
    }
}
