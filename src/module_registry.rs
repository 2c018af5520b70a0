//! Module (namespace) registry (spec.md §4.6).
//!
//! Mirrors an in-memory `Map<name, Module>` to the `modules` collection.
//! Startup ordering matters: the facade must load every persisted `Module`
//! row *before* calling [`ModuleRegistry::ensure_default`] — registering
//! defaults first would silently shadow a module that already exists on
//! disk (spec.md §4.6: "the historical data-disappears-after-refresh bug").

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::{Map, Value};

use crate::engine::{CreateNodeOptions, VfsEngine};
use crate::error::{Result, VfsError};
use crate::event_bus::{Event, EventType};
use crate::model::{now_millis, Module, NodeType};
use crate::storage::adapter::Mode;

/// Options accepted by [`ModuleRegistry::mount`].
#[derive(Debug, Clone, Default)]
pub struct MountOptions {
    pub description: Option<String>,
    pub is_protected: Option<bool>,
}

/// Tracks every mounted module and keeps the `modules` collection in sync.
#[derive(Clone)]
pub struct ModuleRegistry {
    engine: VfsEngine,
    modules: Arc<RwLock<HashMap<String, Module>>>,
}

impl ModuleRegistry {
    pub fn new(engine: VfsEngine) -> Self {
        Self {
            engine,
            modules: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Loads every persisted `Module` row into memory. Must run before
    /// [`ModuleRegistry::ensure_default`] on startup.
    pub fn load_persisted(&self) -> Result<()> {
        let coll = self.engine.storage().get_collection("modules")?;
        let rows = coll.get_all()?;
        let mut modules = self.modules.write();
        for row in rows {
            let module: Module = serde_json::from_value(row)?;
            modules.insert(module.name.clone(), module);
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Module> {
        self.modules.read().get(name).cloned()
    }

    pub fn list(&self) -> Vec<Module> {
        self.modules.read().values().cloned().collect()
    }

    /// Drops every in-memory registration without touching storage — used
    /// right after `StorageAdapter::destroy` during a full backup restore,
    /// which wipes the `modules` collection out from under this mirror.
    pub fn clear(&self) {
        self.modules.write().clear();
    }

    /// Returns the existing module if `name` is already mounted, otherwise
    /// mounts it with default options.
    pub fn ensure_default(&self, name: &str) -> Result<Module> {
        if let Some(existing) = self.get(name) {
            return Ok(existing);
        }
        self.mount(name, MountOptions::default())
    }

    /// Mounts `name`: creates its root directory node, registers it in
    /// memory, then persists a `Module` row. A DB failure rolls back the
    /// in-memory registration.
    pub fn mount(&self, name: &str, opts: MountOptions) -> Result<Module> {
        if let Some(existing) = self.get(name) {
            return Ok(existing);
        }

        let mut metadata = Map::new();
        if let Some(protected) = opts.is_protected {
            metadata.insert("isProtected".to_string(), Value::Bool(protected));
        }

        let root = self.engine.create_node(CreateNodeOptions {
            module: name.to_string(),
            path: "/".to_string(),
            node_type: NodeType::Directory,
            content: None,
            metadata: Some(metadata),
        })?;

        let module = Module {
            name: name.to_string(),
            root_node_id: root.node_id.clone(),
            description: opts.description,
            is_protected: opts.is_protected,
            created_at: now_millis(),
        };

        self.modules.write().insert(name.to_string(), module.clone());

        if let Err(err) = self.persist_module(&module) {
            self.modules.write().remove(name);
            return Err(err);
        }

        self.engine.event_bus().emit(
            Event::new(EventType::ModuleMounted)
                .with_module_id(name.to_string())
                .with_node_id(root.node_id.clone()),
        );

        Ok(module)
    }

    /// Recursively deletes the module's root, then removes its `Module` row.
    /// A DB failure rolls the in-memory registration back.
    pub fn unmount(&self, name: &str) -> Result<()> {
        let module = self
            .get(name)
            .ok_or_else(|| VfsError::not_found(format!("module {name}")))?;

        let root = self
            .engine
            .get_node(&module.root_node_id)?
            .ok_or_else(|| VfsError::not_found(format!("module root {}", module.root_node_id)))?;
        self.engine.unlink(&root, true)?;

        self.modules.write().remove(name);

        if let Err(err) = self.remove_persisted(name) {
            self.modules.write().insert(name.to_string(), module);
            return Err(err);
        }

        self.engine
            .event_bus()
            .emit(Event::new(EventType::ModuleUnmounted).with_module_id(name.to_string()));

        Ok(())
    }

    fn persist_module(&self, module: &Module) -> Result<()> {
        let mut tx = self.engine.storage().begin_transaction(&["modules"], Mode::ReadWrite)?;
        tx.collection("modules")?.put(serde_json::to_value(module)?)?;
        tx.commit()
    }

    fn remove_persisted(&self, name: &str) -> Result<()> {
        let mut tx = self.engine.storage().begin_transaction(&["modules"], Mode::ReadWrite)?;
        tx.collection("modules")?.delete(&Value::String(name.to_string()))?;
        tx.commit()
    }
}
