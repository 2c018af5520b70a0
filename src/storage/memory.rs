//! In-process, `BTreeMap`-backed storage adapter.
//!
//! Conforms to the same [`StorageAdapter`] contract a durable backend does
//! (spec.md §4.1: "a conformant in-process replacement used for tests").
//! Every engine-level test in this crate runs against this adapter; the
//! `persistent` adapter is exercised separately in its own module tests
//! plus the crash-recovery scenarios under `tests/`.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;

use crate::error::{Result, VfsError};
use crate::storage::adapter::{
    Collection, CollectionInTx, Mode, QueryOptions, StorageAdapter, Transaction, TransactionHandle,
};
use crate::storage::index_store::CollectionData;
use crate::storage::schema::schemas;

/// A thread-safe, lock-guarded snapshot store for one named collection, the
/// way the teacher guards its shared pager state behind a mutex.
#[derive(Clone)]
struct SharedCollection(Arc<RwLock<CollectionData>>);

/// Read-only handle into a collection outside a transaction. Snapshots the
/// whole collection under a read lock per call — acceptable for a
/// single-writer, test-scale adapter.
struct MemoryCollectionHandle(SharedCollection);

impl Collection for MemoryCollectionHandle {
    fn get(&self, key: &Value) -> Result<Option<Value>> {
        self.0 .0.read().get(key)
    }
    fn get_all(&self) -> Result<Vec<Value>> {
        self.0 .0.read().get_all()
    }
    fn count(&self) -> Result<usize> {
        self.0 .0.read().count()
    }
    fn get_by_index(&self, index_name: &str, value: &Value) -> Result<Option<Value>> {
        self.0 .0.read().get_by_index(index_name, value)
    }
    fn get_all_by_index(&self, index_name: &str, value: &Value) -> Result<Vec<Value>> {
        self.0 .0.read().get_all_by_index(index_name, value)
    }
    fn query(&self, options: &QueryOptions) -> Result<Vec<Value>> {
        self.0 .0.read().query(options)
    }
}

/// A transaction that buffers writes in an overlay and publishes them to
/// the real collections only on commit, so a mid-transaction panic or an
/// explicit `abort()` leaves the store untouched (spec.md P5).
struct MemoryTransaction {
    collections: BTreeMap<String, SharedCollection>,
    overlays: BTreeMap<String, CollectionData>,
    mode: Mode,
    done: bool,
}

impl MemoryTransaction {
    fn overlay_for(&mut self, name: &str) -> Result<&mut CollectionData> {
        if !self.overlays.contains_key(name) {
            let shared = self
                .collections
                .get(name)
                .ok_or_else(|| VfsError::not_found(format!("collection {name}")))?;
            let copy = shared.0.read().clone();
            self.overlays.insert(name.to_string(), copy);
        }
        Ok(self.overlays.get_mut(name).expect("just inserted"))
    }
}

impl TransactionHandle for MemoryTransaction {
    fn collection(&mut self, name: &str) -> Result<&mut dyn CollectionInTx> {
        if self.mode == Mode::ReadOnly {
            tracing::debug!(collection = name, "read-only transaction touched collection");
        }
        Ok(self.overlay_for(name)?)
    }
}

impl Transaction for MemoryTransaction {
    fn commit(mut self: Box<Self>) -> Result<()> {
        for (name, overlay) in std::mem::take(&mut self.overlays) {
            if let Some(shared) = self.collections.get(&name) {
                *shared.0.write() = overlay;
            }
        }
        self.done = true;
        Ok(())
    }

    fn abort(mut self: Box<Self>) -> Result<()> {
        self.overlays.clear();
        self.done = true;
        Ok(())
    }
}

impl Drop for MemoryTransaction {
    fn drop(&mut self) {
        if !self.done {
            tracing::warn!("memory transaction dropped without commit or abort; discarding writes");
        }
    }
}

/// The in-memory conformant [`StorageAdapter`] implementation, used for
/// tests and embeddings with no durability requirement.
pub struct MemoryAdapter {
    collections: RwLock<BTreeMap<String, SharedCollection>>,
}

impl MemoryAdapter {
    pub fn new() -> Self {
        let mut collections = BTreeMap::new();
        for schema in schemas() {
            collections.insert(
                schema.name.to_string(),
                SharedCollection(Arc::new(RwLock::new(CollectionData::new(schema.clone())))),
            );
        }
        Self {
            collections: RwLock::new(collections),
        }
    }
}

impl Default for MemoryAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageAdapter for MemoryAdapter {
    fn connect(&self) -> Result<()> {
        Ok(())
    }

    fn disconnect(&self) -> Result<()> {
        Ok(())
    }

    fn destroy(&self) -> Result<()> {
        for shared in self.collections.read().values() {
            let mut data = shared.0.write();
            data.clear()?;
        }
        Ok(())
    }

    fn begin_transaction(&self, collections: &[&str], mode: Mode) -> Result<Box<dyn Transaction>> {
        let all = self.collections.read();
        let mut selected = BTreeMap::new();
        for name in collections {
            let shared = all
                .get(*name)
                .ok_or_else(|| VfsError::not_found(format!("collection {name}")))?;
            selected.insert(name.to_string(), shared.clone());
        }
        Ok(Box::new(MemoryTransaction {
            collections: selected,
            overlays: BTreeMap::new(),
            mode,
            done: false,
        }))
    }

    fn get_collection(&self, name: &str) -> Result<Box<dyn Collection>> {
        let shared = self
            .collections
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| VfsError::not_found(format!("collection {name}")))?;
        Ok(Box::new(MemoryCollectionHandle(shared)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn put_get_delete_round_trip() {
        let adapter = MemoryAdapter::new();
        adapter.connect().unwrap();
        let mut tx = adapter.begin_transaction(&["vnodes"], Mode::ReadWrite).unwrap();
        tx.collection("vnodes")
            .unwrap()
            .put(json!({"nodeId": "n1", "moduleId": "notes", "systemPath": "/notes/a.md", "parentId": Value::Null, "type": "file"}))
            .unwrap();
        tx.commit().unwrap();

        let coll = adapter.get_collection("vnodes").unwrap();
        let got = coll.get(&json!("n1")).unwrap();
        assert!(got.is_some());
    }

    #[test]
    fn abort_discards_writes() {
        let adapter = MemoryAdapter::new();
        let mut tx = adapter.begin_transaction(&["vnodes"], Mode::ReadWrite).unwrap();
        tx.collection("vnodes")
            .unwrap()
            .put(json!({"nodeId": "n1", "moduleId": "notes", "systemPath": "/notes/a.md", "parentId": Value::Null, "type": "file"}))
            .unwrap();
        tx.abort().unwrap();

        let coll = adapter.get_collection("vnodes").unwrap();
        assert!(coll.get(&json!("n1")).unwrap().is_none());
    }

    #[test]
    fn unique_index_rejects_collision() {
        let adapter = MemoryAdapter::new();
        let mut tx = adapter.begin_transaction(&["vnodes"], Mode::ReadWrite).unwrap();
        let coll = tx.collection("vnodes").unwrap();
        coll.put(json!({"nodeId": "n1", "moduleId": "notes", "systemPath": "/notes/a.md", "parentId": Value::Null, "type": "file"}))
            .unwrap();
        let err = coll.put(json!({"nodeId": "n2", "moduleId": "notes", "systemPath": "/notes/a.md", "parentId": Value::Null, "type": "file"}));
        assert!(err.is_err());
    }
}
