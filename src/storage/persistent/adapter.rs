//! Durable storage adapter: a WAL-backed, checkpointed disk database.
//!
//! On open, loads the last snapshot (if any) then replays every committed
//! WAL frame written since, the way the teacher's page store recovers from
//! its own WAL on startup. Commits append operations to the WAL before
//! publishing them to the in-memory working copy; a background-free
//! `checkpoint()` folds the WAL into a fresh snapshot and truncates it once
//! `checkpoint_threshold` commits (or `max_wal_size_bytes`) is exceeded.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use serde_json::Value;

use crate::config::{Config, SyncMode};
use crate::error::{Result, VfsError};
use crate::storage::adapter::{
    Collection, CollectionInTx, Mode, QueryOptions, StorageAdapter, Transaction, TransactionHandle,
};
use crate::storage::index_store::CollectionData;
use crate::storage::persistent::snapshot::{snapshot_path, Snapshot};
use crate::storage::persistent::wal::{wal_path, Operation, Wal};
use crate::storage::schema::schemas;

struct Working {
    collections: BTreeMap<String, CollectionData>,
    wal: Wal,
    commits_since_checkpoint: usize,
    last_checkpoint_at: std::time::Instant,
}

/// Durable [`StorageAdapter`] gated behind the `persistent` feature.
pub struct PersistentAdapter {
    db_path: PathBuf,
    config: Config,
    working: RwLock<Working>,
    next_tx_id: AtomicU64,
}

impl PersistentAdapter {
    pub fn open(db_path: impl Into<PathBuf>, config: Config) -> Result<Self> {
        let db_path = db_path.into();
        let mut collections = BTreeMap::new();
        for schema in schemas() {
            collections.insert(schema.name.to_string(), CollectionData::new(schema.clone()));
        }

        if let Some(snapshot) = Snapshot::load(&snapshot_path(&db_path))? {
            for (name, rows) in snapshot.collections {
                if let Some(coll) = collections.get_mut(&name) {
                    for row in rows {
                        coll.put(row)?;
                    }
                }
            }
        }

        let sync_enabled = !matches!(config.sync_mode, SyncMode::Off);
        let mut wal = Wal::open(&wal_path(&db_path), sync_enabled)?;
        wal.replay(|op| apply_operation(&mut collections, op))?;

        Ok(Self {
            db_path,
            config,
            working: RwLock::new(Working {
                collections,
                wal,
                commits_since_checkpoint: 0,
                last_checkpoint_at: std::time::Instant::now(),
            }),
            next_tx_id: AtomicU64::new(1),
        })
    }

    /// Folds every operation since the last snapshot into a fresh one and
    /// truncates the WAL. Safe to call at any time; a crash mid-checkpoint
    /// leaves the prior snapshot and an un-truncated WAL, which replay still
    /// reconstructs correctly on the next open.
    pub fn checkpoint(&self) -> Result<()> {
        let mut working = self.working.write();
        let rows: BTreeMap<String, Vec<Value>> = working
            .collections
            .iter()
            .map(|(name, coll)| (name.clone(), coll.rows.values().cloned().collect()))
            .collect();
        Snapshot::from_rows(rows).save(&snapshot_path(&self.db_path))?;
        working.wal.reset()?;
        working.commits_since_checkpoint = 0;
        working.last_checkpoint_at = std::time::Instant::now();
        Ok(())
    }

    fn maybe_checkpoint(&self) -> Result<()> {
        let needs_checkpoint = {
            let working = self.working.read();
            working.commits_since_checkpoint >= self.config.checkpoint_threshold
                || working.wal.size()? >= self.config.max_wal_size_bytes
        };
        if needs_checkpoint {
            self.checkpoint()?;
        }
        Ok(())
    }

    /// Current WAL file size in bytes, for [`crate::health::check_persistent_adapter`].
    pub fn wal_size_bytes(&self) -> Result<u64> {
        self.working.read().wal.size()
    }

    /// Seconds elapsed since the last successful checkpoint (or since open,
    /// if none has run yet).
    pub fn seconds_since_checkpoint(&self) -> u64 {
        self.working.read().last_checkpoint_at.elapsed().as_secs()
    }
}

fn apply_operation(collections: &mut BTreeMap<String, CollectionData>, op: &Operation) -> Result<()> {
    match op {
        Operation::Put { collection, value } => {
            if let Some(coll) = collections.get_mut(collection) {
                coll.put(value.clone())?;
            }
        }
        Operation::Delete { collection, key } => {
            if let Some(coll) = collections.get_mut(collection) {
                coll.delete(key)?;
            }
        }
        Operation::Clear { collection } => {
            if let Some(coll) = collections.get_mut(collection) {
                coll.clear()?;
            }
        }
    }
    Ok(())
}

/// Read-only view into the durable store outside a transaction. Takes a
/// fresh read lock per call, same tradeoff the memory adapter makes.
struct PersistentCollectionHandle<'a> {
    adapter: &'a PersistentAdapter,
    name: String,
}

impl Collection for PersistentCollectionHandle<'_> {
    fn get(&self, key: &Value) -> Result<Option<Value>> {
        Ok(self
            .adapter
            .working
            .read()
            .collections
            .get(&self.name)
            .and_then(|c| c.get(key)))
    }
    fn get_all(&self) -> Result<Vec<Value>> {
        self.adapter
            .working
            .read()
            .collections
            .get(&self.name)
            .ok_or_else(|| VfsError::not_found(format!("collection {}", self.name)))?
            .get_all()
    }
    fn count(&self) -> Result<usize> {
        self.adapter
            .working
            .read()
            .collections
            .get(&self.name)
            .ok_or_else(|| VfsError::not_found(format!("collection {}", self.name)))?
            .count()
    }
    fn get_by_index(&self, index_name: &str, value: &Value) -> Result<Option<Value>> {
        self.adapter
            .working
            .read()
            .collections
            .get(&self.name)
            .ok_or_else(|| VfsError::not_found(format!("collection {}", self.name)))?
            .get_by_index(index_name, value)
    }
    fn get_all_by_index(&self, index_name: &str, value: &Value) -> Result<Vec<Value>> {
        self.adapter
            .working
            .read()
            .collections
            .get(&self.name)
            .ok_or_else(|| VfsError::not_found(format!("collection {}", self.name)))?
            .get_all_by_index(index_name, value)
    }
    fn query(&self, options: &QueryOptions) -> Result<Vec<Value>> {
        self.adapter
            .working
            .read()
            .collections
            .get(&self.name)
            .ok_or_else(|| VfsError::not_found(format!("collection {}", self.name)))?
            .query(options)
    }
}

/// An overlay collection plus the operations recorded against it, so the
/// transaction can hand out a plain `&mut dyn CollectionInTx` per
/// collection without any unsafe aliasing tricks.
struct LoggedCollection {
    name: String,
    data: CollectionData,
    ops: Vec<Operation>,
}

impl Collection for LoggedCollection {
    fn get(&self, key: &Value) -> Result<Option<Value>> {
        Collection::get(&self.data, key)
    }
    fn get_all(&self) -> Result<Vec<Value>> {
        Collection::get_all(&self.data)
    }
    fn count(&self) -> Result<usize> {
        Collection::count(&self.data)
    }
    fn get_by_index(&self, index_name: &str, value: &Value) -> Result<Option<Value>> {
        Collection::get_by_index(&self.data, index_name, value)
    }
    fn get_all_by_index(&self, index_name: &str, value: &Value) -> Result<Vec<Value>> {
        Collection::get_all_by_index(&self.data, index_name, value)
    }
    fn query(&self, options: &QueryOptions) -> Result<Vec<Value>> {
        Collection::query(&self.data, options)
    }
}

impl CollectionInTx for LoggedCollection {
    fn put(&mut self, value: Value) -> Result<()> {
        self.data.put(value.clone())?;
        self.ops.push(Operation::Put {
            collection: self.name.clone(),
            value,
        });
        Ok(())
    }
    fn delete(&mut self, key: &Value) -> Result<()> {
        self.data.delete(key)?;
        self.ops.push(Operation::Delete {
            collection: self.name.clone(),
            key: key.clone(),
        });
        Ok(())
    }
    fn clear(&mut self) -> Result<()> {
        self.data.clear()?;
        self.ops.push(Operation::Clear {
            collection: self.name.clone(),
        });
        Ok(())
    }
}

/// A transaction against the durable store: mutations land in a private
/// overlay per collection (cloned from the live working copy on first
/// touch) and are only appended to the WAL and published on
/// [`PersistentTransaction::commit`].
pub struct PersistentTransaction<'a> {
    adapter: &'a PersistentAdapter,
    tx_id: u64,
    overlays: BTreeMap<String, LoggedCollection>,
    mode: Mode,
    done: bool,
}

impl TransactionHandle for PersistentTransaction<'_> {
    fn collection(&mut self, name: &str) -> Result<&mut dyn CollectionInTx> {
        if self.mode == Mode::ReadOnly {
            tracing::debug!(collection = name, "read-only transaction touched collection");
        }
        if !self.overlays.contains_key(name) {
            let working = self.adapter.working.read();
            let data = working
                .collections
                .get(name)
                .ok_or_else(|| VfsError::not_found(format!("collection {name}")))?
                .clone();
            drop(working);
            self.overlays.insert(
                name.to_string(),
                LoggedCollection {
                    name: name.to_string(),
                    data,
                    ops: Vec::new(),
                },
            );
        }
        Ok(self.overlays.get_mut(name).expect("just inserted"))
    }
}

impl Transaction for PersistentTransaction<'_> {
    fn commit(mut self: Box<Self>) -> Result<()> {
        let tx_id = self.tx_id;
        let overlays = std::mem::take(&mut self.overlays);
        let mut ops = Vec::new();
        {
            let mut working = self.adapter.working.write();
            for (name, logged) in overlays {
                ops.extend(logged.ops);
                working.collections.insert(name, logged.data);
            }
            if !ops.is_empty() {
                working.wal.append(tx_id, &ops)?;
            }
            working.commits_since_checkpoint += 1;
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

impl Drop for PersistentTransaction<'_> {
    fn drop(&mut self) {
        if !self.done {
            tracing::warn!("persistent transaction dropped without commit or abort; discarding writes");
        }
    }
}

impl StorageAdapter for PersistentAdapter {
    fn connect(&self) -> Result<()> {
        Ok(())
    }

    fn disconnect(&self) -> Result<()> {
        self.checkpoint()
    }

    fn destroy(&self) -> Result<()> {
        let mut working = self.working.write();
        for coll in working.collections.values_mut() {
            coll.clear()?;
        }
        working.wal.reset()?;
        working.commits_since_checkpoint = 0;
        drop(working);
        let snap = snapshot_path(&self.db_path);
        if snap.exists() {
            std::fs::remove_file(snap)?;
        }
        Ok(())
    }

    fn begin_transaction(&self, _collections: &[&str], mode: Mode) -> Result<Box<dyn Transaction>> {
        let tx_id = self.next_tx_id.fetch_add(1, Ordering::SeqCst);
        self.maybe_checkpoint()?;
        Ok(Box::new(PersistentTransaction {
            adapter: self,
            tx_id,
            overlays: BTreeMap::new(),
            mode,
            done: false,
        }))
    }

    fn get_collection(&self, name: &str) -> Result<Box<dyn Collection>> {
        if !self.working.read().collections.contains_key(name) {
            return Err(VfsError::not_found(format!("collection {name}")));
        }
        Ok(Box::new(PersistentCollectionHandle {
            adapter: self,
            name: name.to_string(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn node(id: &str) -> Value {
        json!({"nodeId": id, "moduleId": "notes", "systemPath": format!("/notes/{id}.md"), "parentId": Value::Null, "type": "file"})
    }

    #[test]
    fn commits_survive_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("db");

        {
            let adapter = PersistentAdapter::open(&path, Config::ephemeral()).unwrap();
            let mut tx = adapter.begin_transaction(&["vnodes"], Mode::ReadWrite).unwrap();
            tx.collection("vnodes").unwrap().put(node("n1")).unwrap();
            tx.commit().unwrap();
        }

        let reopened = PersistentAdapter::open(&path, Config::ephemeral()).unwrap();
        let coll = reopened.get_collection("vnodes").unwrap();
        assert!(coll.get(&json!("n1")).unwrap().is_some());
    }

    #[test]
    fn checkpoint_resets_wal_but_keeps_data() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("db");
        let adapter = PersistentAdapter::open(&path, Config::ephemeral()).unwrap();
        let mut tx = adapter.begin_transaction(&["vnodes"], Mode::ReadWrite).unwrap();
        tx.collection("vnodes").unwrap().put(node("n1")).unwrap();
        tx.commit().unwrap();

        adapter.checkpoint().unwrap();

        let coll = adapter.get_collection("vnodes").unwrap();
        assert!(coll.get(&json!("n1")).unwrap().is_some());

        drop(adapter);
        let reopened = PersistentAdapter::open(&path, Config::ephemeral()).unwrap();
        let coll = reopened.get_collection("vnodes").unwrap();
        assert!(coll.get(&json!("n1")).unwrap().is_some());
    }

    #[test]
    fn abort_does_not_touch_wal() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("db");
        let adapter = PersistentAdapter::open(&path, Config::ephemeral()).unwrap();
        let mut tx = adapter.begin_transaction(&["vnodes"], Mode::ReadWrite).unwrap();
        tx.collection("vnodes").unwrap().put(node("n1")).unwrap();
        tx.abort().unwrap();

        let coll = adapter.get_collection("vnodes").unwrap();
        assert!(coll.get(&json!("n1")).unwrap().is_none());
    }
}
