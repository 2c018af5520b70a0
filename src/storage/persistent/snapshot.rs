//! Full-state snapshot: a single JSON file holding every collection's rows,
//! written atomically (write to a temp file, then rename) so a crash during
//! a checkpoint never leaves a half-written snapshot on disk.
//!
//! Grounded on the teacher's checkpoint concept in `db::pager`, which folds
//! dirty pages back into the main file; here the "page" is replaced by one
//! row vector per collection since this store has no fixed page layout.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

const SNAPSHOT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize, Default)]
pub(crate) struct Snapshot {
    version: u32,
    pub(crate) collections: BTreeMap<String, Vec<Value>>,
}

impl Snapshot {
    pub(crate) fn from_rows(collections: BTreeMap<String, Vec<Value>>) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            collections,
        }
    }

    pub(crate) fn load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(path)?;
        if bytes.is_empty() {
            return Ok(None);
        }
        let snapshot: Snapshot = serde_json::from_slice(&bytes)?;
        Ok(Some(snapshot))
    }

    pub(crate) fn save(&self, path: &Path) -> Result<()> {
        let tmp = snapshot_tmp_path(path);
        {
            let mut file = fs::File::create(&tmp)?;
            let bytes = serde_json::to_vec(self)?;
            file.write_all(&bytes)?;
            file.sync_data()?;
        }
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

pub(crate) fn snapshot_path(db_path: &Path) -> PathBuf {
    let mut os_string = db_path.as_os_str().to_owned();
    os_string.push(".snapshot");
    PathBuf::from(os_string)
}

fn snapshot_tmp_path(path: &Path) -> PathBuf {
    let mut os_string = path.as_os_str().to_owned();
    os_string.push(".tmp");
    PathBuf::from(os_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn round_trips_through_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("db");
        let snap_path = snapshot_path(&path);

        let mut collections = BTreeMap::new();
        collections.insert(
            "vnodes".to_string(),
            vec![serde_json::json!({"nodeId": "n1"})],
        );
        let snapshot = Snapshot::from_rows(collections);
        snapshot.save(&snap_path).unwrap();

        let loaded = Snapshot::load(&snap_path).unwrap().unwrap();
        assert_eq!(loaded.collections["vnodes"].len(), 1);
    }

    #[test]
    fn missing_file_loads_as_none() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing");
        assert!(Snapshot::load(&path).unwrap().is_none());
    }
}
