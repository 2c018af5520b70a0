//! Append-only write-ahead log.
//!
//! Adapted from the teacher's `pager::wal::Wal` (magic bytes, version
//! header, per-frame CRC32, a commit-frame flag, sequence-numbered frames
//! detected as out-of-order corruption) but framing variable-length
//! serialized [`Operation`]s instead of fixed-size pages, since VFS content
//! blobs vary in size where graph pages do not.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crc32fast::Hasher;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, VfsError};

const WAL_MAGIC: &[u8; 8] = b"VFSWAL\0\0";
const WAL_VERSION_MAJOR: u16 = 1;
const WAL_VERSION_MINOR: u16 = 0;
const WAL_HEADER_SIZE: usize = 32;
const FRAME_HEADER_SIZE: usize = 20;
const FRAME_FLAG_COMMIT: u32 = 0x1;

/// One mutation recorded in the log. `tx_id`-grouped frames only take
/// effect once their matching commit frame is seen during replay — an
/// aborted or crashed-mid-write transaction leaves no trace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Operation {
    Put { collection: String, value: Value },
    Delete { collection: String, key: Value },
    Clear { collection: String },
}

pub(crate) struct Wal {
    file: File,
    next_frame_number: u32,
    sync_enabled: bool,
}

impl Wal {
    pub(crate) fn open(path: &Path, sync_enabled: bool) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        let mut wal = Self {
            file,
            next_frame_number: 1,
            sync_enabled,
        };

        let len = wal.file.metadata()?.len();
        if len == 0 {
            wal.write_header()?;
        } else {
            wal.validate_header()?;
            wal.next_frame_number = wal.scan_frame_count()? + 1;
        }
        Ok(wal)
    }

    pub(crate) fn append(&mut self, tx_id: u64, ops: &[Operation]) -> Result<()> {
        for op in ops {
            let payload = serde_json::to_vec(op)?;
            self.append_frame(tx_id, 0, &payload)?;
        }
        self.append_frame(tx_id, FRAME_FLAG_COMMIT, &[])?;
        self.sync()
    }

    fn append_frame(&mut self, tx_id: u64, flags: u32, payload: &[u8]) -> Result<()> {
        let mut header = [0u8; FRAME_HEADER_SIZE];
        let checksum = checksum_for(payload);
        header[0..4].copy_from_slice(&(payload.len() as u32).to_le_bytes());
        header[4..12].copy_from_slice(&tx_id.to_le_bytes());
        header[12..16].copy_from_slice(&flags.to_le_bytes());
        header[16..20].copy_from_slice(&checksum.to_le_bytes());

        self.file.seek(SeekFrom::End(0))?;
        self.file.write_all(&header)?;
        self.file.write_all(payload)?;
        self.next_frame_number = self
            .next_frame_number
            .checked_add(1)
            .ok_or_else(|| VfsError::Corruption("WAL frame number overflow".into()))?;
        Ok(())
    }

    fn sync(&mut self) -> Result<()> {
        if self.sync_enabled {
            self.file.sync_data()?;
        }
        Ok(())
    }

    pub(crate) fn size(&self) -> Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    /// Truncates the log back to just its header, for use right after a
    /// checkpoint has folded every committed frame into a snapshot.
    pub(crate) fn reset(&mut self) -> Result<()> {
        self.file.set_len(WAL_HEADER_SIZE as u64)?;
        self.file.seek(SeekFrom::End(0))?;
        self.next_frame_number = 1;
        self.file.sync_data()?;
        Ok(())
    }

    /// Replays every committed transaction's operations, in commit order,
    /// into `apply`. A transaction whose frames were never followed by a
    /// commit frame (crash mid-write) is silently dropped.
    pub(crate) fn replay<F>(&mut self, mut apply: F) -> Result<u32>
    where
        F: FnMut(&Operation) -> Result<()>,
    {
        self.file.seek(SeekFrom::Start(WAL_HEADER_SIZE as u64))?;
        let mut pending: HashMap<u64, Vec<Operation>> = HashMap::new();
        let mut applied = 0u32;

        loop {
            let mut header = [0u8; FRAME_HEADER_SIZE];
            if !self.read_exact_or_eof(&mut header)? {
                break;
            }
            let payload_len = u32::from_le_bytes(header[0..4].try_into().unwrap()) as usize;
            let tx_id = u64::from_le_bytes(header[4..12].try_into().unwrap());
            let flags = u32::from_le_bytes(header[12..16].try_into().unwrap());
            let checksum = u32::from_le_bytes(header[16..20].try_into().unwrap());

            let mut payload = vec![0u8; payload_len];
            if payload_len > 0 && !self.read_exact_or_eof(&mut payload)? {
                return Err(VfsError::Corruption("WAL contains partial frame payload".into()));
            }
            if checksum_for(&payload) != checksum {
                return Err(VfsError::Corruption("WAL frame checksum mismatch".into()));
            }

            if flags & FRAME_FLAG_COMMIT != 0 {
                if let Some(ops) = pending.remove(&tx_id) {
                    for op in &ops {
                        apply(op)?;
                        applied += 1;
                    }
                }
                continue;
            }

            let op: Operation = serde_json::from_slice(&payload)?;
            pending.entry(tx_id).or_default().push(op);
        }

        Ok(applied)
    }

    fn write_header(&mut self) -> Result<()> {
        let mut header = [0u8; WAL_HEADER_SIZE];
        header[..WAL_MAGIC.len()].copy_from_slice(WAL_MAGIC);
        header[8..10].copy_from_slice(&WAL_VERSION_MAJOR.to_le_bytes());
        header[10..12].copy_from_slice(&WAL_VERSION_MINOR.to_le_bytes());
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(&header)?;
        self.file.sync_data()?;
        Ok(())
    }

    fn validate_header(&mut self) -> Result<()> {
        let mut header = [0u8; WAL_HEADER_SIZE];
        self.file.seek(SeekFrom::Start(0))?;
        self.file.read_exact(&mut header)?;
        if &header[..WAL_MAGIC.len()] != WAL_MAGIC {
            return Err(VfsError::Corruption("invalid WAL magic".into()));
        }
        let major = u16::from_le_bytes([header[8], header[9]]);
        let minor = u16::from_le_bytes([header[10], header[11]]);
        if major != WAL_VERSION_MAJOR || minor != WAL_VERSION_MINOR {
            return Err(VfsError::Corruption("unsupported WAL version".into()));
        }
        Ok(())
    }

    fn scan_frame_count(&mut self) -> Result<u32> {
        self.file.seek(SeekFrom::Start(WAL_HEADER_SIZE as u64))?;
        let mut count = 0u32;
        loop {
            let mut header = [0u8; FRAME_HEADER_SIZE];
            if !self.read_exact_or_eof(&mut header)? {
                break;
            }
            let payload_len = u32::from_le_bytes(header[0..4].try_into().unwrap()) as usize;
            let mut payload = vec![0u8; payload_len];
            if payload_len > 0 && !self.read_exact_or_eof(&mut payload)? {
                return Err(VfsError::Corruption("WAL contains partial frame payload".into()));
            }
            count += 1;
        }
        Ok(count)
    }

    fn read_exact_or_eof(&mut self, buf: &mut [u8]) -> Result<bool> {
        let mut read = 0usize;
        while read < buf.len() {
            let n = self.file.read(&mut buf[read..])?;
            if n == 0 {
                if read == 0 {
                    return Ok(false);
                }
                return Err(VfsError::Corruption("WAL contains partial frame data".into()));
            }
            read += n;
        }
        Ok(true)
    }
}

fn checksum_for(bytes: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(bytes);
    hasher.finalize()
}

pub(crate) fn wal_path(db_path: &Path) -> PathBuf {
    let mut os_string = db_path.as_os_str().to_owned();
    os_string.push(".wal");
    PathBuf::from(os_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn replay_applies_only_committed_transactions() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("db");
        let mut wal = Wal::open(&wal_path(&path), true).unwrap();

        wal.append(
            1,
            &[Operation::Put {
                collection: "vnodes".to_string(),
                value: serde_json::json!({"nodeId": "n1"}),
            }],
        )
        .unwrap();

        // Simulate a crash mid-transaction: a frame with no commit frame.
        let mut header = [0u8; FRAME_HEADER_SIZE];
        let payload = serde_json::to_vec(&Operation::Delete {
            collection: "vnodes".to_string(),
            key: serde_json::json!("n1"),
        })
        .unwrap();
        header[0..4].copy_from_slice(&(payload.len() as u32).to_le_bytes());
        header[4..12].copy_from_slice(&2u64.to_le_bytes());
        header[16..20].copy_from_slice(&checksum_for(&payload).to_le_bytes());
        wal.file.seek(SeekFrom::End(0)).unwrap();
        wal.file.write_all(&header).unwrap();
        wal.file.write_all(&payload).unwrap();

        let mut applied = Vec::new();
        let count = wal
            .replay(|op| {
                applied.push(op.clone());
                Ok(())
            })
            .unwrap();
        assert_eq!(count, 1);
        assert_eq!(applied.len(), 1);
    }
}
