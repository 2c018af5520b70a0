//! Storage-adapter durability configuration.

/// How aggressively the persistent storage adapter flushes to disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// fsync the WAL on every commit. Slowest, safest.
    Full,
    /// fsync on checkpoint only; individual commits are buffered.
    Normal,
    /// Never fsync explicitly; rely on the OS to flush eventually. Only
    /// sensible for throwaway/test databases.
    Off,
}

/// Durability and housekeeping knobs for a [`crate::storage::persistent`]
/// adapter. The memory adapter ignores this entirely.
#[derive(Debug, Clone)]
pub struct Config {
    /// Name of the backing database (§6: "a single key-value database named
    /// by configuration"). Used to derive the snapshot/WAL file names.
    pub database_name: String,
    pub sync_mode: SyncMode,
    /// Number of committed WAL frames after which the adapter folds the WAL
    /// into a fresh snapshot.
    pub checkpoint_threshold: usize,
    /// Soft ceiling on WAL size before a checkpoint is forced regardless of
    /// `checkpoint_threshold`.
    pub max_wal_size_bytes: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_name: "vfs_database".to_string(),
            sync_mode: SyncMode::Normal,
            checkpoint_threshold: 1000,
            max_wal_size_bytes: 100 * 1024 * 1024,
        }
    }
}

impl Config {
    /// Full fsync on every commit. Use when data loss is unacceptable even
    /// across a crash.
    pub fn durable() -> Self {
        Self {
            sync_mode: SyncMode::Full,
            checkpoint_threshold: 200,
            ..Self::default()
        }
    }

    /// No fsyncing at all. Use for scratch/test databases only.
    pub fn ephemeral() -> Self {
        Self {
            sync_mode: SyncMode::Off,
            checkpoint_threshold: 10_000,
            max_wal_size_bytes: 1024 * 1024 * 1024,
            ..Self::default()
        }
    }
}
