//! Durable, WAL-backed storage adapter (feature `persistent`).

mod adapter;
mod snapshot;
mod wal;

pub use adapter::PersistentAdapter;
pub use wal::Operation;
