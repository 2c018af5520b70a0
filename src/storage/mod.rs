//! Storage adapters: durable key-value collections with secondary indexes
//! and multi-collection ACID transactions (spec.md §4.1).

pub mod adapter;
pub(crate) mod index_store;
pub mod memory;
#[cfg(feature = "persistent")]
pub mod persistent;
pub mod schema;

pub use adapter::{
    Collection, CollectionInTx, Direction, Mode, QueryOptions, Range, StorageAdapter, Transaction,
    TransactionHandle,
};
pub use memory::MemoryAdapter;
#[cfg(feature = "persistent")]
pub use persistent::PersistentAdapter;
pub use schema::ALL_COLLECTIONS;
