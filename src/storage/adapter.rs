//! The storage adapter contract (spec.md §4.1).
//!
//! Rows are type-erased as `serde_json::Value` at this layer — the same
//! contract an IndexedDB-style adapter exposes to its caller — with typed
//! (de)serialization happening in `engine::` where the concrete row shape
//! (`VNode`, `Content`, ...) is known. This keeps the trait object-safe
//! (no generic methods) while every collection stays schema-flexible,
//! mirroring how the teacher's `Transaction` consumes `self` on
//! `commit`/`rollback` rather than threading a type parameter through.

use serde_json::Value;

use crate::error::Result;

/// `readonly` transactions never call `put`/`delete`/`clear` on a
/// [`CollectionInTx`]; adapters may use the distinction to skip taking a
/// write lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    ReadOnly,
    ReadWrite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Next,
    Prev,
}

/// An inclusive/exclusive bound on an index's values, used by `query`.
#[derive(Debug, Clone, Default)]
pub struct Range {
    pub lower: Option<Value>,
    pub upper: Option<Value>,
    pub lower_open: bool,
    pub upper_open: bool,
}

impl Range {
    pub fn contains(&self, v: &Value) -> bool {
        if let Some(lower) = &self.lower {
            let cmp = compare_values(v, lower);
            if self.lower_open {
                if cmp != std::cmp::Ordering::Greater {
                    return false;
                }
            } else if cmp == std::cmp::Ordering::Less {
                return false;
            }
        }
        if let Some(upper) = &self.upper {
            let cmp = compare_values(v, upper);
            if self.upper_open {
                if cmp != std::cmp::Ordering::Less {
                    return false;
                }
            } else if cmp == std::cmp::Ordering::Greater {
                return false;
            }
        }
        true
    }
}

/// Orders two index values. Numbers compare numerically, strings
/// lexicographically; mixed types fall back to `Equal` (callers only ever
/// range-query over a single consistent index value type).
pub fn compare_values(a: &Value, b: &Value) -> std::cmp::Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .unwrap_or(0.0)
            .partial_cmp(&y.as_f64().unwrap_or(0.0))
            .unwrap_or(std::cmp::Ordering::Equal),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => std::cmp::Ordering::Equal,
    }
}

/// Options for [`Collection::query`].
#[derive(Default)]
pub struct QueryOptions {
    pub index: Option<String>,
    pub range: Option<Range>,
    pub direction: Direction,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    pub filter: Option<Box<dyn Fn(&Value) -> bool + Send + Sync>>,
}

impl Default for Direction {
    fn default() -> Self {
        Direction::Next
    }
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_index(mut self, index: impl Into<String>) -> Self {
        self.index = Some(index.into());
        self
    }

    pub fn with_range(mut self, range: Range) -> Self {
        self.range = Some(range);
        self
    }

    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn with_filter(mut self, filter: impl Fn(&Value) -> bool + Send + Sync + 'static) -> Self {
        self.filter = Some(Box::new(filter));
        self
    }
}

/// Read-only view of a collection, usable both inside and outside a
/// transaction.
pub trait Collection: Send {
    fn get(&self, key: &Value) -> Result<Option<Value>>;
    fn get_all(&self) -> Result<Vec<Value>>;
    fn count(&self) -> Result<usize>;
    fn get_by_index(&self, index_name: &str, value: &Value) -> Result<Option<Value>>;
    fn get_all_by_index(&self, index_name: &str, value: &Value) -> Result<Vec<Value>>;
    fn query(&self, options: &QueryOptions) -> Result<Vec<Value>>;
}

/// A collection as seen from within a transaction: reads plus mutations.
pub trait CollectionInTx: Collection {
    fn put(&mut self, value: Value) -> Result<()>;
    fn delete(&mut self, key: &Value) -> Result<()>;
    fn clear(&mut self) -> Result<()>;
    fn bulk_put(&mut self, values: Vec<Value>) -> Result<()> {
        for v in values {
            self.put(v)?;
        }
        Ok(())
    }
    fn bulk_delete(&mut self, keys: Vec<Value>) -> Result<()> {
        for k in keys {
            self.delete(&k)?;
        }
        Ok(())
    }
}

/// The subset of [`Transaction`] middleware hooks are handed: access to
/// collections, no ability to commit or abort (that stays with the engine
/// code that opened the transaction).
pub trait TransactionHandle: Send {
    fn collection(&mut self, name: &str) -> Result<&mut dyn CollectionInTx>;
}

/// An open, multi-collection transaction. All writes across the named
/// collections commit atomically on [`Transaction::commit`], or are fully
/// rolled back on [`Transaction::abort`] / drop-without-commit.
pub trait Transaction: TransactionHandle {
    fn commit(self: Box<Self>) -> Result<()>;
    fn abort(self: Box<Self>) -> Result<()>;
}

/// The storage backend contract (spec.md §4.1). Implemented by
/// [`crate::storage::memory::MemoryAdapter`] and, behind the `persistent`
/// feature, [`crate::storage::persistent::PersistentAdapter`].
pub trait StorageAdapter: Send + Sync {
    fn connect(&self) -> Result<()>;
    fn disconnect(&self) -> Result<()>;
    /// Destructive reset: drops every collection's contents.
    fn destroy(&self) -> Result<()>;

    fn begin_transaction(&self, collections: &[&str], mode: Mode) -> Result<Box<dyn Transaction>>;

    /// Ad-hoc read access outside any transaction.
    fn get_collection(&self, name: &str) -> Result<Box<dyn Collection>>;
}
