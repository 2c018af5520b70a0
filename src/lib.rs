//! A content-addressed, transactional virtual file system engine.
//!
//! Presents a POSIX-like tree of nodes (files and directories) scoped into
//! named *modules* (namespaces), processes written content through a
//! pipeline of *middlewares* that derive secondary data, and exposes
//! reactive notifications for consumers sitting on top of it.
//!
//! ## Quick start
//!
//! ```rust
//! use std::sync::Arc;
//! use vfs_engine::{Facade, MemoryAdapter};
//!
//! let facade = Facade::open(Arc::new(MemoryAdapter::new()), "my_app").unwrap();
//! facade.create_file("default", "/a.md", Some("hello"), None).unwrap();
//! assert_eq!(facade.read("default", "/a.md").unwrap(), "hello");
//! Facade::shutdown("my_app").unwrap();
//! ```
//!
//! ## Layered architecture
//!
//! - **Storage adapter**: durable key-value collections with secondary
//!   indexes and multi-collection ACID transactions ([`storage`]).
//! - **Path resolver**: bidirectional mapping between user paths and
//!   system paths ([`path`]).
//! - **Event bus**: synchronous publish/subscribe of mutation events
//!   ([`event_bus`]).
//! - **Middleware registry**: ordered content-processing hooks
//!   ([`middleware`]).
//! - **VFS core**: node CRUD, traversal, move/copy/delete, tag and SRS
//!   operations atop the above ([`engine`]).
//! - **Module registry**: mounting/unmounting of namespaces
//!   ([`module_registry`]).
//! - **Facade**: public API surface, lifecycle, backup/restore
//!   ([`facade`]).
//! - **Session adapter**: module-scoped wrapper for UI/editor consumers
//!   ([`session_adapter`]).

pub mod config;
pub mod engine;
pub mod error;
pub mod event_bus;
pub mod facade;
pub mod health;
pub mod logging;
pub mod metrics;
pub mod middleware;
pub mod model;
pub mod module_registry;
pub mod path;
pub mod session_adapter;
pub mod storage;

pub use crate::config::{Config, SyncMode};
pub use crate::engine::{CreateNodeOptions, SearchOptions, SearchScope, VfsEngine};
pub use crate::error::{Result, VfsError};
pub use crate::event_bus::{Event, EventBus, EventType, SubscriptionId, ALL_EVENT_TYPES};
pub use crate::facade::{Backup, Facade, MergeOptions, ModuleBackup, TreeData, DEFAULT_MODULE};
pub use crate::health::{Check, HealthCheck, HealthStatus};
pub use crate::metrics::{MetricsSnapshot, VfsMetrics};
pub use crate::middleware::{ClozeCountMiddleware, MermaidCountMiddleware, Middleware, MiddlewareRegistry, TaskCountMiddleware};
pub use crate::model::{
    content_ref_for, generate_node_id, now_millis, Content, ContentBytes, ContentRef, Module, NodeId, NodeTag, NodeType,
    SrsItem, Tag, VNode,
};
pub use crate::module_registry::{ModuleRegistry, MountOptions};
pub use crate::session_adapter::SessionEngine;
pub use crate::storage::adapter::{
    Collection, CollectionInTx, Direction, Mode, QueryOptions, Range, StorageAdapter, Transaction, TransactionHandle,
};
pub use crate::storage::memory::MemoryAdapter;
#[cfg(feature = "persistent")]
pub use crate::storage::persistent::PersistentAdapter;
pub use crate::storage::ALL_COLLECTIONS;
