//! Ordered middleware invocation (spec.md §4.4).

use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::Map;

use crate::error::Result;
use crate::middleware::Middleware;
use crate::model::VNode;
use crate::storage::adapter::TransactionHandle;

/// Holds every registered middleware, sorted by descending priority
/// (ties broken by registration order) so `on_validate`/`on_before_write`
/// run highest-priority first and `on_after_write` metadata merges with
/// later (lower-priority) middlewares able to override earlier output.
pub struct MiddlewareRegistry {
    middlewares: Vec<Box<dyn Middleware>>,
    hook_invocations: AtomicU64,
}

impl MiddlewareRegistry {
    pub fn new() -> Self {
        Self {
            middlewares: Vec::new(),
            hook_invocations: AtomicU64::new(0),
        }
    }

    /// Total hook calls (`on_validate`, `on_before_read`, ...) made across
    /// every middleware since this registry was created. Fed into
    /// `VfsMetrics::snapshot` by the facade.
    pub fn hook_invocations(&self) -> u64 {
        self.hook_invocations.load(Ordering::Relaxed)
    }

    fn count_hook(&self) {
        self.hook_invocations.fetch_add(1, Ordering::Relaxed);
    }

    /// Registers `middleware`, then re-sorts by descending priority. Stable
    /// sort keeps registration order among equal priorities.
    pub fn register(&mut self, middleware: Box<dyn Middleware>) {
        self.middlewares.push(middleware);
        self.middlewares.sort_by_key(|m| std::cmp::Reverse(m.priority()));
    }

    fn applicable(&self, node: &VNode) -> impl Iterator<Item = &Box<dyn Middleware>> {
        self.middlewares.iter().filter(move |m| m.can_handle(node))
    }

    /// Runs every applicable middleware's `on_validate`; the first `Err`
    /// aborts the write with no side effects.
    pub fn validate(&self, node: &VNode, content: Option<&str>) -> Result<()> {
        for mw in self.applicable(node) {
            self.count_hook();
            mw.on_validate(node, content)?;
        }
        Ok(())
    }

    pub fn before_read(&self, node: &VNode) -> Result<()> {
        for mw in self.applicable(node) {
            self.count_hook();
            mw.on_before_read(node)?;
        }
        Ok(())
    }

    pub fn after_read(&self, node: &VNode, content: &str) -> Result<()> {
        for mw in self.applicable(node) {
            self.count_hook();
            mw.on_after_read(node, content)?;
        }
        Ok(())
    }

    /// Chains `on_before_write` across every applicable middleware, feeding
    /// each one's output into the next.
    pub fn before_write(
        &self,
        node: &VNode,
        mut content: String,
        tx: &dyn TransactionHandle,
    ) -> Result<String> {
        for mw in self.applicable(node) {
            self.count_hook();
            content = mw.on_before_write(node, content, tx)?;
        }
        Ok(content)
    }

    /// Runs every applicable middleware's `on_after_write`, merging the
    /// resulting metadata maps in invocation order (later entries win on
    /// key collision).
    pub fn after_write(
        &self,
        node: &VNode,
        content: &str,
        tx: &dyn TransactionHandle,
    ) -> Result<Map<String, serde_json::Value>> {
        let mut merged = Map::new();
        for mw in self.applicable(node) {
            self.count_hook();
            let out = mw.on_after_write(node, content, tx)?;
            merged.extend(out);
        }
        Ok(merged)
    }

    pub fn before_delete(&self, node: &VNode, tx: &dyn TransactionHandle) -> Result<()> {
        for mw in self.applicable(node) {
            self.count_hook();
            mw.on_before_delete(node, tx)?;
        }
        Ok(())
    }

    pub fn after_delete(&self, node: &VNode, tx: &dyn TransactionHandle) -> Result<()> {
        for mw in self.applicable(node) {
            self.count_hook();
            mw.on_after_delete(node, tx)?;
        }
        Ok(())
    }
}

impl Default for MiddlewareRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NodeType;
    use serde_json::Map as JsonMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct NoopTx;
    impl TransactionHandle for NoopTx {
        fn collection(&mut self, _name: &str) -> Result<&mut dyn crate::storage::adapter::CollectionInTx> {
            unreachable!()
        }
    }

    struct OrderRecorder {
        name: &'static str,
        priority: i32,
        order: Arc<std::sync::Mutex<Vec<&'static str>>>,
    }

    impl Middleware for OrderRecorder {
        fn name(&self) -> &str {
            self.name
        }
        fn priority(&self) -> i32 {
            self.priority
        }
        fn on_validate(&self, _node: &VNode, _content: Option<&str>) -> Result<()> {
            self.order.lock().unwrap().push(self.name);
            Ok(())
        }
    }

    fn node() -> VNode {
        VNode {
            node_id: "n1".into(),
            node_type: NodeType::File,
            parent_id: None,
            name: "a.md".into(),
            system_path: "/notes/a.md".into(),
            module_id: "notes".into(),
            content_ref: None,
            size: 0,
            created_at: 0,
            modified_at: 0,
            metadata: JsonMap::new(),
            tags: Vec::new(),
        }
    }

    #[test]
    fn runs_highest_priority_first() {
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut registry = MiddlewareRegistry::new();
        registry.register(Box::new(OrderRecorder {
            name: "low",
            priority: 0,
            order: order.clone(),
        }));
        registry.register(Box::new(OrderRecorder {
            name: "high",
            priority: 10,
            order: order.clone(),
        }));

        registry.validate(&node(), None).unwrap();
        assert_eq!(*order.lock().unwrap(), vec!["high", "low"]);
    }

    #[test]
    fn after_write_merges_metadata_in_order() {
        use crate::middleware::{ClozeCountMiddleware, TaskCountMiddleware};
        let mut registry = MiddlewareRegistry::new();
        registry.register(Box::new(TaskCountMiddleware));
        registry.register(Box::new(ClozeCountMiddleware));

        let merged = registry
            .after_write(&node(), "- [ ] a\n{{c1::x}}", &NoopTx)
            .unwrap();
        assert_eq!(merged.get("taskCount").unwrap().as_u64(), Some(1));
        assert_eq!(merged.get("clozeCount").unwrap().as_u64(), Some(1));
    }
}
