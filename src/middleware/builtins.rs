//! Derived-metadata middlewares: count occurrences of a content pattern on
//! write and expose the result through [`crate::model::VNode`]'s typed
//! accessors (spec.md §9's "typed accessors for known keys").

use serde_json::{Map, Value};

use crate::error::Result;
use crate::middleware::Middleware;
use crate::model::VNode;
use crate::storage::adapter::TransactionHandle;

/// Counts Markdown task list items (`- [ ]` / `- [x]`) in written content.
#[derive(Default)]
pub struct TaskCountMiddleware;

impl Middleware for TaskCountMiddleware {
    fn name(&self) -> &str {
        "task-count"
    }

    fn can_handle(&self, node: &VNode) -> bool {
        node.is_file()
    }

    fn on_after_write(
        &self,
        _node: &VNode,
        content: &str,
        _tx: &dyn TransactionHandle,
    ) -> Result<Map<String, Value>> {
        let count = content
            .lines()
            .filter(|line| {
                let trimmed = line.trim_start();
                trimmed.starts_with("- [ ]")
                    || trimmed.starts_with("- [x]")
                    || trimmed.starts_with("- [X]")
            })
            .count();
        let mut out = Map::new();
        out.insert("taskCount".to_string(), Value::from(count as u64));
        Ok(out)
    }
}

/// Counts Anki-style cloze deletions (`{{c1::...}}`) in written content.
#[derive(Default)]
pub struct ClozeCountMiddleware;

impl Middleware for ClozeCountMiddleware {
    fn name(&self) -> &str {
        "cloze-count"
    }

    fn can_handle(&self, node: &VNode) -> bool {
        node.is_file()
    }

    fn on_after_write(
        &self,
        _node: &VNode,
        content: &str,
        _tx: &dyn TransactionHandle,
    ) -> Result<Map<String, Value>> {
        let count = count_non_overlapping(content, "{{c");
        let mut out = Map::new();
        out.insert("clozeCount".to_string(), Value::from(count as u64));
        Ok(out)
    }
}

/// Counts fenced ```mermaid``` code blocks in written content.
#[derive(Default)]
pub struct MermaidCountMiddleware;

impl Middleware for MermaidCountMiddleware {
    fn name(&self) -> &str {
        "mermaid-count"
    }

    fn can_handle(&self, node: &VNode) -> bool {
        node.is_file()
    }

    fn on_after_write(
        &self,
        _node: &VNode,
        content: &str,
        _tx: &dyn TransactionHandle,
    ) -> Result<Map<String, Value>> {
        let count = count_non_overlapping(content, "```mermaid");
        let mut out = Map::new();
        out.insert("mermaidCount".to_string(), Value::from(count as u64));
        Ok(out)
    }
}

fn count_non_overlapping(haystack: &str, needle: &str) -> usize {
    if needle.is_empty() {
        return 0;
    }
    let mut count = 0;
    let mut rest = haystack;
    while let Some(pos) = rest.find(needle) {
        count += 1;
        rest = &rest[pos + needle.len()..];
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NodeType;
    use crate::storage::adapter::CollectionInTx;
    use serde_json::Map as JsonMap;

    struct NoopTx;
    impl TransactionHandle for NoopTx {
        fn collection(&mut self, _name: &str) -> Result<&mut dyn CollectionInTx> {
            unreachable!("builtin middlewares never touch the transaction")
        }
    }

    fn file_node() -> VNode {
        VNode {
            node_id: "n1".into(),
            node_type: NodeType::File,
            parent_id: None,
            name: "a.md".into(),
            system_path: "/notes/a.md".into(),
            module_id: "notes".into(),
            content_ref: Some("content:n1".into()),
            size: 0,
            created_at: 0,
            modified_at: 0,
            metadata: JsonMap::new(),
            tags: Vec::new(),
        }
    }

    #[test]
    fn counts_task_items() {
        let node = file_node();
        let content = "- [ ] one\n- [x] two\nnot a task\n- [X] three";
        let mw = TaskCountMiddleware;
        let out = mw.on_after_write(&node, content, &NoopTx).unwrap();
        assert_eq!(out.get("taskCount").unwrap().as_u64(), Some(3));
    }

    #[test]
    fn counts_cloze_markers() {
        let node = file_node();
        let content = "recall {{c1::answer}} and {{c2::other}}";
        let mw = ClozeCountMiddleware;
        let out = mw.on_after_write(&node, content, &NoopTx).unwrap();
        assert_eq!(out.get("clozeCount").unwrap().as_u64(), Some(2));
    }

    #[test]
    fn counts_mermaid_blocks() {
        let node = file_node();
        let content = "```mermaid\ngraph TD\n```\ntext\n```mermaid\ngraph LR\n```";
        let mw = MermaidCountMiddleware;
        let out = mw.on_after_write(&node, content, &NoopTx).unwrap();
        assert_eq!(out.get("mermaidCount").unwrap().as_u64(), Some(2));
    }
}
