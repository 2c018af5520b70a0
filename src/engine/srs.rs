//! Spaced-repetition item operations (spec.md §4.5).

use serde_json::Value;

use crate::engine::VfsEngine;
use crate::error::Result;
use crate::model::{now_millis, NodeId, SrsItem};
use crate::storage::adapter::{Direction, Mode, QueryOptions, Range};

impl VfsEngine {
    fn srs_key(node_id: &str, cloze_id: &str) -> Value {
        Value::Array(vec![
            Value::String(node_id.to_string()),
            Value::String(cloze_id.to_string()),
        ])
    }

    /// Upserts a single `(nodeId, clozeId)` row, incrementing `reviewCount`
    /// from the prior value (0 if this is the first review).
    pub fn update_srs_item_by_id(
        &self,
        node_id: &NodeId,
        cloze_id: &str,
        module_id: &str,
        due_at: u64,
        interval: u32,
        ease: f64,
    ) -> Result<SrsItem> {
        let mut tx = self.storage.begin_transaction(&["srsItems"], Mode::ReadWrite)?;
        let coll = tx.collection("srsItems")?;

        let prior_review_count = coll
            .get(&Self::srs_key(node_id, cloze_id))?
            .and_then(|v| v.get("reviewCount").and_then(Value::as_u64))
            .unwrap_or(0) as u32;

        let item = SrsItem {
            node_id: node_id.clone(),
            cloze_id: cloze_id.to_string(),
            module_id: module_id.to_string(),
            due_at,
            interval,
            ease,
            review_count: prior_review_count + 1,
            last_reviewed_at: Some(now_millis()),
        };
        coll.put(serde_json::to_value(&item)?)?;
        tx.commit()?;
        Ok(item)
    }

    /// Writes an SRS row exactly as given, bypassing the `reviewCount`
    /// increment `update_srs_item_by_id` performs — used by
    /// `facade::Facade`'s backup restore, which is reconstructing prior
    /// state rather than recording a new review.
    pub(crate) fn restore_srs_item(&self, item: &SrsItem) -> Result<()> {
        let mut tx = self.storage.begin_transaction(&["srsItems"], Mode::ReadWrite)?;
        tx.collection("srsItems")?.put(serde_json::to_value(item)?)?;
        tx.commit()
    }

    /// Every SRS row owned by `node_id`.
    pub fn get_srs_items_by_node_id(&self, node_id: &NodeId) -> Result<Vec<SrsItem>> {
        let coll = self.storage.get_collection("srsItems")?;
        let rows = coll.get_all_by_index("by_node", &Value::String(node_id.clone()))?;
        rows.into_iter()
            .map(|v| Ok(serde_json::from_value(v)?))
            .collect()
    }

    /// Rows due at or before now, optionally scoped to one module, bounded
    /// by `limit`.
    pub fn get_due_srs_items(&self, module_id: Option<&str>, limit: Option<usize>) -> Result<Vec<SrsItem>> {
        let coll = self.storage.get_collection("srsItems")?;
        let now = now_millis();

        let options = QueryOptions::new()
            .with_index("by_due")
            .with_direction(Direction::Next)
            .with_range(Range {
                lower: None,
                upper: Some(Value::from(now)),
                lower_open: false,
                upper_open: false,
            });
        let rows = coll.query(&options)?;

        let mut out = Vec::new();
        for row in rows {
            let item: SrsItem = serde_json::from_value(row)?;
            if let Some(m) = module_id {
                if item.module_id != m {
                    continue;
                }
            }
            out.push(item);
            if let Some(limit) = limit {
                if out.len() >= limit {
                    break;
                }
            }
        }
        Ok(out)
    }
}
