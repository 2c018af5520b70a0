//! The in-memory collection engine shared by [`crate::storage::memory`] and
//! the persistent adapter's working set: a `BTreeMap` of rows plus one
//! `BTreeMap` per declared index, built from [`crate::storage::schema`].
//! Kept in one place so both adapters maintain indexes identically.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::{Result, VfsError};
use crate::storage::adapter::{Collection, CollectionInTx, Direction, QueryOptions};
use crate::storage::schema::{value_sort_key, CollectionSchema};

#[derive(Clone, Default)]
pub(crate) struct IndexEntry {
    /// The raw index value, kept alongside the sort key so `Range` can
    /// compare against it with its native type instead of a string.
    value: Value,
    primary_keys: Vec<String>,
}

pub(crate) struct CollectionData {
    pub(crate) schema: CollectionSchema,
    pub(crate) rows: BTreeMap<String, Value>,
    // index name -> (index sort key -> entry)
    pub(crate) indexes: BTreeMap<String, BTreeMap<String, IndexEntry>>,
}

impl CollectionData {
    pub(crate) fn new(schema: CollectionSchema) -> Self {
        let indexes = schema
            .indexes
            .iter()
            .map(|spec| (spec.name.clone(), BTreeMap::new()))
            .collect();
        Self {
            schema,
            rows: BTreeMap::new(),
            indexes,
        }
    }

    /// Rebuilds every index from `rows` — used after loading a snapshot,
    /// which only persists row data.
    pub(crate) fn reindex(&mut self) {
        for map in self.indexes.values_mut() {
            map.clear();
        }
        let rows: Vec<Value> = self.rows.values().cloned().collect();
        for row in rows {
            let pk_sort = value_sort_key(&(self.schema.primary_key)(&row));
            self.index_row(&row, &pk_sort);
        }
    }

    fn index_row(&mut self, value: &Value, pk_sort: &str) {
        for spec in &self.schema.indexes {
            let idx_value = (spec.key_fn)(value);
            let idx_sort = value_sort_key(&idx_value);
            let map = self.indexes.get_mut(&spec.name).expect("index declared");
            let entry = map.entry(idx_sort).or_insert_with(|| IndexEntry {
                value: idx_value.clone(),
                primary_keys: Vec::new(),
            });
            if !entry.primary_keys.contains(&pk_sort.to_string()) {
                entry.primary_keys.push(pk_sort.to_string());
            }
        }
    }

    fn remove_from_indexes(&mut self, row: &Value, pk_sort: &str) {
        for spec in &self.schema.indexes {
            let idx_value = (spec.key_fn)(row);
            let idx_sort = value_sort_key(&idx_value);
            if let Some(entry) = self
                .indexes
                .get_mut(&spec.name)
                .and_then(|m| m.get_mut(&idx_sort))
            {
                entry.primary_keys.retain(|k| k != pk_sort);
            }
        }
    }

    pub(crate) fn put(&mut self, value: Value) -> Result<()> {
        let pk = (self.schema.primary_key)(&value);
        let pk_sort = value_sort_key(&pk);

        if let Some(old) = self.rows.get(&pk_sort).cloned() {
            self.remove_from_indexes(&old, &pk_sort);
        }

        for spec in &self.schema.indexes {
            if !spec.unique {
                continue;
            }
            let idx_value = (spec.key_fn)(&value);
            let idx_sort = value_sort_key(&idx_value);
            if let Some(existing) = self.indexes.get(&spec.name).and_then(|m| m.get(&idx_sort)) {
                if existing.primary_keys.iter().any(|k| k != &pk_sort) {
                    return Err(VfsError::already_exists(format!(
                        "unique index {} violated",
                        spec.name
                    )));
                }
            }
        }

        self.index_row(&value, &pk_sort);
        self.rows.insert(pk_sort, value);
        Ok(())
    }

    pub(crate) fn delete(&mut self, key: &Value) -> Result<()> {
        let pk_sort = value_sort_key(key);
        if let Some(old) = self.rows.remove(&pk_sort) {
            self.remove_from_indexes(&old, &pk_sort);
        }
        Ok(())
    }

    pub(crate) fn get(&self, key: &Value) -> Option<Value> {
        self.rows.get(&value_sort_key(key)).cloned()
    }

    pub(crate) fn get_all_by_index(&self, index_name: &str, value: &Value) -> Vec<Value> {
        let Some(map) = self.indexes.get(index_name) else {
            return Vec::new();
        };
        let sort = value_sort_key(value);
        match map.get(&sort) {
            Some(entry) => entry
                .primary_keys
                .iter()
                .filter_map(|pk| self.rows.get(pk).cloned())
                .collect(),
            None => Vec::new(),
        }
    }

    pub(crate) fn query(&self, options: &QueryOptions) -> Vec<Value> {
        let mut rows: Vec<Value> = if let Some(index_name) = &options.index {
            let Some(map) = self.indexes.get(index_name) else {
                return Vec::new();
            };
            let mut out = Vec::new();
            for entry in map.values() {
                if let Some(range) = &options.range {
                    if !range.contains(&entry.value) {
                        continue;
                    }
                }
                for pk in &entry.primary_keys {
                    if let Some(row) = self.rows.get(pk) {
                        out.push(row.clone());
                    }
                }
            }
            out
        } else {
            self.rows.values().cloned().collect()
        };

        if options.direction == Direction::Prev {
            rows.reverse();
        }
        if let Some(filter) = &options.filter {
            rows.retain(|r| filter(r));
        }
        let offset = options.offset.unwrap_or(0);
        if offset > 0 {
            rows = rows.into_iter().skip(offset).collect();
        }
        if let Some(limit) = options.limit {
            rows.truncate(limit);
        }
        rows
    }
}

impl Clone for CollectionData {
    fn clone(&self) -> Self {
        Self {
            schema: self.schema.clone(),
            rows: self.rows.clone(),
            indexes: self.indexes.clone(),
        }
    }
}

impl Collection for CollectionData {
    fn get(&self, key: &Value) -> Result<Option<Value>> {
        Ok(CollectionData::get(self, key))
    }

    fn get_all(&self) -> Result<Vec<Value>> {
        Ok(self.rows.values().cloned().collect())
    }

    fn count(&self) -> Result<usize> {
        Ok(self.rows.len())
    }

    fn get_by_index(&self, index_name: &str, value: &Value) -> Result<Option<Value>> {
        Ok(self.get_all_by_index(index_name, value).into_iter().next())
    }

    fn get_all_by_index(&self, index_name: &str, value: &Value) -> Result<Vec<Value>> {
        Ok(CollectionData::get_all_by_index(self, index_name, value))
    }

    fn query(&self, options: &QueryOptions) -> Result<Vec<Value>> {
        Ok(CollectionData::query(self, options))
    }
}

impl CollectionInTx for CollectionData {
    fn put(&mut self, value: Value) -> Result<()> {
        CollectionData::put(self, value)
    }

    fn delete(&mut self, key: &Value) -> Result<()> {
        CollectionData::delete(self, key)
    }

    fn clear(&mut self) -> Result<()> {
        self.rows.clear();
        for map in self.indexes.values_mut() {
            map.clear();
        }
        Ok(())
    }
}
