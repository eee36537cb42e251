//! # Store Module
//!
//! Persisted feature collections. [`FeatureTable`] is the write surface the
//! reconciliation engine goes through; [`Table`] is the in-memory row store
//! used by datasets and tests.

use crate::error::NetsyncError;
use crate::model::RowId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A persisted collection addressed by row handle.
pub trait FeatureTable<R> {
    /// Name used in log lines and storage errors.
    fn name(&self) -> &str;

    /// Snapshot of every live row in row order.
    fn scan(&self) -> Vec<(RowId, R)>;

    /// Replace the row stored under `row_id`.
    fn update(&mut self, row_id: RowId, row: R) -> Result<(), NetsyncError>;

    /// Remove the row stored under `row_id`.
    fn delete(&mut self, row_id: RowId) -> Result<(), NetsyncError>;

    /// Store a new row and return its handle.
    fn insert(&mut self, row: R) -> Result<RowId, NetsyncError>;
}

/// Write counters, kept per table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteStats {
    pub inserts: usize,
    pub updates: usize,
    pub deletes: usize,
}

impl WriteStats {
    pub fn total(&self) -> usize {
        self.inserts + self.updates + self.deletes
    }
}

/// Ordered in-memory row store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Table<R> {
    name: String,
    rows: BTreeMap<RowId, R>,
    /// Next handle to assign; handles start at 1.
    next_row_id: u64,
    #[serde(skip)]
    stats: WriteStats,
}

impl<R> Table<R> {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            rows: BTreeMap::new(),
            next_row_id: 1,
            stats: WriteStats::default(),
        }
    }

    /// Build a table from rows, assigning handles in input order.
    pub fn from_rows<I>(name: &str, rows: I) -> Self
    where
        I: IntoIterator<Item = R>,
    {
        let mut table = Self::new(name);
        for row in rows {
            table.push(row);
        }
        table
    }

    /// Append a row without counting it as a write.
    pub fn push(&mut self, row: R) -> RowId {
        let row_id = RowId(self.next_row_id);
        self.next_row_id += 1;
        self.rows.insert(row_id, row);
        row_id
    }

    pub fn get(&self, row_id: RowId) -> Option<&R> {
        self.rows.get(&row_id)
    }

    pub fn get_mut(&mut self, row_id: RowId) -> Option<&mut R> {
        self.rows.get_mut(&row_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (RowId, &R)> + '_ {
        self.rows.iter().map(|(&row_id, row)| (row_id, row))
    }

    pub fn values(&self) -> impl Iterator<Item = &R> + '_ {
        self.rows.values()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn stats(&self) -> WriteStats {
        self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats = WriteStats::default();
    }

    fn missing_row(&self, row_id: RowId) -> NetsyncError {
        NetsyncError::Storage {
            table: self.name.clone(),
            message: format!("row {} does not exist", row_id),
        }
    }
}

impl<R: Clone> FeatureTable<R> for Table<R> {
    fn name(&self) -> &str {
        &self.name
    }

    fn scan(&self) -> Vec<(RowId, R)> {
        self.rows
            .iter()
            .map(|(&row_id, row)| (row_id, row.clone()))
            .collect()
    }

    fn update(&mut self, row_id: RowId, row: R) -> Result<(), NetsyncError> {
        match self.rows.get_mut(&row_id) {
            Some(slot) => {
                *slot = row;
                self.stats.updates += 1;
                Ok(())
            }
            None => Err(self.missing_row(row_id)),
        }
    }

    fn delete(&mut self, row_id: RowId) -> Result<(), NetsyncError> {
        match self.rows.remove(&row_id) {
            Some(_) => {
                self.stats.deletes += 1;
                Ok(())
            }
            None => Err(self.missing_row(row_id)),
        }
    }

    fn insert(&mut self, row: R) -> Result<RowId, NetsyncError> {
        let row_id = self.push(row);
        self.stats.inserts += 1;
        Ok(row_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_ids_are_never_reused() {
        let mut table = Table::from_rows("nodes", ["a", "b"]);
        assert_eq!(table.len(), 2);
        table.delete(RowId(2)).unwrap();
        let row_id = table.insert("c").unwrap();
        assert_eq!(row_id, RowId(3));
        assert_eq!(table.get(RowId(2)), None);
    }

    #[test]
    fn writes_are_counted_but_pushes_are_not() {
        let mut table = Table::from_rows("links", [1, 2, 3]);
        assert_eq!(table.stats().total(), 0);
        table.update(RowId(1), 10).unwrap();
        table.delete(RowId(3)).unwrap();
        table.insert(4).unwrap();
        assert_eq!(
            table.stats(),
            WriteStats {
                inserts: 1,
                updates: 1,
                deletes: 1
            }
        );
    }

    #[test]
    fn writes_to_missing_rows_fail_with_table_name() {
        let mut table: Table<u8> = Table::new("zones");
        let err = table.update(RowId(9), 1).unwrap_err();
        assert!(err.to_string().contains("zones"));
        assert!(table.delete(RowId(9)).is_err());
    }

    #[test]
    fn table_survives_json() {
        let table = Table::from_rows("names", ["x".to_string(), "y".to_string()]);
        let json = serde_json::to_string(&table).unwrap();
        let restored: Table<String> = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.get(RowId(2)).map(String::as_str), Some("y"));
        assert_eq!(restored.len(), 2);
    }
}
