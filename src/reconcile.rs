//! # Reconciliation Engine
//!
//! Generic diff/upsert of a persisted [`FeatureTable`] against a freshly
//! computed target collection. The target is consumed: each key is matched at
//! most once, unmatched persisted rows are deleted, and whatever target rows
//! are left after the scan are inserted in their input order.

use crate::error::NetsyncError;
use crate::model::{display_optional, RowId};
use crate::store::FeatureTable;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, info, instrument, warn};

/// One changed field in one record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditEntry {
    pub key_name: String,
    pub key: String,
    pub field: String,
    pub old: String,
    pub new: String,
}

impl fmt::Display for AuditEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Changed {}={} --> {} for {}={}.",
            self.field, self.old, self.new, self.key_name, self.key
        )
    }
}

/// Outcome of one reconciliation run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconciliationDelta {
    pub inserted: usize,
    pub changed: usize,
    pub deleted: usize,
    pub audit: Vec<AuditEntry>,
}

impl ReconciliationDelta {
    /// True when the run wrote nothing.
    pub fn is_empty(&self) -> bool {
        self.inserted == 0 && self.changed == 0 && self.deleted == 0
    }

    pub fn writes(&self) -> usize {
        self.inserted + self.changed + self.deleted
    }

    pub fn absorb(&mut self, other: ReconciliationDelta) {
        self.inserted += other.inserted;
        self.changed += other.changed;
        self.deleted += other.deleted;
        self.audit.extend(other.audit);
    }
}

/// A field whose persisted value differs from the target value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldChange {
    pub field: String,
    pub old: String,
    pub new: String,
}

impl FieldChange {
    /// Compare two values and report the change, if any.
    pub fn compare<T>(field: &str, old: &T, new: &T) -> Option<Self>
    where
        T: PartialEq + fmt::Display,
    {
        (old != new).then(|| Self {
            field: field.to_string(),
            old: old.to_string(),
            new: new.to_string(),
        })
    }

    /// Same as [`FieldChange::compare`] for nullable values.
    pub fn compare_optional<T>(field: &str, old: Option<&T>, new: Option<&T>) -> Option<Self>
    where
        T: PartialEq + fmt::Display,
    {
        (old != new).then(|| Self {
            field: field.to_string(),
            old: display_optional(old),
            new: display_optional(new),
        })
    }
}

/// Keying and equality rule for one entity shape.
pub trait ReconcileRule<R> {
    type Key: Ord + Clone + fmt::Display;

    /// Name of the key field, as it appears in audit lines.
    fn key_name(&self) -> &str;

    /// Key of a persisted row. Rows without a key can never match and are
    /// deleted.
    fn persisted_key(&self, row_id: RowId, row: &R) -> Option<Self::Key>;

    /// Field-by-field comparison of a persisted row and its target.
    fn diff(&self, current: &R, target: &R) -> Vec<FieldChange>;
}

/// Make `table` equal to `target` under `rule` with the fewest writes.
///
/// # Panics
/// Panics if `target` holds the same key twice; builders never produce that.
#[instrument(skip_all, fields(table = table.name()))]
pub fn reconcile_collection<R, T, Rule>(
    table: &mut T,
    target: Vec<(Rule::Key, R)>,
    rule: &Rule,
) -> Result<ReconciliationDelta, NetsyncError>
where
    T: FeatureTable<R> + ?Sized,
    Rule: ReconcileRule<R>,
{
    // Phase 1: index the target by key; slots are emptied as keys match.
    let mut lookup: BTreeMap<Rule::Key, usize> = BTreeMap::new();
    let mut slots: Vec<Option<R>> = Vec::with_capacity(target.len());
    for (key, row) in target {
        let slot = slots.len();
        let previous = lookup.insert(key.clone(), slot);
        assert!(
            previous.is_none(),
            "target collection for `{}` holds {}={} twice",
            table.name(),
            rule.key_name(),
            key
        );
        slots.push(Some(row));
    }

    // Phase 2: single pass over persisted rows.
    let mut delta = ReconciliationDelta::default();
    for (row_id, current) in table.scan() {
        let key = rule.persisted_key(row_id, &current);
        let matched = key
            .as_ref()
            .and_then(|key| lookup.get(key))
            .and_then(|&slot| slots[slot].take());

        let Some(wanted) = matched else {
            table.delete(row_id)?;
            delta.deleted += 1;
            warn!(
                "Deleted {}={} (row {}) from {}.",
                rule.key_name(),
                display_optional(key.as_ref()),
                row_id,
                table.name()
            );
            continue;
        };

        let changes = rule.diff(&current, &wanted);
        if changes.is_empty() {
            continue;
        }

        table.update(row_id, wanted)?;
        delta.changed += 1;
        let key = display_optional(key.as_ref());
        for change in changes {
            let entry = AuditEntry {
                key_name: rule.key_name().to_string(),
                key: key.clone(),
                field: change.field,
                old: change.old,
                new: change.new,
            };
            info!("{}", entry);
            delta.audit.push(entry);
        }
    }

    // Phase 3: leftovers are new.
    for row in slots.into_iter().flatten() {
        table.insert(row)?;
        delta.inserted += 1;
    }

    debug!(
        inserted = delta.inserted,
        changed = delta.changed,
        deleted = delta.deleted,
        "reconciled {}",
        table.name()
    );
    Ok(delta)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Table;

    #[derive(Debug, Clone, PartialEq)]
    struct Row {
        id: u32,
        name: String,
        speed: u32,
    }

    fn row(id: u32, name: &str, speed: u32) -> Row {
        Row {
            id,
            name: name.to_string(),
            speed,
        }
    }

    struct ById;

    impl ReconcileRule<Row> for ById {
        type Key = u32;

        fn key_name(&self) -> &str {
            "id"
        }

        fn persisted_key(&self, _row_id: RowId, row: &Row) -> Option<u32> {
            Some(row.id)
        }

        fn diff(&self, current: &Row, target: &Row) -> Vec<FieldChange> {
            [
                FieldChange::compare("name", &current.name, &target.name),
                FieldChange::compare("speed", &current.speed, &target.speed),
            ]
            .into_iter()
            .flatten()
            .collect()
        }
    }

    fn keyed(rows: Vec<Row>) -> Vec<(u32, Row)> {
        rows.into_iter().map(|row| (row.id, row)).collect()
    }

    #[test]
    fn equal_collections_produce_no_writes() {
        let rows = vec![row(1, "a", 10), row(2, "b", 20)];
        let mut table = Table::from_rows("rows", rows.clone());
        let delta = reconcile_collection(&mut table, keyed(rows), &ById).unwrap();
        assert!(delta.is_empty());
        assert!(delta.audit.is_empty());
        assert_eq!(table.stats().total(), 0);
    }

    #[test]
    fn delete_update_insert_with_audit() {
        let mut table = Table::from_rows(
            "rows",
            vec![row(1, "a", 10), row(2, "b", 20), row(3, "c", 30)],
        );
        let target = vec![row(4, "d", 40), row(2, "bee", 25), row(1, "a", 10), row(5, "e", 50)];
        let delta = reconcile_collection(&mut table, keyed(target), &ById).unwrap();

        assert_eq!(delta.deleted, 1);
        assert_eq!(delta.changed, 1);
        assert_eq!(delta.inserted, 2);
        assert_eq!(table.stats().total(), 4);

        let lines: Vec<String> = delta.audit.iter().map(ToString::to_string).collect();
        assert_eq!(
            lines,
            vec![
                "Changed name=b --> bee for id=2.".to_string(),
                "Changed speed=20 --> 25 for id=2.".to_string(),
            ]
        );

        let inserted: Vec<u32> = table
            .iter()
            .filter(|(row_id, _)| row_id.0 > 3)
            .map(|(_, row)| row.id)
            .collect();
        assert_eq!(inserted, vec![4, 5]);
    }

    #[test]
    fn duplicate_persisted_keys_keep_first_row_only() {
        let mut table = Table::from_rows("rows", vec![row(1, "a", 1), row(1, "a", 1)]);
        let delta = reconcile_collection(&mut table, keyed(vec![row(1, "a", 1)]), &ById).unwrap();
        assert_eq!(delta.deleted, 1);
        assert_eq!(delta.changed, 0);
        assert_eq!(table.len(), 1);
        assert!(table.get(RowId(1)).is_some());
    }

    #[test]
    fn second_run_is_a_no_op() {
        let mut table = Table::from_rows("rows", vec![row(1, "a", 1)]);
        let target = vec![row(1, "z", 1), row(2, "b", 2)];
        let first = reconcile_collection(&mut table, keyed(target.clone()), &ById).unwrap();
        assert_eq!(first.writes(), 2);
        let second = reconcile_collection(&mut table, keyed(target), &ById).unwrap();
        assert!(second.is_empty());
    }

    #[test]
    #[should_panic(expected = "twice")]
    fn duplicate_target_keys_are_an_invariant_violation() {
        let mut table: Table<Row> = Table::new("rows");
        let _ = reconcile_collection(
            &mut table,
            keyed(vec![row(1, "a", 1), row(1, "b", 2)]),
            &ById,
        );
    }

    #[test]
    fn optional_changes_render_none() {
        let change = FieldChange::compare_optional::<u32>("fnode", None, Some(&4)).unwrap();
        assert_eq!(change.old, "None");
        assert_eq!(change.new, "4");
        assert!(FieldChange::compare_optional("fnode", Some(&4), Some(&4)).is_none());
    }
}
