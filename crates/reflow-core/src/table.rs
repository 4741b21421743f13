//! # Working Table
//!
//! A `Table` is an ordered collection of [`Record`]s and the unit every
//! pipeline stage consumes and produces. Operations that group or
//! deduplicate key on `BTreeMap`s so their output order is a function of the
//! data alone.

use crate::types::{FieldId, FieldValue, Record};
use std::collections::{BTreeMap, BTreeSet};

/// An ordered collection of labelled records.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub records: Vec<Record>,
}

impl Table {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from_records(records: Vec<Record>) -> Self {
        Self { records }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn push(&mut self, record: Record) {
        self.records.push(record);
    }

    pub fn extend(&mut self, other: Table) {
        self.records.extend(other.records);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Record> {
        self.records.iter()
    }

    pub fn retain(&mut self, predicate: impl FnMut(&Record) -> bool) {
        self.records.retain(predicate);
    }

    /// Sum of all present record values.
    #[must_use]
    pub fn total_value(&self) -> f64 {
        self.records.iter().filter_map(|r| r.value).sum()
    }

    /// All distinct values observed for one field, in sorted order.
    #[must_use]
    pub fn distinct_values(&self, field: FieldId) -> BTreeSet<String> {
        self.records
            .iter()
            .filter_map(|r| r.text(field))
            .map(str::to_string)
            .collect()
    }

    /// Sum record values grouped by the given key fields.
    ///
    /// Records missing any key field do not belong to any group and are
    /// dropped. Output records carry the key fields only; all other labels
    /// are gone after aggregation. Absent values count as zero.
    #[must_use]
    pub fn group_sum(&self, keys: &[FieldId]) -> Table {
        let mut groups: BTreeMap<Vec<FieldValue>, f64> = BTreeMap::new();
        for record in &self.records {
            let Some(key) = projection(record, keys) else {
                continue;
            };
            *groups.entry(key).or_insert(0.0) += record.value.unwrap_or(0.0);
        }

        let records = groups
            .into_iter()
            .map(|(key, value)| {
                let mut record = Record::new();
                for (field, field_value) in keys.iter().zip(key) {
                    record.set(*field, field_value);
                }
                record.with_value(value)
            })
            .collect();
        Table { records }
    }

    /// Keep the first record for each distinct combination of the given
    /// fields. Absent fields are part of the identity.
    #[must_use]
    pub fn distinct_by(&self, keys: &[FieldId]) -> Table {
        let mut seen: BTreeSet<Vec<Option<FieldValue>>> = BTreeSet::new();
        let records = self
            .records
            .iter()
            .filter(|record| {
                let key: Vec<Option<FieldValue>> =
                    keys.iter().map(|f| record.get(*f).cloned()).collect();
                seen.insert(key)
            })
            .cloned()
            .collect();
        Table { records }
    }

    /// Restrict every record to the given fields, discarding values.
    #[must_use]
    pub fn project(&self, keys: &[FieldId]) -> Table {
        let records = self
            .records
            .iter()
            .map(|record| {
                let mut projected = Record::new();
                for field in keys {
                    if let Some(value) = record.get(*field) {
                        projected.set(*field, value.clone());
                    }
                }
                projected
            })
            .collect();
        Table { records }
    }

    /// Stable sort by the given fields. Records with an absent field sort
    /// before records that carry it.
    pub fn sort_by_fields(&mut self, keys: &[FieldId]) {
        self.records.sort_by(|a, b| {
            for field in keys {
                let ordering = a.get(*field).cmp(&b.get(*field));
                if ordering != std::cmp::Ordering::Equal {
                    return ordering;
                }
            }
            std::cmp::Ordering::Equal
        });
    }

    /// Remove one occurrence of every record in `other` from this table.
    ///
    /// Matching is full equality over fields and value. Records of `other`
    /// with no counterpart here are ignored.
    #[must_use]
    pub fn subtract(&self, other: &Table) -> Table {
        let mut remaining: Vec<&Record> = other.records.iter().collect();
        let records = self
            .records
            .iter()
            .filter(|record| {
                if let Some(position) = remaining.iter().position(|r| r == record) {
                    remaining.swap_remove(position);
                    false
                } else {
                    true
                }
            })
            .cloned()
            .collect();
        Table { records }
    }
}

impl<'a> IntoIterator for &'a Table {
    type Item = &'a Record;
    type IntoIter = std::slice::Iter<'a, Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

fn projection(record: &Record, keys: &[FieldId]) -> Option<Vec<FieldValue>> {
    keys.iter()
        .map(|field| record.get(*field).cloned())
        .collect()
}

// =============================================================================
// TESTS
// =============================================================================
