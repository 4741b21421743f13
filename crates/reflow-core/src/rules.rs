//! # Rule Engine
//!
//! Declarative labelling of records. A [`Rule`] pairs a condition (field
//! values a record must match) with an action (field values to write), and a
//! [`Ruleset`] applies its rules least-specific first so narrower rules
//! override broader ones.
//!
//! ## Semantics
//!
//! - **Specificity**: rules are ordered by (condition field count, sorted
//!   condition field names); ties keep their authored order. The sort is a
//!   total order, so re-sorting never reshuffles a ruleset.
//! - **Wildcards**: an empty condition value matches any record; an empty
//!   action value leaves the field unchanged.
//! - **Staging**: [`Effect::Mutate`] edits records in place as the pass runs.
//!   [`Effect::Derive`] copies and [`Effect::Delete`] removals are staged and
//!   land after the pass, so derived rows are never re-matched by later rules
//!   of the same set.

use crate::table::Table;
use crate::types::{Attribute, FieldId, FieldValue, Record, NULL_SENTINEL};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

// =============================================================================
// RULES
// =============================================================================

/// What a matched rule does to a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Effect {
    /// Overwrite action fields on the matched record.
    Mutate,
    /// Append a copy of the matched record with action fields overlaid.
    Derive,
    /// Remove the matched record.
    Delete,
}

/// One condition/action pair.
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    pub effect: Effect,
    pub condition: BTreeMap<FieldId, FieldValue>,
    pub action: BTreeMap<FieldId, FieldValue>,
}

impl Rule {
    #[must_use]
    pub fn new(effect: Effect) -> Self {
        Self {
            effect,
            condition: BTreeMap::new(),
            action: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn mutate() -> Self {
        Self::new(Effect::Mutate)
    }

    #[must_use]
    pub fn derive() -> Self {
        Self::new(Effect::Derive)
    }

    #[must_use]
    pub fn delete() -> Self {
        Self::new(Effect::Delete)
    }

    #[must_use]
    pub fn when(mut self, field: FieldId, value: impl Into<FieldValue>) -> Self {
        self.condition.insert(field, value.into());
        self
    }

    #[must_use]
    pub fn when_attribute(self, attribute: Attribute) -> Self {
        self.when(FieldId::Attribute, attribute)
    }

    #[must_use]
    pub fn set(mut self, field: FieldId, value: impl Into<FieldValue>) -> Self {
        self.action.insert(field, value.into());
        self
    }

    /// Sort key: broader rules first, field names as the tie-break.
    #[must_use]
    pub fn specificity(&self) -> (usize, Vec<FieldId>) {
        (self.condition.len(), self.condition.keys().copied().collect())
    }

    /// Condition entries that actually constrain matching (wildcards dropped).
    fn active_conditions(&self) -> Vec<(FieldId, &FieldValue)> {
        self.condition
            .iter()
            .filter(|(_, value)| !value.is_wildcard())
            .map(|(field, value)| (*field, value))
            .collect()
    }

    fn matches(&self, record: &Record, conditions: &[(FieldId, &FieldValue)]) -> bool {
        conditions.iter().all(|(field, expected)| match record.get(*field) {
            Some(actual) => actual == *expected,
            // The export writes "-" for a dimension that does not apply, so a
            // delete condition of "-" also matches the field being absent.
            None => {
                self.effect == Effect::Delete
                    && matches!(expected, FieldValue::Text(s) if s == NULL_SENTINEL)
            }
        })
    }
}

// =============================================================================
// RULESETS
// =============================================================================

/// A named, ordered collection of rules applied as one pass.
#[derive(Debug, Clone, Default)]
pub struct Ruleset {
    pub name: String,
    pub rules: Vec<Rule>,
}

impl Ruleset {
    #[must_use]
    pub fn new(name: impl Into<String>, rules: Vec<Rule>) -> Self {
        Self {
            name: name.into(),
            rules,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Rules in application order: least specific first, authored order for
    /// ties.
    #[must_use]
    pub fn sorted_rules(&self) -> Vec<&Rule> {
        let mut sorted: Vec<&Rule> = self.rules.iter().collect();
        sorted.sort_by_key(|rule| rule.specificity());
        sorted
    }

    /// Run the ruleset over a table.
    ///
    /// Mutations land immediately; derived copies and deletions are staged
    /// until the pass completes. A mutate or delete rule whose condition is
    /// entirely wildcard is skipped rather than touching every record; a
    /// derive rule with no active condition copies every record.
    #[must_use]
    pub fn apply(&self, table: Table) -> Table {
        let mut records = table.records;
        let mut derived: Vec<Record> = Vec::new();
        let mut doomed: BTreeSet<usize> = BTreeSet::new();

        for rule in self.sorted_rules() {
            let conditions = rule.active_conditions();
            match rule.effect {
                Effect::Mutate => {
                    if conditions.is_empty() {
                        continue;
                    }
                    for record in &mut records {
                        if rule.matches(record, &conditions) {
                            for (field, value) in &rule.action {
                                if !value.is_wildcard() {
                                    record.set(*field, value.clone());
                                }
                            }
                        }
                    }
                }
                Effect::Derive => {
                    for record in &records {
                        if rule.matches(record, &conditions) {
                            let mut copy = record.clone();
                            for (field, value) in &rule.action {
                                copy.set(*field, value.clone());
                            }
                            derived.push(copy);
                        }
                    }
                }
                Effect::Delete => {
                    if conditions.is_empty() {
                        continue;
                    }
                    for (index, record) in records.iter().enumerate() {
                        if rule.matches(record, &conditions) {
                            doomed.insert(index);
                        }
                    }
                }
            }
        }

        let mut kept: Vec<Record> = records
            .into_iter()
            .enumerate()
            .filter(|(index, _)| !doomed.contains(index))
            .map(|(_, record)| record)
            .collect();
        kept.append(&mut derived);
        Table { records: kept }
    }

    /// Flatten the ruleset to a key-to-value lookup, reading the given
    /// condition field and action field from each rule. Later rules win on
    /// duplicate keys.
    #[must_use]
    pub fn single_field_map(&self, key: FieldId, value: FieldId) -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        for rule in &self.rules {
            if let (Some(k), Some(v)) = (rule.condition.get(&key), rule.action.get(&value)) {
                map.insert(k.as_str().to_string(), v.as_str().to_string());
            }
        }
        map
    }
}

// =============================================================================
// TESTS
// =============================================================================
