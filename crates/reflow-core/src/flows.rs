//! # Flow Queries
//!
//! Read-only views over the working table answering the four questions the
//! tracer asks: what does a process produce, what does it consume, who
//! produces a commodity, and who consumes it. Results come back as
//! `BTreeMap`s so callers iterate flows in commodity/process order.

use crate::table::Table;
use crate::types::{Attribute, FieldId, Record, ReflowError};
use std::collections::BTreeMap;

// =============================================================================
// POLICY
// =============================================================================

/// Which commodities count as emissions and which processes are trade links.
///
/// Emission outputs are excluded when walking energy forward; trade processes
/// are excluded as consumers so exported energy terminates a trace inside the
/// modelled region.
#[derive(Debug, Clone)]
pub struct FlowPolicy {
    /// Substring marking emission commodities (for example `CO2`).
    pub emission_marker: String,
    /// Process name prefixes identifying fuel trade links.
    pub trade_prefixes: Vec<String>,
}

impl Default for FlowPolicy {
    fn default() -> Self {
        Self {
            emission_marker: "CO2".to_string(),
            trade_prefixes: [
                "TU_PET", "TU_LPG", "TU_DSL", "TU_FOL", "TU_DID", "TU_DIJ", "TU_JET",
                "TU_OTH", "TU_COA", "TU_COL",
            ]
            .iter()
            .map(|p| (*p).to_string())
            .collect(),
        }
    }
}

impl FlowPolicy {
    #[must_use]
    pub fn is_emission(&self, commodity: &str) -> bool {
        commodity.contains(&self.emission_marker)
    }

    #[must_use]
    pub fn is_trade_process(&self, process: &str) -> bool {
        self.trade_prefixes.iter().any(|prefix| process.starts_with(prefix))
    }
}

// =============================================================================
// QUERIES
// =============================================================================

/// Flow lookups over one scenario/period slice of the working table.
#[derive(Debug, Clone, Copy)]
pub struct Flows<'a> {
    table: &'a Table,
    policy: &'a FlowPolicy,
}

impl<'a> Flows<'a> {
    #[must_use]
    pub fn new(table: &'a Table, policy: &'a FlowPolicy) -> Self {
        Self { table, policy }
    }

    #[must_use]
    pub fn policy(&self) -> &FlowPolicy {
        self.policy
    }

    /// Commodities the process produces, summed by commodity. Emission
    /// outputs are dropped when `exclude_emissions` is set.
    #[must_use]
    pub fn output_flows(
        &self,
        process: &str,
        scenario: &str,
        period: &str,
        exclude_emissions: bool,
    ) -> BTreeMap<String, f64> {
        self.collect(FieldId::Commodity, |record| {
            record.attribute() == Some(Attribute::Output)
                && self.in_slice(record, scenario, period)
                && record.text(FieldId::Process) == Some(process)
                && !(exclude_emissions
                    && record.text(FieldId::Commodity).is_some_and(|c| self.policy.is_emission(c)))
        })
    }

    /// Commodities the process consumes, summed by commodity.
    #[must_use]
    pub fn input_flows(
        &self,
        process: &str,
        scenario: &str,
        period: &str,
    ) -> BTreeMap<String, f64> {
        self.collect(FieldId::Commodity, |record| {
            record.attribute() == Some(Attribute::Input)
                && self.in_slice(record, scenario, period)
                && record.text(FieldId::Process) == Some(process)
        })
    }

    /// Processes producing the commodity, summed by process.
    #[must_use]
    pub fn producers_of(
        &self,
        commodity: &str,
        scenario: &str,
        period: &str,
    ) -> BTreeMap<String, f64> {
        self.collect(FieldId::Process, |record| {
            record.attribute() == Some(Attribute::Output)
                && self.in_slice(record, scenario, period)
                && record.text(FieldId::Commodity) == Some(commodity)
        })
    }

    /// Processes consuming the commodity, summed by process. Trade links are
    /// not consumers: energy that leaves the region ends its trace here.
    #[must_use]
    pub fn consumers_of(
        &self,
        commodity: &str,
        scenario: &str,
        period: &str,
    ) -> BTreeMap<String, f64> {
        self.collect(FieldId::Process, |record| {
            record.attribute() == Some(Attribute::Input)
                && self.in_slice(record, scenario, period)
                && record.text(FieldId::Commodity) == Some(commodity)
                && !record.text(FieldId::Process).is_some_and(|p| self.policy.is_trade_process(p))
        })
    }

    fn in_slice(&self, record: &Record, scenario: &str, period: &str) -> bool {
        record.text(FieldId::Scenario) == Some(scenario)
            && record.text(FieldId::Period) == Some(period)
    }

    fn collect(
        &self,
        key: FieldId,
        mut predicate: impl FnMut(&Record) -> bool,
    ) -> BTreeMap<String, f64> {
        let mut flows: BTreeMap<String, f64> = BTreeMap::new();
        for record in self.table {
            if predicate(record) {
                if let Some(name) = record.text(key) {
                    *flows.entry(name.to_string()).or_insert(0.0) += record.value.unwrap_or(0.0);
                }
            }
        }
        flows
    }
}

/// Scale a flow map so its values sum to one.
///
/// An empty map stays empty; a non-empty map whose total is zero cannot be
/// expressed as fractions and is an error.
pub fn normalize_to_fractions(
    flows: &BTreeMap<String, f64>,
    context: &str,
) -> Result<BTreeMap<String, f64>, ReflowError> {
    if flows.is_empty() {
        return Ok(BTreeMap::new());
    }
    let total: f64 = flows.values().sum();
    if total == 0.0 {
        return Err(ReflowError::ZeroFlowTotal {
            context: context.to_string(),
        });
    }
    Ok(flows.iter().map(|(k, v)| (k.clone(), v / total)).collect())
}

// =============================================================================
// TESTS
// =============================================================================
