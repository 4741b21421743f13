//! # End-Use Allocation
//!
//! Re-attributes quantities that the solver books against supply-side
//! processes to the end uses that actually consume the energy:
//!
//! - **Negative emissions** (carbon captured by fuel producers) are spread
//!   over the end uses burning that fuel and relabelled with each end use's
//!   sector emission commodity.
//! - **Fuel substitutions** (drop-in biofuels displacing fossil fuels) become
//!   consumption rows at the end uses reached by the substitute, plus
//!   negative mirror rows that back the displaced fossil fuel out.
//!
//! Every category is conservation-checked: the value removed from the table
//! and the value added back must agree, in total and per commodity family,
//! before the merge is allowed to happen.

use crate::flows::{FlowPolicy, Flows};
use crate::rules::Ruleset;
use crate::table::Table;
use crate::trace::Tracer;
use crate::types::{Attribute, FieldId, Record, ReflowError};
use crate::units::UnitMap;
use std::collections::{BTreeMap, BTreeSet};

/// Dropped and re-added allocation values may differ by at most this much.
pub const CONSERVATION_TOLERANCE: f64 = 1e-6;

// =============================================================================
// POLICY
// =============================================================================

/// A process/commodity pair naming one observed flow.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowRef {
    pub process: String,
    pub commodity: String,
}

/// Replaces the traced shares of two sibling demand processes with the ratio
/// of their observed demand flows.
///
/// The aviation sector needs this: domestic and international jet demand
/// draw on one blended fuel pool, so the traced split between them is not
/// meaningful and the demand-side flows are the honest ratio. The second
/// leg's share row is restamped as `commodity` supplied by `source_process`.
#[derive(Debug, Clone, PartialEq)]
pub struct ShareOverride {
    pub first: FlowRef,
    pub second: FlowRef,
    pub commodity: String,
    pub source_process: String,
}

/// One fuel substitution to allocate: a substitute commodity and the fossil
/// fuel it displaces at the end uses it reaches.
#[derive(Debug, Clone, PartialEq)]
pub struct SubstitutionSpec {
    /// Commodity produced by the substitute route (for example `BDSL`).
    pub commodity: String,
    /// Fuel label backed out by the mirror rows (for example `Diesel`).
    pub displaced_fuel: String,
    /// Fuel group stamped on the mirror rows.
    pub displaced_fuel_group: String,
    pub share_override: Option<ShareOverride>,
}

/// Everything the allocator needs beyond the table itself.
#[derive(Debug, Clone)]
pub struct AllocationPolicy {
    /// Sector name to the emission commodity its allocations report under.
    /// The empty-string entry is the fallback for end uses with no sector.
    pub sector_emissions: BTreeMap<String, String>,
    pub substitutions: Vec<SubstitutionSpec>,
    /// When set, biofuel emission rows are duplicated under their fossil
    /// equivalents and the originals zeroed, modelling biogenic carbon as
    /// neutral.
    pub zero_biofuel_emissions: bool,
    /// Provenance fuel label to its fossil equivalent, for the duplication.
    pub fossil_equivalents: BTreeMap<String, String>,
    /// Fuel group stamped on the duplicated fossil rows.
    pub fossil_fuel_group: String,
}

impl Default for AllocationPolicy {
    fn default() -> Self {
        Self {
            sector_emissions: BTreeMap::new(),
            substitutions: Vec::new(),
            zero_biofuel_emissions: false,
            fossil_equivalents: BTreeMap::new(),
            fossil_fuel_group: "Fossil Fuels".to_string(),
        }
    }
}

// =============================================================================
// SHARES
// =============================================================================

/// The share of a traced quantity that lands at one end-use process.
///
/// `value` is `None` when no path reached the process; such rows drop out at
/// materialization. `commodity` and `fuel_source` describe the path that
/// delivered the share (the traced commodity and the process the trace
/// started from).
#[derive(Debug, Clone, PartialEq)]
pub struct EndUseShare {
    pub process: String,
    pub value: Option<f64>,
    pub commodity: Option<String>,
    pub fuel_source: Option<String>,
}

/// Allocation rows removed from and added to the table, kept apart until the
/// conservation check has passed.
#[derive(Debug, Clone, Default)]
pub struct AllocationOutcome {
    pub dropped: Table,
    pub added: Table,
}

impl AllocationOutcome {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn merge(&mut self, other: AllocationOutcome) {
        self.dropped.extend(other.dropped);
        self.added.extend(other.added);
    }
}

// =============================================================================
// ALLOCATOR
// =============================================================================

/// Traces and re-attributes quantities over one working table.
#[derive(Debug, Clone, Copy)]
pub struct Allocator<'a> {
    table: &'a Table,
    flow_policy: &'a FlowPolicy,
    units: &'a UnitMap,
    end_uses: &'a BTreeSet<String>,
    max_depth: usize,
}

impl<'a> Allocator<'a> {
    #[must_use]
    pub fn new(
        table: &'a Table,
        flow_policy: &'a FlowPolicy,
        units: &'a UnitMap,
        end_uses: &'a BTreeSet<String>,
    ) -> Self {
        Self {
            table,
            flow_policy,
            units,
            end_uses,
            max_depth: crate::trace::MAX_TRACE_DEPTH,
        }
    }

    #[must_use]
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    fn flows(&self) -> Flows<'a> {
        Flows::new(self.table, self.flow_policy)
    }

    fn tracer(&self) -> Tracer<'a> {
        Tracer::new(self.flows(), self.units).with_max_depth(self.max_depth)
    }

    /// How one unit of the process's output divides over the end-use layer.
    ///
    /// Fractions of all paths landing at the same end use are summed, then
    /// the surviving shares are renormalized so they sum to one (paths that
    /// terminate outside the end-use layer, exports for example, forfeit
    /// their share). With a `commodity_filter`, only paths that traced that
    /// commodity out of the source count.
    pub fn end_use_shares(
        &self,
        process: &str,
        scenario: &str,
        period: &str,
        commodity_filter: Option<&str>,
    ) -> Result<Vec<EndUseShare>, ReflowError> {
        let paths = self.tracer().trace(process, scenario, period)?;
        Tracer::verify_total(process, &paths)?;

        let mut shares: BTreeMap<&str, EndUseShare> = self
            .end_uses
            .iter()
            .map(|p| {
                (
                    p.as_str(),
                    EndUseShare {
                        process: p.clone(),
                        value: None,
                        commodity: None,
                        fuel_source: None,
                    },
                )
            })
            .collect();

        for (path, fraction) in &paths {
            if let Some(filter) = commodity_filter {
                if path.traced_commodity() != Some(filter) {
                    continue;
                }
            }
            let Some(terminal) = path.last_process() else {
                continue;
            };
            let Some(share) = shares.get_mut(terminal) else {
                continue;
            };
            share.value = Some(share.value.unwrap_or(0.0) + fraction);
            share.commodity = path.traced_commodity().map(str::to_string);
            share.fuel_source = path.source_process().map(str::to_string);
        }

        let total: f64 = shares.values().filter_map(|s| s.value).sum();
        if total != 0.0 {
            for share in shares.values_mut() {
                if let Some(value) = share.value.as_mut() {
                    *value /= total;
                }
            }
        }

        Ok(shares.into_values().collect())
    }

    /// Overwrite two shares with the ratio of their observed demand flows.
    pub fn apply_share_override(
        &self,
        shares: &mut [EndUseShare],
        spec: &ShareOverride,
        scenario: &str,
        period: &str,
    ) -> Result<(), ReflowError> {
        let first = self.demand_flow(&spec.first, scenario, period)?;
        let second = self.demand_flow(&spec.second, scenario, period)?;
        let total = first + second;
        if total == 0.0 {
            return Err(ReflowError::ZeroFlowTotal {
                context: format!("demand split {} / {}", spec.first.process, spec.second.process),
            });
        }

        if let Some(share) = shares.iter_mut().find(|s| s.process == spec.first.process) {
            share.value = Some(first / total);
        }
        if let Some(share) = shares.iter_mut().find(|s| s.process == spec.second.process) {
            share.value = Some(second / total);
            share.commodity = Some(spec.commodity.clone());
            share.fuel_source = Some(spec.source_process.clone());
        }
        Ok(())
    }

    fn demand_flow(
        &self,
        flow: &FlowRef,
        scenario: &str,
        period: &str,
    ) -> Result<f64, ReflowError> {
        self.flows()
            .output_flows(&flow.process, scenario, period, true)
            .get(&flow.commodity)
            .copied()
            .ok_or_else(|| ReflowError::MissingFlow {
                process: flow.process.clone(),
                commodity: flow.commodity.clone(),
            })
    }

    /// Spread negative emission rows over the end uses consuming the
    /// captured fuel and relabel them per sector.
    pub fn allocate_negative_emissions(
        &self,
        policy: &AllocationPolicy,
        sector_of: &BTreeMap<String, String>,
        provenance: &Ruleset,
        enrichment: &[Ruleset],
    ) -> Result<AllocationOutcome, ReflowError> {
        let mut dropped = Table::new();
        for record in self.table {
            if record.attribute() == Some(Attribute::Output)
                && record
                    .text(FieldId::Commodity)
                    .is_some_and(|c| self.flow_policy.is_emission(c))
                && record.value.is_some_and(|v| v < 0.0)
            {
                dropped.push(record.clone());
            }
        }

        let mut added = Table::new();
        for source in &dropped {
            let (Some(scenario), Some(period), Some(process), Some(value)) = (
                source.text(FieldId::Scenario),
                source.text(FieldId::Period),
                source.text(FieldId::Process),
                source.value,
            ) else {
                continue;
            };
            let shares = self.end_use_shares(process, scenario, period, None)?;
            added.extend(share_records(&shares, scenario, period, Attribute::Output, value));
        }

        let mut added = provenance.apply(added);
        for record in &mut added.records {
            let sector = record
                .text(FieldId::Process)
                .and_then(|p| sector_of.get(p))
                .map_or("", String::as_str);
            let emission = policy.sector_emissions.get(sector).ok_or_else(|| {
                ReflowError::UnmappedSector {
                    sector: sector.to_string(),
                }
            })?;
            record.set_text(FieldId::Commodity, emission.clone());
        }
        added.retain(|r| r.has(FieldId::Fuel));

        let mut added = apply_sequence(added, enrichment);

        if policy.zero_biofuel_emissions {
            let mut fossil = added.clone();
            for record in &mut fossil.records {
                match record
                    .text(FieldId::Fuel)
                    .and_then(|f| policy.fossil_equivalents.get(f))
                {
                    Some(equivalent) => record.set_text(FieldId::Fuel, equivalent.clone()),
                    None => record.clear(FieldId::Fuel),
                }
                record.set_text(FieldId::FuelGroup, policy.fossil_fuel_group.clone());
            }
            for record in &mut added.records {
                record.value = Some(0.0);
            }
            added.extend(fossil);
        }

        Ok(AllocationOutcome { dropped, added })
    }

    /// Turn one substitute's production into end-use consumption rows plus
    /// mirrors backing out the displaced fossil fuel.
    pub fn allocate_substitution(
        &self,
        spec: &SubstitutionSpec,
        provenance: &Ruleset,
        enrichment: &[Ruleset],
    ) -> Result<AllocationOutcome, ReflowError> {
        let mut added = Table::new();
        for source in self.table {
            if source.attribute() != Some(Attribute::Output)
                || source.text(FieldId::Commodity) != Some(spec.commodity.as_str())
            {
                continue;
            }
            let (Some(scenario), Some(period), Some(process), Some(value)) = (
                source.text(FieldId::Scenario),
                source.text(FieldId::Period),
                source.text(FieldId::Process),
                source.value,
            ) else {
                continue;
            };

            let mut shares =
                self.end_use_shares(process, scenario, period, Some(&spec.commodity))?;
            if let Some(override_spec) = &spec.share_override {
                self.apply_share_override(&mut shares, override_spec, scenario, period)?;
            }

            let mut rows = share_records(&shares, scenario, period, Attribute::Input, value);
            for record in &mut rows.records {
                record.set_text(FieldId::Commodity, spec.commodity.clone());
            }
            added.extend(rows);
        }

        let mut added = provenance.apply(added);
        added.retain(|r| r.has(FieldId::Fuel));
        let mut added = apply_sequence(added, enrichment);

        let mut mirrors = added.clone();
        for record in &mut mirrors.records {
            if let Some(value) = record.value.as_mut() {
                *value = -*value;
            }
            record.set_text(FieldId::Fuel, spec.displaced_fuel.clone());
            record.set_text(FieldId::FuelGroup, spec.displaced_fuel_group.clone());
        }
        added.extend(mirrors);

        Ok(AllocationOutcome {
            dropped: Table::new(),
            added,
        })
    }
}

fn apply_sequence(table: Table, rulesets: &[Ruleset]) -> Table {
    rulesets
        .iter()
        .fold(table, |table, ruleset| ruleset.apply(table))
}

/// Materialize shares as records, scaled by the source quantity. Unreached
/// end uses (no value) produce nothing.
fn share_records(
    shares: &[EndUseShare],
    scenario: &str,
    period: &str,
    attribute: Attribute,
    scale: f64,
) -> Table {
    let mut table = Table::new();
    for share in shares {
        let Some(value) = share.value else {
            continue;
        };
        let mut record = Record::new()
            .with_attribute(attribute)
            .with(FieldId::Scenario, scenario)
            .with(FieldId::Process, share.process.as_str())
            .with(FieldId::Period, period)
            .with_value(value * scale);
        if let Some(commodity) = &share.commodity {
            record.set_text(FieldId::Commodity, commodity.clone());
        }
        if let Some(fuel_source) = &share.fuel_source {
            record.set_text(FieldId::FuelSourceProcess, fuel_source.clone());
        }
        table.push(record);
    }
    table
}

// =============================================================================
// CONSERVATION
// =============================================================================

/// Fail unless dropped and added values agree, in total and per commodity
/// marker (substring match, so one marker covers a whole emission family).
pub fn verify_conservation(
    outcome: &AllocationOutcome,
    markers: &[String],
) -> Result<(), ReflowError> {
    check_balance("total", outcome.dropped.total_value(), outcome.added.total_value())?;
    for marker in markers {
        check_balance(
            marker,
            marker_sum(&outcome.dropped, marker),
            marker_sum(&outcome.added, marker),
        )?;
    }
    Ok(())
}

fn check_balance(label: &str, dropped: f64, added: f64) -> Result<(), ReflowError> {
    if (dropped - added).abs() > CONSERVATION_TOLERANCE {
        return Err(ReflowError::ConservationMismatch {
            label: label.to_string(),
            dropped,
            added,
        });
    }
    Ok(())
}

fn marker_sum(table: &Table, marker: &str) -> f64 {
    table
        .iter()
        .filter(|r| r.text(FieldId::Commodity).is_some_and(|c| c.contains(marker)))
        .filter_map(|r| r.value)
        .sum()
}

// =============================================================================
// TESTS
// =============================================================================
