//! # Flow Tracing
//!
//! Walks commodity flows forward from a producing process, splitting the
//! traced quantity by output share at each process and by consumption share
//! at each commodity, until every strand reaches a commodity nobody consumes.
//! The result maps each complete path to the fraction of the source quantity
//! that travelled it; on a conservative network the fractions sum to one.
//!
//! Tracing is where the pipeline is strictest: a commodity without a unit, a
//! process mixing units across its outputs, or a walk that runs past the
//! depth bound all abort the run. Those are model defects no downstream
//! number should be built on.

use crate::flows::{normalize_to_fractions, Flows};
use crate::types::ReflowError;
use crate::units::UnitMap;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Paths longer than this indicate a cycle in the flow network.
pub const MAX_TRACE_DEPTH: usize = 64;

/// Terminal fractions may drift from one by at most this much.
pub const TRACE_FRACTION_TOLERANCE: f64 = 1e-5;

// =============================================================================
// PATHS
// =============================================================================

/// One hop of a trace path.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum PathStep {
    Process(String),
    Commodity(String),
}

impl PathStep {
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Process(name) | Self::Commodity(name) => name,
        }
    }
}

/// An alternating process/commodity chain from a source process to a
/// terminal commodity.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct TracePath {
    steps: Vec<PathStep>,
}

impl TracePath {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn steps(&self) -> &[PathStep] {
        &self.steps
    }

    #[must_use]
    fn extended(&self, step: PathStep) -> Self {
        let mut steps = self.steps.clone();
        steps.push(step);
        Self { steps }
    }

    /// The process the walk started from.
    #[must_use]
    pub fn source_process(&self) -> Option<&str> {
        match self.steps.first() {
            Some(PathStep::Process(name)) => Some(name),
            _ => None,
        }
    }

    /// The first commodity the source produced into this path.
    #[must_use]
    pub fn traced_commodity(&self) -> Option<&str> {
        match self.steps.get(1) {
            Some(PathStep::Commodity(name)) => Some(name),
            _ => None,
        }
    }

    /// The final process before the terminal commodity.
    #[must_use]
    pub fn last_process(&self) -> Option<&str> {
        if self.steps.len() < 2 {
            return None;
        }
        match &self.steps[self.steps.len() - 2] {
            PathStep::Process(name) => Some(name),
            PathStep::Commodity(_) => None,
        }
    }

    /// The commodity the path terminates in.
    #[must_use]
    pub fn last_commodity(&self) -> Option<&str> {
        match self.steps.last() {
            Some(PathStep::Commodity(name)) => Some(name),
            _ => None,
        }
    }
}

impl fmt::Display for TracePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, step) in self.steps.iter().enumerate() {
            if index > 0 {
                f.write_str(" -> ")?;
            }
            f.write_str(step.name())?;
        }
        Ok(())
    }
}

// =============================================================================
// TRACER
// =============================================================================

/// Forward walker over the flow network of one scenario/period slice.
#[derive(Debug, Clone, Copy)]
pub struct Tracer<'a> {
    flows: Flows<'a>,
    units: &'a UnitMap,
    max_depth: usize,
}

impl<'a> Tracer<'a> {
    #[must_use]
    pub fn new(flows: Flows<'a>, units: &'a UnitMap) -> Self {
        Self {
            flows,
            units,
            max_depth: MAX_TRACE_DEPTH,
        }
    }

    #[must_use]
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Trace the process's entire (non-emission) output forward, returning
    /// each terminal path and the fraction of the source quantity it
    /// carried.
    pub fn trace(
        &self,
        process: &str,
        scenario: &str,
        period: &str,
    ) -> Result<BTreeMap<TracePath, f64>, ReflowError> {
        let mut paths = BTreeMap::new();
        self.walk(process, scenario, period, &TracePath::new(), 1.0, 0, &mut paths)?;
        Ok(paths)
    }

    /// Check that terminal fractions account for the whole source quantity.
    pub fn verify_total(
        process: &str,
        paths: &BTreeMap<TracePath, f64>,
    ) -> Result<(), ReflowError> {
        let total: f64 = paths.values().sum();
        if (total - 1.0).abs() > TRACE_FRACTION_TOLERANCE {
            return Err(ReflowError::UnbalancedTrace {
                process: process.to_string(),
                total,
            });
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn walk(
        &self,
        process: &str,
        scenario: &str,
        period: &str,
        prefix: &TracePath,
        fraction: f64,
        depth: usize,
        paths: &mut BTreeMap<TracePath, f64>,
    ) -> Result<(), ReflowError> {
        if depth >= self.max_depth {
            return Err(ReflowError::DepthExceeded {
                process: process.to_string(),
                depth,
            });
        }

        let path = prefix.extended(PathStep::Process(process.to_string()));
        let outputs = self.flows.output_flows(process, scenario, period, true);
        if outputs.is_empty() {
            return Err(ReflowError::NoOutputFlows {
                process: process.to_string(),
            });
        }
        self.check_units(process, outputs.keys())?;

        let output_fractions = normalize_to_fractions(&outputs, process)?;
        for (commodity, commodity_fraction) in &output_fractions {
            let extended = path.extended(PathStep::Commodity(commodity.clone()));
            let carried = fraction * commodity_fraction;

            let consumers = self.flows.consumers_of(commodity, scenario, period);
            if consumers.is_empty() {
                *paths.entry(extended).or_insert(0.0) += carried;
                continue;
            }

            let consumer_fractions = normalize_to_fractions(&consumers, commodity)?;
            for (consumer, consumer_fraction) in &consumer_fractions {
                self.walk(
                    consumer,
                    scenario,
                    period,
                    &extended,
                    carried * consumer_fraction,
                    depth + 1,
                    paths,
                )?;
            }
        }
        Ok(())
    }

    /// Every traced output must carry the same unit, or the fractions we
    /// compute would mix quantities that cannot be added.
    fn check_units<'c>(
        &self,
        process: &str,
        commodities: impl Iterator<Item = &'c String>,
    ) -> Result<(), ReflowError> {
        let mut units: BTreeSet<&str> = BTreeSet::new();
        for commodity in commodities {
            let unit = self.units.get(commodity).ok_or_else(|| ReflowError::MissingUnit {
                commodity: commodity.clone(),
            })?;
            units.insert(unit);
        }
        if units.len() > 1 {
            return Err(ReflowError::MixedUnits {
                process: process.to_string(),
                units: units.into_iter().map(str::to_string).collect(),
            });
        }
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flows::FlowPolicy;
    use crate::table::Table;
    use crate::types::{Attribute, FieldId, Record};

    fn row(attribute: Attribute, process: &str, commodity: &str, value: f64) -> Record {
        Record::new()
            .with_attribute(attribute)
            .with(FieldId::Scenario, "Kea")
            .with(FieldId::Process, process)
            .with(FieldId::Commodity, commodity)
            .with(FieldId::Period, "2030")
            .with_value(value)
    }

    fn unit_map(entries: &[(&str, &str)]) -> UnitMap {
        let mut content = String::from("SET COM_UNIT\n/\n");
        for (commodity, unit) in entries {
            content.push_str(&format!("'NI'.'{commodity}'.'{unit}'\n"));
        }
        content.push_str("/\n");
        UnitMap::parse(&content)
    }

    #[test]
    fn linear_chain_traces_to_the_terminal_demand() {
        let table = Table::from_records(vec![
            row(Attribute::Output, "REFINERY", "DSL", 2.0),
            row(Attribute::Input, "TRUCK", "DSL", 2.0),
            row(Attribute::Output, "TRUCK", "T_O_FREIGHT", 5.0),
        ]);
        let policy = FlowPolicy::default();
        let units = unit_map(&[("DSL", "PJ"), ("T_O_FREIGHT", "BVkm")]);
        let tracer = Tracer::new(Flows::new(&table, &policy), &units);

        let paths = tracer.trace("REFINERY", "Kea", "2030").expect("traceable");
        assert_eq!(paths.len(), 1);
        let (path, fraction) = paths.iter().next().expect("one path");
        assert_eq!(path.to_string(), "REFINERY -> DSL -> TRUCK -> T_O_FREIGHT");
        assert!((fraction - 1.0).abs() < 1e-12);
        assert_eq!(path.source_process(), Some("REFINERY"));
        assert_eq!(path.traced_commodity(), Some("DSL"));
        assert_eq!(path.last_process(), Some("TRUCK"));
        assert_eq!(path.last_commodity(), Some("T_O_FREIGHT"));
    }

    #[test]
    fn consumption_splits_by_share() {
        let table = Table::from_records(vec![
            row(Attribute::Output, "REFINERY", "DSL", 10.0),
            row(Attribute::Input, "TRUCK", "DSL", 3.0),
            row(Attribute::Input, "TRAIN", "DSL", 7.0),
            row(Attribute::Output, "TRUCK", "T_O_ROAD", 1.0),
            row(Attribute::Output, "TRAIN", "T_O_RAIL", 1.0),
        ]);
        let policy = FlowPolicy::default();
        let units = unit_map(&[("DSL", "PJ"), ("T_O_ROAD", "BVkm"), ("T_O_RAIL", "BVkm")]);
        let tracer = Tracer::new(Flows::new(&table, &policy), &units);

        let paths = tracer.trace("REFINERY", "Kea", "2030").expect("traceable");
        assert_eq!(paths.len(), 2);
        let total: f64 = paths.values().sum();
        assert!((total - 1.0).abs() < 1e-12);

        let truck_share = paths
            .iter()
            .find(|(path, _)| path.last_process() == Some("TRUCK"))
            .map(|(_, f)| *f)
            .expect("truck path");
        assert!((truck_share - 0.3).abs() < 1e-12);
    }

    #[test]
    fn emission_outputs_are_not_traced() {
        let table = Table::from_records(vec![
            row(Attribute::Output, "REFINERY", "DSL", 2.0),
            row(Attribute::Output, "REFINERY", "INDCO2", 0.7),
        ]);
        let policy = FlowPolicy::default();
        let units = unit_map(&[("DSL", "PJ")]);
        let tracer = Tracer::new(Flows::new(&table, &policy), &units);

        let paths = tracer.trace("REFINERY", "Kea", "2030").expect("traceable");
        assert!(paths.keys().all(|p| p.last_commodity() == Some("DSL")));
    }

    #[test]
    fn export_only_consumption_terminates_the_path() {
        let table = Table::from_records(vec![
            row(Attribute::Output, "REFINERY", "DSL", 2.0),
            row(Attribute::Input, "TU_DSL_EXP", "DSL", 2.0),
        ]);
        let policy = FlowPolicy::default();
        let units = unit_map(&[("DSL", "PJ")]);
        let tracer = Tracer::new(Flows::new(&table, &policy), &units);

        let paths = tracer.trace("REFINERY", "Kea", "2030").expect("traceable");
        assert_eq!(paths.len(), 1);
        let path = paths.keys().next().expect("one path");
        assert_eq!(path.to_string(), "REFINERY -> DSL");
    }

    #[test]
    fn missing_unit_is_fatal() {
        let table = Table::from_records(vec![row(Attribute::Output, "REFINERY", "DSL", 2.0)]);
        let policy = FlowPolicy::default();
        let units = unit_map(&[]);
        let tracer = Tracer::new(Flows::new(&table, &policy), &units);

        assert!(matches!(
            tracer.trace("REFINERY", "Kea", "2030"),
            Err(ReflowError::MissingUnit { .. })
        ));
    }

    #[test]
    fn mixed_units_are_fatal() {
        let table = Table::from_records(vec![
            row(Attribute::Output, "PLANT", "HEAT", 1.0),
            row(Attribute::Output, "PLANT", "T_O_CAR", 1.0),
        ]);
        let policy = FlowPolicy::default();
        let units = unit_map(&[("HEAT", "PJ"), ("T_O_CAR", "BVkm")]);
        let tracer = Tracer::new(Flows::new(&table, &policy), &units);

        assert!(matches!(
            tracer.trace("PLANT", "Kea", "2030"),
            Err(ReflowError::MixedUnits { .. })
        ));
    }

    #[test]
    fn processes_without_energy_outputs_are_fatal() {
        let table = Table::from_records(vec![
            row(Attribute::Output, "REFINERY", "DSL", 2.0),
            row(Attribute::Input, "SINK", "DSL", 2.0),
            row(Attribute::Output, "SINK", "TOTCO2", 1.0),
        ]);
        let policy = FlowPolicy::default();
        let units = unit_map(&[("DSL", "PJ")]);
        let tracer = Tracer::new(Flows::new(&table, &policy), &units);

        assert!(matches!(
            tracer.trace("REFINERY", "Kea", "2030"),
            Err(ReflowError::NoOutputFlows { .. })
        ));
    }

    #[test]
    fn cycles_hit_the_depth_bound() {
        let table = Table::from_records(vec![
            row(Attribute::Output, "A", "X", 1.0),
            row(Attribute::Input, "B", "X", 1.0),
            row(Attribute::Output, "B", "Y", 1.0),
            row(Attribute::Input, "A", "Y", 1.0),
        ]);
        let policy = FlowPolicy::default();
        let units = unit_map(&[("X", "PJ"), ("Y", "PJ")]);
        let tracer = Tracer::new(Flows::new(&table, &policy), &units).with_max_depth(8);

        assert!(matches!(
            tracer.trace("A", "Kea", "2030"),
            Err(ReflowError::DepthExceeded { .. })
        ));
    }

    #[test]
    fn verify_total_enforces_the_tolerance() {
        let mut paths = BTreeMap::new();
        paths.insert(
            TracePath::new().extended(PathStep::Process("A".to_string())),
            0.5,
        );
        assert!(Tracer::verify_total("A", &paths).is_err());

        paths.insert(
            TracePath::new().extended(PathStep::Process("B".to_string())),
            0.5 + 1e-7,
        );
        assert!(Tracer::verify_total("A", &paths).is_ok());
    }
}
