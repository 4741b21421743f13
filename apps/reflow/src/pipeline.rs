//! # Pipeline Driver
//!
//! The run logic behind the CLI: load the model catalogs and scenario
//! exports, enrich the rows, allocate, shape and write. Each entry point
//! corresponds to one subcommand and returns a small summary the CLI can
//! print or serialize.
//!
//! The driver owns the sequencing decisions the core leaves open: which
//! rulesets run, in what order, and which totals are re-checked against the
//! written report after shaping.

use crate::config::RunConfig;
use reflow_core::finalize::{
    drop_incomplete, fill_missing_periods, split_shared_inputs, suppress_non_emitting_fuels,
};
use reflow_core::{
    AllocationPolicy, Allocator, Attribute, CONSERVATION_TOLERANCE, CatalogSchema,
    CommodityGroups, EndUseShare, FieldId, Flows, NULL_SENTINEL, RAW_AGGREGATION_KEYS, Record,
    ReflowError, Ruleset, Table, TracePath, Tracer, UnitMap, parse_vd, ruleset_from_catalog,
    rulesets, verify_conservation, write_csv,
};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::BufWriter;
use std::path::Path;
use tracing::{debug, info, warn};

/// Columns of the written schema table.
pub const SCHEMA_COLUMNS: [FieldId; 11] = [
    FieldId::Attribute,
    FieldId::Process,
    FieldId::Commodity,
    FieldId::Sector,
    FieldId::Subsector,
    FieldId::Technology,
    FieldId::Fuel,
    FieldId::Enduse,
    FieldId::Unit,
    FieldId::Parameters,
    FieldId::FuelGroup,
];

/// Parameter label of fuel-consumption rows, as the built-in parameter rules
/// write it.
const CONSUMPTION_PARAMETER: &str = "Fuel Consumption";

// =============================================================================
// MODEL CATALOGS
// =============================================================================

/// Everything read from one model release: the catalog rulesets, the unit
/// definitions and the commodity-group membership.
#[derive(Debug, Clone)]
pub struct ModelCatalogs {
    pub commodity_set: Ruleset,
    pub process_set: Ruleset,
    pub commodity: Ruleset,
    pub commodity_fuel: Ruleset,
    pub process: Ruleset,
    pub process_fuel: Ruleset,
    pub process_enduse: Ruleset,
    pub units: UnitMap,
    pub groups: CommodityGroups,
}

impl ModelCatalogs {
    /// Read and parse every catalog the configuration points at.
    pub fn load(config: &RunConfig) -> Result<Self, ReflowError> {
        let catalogs = &config.catalogs;
        let commodities = read_input(&config.inputs.commodity_items)?;
        let processes = read_input(&config.inputs.process_items)?;

        let commodity_set =
            catalog_ruleset(&commodities, "commodity_set", &catalogs.commodity_set_schema())?;
        let commodity =
            catalog_ruleset(&commodities, "commodity", &catalogs.commodity_schema()?)?;
        let commodity_fuel = catalog_ruleset(
            &commodities,
            "commodity_fuel",
            &catalogs.commodity_fuel_schema()?,
        )?;
        let process_set =
            catalog_ruleset(&processes, "process_set", &catalogs.process_set_schema())?;
        let process = catalog_ruleset(&processes, "process", &catalogs.process_schema()?)?;
        let process_fuel =
            catalog_ruleset(&processes, "process_fuel", &catalogs.process_fuel_schema()?)?;
        let process_enduse = catalog_ruleset(
            &processes,
            "process_enduse",
            &catalogs.process_enduse_schema()?,
        )?;

        let units = UnitMap::parse(&read_input(&config.inputs.unit_definitions)?);
        info!("parsed {} commodity unit definitions", units.len());
        let groups = CommodityGroups::parse(&read_input(&config.inputs.commodity_groups)?)?;

        Ok(Self {
            commodity_set,
            process_set,
            commodity,
            commodity_fuel,
            process,
            process_fuel,
            process_enduse,
            units,
            groups,
        })
    }

    /// The full labelling sequence for solver rows.
    ///
    /// Process sets go on before commodity sets: flow rows end up carrying
    /// their commodity's set, while capacity rows, which name no commodity,
    /// keep the process set the capacity parameter rule keys on.
    #[must_use]
    pub fn enrichment(&self) -> Vec<Ruleset> {
        vec![
            self.process_set.clone(),
            self.commodity_set.clone(),
            self.commodity.clone(),
            self.commodity_fuel.clone(),
            self.process.clone(),
            self.process_fuel.clone(),
            self.units.ruleset(),
            rulesets::fuel_groups(),
            rulesets::capacity_units(),
            rulesets::parameter_names(),
        ]
    }

    /// The labelling sequence for allocated rows. The generic fuel rulesets
    /// stay out so the provenance fuel labels survive, and the end-use
    /// reading of the process description goes on last.
    #[must_use]
    pub fn allocation_enrichment(&self) -> Vec<Ruleset> {
        vec![
            self.process_set.clone(),
            self.commodity_set.clone(),
            self.commodity.clone(),
            self.process.clone(),
            self.units.ruleset(),
            rulesets::fuel_groups(),
            rulesets::capacity_units(),
            rulesets::parameter_names(),
            self.process_enduse.clone(),
        ]
    }

    /// Process to sector, read straight from the process catalog rules.
    #[must_use]
    pub fn sector_of(&self) -> BTreeMap<String, String> {
        self.process.single_field_map(FieldId::Process, FieldId::Sector)
    }

    /// The end-use process layer energy is allocated to.
    #[must_use]
    pub fn end_uses(&self) -> BTreeSet<String> {
        self.groups.end_use_processes()
    }
}

fn catalog_ruleset(
    csv_text: &str,
    name: &str,
    schema: &CatalogSchema,
) -> Result<Ruleset, ReflowError> {
    let report = ruleset_from_catalog(csv_text, name, schema)?;
    for warning in &report.warnings {
        warn!("{name}: {warning}");
    }
    debug!("built ruleset {name} with {} rules", report.ruleset.len());
    Ok(report.ruleset)
}

// =============================================================================
// LOADING
// =============================================================================

/// Read every scenario export and aggregate to the raw reporting keys.
pub fn load_exports(config: &RunConfig) -> Result<Table, ReflowError> {
    let options = config.ignore.vd_options();
    let mut combined = Table::new();
    for (scenario, path) in &config.scenarios {
        let parsed = parse_vd(&read_input(path)?, scenario, &options)?;
        info!("loaded {} rows for scenario {scenario}", parsed.len());
        combined.extend(parsed);
    }
    Ok(combined.group_sum(&RAW_AGGREGATION_KEYS))
}

fn read_input(path: &Path) -> Result<String, ReflowError> {
    fs::read_to_string(path)
        .map_err(|e| ReflowError::IoError(format!("reading {}: {e}", path.display())))
}

fn write_output(
    path: &Path,
    table: &Table,
    columns: &[FieldId],
    include_value: bool,
) -> Result<(), ReflowError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| {
                ReflowError::IoError(format!("creating {}: {e}", parent.display()))
            })?;
        }
    }
    let file = fs::File::create(path)
        .map_err(|e| ReflowError::IoError(format!("writing {}: {e}", path.display())))?;
    write_csv(BufWriter::new(file), table, columns, include_value)
}

fn apply_rulesets(table: Table, rulesets: &[Ruleset]) -> Table {
    let mut table = table;
    for ruleset in rulesets {
        table = ruleset.apply(table);
        debug!("applied ruleset {} ({} rows)", ruleset.name, table.len());
    }
    table
}

// =============================================================================
// SCHEMA RUN
// =============================================================================

/// What a `schema` run wrote.
#[derive(Debug, Clone, Copy)]
pub struct SchemaSummary {
    pub rows: usize,
}

/// Generate the descriptive schema table: every observed or declared
/// (attribute, process, commodity) flow, fully labelled.
pub fn run_schema(config: &RunConfig) -> Result<SchemaSummary, ReflowError> {
    let catalogs = ModelCatalogs::load(config)?;
    let raw = load_exports(config)?;

    let observed = [FieldId::Attribute, FieldId::Process, FieldId::Commodity];
    let mut flows = raw.project(&observed).distinct_by(&observed);
    flows.extend(catalogs.groups.skeleton());
    info!("labelling {} schema rows", flows.len());

    let mut labelled = apply_rulesets(flows, &catalogs.enrichment());
    // Declared capacity rows name no commodity; write the placeholder
    // rather than losing them to the completeness filter.
    for record in &mut labelled.records {
        if !record.has(FieldId::Commodity) {
            record.set_text(FieldId::Commodity, NULL_SENTINEL);
        }
    }

    let mut schema = drop_incomplete(
        labelled.project(&SCHEMA_COLUMNS).distinct_by(&SCHEMA_COLUMNS),
        &SCHEMA_COLUMNS,
    );
    schema.sort_by_fields(&SCHEMA_COLUMNS);

    write_output(&config.inputs.schema_output, &schema, &SCHEMA_COLUMNS, false)?;
    info!(
        "wrote {} schema rows to {}",
        schema.len(),
        config.inputs.schema_output.display()
    );
    Ok(SchemaSummary { rows: schema.len() })
}

// =============================================================================
// ALLOCATION RUN
// =============================================================================

/// What an `allocate` run moved and wrote.
#[derive(Debug, Clone, Copy)]
pub struct AllocationSummary {
    pub rows: usize,
    pub dropped_rows: usize,
    pub added_rows: usize,
}

/// Run the full allocation pipeline and write the combined report.
pub fn run_allocation(config: &RunConfig) -> Result<AllocationSummary, ReflowError> {
    let catalogs = ModelCatalogs::load(config)?;
    let raw = load_exports(config)?;
    info!("aggregated exports to {} rows", raw.len());

    let enriched = apply_rulesets(raw, &catalogs.enrichment());

    let flow_policy = config.trace.flow_policy();
    let policy = config.allocation.policy();
    let end_uses = catalogs.end_uses();
    let sector_of = catalogs.sector_of();
    let provenance = config.allocation.provenance_ruleset()?;
    let re_enrichment = catalogs.allocation_enrichment();

    let allocator = Allocator::new(&enriched, &flow_policy, &catalogs.units, &end_uses)
        .with_max_depth(config.trace.max_depth);

    let mut outcome =
        allocator.allocate_negative_emissions(&policy, &sector_of, &provenance, &re_enrichment)?;
    let captured = slice_totals(&outcome.dropped, |_| true);
    for spec in &policy.substitutions {
        info!(
            "allocating {} to end uses (displacing {})",
            spec.commodity, spec.displaced_fuel
        );
        outcome.merge(allocator.allocate_substitution(spec, &provenance, &re_enrichment)?);
    }

    let mut markers = vec![config.trace.emission_marker.clone()];
    markers.extend(policy.substitutions.iter().map(|s| s.commodity.clone()));
    verify_conservation(&outcome, &markers)?;
    info!(
        "allocation conserved: {} rows out, {} rows in",
        outcome.dropped.len(),
        outcome.added.len()
    );

    let substituted: BTreeSet<String> = policy
        .substitutions
        .iter()
        .map(|s| s.commodity.clone())
        .collect();
    let production: BTreeMap<String, BTreeMap<(String, String), f64>> = substituted
        .iter()
        .map(|commodity| {
            let totals = slice_totals(&enriched, |record| {
                record.attribute() == Some(Attribute::Output)
                    && record.text(FieldId::Commodity) == Some(commodity.as_str())
            });
            (commodity.clone(), totals)
        })
        .collect();
    let total_commodity = policy.sector_emissions.get("").cloned().unwrap_or_default();
    let solver_emissions = if total_commodity.is_empty() {
        BTreeMap::new()
    } else {
        slice_totals(&enriched, |record| {
            record.text(FieldId::Commodity) == Some(total_commodity.as_str())
        })
    };

    let dropped_rows = outcome.dropped.len();
    let added_rows = outcome.added.len();
    let mut merged = enriched.subtract(&outcome.dropped);
    // The substitutes' production rows are retired outright: their quantity
    // now lives in the generated consumption rows.
    merged.retain(|record| {
        !(record.attribute() == Some(Attribute::Output)
            && record
                .text(FieldId::Commodity)
                .is_some_and(|c| substituted.contains(c)))
    });
    merged.extend(outcome.added);

    let report = shape_output(merged, config)?;
    check_report(
        &report,
        &policy,
        &config.finalize.emission_parameter,
        &provenance,
        &captured,
        &production,
        &solver_emissions,
    )?;

    let columns = config.finalize.column_order()?;
    write_output(&config.inputs.output, &report, &columns, true)?;
    info!(
        "wrote {} report rows to {}",
        report.len(),
        config.inputs.output.display()
    );
    Ok(AllocationSummary {
        rows: report.len(),
        dropped_rows,
        added_rows,
    })
}

/// The shaping pass between the merged table and the written report.
fn shape_output(table: Table, config: &RunConfig) -> Result<Table, ReflowError> {
    let columns = config.finalize.column_order()?;
    let required = config.finalize.completeness_fields()?;
    let relabels = config.finalize.relabel_ruleset()?;

    let mut table = relabels.apply(table);
    table = suppress_non_emitting_fuels(
        table,
        &config.finalize.non_emitting_fuels,
        &config.finalize.emission_parameter,
    );
    table = drop_incomplete(table, &required);

    // Aggregate while the flow identity is still present, then collapse to
    // the report columns once the inputs are split per end use.
    let mut keys = vec![FieldId::Attribute, FieldId::Process, FieldId::Commodity];
    keys.extend(columns.iter().copied());
    table = table.group_sum(&keys);

    if config.finalize.split_shared_inputs {
        table = split_shared_inputs(table, &config.trace.emission_marker)?;
    }

    let categories: Vec<FieldId> = columns
        .iter()
        .copied()
        .filter(|field| *field != FieldId::Period)
        .collect();
    table = fill_missing_periods(table, &categories);

    let mut table = table.group_sum(&columns);
    table = rulesets::vehicle_fleet_units().apply(table);
    table.sort_by_fields(&columns);
    Ok(table)
}

// =============================================================================
// REPORT CHECKS
// =============================================================================

/// Re-check the written report against totals captured before shaping: the
/// allocated quantities must still be visible after the joins and
/// aggregations, or the shaping pass ate rows it should not have.
#[allow(clippy::too_many_arguments)]
fn check_report(
    report: &Table,
    policy: &AllocationPolicy,
    emission_parameter: &str,
    provenance: &Ruleset,
    captured: &BTreeMap<(String, String), f64>,
    production: &BTreeMap<String, BTreeMap<(String, String), f64>>,
    solver_emissions: &BTreeMap<(String, String), f64>,
) -> Result<(), ReflowError> {
    let fuel_of = provenance.single_field_map(FieldId::Commodity, FieldId::Fuel);

    if !policy.zero_biofuel_emissions {
        let labels: BTreeSet<&str> = policy
            .substitutions
            .iter()
            .filter_map(|spec| fuel_of.get(&spec.commodity).map(String::as_str))
            .collect();
        let reported = slice_totals(report, |record| {
            record.text(FieldId::Parameters) == Some(emission_parameter)
                && record
                    .text(FieldId::Fuel)
                    .is_some_and(|fuel| labels.contains(fuel))
        });
        for ((scenario, period), expected) in captured {
            let actual = reported
                .get(&(scenario.clone(), period.clone()))
                .copied()
                .unwrap_or(0.0);
            if (actual - expected).abs() > CONSERVATION_TOLERANCE {
                return Err(ReflowError::ConservationMismatch {
                    label: format!("allocated emissions in {scenario}/{period}"),
                    dropped: *expected,
                    added: actual,
                });
            }
            debug!("allocated emissions check for {scenario}/{period}: {expected:.3}");
        }
    }

    for spec in &policy.substitutions {
        let Some(label) = fuel_of.get(&spec.commodity) else {
            continue;
        };
        let reported = slice_totals(report, |record| {
            record.text(FieldId::Parameters) == Some(CONSUMPTION_PARAMETER)
                && record.text(FieldId::Fuel) == Some(label.as_str())
        });
        let Some(expected) = production.get(&spec.commodity) else {
            continue;
        };
        for ((scenario, period), expected) in expected {
            let actual = reported
                .get(&(scenario.clone(), period.clone()))
                .copied()
                .unwrap_or(0.0);
            if (actual - expected).abs() > CONSERVATION_TOLERANCE {
                return Err(ReflowError::ConservationMismatch {
                    label: format!("{label} consumption in {scenario}/{period}"),
                    dropped: *expected,
                    added: actual,
                });
            }
            debug!("{label} consumption check for {scenario}/{period}: {expected:.3}");
        }
    }

    // Soft check: rows the completeness filter dropped legitimately take
    // emissions with them, so a shortfall is reported, not fatal.
    let reported_emissions = slice_totals(report, |record| {
        record.text(FieldId::Parameters) == Some(emission_parameter)
    });
    for ((scenario, period), solver) in solver_emissions {
        let reported = reported_emissions
            .get(&(scenario.clone(), period.clone()))
            .copied()
            .unwrap_or(0.0);
        if solver - reported > CONSERVATION_TOLERANCE {
            warn!(
                "emissions reported for {scenario}/{period} ({reported:.3}) miss part of the solver total ({solver:.3})"
            );
        }
    }
    Ok(())
}

fn slice_totals<F>(table: &Table, predicate: F) -> BTreeMap<(String, String), f64>
where
    F: Fn(&Record) -> bool,
{
    let mut totals = BTreeMap::new();
    for record in table {
        if !predicate(record) {
            continue;
        }
        let (Some(scenario), Some(period)) = (
            record.text(FieldId::Scenario),
            record.text(FieldId::Period),
        ) else {
            continue;
        };
        let Some(value) = record.value else {
            continue;
        };
        *totals
            .entry((scenario.to_string(), period.to_string()))
            .or_insert(0.0) += value;
    }
    totals
}

// =============================================================================
// INSPECTION RUNS
// =============================================================================

/// Trace one process's output forward to its terminal commodities.
pub fn run_trace(
    config: &RunConfig,
    process: &str,
    scenario: &str,
    period: &str,
) -> Result<BTreeMap<TracePath, f64>, ReflowError> {
    let catalogs = ModelCatalogs::load(config)?;
    let raw = load_exports(config)?;
    let flow_policy = config.trace.flow_policy();
    let tracer = Tracer::new(Flows::new(&raw, &flow_policy), &catalogs.units)
        .with_max_depth(config.trace.max_depth);
    let paths = tracer.trace(process, scenario, period)?;
    if let Err(error) = Tracer::verify_total(process, &paths) {
        warn!("{error}");
    }
    Ok(paths)
}

/// How one process's output divides over the end-use layer.
pub fn run_shares(
    config: &RunConfig,
    process: &str,
    scenario: &str,
    period: &str,
    commodity: Option<&str>,
) -> Result<Vec<EndUseShare>, ReflowError> {
    let catalogs = ModelCatalogs::load(config)?;
    let raw = load_exports(config)?;
    let flow_policy = config.trace.flow_policy();
    let end_uses = catalogs.end_uses();
    let allocator = Allocator::new(&raw, &flow_policy, &catalogs.units, &end_uses)
        .with_max_depth(config.trace.max_depth);
    let mut shares = allocator.end_use_shares(process, scenario, period, commodity)?;
    shares.retain(|share| share.value.is_some());
    Ok(shares)
}

// =============================================================================
// TESTS
// =============================================================================
