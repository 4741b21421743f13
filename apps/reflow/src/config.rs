//! # Run Configuration
//!
//! The TOML file describing one model run: where the solver exports and the
//! catalogs live, plus the policy knobs for tracing, allocation and final
//! shaping. Every policy section carries serde defaults mirroring the
//! reference TIMES-NZ model, so a minimal file naming only the scenarios and
//! input paths runs the standard pipeline.
//!
//! Configuration is plain data handed down into `reflow-core`; nothing here
//! is global state.

use reflow_core::{
    AllocationPolicy, Attribute, CatalogSchema, DEFAULT_SEPARATOR, FieldId, FlowPolicy, FlowRef,
    MAX_TRACE_DEPTH, ReflowError, Rule, Ruleset, ShareOverride, SubstitutionSpec, VdOptions,
    rulesets,
};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

// =============================================================================
// RUN CONFIGURATION
// =============================================================================

/// Everything one `reflow` invocation needs to know.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    /// Scenario name to the `.vd` export the solver wrote for it.
    pub scenarios: BTreeMap<String, PathBuf>,

    pub inputs: InputPaths,

    #[serde(default)]
    pub ignore: IgnoreConfig,

    #[serde(default)]
    pub catalogs: CatalogsConfig,

    #[serde(default)]
    pub trace: TraceConfig,

    #[serde(default)]
    pub allocation: AllocationConfig,

    #[serde(default)]
    pub finalize: FinalizeConfig,
}

impl RunConfig {
    /// Read and parse a run configuration file.
    pub fn load(path: &Path) -> Result<Self, ReflowError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ReflowError::IoError(format!("reading configuration {}: {e}", path.display()))
        })?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| ReflowError::ConfigError(format!("{}: {e}", path.display())))?;

        if config.scenarios.is_empty() {
            return Err(ReflowError::ConfigError(format!(
                "{}: no scenarios declared",
                path.display()
            )));
        }
        Ok(config)
    }
}

/// Catalog and output locations. No defaults; a run has to say where its
/// model lives.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InputPaths {
    /// Items-List-Commodity CSV (`Commodity`, `Description`, `Set` columns).
    pub commodity_items: PathBuf,
    /// Items-List-Process CSV (`Process`, `Description`, `Set` columns).
    pub process_items: PathBuf,
    /// Commodity-group membership CSV (`Process`, `Name`, `Member` columns).
    pub commodity_groups: PathBuf,
    /// The `.dd` file carrying the `SET COM_UNIT` block.
    pub unit_definitions: PathBuf,
    /// Destination of the final reporting table.
    pub output: PathBuf,
    /// Destination of the label schema table.
    pub schema_output: PathBuf,
}

// =============================================================================
// LOAD FILTERS
// =============================================================================

/// Rows discarded while reading the exports.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IgnoreConfig {
    /// Calibration-year periods outside the reported horizon.
    pub periods: Vec<String>,
    /// Commodities excluded from the pipeline entirely.
    pub commodities: Vec<String>,
}

impl Default for IgnoreConfig {
    fn default() -> Self {
        Self {
            periods: to_strings(&["2016", "2020"]),
            commodities: to_strings(&["COseq"]),
        }
    }
}

impl IgnoreConfig {
    #[must_use]
    pub fn vd_options(&self) -> VdOptions {
        VdOptions {
            ignore_periods: self.periods.clone(),
            ignore_commodities: self.commodities.clone(),
        }
    }
}

// =============================================================================
// CATALOG SCHEMAS
// =============================================================================

/// How the packed description cells of the item-list catalogs are split.
///
/// Each list names the field every separator-delimited part lands in; an
/// empty string discards that part. The same description column can feed
/// several rulesets reading different parts.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CatalogsConfig {
    pub separator: String,
    /// Process description: `Sector -:- Subsector -:- Enduse -:- Technology -:- Fuel`.
    pub process: Vec<String>,
    /// Fuel part of the process description, applied as its own pass.
    pub process_fuel: Vec<String>,
    /// Enduse part alone, for re-labelling allocated rows.
    pub process_enduse: Vec<String>,
    /// Commodity description: `Sector -:- Subsector -:- Fuel/Enduse`.
    pub commodity: Vec<String>,
    /// Fuel reading of the commodity description's last part.
    pub commodity_fuel: Vec<String>,
}

impl Default for CatalogsConfig {
    fn default() -> Self {
        Self {
            separator: DEFAULT_SEPARATOR.to_string(),
            process: to_strings(&["Sector", "Subsector", "Enduse", "Technology", ""]),
            process_fuel: to_strings(&["", "", "", "", "Fuel"]),
            process_enduse: to_strings(&["", "", "Enduse", "", ""]),
            commodity: to_strings(&["Sector", "Subsector", "Enduse"]),
            commodity_fuel: to_strings(&["", "", "Fuel"]),
        }
    }
}

impl CatalogsConfig {
    pub fn process_schema(&self) -> Result<CatalogSchema, ReflowError> {
        self.description_schema(FieldId::Process, "Process", &self.process)
    }

    pub fn process_fuel_schema(&self) -> Result<CatalogSchema, ReflowError> {
        self.description_schema(FieldId::Process, "Process", &self.process_fuel)
    }

    pub fn process_enduse_schema(&self) -> Result<CatalogSchema, ReflowError> {
        self.description_schema(FieldId::Process, "Process", &self.process_enduse)
    }

    pub fn commodity_schema(&self) -> Result<CatalogSchema, ReflowError> {
        self.description_schema(FieldId::Commodity, "Commodity", &self.commodity)
    }

    pub fn commodity_fuel_schema(&self) -> Result<CatalogSchema, ReflowError> {
        self.description_schema(FieldId::Commodity, "Commodity", &self.commodity_fuel)
    }

    /// The `Set` column of the process list, one part, no separator involved.
    #[must_use]
    pub fn process_set_schema(&self) -> CatalogSchema {
        CatalogSchema::new(FieldId::Process, "Process", "Set", vec![Some(FieldId::Set)])
            .with_separator(self.separator.clone())
    }

    #[must_use]
    pub fn commodity_set_schema(&self) -> CatalogSchema {
        CatalogSchema::new(
            FieldId::Commodity,
            "Commodity",
            "Set",
            vec![Some(FieldId::Set)],
        )
        .with_separator(self.separator.clone())
    }

    fn description_schema(
        &self,
        condition_field: FieldId,
        key_column: &str,
        parts: &[String],
    ) -> Result<CatalogSchema, ReflowError> {
        let slots = parts
            .iter()
            .map(|name| {
                if name.is_empty() {
                    Ok(None)
                } else {
                    name.parse::<FieldId>().map(Some)
                }
            })
            .collect::<Result<Vec<_>, ReflowError>>()?;
        Ok(
            CatalogSchema::new(condition_field, key_column, "Description", slots)
                .with_separator(self.separator.clone()),
        )
    }
}

// =============================================================================
// TRACE POLICY
// =============================================================================

/// What the tracer treats as an emission or a trade link, and how deep it
/// may recurse.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TraceConfig {
    /// Substring marking emission commodities.
    pub emission_marker: String,
    /// Name prefixes of inter-island fuel trade processes.
    pub trade_prefixes: Vec<String>,
    pub max_depth: usize,
}

impl Default for TraceConfig {
    fn default() -> Self {
        let policy = FlowPolicy::default();
        Self {
            emission_marker: policy.emission_marker,
            trade_prefixes: policy.trade_prefixes,
            max_depth: MAX_TRACE_DEPTH,
        }
    }
}

impl TraceConfig {
    #[must_use]
    pub fn flow_policy(&self) -> FlowPolicy {
        FlowPolicy {
            emission_marker: self.emission_marker.clone(),
            trade_prefixes: self.trade_prefixes.clone(),
        }
    }
}

// =============================================================================
// ALLOCATION POLICY
// =============================================================================

/// Which sectors report under which emission commodity, and which substitute
/// fuels are redistributed to their end uses.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AllocationConfig {
    /// Sector to the emission commodity its allocations report under. The
    /// empty-string entry is the fallback for sectors not listed.
    pub sector_emissions: BTreeMap<String, String>,
    pub substitutions: Vec<SubstitutionConfig>,
    /// Replacement for the built-in fuel provenance rules.
    pub provenance: Option<Vec<RuleSpec>>,
    /// Report biogenic carbon as neutral: duplicate biofuel emission rows
    /// under their fossil equivalents and zero the originals.
    pub zero_biofuel_emissions: bool,
    pub fossil_equivalents: BTreeMap<String, String>,
    pub fossil_fuel_group: String,
}

impl Default for AllocationConfig {
    fn default() -> Self {
        Self {
            sector_emissions: to_map(&[
                ("", "TOTCO2"),
                ("Agriculture", "AGRCO2"),
                ("Commercial", "COMCO2"),
                ("Electricity", "ELCCO2"),
                ("Green Hydrogen", "TOTCO2"),
                ("Industry", "INDCO2"),
                ("Primary Fuel Supply", "TOTCO2"),
                ("Residential", "RESCO2"),
                ("Transport", "TRACO2"),
            ]),
            substitutions: reference_substitutions(),
            provenance: None,
            zero_biofuel_emissions: false,
            fossil_equivalents: to_map(&[
                ("Biodiesel", "Diesel"),
                ("Drop-In Diesel", "Diesel"),
                ("Drop-In Jet", "Jet Fuel"),
            ]),
            fossil_fuel_group: "Fossil Fuels".to_string(),
        }
    }
}

impl AllocationConfig {
    pub fn provenance_ruleset(&self) -> Result<Ruleset, ReflowError> {
        match &self.provenance {
            None => Ok(rulesets::fuel_provenance()),
            Some(specs) => {
                let rules = specs
                    .iter()
                    .map(RuleSpec::to_rule)
                    .collect::<Result<Vec<_>, ReflowError>>()?;
                Ok(Ruleset::new("fuel_provenance", rules))
            }
        }
    }

    #[must_use]
    pub fn policy(&self) -> AllocationPolicy {
        AllocationPolicy {
            sector_emissions: self.sector_emissions.clone(),
            substitutions: self
                .substitutions
                .iter()
                .map(SubstitutionConfig::to_spec)
                .collect(),
            zero_biofuel_emissions: self.zero_biofuel_emissions,
            fossil_equivalents: self.fossil_equivalents.clone(),
            fossil_fuel_group: self.fossil_fuel_group.clone(),
        }
    }
}

/// One substitute fuel route.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubstitutionConfig {
    /// Commodity the substitute route produces.
    pub commodity: String,
    /// Fossil fuel label the mirror rows back out.
    pub displaced_fuel: String,
    #[serde(default = "fossil_fuel_group")]
    pub displaced_fuel_group: String,
    pub share_override: Option<ShareOverrideConfig>,
}

impl SubstitutionConfig {
    fn to_spec(&self) -> SubstitutionSpec {
        SubstitutionSpec {
            commodity: self.commodity.clone(),
            displaced_fuel: self.displaced_fuel.clone(),
            displaced_fuel_group: self.displaced_fuel_group.clone(),
            share_override: self.share_override.as_ref().map(ShareOverrideConfig::to_spec),
        }
    }
}

/// Overwrite two end-use shares with the ratio of their observed demand
/// flows instead of the traced fractions.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ShareOverrideConfig {
    pub first: FlowRefConfig,
    pub second: FlowRefConfig,
    /// Traced commodity stamped on the second share.
    pub commodity: String,
    /// Provenance process stamped on the second share.
    pub source_process: String,
}

impl ShareOverrideConfig {
    fn to_spec(&self) -> ShareOverride {
        ShareOverride {
            first: self.first.to_flow_ref(),
            second: self.second.to_flow_ref(),
            commodity: self.commodity.clone(),
            source_process: self.source_process.clone(),
        }
    }
}

/// A (process, output commodity) pair.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FlowRefConfig {
    pub process: String,
    pub commodity: String,
}

impl FlowRefConfig {
    fn to_flow_ref(&self) -> FlowRef {
        FlowRef {
            process: self.process.clone(),
            commodity: self.commodity.clone(),
        }
    }
}

fn reference_substitutions() -> Vec<SubstitutionConfig> {
    vec![
        SubstitutionConfig {
            commodity: "BDSL".to_string(),
            displaced_fuel: "Diesel".to_string(),
            displaced_fuel_group: fossil_fuel_group(),
            share_override: None,
        },
        SubstitutionConfig {
            commodity: "DID".to_string(),
            displaced_fuel: "Diesel".to_string(),
            displaced_fuel_group: fossil_fuel_group(),
            share_override: None,
        },
        SubstitutionConfig {
            commodity: "DIJ".to_string(),
            displaced_fuel: "Jet Fuel".to_string(),
            displaced_fuel_group: fossil_fuel_group(),
            // Domestic and international jet demand are siblings fed by one
            // blending process; the trace cannot split them, the observed
            // demand flows can.
            share_override: Some(ShareOverrideConfig {
                first: FlowRefConfig {
                    process: "T_O_FuelJet".to_string(),
                    commodity: "T_O_JET".to_string(),
                },
                second: FlowRefConfig {
                    process: "T_O_FuelJet_Int".to_string(),
                    commodity: "T_O_JET_Int".to_string(),
                },
                commodity: "DIJ".to_string(),
                source_process: "CT_CWODDID".to_string(),
            }),
        },
    ]
}

// =============================================================================
// FINALIZE POLICY
// =============================================================================

/// The shaping pass between allocation and the written table.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FinalizeConfig {
    /// Fuels whose emission rows are zeroed rather than reported.
    pub non_emitting_fuels: Vec<String>,
    /// `Parameters` label identifying emission rows.
    pub emission_parameter: String,
    /// Split the single input row of multi-output processes across their
    /// end uses.
    pub split_shared_inputs: bool,
    /// Replacement for the built-in final relabel rules.
    pub relabels: Option<Vec<RuleSpec>>,
    /// Descriptive fields a row must carry to stay in the report.
    pub required_fields: Vec<String>,
    /// Report columns, in written order.
    pub report_columns: Vec<String>,
}

impl Default for FinalizeConfig {
    fn default() -> Self {
        Self {
            non_emitting_fuels: to_strings(&[
                "Electricity",
                "Wood",
                "Hydrogen",
                "Hydro",
                "Wind",
                "Solar",
                "Biogas",
            ]),
            emission_parameter: "Emissions".to_string(),
            split_shared_inputs: true,
            relabels: None,
            required_fields: to_strings(&[
                "Sector",
                "Subsector",
                "Technology",
                "Fuel",
                "Enduse",
                "Unit",
                "Parameters",
                "FuelGroup",
            ]),
            report_columns: to_strings(&[
                "Scenario",
                "Sector",
                "Subsector",
                "Technology",
                "Enduse",
                "Unit",
                "Parameters",
                "Fuel",
                "Period",
                "FuelGroup",
            ]),
        }
    }
}

impl FinalizeConfig {
    pub fn relabel_ruleset(&self) -> Result<Ruleset, ReflowError> {
        match &self.relabels {
            None => Ok(rulesets::final_relabels()),
            Some(specs) => {
                let rules = specs
                    .iter()
                    .map(RuleSpec::to_rule)
                    .collect::<Result<Vec<_>, ReflowError>>()?;
                Ok(Ruleset::new("final_relabels", rules))
            }
        }
    }

    /// `required_fields` as field identifiers.
    pub fn completeness_fields(&self) -> Result<Vec<FieldId>, ReflowError> {
        parse_fields(&self.required_fields)
    }

    /// `report_columns` as field identifiers, order preserved.
    pub fn column_order(&self) -> Result<Vec<FieldId>, ReflowError> {
        parse_fields(&self.report_columns)
    }
}

// =============================================================================
// RULES IN TOML FORM
// =============================================================================

/// One labelling rule as written in configuration: field names as they
/// appear in the output tables, attribute values as solver labels
/// (`VAR_FIn`).
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleSpec {
    pub effect: EffectSpec,
    #[serde(default)]
    pub when: BTreeMap<String, String>,
    #[serde(default)]
    pub set: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EffectSpec {
    Mutate,
    Derive,
    Delete,
}

impl RuleSpec {
    pub fn to_rule(&self) -> Result<Rule, ReflowError> {
        let mut rule = match self.effect {
            EffectSpec::Mutate => Rule::mutate(),
            EffectSpec::Derive => Rule::derive(),
            EffectSpec::Delete => Rule::delete(),
        };
        for (field, value) in &self.when {
            let field: FieldId = field.parse()?;
            rule = if field == FieldId::Attribute {
                rule.when_attribute(value.parse()?)
            } else {
                rule.when(field, value.as_str())
            };
        }
        for (field, value) in &self.set {
            let field: FieldId = field.parse()?;
            rule = if field == FieldId::Attribute {
                rule.set(field, value.parse::<Attribute>()?)
            } else {
                rule.set(field, value.as_str())
            };
        }
        Ok(rule)
    }
}

// =============================================================================
// HELPERS
// =============================================================================

fn fossil_fuel_group() -> String {
    "Fossil Fuels".to_string()
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

fn parse_fields(names: &[String]) -> Result<Vec<FieldId>, ReflowError> {
    names.iter().map(|name| name.parse()).collect()
}

fn to_map(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
    entries
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect()
}

// =============================================================================
// TESTS
// =============================================================================
