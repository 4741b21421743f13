//! # Model Catalogs
//!
//! Turns the model's CSV catalogs into rule material:
//!
//! - **Item lists** pack several labels into one delimited description column
//!   (`Sector-:-Subsector-:-Enduse-:-...`). [`ruleset_from_catalog`] splits
//!   them against a declared [`CatalogSchema`] and emits one mutate rule per
//!   catalog key.
//! - **Commodity groups** declare which commodities each process consumes
//!   and produces. [`CommodityGroups`] expands them into the schema skeleton
//!   and identifies the end-use layer of the network.
//!
//! Catalog parsing is forgiving where the rule engine can afford it: rows
//! that do not match the declared shape are reported and skipped, never
//! fatal.

use crate::rules::{Rule, Ruleset};
use crate::table::Table;
use crate::types::{Attribute, FieldId, Record, ReflowError};
use std::collections::{BTreeMap, BTreeSet};

/// Separator between packed labels in catalog description columns.
pub const DEFAULT_SEPARATOR: &str = "-:-";

// =============================================================================
// DELIMITED CATALOGS
// =============================================================================

/// How to read one catalog file: which column keys the rule condition, which
/// column to split, and which field each part lands in (`None` discards the
/// part).
#[derive(Debug, Clone)]
pub struct CatalogSchema {
    pub condition_field: FieldId,
    pub key_column: String,
    pub parse_column: String,
    pub parts: Vec<Option<FieldId>>,
    pub separator: String,
}

impl CatalogSchema {
    #[must_use]
    pub fn new(
        condition_field: FieldId,
        key_column: impl Into<String>,
        parse_column: impl Into<String>,
        parts: Vec<Option<FieldId>>,
    ) -> Self {
        Self {
            condition_field,
            key_column: key_column.into(),
            parse_column: parse_column.into(),
            parts,
            separator: DEFAULT_SEPARATOR.to_string(),
        }
    }

    #[must_use]
    pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }
}

/// A parsed catalog: the ruleset plus anything worth telling the operator.
#[derive(Debug, Clone)]
pub struct CatalogReport {
    pub ruleset: Ruleset,
    pub warnings: Vec<String>,
}

/// Build a mutate ruleset from a catalog CSV.
///
/// One rule per catalog key. Rows whose parse column does not split into the
/// declared number of parts are skipped with a warning; a key described twice
/// with different labels warns and keeps the last description. Rows whose
/// parts are all discarded produce no rule.
pub fn ruleset_from_catalog(
    csv_text: &str,
    name: &str,
    schema: &CatalogSchema,
) -> Result<CatalogReport, ReflowError> {
    let mut reader = csv::Reader::from_reader(csv_text.as_bytes());
    let headers = reader
        .headers()
        .map_err(|e| ReflowError::CsvError(format!("catalog {name}: {e}")))?
        .clone();

    let key_index = column_index(&headers, &schema.key_column, name)?;
    let parse_index = column_index(&headers, &schema.parse_column, name)?;

    let mut staged: BTreeMap<String, BTreeMap<FieldId, String>> = BTreeMap::new();
    let mut warnings = Vec::new();

    for row in reader.records() {
        let row = row.map_err(|e| ReflowError::CsvError(format!("catalog {name}: {e}")))?;
        let key = row.get(key_index).unwrap_or("").trim();
        if key.is_empty() {
            continue;
        }

        let packed = row.get(parse_index).unwrap_or("");
        let parts: Vec<&str> = packed.split(&schema.separator).map(str::trim).collect();
        if parts.len() != schema.parts.len() {
            warnings.push(format!(
                "{name}: {key} does not match the expected format: {packed:?}"
            ));
            continue;
        }

        let action: BTreeMap<FieldId, String> = schema
            .parts
            .iter()
            .zip(&parts)
            .filter_map(|(slot, part)| slot.map(|field| (field, (*part).to_string())))
            .collect();
        if action.is_empty() {
            continue;
        }

        if let Some(previous) = staged.get(key) {
            if previous != &action {
                warnings.push(format!(
                    "{name}: conflicting descriptions for {key}; keeping the last one"
                ));
            }
        }
        staged.insert(key.to_string(), action);
    }

    let rules = staged
        .into_iter()
        .map(|(key, action)| {
            let mut rule = Rule::mutate().when(schema.condition_field, key);
            for (field, value) in action {
                rule = rule.set(field, value);
            }
            rule
        })
        .collect();

    Ok(CatalogReport {
        ruleset: Ruleset::new(name, rules),
        warnings,
    })
}

fn column_index(
    headers: &csv::StringRecord,
    column: &str,
    name: &str,
) -> Result<usize, ReflowError> {
    headers
        .iter()
        .position(|h| h.trim() == column)
        .ok_or_else(|| {
            ReflowError::ParseError(format!("catalog {name} has no column named {column}"))
        })
}

// =============================================================================
// COMMODITY GROUPS
// =============================================================================

/// The four commodity roles a TIMES group name can carry as its suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CommodityClass {
    /// `NRGI`: energy consumed by the process.
    EnergyInput,
    /// `NRGO`: energy produced by the process.
    EnergyOutput,
    /// `ENVO`: emissions produced by the process.
    EmissionOutput,
    /// `DEMO`: final demand satisfied by the process.
    DemandOutput,
}

impl CommodityClass {
    pub const ALL: [CommodityClass; 4] = [
        Self::EnergyInput,
        Self::EnergyOutput,
        Self::EmissionOutput,
        Self::DemandOutput,
    ];

    #[must_use]
    pub const fn suffix(self) -> &'static str {
        match self {
            Self::EnergyInput => "NRGI",
            Self::EnergyOutput => "NRGO",
            Self::EmissionOutput => "ENVO",
            Self::DemandOutput => "DEMO",
        }
    }

    #[must_use]
    const fn attribute(self) -> Attribute {
        match self {
            Self::EnergyInput => Attribute::Input,
            _ => Attribute::Output,
        }
    }
}

/// The process/commodity membership declared by the model's commodity-group
/// catalog.
#[derive(Debug, Clone, Default)]
pub struct CommodityGroups {
    /// (process, class, member commodity) for every suffix-matched row.
    entries: Vec<(String, CommodityClass, String)>,
}

impl CommodityGroups {
    /// Parse the commodity-group CSV (`Process`, `Name`, `Member` columns).
    /// Rows whose group name carries none of the four class suffixes are not
    /// flow declarations and are ignored.
    pub fn parse(csv_text: &str) -> Result<Self, ReflowError> {
        let mut reader = csv::Reader::from_reader(csv_text.as_bytes());
        let headers = reader
            .headers()
            .map_err(|e| ReflowError::CsvError(format!("commodity groups: {e}")))?
            .clone();
        let process_index = column_index(&headers, "Process", "commodity groups")?;
        let name_index = column_index(&headers, "Name", "commodity groups")?;
        let member_index = column_index(&headers, "Member", "commodity groups")?;

        let mut entries = Vec::new();
        for row in reader.records() {
            let row =
                row.map_err(|e| ReflowError::CsvError(format!("commodity groups: {e}")))?;
            let process = row.get(process_index).unwrap_or("").trim();
            let name = row.get(name_index).unwrap_or("").trim();
            let member = row.get(member_index).unwrap_or("").trim();
            if process.is_empty() || member.is_empty() {
                continue;
            }
            if let Some(class) = CommodityClass::ALL
                .into_iter()
                .find(|class| name.ends_with(class.suffix()))
            {
                entries.push((process.to_string(), class, member.to_string()));
            }
        }

        Ok(Self { entries })
    }

    /// Every flow the model declares, as labelled skeleton records.
    ///
    /// Emission outputs arrive pre-labelled (`Emissions`, `kt CO2`) and
    /// demand outputs carry `End Use Demand`; each declared process also
    /// contributes one capacity record. Skeleton records carry no values.
    #[must_use]
    pub fn skeleton(&self) -> Table {
        let mut table = Table::new();
        for (process, class, member) in &self.entries {
            let mut record = Record::new()
                .with_attribute(class.attribute())
                .with(FieldId::Process, process.as_str())
                .with(FieldId::Commodity, member.as_str());
            match class {
                CommodityClass::EmissionOutput => {
                    record.set_text(FieldId::Parameters, "Emissions");
                    record.set_text(FieldId::Unit, "kt CO2");
                }
                CommodityClass::DemandOutput => {
                    record.set_text(FieldId::Parameters, "End Use Demand");
                }
                _ => {}
            }
            table.push(record);
        }

        let mut seen_processes = BTreeSet::new();
        for (process, _, _) in &self.entries {
            if seen_processes.insert(process.as_str()) {
                table.push(
                    Record::new()
                        .with_attribute(Attribute::Capacity)
                        .with(FieldId::Process, process.as_str()),
                );
            }
        }

        table.distinct_by(&[
            FieldId::Attribute,
            FieldId::Process,
            FieldId::Commodity,
            FieldId::Parameters,
            FieldId::Unit,
        ])
    }

    /// All member commodities of one class.
    #[must_use]
    pub fn commodities_in_class(&self, class: CommodityClass) -> BTreeSet<String> {
        self.entries
            .iter()
            .filter(|(_, c, _)| *c == class)
            .map(|(_, _, member)| member.clone())
            .collect()
    }

    /// Processes that touch a demand commodity in any role. These are the
    /// terminal layer energy is allocated to.
    #[must_use]
    pub fn end_use_processes(&self) -> BTreeSet<String> {
        let demands = self.commodities_in_class(CommodityClass::DemandOutput);
        self.entries
            .iter()
            .filter(|(_, _, member)| demands.contains(member))
            .map(|(process, _, _)| process.clone())
            .collect()
    }
}

// =============================================================================
// TESTS
// =============================================================================
