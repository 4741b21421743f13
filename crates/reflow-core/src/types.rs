//! # Core Type Definitions
//!
//! This module contains the shared vocabulary of the pipeline:
//! - Field identifiers and label values (`FieldId`, `Attribute`, `FieldValue`)
//! - The labelled row type (`Record`)
//! - Error types (`ReflowError`)
//!
//! ## Determinism Guarantees
//!
//! Record fields live in a `BTreeMap` keyed by the closed `FieldId` enum, so
//! field iteration, comparison and output ordering never depend on insertion
//! order. The derived `Ord` on `FieldId` is also the canonical tie-break
//! ordering used by the rule engine's specificity sort.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Placeholder the solver export uses for a dimension that does not apply
/// (e.g. the commodity of a capacity row). Delete rules treat an absent field
/// and this sentinel as the same value.
pub const NULL_SENTINEL: &str = "-";

// =============================================================================
// FIELD IDENTIFIERS
// =============================================================================

/// The closed set of record fields the rule engine can address.
///
/// The numeric `Value` of a record is deliberately not part of this enum:
/// rules label records, they never rewrite quantities.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum FieldId {
    Attribute,
    Scenario,
    Commodity,
    Process,
    Period,
    Set,
    Sector,
    Subsector,
    Technology,
    Fuel,
    FuelGroup,
    Enduse,
    Unit,
    Parameters,
    FuelSourceProcess,
}

impl FieldId {
    /// Column-header spelling of the field, as used in catalogs and output.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Attribute => "Attribute",
            Self::Scenario => "Scenario",
            Self::Commodity => "Commodity",
            Self::Process => "Process",
            Self::Period => "Period",
            Self::Set => "Set",
            Self::Sector => "Sector",
            Self::Subsector => "Subsector",
            Self::Technology => "Technology",
            Self::Fuel => "Fuel",
            Self::FuelGroup => "FuelGroup",
            Self::Enduse => "Enduse",
            Self::Unit => "Unit",
            Self::Parameters => "Parameters",
            Self::FuelSourceProcess => "FuelSourceProcess",
        }
    }
}

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldId {
    type Err = ReflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Attribute" => Ok(Self::Attribute),
            "Scenario" => Ok(Self::Scenario),
            "Commodity" => Ok(Self::Commodity),
            "Process" => Ok(Self::Process),
            "Period" => Ok(Self::Period),
            "Set" => Ok(Self::Set),
            "Sector" => Ok(Self::Sector),
            "Subsector" => Ok(Self::Subsector),
            "Technology" => Ok(Self::Technology),
            "Fuel" => Ok(Self::Fuel),
            "FuelGroup" => Ok(Self::FuelGroup),
            "Enduse" => Ok(Self::Enduse),
            "Unit" => Ok(Self::Unit),
            "Parameters" => Ok(Self::Parameters),
            "FuelSourceProcess" => Ok(Self::FuelSourceProcess),
            other => Err(ReflowError::ConfigError(format!(
                "unknown field name: {other}"
            ))),
        }
    }
}

// =============================================================================
// ATTRIBUTES
// =============================================================================

/// The three solver variables the pipeline models. Cost and constraint
/// attributes in the export are dropped at load time.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Attribute {
    /// Installed capacity (`VAR_Cap`).
    Capacity,
    /// Commodity flow into a process (`VAR_FIn`).
    Input,
    /// Commodity flow out of a process (`VAR_FOut`).
    Output,
}

impl Attribute {
    /// The label used by the solver export and by the written output.
    #[must_use]
    pub const fn as_label(self) -> &'static str {
        match self {
            Self::Capacity => "VAR_Cap",
            Self::Input => "VAR_FIn",
            Self::Output => "VAR_FOut",
        }
    }

    /// Parse an export label. Returns `None` for attributes the pipeline
    /// does not keep (costs, constraints).
    #[must_use]
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "VAR_Cap" => Some(Self::Capacity),
            "VAR_FIn" => Some(Self::Input),
            "VAR_FOut" => Some(Self::Output),
            _ => None,
        }
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_label())
    }
}

impl FromStr for Attribute {
    type Err = ReflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_label(s)
            .ok_or_else(|| ReflowError::ConfigError(format!("unknown attribute label: {s}")))
    }
}

// =============================================================================
// FIELD VALUES
// =============================================================================

/// The value a record holds for one field: either one of the three well-known
/// attributes, or free text from the export and the catalogs.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FieldValue {
    Attribute(Attribute),
    Text(String),
}

impl FieldValue {
    /// String form of the value as it appears on the wire.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Attribute(a) => a.as_label(),
            Self::Text(s) => s.as_str(),
        }
    }

    /// An empty text value acts as a wildcard in rule conditions and as
    /// "leave unchanged" in rule actions.
    #[must_use]
    pub fn is_wildcard(&self) -> bool {
        matches!(self, Self::Text(s) if s.is_empty())
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Attribute> for FieldValue {
    fn from(a: Attribute) -> Self {
        Self::Attribute(a)
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

// =============================================================================
// RECORDS
// =============================================================================

/// One labelled row of the working table.
///
/// Fields are sparse: a row fresh from the export carries only the solver
/// dimensions, and descriptive fields are filled in by rulesets as the
/// pipeline runs. The numeric value is held apart from the labels and is
/// absent on pure labelling rows (schema skeletons, unreached share rows).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    pub fields: BTreeMap<FieldId, FieldValue>,
    pub value: Option<f64>,
}

impl Record {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, field: FieldId) -> Option<&FieldValue> {
        self.fields.get(&field)
    }

    /// String form of a field's value, if present.
    #[must_use]
    pub fn text(&self, field: FieldId) -> Option<&str> {
        self.fields.get(&field).map(FieldValue::as_str)
    }

    /// The record's attribute, if it carries one.
    #[must_use]
    pub fn attribute(&self) -> Option<Attribute> {
        match self.fields.get(&FieldId::Attribute) {
            Some(FieldValue::Attribute(a)) => Some(*a),
            _ => None,
        }
    }

    #[must_use]
    pub fn has(&self, field: FieldId) -> bool {
        self.fields.contains_key(&field)
    }

    pub fn set(&mut self, field: FieldId, value: FieldValue) {
        self.fields.insert(field, value);
    }

    pub fn set_text(&mut self, field: FieldId, value: impl Into<String>) {
        self.fields.insert(field, FieldValue::Text(value.into()));
    }

    pub fn clear(&mut self, field: FieldId) {
        self.fields.remove(&field);
    }

    #[must_use]
    pub fn with(mut self, field: FieldId, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(field, value.into());
        self
    }

    #[must_use]
    pub fn with_attribute(self, attribute: Attribute) -> Self {
        self.with(FieldId::Attribute, attribute)
    }

    #[must_use]
    pub fn with_value(mut self, value: f64) -> Self {
        self.value = Some(value);
        self
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors raised by the pipeline.
///
/// - No silent failures
/// - Use `Result<T, ReflowError>` for fallible operations
/// - Invariant violations abort the run; they signal a defect in the source
///   model or the rule configuration, never a transient fault
#[derive(Debug, Error)]
pub enum ReflowError {
    /// A traced process emits commodities measured in different units.
    #[error("Output commodities of process {process} span multiple units: {units:?}")]
    MixedUnits { process: String, units: Vec<String> },

    /// A traced commodity has no entry in the unit definitions.
    #[error("No unit definition for commodity: {commodity}")]
    MissingUnit { commodity: String },

    /// A traced process has no traceable (non-emission) output flows.
    #[error("Process has no traceable output flows: {process}")]
    NoOutputFlows { process: String },

    /// A flow set summing to zero cannot be normalized to fractions.
    #[error("Cannot normalize zero-total flows: {context}")]
    ZeroFlowTotal { context: String },

    /// A flow required by an explicit share override is absent.
    #[error("No output flow recorded for {commodity} from process {process}")]
    MissingFlow { process: String, commodity: String },

    /// Terminal trace fractions do not sum to one within tolerance.
    #[error("Trace fractions for process {process} sum to {total}, expected 1")]
    UnbalancedTrace { process: String, total: f64 },

    /// The trace recursion exceeded the configured depth bound.
    #[error("Trace depth bound {depth} exceeded at process {process}")]
    DepthExceeded { process: String, depth: usize },

    /// Dropped and added allocation rows disagree in total value.
    #[error("Value not conserved for {label}: dropped {dropped}, added {added}")]
    ConservationMismatch {
        label: String,
        dropped: f64,
        added: f64,
    },

    /// A sector with no configured emission commodity.
    #[error("No emission commodity configured for sector: {sector:?}")]
    UnmappedSector { sector: String },

    /// A multi-output group did not have exactly one input row to split.
    #[error(
        "Expected exactly one input row for {process} ({scenario}, {period}), found {inputs}"
    )]
    AmbiguousInputSplit {
        scenario: String,
        process: String,
        period: String,
        inputs: usize,
    },

    /// Malformed input data.
    #[error("Parse error: {0}")]
    ParseError(String),

    /// A CSV read or write error occurred.
    #[error("CSV error: {0}")]
    CsvError(String),

    /// Invalid run configuration.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    IoError(String),
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attribute_labels_round_trip() {
        for attribute in [Attribute::Capacity, Attribute::Input, Attribute::Output] {
            assert_eq!(Attribute::from_label(attribute.as_label()), Some(attribute));
        }
        assert_eq!(Attribute::from_label("VAR_ObjFix"), None);
    }

    #[test]
    fn field_id_ordering_is_canonical() {
        assert!(FieldId::Attribute < FieldId::Scenario);
        assert!(FieldId::Commodity < FieldId::Process);
        assert!(FieldId::Unit < FieldId::Parameters);
    }

    #[test]
    fn field_id_parses_column_headers() {
        let field: FieldId = "FuelGroup".parse().expect("known field");
        assert_eq!(field, FieldId::FuelGroup);
        assert!("Region".parse::<FieldId>().is_err());
    }

    #[test]
    fn empty_text_is_wildcard() {
        assert!(FieldValue::Text(String::new()).is_wildcard());
        assert!(!FieldValue::Text("PJ".to_string()).is_wildcard());
        assert!(!FieldValue::Attribute(Attribute::Input).is_wildcard());
    }

    #[test]
    fn record_builder_sets_fields() {
        let record = Record::new()
            .with_attribute(Attribute::Output)
            .with(FieldId::Process, "CT_COILBDS")
            .with(FieldId::Commodity, "BDSL")
            .with_value(1.25);

        assert_eq!(record.attribute(), Some(Attribute::Output));
        assert_eq!(record.text(FieldId::Process), Some("CT_COILBDS"));
        assert_eq!(record.value, Some(1.25));
        assert!(!record.has(FieldId::Sector));
    }

    #[test]
    fn record_fields_iterate_in_field_order() {
        let record = Record::new()
            .with(FieldId::Unit, "PJ")
            .with(FieldId::Process, "FTE_DSL")
            .with_attribute(Attribute::Input);

        let order: Vec<FieldId> = record.fields.keys().copied().collect();
        assert_eq!(order, vec![FieldId::Attribute, FieldId::Process, FieldId::Unit]);
    }

    #[test]
    fn clear_removes_a_field() {
        let mut record = Record::new().with(FieldId::Fuel, "Diesel");
        record.clear(FieldId::Fuel);
        assert!(!record.has(FieldId::Fuel));
    }
}
