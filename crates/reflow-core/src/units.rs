//! # Unit Definitions
//!
//! Extracts the commodity-to-unit table from a TIMES `base.dd` model file.
//! Only the `SET COM_UNIT` section is read; the surrounding GAMS syntax is
//! skipped line by line rather than parsed.

use crate::rules::{Rule, Ruleset};
use crate::types::FieldId;
use std::collections::BTreeMap;

/// Marker opening the unit section of a `.dd` file.
const COM_UNIT_MARKER: &str = "SET COM_UNIT";

/// Report-friendly spellings for the units the model files abbreviate.
/// Unknown units pass through untouched.
fn sanitize_unit(unit: &str) -> &str {
    match unit {
        "kt" => "kt CO2",
        "BVkm" => "Billion Vehicle Kilometres",
        other => other,
    }
}

/// Commodity-to-unit lookup parsed from a model definition file.
#[derive(Debug, Clone, Default)]
pub struct UnitMap {
    units: BTreeMap<String, String>,
}

impl UnitMap {
    /// Read the `SET COM_UNIT` section from `.dd` file content.
    ///
    /// Entries look like `'NI'.'ELC'.'PJ'` (region, commodity, unit). Lines
    /// that do not split into three parts are skipped, and a commodity listed
    /// twice keeps its last unit. A file without the section yields an empty
    /// map; the gap surfaces later as a missing-unit trace error.
    #[must_use]
    pub fn parse(content: &str) -> Self {
        let mut units = BTreeMap::new();
        let mut capturing = false;

        for line in content.lines() {
            let line = line.trim();
            if !capturing {
                if line.starts_with(COM_UNIT_MARKER) {
                    capturing = true;
                }
                continue;
            }
            if line.starts_with('/') {
                if units.is_empty() {
                    // Opening delimiter of the section body.
                    continue;
                }
                break;
            }
            let parts: Vec<&str> = line.trim_matches('\'').split("'.'").collect();
            if let [_region, commodity, unit] = parts.as_slice() {
                units.insert(
                    (*commodity).to_string(),
                    sanitize_unit(unit).to_string(),
                );
            }
        }

        Self { units }
    }

    #[must_use]
    pub fn get(&self, commodity: &str) -> Option<&str> {
        self.units.get(commodity).map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.units.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    #[must_use]
    pub fn mappings(&self) -> &BTreeMap<String, String> {
        &self.units
    }

    /// The lookup as a mutate ruleset stamping `Unit` by `Commodity`.
    #[must_use]
    pub fn ruleset(&self) -> Ruleset {
        let rules = self
            .units
            .iter()
            .map(|(commodity, unit)| {
                Rule::mutate()
                    .when(FieldId::Commodity, commodity.as_str())
                    .set(FieldId::Unit, unit.as_str())
            })
            .collect();
        Ruleset::new("commodity_units", rules)
    }
}

// =============================================================================
// TESTS
// =============================================================================
