//! # Built-In Rulesets
//!
//! The labelling rules that are part of the reporting convention itself
//! rather than of any one model release: fuel grouping, capacity units,
//! parameter names, renewable fuel provenance, and the final relabels. Run
//! configuration can replace any of them; these constructors are the
//! defaults.

use crate::rules::{Rule, Ruleset};
use crate::types::{Attribute, FieldId};

const FUEL_GROUPS: [(&str, &str); 19] = [
    ("Electricity", "Electricity"),
    ("Green Hydrogen", "Electricity"),
    ("Coal", "Fossil Fuels"),
    ("Diesel", "Fossil Fuels"),
    ("Fuel Oil", "Fossil Fuels"),
    ("Jet Fuel", "Fossil Fuels"),
    ("LPG", "Fossil Fuels"),
    ("Natural Gas", "Fossil Fuels"),
    ("Petrol", "Fossil Fuels"),
    ("Waste Incineration", "Fossil Fuels"),
    ("Biodiesel", "Renewables (direct use)"),
    ("Biogas", "Renewables (direct use)"),
    ("Drop-In Diesel", "Renewables (direct use)"),
    ("Drop-In Jet", "Renewables (direct use)"),
    ("Geothermal", "Renewables (direct use)"),
    ("Hydro", "Renewables (direct use)"),
    ("Solar", "Renewables (direct use)"),
    ("Wind", "Renewables (direct use)"),
    ("Wood", "Renewables (direct use)"),
];

const SECTOR_CAPACITY_UNITS: [(&str, &str); 7] = [
    ("Transport", "000 Vehicles"),
    ("Industry", "GW"),
    ("Commercial", "GW"),
    ("Agriculture", "GW"),
    ("Residential", "GW"),
    ("Electricity", "GW"),
    ("Green Hydrogen", "GW"),
];

const FUEL_PROVENANCE: [(&str, &str, &str); 5] = [
    ("SUP_BIGNGA", "NGA", "Biogas"),
    ("SUP_H2NGA", "NGA", "Natural Gas From Green Hydrogen"),
    ("CT_COILBDS", "BDSL", "Biodiesel"),
    ("CT_CWODDID", "DID", "Drop-In Diesel"),
    ("CT_CWODDID", "DIJ", "Drop-In Jet"),
];

/// Fuel label to fuel group.
#[must_use]
pub fn fuel_groups() -> Ruleset {
    let rules = FUEL_GROUPS
        .iter()
        .map(|(fuel, group)| {
            Rule::mutate()
                .when(FieldId::Fuel, *fuel)
                .set(FieldId::FuelGroup, *group)
        })
        .collect();
    Ruleset::new("fuel_groups", rules)
}

/// Capacity rows are measured in GW, except the vehicle fleet.
#[must_use]
pub fn capacity_units() -> Ruleset {
    let rules = SECTOR_CAPACITY_UNITS
        .iter()
        .map(|(sector, unit)| {
            Rule::mutate()
                .when_attribute(Attribute::Capacity)
                .when(FieldId::Sector, *sector)
                .set(FieldId::Unit, *unit)
        })
        .collect();
    Ruleset::new("capacity_units", rules)
}

/// Human-readable parameter names by attribute, unit and set, with
/// process-specific overrides for feedstock and grid storage flows.
#[must_use]
pub fn parameter_names() -> Ruleset {
    let mut rules = vec![
        Rule::mutate()
            .when_attribute(Attribute::Capacity)
            .when(FieldId::Unit, "000 Vehicles")
            .set(FieldId::Parameters, "Number of Vehicles"),
        Rule::mutate()
            .when_attribute(Attribute::Input)
            .when(FieldId::Unit, "PJ")
            .when(FieldId::Set, "NRG")
            .set(FieldId::Parameters, "Fuel Consumption"),
        Rule::mutate()
            .when_attribute(Attribute::Output)
            .when(FieldId::Unit, "Billion Vehicle Kilometres")
            .set(FieldId::Parameters, "Distance Travelled"),
        Rule::mutate()
            .when_attribute(Attribute::Capacity)
            .when(FieldId::Unit, "GW")
            .when(FieldId::Set, ".DMD.")
            .set(FieldId::Parameters, "Technology Capacity"),
        Rule::mutate()
            .when_attribute(Attribute::Output)
            .when(FieldId::Unit, "kt CO2")
            .set(FieldId::Parameters, "Emissions"),
        Rule::mutate()
            .when_attribute(Attribute::Output)
            .when(FieldId::Unit, "PJ")
            .set(FieldId::Parameters, "End Use Demand"),
    ];

    for process in [
        "MTHOL-FDSTCK-NGA-FDSTCK",
        "UREA-FDSTCK-NGA-FDSTCK",
        "UREA-FDSTCK-NGA-FDSTCK15",
    ] {
        rules.push(
            Rule::mutate()
                .when_attribute(Attribute::Input)
                .when(FieldId::Unit, "PJ")
                .when(FieldId::Set, "NRG")
                .when(FieldId::Process, process)
                .set(FieldId::Parameters, "Feedstock"),
        );
    }
    for process in ["EBAT-Li-Ion", "EHYDPUMPSTG_L"] {
        rules.push(
            Rule::mutate()
                .when_attribute(Attribute::Output)
                .when(FieldId::Unit, "PJ")
                .when(FieldId::Set, "NRG")
                .when(FieldId::Process, process)
                .set(FieldId::Parameters, "Grid Injection (from Storage)"),
        );
        rules.push(
            Rule::mutate()
                .when_attribute(Attribute::Input)
                .when(FieldId::Unit, "PJ")
                .when(FieldId::Set, "NRG")
                .when(FieldId::Process, process)
                .set(FieldId::Parameters, "Gross Electricity Storage"),
        );
    }

    Ruleset::new("parameter_names", rules)
}

/// Which fuel a renewable substitution route delivers, by source process and
/// traced commodity.
#[must_use]
pub fn fuel_provenance() -> Ruleset {
    let rules = FUEL_PROVENANCE
        .iter()
        .map(|(source, commodity, fuel)| {
            Rule::mutate()
                .when(FieldId::FuelSourceProcess, *source)
                .when(FieldId::Commodity, *commodity)
                .set(FieldId::Fuel, *fuel)
        })
        .collect();
    Ruleset::new("fuel_provenance", rules)
}

/// Spell out the fleet unit after the final aggregation.
#[must_use]
pub fn vehicle_fleet_units() -> Ruleset {
    Ruleset::new(
        "vehicle_fleet_units",
        vec![Rule::mutate()
            .when(FieldId::Sector, "Transport")
            .when(FieldId::Subsector, "Road Transport")
            .when(FieldId::Unit, "000 Vehicles")
            .set(FieldId::Unit, "Number of Vehicles (Thousands)")],
    )
}

/// Report-level adjustments applied after allocation: the electricity sector
/// is reported as "Other", and the cost and capacity parameters the report
/// does not carry are removed.
#[must_use]
pub fn final_relabels() -> Ruleset {
    Ruleset::new(
        "final_relabels",
        vec![
            Rule::mutate()
                .when(FieldId::Sector, "Electricity")
                .set(FieldId::Sector, "Other"),
            Rule::delete().when(FieldId::Parameters, "Annualised Capital Costs"),
            Rule::delete().when(FieldId::Parameters, "Technology Capacity"),
        ],
    )
}

// =============================================================================
// TESTS
// =============================================================================
