//! # Output Shaping
//!
//! The last table passes before writing: zeroing emission rows for fuels
//! that do not emit at point of use, dropping rows the catalogs never
//! described, splitting shared inputs over multi-output processes, and
//! padding every reported series to the full period axis.

use crate::table::Table;
use crate::types::{Attribute, FieldId, FieldValue, ReflowError};
use std::collections::{BTreeMap, BTreeSet};

/// Zero the emission rows of fuels with no point-of-use emissions.
///
/// Electricity or wood burned at an end use still carries an emission row
/// from the model's accounting; reporting wants those as zero, not absent,
/// so the series keeps its shape.
#[must_use]
pub fn suppress_non_emitting_fuels(
    mut table: Table,
    fuels: &[String],
    emission_parameter: &str,
) -> Table {
    for record in &mut table.records {
        if record.text(FieldId::Parameters) == Some(emission_parameter)
            && record
                .text(FieldId::Fuel)
                .is_some_and(|f| fuels.iter().any(|fuel| fuel == f))
        {
            record.value = Some(0.0);
        }
    }
    table
}

/// Drop records missing any of the required descriptive fields.
///
/// Rows the catalogs never described cannot be reported against a sector or
/// end use; they exit here rather than surfacing as blank output cells.
#[must_use]
pub fn drop_incomplete(mut table: Table, required: &[FieldId]) -> Table {
    table.retain(|record| required.iter().all(|field| record.has(*field)));
    table
}

/// Split the single input row of each multi-output process over its outputs.
///
/// A process reporting several (non-emission) output rows after aggregation
/// has its one input row replaced by per-output copies, prorated by output
/// value and stamped with each output's end use. Anything other than exactly
/// one input row for such a group is a model defect and aborts the run.
pub fn split_shared_inputs(table: Table, emission_marker: &str) -> Result<Table, ReflowError> {
    let mut groups: BTreeMap<(String, String, String), Vec<usize>> = BTreeMap::new();
    for (index, record) in table.records.iter().enumerate() {
        let (Some(scenario), Some(process), Some(period)) = (
            record.text(FieldId::Scenario),
            record.text(FieldId::Process),
            record.text(FieldId::Period),
        ) else {
            continue;
        };
        groups
            .entry((scenario.to_string(), process.to_string(), period.to_string()))
            .or_default()
            .push(index);
    }

    let mut replaced: BTreeSet<usize> = BTreeSet::new();
    let mut split_rows = Vec::new();

    for ((scenario, process, period), indices) in &groups {
        let outputs: Vec<usize> = indices
            .iter()
            .copied()
            .filter(|&i| table.records[i].attribute() == Some(Attribute::Output))
            .collect();
        let energy_outputs = outputs
            .iter()
            .filter(|&&i| {
                table.records[i]
                    .text(FieldId::Commodity)
                    .is_none_or(|c| !c.contains(emission_marker))
            })
            .count();
        if energy_outputs <= 1 {
            continue;
        }

        let inputs: Vec<usize> = indices
            .iter()
            .copied()
            .filter(|&i| table.records[i].attribute() == Some(Attribute::Input))
            .collect();
        let [input_index] = inputs.as_slice() else {
            return Err(ReflowError::AmbiguousInputSplit {
                scenario: scenario.clone(),
                process: process.clone(),
                period: period.clone(),
                inputs: inputs.len(),
            });
        };

        let output_total: f64 = outputs
            .iter()
            .filter_map(|&i| table.records[i].value)
            .sum();
        if output_total == 0.0 {
            return Err(ReflowError::ZeroFlowTotal {
                context: format!("output split for {process} ({scenario}, {period})"),
            });
        }

        let input_value = table.records[*input_index].value.unwrap_or(0.0);
        for &output_index in &outputs {
            let output = &table.records[output_index];
            let mut split = table.records[*input_index].clone();
            split.value = Some(input_value * output.value.unwrap_or(0.0) / output_total);
            match output.get(FieldId::Enduse) {
                Some(enduse) => split.set(FieldId::Enduse, enduse.clone()),
                None => split.clear(FieldId::Enduse),
            }
            split_rows.push(split);
        }
        replaced.insert(*input_index);
    }

    let mut records: Vec<_> = table
        .records
        .into_iter()
        .enumerate()
        .filter(|(index, _)| !replaced.contains(index))
        .map(|(_, record)| record)
        .collect();
    records.append(&mut split_rows);
    Ok(Table { records })
}

/// Give every reported series a row for every period in the table.
///
/// The global period axis is the set of periods observed anywhere in the
/// table. For each category group (all reporting columns except the period)
/// the missing periods are filled with zero-valued copies of the group's
/// first record.
#[must_use]
pub fn fill_missing_periods(mut table: Table, categories: &[FieldId]) -> Table {
    let all_periods = table.distinct_values(FieldId::Period);

    let mut groups: BTreeMap<Vec<Option<FieldValue>>, Vec<usize>> = BTreeMap::new();
    for (index, record) in table.records.iter().enumerate() {
        let key = categories.iter().map(|f| record.get(*f).cloned()).collect();
        groups.entry(key).or_default().push(index);
    }

    let mut padding = Vec::new();
    for indices in groups.values() {
        let present: BTreeSet<&str> = indices
            .iter()
            .filter_map(|&i| table.records[i].text(FieldId::Period))
            .collect();
        for period in &all_periods {
            if !present.contains(period.as_str()) {
                let mut filler = table.records[indices[0]].clone();
                filler.set_text(FieldId::Period, period.clone());
                filler.value = Some(0.0);
                padding.push(filler);
            }
        }
    }

    table.records.extend(padding);
    table
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Record;

    fn reported(
        process: &str,
        fuel: &str,
        parameters: &str,
        period: &str,
        value: f64,
    ) -> Record {
        Record::new()
            .with(FieldId::Scenario, "Kea")
            .with(FieldId::Process, process)
            .with(FieldId::Fuel, fuel)
            .with(FieldId::Parameters, parameters)
            .with(FieldId::Period, period)
            .with_value(value)
    }

    #[test]
    fn suppression_zeroes_only_matching_emission_rows() {
        let table = Table::from_records(vec![
            reported("E_HEAT", "Electricity", "Emissions", "2030", 5.0),
            reported("E_HEAT", "Electricity", "Fuel Consumption", "2030", 5.0),
            reported("I_BOILER", "Coal", "Emissions", "2030", 7.0),
        ]);
        let fuels = vec!["Electricity".to_string(), "Wood".to_string()];

        let shaped = suppress_non_emitting_fuels(table, &fuels, "Emissions");
        assert_eq!(shaped.records[0].value, Some(0.0));
        assert_eq!(shaped.records[1].value, Some(5.0));
        assert_eq!(shaped.records[2].value, Some(7.0));
    }

    #[test]
    fn incomplete_rows_are_dropped() {
        let described = reported("E_HEAT", "Electricity", "Fuel Consumption", "2030", 1.0);
        let mut undescribed = described.clone();
        undescribed.clear(FieldId::Fuel);

        let table = Table::from_records(vec![described, undescribed]);
        let shaped = drop_incomplete(table, &[FieldId::Process, FieldId::Fuel]);
        assert_eq!(shaped.len(), 1);
    }

    fn chp_row(attribute: Attribute, commodity: &str, enduse: Option<&str>, value: f64) -> Record {
        let mut record = Record::new()
            .with_attribute(attribute)
            .with(FieldId::Scenario, "Kea")
            .with(FieldId::Process, "I_CHP")
            .with(FieldId::Commodity, commodity)
            .with(FieldId::Period, "2030")
            .with_value(value);
        if let Some(enduse) = enduse {
            record.set_text(FieldId::Enduse, enduse);
        }
        record
    }

    #[test]
    fn shared_inputs_split_by_output_value() {
        let table = Table::from_records(vec![
            chp_row(Attribute::Input, "NGA", Some("Unallocated"), 5.0),
            chp_row(Attribute::Output, "ELC", Some("Electricity Production"), 6.0),
            chp_row(Attribute::Output, "HTH", Some("Process Heat"), 3.0),
            chp_row(Attribute::Output, "INDCO2", Some("Process Heat"), 1.0),
        ]);

        let split = split_shared_inputs(table, "CO2").expect("one input row");
        // One input row replaced by three prorated copies.
        assert_eq!(split.len(), 6);

        let inputs: Vec<&Record> = split
            .iter()
            .filter(|r| r.attribute() == Some(Attribute::Input))
            .collect();
        assert_eq!(inputs.len(), 3);
        let total: f64 = inputs.iter().filter_map(|r| r.value).sum();
        assert!((total - 5.0).abs() < 1e-9);

        let electricity_share = inputs
            .iter()
            .find(|r| r.text(FieldId::Enduse) == Some("Electricity Production"))
            .and_then(|r| r.value)
            .expect("electricity split");
        assert!((electricity_share - 3.0).abs() < 1e-9);
        // The split keeps the input's own commodity.
        assert!(inputs.iter().all(|r| r.text(FieldId::Commodity) == Some("NGA")));
    }

    #[test]
    fn single_output_groups_are_untouched() {
        let table = Table::from_records(vec![
            chp_row(Attribute::Input, "NGA", Some("Process Heat"), 5.0),
            chp_row(Attribute::Output, "HTH", Some("Process Heat"), 3.0),
            chp_row(Attribute::Output, "INDCO2", Some("Process Heat"), 1.0),
        ]);
        let split = split_shared_inputs(table.clone(), "CO2").expect("no split needed");
        assert_eq!(split, table);
    }

    #[test]
    fn multiple_input_rows_are_fatal() {
        let table = Table::from_records(vec![
            chp_row(Attribute::Input, "NGA", None, 3.0),
            chp_row(Attribute::Input, "COA", None, 2.0),
            chp_row(Attribute::Output, "ELC", None, 6.0),
            chp_row(Attribute::Output, "HTH", None, 3.0),
        ]);
        assert!(matches!(
            split_shared_inputs(table, "CO2"),
            Err(ReflowError::AmbiguousInputSplit { inputs: 2, .. })
        ));
    }

    #[test]
    fn missing_input_rows_are_fatal_too() {
        let table = Table::from_records(vec![
            chp_row(Attribute::Output, "ELC", None, 6.0),
            chp_row(Attribute::Output, "HTH", None, 3.0),
        ]);
        assert!(matches!(
            split_shared_inputs(table, "CO2"),
            Err(ReflowError::AmbiguousInputSplit { inputs: 0, .. })
        ));
    }

    #[test]
    fn missing_periods_fill_with_zero_rows() {
        let table = Table::from_records(vec![
            reported("E_HEAT", "Electricity", "Fuel Consumption", "2030", 2.0),
            reported("E_HEAT", "Electricity", "Fuel Consumption", "2035", 3.0),
            reported("I_BOILER", "Coal", "Emissions", "2030", 7.0),
        ]);

        let padded = fill_missing_periods(
            table,
            &[FieldId::Scenario, FieldId::Process, FieldId::Fuel, FieldId::Parameters],
        );
        assert_eq!(padded.len(), 4);

        let filler = padded
            .iter()
            .find(|r| {
                r.text(FieldId::Process) == Some("I_BOILER")
                    && r.text(FieldId::Period) == Some("2035")
            })
            .expect("zero filler for the boiler series");
        assert_eq!(filler.value, Some(0.0));
        assert_eq!(filler.text(FieldId::Fuel), Some("Coal"));
    }

    #[test]
    fn complete_series_gain_no_padding() {
        let table = Table::from_records(vec![
            reported("E_HEAT", "Electricity", "Fuel Consumption", "2030", 2.0),
            reported("E_HEAT", "Electricity", "Fuel Consumption", "2035", 3.0),
        ]);
        let padded = fill_missing_periods(
            table.clone(),
            &[FieldId::Scenario, FieldId::Process, FieldId::Fuel, FieldId::Parameters],
        );
        assert_eq!(padded, table);
    }
}
