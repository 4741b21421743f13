//! # VD Export Reader
//!
//! Parses the VEDA Data (`.vd`) files a TIMES solver run writes. A `.vd`
//! file is star-prefixed metadata, then a `* Dimensions-` header naming the
//! columns, then quoted CSV rows. The reader keeps only the three modelled
//! attributes, stamps each row with its scenario, and applies the ignore
//! lists; collapsing the dimensions the pipeline does not model (region,
//! vintage, timeslice) is the caller's aggregation step.

use crate::table::Table;
use crate::types::{Attribute, FieldId, Record, ReflowError};

/// Header marker naming the export's column order.
const DIMENSIONS_MARKER: &str = "Dimensions-";

/// Column carrying the numeric solution value.
const VALUE_COLUMN: &str = "PV";

/// Grouping that collapses raw rows to one value per modelled dimension.
pub const RAW_AGGREGATION_KEYS: [FieldId; 5] = [
    FieldId::Scenario,
    FieldId::Attribute,
    FieldId::Commodity,
    FieldId::Process,
    FieldId::Period,
];

/// Row filters applied while reading.
#[derive(Debug, Clone, Default)]
pub struct VdOptions {
    /// Period labels to drop (for example calibration years).
    pub ignore_periods: Vec<String>,
    /// Commodity names to drop entirely.
    pub ignore_commodities: Vec<String>,
}

/// Parse one `.vd` export, stamping every row with `scenario`.
///
/// Rows whose attribute is not `VAR_Cap`, `VAR_FIn` or `VAR_FOut` (costs,
/// constraint duals) are dropped. The `-` placeholder in dimension columns is
/// kept verbatim; it participates in grouping exactly like a real label.
pub fn parse_vd(
    content: &str,
    scenario: &str,
    options: &VdOptions,
) -> Result<Table, ReflowError> {
    let lines: Vec<&str> = content.lines().collect();

    let columns = header_columns(&lines)?;
    let Some(first_data) = lines.iter().position(|line| line.starts_with('"')) else {
        return Ok(Table::new());
    };

    let body = lines[first_data..].join("\n");
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_reader(body.as_bytes());

    let mut table = Table::new();
    for row in reader.records() {
        let row = row.map_err(|e| ReflowError::CsvError(format!("VD data row: {e}")))?;

        let mut record = Record::new().with(FieldId::Scenario, scenario);
        let mut attribute = None;
        for (column, cell) in columns.iter().zip(row.iter()) {
            match *column {
                "Attribute" => attribute = Attribute::from_label(cell),
                "Commodity" => record.set_text(FieldId::Commodity, cell),
                "Process" => record.set_text(FieldId::Process, cell),
                "Period" => record.set_text(FieldId::Period, cell),
                VALUE_COLUMN => {
                    let value: f64 = cell.trim().parse().map_err(|_| {
                        ReflowError::ParseError(format!("bad PV value in VD row: {cell:?}"))
                    })?;
                    record.value = Some(value);
                }
                // Region, Vintage, TimeSlice, UserConstraint: not modelled.
                _ => {}
            }
        }

        let Some(attribute) = attribute else {
            continue;
        };
        record.set(FieldId::Attribute, attribute.into());

        if record
            .text(FieldId::Period)
            .is_some_and(|p| options.ignore_periods.iter().any(|ignored| ignored == p))
        {
            continue;
        }
        if record
            .text(FieldId::Commodity)
            .is_some_and(|c| options.ignore_commodities.iter().any(|ignored| ignored == c))
        {
            continue;
        }

        table.push(record);
    }

    Ok(table)
}

fn header_columns<'a>(lines: &[&'a str]) -> Result<Vec<&'a str>, ReflowError> {
    lines
        .iter()
        .find(|line| line.starts_with('*') && line.contains(DIMENSIONS_MARKER))
        .and_then(|line| line.split_once("- "))
        .map(|(_, names)| names.trim().split(';').map(str::trim).collect())
        .ok_or_else(|| {
            ReflowError::ParseError("VD input has no `* Dimensions-` header line".to_string())
        })
}

// =============================================================================
// TESTS
// =============================================================================
