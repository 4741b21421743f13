//! # Report Writer
//!
//! Serializes a table to the CSV shape downstream dashboards ingest: a fixed
//! column order, every cell quoted, periods as integers and values with a
//! fixed number of decimals so reruns diff cleanly.

use crate::table::Table;
use crate::types::{FieldId, ReflowError};
use std::io;

/// Decimal places written for every value cell.
pub const VALUE_DECIMALS: usize = 6;

/// Write `table` as CSV with the given column order.
///
/// Absent fields render as empty cells. The period column is written as an
/// integer; a non-integer period is a defect in the upstream data and aborts
/// the write. When `include_value` is set a final `Value` column carries the
/// record values.
pub fn write_csv<W: io::Write>(
    writer: W,
    table: &Table,
    columns: &[FieldId],
    include_value: bool,
) -> Result<(), ReflowError> {
    let mut out = csv::WriterBuilder::new()
        .quote_style(csv::QuoteStyle::Always)
        .from_writer(writer);

    let mut header: Vec<&str> = columns.iter().map(|c| c.as_str()).collect();
    if include_value {
        header.push("Value");
    }
    out.write_record(&header)
        .map_err(|e| ReflowError::CsvError(format!("writing header: {e}")))?;

    for record in table {
        let mut cells: Vec<String> = Vec::with_capacity(header.len());
        for column in columns {
            let cell = match record.text(*column) {
                Some(text) if *column == FieldId::Period => render_period(text)?,
                Some(text) => text.to_string(),
                None => String::new(),
            };
            cells.push(cell);
        }
        if include_value {
            let value = record.value.unwrap_or(0.0);
            cells.push(format!("{:.*}", VALUE_DECIMALS, value));
        }
        out.write_record(&cells)
            .map_err(|e| ReflowError::CsvError(format!("writing row: {e}")))?;
    }

    out.flush()
        .map_err(|e| ReflowError::IoError(format!("flushing report: {e}")))?;
    Ok(())
}

fn render_period(text: &str) -> Result<String, ReflowError> {
    let period: i64 = text
        .trim()
        .parse()
        .map_err(|_| ReflowError::ParseError(format!("non-integer period: {text:?}")))?;
    Ok(period.to_string())
}

// =============================================================================
// TESTS
// =============================================================================
