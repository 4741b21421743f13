//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands.

use crate::config::RunConfig;
use crate::pipeline;
use reflow_core::ReflowError;
use std::path::{Path, PathBuf};

// =============================================================================
// CONFIG LOADING
// =============================================================================

/// Resolve and check the configuration path, then load the run
/// configuration.
fn load_config(path: &Path) -> Result<RunConfig, ReflowError> {
    let validated = validate_config_path(path)?;
    RunConfig::load(&validated)
}

/// Canonicalize the path to resolve symlinks and "..", and ensure it names
/// a regular file.
fn validate_config_path(path: &Path) -> Result<PathBuf, ReflowError> {
    let canonical = path.canonicalize().map_err(|e| {
        ReflowError::IoError(format!(
            "invalid configuration path '{}': {e}",
            path.display()
        ))
    })?;

    if !canonical.is_file() {
        return Err(ReflowError::IoError(format!(
            "configuration path '{}' is not a regular file",
            path.display()
        )));
    }

    Ok(canonical)
}

// =============================================================================
// SCHEMA COMMAND
// =============================================================================

/// Generate and write the descriptive schema table.
pub fn cmd_schema(config_path: &Path, json_mode: bool) -> Result<(), ReflowError> {
    let config = load_config(config_path)?;
    let summary = pipeline::run_schema(&config)?;

    if json_mode {
        let output = serde_json::json!({
            "output": config.inputs.schema_output.to_string_lossy(),
            "rows": summary.rows,
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&output).unwrap_or_default()
        );
        return Ok(());
    }

    println!("Reflow Schema");
    println!("=============");
    println!("Rows:   {}", summary.rows);
    println!("Output: {}", config.inputs.schema_output.display());

    Ok(())
}

// =============================================================================
// ALLOCATE COMMAND
// =============================================================================

/// Run the allocation pipeline and write the combined report.
pub fn cmd_allocate(config_path: &Path, json_mode: bool) -> Result<(), ReflowError> {
    let config = load_config(config_path)?;
    let summary = pipeline::run_allocation(&config)?;

    if json_mode {
        let output = serde_json::json!({
            "output": config.inputs.output.to_string_lossy(),
            "rows": summary.rows,
            "dropped_rows": summary.dropped_rows,
            "added_rows": summary.added_rows,
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&output).unwrap_or_default()
        );
        return Ok(());
    }

    println!("Reflow Allocation");
    println!("=================");
    println!("Report rows:    {}", summary.rows);
    println!("Rows retired:   {}", summary.dropped_rows);
    println!("Rows generated: {}", summary.added_rows);
    println!("Output:         {}", config.inputs.output.display());

    Ok(())
}

// =============================================================================
// TRACE COMMAND
// =============================================================================

/// Trace one process's output to its terminal commodities and print the
/// surviving paths, largest fraction first.
pub fn cmd_trace(
    config_path: &Path,
    json_mode: bool,
    process: &str,
    scenario: &str,
    period: &str,
) -> Result<(), ReflowError> {
    let config = load_config(config_path)?;
    let paths = pipeline::run_trace(&config, process, scenario, period)?;

    if json_mode {
        let output: Vec<_> = paths
            .iter()
            .map(|(path, fraction)| {
                serde_json::json!({
                    "path": path.to_string(),
                    "source_process": path.source_process(),
                    "commodity": path.last_commodity(),
                    "fraction": fraction,
                })
            })
            .collect();
        println!(
            "{}",
            serde_json::to_string_pretty(&output).unwrap_or_default()
        );
        return Ok(());
    }

    let title = format!("Trace of {process} ({scenario}, {period})");
    println!("{title}");
    println!("{}", "=".repeat(title.len()));

    let mut ranked: Vec<_> = paths.iter().collect();
    ranked.sort_by(|a, b| b.1.total_cmp(a.1));
    for (path, fraction) in ranked {
        println!("{fraction:>9.4}  {path}");
    }
    println!();
    println!(
        "{} paths, total fraction {:.4}",
        paths.len(),
        paths.values().sum::<f64>()
    );

    Ok(())
}

// =============================================================================
// SHARES COMMAND
// =============================================================================

/// Show how one process's output divides over the end-use layer.
pub fn cmd_shares(
    config_path: &Path,
    json_mode: bool,
    process: &str,
    scenario: &str,
    period: &str,
    commodity: Option<&str>,
) -> Result<(), ReflowError> {
    let config = load_config(config_path)?;
    let mut shares = pipeline::run_shares(&config, process, scenario, period, commodity)?;
    shares.sort_by(|a, b| {
        b.value
            .unwrap_or(0.0)
            .total_cmp(&a.value.unwrap_or(0.0))
            .then_with(|| a.process.cmp(&b.process))
    });

    if json_mode {
        let output: Vec<_> = shares
            .iter()
            .map(|share| {
                serde_json::json!({
                    "process": share.process,
                    "share": share.value,
                    "commodity": share.commodity,
                    "fuel_source": share.fuel_source,
                })
            })
            .collect();
        println!(
            "{}",
            serde_json::to_string_pretty(&output).unwrap_or_default()
        );
        return Ok(());
    }

    let title = format!("End-use shares of {process} ({scenario}, {period})");
    println!("{title}");
    println!("{}", "=".repeat(title.len()));

    let mut total = 0.0;
    for share in &shares {
        let value = share.value.unwrap_or_default();
        total += value;
        match (&share.commodity, &share.fuel_source) {
            (Some(commodity), Some(source)) => {
                println!(
                    "{value:>9.4}  {}  ({commodity} via {source})",
                    share.process
                );
            }
            _ => println!("{value:>9.4}  {}", share.process),
        }
    }
    println!();
    println!("{} end uses, total share {total:.4}", shares.len());

    Ok(())
}
