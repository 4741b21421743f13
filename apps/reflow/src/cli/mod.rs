//! # Reflow CLI Module
//!
//! This module implements the CLI interface for Reflow.
//!
//! ## Available Commands
//!
//! - `schema` - Generate the descriptive schema table
//! - `allocate` - Run the allocation pipeline and write the report
//! - `trace` - Trace one process's output to its terminal commodities
//! - `shares` - Show how one process's output divides over the end-use layer

mod commands;

use clap::{Parser, Subcommand};
use reflow_core::ReflowError;
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// Reflow - Energy Model Post-Processor
///
/// Turns raw TIMES solver exports into a labelled, conservation-checked
/// report table, with negative emissions and fuel substitutions allocated
/// to the end uses that cause them.
#[derive(Parser, Debug)]
#[command(name = "reflow")]
#[command(version, about, long_about = None)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress banner output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to the run configuration file
    #[arg(short = 'C', long, global = true, default_value = "reflow.toml")]
    pub config: PathBuf,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Generate the descriptive schema table
    Schema,

    /// Run the allocation pipeline and write the report
    Allocate,

    /// Trace one process's output to its terminal commodities
    Trace {
        /// Process to trace from
        process: String,

        /// Scenario to trace in
        #[arg(short, long)]
        scenario: String,

        /// Report period to trace in
        #[arg(short, long)]
        period: String,
    },

    /// Show how one process's output divides over the end-use layer
    Shares {
        /// Process to allocate from
        process: String,

        /// Scenario to allocate in
        #[arg(short, long)]
        scenario: String,

        /// Report period to allocate in
        #[arg(short, long)]
        period: String,

        /// Only follow this output commodity
        #[arg(short, long)]
        commodity: Option<String>,
    },
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub fn execute(cli: Cli) -> Result<(), ReflowError> {
    let json_mode = cli.json_mode;

    match cli.command {
        Commands::Schema => cmd_schema(&cli.config, json_mode),
        Commands::Allocate => cmd_allocate(&cli.config, json_mode),
        Commands::Trace {
            process,
            scenario,
            period,
        } => cmd_trace(&cli.config, json_mode, &process, &scenario, &period),
        Commands::Shares {
            process,
            scenario,
            period,
            commodity,
        } => cmd_shares(
            &cli.config,
            json_mode,
            &process,
            &scenario,
            &period,
            commodity.as_deref(),
        ),
    }
}
