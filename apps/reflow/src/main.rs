//! # Reflow - Energy Model Post-Processor
//!
//! The main binary for the Reflow energy-flow pipeline.
//!
//! This application provides:
//! - CLI interface for the schema and allocation runs
//! - TOML run configuration
//! - CSV reading and writing around the pure core
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      apps/reflow (THE BINARY)                   │
//! │                                                                 │
//! │  ┌─────────────┐    ┌─────────────┐    ┌──────────────────┐     │
//! │  │   CLI       │    │  Run Config │    │  Pipeline Driver │     │
//! │  │  (clap)     │    │   (toml)    │    │  (csv on disk)   │     │
//! │  └──────┬──────┘    └──────┬──────┘    └────────┬─────────┘     │
//! │         │                  │                    │               │
//! │         └──────────────────┼────────────────────┘               │
//! │                            ▼                                    │
//! │                    ┌───────────────┐                            │
//! │                    │  reflow-core  │                            │
//! │                    │ (THE LOGIC)   │                            │
//! │                    └───────────────┘                            │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! # Generate the descriptive schema table
//! reflow -C run.toml schema
//!
//! # Run the allocation pipeline and write the report
//! reflow -C run.toml allocate
//!
//! # Inspect one process
//! reflow -C run.toml trace CT_COILBDS --scenario Kea --period 2035
//! reflow -C run.toml shares SUP_BIGNGA --scenario Kea --period 2035
//! ```

use clap::Parser;
use reflow::cli;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

fn main() {
    // Parse CLI arguments
    let cli = cli::Cli::parse();

    // Initialize tracing — REFLOW_LOG_FORMAT=json enables machine-parseable output.
    let log_format = std::env::var("REFLOW_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            "reflow=debug".into()
        } else {
            "reflow=info".into()
        }
    });

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }

    // Display startup banner
    if !cli.quiet && !cli.json_mode {
        print_banner();
    }

    // Execute command
    if let Err(e) = cli::execute(cli) {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Print the Reflow startup banner.
fn print_banner() {
    println!(
        r#"
  ██████╗ ███████╗███████╗██╗      ██████╗ ██╗    ██╗
  ██╔══██╗██╔════╝██╔════╝██║     ██╔═══██╗██║    ██║
  ██████╔╝█████╗  █████╗  ██║     ██║   ██║██║ █╗ ██║
  ██╔══██╗██╔══╝  ██╔══╝  ██║     ██║   ██║██║███╗██║
  ██║  ██║███████╗██║     ███████╗╚██████╔╝╚███╔███╔╝
  ╚═╝  ╚═╝╚══════╝╚═╝     ╚══════╝ ╚═════╝  ╚══╝╚══╝

  Energy Model Post-Processor v{}

  Deterministic • Traceable • Conserved
"#,
        env!("CARGO_PKG_VERSION")
    );
}
