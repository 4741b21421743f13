//! # reflow-core
//!
//! The deterministic post-processing engine for Reflow - THE LOGIC.
//!
//! This crate turns raw solver exports from an energy-system model into
//! labelled, conserved reporting tables. It parses VD listing files,
//! applies declarative labelling rulesets, traces commodity flows through
//! the process network, allocates upstream quantities to end uses, and
//! emits deterministic CSV output.
//!
//! ## Architectural Constraints
//!
//! The core:
//! - Is pure computation: no I/O beyond the readers/writers handed to it
//! - Is deterministic: identical inputs produce byte-identical outputs
//! - Fails fast: conservation and labelling violations surface as errors,
//!   never as silently wrong numbers
//! - Has NO async, NO network dependencies (pure Rust)

// =============================================================================
// MODULES
// =============================================================================

pub mod allocate;
pub mod catalog;
pub mod finalize;
pub mod flows;
pub mod report;
pub mod rules;
pub mod rulesets;
pub mod table;
pub mod trace;
pub mod types;
pub mod units;
pub mod vd;

// =============================================================================
// RE-EXPORTS: Core Types
// =============================================================================

pub use table::Table;
pub use types::{Attribute, FieldId, FieldValue, NULL_SENTINEL, Record, ReflowError};

// =============================================================================
// RE-EXPORTS: Rules & Catalogs
// =============================================================================

pub use catalog::{
    CatalogReport, CatalogSchema, CommodityClass, CommodityGroups, DEFAULT_SEPARATOR,
    ruleset_from_catalog,
};
pub use rules::{Effect, Rule, Ruleset};
pub use units::UnitMap;

// =============================================================================
// RE-EXPORTS: Tracing & Allocation
// =============================================================================

pub use allocate::{
    AllocationOutcome, AllocationPolicy, Allocator, CONSERVATION_TOLERANCE, EndUseShare, FlowRef,
    ShareOverride, SubstitutionSpec, verify_conservation,
};
pub use flows::{FlowPolicy, Flows, normalize_to_fractions};
pub use trace::{MAX_TRACE_DEPTH, PathStep, TRACE_FRACTION_TOLERANCE, TracePath, Tracer};

// =============================================================================
// RE-EXPORTS: Loading & Output
// =============================================================================

pub use report::{VALUE_DECIMALS, write_csv};
pub use vd::{RAW_AGGREGATION_KEYS, VdOptions, parse_vd};
