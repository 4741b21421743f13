//! # Reflow Application Library
//!
//! The application side of Reflow: run configuration, the pipeline driver
//! and the CLI, exposed as a library so integration tests can drive a full
//! run in-process without spawning the binary.
//!
//! All file and terminal I/O lives here; `reflow-core` stays pure.

pub mod cli;
pub mod config;
pub mod pipeline;
