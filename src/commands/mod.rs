//! CLI command implementations for herakles-jvm-gc-exporter.
//!
//! This module provides implementations for all CLI subcommands:
//! - `check`: System validation
//! - `config`: Configuration file generation
//! - `test`: One-shot sampling of every discovered JVM

pub mod check;
pub mod config;

// Re-export command functions
pub use check::command_check;
pub use config::{command_config, show_config};
pub use test::command_test;
