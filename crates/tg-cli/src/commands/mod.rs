//! CLI subcommand implementations.

pub mod clear;
pub mod report;
pub mod run;
