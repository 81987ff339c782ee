//! CLI subcommand implementations.

pub mod geo;
pub mod migrate;
