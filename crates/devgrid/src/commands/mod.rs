//! Subcommand handlers: bridge CLI args -> core operations -> output formatting.

pub mod config_cmd;
pub mod devices;
