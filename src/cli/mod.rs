//! CLI module
//!
//! Command-line interface for running the writer.
//!
//! # Commands
//!
//! - `run` - Send the input table to the configured API
//! - `validate` - Check the configuration and authentication parameters
//! - `list` - List supported authentication methods, signatures and functions

mod commands;
mod runner;

pub use commands::{Cli, Commands};
pub use runner::{RunSummary, Runner};
