//! CLI commands and argument parsing

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Generic HTTP writer CLI
#[derive(Parser, Debug)]
#[command(name = "generic-http-writer")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Send the input table to the configured API
    Run {
        /// Data directory holding config.json and in/tables
        #[arg(short, long, default_value = "/data")]
        data_dir: PathBuf,
    },

    /// Validate the configuration and build the authentication without sending anything
    Validate {
        /// Data directory holding config.json
        #[arg(short, long, default_value = "/data")]
        data_dir: PathBuf,
    },

    /// List supported authentication methods, signatures and user functions
    List,
}
