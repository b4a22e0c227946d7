use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::types::Category;

/// drivermgr - Hardware driver package manager
#[derive(Parser)]
#[command(name = "drivermgr")]
#[command(about = "Find, recommend, install and remove hardware driver packages")]
#[command(version)]
pub struct Cli {
    /// Configuration file (defaults to /etc/drivermgr/config.json if present)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List driver packages by category
    List {
        /// Only show this category (graphics, network, audio, printing, storage, other)
        #[arg(short = 'C', long)]
        category: Option<Category>,
        /// Only show packages recommended for the detected hardware
        #[arg(short, long)]
        recommended: bool,
        /// Print JSON instead of a text listing
        #[arg(long)]
        json: bool,
    },
    /// Show detected hardware and the packages recommended for it
    Recommend,
    /// Install a driver package (requires root)
    Install {
        /// Package name
        package: String,
    },
    /// Remove a driver package and purge unused dependencies (requires root)
    Remove {
        /// Package name
        package: String,
    },
    /// Show the state of a single package
    Status {
        /// Package name
        package: String,
    },
    /// Print the effective configuration as JSON
    Config,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
