//! Command-line argument definitions using clap

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

use crate::report::{TableFormat, PREVIEW_ROWS};

/// tabreg - Load, clean, reshape, aggregate and model tabular CSV data
#[derive(Parser, Debug)]
#[command(name = "tabreg")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase log verbosity (-v info, -vv debug). RUST_LOG overrides this.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a pipeline described by a JSON config file
    Run {
        /// Pipeline config (JSON). Relative dataset sources resolve against its directory.
        #[arg(short, long)]
        config: PathBuf,

        /// Write a JSON report of the run (schemas, cleaning, aggregations, model)
        #[arg(long)]
        report_json: Option<PathBuf>,

        /// Directory to write every final table into
        #[arg(long)]
        export_dir: Option<PathBuf>,

        /// File format for --export-dir
        #[arg(long, value_enum, default_value = "csv")]
        format: TableFormat,

        /// Remote fetch timeout in seconds; overrides the config's timeout_secs
        #[arg(long, value_parser = validate_timeout)]
        timeout: Option<u64>,

        /// Residual histogram bins (default: Sturges' rule)
        #[arg(long, value_parser = validate_bins)]
        residual_bins: Option<usize>,

        /// Rows shown in table previews
        #[arg(long, default_value_t = PREVIEW_ROWS)]
        preview_rows: usize,
    },

    /// Load a CSV and print its inferred schema
    Inspect {
        /// URL or file path of the CSV
        locator: String,

        /// Extra cell text to treat as missing (repeatable)
        #[arg(long = "null-value")]
        null_values: Vec<String>,

        /// Remote fetch timeout in seconds
        #[arg(long, value_parser = validate_timeout)]
        timeout: Option<u64>,
    },
}

impl Cli {
    /// Tracing filter implied by -v / -q.
    pub fn log_filter(&self) -> &'static str {
        if self.quiet {
            return "error";
        }
        match self.verbose {
            0 => "warn",
            1 => "info",
            _ => "debug",
        }
    }
}

/// Validator for timeout parameters
fn validate_timeout(s: &str) -> Result<u64, String> {
    let value: u64 = s
        .parse()
        .map_err(|_| format!("'{}' is not a valid number of seconds", s))?;

    if value == 0 {
        Err("timeout must be at least 1 second".to_string())
    } else {
        Ok(value)
    }
}

/// Validator for residual_bins parameter
fn validate_bins(s: &str) -> Result<usize, String> {
    let value: usize = s
        .parse()
        .map_err(|_| format!("'{}' is not a valid bin count", s))?;

    if !(1..=200).contains(&value) {
        Err(format!("residual_bins must be between 1 and 200, got {}", value))
    } else {
        Ok(value)
    }
}
