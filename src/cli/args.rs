//! Command-line argument definitions using clap

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::DEFAULT_CONFIG_PATH;

/// churnflow - Segment customers, train a churn model, score and explain
#[derive(Parser, Debug)]
#[command(name = "churnflow")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// YAML configuration file. Missing keys fall back to defaults; a missing
    /// default file means all defaults.
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Increase log verbosity (-v debug, -vv trace). RUST_LOG takes precedence.
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Load the customer CSV into the store and define the segmentation views
    InitDb {
        /// CSV to load (defaults to data_path from the configuration)
        #[arg(short, long)]
        input: Option<PathBuf>,
    },

    /// Train the churn model on labeled customers and save the artifact
    Train,

    /// Score customers with the saved artifact
    Predict {
        /// Score only newly joined customers (the joined view)
        #[arg(long, default_value = "false")]
        joined: bool,

        /// Also replace the predictions table in the store
        #[arg(long, default_value = "false")]
        sql_save: bool,

        /// Input file (CSV or Parquet); overrides the configured source
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Output file (defaults to pred_out_path from the configuration)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Write every input column, not just identifier, probability and label
        #[arg(long, default_value = "false")]
        full: bool,

        /// Decision threshold override (0.0 to 1.0)
        #[arg(long, value_parser = validate_threshold)]
        threshold: Option<f64>,
    },

    /// Compute global feature importance for the saved artifact
    Explain {
        /// Reference dataset (defaults to the configured data source)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Number of features shown in the terminal table
        #[arg(long)]
        top_k: Option<usize>,
    },
}

/// Validator for the threshold override
fn validate_threshold(s: &str) -> Result<f64, String> {
    let value: f64 = s
        .parse()
        .map_err(|_| format!("'{}' is not a valid number", s))?;

    if !(0.0..=1.0).contains(&value) {
        Err(format!(
            "threshold must be between 0.0 and 1.0, got {}",
            value
        ))
    } else {
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_threshold() {
        assert_eq!(validate_threshold("0.3"), Ok(0.3));
        assert!(validate_threshold("1.5").is_err());
        assert!(validate_threshold("abc").is_err());
    }
}
