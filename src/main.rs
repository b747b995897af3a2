//! churnflow: Customer Churn CLI Tool
//!
//! `init-db` loads customers into the store, `train` fits and saves the
//! pipeline artifact, `predict` scores customers and `explain` ranks features.

use anyhow::{Context, Result};
use clap::Parser;

use churnflow::cli::{run_explain, run_init_db, run_predict, run_train, Cli, Commands, PredictOptions};
use churnflow::config::ChurnConfig;
use churnflow::utils::{init_logging, print_banner, print_completion, print_config};

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;

    let config = ChurnConfig::load(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;

    print_banner(env!("CARGO_PKG_VERSION"));
    print_config(&config);

    match cli.command {
        Commands::InitDb { input } => {
            run_init_db(&config, input.as_deref())?;
            print_completion("Store initialized!");
        }
        Commands::Train => {
            run_train(&config)?;
            print_completion("Training complete!");
        }
        Commands::Predict {
            joined,
            sql_save,
            input,
            output,
            full,
            threshold,
        } => {
            let options = PredictOptions {
                joined,
                sql_save,
                input,
                output,
                full,
                threshold,
            };
            run_predict(&config, &options)?;
            print_completion("Scoring complete!");
        }
        Commands::Explain { input, top_k } => {
            run_explain(&config, input.as_deref(), top_k)?;
            print_completion("Explainability report ready!");
        }
    }

    Ok(())
}
