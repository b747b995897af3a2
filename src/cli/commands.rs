//! Subcommand implementations

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use console::style;

use crate::config::ChurnConfig;
use crate::pipeline::target::count_mapped_records;
use crate::pipeline::{
    explain_frame, load_reference_frame, load_scoring_frame, load_training_frame,
    save_predictions_to_store, train, write_predictions, Scorer, ScoringSource, StatusMapping,
    TabularStore,
};
use crate::report::{
    display_importance_table, display_prediction_summary, export_global_importance,
    ImportanceExportParams, TrainingSummary,
};
use crate::utils::{
    abandon, create_spinner, finish_with_success, finish_with_warning, print_info,
    print_step_header, print_success, print_warning,
};

fn print_step_time(start: Instant) {
    println!(
        "      {}",
        style(format!("⏱  {:.2}s", start.elapsed().as_secs_f64())).dim()
    );
}

/// Run a stage behind a spinner, clearing it if the stage fails
fn with_spinner<T>(message: &str, stage: impl FnOnce() -> Result<T>) -> Result<T> {
    let spinner = create_spinner(message);
    match stage() {
        Ok(value) => {
            finish_with_success(&spinner, message.trim_end_matches("..."));
            Ok(value)
        }
        Err(e) => {
            abandon(&spinner);
            Err(e)
        }
    }
}

/// `init-db`: load the CSV into the store and define both views
pub fn run_init_db(config: &ChurnConfig, input: Option<&Path>) -> Result<()> {
    let csv = input.unwrap_or(&config.data_path);

    print_step_header(1, "Initialize Store");
    let start = Instant::now();
    let store = with_spinner("Loading customers into the store...", || {
        TabularStore::init_from_csv(csv, config)
            .with_context(|| format!("Failed to initialize store from {}", csv.display()))
    })?;
    print_step_time(start);

    print_info(&format!("Table {} written", style(store.table_name()).cyan()));
    for view in store.views() {
        print_info(&format!(
            "View {} ({}) defined",
            style(&view.name).cyan(),
            view.segment.as_str()
        ));
    }

    print_step_header(2, "Check Segments");
    let segments = store
        .fetch_segments(&config.sql)
        .context("Failed to materialize segmentation views")?;
    for (name, rows) in [
        (&config.sql.view_churn, segments.training.as_ref().map(|df| df.height())),
        (&config.sql.view_joined, segments.scoring.as_ref().map(|df| df.height())),
    ] {
        match rows {
            Some(n) => print_success(&format!("{}: {} row(s)", name, n)),
            None => print_warning(&format!("{}: no rows", name)),
        }
    }

    print_info(&format!(
        "Store ready at {}",
        style(store.dir().display()).cyan()
    ));
    Ok(())
}

/// `train`: fit on labeled customers and persist the artifact
pub fn run_train(config: &ChurnConfig) -> Result<()> {
    config.ensure_output_dirs().context("Failed to create output directories")?;

    print_step_header(1, "Load Labeled Customers");
    let start = Instant::now();
    let df = with_spinner("Fetching training rows...", || {
        load_training_frame(config).context("Failed to load training data")
    })?;
    let (churned, stayed, _) = count_mapped_records(&df, &StatusMapping::default())
        .context("Failed to count labeled customers")?;
    print_info(&format!(
        "{} labeled customer(s): {} churned, {} stayed",
        style(df.height()).yellow().bold(),
        churned,
        stayed
    ));
    print_step_time(start);

    print_step_header(2, "Fit Pipeline");
    let start = Instant::now();
    let spinner = create_spinner("Deriving features and fitting the model...");
    let outcome = match train(&df, config) {
        Ok(outcome) => outcome,
        Err(e) => {
            abandon(&spinner);
            return Err(e).context("Training failed");
        }
    };
    if outcome.warnings().is_empty() {
        finish_with_success(&spinner, "Model fitted");
    } else {
        finish_with_warning(&spinner, "Model fitted with warnings");
        for warning in outcome.warnings() {
            print_warning(&warning.to_string());
        }
    }
    print_step_time(start);

    print_success(&format!(
        "Artifact saved to {}",
        outcome.artifact_path.display()
    ));
    TrainingSummary::new(&outcome).display();
    Ok(())
}

/// Options of the `predict` subcommand
#[derive(Debug, Clone, Default)]
pub struct PredictOptions {
    pub joined: bool,
    pub sql_save: bool,
    pub input: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub full: bool,
    pub threshold: Option<f64>,
}

/// `predict`: score customers with the saved artifact
pub fn run_predict(config: &ChurnConfig, options: &PredictOptions) -> Result<()> {
    let threshold = options.threshold.unwrap_or(config.threshold);

    print_step_header(1, "Load Artifact");
    let scorer = Scorer::load(&config.model_path).context("Failed to load the trained model")?;
    print_success(&format!(
        "Loaded artifact trained {}",
        scorer.artifact().created_at
    ));

    print_step_header(2, "Score Customers");
    let start = Instant::now();
    let source = ScoringSource {
        joined: options.joined,
        input: options.input.clone(),
    };
    let df = load_scoring_frame(config, &source).context("Failed to load rows to score")?;
    let scored = with_spinner("Scoring...", || {
        scorer.score(&df, threshold).context("Scoring failed")
    })?;
    print_step_time(start);

    print_step_header(3, "Save Predictions");
    let output = options.output.as_deref().unwrap_or(&config.pred_out_path);
    write_predictions(&scored, output, options.full)
        .with_context(|| format!("Failed to write predictions to {}", output.display()))?;
    print_success(&format!("Predictions saved to {}", output.display()));

    if options.sql_save {
        save_predictions_to_store(&scored, config)
            .context("Failed to save predictions to the store")?;
        print_success(&format!(
            "Replaced store table {}",
            config.sql.predictions_table
        ));
    }

    display_prediction_summary(&scored);
    Ok(())
}

/// `explain`: rank features by global impact and export the report
pub fn run_explain(config: &ChurnConfig, input: Option<&Path>, top_k: Option<usize>) -> Result<()> {
    config.ensure_output_dirs().context("Failed to create output directories")?;

    print_step_header(1, "Load Artifact");
    let scorer = Scorer::load(&config.model_path).context("Failed to load the trained model")?;
    let artifact = scorer.artifact();

    print_step_header(2, "Compute Importance");
    let start = Instant::now();
    let df = load_reference_frame(config, input).context("Failed to load reference data")?;
    let report = with_spinner("Measuring feature impact...", || {
        explain_frame(artifact, &config.model_path, &df, &config.explain)
            .context("Explainability computation failed")
    })?;
    print_step_time(start);

    let reference_source = match input {
        Some(path) => path.display().to_string(),
        None if config.use_sql => config.sql.table_name.clone(),
        None => config.data_path.display().to_string(),
    };
    let params = ImportanceExportParams {
        artifact_path: &config.model_path,
        artifact_created_at: &artifact.created_at,
        reference_source: &reference_source,
        seed: config.explain.seed,
    };
    export_global_importance(&report, &config.global_importance_path, &params)?;
    print_success(&format!(
        "Global importance saved to {}",
        config.global_importance_path.display()
    ));

    display_importance_table(report.top(top_k.unwrap_or(config.explain.top_k)));
    Ok(())
}
