//! Integration tests for the scorer

use churnflow::config::ChurnConfig;
use churnflow::pipeline::schema::{PREDICTION_LABEL, PREDICTION_PROBABILITY};
use churnflow::pipeline::*;
use polars::prelude::*;
use tempfile::TempDir;

#[path = "common/mod.rs"]
mod common;

use common::*;

/// Train on a synthetic dataset and return the directory, config and data
fn trained() -> (TempDir, ChurnConfig, DataFrame) {
    let mut df = create_customer_dataframe(500, 42);
    let (temp_dir, csv_path) = create_temp_csv(&mut df);
    let config = test_config(temp_dir.path(), &csv_path);
    train(&load_training_frame(&config).unwrap(), &config).unwrap();
    (temp_dir, config, df)
}

#[test]
fn test_probabilities_in_unit_interval_and_labels_follow_threshold() {
    let (_temp_dir, config, df) = trained();
    let scorer = Scorer::load(&config.model_path).unwrap();

    for threshold in [0.3, 0.5, 0.7] {
        let scored = scorer.score(&df, threshold).unwrap();
        assert_eq!(scored.records.len(), df.height());

        for record in &scored.records {
            assert!((0.0..=1.0).contains(&record.probability));
            assert_eq!(record.label, record.probability >= threshold);
        }
    }

    let low = scorer.score(&df, 0.3).unwrap().predicted_churners();
    let high = scorer.score(&df, 0.7).unwrap().predicted_churners();
    assert!(low >= high);
}

#[test]
fn test_output_frame_appends_prediction_columns() {
    let (_temp_dir, config, df) = trained();
    let scorer = Scorer::load(&config.model_path).unwrap();

    let scored = scorer.score(&df, 0.5).unwrap();
    assert_eq!(scored.frame.width(), df.width() + 2);
    assert!(scored.frame.column(PREDICTION_PROBABILITY).is_ok());
    assert!(scored.frame.column(PREDICTION_LABEL).is_ok());
    assert_eq!(scored.records[0].customer_id, "00000-CUST");

    // Scoring the scored frame would overwrite its outputs
    let err = scorer.score(&scored.frame, 0.5).unwrap_err();
    assert!(matches!(err, PipelineError::OutputColumnConflict(_)));
}

#[test]
fn test_missing_artifact() {
    let temp_dir = TempDir::new().unwrap();
    let err = Scorer::load(&temp_dir.path().join("artifacts/churn_model.json")).unwrap_err();
    assert!(matches!(err, PipelineError::ArtifactNotFound { .. }));
}

#[test]
fn test_input_without_fitted_column_is_version_mismatch() {
    let (_temp_dir, config, df) = trained();
    let scorer = Scorer::load(&config.model_path).unwrap();

    let reduced = df.drop("Payment_Method").unwrap();
    let err = scorer.score(&reduced, 0.5).unwrap_err();
    match err {
        PipelineError::ArtifactVersionMismatch { reason, .. } => {
            assert!(reason.contains("Payment_Method"), "{}", reason)
        }
        other => panic!("Expected ArtifactVersionMismatch, got {:?}", other),
    }
}

#[test]
fn test_unseen_categories_still_score() {
    let (_temp_dir, config, df) = trained();
    let scorer = Scorer::load(&config.model_path).unwrap();

    let mut new_rows = df.head(Some(4));
    new_rows
        .with_column(Column::new("Payment_Method".into(), ["Crypto", "Crypto", "Credit Card", "Crypto"]))
        .unwrap();

    let scored = scorer.score(&new_rows, 0.5).unwrap();
    assert_eq!(scored.records.len(), 4);
    assert_eq!(scored.stats.total_unseen(), 3);
}

#[test]
fn test_scoring_never_mutates_artifact() {
    let (_temp_dir, config, df) = trained();
    let before = std::fs::read(&config.model_path).unwrap();

    let scorer = Scorer::load(&config.model_path).unwrap();
    scorer.score(&df, 0.4).unwrap();

    assert_eq!(std::fs::read(&config.model_path).unwrap(), before);
}

#[test]
fn test_joined_rows_from_flat_file() {
    let (_temp_dir, config, _df) = trained();
    let source = ScoringSource {
        joined: true,
        input: None,
    };

    let rows = load_scoring_frame(&config, &source).unwrap();
    assert_eq!(rows.height(), 50);
}

#[test]
fn test_write_records_and_full_frame() {
    let (temp_dir, config, df) = trained();
    let scorer = Scorer::load(&config.model_path).unwrap();
    let scored = scorer.score(&df, 0.5).unwrap();

    let records_path = temp_dir.path().join("records.csv");
    write_predictions(&scored, &records_path, false).unwrap();
    let records = load_dataset(&records_path, 1000).unwrap();
    assert_eq!(records.shape(), (500, 3));

    let full_path = temp_dir.path().join("full.parquet");
    write_predictions(&scored, &full_path, true).unwrap();
    let full = load_dataset(&full_path, 1000).unwrap();
    assert_eq!(full.width(), df.width() + 2);
}

#[test]
fn test_predictions_saved_to_store() {
    let (_temp_dir, mut config, _df) = trained();
    config.use_sql = true;
    TabularStore::init_from_csv(&config.data_path, &config).unwrap();

    let scorer = Scorer::load(&config.model_path).unwrap();
    let rows = load_scoring_frame(
        &config,
        &ScoringSource {
            joined: true,
            input: None,
        },
    )
    .unwrap();
    let scored = scorer.score(&rows, 0.5).unwrap();
    save_predictions_to_store(&scored, &config).unwrap();

    let store = TabularStore::open(&config).unwrap();
    let saved = store.read_table(&config.sql.predictions_table).unwrap();
    assert_eq!(saved.height(), 50);
    assert!(saved.column(PREDICTION_PROBABILITY).is_ok());
}
