//! Model trainer - split, fit, evaluate and persist
//!
//! The transformer is fit on the training split only; the hold-out split is
//! transformed with the frozen statistics exactly as new customers will be.

use std::path::PathBuf;

use polars::prelude::*;
use tracing::{info, warn};

use crate::config::ChurnConfig;

use super::artifact::{PipelineArtifact, TrainingMetadata};
use super::error::{PipelineError, PipelineResult};
use super::features::derive_features;
use super::loader::load_dataset;
use super::metrics::{evaluate, stratified_split};
use super::missing::{analyze_missing_values, features_with_missing};
use super::model::{Fittable, FitWarning, LogisticRegression, Scorable};
use super::preprocess::{ApplyStats, Preprocessor};
use super::schema::{check_status_not_null, validate_schema};
use super::store::{Segment, TabularStore};
use super::target::{binary_labels, labeled_rows, StatusMapping};

/// Everything the CLI reports after a training run
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub artifact: PipelineArtifact,
    pub artifact_path: PathBuf,
    /// Missing ratio per feature column before imputation, descending
    pub missing: Vec<(String, f64)>,
    /// Transformer statistics on the hold-out split
    pub holdout_stats: ApplyStats,
}

impl TrainingOutcome {
    pub fn warnings(&self) -> &[FitWarning] {
        &self.artifact.training.fit.warnings
    }
}

/// Labeled Customer Records from the store view or the flat file
pub fn load_training_frame(config: &ChurnConfig) -> PipelineResult<DataFrame> {
    if config.use_sql {
        let store = TabularStore::open(config)?;
        return store.fetch_segment(Segment::ChurnTraining, &config.sql);
    }

    let df = load_dataset(&config.data_path, config.infer_schema_length)?;
    validate_schema(&df, &config.data_path.display().to_string())?;
    check_status_not_null(&df)?;

    let labeled = labeled_rows(&df, &StatusMapping::default())?;
    if labeled.height() == 0 {
        return Err(PipelineError::EmptyResultSet {
            view: config.sql.view_churn.clone(),
        });
    }
    Ok(labeled)
}

/// Keep the rows at the given ascending positions
pub fn take_rows(df: &DataFrame, rows: &[usize]) -> PipelineResult<DataFrame> {
    let mut keep = vec![false; df.height()];
    for &row in rows {
        keep[row] = true;
    }
    let mask = BooleanChunked::new("mask".into(), &keep);
    Ok(df.filter(&mask)?)
}

fn subset(values: &[f64], rows: &[usize]) -> Vec<f64> {
    rows.iter().map(|&i| values[i]).collect()
}

fn has_both_classes(y: &[f64]) -> bool {
    y.iter().any(|&v| v > 0.5) && y.iter().any(|&v| v <= 0.5)
}

/// Fit the pipeline on labeled rows and return the (unsaved) artifact
pub fn fit_pipeline(df: &DataFrame, config: &ChurnConfig) -> PipelineResult<(PipelineArtifact, TrainingOutcomeParts)> {
    if df.height() == 0 {
        return Err(PipelineError::EmptyResultSet {
            view: config.sql.view_churn.clone(),
        });
    }

    let derived = derive_features(df)?;
    let y = binary_labels(&derived, &StatusMapping::default())?;
    let churned = y.iter().filter(|&&v| v > 0.5).count();
    let stayed = y.len() - churned;
    info!(rows = y.len(), churned, stayed, "Prepared labeled rows");

    let (train_idx, test_idx) = stratified_split(&y, config.split.test_size, config.split.seed);
    let train_df = take_rows(&derived, &train_idx)?;
    let y_train = subset(&y, &train_idx);

    let mut preprocessor = Preprocessor::new();
    let x_train = preprocessor.fit(&train_df)?;
    let fitted = preprocessor
        .into_fitted()
        .ok_or(PipelineError::UnfittedTransformer)?;

    let ratios = analyze_missing_values(&train_df)?;
    let inputs: Vec<String> = fitted.input_columns().iter().map(|c| c.to_string()).collect();
    let missing = features_with_missing(&ratios, &inputs);

    info!(
        train_rows = train_idx.len(),
        test_rows = test_idx.len(),
        features = fitted.n_features(),
        "Fitting classifier"
    );
    let (model, report) = LogisticRegression::from(&config.model).fit(&x_train, &y_train)?;

    let train_metrics = evaluate(&y_train, &model.predict_proba(&x_train)?, config.threshold);

    let mut holdout_stats = ApplyStats::default();
    let holdout_metrics = if test_idx.is_empty() {
        warn!("Hold-out split is empty; hold-out metrics skipped");
        None
    } else {
        let test_df = take_rows(&derived, &test_idx)?;
        let y_test = subset(&y, &test_idx);
        let (x_test, stats) = fitted.apply(&test_df)?;
        holdout_stats = stats;

        if has_both_classes(&y_test) {
            Some(evaluate(&y_test, &model.predict_proba(&x_test)?, config.threshold))
        } else {
            warn!(rows = y_test.len(), "Hold-out split holds a single class; hold-out metrics skipped");
            None
        }
    };

    if let Some(metrics) = &holdout_metrics {
        info!(auc = ?metrics.auc, f1 = metrics.f1, "Hold-out evaluation");
    }

    let training = TrainingMetadata {
        rows: y.len(),
        train_rows: train_idx.len(),
        test_rows: test_idx.len(),
        churned,
        stayed,
        fit: report,
        train_metrics,
        holdout_metrics,
    };

    let artifact = PipelineArtifact::new(fitted, model, config.threshold, training);
    Ok((
        artifact,
        TrainingOutcomeParts {
            missing,
            holdout_stats,
        },
    ))
}

/// Diagnostics produced alongside the artifact
#[derive(Debug, Clone, Default)]
pub struct TrainingOutcomeParts {
    pub missing: Vec<(String, f64)>,
    pub holdout_stats: ApplyStats,
}

/// Fit on `df` and persist the artifact to `config.model_path`.
///
/// Convergence warnings are carried in the outcome and never block the save.
pub fn train(df: &DataFrame, config: &ChurnConfig) -> PipelineResult<TrainingOutcome> {
    let (artifact, parts) = fit_pipeline(df, config)?;
    artifact.save(&config.model_path)?;

    Ok(TrainingOutcome {
        artifact,
        artifact_path: config.model_path.clone(),
        missing: parts.missing,
        holdout_stats: parts.holdout_stats,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_take_rows_keeps_order() {
        let df = df! { "a" => [10i32, 11, 12, 13] }.unwrap();
        let out = take_rows(&df, &[1, 3]).unwrap();
        let values: Vec<Option<i32>> = out.column("a").unwrap().i32().unwrap().into_iter().collect();
        assert_eq!(values, vec![Some(11), Some(13)]);
    }

    #[test]
    fn test_empty_frame_rejected() {
        let df = df! {
            "Customer_Status" => Vec::<&str>::new(),
        }
        .unwrap();
        let err = fit_pipeline(&df, &ChurnConfig::default()).unwrap_err();
        assert!(matches!(err, PipelineError::EmptyResultSet { .. }));
    }

    #[test]
    fn test_has_both_classes() {
        assert!(has_both_classes(&[0.0, 1.0]));
        assert!(!has_both_classes(&[1.0, 1.0]));
        assert!(!has_both_classes(&[]));
    }
}
