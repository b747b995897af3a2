//! Scorer - apply a persisted artifact to new Customer Records

use std::path::{Path, PathBuf};

use polars::prelude::*;
use serde::Serialize;
use tracing::info;

use crate::config::ChurnConfig;

use super::artifact::PipelineArtifact;
use super::error::{PipelineError, PipelineResult};
use super::features::derive_features;
use super::loader::{load_dataset, save_dataset};
use super::model::Scorable;
use super::preprocess::ApplyStats;
use super::schema::{customer_ids, missing_columns, MONTHLY_CHARGE, PREDICTION_LABEL, PREDICTION_PROBABILITY, TENURE, TOTAL_REVENUE};
use super::store::{Segment, TabularStore};
use super::target::joined_rows;

/// One scored customer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionRecord {
    pub customer_id: String,
    pub probability: f64,
    pub label: bool,
}

/// Scoring output: the input rows with the two prediction columns appended
#[derive(Debug, Clone)]
pub struct ScoredFrame {
    pub frame: DataFrame,
    pub records: Vec<PredictionRecord>,
    pub stats: ApplyStats,
    pub threshold: f64,
}

impl ScoredFrame {
    pub fn predicted_churners(&self) -> usize {
        self.records.iter().filter(|r| r.label).count()
    }

    /// Identifier, probability and label only
    pub fn records_frame(&self) -> PipelineResult<DataFrame> {
        let ids: Vec<&str> = self.records.iter().map(|r| r.customer_id.as_str()).collect();
        let probabilities: Vec<f64> = self.records.iter().map(|r| r.probability).collect();
        let labels: Vec<i32> = self.records.iter().map(|r| r.label as i32).collect();

        Ok(DataFrame::new(vec![
            Column::new(super::schema::CUSTOMER_ID.into(), ids),
            Column::new(PREDICTION_PROBABILITY.into(), probabilities),
            Column::new(PREDICTION_LABEL.into(), labels),
        ])?)
    }
}

/// Loaded artifact ready to score frames; never writes to the artifact
#[derive(Debug, Clone)]
pub struct Scorer {
    artifact: PipelineArtifact,
    path: PathBuf,
}

impl Scorer {
    pub fn load(path: &Path) -> PipelineResult<Self> {
        Ok(Self {
            artifact: PipelineArtifact::load(path)?,
            path: path.to_path_buf(),
        })
    }

    pub fn artifact(&self) -> &PipelineArtifact {
        &self.artifact
    }

    /// Score `df` at `threshold`.
    ///
    /// Runs the deriver, the frozen transformer and the model. The label is
    /// `probability >= threshold`.
    pub fn score(&self, df: &DataFrame, threshold: f64) -> PipelineResult<ScoredFrame> {
        for output in [PREDICTION_PROBABILITY, PREDICTION_LABEL] {
            if missing_columns(df, &[output]).is_empty() {
                return Err(PipelineError::OutputColumnConflict(output.to_string()));
            }
        }

        let raw_missing = missing_columns(df, &[TENURE, MONTHLY_CHARGE, TOTAL_REVENUE]);
        if !raw_missing.is_empty() {
            return Err(PipelineError::SchemaMismatch {
                table: "scoring input".to_string(),
                missing: raw_missing,
            });
        }

        if (threshold - self.artifact.threshold).abs() > f64::EPSILON {
            info!(
                threshold,
                trained_threshold = self.artifact.threshold,
                "Scoring threshold differs from training threshold"
            );
        }

        let derived = derive_features(df)?;
        self.artifact.validate_input(&derived, &self.path)?;

        let (matrix, stats) = self.artifact.preprocessor.apply(&derived)?;
        self.artifact.check_layout(&matrix, &self.path)?;

        let probabilities = self.artifact.model.predict_proba(&matrix)?;
        let ids = customer_ids(df)?;

        let records: Vec<PredictionRecord> = ids
            .into_iter()
            .zip(probabilities.iter())
            .map(|(customer_id, &probability)| PredictionRecord {
                customer_id,
                probability,
                label: probability >= threshold,
            })
            .collect();

        let labels: Vec<i32> = records.iter().map(|r| r.label as i32).collect();
        let mut frame = df.clone();
        frame.with_column(Column::new(PREDICTION_PROBABILITY.into(), probabilities))?;
        frame.with_column(Column::new(PREDICTION_LABEL.into(), labels))?;

        let scored = ScoredFrame {
            frame,
            records,
            stats,
            threshold,
        };
        info!(
            rows = scored.records.len(),
            churners = scored.predicted_churners(),
            unseen = scored.stats.total_unseen(),
            "Scored customers"
        );
        Ok(scored)
    }
}

/// Where the rows to score come from
#[derive(Debug, Clone, Default)]
pub struct ScoringSource {
    /// Only newly joined customers
    pub joined: bool,
    /// Explicit file, overriding the configured data path
    pub input: Option<PathBuf>,
}

/// Rows to score: the store (whole table or joined view) when `use_sql` is
/// set and no explicit input is given, otherwise a flat file
pub fn load_scoring_frame(config: &ChurnConfig, source: &ScoringSource) -> PipelineResult<DataFrame> {
    if config.use_sql && source.input.is_none() {
        let store = TabularStore::open(config)?;
        return if source.joined {
            store.fetch_segment(Segment::JoinScoring, &config.sql)
        } else {
            store.fetch_table()
        };
    }

    let path = source.input.as_deref().unwrap_or(&config.data_path);
    let df = load_dataset(path, config.infer_schema_length)?;
    if !source.joined {
        return Ok(df);
    }

    let joined = joined_rows(&df)?;
    if joined.height() == 0 {
        return Err(PipelineError::EmptyResultSet {
            view: config.sql.view_joined.clone(),
        });
    }
    Ok(joined)
}

/// Decimal places of `Churn_Probability` in written prediction files
const PROBABILITY_DECIMALS: i32 = 4;

fn round_probabilities(df: &mut DataFrame) -> PipelineResult<()> {
    let factor = 10f64.powi(PROBABILITY_DECIMALS);
    let rounded: Vec<Option<f64>> = df
        .column(PREDICTION_PROBABILITY)?
        .f64()?
        .into_iter()
        .map(|p| p.map(|v| (v * factor).round() / factor))
        .collect();
    df.with_column(Column::new(PREDICTION_PROBABILITY.into(), rounded))?;
    Ok(())
}

/// Write scored rows to `path` (CSV or parquet by extension).
///
/// With `full` the whole scored frame is written, otherwise only the
/// prediction records. Probabilities are rounded in the file only; labels
/// were already decided on the exact values.
pub fn write_predictions(scored: &ScoredFrame, path: &Path, full: bool) -> PipelineResult<()> {
    let mut out = if full {
        scored.frame.clone()
    } else {
        scored.records_frame()?
    };
    round_probabilities(&mut out)?;
    save_dataset(&mut out, path)?;
    info!(path = %path.display(), rows = out.height(), "Predictions saved");
    Ok(())
}

/// Replace the predictions table in the store with the full scored frame
pub fn save_predictions_to_store(scored: &ScoredFrame, config: &ChurnConfig) -> PipelineResult<()> {
    let store = TabularStore::open(config)?;
    let mut frame = scored.frame.clone();
    store.write_table(&config.sql.predictions_table, &mut frame)
}
