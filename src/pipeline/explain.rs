//! Global explainer - mean absolute feature impact
//!
//! Importance of feature `j` is the mean, over reference rows, of
//! `|f(x) - f(x with column j set to its background mean)|`, where `f` is the
//! churn probability and the background is a seeded sample of the reference
//! rows.

use std::path::Path;

use polars::prelude::DataFrame;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::{ChurnConfig, ExplainConfig};

use super::artifact::PipelineArtifact;
use super::error::{PipelineError, PipelineResult};
use super::features::derive_features;
use super::loader::load_dataset;
use super::model::Scorable;
use super::preprocess::DesignMatrix;
use super::store::TabularStore;

/// One ranked feature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    /// 1-based rank, 1 = most important
    pub rank: usize,
    pub feature: String,
    pub importance: f64,
}

/// Ranked importances for every feature in the fitted layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportanceReport {
    pub features: Vec<FeatureImportance>,
    pub reference_rows: usize,
    pub background_rows: usize,
}

impl ImportanceReport {
    pub fn top(&self, k: usize) -> &[FeatureImportance] {
        &self.features[..k.min(self.features.len())]
    }
}

/// Seeded global explainer over any [`Scorable`] model
#[derive(Debug, Clone)]
pub struct GlobalExplainer<'a, M: Scorable> {
    model: &'a M,
    background_size: usize,
    seed: u64,
}

impl<'a, M: Scorable> GlobalExplainer<'a, M> {
    pub fn new(model: &'a M) -> Self {
        let defaults = ExplainConfig::default();
        Self {
            model,
            background_size: defaults.background_size,
            seed: defaults.seed,
        }
    }

    pub fn with_background_size(mut self, n: usize) -> Self {
        self.background_size = n.max(1);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Row positions of the background sample, ascending
    fn background_rows(&self, n_rows: usize) -> Vec<usize> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let k = self.background_size.min(n_rows);
        let mut rows = rand::seq::index::sample(&mut rng, n_rows, k).into_vec();
        rows.sort_unstable();
        rows
    }

    /// Rank the features of `reference`.
    ///
    /// Largest importance first; equal importances keep column order.
    pub fn explain(&self, reference: &DesignMatrix) -> PipelineResult<ImportanceReport> {
        if reference.nrows() == 0 {
            return Err(PipelineError::InvalidData(
                "reference dataset has no rows".to_string(),
            ));
        }

        let background = reference.select_rows(&self.background_rows(reference.nrows()));
        let means = background.column_means();
        let baseline = self.model.predict_proba(reference)?;
        let n = reference.nrows() as f64;

        let mut importances = Vec::with_capacity(reference.ncols());
        for (j, mean) in means.iter().enumerate() {
            let perturbed = self.model.predict_proba(&reference.with_column_value(j, *mean))?;
            let impact = baseline
                .iter()
                .zip(&perturbed)
                .map(|(a, b)| (a - b).abs())
                .sum::<f64>()
                / n;
            importances.push(impact);
        }

        let mut order: Vec<usize> = (0..importances.len()).collect();
        order.sort_by(|&a, &b| importances[b].total_cmp(&importances[a]).then(a.cmp(&b)));

        let features = order
            .into_iter()
            .enumerate()
            .map(|(rank, j)| FeatureImportance {
                rank: rank + 1,
                feature: reference.feature_names()[j].clone(),
                importance: importances[j],
            })
            .collect();

        Ok(ImportanceReport {
            features,
            reference_rows: reference.nrows(),
            background_rows: background.nrows(),
        })
    }
}

/// Reference rows: `input` if given, else the store table under `use_sql`,
/// else the configured data file
pub fn load_reference_frame(config: &ChurnConfig, input: Option<&Path>) -> PipelineResult<DataFrame> {
    match input {
        Some(path) => load_dataset(path, config.infer_schema_length),
        None if config.use_sql => TabularStore::open(config)?.fetch_table(),
        None => load_dataset(&config.data_path, config.infer_schema_length),
    }
}

/// Derive, transform and explain raw Customer Records with a loaded artifact
pub fn explain_frame(
    artifact: &PipelineArtifact,
    artifact_path: &Path,
    df: &DataFrame,
    config: &ExplainConfig,
) -> PipelineResult<ImportanceReport> {
    let derived = derive_features(df)?;
    artifact.validate_input(&derived, artifact_path)?;
    let (matrix, _) = artifact.preprocessor.apply(&derived)?;
    artifact.check_layout(&matrix, artifact_path)?;

    let report = GlobalExplainer::new(&artifact.model)
        .with_background_size(config.background_size)
        .with_seed(config.seed)
        .explain(&matrix)?;

    info!(
        features = report.features.len(),
        reference_rows = report.reference_rows,
        background_rows = report.background_rows,
        "Computed global importance"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::model::FittedLogistic;
    use faer::Mat;

    fn reference() -> DesignMatrix {
        let rows = [[0.0, 1.0, 5.0], [1.0, 0.0, 5.0], [2.0, 1.0, 5.0], [3.0, 0.0, 5.0]];
        DesignMatrix::new(
            Mat::from_fn(4, 3, |i, j| rows[i][j]),
            vec!["a".to_string(), "b".to_string(), "c".to_string()],
        )
        .unwrap()
    }

    #[test]
    fn test_larger_coefficient_ranks_first() {
        let model = FittedLogistic {
            coefficients: vec![0.1, 2.0, 0.0],
            intercept: 0.0,
        };
        let report = GlobalExplainer::new(&model).explain(&reference()).unwrap();

        assert_eq!(report.features[0].feature, "b");
        assert_eq!(report.features[0].rank, 1);
        assert_eq!(report.features[2].feature, "c");
        assert_eq!(report.features[2].importance, 0.0);
        assert_eq!(report.background_rows, 4);
    }

    #[test]
    fn test_ties_keep_column_order() {
        let model = FittedLogistic {
            coefficients: vec![0.0, 0.0, 0.0],
            intercept: 0.3,
        };
        let report = GlobalExplainer::new(&model).explain(&reference()).unwrap();
        let names: Vec<&str> = report.features.iter().map(|f| f.feature.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_background_is_seeded_and_bounded() {
        let model = FittedLogistic {
            coefficients: vec![1.0, 1.0, 1.0],
            intercept: 0.0,
        };
        let explainer = GlobalExplainer::new(&model).with_background_size(2).with_seed(7);
        let rows = explainer.background_rows(4);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows, explainer.background_rows(4));

        let report = explainer.explain(&reference()).unwrap();
        assert_eq!(report.top(10).len(), 3);
        assert_eq!(report.top(1).len(), 1);
    }
}
