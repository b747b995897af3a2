//! Preprocessing transformer
//!
//! Fit learns a median per numeric column, a mode per categorical column and
//! a sorted vocabulary per categorical column. Apply fills missing values with
//! those frozen statistics and one-hot encodes against the frozen vocabulary,
//! always producing the fitted column layout.

use std::collections::{BTreeMap, BTreeSet};

use faer::Mat;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::error::{PipelineError, PipelineResult};
use super::features::AVG_REVENUE_PER_MONTH;
use super::schema::{missing_columns, numeric_values, string_values, NON_FEATURE_COLUMNS, NUMERIC_COLUMNS};

/// Fill value for a categorical column that had no observed values at fit time
pub const MISSING_CATEGORY: &str = "missing";

/// Numeric feature columns in layout order: the raw numeric columns followed
/// by the engineered revenue rate
fn numeric_feature_candidates() -> impl Iterator<Item = &'static str> {
    NUMERIC_COLUMNS.iter().copied().chain(std::iter::once(AVG_REVENUE_PER_MONTH))
}

/// Split the columns of `df` into numeric and categorical features.
///
/// Numeric features follow the fixed catalogue order; categorical features
/// follow the frame's column order.
pub fn select_feature_columns(df: &DataFrame) -> (Vec<String>, Vec<String>) {
    let present: Vec<String> = df
        .get_column_names()
        .iter()
        .map(|s| s.to_string())
        .collect();

    let numeric: Vec<String> = numeric_feature_candidates()
        .filter(|c| present.iter().any(|p| p == c))
        .map(|c| c.to_string())
        .collect();

    let categorical: Vec<String> = present
        .iter()
        .filter(|c| !numeric.contains(c) && !NON_FEATURE_COLUMNS.contains(&c.as_str()))
        .cloned()
        .collect();

    (numeric, categorical)
}

/// Frozen median for one numeric column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericImputer {
    pub column: String,
    pub median: f64,
}

/// Frozen mode and vocabulary for one categorical column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoricalEncoder {
    pub column: String,
    pub mode: String,
    /// Sorted categories; one indicator column each
    pub vocabulary: Vec<String>,
}

impl CategoricalEncoder {
    /// Indicator offset of `category`, or `None` if it was unseen at fit time
    pub fn index_of(&self, category: &str) -> Option<usize> {
        self.vocabulary
            .binary_search_by(|c| c.as_str().cmp(category))
            .ok()
    }
}

/// Median of the non-null values; 0.0 when there are none
fn median(values: &[Option<f64>]) -> f64 {
    let mut observed: Vec<f64> = values.iter().flatten().copied().collect();
    if observed.is_empty() {
        return 0.0;
    }
    observed.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let mid = observed.len() / 2;
    if observed.len() % 2 == 0 {
        (observed[mid - 1] + observed[mid]) / 2.0
    } else {
        observed[mid]
    }
}

/// Most frequent value; ties go to the lexicographically smallest category
fn mode(counts: &BTreeMap<String, usize>) -> Option<String> {
    let mut best: Option<(&String, usize)> = None;
    for (value, &count) in counts {
        if best.map_or(true, |(_, c)| count > c) {
            best = Some((value, count));
        }
    }
    best.map(|(v, _)| v.clone())
}

/// Dense numeric matrix with named columns
#[derive(Debug, Clone)]
pub struct DesignMatrix {
    values: Mat<f64>,
    feature_names: Vec<String>,
}

impl DesignMatrix {
    pub fn new(values: Mat<f64>, feature_names: Vec<String>) -> PipelineResult<Self> {
        if values.ncols() != feature_names.len() {
            return Err(PipelineError::InvalidData(format!(
                "matrix has {} columns but {} feature names",
                values.ncols(),
                feature_names.len()
            )));
        }
        Ok(Self {
            values,
            feature_names,
        })
    }

    pub fn nrows(&self) -> usize {
        self.values.nrows()
    }

    pub fn ncols(&self) -> usize {
        self.values.ncols()
    }

    pub fn values(&self) -> &Mat<f64> {
        &self.values
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.values[(row, col)]
    }

    pub fn row(&self, row: usize) -> Vec<f64> {
        (0..self.ncols()).map(|j| self.values[(row, j)]).collect()
    }

    pub fn column(&self, col: usize) -> Vec<f64> {
        (0..self.nrows()).map(|i| self.values[(i, col)]).collect()
    }

    /// New matrix with only the given rows, in the given order
    pub fn select_rows(&self, rows: &[usize]) -> DesignMatrix {
        let values = Mat::from_fn(rows.len(), self.ncols(), |i, j| self.values[(rows[i], j)]);
        DesignMatrix {
            values,
            feature_names: self.feature_names.clone(),
        }
    }

    /// Copy of the matrix with every entry of column `col` set to `value`
    pub fn with_column_value(&self, col: usize, value: f64) -> DesignMatrix {
        let mut values = self.values.clone();
        for i in 0..values.nrows() {
            values[(i, col)] = value;
        }
        DesignMatrix {
            values,
            feature_names: self.feature_names.clone(),
        }
    }

    /// Mean of each column
    pub fn column_means(&self) -> Vec<f64> {
        let n = self.nrows().max(1) as f64;
        (0..self.ncols())
            .map(|j| (0..self.nrows()).map(|i| self.values[(i, j)]).sum::<f64>() / n)
            .collect()
    }

    /// True when every entry is a finite number
    pub fn is_finite(&self) -> bool {
        (0..self.nrows()).all(|i| (0..self.ncols()).all(|j| self.values[(i, j)].is_finite()))
    }
}

impl PartialEq for DesignMatrix {
    fn eq(&self, other: &Self) -> bool {
        self.feature_names == other.feature_names
            && self.nrows() == other.nrows()
            && (0..self.nrows()).all(|i| {
                (0..self.ncols()).all(|j| self.values[(i, j)].to_bits() == other.values[(i, j)].to_bits())
            })
    }
}

/// Counts collected while applying the transformer
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApplyStats {
    /// Numeric cells filled with the frozen median
    pub imputed_numeric: usize,
    /// Categorical cells filled with the frozen mode
    pub imputed_categorical: usize,
    /// Per categorical column, rows whose category was not seen at fit time
    pub unseen_categories: Vec<(String, usize)>,
}

impl ApplyStats {
    pub fn total_unseen(&self) -> usize {
        self.unseen_categories.iter().map(|(_, n)| n).sum()
    }
}

/// Frozen transformer state, stored inside the pipeline artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedPreprocessor {
    pub numeric: Vec<NumericImputer>,
    pub categorical: Vec<CategoricalEncoder>,
    /// Output column layout, fixed at fit time
    pub feature_names: Vec<String>,
}

impl FittedPreprocessor {
    /// Learn imputation statistics and vocabularies from `df`
    pub fn fit(df: &DataFrame) -> PipelineResult<Self> {
        if df.height() == 0 {
            return Err(PipelineError::InvalidData(
                "cannot fit the preprocessing transformer on zero rows".to_string(),
            ));
        }

        let (numeric_cols, categorical_cols) = select_feature_columns(df);

        let mut numeric = Vec::with_capacity(numeric_cols.len());
        for column in numeric_cols {
            let values = numeric_values(df, &column)?;
            numeric.push(NumericImputer {
                median: median(&values),
                column,
            });
        }

        let mut categorical = Vec::with_capacity(categorical_cols.len());
        for column in categorical_cols {
            let values = string_values(df, &column)?;

            let mut counts: BTreeMap<String, usize> = BTreeMap::new();
            for v in values.iter().flatten() {
                *counts.entry(v.clone()).or_insert(0) += 1;
            }

            let mode = mode(&counts).unwrap_or_else(|| MISSING_CATEGORY.to_string());
            // The vocabulary is built after imputation, so it always holds the mode
            let mut vocabulary: BTreeSet<String> = counts.into_keys().collect();
            vocabulary.insert(mode.clone());

            categorical.push(CategoricalEncoder {
                column,
                mode,
                vocabulary: vocabulary.into_iter().collect(),
            });
        }

        let feature_names = numeric
            .iter()
            .map(|n| n.column.clone())
            .chain(categorical.iter().flat_map(|c| {
                c.vocabulary
                    .iter()
                    .map(move |category| format!("{}_{}", c.column, category))
            }))
            .collect();

        Ok(Self {
            numeric,
            categorical,
            feature_names,
        })
    }

    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }

    /// Raw columns the transformer reads
    pub fn input_columns(&self) -> Vec<&str> {
        self.numeric
            .iter()
            .map(|n| n.column.as_str())
            .chain(self.categorical.iter().map(|c| c.column.as_str()))
            .collect()
    }

    /// Transform `df` into the fitted layout.
    ///
    /// Unseen categories become all-zero indicator rows. A fitted input column
    /// that is absent from `df` is a schema mismatch; it is never padded.
    pub fn apply(&self, df: &DataFrame) -> PipelineResult<(DesignMatrix, ApplyStats)> {
        let missing = missing_columns(df, &self.input_columns());
        if !missing.is_empty() {
            return Err(PipelineError::SchemaMismatch {
                table: "preprocessing input".to_string(),
                missing,
            });
        }

        let n_rows = df.height();
        let mut values = Mat::<f64>::zeros(n_rows, self.n_features());
        let mut stats = ApplyStats::default();

        for (j, imputer) in self.numeric.iter().enumerate() {
            for (i, v) in numeric_values(df, &imputer.column)?.into_iter().enumerate() {
                values[(i, j)] = match v {
                    Some(x) => x,
                    None => {
                        stats.imputed_numeric += 1;
                        imputer.median
                    }
                };
            }
        }

        let mut offset = self.numeric.len();
        for encoder in &self.categorical {
            let mut unseen = 0usize;
            for (i, v) in string_values(df, &encoder.column)?.into_iter().enumerate() {
                let category = match v {
                    Some(s) => s,
                    None => {
                        stats.imputed_categorical += 1;
                        encoder.mode.clone()
                    }
                };
                match encoder.index_of(&category) {
                    Some(k) => values[(i, offset + k)] = 1.0,
                    None => unseen += 1,
                }
            }
            if unseen > 0 {
                debug!(column = %encoder.column, rows = unseen, "Unseen categories encoded as all-zero");
                stats.unseen_categories.push((encoder.column.clone(), unseen));
            }
            offset += encoder.vocabulary.len();
        }

        let matrix = DesignMatrix::new(values, self.feature_names.clone())?;
        Ok((matrix, stats))
    }
}

/// Two-phase transformer: `fit` on training rows, then `apply` anywhere
#[derive(Debug, Clone, Default)]
pub struct Preprocessor {
    state: Option<FittedPreprocessor>,
}

impl Preprocessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fitted(&self) -> Option<&FittedPreprocessor> {
        self.state.as_ref()
    }

    pub fn into_fitted(self) -> Option<FittedPreprocessor> {
        self.state
    }

    /// Fit on `df` and return its design matrix
    pub fn fit(&mut self, df: &DataFrame) -> PipelineResult<DesignMatrix> {
        let state = FittedPreprocessor::fit(df)?;
        let (matrix, _) = state.apply(df)?;
        self.state = Some(state);
        Ok(matrix)
    }

    /// Apply the frozen statistics; fails if `fit` has not run
    pub fn apply(&self, df: &DataFrame) -> PipelineResult<DesignMatrix> {
        Ok(self.apply_with_stats(df)?.0)
    }

    pub fn apply_with_stats(&self, df: &DataFrame) -> PipelineResult<(DesignMatrix, ApplyStats)> {
        self.state
            .as_ref()
            .ok_or(PipelineError::UnfittedTransformer)?
            .apply(df)
    }
}
