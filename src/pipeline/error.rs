//! Error types for the churn pipeline.
//!
//! Every fallible library operation returns [`PipelineError`]. The binary
//! wraps these in `anyhow` with command-level context.

use std::path::PathBuf;

use polars::prelude::PolarsError;
use thiserror::Error;

/// Errors that can occur while segmenting, transforming, training or scoring.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The table lacks one or more required columns. Fatal.
    #[error("schema mismatch: '{table}' is missing required column(s): {}", missing.join(", "))]
    SchemaMismatch {
        /// Table, view or frame that was validated
        table: String,
        /// Required columns that were not found
        missing: Vec<String>,
    },

    /// A view returned zero rows.
    ///
    /// Callers that can continue with the other segment log this and move on.
    #[error("view '{view}' returned no rows")]
    EmptyResultSet { view: String },

    /// `apply` was invoked on a transformer that has not been fitted.
    #[error("preprocessing transformer is not fitted; call fit before apply")]
    UnfittedTransformer,

    /// No artifact exists at the configured model path.
    #[error("no trained artifact found at {} (run `churnflow train` first)", path.display())]
    ArtifactNotFound { path: PathBuf },

    /// The artifact does not line up with the current code or input data.
    #[error("artifact at {} is incompatible: {reason}", path.display())]
    ArtifactVersionMismatch { path: PathBuf, reason: String },

    /// The artifact file exists but could not be decoded.
    #[error("artifact at {} is unreadable: {source}", path.display())]
    ArtifactCorrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Ingested rows must always carry a status.
    #[error("'{column}' is null in {rows} row(s)")]
    NullStatus { column: String, rows: usize },

    /// A materialized engineered column disagrees with the feature deriver.
    #[error("engineered column '{column}' disagrees with derived value at row {row}: {materialized} != {derived}")]
    FeatureDrift {
        column: String,
        row: usize,
        materialized: String,
        derived: String,
    },

    /// A view name that was never defined on the store.
    #[error("view '{0}' is not defined")]
    UnknownView(String),

    /// The store directory has no base table yet.
    #[error("store at {} is not initialized (run `churnflow init-db` first)", path.display())]
    StoreNotInitialized { path: PathBuf },

    /// Scoring output would overwrite an input column.
    #[error("input already contains output column '{0}'")]
    OutputColumnConflict(String),

    /// Data that cannot be used as-is (empty training set, single class, ...).
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Configuration value out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Polars(#[from] PolarsError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

/// Result alias used across the pipeline modules.
pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_mismatch_lists_columns() {
        let err = PipelineError::SchemaMismatch {
            table: "prod_Churn".to_string(),
            missing: vec!["Tenure_in_Months".to_string(), "Total_Revenue".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.contains("prod_Churn"));
        assert!(msg.contains("Tenure_in_Months, Total_Revenue"));
    }

    #[test]
    fn test_artifact_not_found_mentions_path() {
        let err = PipelineError::ArtifactNotFound {
            path: PathBuf::from("artifacts/model.json"),
        };
        assert!(err.to_string().contains("artifacts/model.json"));
    }
}
