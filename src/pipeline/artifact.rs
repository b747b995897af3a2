//! Persisted pipeline artifact
//!
//! One JSON document holding the fitted transformer, the model, the feature
//! layout and the training metrics. Written write-new-then-swap so a failed
//! save never replaces the current artifact.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::error::{PipelineError, PipelineResult};
use super::metrics::EvaluationMetrics;
use super::model::{FitReport, FittedLogistic, Scorable};
use super::preprocess::{DesignMatrix, FittedPreprocessor};
use super::schema::missing_columns;

/// Bumped whenever the artifact layout changes incompatibly
pub const ARTIFACT_FORMAT_VERSION: u32 = 1;

/// How the artifact was trained
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingMetadata {
    /// Labeled rows available before the split
    pub rows: usize,
    pub train_rows: usize,
    pub test_rows: usize,
    pub churned: usize,
    pub stayed: usize,
    pub fit: FitReport,
    pub train_metrics: EvaluationMetrics,
    /// `None` when the hold-out split could not hold both classes
    pub holdout_metrics: Option<EvaluationMetrics>,
}

/// Fitted preprocessing + classifier, persisted as a single unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineArtifact {
    pub format_version: u32,
    /// RFC 3339 creation timestamp
    pub created_at: String,
    pub crate_version: String,
    pub preprocessor: FittedPreprocessor,
    pub model: FittedLogistic,
    /// Decision threshold in effect at training time
    pub threshold: f64,
    pub training: TrainingMetadata,
}

impl PipelineArtifact {
    pub fn new(
        preprocessor: FittedPreprocessor,
        model: FittedLogistic,
        threshold: f64,
        training: TrainingMetadata,
    ) -> Self {
        Self {
            format_version: ARTIFACT_FORMAT_VERSION,
            created_at: Utc::now().to_rfc3339(),
            crate_version: env!("CARGO_PKG_VERSION").to_string(),
            preprocessor,
            model,
            threshold,
            training,
        }
    }

    /// Fitted output layout
    pub fn feature_names(&self) -> &[String] {
        &self.preprocessor.feature_names
    }

    /// Write the artifact to `path`, replacing any previous one atomically.
    ///
    /// The document is written to a temporary file in the destination
    /// directory, synced, and renamed over `path`.
    pub fn save(&self, path: &Path) -> PipelineResult<()> {
        let dir = match path.parent().filter(|p| !p.as_os_str().is_empty()) {
            Some(parent) => {
                std::fs::create_dir_all(parent)?;
                parent.to_path_buf()
            }
            None => PathBuf::from("."),
        };

        let json = serde_json::to_string_pretty(self)?;

        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        tmp.write_all(json.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| PipelineError::Io(e.error))?;

        info!(path = %path.display(), features = self.feature_names().len(), "Saved pipeline artifact");
        Ok(())
    }

    /// Load and check an artifact.
    ///
    /// # Errors
    /// * `ArtifactNotFound` - nothing at `path`
    /// * `ArtifactCorrupt` - not a decodable artifact document
    /// * `ArtifactVersionMismatch` - different format version, or the
    ///   transformer and model disagree on the feature count
    pub fn load(path: &Path) -> PipelineResult<Self> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(PipelineError::ArtifactNotFound {
                    path: path.to_path_buf(),
                })
            }
            Err(e) => return Err(e.into()),
        };

        let corrupt = |source| PipelineError::ArtifactCorrupt {
            path: path.to_path_buf(),
            source,
        };

        // Check the version before decoding the rest, so older layouts get a
        // version error instead of a decode error
        let value: serde_json::Value = serde_json::from_str(&raw).map_err(corrupt)?;
        let version = value.get("format_version").and_then(|v| v.as_u64());
        if version != Some(u64::from(ARTIFACT_FORMAT_VERSION)) {
            return Err(PipelineError::ArtifactVersionMismatch {
                path: path.to_path_buf(),
                reason: format!(
                    "format version {} (expected {})",
                    version.map_or("missing".to_string(), |v| v.to_string()),
                    ARTIFACT_FORMAT_VERSION
                ),
            });
        }

        let artifact: PipelineArtifact = serde_json::from_value(value).map_err(corrupt)?;

        if artifact.model.n_features() != artifact.preprocessor.n_features() {
            return Err(PipelineError::ArtifactVersionMismatch {
                path: path.to_path_buf(),
                reason: format!(
                    "model has {} coefficients but the transformer produces {} features",
                    artifact.model.n_features(),
                    artifact.preprocessor.n_features()
                ),
            });
        }

        info!(path = %path.display(), created_at = %artifact.created_at, "Loaded pipeline artifact");
        Ok(artifact)
    }

    /// Every column the transformer was fitted on must be present in `df`
    pub fn validate_input(&self, df: &DataFrame, path: &Path) -> PipelineResult<()> {
        let missing = missing_columns(df, &self.preprocessor.input_columns());
        if missing.is_empty() {
            Ok(())
        } else {
            Err(PipelineError::ArtifactVersionMismatch {
                path: path.to_path_buf(),
                reason: format!("input lacks fitted column(s): {}", missing.join(", ")),
            })
        }
    }

    /// The applied matrix must match the recorded layout exactly
    pub fn check_layout(&self, matrix: &DesignMatrix, path: &Path) -> PipelineResult<()> {
        if matrix.feature_names() == self.feature_names() {
            Ok(())
        } else {
            Err(PipelineError::ArtifactVersionMismatch {
                path: path.to_path_buf(),
                reason: format!(
                    "applied layout has {} columns, artifact records {}",
                    matrix.ncols(),
                    self.feature_names().len()
                ),
            })
        }
    }
}
