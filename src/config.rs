//! Pipeline configuration
//!
//! A single immutable [`ChurnConfig`] value is loaded once by the binary and
//! passed by reference into every stage.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::pipeline::{PipelineError, PipelineResult};

/// Default location of the YAML configuration file
pub const DEFAULT_CONFIG_PATH: &str = "config.yaml";

/// Top-level configuration for all pipeline stages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChurnConfig {
    /// Raw customer CSV (or parquet) file
    pub data_path: PathBuf,
    /// Directory holding the parquet-backed tabular store
    pub store_dir: PathBuf,
    /// Read training/scoring rows from the store views instead of `data_path`
    pub use_sql: bool,
    /// Default predictions output file
    pub pred_out_path: PathBuf,
    /// Persisted pipeline artifact
    pub model_path: PathBuf,
    /// Directory for generated reports
    pub reports_dir: PathBuf,
    /// Ranked global importance export
    pub global_importance_path: PathBuf,
    /// Decision threshold applied to the churn probability
    pub threshold: f64,
    /// Rows used for CSV schema inference (0 = full scan)
    pub infer_schema_length: usize,
    pub sql: SqlConfig,
    pub model: ModelConfig,
    pub split: SplitConfig,
    pub explain: ExplainConfig,
}

/// Store table and view identifiers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SqlConfig {
    pub table_name: String,
    /// Identifier of the `churn_training` view
    pub view_churn: String,
    /// Identifier of the `join_scoring` view
    pub view_joined: String,
    pub predictions_table: String,
}

/// How class imbalance is handled by the classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ClassWeight {
    #[default]
    None,
    /// Weight each class by `n_samples / (2 * n_class)`
    Balanced,
}

/// Logistic regression hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Inverse L2 regularization strength
    pub c: f64,
    pub max_iter: usize,
    pub tol: f64,
    pub class_weight: ClassWeight,
}

/// Hold-out split used to evaluate a training run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitConfig {
    pub test_size: f64,
    pub seed: u64,
}

/// Global importance settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExplainConfig {
    /// Maximum number of reference rows sampled as background
    pub background_size: usize,
    /// Number of features shown in the terminal ranking
    pub top_k: usize,
    pub seed: u64,
}

impl Default for ChurnConfig {
    fn default() -> Self {
        Self {
            data_path: PathBuf::from("data/Customer_Data.csv"),
            store_dir: PathBuf::from("store"),
            use_sql: false,
            pred_out_path: PathBuf::from("data/predictions.csv"),
            model_path: PathBuf::from("artifacts/churn_model.json"),
            reports_dir: PathBuf::from("reports"),
            global_importance_path: PathBuf::from("reports/global_importance.json"),
            threshold: 0.5,
            infer_schema_length: 10000,
            sql: SqlConfig::default(),
            model: ModelConfig::default(),
            split: SplitConfig::default(),
            explain: ExplainConfig::default(),
        }
    }
}

impl Default for SqlConfig {
    fn default() -> Self {
        Self {
            table_name: "prod_Churn".to_string(),
            view_churn: "vw_ChurnData".to_string(),
            view_joined: "vw_JoinData".to_string(),
            predictions_table: "predictions".to_string(),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            c: 1.0,
            max_iter: 100,
            tol: 1e-6,
            class_weight: ClassWeight::None,
        }
    }
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            test_size: 0.2,
            seed: 42,
        }
    }
}

impl Default for ExplainConfig {
    fn default() -> Self {
        Self {
            background_size: 200,
            top_k: 20,
            seed: 42,
        }
    }
}

impl ChurnConfig {
    /// Load configuration from a YAML file.
    ///
    /// Keys that are absent fall back to their defaults. When `path` is the
    /// default location and the file does not exist, the defaults are used.
    pub fn load(path: &Path) -> PipelineResult<Self> {
        if !path.exists() && path == Path::new(DEFAULT_CONFIG_PATH) {
            info!("No {} found, using default configuration", DEFAULT_CONFIG_PATH);
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)?;
        let config: ChurnConfig = serde_yaml::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges before any stage runs
    pub fn validate(&self) -> PipelineResult<()> {
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(PipelineError::InvalidConfig(format!(
                "threshold must be between 0.0 and 1.0, got {}",
                self.threshold
            )));
        }
        if !(0.0..1.0).contains(&self.split.test_size) {
            return Err(PipelineError::InvalidConfig(format!(
                "split.test_size must be in [0.0, 1.0), got {}",
                self.split.test_size
            )));
        }
        if !(self.model.c > 0.0 && self.model.c.is_finite()) {
            return Err(PipelineError::InvalidConfig(format!(
                "model.c must be a positive finite number, got {}",
                self.model.c
            )));
        }
        if self.model.max_iter == 0 {
            return Err(PipelineError::InvalidConfig(
                "model.max_iter must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Create the artifact and report directories if missing
    pub fn ensure_output_dirs(&self) -> PipelineResult<()> {
        for path in [&self.model_path, &self.global_importance_path] {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::create_dir_all(&self.reports_dir)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = ChurnConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.threshold, 0.5);
        assert_eq!(config.sql.view_churn, "vw_ChurnData");
        assert_eq!(config.sql.view_joined, "vw_JoinData");
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = "threshold: 0.3\nmodel:\n  max_iter: 500\n  class_weight: balanced\n";
        let config: ChurnConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.threshold, 0.3);
        assert_eq!(config.model.max_iter, 500);
        assert_eq!(config.model.class_weight, ClassWeight::Balanced);
        assert_eq!(config.model.c, 1.0);
        assert_eq!(config.sql.table_name, "prod_Churn");
    }

    #[test]
    fn test_rejects_out_of_range_threshold() {
        let config = ChurnConfig {
            threshold: 1.5,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(PipelineError::InvalidConfig(_))));
    }

    #[test]
    fn test_load_missing_explicit_path_fails() {
        let result = ChurnConfig::load(Path::new("/nonexistent/churn.yaml"));
        assert!(result.is_err());
    }
}
