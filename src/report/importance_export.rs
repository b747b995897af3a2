//! Global importance export functionality

use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;

use crate::pipeline::{FeatureImportance, ImportanceReport};

/// Metadata about the explain run
#[derive(Serialize)]
pub struct ImportanceMetadata {
    /// Timestamp of the run (ISO 8601 format)
    pub timestamp: String,
    /// churnflow version
    pub churnflow_version: String,
    /// Artifact that was explained
    pub artifact_path: String,
    /// When that artifact was trained
    pub artifact_created_at: String,
    /// Reference dataset, or the store table it came from
    pub reference_source: String,
    pub reference_rows: usize,
    pub background_rows: usize,
    pub seed: u64,
    /// Impact measure used for every feature
    pub method: String,
}

/// Summary statistics of the ranking
#[derive(Serialize)]
pub struct ImportanceSummary {
    pub total_features: usize,
    /// Features whose importance is exactly zero
    pub zero_importance_features: usize,
    pub max_importance: f64,
}

/// Complete importance export with metadata
#[derive(Serialize)]
pub struct ImportanceExport<'a> {
    pub metadata: ImportanceMetadata,
    pub summary: ImportanceSummary,
    /// All features, most important first
    pub features: &'a [FeatureImportance],
}

/// Parameters for the export metadata
pub struct ImportanceExportParams<'a> {
    pub artifact_path: &'a Path,
    pub artifact_created_at: &'a str,
    pub reference_source: &'a str,
    pub seed: u64,
}

/// Export the ranked global importance to a JSON file
///
/// # Arguments
/// * `report` - Ranked importances from the explainer
/// * `output_path` - Path to write the JSON file; parent directories are created
/// * `params` - Export parameters for metadata
pub fn export_global_importance(
    report: &ImportanceReport,
    output_path: &Path,
    params: &ImportanceExportParams,
) -> Result<()> {
    let export = ImportanceExport {
        metadata: ImportanceMetadata {
            timestamp: Utc::now().to_rfc3339(),
            churnflow_version: env!("CARGO_PKG_VERSION").to_string(),
            artifact_path: params.artifact_path.display().to_string(),
            artifact_created_at: params.artifact_created_at.to_string(),
            reference_source: params.reference_source.to_string(),
            reference_rows: report.reference_rows,
            background_rows: report.background_rows,
            seed: params.seed,
            method: "mean |p(x) - p(x with feature at background mean)|".to_string(),
        },
        summary: ImportanceSummary {
            total_features: report.features.len(),
            zero_importance_features: report.features.iter().filter(|f| f.importance == 0.0).count(),
            max_importance: report.features.first().map_or(0.0, |f| f.importance),
        },
        features: &report.features,
    };

    let json = serde_json::to_string_pretty(&export)
        .context("Failed to serialize global importance to JSON")?;

    if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create report directory {}", parent.display()))?;
    }
    std::fs::write(output_path, json)
        .with_context(|| format!("Failed to write global importance to {}", output_path.display()))?;

    Ok(())
}
