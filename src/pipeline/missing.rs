//! Missing value analysis
//!
//! Reported before imputation so the training summary shows how much of each
//! feature the frozen medians and modes will be filling in.

use polars::prelude::*;

use super::error::PipelineResult;

/// Missing ratio per column, sorted descending (ties keep column order).
pub fn analyze_missing_values(df: &DataFrame) -> PipelineResult<Vec<(String, f64)>> {
    // Handle empty DataFrame
    if df.height() == 0 {
        return Ok(Vec::new());
    }

    let rows = df.height() as f64;
    let mut missing_ratios: Vec<(String, f64)> = df
        .get_columns()
        .iter()
        .map(|column| (column.name().to_string(), column.null_count() as f64 / rows))
        .collect();

    missing_ratios.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    Ok(missing_ratios)
}

/// Columns with at least one missing value, restricted to `features`
pub fn features_with_missing(missing_ratios: &[(String, f64)], features: &[String]) -> Vec<(String, f64)> {
    missing_ratios
        .iter()
        .filter(|(name, ratio)| *ratio > 0.0 && features.contains(name))
        .cloned()
        .collect()
}
