//! Customer status segmentation and label mapping
//!
//! Maps `Customer_Status` to the binary churn label used for training
//! (Churned = 1, Stayed = 0) and filters rows by status when the pipeline
//! reads a flat file instead of the store views.

use polars::prelude::*;
use serde::{Deserialize, Serialize};

use super::error::{PipelineError, PipelineResult};
use super::schema::{string_values, CUSTOMER_STATUS, STATUS_CHURNED, STATUS_JOINED, STATUS_STAYED};

/// Mapping configuration for converting status values to binary 0/1
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusMapping {
    /// Value that maps to 1 (churn event)
    pub event_value: String,
    /// Value that maps to 0 (non-event)
    pub non_event_value: String,
}

impl StatusMapping {
    pub fn new(event_value: String, non_event_value: String) -> Self {
        Self {
            event_value,
            non_event_value,
        }
    }

    /// Statuses that carry a ground-truth label
    pub fn labeled_statuses(&self) -> [&str; 2] {
        [self.event_value.as_str(), self.non_event_value.as_str()]
    }
}

impl Default for StatusMapping {
    fn default() -> Self {
        Self::new(STATUS_CHURNED.to_string(), STATUS_STAYED.to_string())
    }
}

/// Create a binary label mask based on the mapping
///
/// Returns a Vec<Option<i32>> where:
/// - Some(1) for event values
/// - Some(0) for non-event values
/// - None for anything else (e.g. "Joined")
pub fn create_label_mask(df: &DataFrame, mapping: &StatusMapping) -> PipelineResult<Vec<Option<i32>>> {
    let statuses = string_values(df, CUSTOMER_STATUS)?;

    let mask = statuses
        .iter()
        .map(|v| match v {
            Some(s) if s == &mapping.event_value => Some(1),
            Some(s) if s == &mapping.non_event_value => Some(0),
            _ => None,
        })
        .collect();

    Ok(mask)
}

/// Labels for a frame that must contain only labeled rows
pub fn binary_labels(df: &DataFrame, mapping: &StatusMapping) -> PipelineResult<Vec<f64>> {
    let mask = create_label_mask(df, mapping)?;

    mask.iter()
        .enumerate()
        .map(|(row, v)| match v {
            Some(label) => Ok(*label as f64),
            None => Err(PipelineError::InvalidData(format!(
                "row {} has a status outside {{{}, {}}}",
                row, mapping.event_value, mapping.non_event_value
            ))),
        })
        .collect()
}

/// Count how many records are events, non-events and unlabeled
pub fn count_mapped_records(
    df: &DataFrame,
    mapping: &StatusMapping,
) -> PipelineResult<(usize, usize, usize)> {
    let mask = create_label_mask(df, mapping)?;

    let events = mask.iter().filter(|v| **v == Some(1)).count();
    let non_events = mask.iter().filter(|v| **v == Some(0)).count();
    let ignored = mask.iter().filter(|v| v.is_none()).count();

    Ok((events, non_events, ignored))
}

/// Keep only rows whose status is one of `statuses`
pub fn filter_by_status(df: &DataFrame, statuses: &[&str]) -> PipelineResult<DataFrame> {
    let predicate = statuses
        .iter()
        .map(|s| col(CUSTOMER_STATUS).eq(lit(*s)))
        .reduce(|acc, e| acc.or(e))
        .ok_or_else(|| PipelineError::InvalidData("no statuses to filter on".to_string()))?;

    Ok(df.clone().lazy().filter(predicate).collect()?)
}

/// Rows usable for supervised training (Churned + Stayed)
pub fn labeled_rows(df: &DataFrame, mapping: &StatusMapping) -> PipelineResult<DataFrame> {
    filter_by_status(df, &mapping.labeled_statuses())
}

/// Newly joined customers without a ground-truth label
pub fn joined_rows(df: &DataFrame) -> PipelineResult<DataFrame> {
    filter_by_status(df, &[STATUS_JOINED])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_frame() -> DataFrame {
        df! {
            "Customer_ID" => ["a", "b", "c", "d", "e", "f"],
            "Customer_Status" => ["Stayed", "Churned", "Joined", "Stayed", "Joined", "Churned"],
        }
        .unwrap()
    }

    #[test]
    fn test_create_label_mask() {
        let mask = create_label_mask(&status_frame(), &StatusMapping::default()).unwrap();
        assert_eq!(mask, vec![Some(0), Some(1), None, Some(0), None, Some(1)]);
    }

    #[test]
    fn test_count_mapped_records() {
        let (events, non_events, ignored) =
            count_mapped_records(&status_frame(), &StatusMapping::default()).unwrap();

        assert_eq!(events, 2);
        assert_eq!(non_events, 2);
        assert_eq!(ignored, 2);
    }

    #[test]
    fn test_labeled_and_joined_partition() {
        let df = status_frame();
        let labeled = labeled_rows(&df, &StatusMapping::default()).unwrap();
        let joined = joined_rows(&df).unwrap();

        assert_eq!(labeled.height(), 4);
        assert_eq!(joined.height(), 2);
        assert_eq!(labeled.height() + joined.height(), df.height());
    }

    #[test]
    fn test_binary_labels_reject_unlabeled_rows() {
        let result = binary_labels(&status_frame(), &StatusMapping::default());
        assert!(matches!(result, Err(PipelineError::InvalidData(_))));
    }

    #[test]
    fn test_binary_labels() {
        let labeled = labeled_rows(&status_frame(), &StatusMapping::default()).unwrap();
        let labels = binary_labels(&labeled, &StatusMapping::default()).unwrap();
        assert_eq!(labels, vec![0.0, 1.0, 0.0, 1.0]);
    }
}
