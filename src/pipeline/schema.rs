//! Customer Record schema
//!
//! Column catalogue of the customer table, the required-column contract and
//! the helpers that read polars columns into plain Rust vectors.

use polars::prelude::*;

use super::error::{PipelineError, PipelineResult};

pub const CUSTOMER_ID: &str = "Customer_ID";
pub const CUSTOMER_STATUS: &str = "Customer_Status";
pub const TENURE: &str = "Tenure_in_Months";
pub const MONTHLY_CHARGE: &str = "Monthly_Charge";
pub const TOTAL_REVENUE: &str = "Total_Revenue";

/// Columns appended by the scorer
pub const PREDICTION_PROBABILITY: &str = "Churn_Probability";
pub const PREDICTION_LABEL: &str = "Churn_Label";

/// Status values found in `Customer_Status`
pub const STATUS_STAYED: &str = "Stayed";
pub const STATUS_CHURNED: &str = "Churned";
pub const STATUS_JOINED: &str = "Joined";

/// Full column catalogue of the customer table, in file order
pub const CUSTOMER_COLUMNS: &[&str] = &[
    CUSTOMER_ID,
    "Gender",
    "Age",
    "Married",
    "State",
    "Number_of_Referrals",
    TENURE,
    "Value_Deal",
    "Phone_Service",
    "Multiple_Lines",
    "Internet_Service",
    "Internet_Type",
    "Online_Security",
    "Online_Backup",
    "Device_Protection_Plan",
    "Premium_Support",
    "Streaming_TV",
    "Streaming_Movies",
    "Streaming_Music",
    "Unlimited_Data",
    "Contract",
    "Paperless_Billing",
    "Payment_Method",
    MONTHLY_CHARGE,
    "Total_Charges",
    "Total_Refunds",
    "Total_Extra_Data_Charges",
    "Total_Long_Distance_Charges",
    TOTAL_REVENUE,
    CUSTOMER_STATUS,
    "Churn_Category",
    "Churn_Reason",
];

/// Columns the segmentation views and feature rules cannot work without
pub const REQUIRED_COLUMNS: &[&str] = &[
    CUSTOMER_ID,
    TENURE,
    MONTHLY_CHARGE,
    TOTAL_REVENUE,
    CUSTOMER_STATUS,
];

/// Raw columns coerced to f64; everything else that is a feature is categorical
pub const NUMERIC_COLUMNS: &[&str] = &[
    "Age",
    "Number_of_Referrals",
    TENURE,
    MONTHLY_CHARGE,
    "Total_Charges",
    "Total_Refunds",
    "Total_Extra_Data_Charges",
    "Total_Long_Distance_Charges",
    TOTAL_REVENUE,
];

/// Columns never used as model features
pub const NON_FEATURE_COLUMNS: &[&str] = &[
    CUSTOMER_ID,             // identifier
    CUSTOMER_STATUS,         // label
    "Churn_Category",        // leakage
    "Churn_Reason",          // leakage
    "Customer_Status_Predicted",
    "Churn",
    PREDICTION_PROBABILITY,
    PREDICTION_LABEL,
];

/// Return the required columns absent from `df`.
pub fn missing_columns(df: &DataFrame, required: &[&str]) -> Vec<String> {
    let present: Vec<String> = df
        .get_column_names()
        .iter()
        .map(|s| s.to_string())
        .collect();

    required
        .iter()
        .filter(|c| !present.iter().any(|p| p == *c))
        .map(|c| c.to_string())
        .collect()
}

/// Validate that `df` carries every required Customer Record column.
///
/// # Arguments
/// * `df` - Table or view result to validate
/// * `table` - Name used in the error message
pub fn validate_schema(df: &DataFrame, table: &str) -> PipelineResult<()> {
    let missing = missing_columns(df, REQUIRED_COLUMNS);
    if missing.is_empty() {
        Ok(())
    } else {
        Err(PipelineError::SchemaMismatch {
            table: table.to_string(),
            missing,
        })
    }
}

/// Ingested rows must carry a status
pub fn check_status_not_null(df: &DataFrame) -> PipelineResult<()> {
    let status = df.column(CUSTOMER_STATUS)?;
    let nulls = status.null_count();
    if nulls > 0 {
        return Err(PipelineError::NullStatus {
            column: CUSTOMER_STATUS.to_string(),
            rows: nulls,
        });
    }
    Ok(())
}

/// Read a column as f64 values, coercing unparseable entries to null.
///
/// Negative monthly charges are data-entry errors and are treated as missing.
pub fn numeric_values(df: &DataFrame, name: &str) -> PipelineResult<Vec<Option<f64>>> {
    let column = df.column(name)?;
    let float_col = column.cast(&DataType::Float64)?;
    let values = float_col
        .f64()?
        .into_iter()
        .map(|v| match v {
            Some(x) if x.is_nan() => None,
            Some(x) if name == MONTHLY_CHARGE && x < 0.0 => None,
            other => other,
        })
        .collect();
    Ok(values)
}

/// Rewrite every present numeric column as f64 with the [`numeric_values`] rules.
///
/// Applied before the customer table is stored, so the view SQL compares
/// the same cleaned values the deriver sees.
pub fn coerce_numeric_columns(df: &DataFrame) -> PipelineResult<DataFrame> {
    let mut out = df.clone();
    for &name in NUMERIC_COLUMNS {
        if df.get_column_index(name).is_none() {
            continue;
        }
        let values = numeric_values(df, name)?;
        out.with_column(Column::new(name.into(), values))?;
    }
    Ok(out)
}

/// Read a column as strings for categorical handling
pub fn string_values(df: &DataFrame, name: &str) -> PipelineResult<Vec<Option<String>>> {
    let column = df.column(name)?;

    let values: Vec<Option<String>> = match column.dtype() {
        DataType::String => column
            .str()?
            .into_iter()
            .map(|v| v.map(|s| s.to_string()))
            .collect(),
        DataType::Boolean => column
            .bool()?
            .into_iter()
            .map(|v| v.map(|b| b.to_string()))
            .collect(),
        DataType::Float32 | DataType::Float64 => {
            let cast = column.cast(&DataType::Float64)?;
            cast.f64()?
                .into_iter()
                .map(|v| v.map(|n| format!("{}", n)))
                .collect()
        }
        _ => {
            // Integers and everything else go through polars' string cast
            let cast = column.cast(&DataType::String)?;
            cast.str()?
                .into_iter()
                .map(|v| v.map(|s| s.to_string()))
                .collect()
        }
    };

    Ok(values)
}

/// Row identifiers: `Customer_ID` when present, otherwise the row index
pub fn customer_ids(df: &DataFrame) -> PipelineResult<Vec<String>> {
    if missing_columns(df, &[CUSTOMER_ID]).is_empty() {
        let ids = string_values(df, CUSTOMER_ID)?
            .into_iter()
            .enumerate()
            .map(|(i, id)| id.unwrap_or_else(|| format!("row_{}", i)))
            .collect();
        Ok(ids)
    } else {
        Ok((0..df.height()).map(|i| format!("row_{}", i)).collect())
    }
}
