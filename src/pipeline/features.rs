//! Feature deriver - tenure buckets, billing segments and revenue rate
//!
//! The boundary constants below are the single source of truth. The per-row
//! functions and the SQL used by the store views are both generated from
//! them, and any engineered column that arrives already materialized by a
//! view is checked against the per-row result before it is used.

use polars::prelude::*;

use super::error::{PipelineError, PipelineResult};
use super::schema::{numeric_values, string_values, MONTHLY_CHARGE, TENURE, TOTAL_REVENUE};

pub const TENURE_BUCKET: &str = "Tenure_Bucket";
pub const BILLING_SEGMENT: &str = "Billing_Segment";
pub const AVG_REVENUE_PER_MONTH: &str = "Avg_Revenue_Per_Month";

/// Engineered columns, in the order they are appended
pub const ENGINEERED_COLUMNS: &[&str] = &[TENURE_BUCKET, BILLING_SEGMENT, AVG_REVENUE_PER_MONTH];

/// Last tenure month (inclusive) of the "New" bucket
pub const NEW_TENURE_MAX: f64 = 6.0;
/// Last tenure month (inclusive) of the "Intermediate" bucket
pub const INTERMEDIATE_TENURE_MAX: f64 = 24.0;
/// Monthly charges strictly below this are "Low"
pub const LOW_CHARGE_LIMIT: f64 = 30.0;
/// Monthly charges up to and including this are "Medium"
pub const MEDIUM_CHARGE_MAX: f64 = 70.0;

/// Customer tenure bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TenureBucket {
    New,
    Intermediate,
    LongTerm,
}

impl TenureBucket {
    pub fn from_tenure(tenure: f64) -> Self {
        if tenure <= NEW_TENURE_MAX {
            TenureBucket::New
        } else if tenure <= INTERMEDIATE_TENURE_MAX {
            TenureBucket::Intermediate
        } else {
            TenureBucket::LongTerm
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TenureBucket::New => "New",
            TenureBucket::Intermediate => "Intermediate",
            TenureBucket::LongTerm => "Long-Term",
        }
    }
}

/// Monthly billing segment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BillingSegment {
    Low,
    Medium,
    High,
}

impl BillingSegment {
    pub fn from_monthly_charge(charge: f64) -> Self {
        if charge < LOW_CHARGE_LIMIT {
            BillingSegment::Low
        } else if charge <= MEDIUM_CHARGE_MAX {
            BillingSegment::Medium
        } else {
            BillingSegment::High
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BillingSegment::Low => "Low",
            BillingSegment::Medium => "Medium",
            BillingSegment::High => "High",
        }
    }
}

/// Average revenue per tenure month; `None` when tenure is zero or unknown.
pub fn avg_revenue_per_month(total_revenue: Option<f64>, tenure: Option<f64>) -> Option<f64> {
    match (total_revenue, tenure) {
        (Some(revenue), Some(months)) if months > 0.0 => Some(revenue / months),
        _ => None,
    }
}

/// Engineered values for a single customer row
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineeredFeatures {
    pub tenure_bucket: Option<TenureBucket>,
    pub billing_segment: Option<BillingSegment>,
    pub avg_revenue_per_month: Option<f64>,
}

impl EngineeredFeatures {
    /// Apply the rules to one row's raw values
    pub fn derive(tenure: Option<f64>, monthly_charge: Option<f64>, total_revenue: Option<f64>) -> Self {
        Self {
            tenure_bucket: tenure.map(TenureBucket::from_tenure),
            billing_segment: monthly_charge.map(BillingSegment::from_monthly_charge),
            avg_revenue_per_month: avg_revenue_per_month(total_revenue, tenure),
        }
    }
}

fn quoted(column: &str) -> String {
    format!("\"{}\"", column)
}

/// SQL expression computing the tenure bucket from the same boundaries
pub fn tenure_bucket_sql() -> String {
    let t = quoted(TENURE);
    format!(
        "CASE WHEN {t} <= {new} THEN '{n}' WHEN {t} <= {mid} THEN '{i}' WHEN {t} > {mid} THEN '{l}' ELSE NULL END",
        t = t,
        new = NEW_TENURE_MAX,
        mid = INTERMEDIATE_TENURE_MAX,
        n = TenureBucket::New.as_str(),
        i = TenureBucket::Intermediate.as_str(),
        l = TenureBucket::LongTerm.as_str(),
    )
}

/// SQL expression computing the billing segment from the same boundaries.
///
/// Negative charges are treated as missing, as in [`numeric_values`].
pub fn billing_segment_sql() -> String {
    let m = quoted(MONTHLY_CHARGE);
    format!(
        "CASE WHEN {m} < 0 THEN NULL WHEN {m} < {low} THEN '{l}' WHEN {m} <= {mid} THEN '{md}' WHEN {m} > {mid} THEN '{h}' ELSE NULL END",
        m = m,
        low = LOW_CHARGE_LIMIT,
        mid = MEDIUM_CHARGE_MAX,
        l = BillingSegment::Low.as_str(),
        md = BillingSegment::Medium.as_str(),
        h = BillingSegment::High.as_str(),
    )
}

/// SQL expression computing the average revenue per month
pub fn avg_revenue_sql() -> String {
    let t = quoted(TENURE);
    let r = quoted(TOTAL_REVENUE);
    format!(
        "CASE WHEN {t} > 0 THEN CAST({r} AS DOUBLE) / CAST({t} AS DOUBLE) ELSE NULL END",
        t = t,
        r = r
    )
}

/// Select list fragment appending all engineered columns to `SELECT *`
pub fn engineered_select_sql() -> String {
    format!(
        "{} AS {}, {} AS {}, {} AS {}",
        tenure_bucket_sql(),
        quoted(TENURE_BUCKET),
        billing_segment_sql(),
        quoted(BILLING_SEGMENT),
        avg_revenue_sql(),
        quoted(AVG_REVENUE_PER_MONTH)
    )
}

/// Compute the engineered features for every row of `df`
pub fn compute_features(df: &DataFrame) -> PipelineResult<Vec<EngineeredFeatures>> {
    let tenure = numeric_values(df, TENURE)?;
    let charge = numeric_values(df, MONTHLY_CHARGE)?;
    let revenue = numeric_values(df, TOTAL_REVENUE)?;

    Ok(tenure
        .iter()
        .zip(charge.iter())
        .zip(revenue.iter())
        .map(|((t, m), r)| EngineeredFeatures::derive(*t, *m, *r))
        .collect())
}

fn has_column(df: &DataFrame, name: &str) -> bool {
    df.get_column_names().iter().any(|c| c.as_str() == name)
}

fn label_drift(column: &str, row: usize, materialized: Option<&str>, derived: Option<&str>) -> PipelineError {
    PipelineError::FeatureDrift {
        column: column.to_string(),
        row,
        materialized: materialized.unwrap_or("null").to_string(),
        derived: derived.unwrap_or("null").to_string(),
    }
}

fn verify_label_column(
    df: &DataFrame,
    column: &str,
    derived: &[EngineeredFeatures],
    pick: impl Fn(&EngineeredFeatures) -> Option<&'static str>,
) -> PipelineResult<bool> {
    if !has_column(df, column) {
        return Ok(false);
    }

    let materialized = string_values(df, column)?;
    for (row, (m, f)) in materialized.iter().zip(derived.iter()).enumerate() {
        let expected = pick(f);
        if m.as_deref() != expected {
            return Err(label_drift(column, row, m.as_deref(), expected));
        }
    }
    Ok(true)
}

/// Check materialized engineered columns against the deriver.
///
/// Only columns present in `df` are checked. Returns the number of columns
/// that were compared.
pub fn verify_parity(df: &DataFrame, derived: &[EngineeredFeatures]) -> PipelineResult<usize> {
    let mut checked = 0;

    if verify_label_column(df, TENURE_BUCKET, derived, |f| {
        f.tenure_bucket.map(|b| b.as_str())
    })? {
        checked += 1;
    }
    if verify_label_column(df, BILLING_SEGMENT, derived, |f| {
        f.billing_segment.map(|s| s.as_str())
    })? {
        checked += 1;
    }

    if has_column(df, AVG_REVENUE_PER_MONTH) {
        let materialized = numeric_values(df, AVG_REVENUE_PER_MONTH)?;
        for (row, (m, f)) in materialized.iter().zip(derived.iter()).enumerate() {
            let agree = match (m, f.avg_revenue_per_month) {
                (Some(a), Some(b)) => a.to_bits() == b.to_bits(),
                (None, None) => true,
                _ => false,
            };
            if !agree {
                return Err(PipelineError::FeatureDrift {
                    column: AVG_REVENUE_PER_MONTH.to_string(),
                    row,
                    materialized: m.map_or("null".to_string(), |v| v.to_string()),
                    derived: f
                        .avg_revenue_per_month
                        .map_or("null".to_string(), |v| v.to_string()),
                });
            }
        }
        checked += 1;
    }

    Ok(checked)
}

/// Append the engineered columns to a copy of `df`.
///
/// Works identically on training-view, scoring-view and raw CSV rows. If the
/// rows already carry view-materialized engineered columns they must agree
/// with the deriver, otherwise [`PipelineError::FeatureDrift`] is returned.
pub fn derive_features(df: &DataFrame) -> PipelineResult<DataFrame> {
    let derived = compute_features(df)?;
    verify_parity(df, &derived)?;

    let buckets: Vec<Option<&str>> = derived
        .iter()
        .map(|f| f.tenure_bucket.map(|b| b.as_str()))
        .collect();
    let segments: Vec<Option<&str>> = derived
        .iter()
        .map(|f| f.billing_segment.map(|s| s.as_str()))
        .collect();
    let avg_revenue: Vec<Option<f64>> = derived.iter().map(|f| f.avg_revenue_per_month).collect();

    let mut out = df.clone();
    out.with_column(Column::new(TENURE_BUCKET.into(), buckets))?;
    out.with_column(Column::new(BILLING_SEGMENT.into(), segments))?;
    out.with_column(Column::new(AVG_REVENUE_PER_MONTH.into(), avg_revenue))?;
    Ok(out)
}
