//! Shared test utilities and fixture generators

use churnflow::config::ChurnConfig;
use polars::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const CONTRACTS: [&str; 3] = ["Month-to-Month", "One Year", "Two Year"];
const INTERNET_TYPES: [&str; 3] = ["Fiber Optic", "Cable", "DSL"];
const PAYMENT_METHODS: [&str; 3] = ["Credit Card", "Bank Withdrawal", "Mailed Check"];

/// Synthetic customer table with a learnable churn signal.
///
/// Every tenth row is a newly joined customer. Churn is more likely for
/// short tenure, month-to-month contracts and high monthly charges. Some
/// `Age` and `Internet_Type` values are missing.
pub fn create_customer_dataframe(rows: usize, seed: u64) -> DataFrame {
    let mut rng = StdRng::seed_from_u64(seed);

    let mut ids = Vec::with_capacity(rows);
    let mut gender = Vec::with_capacity(rows);
    let mut age: Vec<Option<i64>> = Vec::with_capacity(rows);
    let mut referrals = Vec::with_capacity(rows);
    let mut tenure = Vec::with_capacity(rows);
    let mut contract = Vec::with_capacity(rows);
    let mut internet: Vec<Option<&str>> = Vec::with_capacity(rows);
    let mut payment = Vec::with_capacity(rows);
    let mut monthly = Vec::with_capacity(rows);
    let mut total_charges = Vec::with_capacity(rows);
    let mut total_revenue = Vec::with_capacity(rows);
    let mut status = Vec::with_capacity(rows);
    let mut category: Vec<Option<&str>> = Vec::with_capacity(rows);

    for i in 0..rows {
        let joined = i % 10 == 9;
        let t: i64 = if joined {
            rng.gen_range(1..=6)
        } else {
            rng.gen_range(1..=72)
        };
        let c = CONTRACTS[rng.gen_range(0..3)];
        let m: f64 = (rng.gen_range(18.0..120.0f64) * 100.0).round() / 100.0;
        let charges = (m * t as f64 * 100.0).round() / 100.0;

        let logit = 1.0 - 0.06 * t as f64
            + if c == "Month-to-Month" { 1.5 } else { -1.0 }
            + 0.02 * (m - 65.0);
        let p = 1.0 / (1.0 + (-logit).exp());
        let s = if joined {
            "Joined"
        } else if rng.gen::<f64>() < p {
            "Churned"
        } else {
            "Stayed"
        };

        ids.push(format!("{:05}-CUST", i));
        gender.push(if rng.gen_bool(0.5) { "Male" } else { "Female" });
        age.push(if rng.gen_bool(0.1) { None } else { Some(rng.gen_range(19..80)) });
        referrals.push(rng.gen_range(0..10i64));
        tenure.push(t);
        contract.push(c);
        internet.push(if rng.gen_bool(0.15) {
            None
        } else {
            Some(INTERNET_TYPES[rng.gen_range(0..3)])
        });
        payment.push(PAYMENT_METHODS[rng.gen_range(0..3)]);
        monthly.push(m);
        total_charges.push(charges);
        total_revenue.push(((charges + rng.gen_range(0.0..50.0)) * 100.0).round() / 100.0);
        status.push(s);
        category.push(if s == "Churned" { Some("Competitor") } else { None });
    }

    df! {
        "Customer_ID" => ids,
        "Gender" => gender,
        "Age" => age,
        "Number_of_Referrals" => referrals,
        "Tenure_in_Months" => tenure,
        "Contract" => contract,
        "Internet_Type" => internet,
        "Payment_Method" => payment,
        "Monthly_Charge" => monthly,
        "Total_Charges" => total_charges,
        "Total_Revenue" => total_revenue,
        "Customer_Status" => status,
        "Churn_Category" => category,
    }
    .unwrap()
}

/// The two-row scenario: a new low-paying customer and a long-term high-paying one
pub fn create_two_row_dataframe() -> DataFrame {
    df! {
        "Customer_ID" => ["c1", "c2"],
        "Tenure_in_Months" => [3i64, 30],
        "Monthly_Charge" => [20.0f64, 80.0],
        "Total_Revenue" => [60.0f64, 2400.0],
        "Customer_Status" => ["Stayed", "Churned"],
    }
    .unwrap()
}

/// Rows sitting exactly on the bucket and segment boundaries
pub fn create_boundary_dataframe() -> DataFrame {
    df! {
        "Customer_ID" => ["b0", "b1", "b2", "b3", "b4", "b5", "b6"],
        "Tenure_in_Months" => [6i64, 7, 24, 25, 0, 12, 48],
        "Monthly_Charge" => [30.0f64, 70.0, 70.01, 29.99, 50.0, -5.0, 100.0],
        "Total_Revenue" => [180.0f64, 490.0, 1680.24, 749.75, 0.0, 240.0, 4800.0],
        "Customer_Status" => ["Stayed", "Churned", "Stayed", "Churned", "Joined", "Stayed", "Joined"],
    }
    .unwrap()
}

/// Write `df` as CSV into a fresh temporary directory
pub fn create_temp_csv(df: &mut DataFrame) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let csv_path = temp_dir.path().join("Customer_Data.csv");
    write_csv(df, &csv_path);
    (temp_dir, csv_path)
}

pub fn write_csv(df: &mut DataFrame, path: &Path) {
    let mut file = std::fs::File::create(path).unwrap();
    CsvWriter::new(&mut file).finish(df).unwrap();
}

/// Configuration with every path inside `dir`
pub fn test_config(dir: &Path, data_path: &Path) -> ChurnConfig {
    ChurnConfig {
        data_path: data_path.to_path_buf(),
        store_dir: dir.join("store"),
        pred_out_path: dir.join("predictions.csv"),
        model_path: dir.join("artifacts").join("churn_model.json"),
        reports_dir: dir.join("reports"),
        global_importance_path: dir.join("reports").join("global_importance.json"),
        ..ChurnConfig::default()
    }
}
