//! Integration tests for the tabular store adapter

use churnflow::pipeline::schema::string_values;
use churnflow::pipeline::*;
use polars::prelude::*;

#[path = "common/mod.rs"]
mod common;

use common::*;

fn statuses(df: &DataFrame) -> Vec<String> {
    string_values(df, "Customer_Status")
        .unwrap()
        .into_iter()
        .flatten()
        .collect()
}

#[test]
fn test_views_segment_by_status() {
    let mut df = create_customer_dataframe(100, 5);
    let (temp_dir, csv_path) = create_temp_csv(&mut df);
    let config = test_config(temp_dir.path(), &csv_path);

    let store = TabularStore::init_from_csv(&csv_path, &config).unwrap();
    let segments = store.fetch_segments(&config.sql).unwrap();

    let training = segments.training.unwrap();
    let scoring = segments.scoring.unwrap();
    assert_eq!(training.height() + scoring.height(), 100);
    assert_eq!(scoring.height(), 10);
    assert!(statuses(&training).iter().all(|s| s == "Churned" || s == "Stayed"));
    assert!(statuses(&scoring).iter().all(|s| s == "Joined"));
}

#[test]
fn test_empty_view_is_reported_not_fatal() {
    let mut df = create_two_row_dataframe();
    let (temp_dir, csv_path) = create_temp_csv(&mut df);
    let config = test_config(temp_dir.path(), &csv_path);

    let store = TabularStore::init_from_csv(&csv_path, &config).unwrap();

    let err = store.fetch_view(&config.sql.view_joined).unwrap_err();
    assert!(matches!(err, PipelineError::EmptyResultSet { .. }));

    let segments = store.fetch_segments(&config.sql).unwrap();
    assert_eq!(segments.training.map(|df| df.height()), Some(2));
    assert!(segments.scoring.is_none());
}

#[test]
fn test_missing_required_column_is_schema_mismatch() {
    let mut df = create_two_row_dataframe().drop("Monthly_Charge").unwrap();
    let (temp_dir, csv_path) = create_temp_csv(&mut df);
    let config = test_config(temp_dir.path(), &csv_path);

    let err = TabularStore::init_from_csv(&csv_path, &config).unwrap_err();
    match err {
        PipelineError::SchemaMismatch { missing, .. } => assert_eq!(missing, vec!["Monthly_Charge"]),
        other => panic!("Expected SchemaMismatch, got {:?}", other),
    }
}

#[test]
fn test_null_status_rejected_at_ingest() {
    let mut df = df! {
        "Customer_ID" => ["a", "b"],
        "Tenure_in_Months" => [1i64, 2],
        "Monthly_Charge" => [20.0f64, 30.0],
        "Total_Revenue" => [20.0f64, 60.0],
        "Customer_Status" => [Some("Stayed"), None],
    }
    .unwrap();
    let (temp_dir, csv_path) = create_temp_csv(&mut df);
    let config = test_config(temp_dir.path(), &csv_path);

    let err = TabularStore::init_from_csv(&csv_path, &config).unwrap_err();
    assert!(matches!(err, PipelineError::NullStatus { rows: 1, .. }));
}

#[test]
fn test_dirty_charges_match_deriver_in_views() {
    let cases = [
        // Unparseable charge makes the CSV column a string column
        "a,3,20,60,Stayed\nb,10,n/a,100,Stayed\nc,30,80,2400,Churned\nd,12,NaN,300,Churned\ne,5,50,250,Joined\n",
        // Numeric column holding a NaN charge and a NaN tenure
        "a,3,20,60,Stayed\nb,NaN,45,100,Stayed\nc,30,80,2400,Churned\nd,12,NaN,300,Churned\ne,5,50,250,Joined\n",
    ];

    for rows in cases {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let csv_path = temp_dir.path().join("Customer_Data.csv");
        let csv = format!(
            "Customer_ID,Tenure_in_Months,Monthly_Charge,Total_Revenue,Customer_Status\n{}",
            rows
        );
        std::fs::write(&csv_path, csv).unwrap();
        let config = test_config(temp_dir.path(), &csv_path);

        let store = TabularStore::init_from_csv(&csv_path, &config).unwrap();
        let training = store.fetch_view(&config.sql.view_churn).unwrap();
        assert_eq!(training.height(), 4);

        // Materialized view columns agree with the per-row rules
        let derived = derive_features(&training).unwrap();
        let segments = string_values(&derived, "Billing_Segment").unwrap();
        assert_eq!(segments[0].as_deref(), Some("Low"));
        assert_eq!(segments[2].as_deref(), Some("High"));
        assert_eq!(segments[3], None);
    }
}

#[test]
fn test_open_requires_initialized_store() {
    let temp_dir = tempfile::TempDir::new().unwrap();
    let config = test_config(temp_dir.path(), &temp_dir.path().join("none.csv"));

    let err = TabularStore::open(&config).unwrap_err();
    assert!(matches!(err, PipelineError::StoreNotInitialized { .. }));
}

#[test]
fn test_reopen_and_redefine_views() {
    let mut df = create_customer_dataframe(50, 9);
    let (temp_dir, csv_path) = create_temp_csv(&mut df);
    let config = test_config(temp_dir.path(), &csv_path);

    TabularStore::init_from_csv(&csv_path, &config).unwrap();
    assert!(config.store_dir.join("views.sql").exists());

    let mut store = TabularStore::open(&config).unwrap();
    assert_eq!(store.views().count(), 2);

    // Re-defining a view replaces it
    store.define_default_views(&config.sql);
    assert_eq!(store.views().count(), 2);

    let joined_sql = store.view_sql("vw_JoinData").unwrap();
    assert!(joined_sql.contains("'Joined'"));
    assert!(joined_sql.contains("Tenure_Bucket"));

    let err = store.fetch_view("vw_Unknown").unwrap_err();
    assert!(matches!(err, PipelineError::UnknownView(_)));

    assert_eq!(store.fetch_table().unwrap().height(), 50);
}

#[test]
fn test_write_table_replaces_contents() {
    let mut df = create_two_row_dataframe();
    let (temp_dir, csv_path) = create_temp_csv(&mut df);
    let config = test_config(temp_dir.path(), &csv_path);
    let store = TabularStore::init_from_csv(&csv_path, &config).unwrap();

    let mut first = df! { "Customer_ID" => ["a", "b", "c"] }.unwrap();
    store.write_table("predictions", &mut first).unwrap();
    let mut second = df! { "Customer_ID" => ["z"] }.unwrap();
    store.write_table("predictions", &mut second).unwrap();

    assert_eq!(store.read_table("predictions").unwrap().height(), 1);

    let joined = store
        .query("SELECT \"Customer_ID\" FROM \"prod_Churn\" WHERE \"Tenure_in_Months\" > 10")
        .unwrap();
    assert_eq!(joined.height(), 1);
}
