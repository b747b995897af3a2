//! churnflow: Customer Churn Pipeline Library
//!
//! Segments a customer table into labeled and newly joined customers,
//! derives features, trains a logistic regression churn model, scores new
//! customers and ranks features by global impact.

pub mod cli;
pub mod config;
pub mod pipeline;
pub mod report;
pub mod utils;
