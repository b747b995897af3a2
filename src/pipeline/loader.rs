//! Dataset loader and writer for CSV and Parquet files

use std::path::Path;

use polars::prelude::*;
use tracing::info;

use super::error::{PipelineError, PipelineResult};

fn file_extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase()
}

/// Load a dataset from a file (CSV or Parquet based on extension)
///
/// # Arguments
/// * `path` - Input file
/// * `infer_schema_length` - Rows used for CSV type inference; 0 means full scan
pub fn load_dataset(path: &Path, infer_schema_length: usize) -> PipelineResult<DataFrame> {
    if !path.exists() {
        return Err(PipelineError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("input file not found: {}", path.display()),
        )));
    }

    let schema_length = if infer_schema_length == 0 {
        None
    } else {
        Some(infer_schema_length)
    };

    let lf = match file_extension(path).as_str() {
        "csv" => LazyCsvReader::new(path)
            .with_infer_schema_length(schema_length)
            .finish()?,
        "parquet" => LazyFrame::scan_parquet(path, Default::default())?,
        other => {
            return Err(PipelineError::InvalidData(format!(
                "unsupported file format '{}'; supported formats: csv, parquet",
                other
            )))
        }
    };

    let df = lf.collect()?;
    info!(path = %path.display(), rows = df.height(), cols = df.width(), "Loaded dataset");
    Ok(df)
}

/// Save dataset to file (CSV or Parquet based on extension)
pub fn save_dataset(df: &mut DataFrame, path: &Path) -> PipelineResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    match file_extension(path).as_str() {
        "csv" => {
            let mut file = std::fs::File::create(path)?;
            CsvWriter::new(&mut file).finish(df)?;
        }
        "parquet" => {
            let file = std::fs::File::create(path)?;
            ParquetWriter::new(file).finish(df)?;
        }
        other => {
            return Err(PipelineError::InvalidData(format!(
                "unsupported output format '{}'; supported formats: csv, parquet",
                other
            )))
        }
    }

    info!(path = %path.display(), rows = df.height(), "Saved dataset");
    Ok(())
}
