//! Tabular store adapter
//!
//! A directory of parquet tables queried through the polars SQL engine. The
//! customer table is stored once; the segmentation views are named queries
//! over it and are expanded on every read. Each query runs in its own
//! [`StoreSession`], created for that query and dropped on every exit path.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use polars::prelude::*;
use polars::sql::SQLContext;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{ChurnConfig, SqlConfig};

use super::error::{PipelineError, PipelineResult};
use super::features::{engineered_select_sql, ENGINEERED_COLUMNS};
use super::loader::load_dataset;
use super::schema::{check_status_not_null, coerce_numeric_columns, validate_schema, CUSTOMER_STATUS, STATUS_CHURNED, STATUS_JOINED, STATUS_STAYED};

/// File holding the persisted view definitions
const VIEWS_FILE: &str = "views.json";
/// Human-readable script of the view definitions
const VIEWS_SCRIPT: &str = "views.sql";

/// The two segments the pipeline depends on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Segment {
    /// Labeled customers (Churned + Stayed)
    ChurnTraining,
    /// Newly joined customers without a label
    JoinScoring,
}

impl Segment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Segment::ChurnTraining => "churn_training",
            Segment::JoinScoring => "join_scoring",
        }
    }

    /// Statuses selected by this segment
    pub fn statuses(&self) -> Vec<String> {
        match self {
            Segment::ChurnTraining => vec![STATUS_CHURNED.to_string(), STATUS_STAYED.to_string()],
            Segment::JoinScoring => vec![STATUS_JOINED.to_string()],
        }
    }

    /// View identifier configured for this segment
    pub fn view_name<'a>(&self, sql: &'a SqlConfig) -> &'a str {
        match self {
            Segment::ChurnTraining => &sql.view_churn,
            Segment::JoinScoring => &sql.view_joined,
        }
    }
}

/// A named status-filter query over the customer table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewDefinition {
    pub name: String,
    pub segment: Segment,
    pub statuses: Vec<String>,
}

fn sql_string(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

impl ViewDefinition {
    pub fn for_segment(segment: Segment, sql: &SqlConfig) -> Self {
        Self {
            name: segment.view_name(sql).to_string(),
            segment,
            statuses: segment.statuses(),
        }
    }

    /// WHERE clause selecting the view's statuses
    pub fn predicate_sql(&self) -> String {
        match self.statuses.as_slice() {
            [single] => format!("\"{}\" = {}", CUSTOMER_STATUS, sql_string(single)),
            many => format!(
                "\"{}\" IN ({})",
                CUSTOMER_STATUS,
                many.iter().map(|s| sql_string(s)).collect::<Vec<_>>().join(", ")
            ),
        }
    }

    /// SELECT statement that materializes the view
    pub fn select_sql(&self, table: &str) -> String {
        format!(
            "SELECT *, {} FROM \"{}\" WHERE {}",
            engineered_select_sql(),
            table,
            self.predicate_sql()
        )
    }

    /// Portable DDL describing the view
    pub fn create_sql(&self, table: &str) -> String {
        format!(
            "CREATE OR REPLACE VIEW \"{}\" AS\n{};",
            self.name,
            self.select_sql(table)
        )
    }
}

/// Both segments; an empty segment is `None`
#[derive(Debug, Default)]
pub struct Segments {
    pub training: Option<DataFrame>,
    pub scoring: Option<DataFrame>,
}

/// A single query scope over the store tables
struct StoreSession {
    ctx: SQLContext,
}

impl StoreSession {
    fn execute(&mut self, sql: &str) -> PipelineResult<DataFrame> {
        debug!(%sql, "Executing store query");
        Ok(self.ctx.execute(sql)?.collect()?)
    }
}

/// Parquet-backed customer store with named segmentation views
#[derive(Debug, Clone)]
pub struct TabularStore {
    dir: PathBuf,
    table_name: String,
    views: BTreeMap<String, ViewDefinition>,
}

impl TabularStore {
    /// Load the customer CSV into a fresh store table and define both views.
    ///
    /// Numeric columns are stored as f64 with unparseable, NaN and negative
    /// charge values already nulled. Replaces any previous table and view definitions in `config.store_dir`.
    pub fn init_from_csv(csv: &Path, config: &ChurnConfig) -> PipelineResult<Self> {
        let df = load_dataset(csv, config.infer_schema_length)?;
        validate_schema(&df, &csv.display().to_string())?;
        check_status_not_null(&df)?;

        // Engineered columns are derived on read, never stored
        let derived: Vec<String> = df
            .get_column_names()
            .iter()
            .map(|c| c.to_string())
            .filter(|c| ENGINEERED_COLUMNS.contains(&c.as_str()))
            .collect();
        let df = if derived.is_empty() { df } else { df.drop_many(derived) };
        let mut df = coerce_numeric_columns(&df)?;

        std::fs::create_dir_all(&config.store_dir)?;
        let mut store = Self {
            dir: config.store_dir.clone(),
            table_name: config.sql.table_name.clone(),
            views: BTreeMap::new(),
        };

        store.write_table(&config.sql.table_name, &mut df)?;
        info!(table = %store.table_name, rows = df.height(), "Wrote customer table");

        store.define_default_views(&config.sql);
        store.save_views()?;
        Ok(store)
    }

    /// Open an initialized store
    pub fn open(config: &ChurnConfig) -> PipelineResult<Self> {
        let mut store = Self {
            dir: config.store_dir.clone(),
            table_name: config.sql.table_name.clone(),
            views: BTreeMap::new(),
        };

        if !store.table_path(&store.table_name).exists() {
            return Err(PipelineError::StoreNotInitialized {
                path: store.dir.clone(),
            });
        }

        let views_path = store.dir.join(VIEWS_FILE);
        if views_path.exists() {
            let raw = std::fs::read_to_string(&views_path)?;
            let views: Vec<ViewDefinition> = serde_json::from_str(&raw)?;
            for view in views {
                store.define_view(view);
            }
        }
        // Configured identifiers always resolve, even for stores created elsewhere
        store.define_default_views(&config.sql);
        Ok(store)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Define (or replace) a view; re-defining the same name is not an error
    pub fn define_view(&mut self, view: ViewDefinition) {
        if self.views.insert(view.name.clone(), view).is_some() {
            debug!("Replaced existing view definition");
        }
    }

    /// Define the `churn_training` and `join_scoring` views
    pub fn define_default_views(&mut self, sql: &SqlConfig) {
        for segment in [Segment::ChurnTraining, Segment::JoinScoring] {
            self.define_view(ViewDefinition::for_segment(segment, sql));
        }
    }

    pub fn view(&self, name: &str) -> Option<&ViewDefinition> {
        self.views.get(name)
    }

    pub fn views(&self) -> impl Iterator<Item = &ViewDefinition> {
        self.views.values()
    }

    /// SELECT statement behind a view
    pub fn view_sql(&self, name: &str) -> PipelineResult<String> {
        self.views
            .get(name)
            .map(|v| v.select_sql(&self.table_name))
            .ok_or_else(|| PipelineError::UnknownView(name.to_string()))
    }

    /// DDL script for all views, in name order
    pub fn views_script(&self) -> String {
        self.views
            .values()
            .map(|v| v.create_sql(&self.table_name))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    fn save_views(&self) -> PipelineResult<()> {
        let views: Vec<&ViewDefinition> = self.views.values().collect();
        std::fs::write(self.dir.join(VIEWS_FILE), serde_json::to_string_pretty(&views)?)?;
        std::fs::write(self.dir.join(VIEWS_SCRIPT), self.views_script() + "\n")?;
        Ok(())
    }

    fn table_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.parquet", name))
    }

    /// Open a query scope with the base table and every view registered
    fn session(&self) -> PipelineResult<StoreSession> {
        let mut ctx = SQLContext::new();
        let table = LazyFrame::scan_parquet(self.table_path(&self.table_name), Default::default())?;
        ctx.register(&self.table_name, table);

        for view in self.views.values() {
            let lf = ctx.execute(&view.select_sql(&self.table_name))?;
            ctx.register(&view.name, lf);
        }

        Ok(StoreSession { ctx })
    }

    /// Run an arbitrary SQL query against the store
    pub fn query(&self, sql: &str) -> PipelineResult<DataFrame> {
        let mut session = self.session()?;
        session.execute(sql)
    }

    /// Materialize a view by name.
    ///
    /// Fails with `SchemaMismatch` when the table lacks a required column and
    /// with `EmptyResultSet` when no rows match.
    pub fn fetch_view(&self, name: &str) -> PipelineResult<DataFrame> {
        let sql = self.view_sql(name)?;
        self.validate_table()?;

        let df = self.query(&sql)?;
        if df.height() == 0 {
            return Err(PipelineError::EmptyResultSet {
                view: name.to_string(),
            });
        }

        info!(view = name, rows = df.height(), "Materialized view");
        Ok(df)
    }

    /// Materialize the view configured for `segment`
    pub fn fetch_segment(&self, segment: Segment, sql: &SqlConfig) -> PipelineResult<DataFrame> {
        self.fetch_view(segment.view_name(sql))
    }

    /// Materialize both segments.
    ///
    /// An empty segment is logged and returned as `None`; the call only fails
    /// when both are empty.
    pub fn fetch_segments(&self, sql: &SqlConfig) -> PipelineResult<Segments> {
        let mut segments = Segments::default();

        for segment in [Segment::ChurnTraining, Segment::JoinScoring] {
            let rows = match self.fetch_segment(segment, sql) {
                Ok(df) => Some(df),
                Err(PipelineError::EmptyResultSet { view }) => {
                    warn!(view = %view, segment = segment.as_str(), "View returned no rows");
                    None
                }
                Err(e) => return Err(e),
            };
            match segment {
                Segment::ChurnTraining => segments.training = rows,
                Segment::JoinScoring => segments.scoring = rows,
            }
        }

        if segments.training.is_none() && segments.scoring.is_none() {
            return Err(PipelineError::EmptyResultSet {
                view: format!("{} and {}", sql.view_churn, sql.view_joined),
            });
        }
        Ok(segments)
    }

    /// Every row of the customer table
    pub fn fetch_table(&self) -> PipelineResult<DataFrame> {
        let df = self.read_table(&self.table_name)?;
        validate_schema(&df, &self.table_name)?;
        Ok(df)
    }

    fn validate_table(&self) -> PipelineResult<()> {
        let schema = LazyFrame::scan_parquet(self.table_path(&self.table_name), Default::default())?
            .collect_schema()?;
        let missing: Vec<String> = super::schema::REQUIRED_COLUMNS
            .iter()
            .filter(|c| schema.get(c).is_none())
            .map(|c| c.to_string())
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(PipelineError::SchemaMismatch {
                table: self.table_name.clone(),
                missing,
            })
        }
    }

    /// Read a stored table by name
    pub fn read_table(&self, name: &str) -> PipelineResult<DataFrame> {
        let path = self.table_path(name);
        if !path.exists() {
            return Err(PipelineError::StoreNotInitialized { path });
        }
        Ok(LazyFrame::scan_parquet(path, Default::default())?.collect()?)
    }

    /// Replace a table, writing the new file before swapping it in
    pub fn write_table(&self, name: &str, df: &mut DataFrame) -> PipelineResult<()> {
        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)?;
        ParquetWriter::new(tmp.as_file_mut()).finish(df)?;
        tmp.as_file().sync_all()?;
        tmp.persist(self.table_path(name))
            .map_err(|e| PipelineError::Io(e.error))?;

        info!(table = name, rows = df.height(), "Replaced store table");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_predicate_sql() {
        let sql = SqlConfig::default();
        let training = ViewDefinition::for_segment(Segment::ChurnTraining, &sql);
        let scoring = ViewDefinition::for_segment(Segment::JoinScoring, &sql);

        assert_eq!(training.name, "vw_ChurnData");
        assert_eq!(
            training.predicate_sql(),
            "\"Customer_Status\" IN ('Churned', 'Stayed')"
        );
        assert_eq!(scoring.name, "vw_JoinData");
        assert_eq!(scoring.predicate_sql(), "\"Customer_Status\" = 'Joined'");
    }

    #[test]
    fn test_sql_string_escapes_quotes() {
        assert_eq!(sql_string("O'Brien"), "'O''Brien'");
    }

    #[test]
    fn test_create_sql_names_view() {
        let view = ViewDefinition::for_segment(Segment::JoinScoring, &SqlConfig::default());
        let ddl = view.create_sql("prod_Churn");
        assert!(ddl.starts_with("CREATE OR REPLACE VIEW \"vw_JoinData\" AS"));
        assert!(ddl.contains("FROM \"prod_Churn\""));
    }
}
