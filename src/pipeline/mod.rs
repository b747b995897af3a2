//! Pipeline module - segmentation, feature derivation, training and scoring

pub mod artifact;
pub mod error;
pub mod explain;
pub mod features;
pub mod loader;
pub mod metrics;
pub mod missing;
pub mod model;
pub mod preprocess;
pub mod schema;
pub mod score;
pub mod store;
pub mod target;
pub mod train;

pub use artifact::{PipelineArtifact, TrainingMetadata, ARTIFACT_FORMAT_VERSION};
pub use error::{PipelineError, PipelineResult};
pub use explain::{explain_frame, load_reference_frame, FeatureImportance, GlobalExplainer, ImportanceReport};
pub use features::{derive_features, BillingSegment, EngineeredFeatures, TenureBucket};
pub use loader::{load_dataset, save_dataset};
pub use metrics::{evaluate, roc_auc, stratified_split, ConfusionCounts, EvaluationMetrics};
pub use missing::analyze_missing_values;
pub use model::{FitReport, FitWarning, Fittable, FittedLogistic, LogisticRegression, Scorable};
pub use preprocess::{ApplyStats, DesignMatrix, FittedPreprocessor, Preprocessor};
pub use score::{load_scoring_frame, save_predictions_to_store, write_predictions, PredictionRecord, ScoredFrame, Scorer, ScoringSource};
pub use store::{Segment, Segments, TabularStore, ViewDefinition};
pub use target::StatusMapping;
pub use train::{fit_pipeline, load_training_frame, train, TrainingOutcome};
