//! Report module - terminal summaries and JSON exports

pub mod importance_export;
pub mod summary;

pub use importance_export::*;
pub use summary::*;
