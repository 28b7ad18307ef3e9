//! Typed failures that callers may want to match on.
//!
//! Everything else in the crate flows through [`crate::Result`]; these variants
//! are wrapped into `anyhow::Error` and can be recovered with `downcast_ref`.

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum PipelineError {
    /// A feature vector did not have the width the fitted model expects.
    #[error("schema mismatch: expected {expected} features, found {found}")]
    SchemaMismatch { expected: usize, found: usize },

    #[error("OPENROUTER_API_KEY environment variable not set")]
    MissingApiKey,

    #[error("invalid configuration value for {key}: {value}")]
    InvalidConfig { key: &'static str, value: String },

    #[error("no usable borrower records remain after preparation")]
    EmptyDataset,

    #[error("need at least {required} rows, found {found}")]
    InsufficientRows { required: usize, found: usize },

    #[error("required column '{0}' is missing from the input")]
    MissingColumn(String),
}
