//! RecoveryForge: loan recovery scoring for a lending portfolio
//!
//! Loads borrower records from CSV, derives and encodes features, segments
//! borrowers with K-Means, scores default risk with a bagged decision-tree
//! ensemble and maps each score to a recovery strategy. An optional LLM client
//! explains individual scores and drafts the daily recovery report.

pub mod cli;
pub mod config;
pub mod data;
pub mod error;
pub mod features;
pub mod llm;
pub mod metrics;
pub mod pipeline;
pub mod report;
pub mod risk;
pub mod schema;
pub mod segmentation;
pub mod strategy;
pub mod telemetry;

pub use cli::Args;
pub use config::LlmConfig;
pub use data::{load_records, read_records, BorrowerRecord};
pub use error::PipelineError;
pub use features::{DropReport, EncodingSchema, PreparedBatch, StandardScaler};
pub use llm::{ChatClient, LlmOutcome, OpenRouterClient};
pub use pipeline::{
    high_risk_cases, strategy_distribution, PipelineConfig, RecoveryPipeline, ScoredBorrower,
};
pub use report::{generate_recovery_report, RecoveryReport};
pub use schema::Segment;
pub use strategy::{assign_recovery_strategy, RecoveryStrategy};

/// Common result type used throughout the application
pub type Result<T> = anyhow::Result<T>;
