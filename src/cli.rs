//! Command-line interface definitions and argument parsing

use crate::pipeline::PipelineConfig;
use crate::risk::RiskModelParams;
use crate::segmentation::SegmentationParams;
use clap::Parser;

/// Loan recovery scoring: segment borrowers, score default risk and assign
/// recovery strategies
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the labelled training CSV file
    #[arg(short, long, default_value = "loans.csv")]
    pub input: String,

    /// CSV of borrowers to score (defaults to the training file)
    #[arg(short, long)]
    pub score: Option<String>,

    /// Number of trees in the risk ensemble
    #[arg(long, default_value = "100")]
    pub estimators: usize,

    /// Random seed for tree bagging, the holdout split and K-Means
    #[arg(long, default_value = "42")]
    pub seed: u64,

    /// Maximum depth of each tree (unlimited when omitted)
    #[arg(long)]
    pub max_depth: Option<usize>,

    /// Features sampled per tree (all when omitted)
    #[arg(long)]
    pub max_features: Option<usize>,

    /// Share of training rows held out for evaluation
    #[arg(long, default_value = "0.2")]
    pub holdout: f64,

    /// Decision threshold for evaluation and high-risk selection
    #[arg(short, long, default_value = "0.5")]
    pub threshold: f64,

    /// Maximum iterations for K-Means algorithm
    #[arg(long, default_value = "300")]
    pub max_iters: u64,

    /// Tolerance for K-Means convergence
    #[arg(long, default_value = "1e-4")]
    pub tolerance: f64,

    /// Generate the daily recovery report through the LLM
    #[arg(short, long)]
    pub report: bool,

    /// Explain one borrower's score and suggest actions through the LLM
    #[arg(short, long, value_name = "BORROWER_ID")]
    pub explain: Option<String>,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    /// Check value ranges clap cannot express and build the pipeline config.
    pub fn pipeline_config(&self) -> crate::Result<PipelineConfig> {
        if self.estimators == 0 {
            anyhow::bail!("--estimators must be at least 1");
        }
        if !(0.0..1.0).contains(&self.holdout) {
            anyhow::bail!("--holdout must be in [0, 1), got {}", self.holdout);
        }
        if !(0.0..=1.0).contains(&self.threshold) {
            anyhow::bail!("--threshold must be in [0, 1], got {}", self.threshold);
        }
        if self.tolerance <= 0.0 {
            anyhow::bail!("--tolerance must be positive");
        }

        Ok(PipelineConfig {
            risk: RiskModelParams {
                n_estimators: self.estimators,
                seed: self.seed,
                max_depth: self.max_depth,
                max_features: self.max_features,
            },
            segmentation: SegmentationParams {
                max_iters: self.max_iters,
                tolerance: self.tolerance,
                seed: self.seed,
            },
            holdout_ratio: self.holdout,
            threshold: self.threshold,
        })
    }

    /// File to score: `--score` when given, otherwise the training input.
    pub fn score_path(&self) -> &str {
        self.score.as_deref().unwrap_or(&self.input)
    }
}
