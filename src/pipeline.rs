//! End-to-end training and scoring.
//!
//! Training freezes the encoding schema, fits the scaler and segmentation on
//! every prepared row, and fits the risk model on a seeded training split so
//! the remaining rows can be used for evaluation. Scoring applies the frozen
//! pieces to new records.

use crate::data::BorrowerRecord;
use crate::error::PipelineError;
use crate::features::{DropReport, EncodingSchema, PreparedBatch, StandardScaler};
use crate::metrics::{self, EvaluationReport};
use crate::risk::{RiskModel, RiskModelParams};
use crate::schema::{self, Segment};
use crate::segmentation::{fit_segments, SegmentModel, SegmentationParams};
use crate::strategy::RecoveryStrategy;
use ndarray::Axis;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineConfig {
    pub risk: RiskModelParams,
    pub segmentation: SegmentationParams,
    /// Share of prepared rows held out for evaluation, in `[0, 1)`.
    pub holdout_ratio: f64,
    /// Score above which a borrower counts as high risk.
    pub threshold: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            risk: RiskModelParams::default(),
            segmentation: SegmentationParams::default(),
            holdout_ratio: 0.2,
            threshold: metrics::DEFAULT_THRESHOLD,
        }
    }
}

/// Diagnostics gathered while training.
#[derive(Debug, Clone)]
pub struct TrainingSummary {
    pub prepared_rows: usize,
    pub dropped: DropReport,
    pub train_rows: usize,
    pub holdout_rows: usize,
    /// `None` when the batch was too small to hold rows out.
    pub evaluation: Option<EvaluationReport>,
    pub cluster_sizes: Vec<usize>,
    pub inertia: f64,
    pub silhouette: f64,
}

/// One borrower's scoring result with the raw values reports show.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredBorrower {
    /// Position of the source record in the scored batch.
    pub source_index: usize,
    pub borrower_id: String,
    pub risk_score: f64,
    pub segment: Segment,
    pub strategy: RecoveryStrategy,
    pub monthly_income: f64,
    pub loan_amount: f64,
    pub num_missed_payments: f64,
    pub emi_to_income_ratio: f64,
}

impl ScoredBorrower {
    pub fn is_high_risk(&self, threshold: f64) -> bool {
        self.risk_score > threshold
    }
}

/// Scored rows plus what preparation dropped.
#[derive(Debug, Clone)]
pub struct ScoringOutcome {
    pub scored: Vec<ScoredBorrower>,
    pub dropped: DropReport,
}

/// Fitted schema, scaler, segmentation and risk model.
#[derive(Debug)]
pub struct RecoveryPipeline {
    schema: EncodingSchema,
    scaler: StandardScaler,
    segments: SegmentModel,
    risk: RiskModel,
    threshold: f64,
}

impl RecoveryPipeline {
    pub fn train(
        records: &[BorrowerRecord],
        config: PipelineConfig,
    ) -> crate::Result<(Self, TrainingSummary)> {
        if !(0.0..1.0).contains(&config.holdout_ratio) {
            anyhow::bail!("holdout ratio must be in [0, 1), got {}", config.holdout_ratio);
        }

        let encoding = EncodingSchema::fit(records)?;
        let batch = encoding.prepare(records)?;
        if batch.is_empty() {
            return Err(PipelineError::EmptyDataset.into());
        }

        let features = batch.matrix()?;
        let labels = batch.binary_targets().ok_or_else(|| {
            anyhow::anyhow!("training data needs a {} value on every row", schema::RECOVERY_STATUS)
        })?;

        let scaler = StandardScaler::fit(&features)?;
        let scaled = scaler.transform(&features)?;
        let segments = fit_segments(&scaled, config.segmentation)?;
        let silhouette = segments.compute_silhouette_sample(&scaled, 100);

        let (train_idx, holdout_idx) =
            split_indices(batch.len(), config.holdout_ratio, config.risk.seed);
        let train_x = features.select(Axis(0), &train_idx);
        let train_y = labels.select(Axis(0), &train_idx);
        let risk = RiskModel::fit(&train_x, &train_y, config.risk)?;

        let evaluation = if holdout_idx.is_empty() {
            None
        } else {
            let holdout_x = features.select(Axis(0), &holdout_idx);
            let holdout_y = labels.select(Axis(0), &holdout_idx);
            let proba = risk.predict_proba(&holdout_x)?;
            Some(metrics::evaluate(&holdout_y, &proba, config.threshold)?)
        };

        let summary = TrainingSummary {
            prepared_rows: batch.len(),
            dropped: batch.dropped.clone(),
            train_rows: train_idx.len(),
            holdout_rows: holdout_idx.len(),
            evaluation,
            cluster_sizes: segments.cluster_sizes(),
            inertia: segments.inertia,
            silhouette,
        };

        tracing::info!(
            rows = summary.prepared_rows,
            dropped = summary.dropped.total(),
            train = summary.train_rows,
            holdout = summary.holdout_rows,
            "pipeline trained"
        );

        Ok((
            Self {
                schema: encoding,
                scaler,
                segments,
                risk,
                threshold: config.threshold,
            },
            summary,
        ))
    }

    pub fn schema(&self) -> &EncodingSchema {
        &self.schema
    }

    pub fn segments(&self) -> &SegmentModel {
        &self.segments
    }

    pub fn risk_model(&self) -> &RiskModel {
        &self.risk
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Prepare and score raw records.
    pub fn score(&self, records: &[BorrowerRecord]) -> crate::Result<ScoringOutcome> {
        let batch = self.schema.prepare(records)?;
        let scored = self.score_prepared(&batch)?;
        Ok(ScoringOutcome {
            scored,
            dropped: batch.dropped,
        })
    }

    pub fn score_prepared(&self, batch: &PreparedBatch) -> crate::Result<Vec<ScoredBorrower>> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }

        let features = batch.matrix()?;
        let scores = self.risk.predict_proba(&features)?;
        let scaled = self.scaler.transform(&features)?;
        let assignments = self.segments.assign_all(&scaled)?;

        let value = |row: usize, feature: &str| batch.value(row, feature).unwrap_or(f64::NAN);

        Ok(batch
            .rows
            .iter()
            .enumerate()
            .map(|(i, row)| ScoredBorrower {
                source_index: row.source_index,
                borrower_id: row.borrower_id.clone(),
                risk_score: scores[i],
                segment: assignments[i].segment,
                strategy: RecoveryStrategy::from_score(scores[i]),
                monthly_income: value(i, schema::MONTHLY_INCOME),
                loan_amount: value(i, schema::LOAN_AMOUNT),
                num_missed_payments: value(i, schema::NUM_MISSED_PAYMENTS),
                emi_to_income_ratio: value(i, schema::EMI_TO_INCOME_RATIO),
            })
            .collect())
    }

    /// The `top` most important features by name, highest first.
    pub fn top_features(&self, top: usize) -> Vec<(String, f64)> {
        let mut ranked: Vec<(String, f64)> = self
            .schema
            .feature_names()
            .iter()
            .cloned()
            .zip(self.risk.feature_importances().iter().copied())
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked.truncate(top);
        ranked
    }
}

/// Borrowers scoring above `threshold`, highest score first.
pub fn high_risk_cases(scored: &[ScoredBorrower], threshold: f64) -> Vec<ScoredBorrower> {
    let mut cases: Vec<ScoredBorrower> = scored
        .iter()
        .filter(|b| b.is_high_risk(threshold))
        .cloned()
        .collect();
    cases.sort_by(|a, b| b.risk_score.total_cmp(&a.risk_score));
    cases
}

/// Count of borrowers per recovery strategy, in severity order.
pub fn strategy_distribution(scored: &[ScoredBorrower]) -> Vec<(RecoveryStrategy, usize)> {
    RecoveryStrategy::ordered()
        .into_iter()
        .map(|strategy| {
            let count = scored.iter().filter(|b| b.strategy == strategy).count();
            (strategy, count)
        })
        .collect()
}

/// Shuffle `0..n` with a seeded RNG and split off a holdout share. Small
/// batches that cannot spare a holdout row train on everything.
fn split_indices(n: usize, holdout_ratio: f64, seed: u64) -> (Vec<usize>, Vec<usize>) {
    let holdout = (n as f64 * holdout_ratio).round() as usize;
    if holdout == 0 || holdout >= n {
        return ((0..n).collect(), Vec::new());
    }

    let mut indices: Vec<usize> = (0..n).collect();
    indices.shuffle(&mut StdRng::seed_from_u64(seed));
    let train = indices.split_off(holdout);
    (train, indices)
}
