//! Probability-of-recovery-action scoring with a bagged decision-tree ensemble.
//!
//! Each tree is fitted on a bootstrap sample (and optionally a random feature
//! subspace) drawn from a seeded RNG, so a given seed and training set always
//! produce the same forest. The score of a borrower is the share of trees that
//! vote "needs recovery".

use crate::error::PipelineError;
use linfa::prelude::*;
use linfa_trees::{DecisionTree, SplitQuality};
use ndarray::{Array1, Array2, ArrayView1, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskModelParams {
    /// Number of trees in the ensemble.
    pub n_estimators: usize,
    pub seed: u64,
    pub max_depth: Option<usize>,
    /// Features drawn per tree; `None` gives every tree all features.
    pub max_features: Option<usize>,
}

impl Default for RiskModelParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            seed: 42,
            max_depth: None,
            max_features: None,
        }
    }
}

#[derive(Debug)]
struct Member {
    tree: DecisionTree<f64, usize>,
    /// Training-matrix columns this tree was fitted on, in order.
    columns: Vec<usize>,
}

/// Fitted ensemble classifier.
#[derive(Debug)]
pub struct RiskModel {
    members: Vec<Member>,
    n_features: usize,
    importances: Vec<f64>,
}

impl RiskModel {
    pub fn fit(
        features: &Array2<f64>,
        labels: &Array1<usize>,
        params: RiskModelParams,
    ) -> crate::Result<Self> {
        let (n_samples, n_features) = features.dim();
        if n_samples == 0 {
            return Err(PipelineError::EmptyDataset.into());
        }
        if labels.len() != n_samples {
            anyhow::bail!(
                "label count ({}) does not match feature rows ({})",
                labels.len(),
                n_samples
            );
        }
        if params.n_estimators == 0 {
            anyhow::bail!("ensemble size must be at least 1");
        }
        if let Some(&bad) = labels.iter().find(|&&label| label > 1) {
            anyhow::bail!("risk labels must be binary, found {}", bad);
        }

        let subspace = params
            .max_features
            .map(|k| k.clamp(1, n_features))
            .unwrap_or(n_features);

        let mut rng = StdRng::seed_from_u64(params.seed);
        let mut members = Vec::with_capacity(params.n_estimators);
        let mut importances = vec![0.0; n_features];

        for _ in 0..params.n_estimators {
            let rows: Vec<usize> = (0..n_samples).map(|_| rng.gen_range(0..n_samples)).collect();
            let mut columns = if subspace < n_features {
                rand::seq::index::sample(&mut rng, n_features, subspace).into_vec()
            } else {
                (0..n_features).collect()
            };
            columns.sort_unstable();

            let sample = features.select(Axis(0), &rows).select(Axis(1), &columns);
            let targets = labels.select(Axis(0), &rows);
            let dataset = Dataset::new(sample, targets);

            let tree = DecisionTree::<f64, usize>::params()
                .split_quality(SplitQuality::Gini)
                .max_depth(params.max_depth)
                .fit(&dataset)?;

            for (&column, importance) in columns.iter().zip(tree.feature_importance()) {
                if importance.is_finite() {
                    importances[column] += importance;
                }
            }
            members.push(Member { tree, columns });
        }

        let total: f64 = importances.iter().sum();
        if total > 0.0 {
            importances.iter_mut().for_each(|v| *v /= total);
        }

        tracing::debug!(
            trees = members.len(),
            rows = n_samples,
            features = n_features,
            "risk model fitted"
        );

        Ok(Self {
            members,
            n_features,
            importances,
        })
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn n_estimators(&self) -> usize {
        self.members.len()
    }

    /// Normalised mean impurity decrease per feature column; sums to 1 unless
    /// every tree is a single leaf.
    pub fn feature_importances(&self) -> &[f64] {
        &self.importances
    }

    /// Probability of needing recovery action for every row.
    pub fn predict_proba(&self, features: &Array2<f64>) -> crate::Result<Array1<f64>> {
        if features.ncols() != self.n_features {
            return Err(PipelineError::SchemaMismatch {
                expected: self.n_features,
                found: features.ncols(),
            }
            .into());
        }

        let mut votes = Array1::<f64>::zeros(features.nrows());
        for member in &self.members {
            let view = features.select(Axis(1), &member.columns);
            let predicted: Array1<usize> = member.tree.predict(&view);
            for (vote, &label) in votes.iter_mut().zip(predicted.iter()) {
                if label == 1 {
                    *vote += 1.0;
                }
            }
        }

        Ok(votes / self.members.len() as f64)
    }

    /// Probability for a single feature vector.
    pub fn score(&self, features: &[f64]) -> crate::Result<f64> {
        let row = ArrayView1::from(features).insert_axis(Axis(0)).to_owned();
        let scores = self.predict_proba(&row)?;
        Ok(scores[0])
    }
}
