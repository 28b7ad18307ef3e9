//! K-Means borrower segmentation

use crate::error::PipelineError;
use crate::schema::Segment;
use linfa::prelude::*;
use linfa_clustering::KMeans;
use linfa_nn::distance::L2Dist;
use ndarray::{Array1, Array2, ArrayView1};
use rand::rngs::StdRng;
use rand::SeedableRng;

/// Settings for fitting the segmentation model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentationParams {
    pub max_iters: u64,
    pub tolerance: f64,
    pub seed: u64,
}

impl Default for SegmentationParams {
    fn default() -> Self {
        Self {
            max_iters: 300,
            tolerance: 1e-4,
            seed: 42,
        }
    }
}

/// A cluster id together with its static label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentAssignment {
    pub cluster: usize,
    pub segment: Segment,
}

impl SegmentAssignment {
    pub fn label(&self) -> &'static str {
        self.segment.label()
    }
}

/// Fitted 4-cluster model over standardised feature vectors.
#[derive(Debug)]
pub struct SegmentModel {
    /// Fitted K-Means model from linfa
    pub model: KMeans<f64, L2Dist>,
    /// Cluster assignments for training data
    pub labels: Array1<usize>,
    /// Cluster centroids in standardised space
    pub centroids: Array2<f64>,
    /// Within-cluster sum of squares (inertia)
    pub inertia: f64,
}

impl SegmentModel {
    pub fn n_features(&self) -> usize {
        self.centroids.ncols()
    }

    /// Assign one standardised feature vector to its nearest centroid.
    pub fn assign(&self, features: &[f64]) -> crate::Result<SegmentAssignment> {
        let row = Array2::from_shape_vec((1, features.len()), features.to_vec())?;
        self.assign_all(&row)?
            .pop()
            .ok_or_else(|| anyhow::anyhow!("no segment assigned"))
    }

    /// Assign every row of a standardised matrix through the fitted model.
    pub fn assign_all(&self, features: &Array2<f64>) -> crate::Result<Vec<SegmentAssignment>> {
        if features.ncols() != self.n_features() {
            return Err(PipelineError::SchemaMismatch {
                expected: self.n_features(),
                found: features.ncols(),
            }
            .into());
        }

        let clusters: Array1<usize> = self.model.predict(features);
        clusters
            .iter()
            .map(|&cluster| {
                let segment = Segment::from_cluster(cluster)
                    .ok_or_else(|| anyhow::anyhow!("cluster id {} has no segment label", cluster))?;
                Ok(SegmentAssignment { cluster, segment })
            })
            .collect()
    }

    /// Get cluster sizes
    pub fn cluster_sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0; Segment::COUNT];
        for &label in self.labels.iter() {
            if label < Segment::COUNT {
                sizes[label] += 1;
            }
        }
        sizes
    }

    /// Mean silhouette coefficient over the first `sample_size` training rows.
    pub fn compute_silhouette_sample(&self, features: &Array2<f64>, sample_size: usize) -> f64 {
        let n_samples = features.nrows().min(sample_size).min(self.labels.len());
        if n_samples < 2 {
            return 0.0;
        }

        let mut silhouette_sum = 0.0;

        for i in 0..n_samples {
            let point = features.row(i);
            let cluster_label = self.labels[i];

            let mut same_cluster_distances = Vec::new();
            let mut other_cluster_distances: Vec<Vec<f64>> = vec![Vec::new(); Segment::COUNT];

            for j in 0..n_samples {
                if i == j {
                    continue;
                }

                let distance = euclidean_distance(&point, &features.row(j));
                let other_label = self.labels[j];

                if other_label == cluster_label {
                    same_cluster_distances.push(distance);
                } else if other_label < Segment::COUNT {
                    other_cluster_distances[other_label].push(distance);
                }
            }

            let a_i = mean(&same_cluster_distances).unwrap_or(0.0);
            let b_i = other_cluster_distances
                .iter()
                .filter_map(|distances| mean(distances))
                .fold(f64::INFINITY, f64::min);

            let silhouette_i = if b_i.is_infinite() || (a_i == 0.0 && b_i == 0.0) {
                0.0
            } else {
                (b_i - a_i) / a_i.max(b_i)
            };

            silhouette_sum += silhouette_i;
        }

        silhouette_sum / n_samples as f64
    }
}

/// Fit the 4-segment K-Means model on standardised features.
///
/// The RNG is seeded so repeated runs over the same data produce the same
/// centroids, and hence the same cluster-id to label mapping.
pub fn fit_segments(features: &Array2<f64>, params: SegmentationParams) -> crate::Result<SegmentModel> {
    let n_clusters = Segment::COUNT;
    if features.nrows() < n_clusters {
        return Err(PipelineError::InsufficientRows {
            required: n_clusters,
            found: features.nrows(),
        }
        .into());
    }

    let n_samples = features.nrows();
    let targets: Array1<usize> = Array1::zeros(n_samples);
    let dataset = Dataset::new(features.clone(), targets);

    let rng = StdRng::seed_from_u64(params.seed);
    let model = KMeans::params_with(n_clusters, rng, L2Dist)
        .max_n_iterations(params.max_iters)
        .tolerance(params.tolerance)
        .fit(&dataset)?;

    let labels: Array1<usize> = model.predict(features);
    let centroids = model.centroids().clone();
    let inertia = compute_inertia(features, &labels, &centroids);

    tracing::debug!(inertia, "segmentation model fitted");

    Ok(SegmentModel {
        model,
        labels,
        centroids,
        inertia,
    })
}

/// Compute within-cluster sum of squares (inertia)
fn compute_inertia(features: &Array2<f64>, labels: &Array1<usize>, centroids: &Array2<f64>) -> f64 {
    labels
        .iter()
        .enumerate()
        .filter(|&(_, &cluster)| cluster < centroids.nrows())
        .map(|(i, &cluster)| euclidean_distance(&features.row(i), &centroids.row(cluster)).powi(2))
        .sum()
}

fn euclidean_distance(point1: &ArrayView1<f64>, point2: &ArrayView1<f64>) -> f64 {
    point1
        .iter()
        .zip(point2.iter())
        .map(|(a, b)| (a - b).powi(2))
        .sum::<f64>()
        .sqrt()
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}
