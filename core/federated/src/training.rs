// forge/core/federated/src/training.rs

//! Local training: one participant fits a logistic-regression model on its
//! own partition. Every failure mode ends in an absent model, never an error.

use crate::dataset::Record;
use crate::model::{LocalModel, ModelParameters};
use crate::schema::FeatureSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

/// Gradient-descent hyperparameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub learning_rate: f64,
    pub max_iter: usize,
    /// Stop once every gradient component is below this
    pub tolerance: f64,
    /// L2 penalty on coefficients (not intercepts)
    pub l2: f64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.5,
            max_iter: 1000,
            tolerance: 1e-6,
            l2: 1e-3,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrainingOutcome {
    pub model: Option<LocalModel>,
    /// Training-set accuracy in percent; diagnostic only
    pub score: f64,
}

impl TrainingOutcome {
    pub fn absent() -> Self {
        Self {
            model: None,
            score: 0.0,
        }
    }
}

/// Binary logistic regression on `targets` in {0, 1}
struct BinaryFit {
    weights: Vec<f64>,
    bias: f64,
    converged: bool,
    iterations: usize,
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

fn fit_binary(x: &[Vec<f64>], targets: &[f64], config: &TrainingConfig) -> BinaryFit {
    let n_samples = x.len();
    let n_features = x.first().map_or(0, Vec::len);
    let n = n_samples as f64;

    let mut weights = vec![0.0; n_features];
    let mut bias = 0.0;

    for iteration in 1..=config.max_iter {
        let mut weight_grad = vec![0.0; n_features];
        let mut bias_grad = 0.0;

        for (row, target) in x.iter().zip(targets) {
            let z = bias + row.iter().zip(&weights).map(|(v, w)| v * w).sum::<f64>();
            let error = sigmoid(z) - target;
            bias_grad += error;
            for (grad, v) in weight_grad.iter_mut().zip(row) {
                *grad += error * v;
            }
        }

        bias_grad /= n;
        for (grad, w) in weight_grad.iter_mut().zip(&weights) {
            *grad = *grad / n + config.l2 * w;
        }

        bias -= config.learning_rate * bias_grad;
        for (w, grad) in weights.iter_mut().zip(&weight_grad) {
            *w -= config.learning_rate * grad;
        }

        if bias_grad.abs() < config.tolerance && weight_grad.iter().all(|g| g.abs() < config.tolerance) {
            return BinaryFit {
                weights,
                bias,
                converged: true,
                iterations: iteration,
            };
        }
    }

    BinaryFit {
        weights,
        bias,
        converged: false,
        iterations: config.max_iter,
    }
}

/// One participant in a federated round
#[derive(Debug, Clone)]
pub struct TrainingUnit {
    id: usize,
    config: TrainingConfig,
}

impl TrainingUnit {
    pub fn new(id: usize, config: TrainingConfig) -> Self {
        Self { id, config }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn train(&self, partition: &[Record], schema: &FeatureSchema) -> TrainingOutcome {
        if partition.is_empty() {
            warn!(unit = self.id, "empty partition, skipping local training");
            return TrainingOutcome::absent();
        }

        let labels: Vec<String> = partition
            .iter()
            .map(|r| r.outcome.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if labels.len() < 2 {
            warn!(
                unit = self.id,
                labels = ?labels,
                "fewer than two distinct outcomes, skipping local training"
            );
            return TrainingOutcome::absent();
        }

        let x = schema.encode_all(partition);
        let label_index: Vec<usize> = partition
            .iter()
            .map(|r| labels.binary_search(&r.outcome).unwrap_or(0))
            .collect();

        // Binary: one row scoring labels[1]. Otherwise one-vs-rest per label.
        let positive: Vec<usize> = if labels.len() == 2 { vec![1] } else { (0..labels.len()).collect() };

        let mut coefficients = Vec::with_capacity(positive.len());
        let mut intercepts = Vec::with_capacity(positive.len());
        for class in positive {
            let targets: Vec<f64> = label_index.iter().map(|&l| f64::from(u8::from(l == class))).collect();
            let fit = fit_binary(&x, &targets, &self.config);
            if fit.converged {
                debug!(unit = self.id, class = %labels[class], iterations = fit.iterations, "converged");
            } else {
                debug!(unit = self.id, class = %labels[class], "reached max_iter without meeting tolerance");
            }
            coefficients.push(fit.weights);
            intercepts.push(fit.bias);
        }

        let parameters = ModelParameters {
            coefficients,
            intercepts,
        };
        if !parameters.is_finite() {
            warn!(unit = self.id, "training produced non-finite parameters");
            return TrainingOutcome::absent();
        }

        let correct = x
            .iter()
            .zip(&label_index)
            .filter(|(row, &label)| parameters.predict_index(row) == label)
            .count();
        let score = correct as f64 / partition.len() as f64 * 100.0;
        info!(unit = self.id, rows = partition.len(), labels = labels.len(), score, "local model trained");

        TrainingOutcome {
            model: Some(LocalModel { parameters, labels }),
            score,
        }
    }
}
