// forge/core/federated/src/model.rs

use forge_primitives::{keccak256, Hash};
use serde::{Deserialize, Serialize};

/// Linear decision functions: one coefficient row and intercept per function.
///
/// A binary label set has a single row scoring the second label; `k > 2`
/// labels have `k` one-vs-rest rows in label order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelParameters {
    pub coefficients: Vec<Vec<f64>>,
    pub intercepts: Vec<f64>,
}

#[derive(Serialize)]
struct CanonicalForm<'a> {
    coef: &'a [Vec<f64>],
    intercept: &'a [f64],
}

impl ModelParameters {
    /// `(rows, width)` when every row has the same width and an intercept
    pub fn shape(&self) -> Option<(usize, usize)> {
        let rows = self.coefficients.len();
        let width = self.coefficients.first().map_or(0, Vec::len);
        let consistent = rows > 0
            && self.intercepts.len() == rows
            && self.coefficients.iter().all(|row| row.len() == width);
        consistent.then_some((rows, width))
    }

    pub fn is_finite(&self) -> bool {
        self.coefficients.iter().flatten().all(|v| v.is_finite())
            && self.intercepts.iter().all(|v| v.is_finite())
    }

    /// `{"coef":[[..]],"intercept":[..]}` with shortest round-trip floats
    pub fn canonical_json(&self) -> String {
        let form = CanonicalForm {
            coef: &self.coefficients,
            intercept: &self.intercepts,
        };
        // Only f64 vectors; NaN/inf serialize as null
        serde_json::to_string(&form).unwrap_or_default()
    }

    /// Keccak-256 of the canonical JSON form
    pub fn canonical_hash(&self) -> Hash {
        keccak256(self.canonical_json().as_bytes())
    }

    pub fn decision(&self, features: &[f64]) -> Vec<f64> {
        self.coefficients
            .iter()
            .zip(&self.intercepts)
            .map(|(row, b)| b + row.iter().zip(features).map(|(w, x)| w * x).sum::<f64>())
            .collect()
    }

    /// Index into the label set of the predicted label
    pub fn predict_index(&self, features: &[f64]) -> usize {
        let scores = self.decision(features);
        if scores.len() == 1 {
            return usize::from(scores[0] > 0.0);
        }
        scores
            .iter()
            .enumerate()
            .fold((0, f64::NEG_INFINITY), |best, (i, s)| if *s > best.1 { (i, *s) } else { best })
            .0
    }
}

/// A participant's fitted model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalModel {
    pub parameters: ModelParameters,
    /// Sorted distinct labels seen in training
    pub labels: Vec<String>,
}

/// Average of the participating local models
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalModel {
    pub parameters: ModelParameters,
    pub labels: Vec<String>,
    /// Number of local models averaged
    pub contributors: usize,
}

impl GlobalModel {
    pub fn canonical_hash(&self) -> Hash {
        self.parameters.canonical_hash()
    }

    pub fn predict(&self, features: &[f64]) -> Option<&str> {
        let index = self.parameters.predict_index(features);
        self.labels.get(index).map(String::as_str)
    }
}
