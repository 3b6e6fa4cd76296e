// forge/core/federated/src/evaluate.rs

use crate::dataset::Record;
use crate::model::GlobalModel;
use crate::schema::FeatureSchema;
use tracing::{debug, warn};

/// Scores a global model on held-out rows
#[derive(Debug, Default, Clone, Copy)]
pub struct Evaluator;

impl Evaluator {
    pub fn new() -> Self {
        Self
    }

    /// Accuracy in percent over holdout rows whose label the model knows.
    ///
    /// Returns 0.0 when there is no model or nothing left to score.
    pub fn evaluate(&self, model: Option<&GlobalModel>, holdout: &[Record], schema: &FeatureSchema) -> f64 {
        let Some(model) = model else {
            return 0.0;
        };
        if model.parameters.shape().map(|(_, width)| width) != Some(schema.width()) {
            warn!(
                model_shape = ?model.parameters.shape(),
                schema_width = schema.width(),
                "model does not match feature schema"
            );
            return 0.0;
        }

        let scored: Vec<&Record> = holdout
            .iter()
            .filter(|r| model.labels.contains(&r.outcome))
            .collect();
        if scored.is_empty() {
            debug!(holdout = holdout.len(), "no holdout rows with a known label");
            return 0.0;
        }

        let correct = scored
            .iter()
            .filter(|r| model.predict(&schema.encode(r)) == Some(r.outcome.as_str()))
            .count();
        let accuracy = correct as f64 / scored.len() as f64 * 100.0;
        debug!(
            holdout = holdout.len(),
            scored = scored.len(),
            correct,
            accuracy,
            "evaluated global model"
        );
        accuracy.clamp(0.0, 100.0)
    }
}
