// forge/core/federated/src/aggregate.rs

use crate::model::{GlobalModel, LocalModel, ModelParameters};
use thiserror::Error;
use tracing::{info, warn};

/// Local models that cannot be averaged together
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaMismatch {
    #[error("label set {found:?} differs from {expected:?}")]
    Labels {
        expected: Vec<String>,
        found: Vec<String>,
    },

    #[error("parameter shape {found:?} differs from {expected:?}")]
    Shape {
        expected: (usize, usize),
        found: (usize, usize),
    },

    #[error("malformed parameters in local model {index}")]
    Malformed { index: usize },
}

/// Federated averaging of local model parameters
#[derive(Debug, Default, Clone, Copy)]
pub struct Aggregator;

impl Aggregator {
    pub fn new() -> Self {
        Self
    }

    /// Unweighted element-wise mean of every present model.
    ///
    /// Returns `Ok(None)` when no model is present. Summation runs in
    /// canonical-hash order, so any permutation of the input gives a
    /// bitwise-identical result.
    pub fn aggregate(&self, models: &[Option<LocalModel>]) -> Result<Option<GlobalModel>, SchemaMismatch> {
        let survivors: Vec<(usize, &LocalModel)> = models
            .iter()
            .enumerate()
            .filter_map(|(i, m)| m.as_ref().map(|m| (i, m)))
            .collect();

        let Some(&(first_index, first)) = survivors.first() else {
            warn!(participants = models.len(), "no local model to aggregate");
            return Ok(None);
        };
        let expected_shape = first
            .parameters
            .shape()
            .ok_or(SchemaMismatch::Malformed { index: first_index })?;

        for &(index, model) in &survivors {
            let shape = model.parameters.shape().ok_or(SchemaMismatch::Malformed { index })?;
            if shape != expected_shape {
                return Err(SchemaMismatch::Shape {
                    expected: expected_shape,
                    found: shape,
                });
            }
            if model.labels != first.labels {
                return Err(SchemaMismatch::Labels {
                    expected: first.labels.clone(),
                    found: model.labels.clone(),
                });
            }
        }

        let mut ordered: Vec<&ModelParameters> = survivors.iter().map(|(_, m)| &m.parameters).collect();
        ordered.sort_by_cached_key(|p| p.canonical_hash());

        let (rows, width) = expected_shape;
        let mut coefficients = vec![vec![0.0; width]; rows];
        let mut intercepts = vec![0.0; rows];
        for params in &ordered {
            for (sum_row, row) in coefficients.iter_mut().zip(&params.coefficients) {
                for (sum, v) in sum_row.iter_mut().zip(row) {
                    *sum += v;
                }
            }
            for (sum, v) in intercepts.iter_mut().zip(&params.intercepts) {
                *sum += v;
            }
        }

        let count = ordered.len() as f64;
        coefficients.iter_mut().flatten().for_each(|v| *v /= count);
        intercepts.iter_mut().for_each(|v| *v /= count);

        info!(
            participants = models.len(),
            contributors = ordered.len(),
            "aggregated local models"
        );
        Ok(Some(GlobalModel {
            parameters: ModelParameters {
                coefficients,
                intercepts,
            },
            labels: first.labels.clone(),
            contributors: ordered.len(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn local(coef: Vec<f64>, intercept: f64) -> LocalModel {
        LocalModel {
            parameters: ModelParameters {
                coefficients: vec![coef],
                intercepts: vec![intercept],
            },
            labels: vec!["Improved".into(), "Stable".into()],
        }
    }

    #[test]
    fn test_all_absent_is_absent() {
        assert_eq!(Aggregator::new().aggregate(&[None, None, None]), Ok(None));
        assert_eq!(Aggregator::new().aggregate(&[]), Ok(None));
    }

    #[test]
    fn test_mean_skips_absent() {
        let models = vec![
            Some(local(vec![1.0, 2.0], 0.5)),
            None,
            Some(local(vec![3.0, -2.0], 1.5)),
        ];
        let global = Aggregator::new().aggregate(&models).unwrap().unwrap();
        assert_eq!(global.parameters.coefficients, vec![vec![2.0, 0.0]]);
        assert_eq!(global.parameters.intercepts, vec![1.0]);
        assert_eq!(global.contributors, 2);
        assert_eq!(global.labels, vec!["Improved", "Stable"]);
    }

    #[test]
    fn test_label_mismatch() {
        let mut other = local(vec![1.0, 2.0], 0.0);
        other.labels = vec!["Improved".into(), "Worsened".into()];
        let err = Aggregator::new()
            .aggregate(&[Some(local(vec![1.0, 2.0], 0.0)), Some(other)])
            .unwrap_err();
        assert!(matches!(err, SchemaMismatch::Labels { .. }));
    }

    #[test]
    fn test_shape_mismatch() {
        let err = Aggregator::new()
            .aggregate(&[Some(local(vec![1.0, 2.0], 0.0)), Some(local(vec![1.0], 0.0))])
            .unwrap_err();
        assert_eq!(
            err,
            SchemaMismatch::Shape {
                expected: (1, 2),
                found: (1, 1)
            }
        );
    }

    #[test]
    fn test_malformed_model() {
        let mut broken = local(vec![1.0], 0.0);
        broken.parameters.intercepts.clear();
        let err = Aggregator::new()
            .aggregate(&[None, Some(broken)])
            .unwrap_err();
        assert_eq!(err, SchemaMismatch::Malformed { index: 1 });
    }

    fn models_and_permutation(
    ) -> impl Strategy<Value = (Vec<Option<LocalModel>>, Vec<Option<LocalModel>>)> {
        prop::collection::vec((prop::collection::vec(-1e6f64..1e6, 4), -1e3f64..1e3), 1..8)
            .prop_map(|rows| {
                rows.into_iter()
                    .map(|(coef, b)| Some(local(coef, b)))
                    .collect::<Vec<_>>()
            })
            .prop_flat_map(|models| (Just(models.clone()), Just(models).prop_shuffle()))
    }

    proptest! {
        #[test]
        fn prop_aggregation_is_order_independent((models, shuffled) in models_and_permutation()) {
            let a = Aggregator::new().aggregate(&models).unwrap().unwrap();
            let b = Aggregator::new().aggregate(&shuffled).unwrap().unwrap();
            prop_assert_eq!(a.canonical_hash(), b.canonical_hash());
            prop_assert_eq!(a.parameters, b.parameters);
        }
    }
}
