// forge/core/federated/src/lib.rs

//! Federated training round primitives: feature schema, dataset handling,
//! local training, parameter averaging and holdout evaluation.

pub mod aggregate;
pub mod dataset;
pub mod evaluate;
pub mod model;
pub mod schema;
pub mod synthetic;
pub mod training;

pub use aggregate::{Aggregator, SchemaMismatch};
pub use dataset::{
    holdout_sample, split_partitions, CsvDataset, DatasetError, DatasetSource, InMemoryDataset, Record,
};
pub use evaluate::Evaluator;
pub use model::{GlobalModel, LocalModel, ModelParameters};
pub use schema::FeatureSchema;
pub use training::{TrainingConfig, TrainingOutcome, TrainingUnit};
