// forge/core/federated/tests/round_tests.rs
//
// A full train/aggregate/evaluate cycle over partitioned data.

use forge_federated::synthetic;
use forge_federated::*;

fn two_outcome_dataset(rows: usize) -> Vec<Record> {
    let schema = FeatureSchema::default();
    (0..rows)
        .map(|i| {
            let age = &schema.age_groups[i % schema.age_groups.len()];
            let code = &schema.diagnosis_codes[(i / 7) % schema.diagnosis_codes.len()];
            // Older half of the age bins mostly end up "Stable"
            let outcome = if (i % 7 >= 4) != (i % 11 == 0) { "Stable" } else { "Improved" };
            Record::new(age, code, outcome)
        })
        .collect()
}

fn train_all(partitions: &[Vec<Record>], schema: &FeatureSchema) -> Vec<TrainingOutcome> {
    partitions
        .iter()
        .enumerate()
        .map(|(i, p)| TrainingUnit::new(i, TrainingConfig::default()).train(p, schema))
        .collect()
}

#[test]
fn test_round_over_three_partitions() {
    let schema = FeatureSchema::default();
    let data = two_outcome_dataset(900);
    let partitions = split_partitions(&data, 3);
    assert!(partitions.iter().all(|p| p.len() == 300));

    let outcomes = train_all(&partitions, &schema);
    assert!(outcomes.iter().all(|o| o.model.is_some()));
    assert!(outcomes.iter().all(|o| (0.0..=100.0).contains(&o.score)));

    let models: Vec<Option<LocalModel>> = outcomes.into_iter().map(|o| o.model).collect();
    let global = Aggregator::new().aggregate(&models).unwrap().unwrap();
    assert_eq!(global.contributors, 3);
    assert_eq!(global.labels, vec!["Improved", "Stable"]);

    let holdout = holdout_sample(&data, 0.1, 42);
    let accuracy = Evaluator::new().evaluate(Some(&global), &holdout, &schema);
    assert!((0.0..=100.0).contains(&accuracy));
    assert!(accuracy > 70.0);
}

#[test]
fn test_single_label_partition_drops_out() {
    let schema = FeatureSchema::default();
    let mut data = two_outcome_dataset(600);
    data.extend((0..300).map(|_| Record::new("20-29", "C18", "Improved")));
    let partitions = split_partitions(&data, 3);

    let outcomes = train_all(&partitions, &schema);
    assert!(outcomes[0].model.is_some());
    assert!(outcomes[1].model.is_some());
    assert!(outcomes[2].model.is_none());
    assert_eq!(outcomes[2].score, 0.0);

    let models: Vec<Option<LocalModel>> = outcomes.into_iter().map(|o| o.model).collect();
    let global = Aggregator::new().aggregate(&models).unwrap().unwrap();
    assert_eq!(global.contributors, 2);
}

#[test]
fn test_global_hash_survives_serde_round_trip() {
    let schema = FeatureSchema::default();
    let data = two_outcome_dataset(300);
    let models: Vec<Option<LocalModel>> = train_all(&split_partitions(&data, 3), &schema)
        .into_iter()
        .map(|o| o.model)
        .collect();
    let global = Aggregator::new().aggregate(&models).unwrap().unwrap();

    let json = serde_json::to_string(&global).unwrap();
    let restored: GlobalModel = serde_json::from_str(&json).unwrap();
    assert_eq!(restored.canonical_hash(), global.canonical_hash());
    assert_eq!(restored, global);
}

#[test]
fn test_synthetic_dataset_round() {
    let schema = FeatureSchema::default();
    let data: Vec<Record> = synthetic::generate(1_000, 42, &schema)
        .into_iter()
        .map(|row| row.record)
        .collect();

    let models: Vec<Option<LocalModel>> = train_all(&split_partitions(&data, 3), &schema)
        .into_iter()
        .map(|o| o.model)
        .collect();
    let global = Aggregator::new().aggregate(&models).unwrap().unwrap();
    assert_eq!(global.labels, vec!["Improved", "Stable", "Worsened"]);
    assert_eq!(global.parameters.shape(), Some((3, 13)));

    let accuracy = Evaluator::new().evaluate(Some(&global), &holdout_sample(&data, 0.1, 42), &schema);
    assert!((0.0..=100.0).contains(&accuracy));
}
