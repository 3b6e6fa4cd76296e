// forge/core/federated/src/synthetic.rs

//! Seeded synthetic patient records for local demos.

use crate::dataset::{csv_field, DatasetError, Record};
use crate::schema::FeatureSchema;
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fs;
use std::io::Write;
use std::path::Path;
use tracing::info;

pub const OUTCOMES: [&str; 3] = ["Improved", "Stable", "Worsened"];
const OUTCOME_WEIGHTS: [f64; 3] = [0.6, 0.3, 0.1];

/// A full synthetic row, including the columns training ignores
#[derive(Debug, Clone, PartialEq)]
pub struct PatientRow {
    pub patient_id: u64,
    pub record: Record,
    pub symptoms_count: u32,
    pub treatment_duration_days: u32,
    pub medication_count: u32,
    pub lab_results_normal: bool,
}

/// Knuth's method; fine for the small means used here
fn poisson(rng: &mut StdRng, mean: f64) -> u32 {
    let limit = (-mean).exp();
    let mut k = 0;
    let mut p = 1.0;
    loop {
        p *= rng.gen::<f64>();
        if p <= limit {
            return k;
        }
        k += 1;
    }
}

fn exponential(rng: &mut StdRng, mean: f64) -> f64 {
    -mean * (1.0 - rng.gen::<f64>()).ln()
}

fn binomial(rng: &mut StdRng, trials: u32, p: f64) -> u32 {
    (0..trials).filter(|_| rng.gen_bool(p)).count() as u32
}

/// Generate `rows` records over `schema`. Identical seeds give identical output.
pub fn generate(rows: usize, seed: u64, schema: &FeatureSchema) -> Vec<PatientRow> {
    let mut rng = StdRng::seed_from_u64(seed);
    // Weights are constant and positive
    let outcome_dist = match WeightedIndex::new(OUTCOME_WEIGHTS) {
        Ok(dist) => dist,
        Err(_) => return Vec::new(),
    };
    if schema.age_groups.is_empty() || schema.diagnosis_codes.is_empty() {
        return Vec::new();
    }

    (0..rows)
        .map(|i| {
            let age_index = rng.gen_range(0..schema.age_groups.len());
            let code = &schema.diagnosis_codes[rng.gen_range(0..schema.diagnosis_codes.len())];
            let outcome = OUTCOMES[outcome_dist.sample(&mut rng)];

            // Older patients report more symptoms and stay in treatment longer
            let symptoms = (poisson(&mut rng, 3.0) as f64 + age_index as f64 * 0.5).clamp(0.0, 10.0) as u32;
            let duration = exponential(&mut rng, 30.0) as u32 + 1;
            let duration = (duration + symptoms * 5).clamp(1, 365);

            PatientRow {
                patient_id: i as u64 + 1,
                record: Record::new(&schema.age_groups[age_index], code, outcome),
                symptoms_count: symptoms,
                treatment_duration_days: duration,
                medication_count: binomial(&mut rng, 5, 0.3) + 1,
                lab_results_normal: rng.gen_bool(0.7),
            }
        })
        .collect()
}

/// Write generated rows with every column
pub fn write_patient_csv(path: &Path, rows: &[PatientRow]) -> Result<(), DatasetError> {
    let io_err = |source| DatasetError::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut file = fs::File::create(path).map_err(io_err)?;
    writeln!(
        file,
        "patient_id,age_group,diagnosis_code,treatment_outcome,symptoms_count,treatment_duration_days,medication_count,lab_results_normal"
    )
    .map_err(io_err)?;
    for row in rows {
        writeln!(
            file,
            "{},{},{},{},{},{},{},{}",
            row.patient_id,
            csv_field(&row.record.age_group),
            csv_field(&row.record.diagnosis_code),
            csv_field(&row.record.outcome),
            row.symptoms_count,
            row.treatment_duration_days,
            row.medication_count,
            if row.lab_results_normal { "True" } else { "False" },
        )
        .map_err(io_err)?;
    }
    info!(path = %path.display(), rows = rows.len(), "wrote synthetic dataset");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{CsvDataset, DatasetSource};

    #[test]
    fn test_generation_is_deterministic() {
        let schema = FeatureSchema::default();
        assert_eq!(generate(50, 42, &schema), generate(50, 42, &schema));
        assert_ne!(generate(50, 42, &schema), generate(50, 43, &schema));
    }

    #[test]
    fn test_generated_values_stay_in_schema() {
        let schema = FeatureSchema::default();
        let rows = generate(500, 42, &schema);
        assert_eq!(rows.len(), 500);
        assert_eq!(rows[499].patient_id, 500);
        for row in &rows {
            assert!(schema.age_groups.contains(&row.record.age_group));
            assert!(schema.diagnosis_codes.contains(&row.record.diagnosis_code));
            assert!(OUTCOMES.contains(&row.record.outcome.as_str()));
            assert!(row.symptoms_count <= 10);
            assert!((1..=365).contains(&row.treatment_duration_days));
            assert!((1..=6).contains(&row.medication_count));
        }
    }

    #[test]
    fn test_outcomes_skew_towards_improved() {
        let rows = generate(2_000, 42, &FeatureSchema::default());
        let improved = rows.iter().filter(|r| r.record.outcome == "Improved").count();
        let worsened = rows.iter().filter(|r| r.record.outcome == "Worsened").count();
        assert!(improved > 1_000);
        assert!(worsened < 400);
    }

    #[test]
    fn test_written_file_loads_as_dataset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("synthetic.csv");
        let rows = generate(20, 1, &FeatureSchema::default());

        write_patient_csv(&path, &rows).unwrap();
        let records = CsvDataset::new(&path).load().unwrap();
        assert_eq!(records.len(), 20);
        assert_eq!(records[3], rows[3].record);
    }
}
