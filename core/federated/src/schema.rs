// forge/core/federated/src/schema.rs

use crate::dataset::Record;
use serde::{Deserialize, Serialize};

/// Fixed one-hot feature layout shared by every participant.
///
/// The vector is the age-group bins followed by the diagnosis-code bins.
/// A value outside the enumeration leaves its whole group zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureSchema {
    pub age_groups: Vec<String>,
    pub diagnosis_codes: Vec<String>,
}

impl Default for FeatureSchema {
    fn default() -> Self {
        Self {
            age_groups: (1..8).map(|d| format!("{}-{}", d * 10, d * 10 + 9)).collect(),
            diagnosis_codes: ["C00", "C18", "J45", "I10", "E11", "F32"]
                .iter()
                .map(|c| c.to_string())
                .collect(),
        }
    }
}

impl FeatureSchema {
    pub fn width(&self) -> usize {
        self.age_groups.len() + self.diagnosis_codes.len()
    }

    /// Column names in vector order, e.g. `age_group_10-19`
    pub fn feature_names(&self) -> Vec<String> {
        self.age_groups
            .iter()
            .map(|g| format!("age_group_{}", g))
            .chain(self.diagnosis_codes.iter().map(|c| format!("diagnosis_code_{}", c)))
            .collect()
    }

    pub fn encode(&self, record: &Record) -> Vec<f64> {
        let mut features = vec![0.0; self.width()];
        if let Some(i) = self.age_groups.iter().position(|g| *g == record.age_group) {
            features[i] = 1.0;
        }
        if let Some(i) = self.diagnosis_codes.iter().position(|c| *c == record.diagnosis_code) {
            features[self.age_groups.len() + i] = 1.0;
        }
        features
    }

    pub fn encode_all(&self, records: &[Record]) -> Vec<Vec<f64>> {
        records.iter().map(|r| self.encode(r)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(age: &str, code: &str) -> Record {
        Record::new(age, code, "Improved")
    }

    #[test]
    fn test_default_schema_layout() {
        let schema = FeatureSchema::default();
        assert_eq!(schema.width(), 13);
        let names = schema.feature_names();
        assert_eq!(names[0], "age_group_10-19");
        assert_eq!(names[6], "age_group_70-79");
        assert_eq!(names[7], "diagnosis_code_C00");
        assert_eq!(names[12], "diagnosis_code_F32");
    }

    #[test]
    fn test_encode_one_hot() {
        let schema = FeatureSchema::default();
        let x = schema.encode(&record("30-39", "I10"));
        assert_eq!(x.iter().sum::<f64>(), 2.0);
        assert_eq!(x[2], 1.0);
        assert_eq!(x[7 + 3], 1.0);
    }

    #[test]
    fn test_unknown_category_zero_fills_group() {
        let schema = FeatureSchema::default();
        let x = schema.encode(&record("90-99", "C18"));
        assert!(x[..7].iter().all(|v| *v == 0.0));
        assert_eq!(x[8], 1.0);

        let x = schema.encode(&record("unknown", "Z99"));
        assert!(x.iter().all(|v| *v == 0.0));
        assert_eq!(x.len(), 13);
    }
}
