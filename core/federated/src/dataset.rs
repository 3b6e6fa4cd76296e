// forge/core/federated/src/dataset.rs

//! Tabular records, the protected-dataset source, and how a dataset is cut
//! into participant partitions and a holdout sample.

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

pub const AGE_GROUP_COLUMN: &str = "age_group";
pub const DIAGNOSIS_CODE_COLUMN: &str = "diagnosis_code";
pub const OUTCOME_COLUMN: &str = "treatment_outcome";

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("missing required column '{0}'")]
    MissingColumn(&'static str),

    #[error("line {line}: expected {expected} fields, found {found}")]
    Malformed {
        line: usize,
        expected: usize,
        found: usize,
    },
}

/// One labeled row. Columns other than the two features and the label are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub age_group: String,
    pub diagnosis_code: String,
    pub outcome: String,
}

impl Record {
    pub fn new(age_group: &str, diagnosis_code: &str, outcome: &str) -> Self {
        Self {
            age_group: age_group.to_string(),
            diagnosis_code: diagnosis_code.to_string(),
            outcome: outcome.to_string(),
        }
    }
}

/// Where the protected dataset comes from
pub trait DatasetSource: Send + Sync {
    fn load(&self) -> Result<Vec<Record>, DatasetError>;

    /// Short description for logs
    fn describe(&self) -> String;
}

/// Comma-separated file with a header row; columns are located by name
#[derive(Debug, Clone)]
pub struct CsvDataset {
    path: PathBuf,
}

impl CsvDataset {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Quote a field when it holds a delimiter, a quote or a line break
pub(crate) fn csv_field(value: &str) -> Cow<'_, str> {
    if value.contains(|c: char| matches!(c, ',' | '"' | '\n' | '\r')) {
        Cow::Owned(format!("\"{}\"", value.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(value)
    }
}

fn finish_field(field: &mut String, was_quoted: &mut bool) -> String {
    let value = std::mem::take(field);
    if std::mem::take(was_quoted) {
        value
    } else {
        value.trim().to_string()
    }
}

fn push_row(rows: &mut Vec<(usize, Vec<String>)>, start: usize, row: Vec<String>) {
    // Blank lines
    if row.len() == 1 && row[0].is_empty() {
        return;
    }
    rows.push((start, row));
}

/// Split CSV text into rows, honoring RFC 4180 quoting. Each row carries the
/// 1-based line it starts on.
fn split_rows(text: &str) -> Vec<(usize, Vec<String>)> {
    let mut rows = Vec::new();
    let mut row = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut was_quoted = false;
    let mut line = 1;
    let mut row_start = 1;

    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => in_quotes = false,
                '\n' => {
                    line += 1;
                    field.push(c);
                }
                _ => field.push(c),
            }
            continue;
        }

        match c {
            '"' if !was_quoted && field.trim().is_empty() => {
                field.clear();
                in_quotes = true;
                was_quoted = true;
            }
            ',' => row.push(finish_field(&mut field, &mut was_quoted)),
            '\r' => {}
            '\n' => {
                row.push(finish_field(&mut field, &mut was_quoted));
                push_row(&mut rows, row_start, std::mem::take(&mut row));
                line += 1;
                row_start = line;
            }
            _ => field.push(c),
        }
    }
    if was_quoted || !field.is_empty() || !row.is_empty() {
        row.push(finish_field(&mut field, &mut was_quoted));
        push_row(&mut rows, row_start, row);
    }
    rows
}

/// Parse CSV text into records
pub fn parse_csv(text: &str) -> Result<Vec<Record>, DatasetError> {
    let mut rows = split_rows(text.trim_start_matches('\u{feff}')).into_iter();

    let Some((_, header)) = rows.next() else {
        return Ok(Vec::new());
    };
    let column = |name: &'static str| {
        header
            .iter()
            .position(|h| h == name)
            .ok_or(DatasetError::MissingColumn(name))
    };
    let age = column(AGE_GROUP_COLUMN)?;
    let code = column(DIAGNOSIS_CODE_COLUMN)?;
    let outcome = column(OUTCOME_COLUMN)?;

    rows.map(|(line, fields)| {
        if fields.len() != header.len() {
            return Err(DatasetError::Malformed {
                line,
                expected: header.len(),
                found: fields.len(),
            });
        }
        Ok(Record::new(&fields[age], &fields[code], &fields[outcome]))
    })
    .collect()
}

impl DatasetSource for CsvDataset {
    fn load(&self) -> Result<Vec<Record>, DatasetError> {
        let text = fs::read_to_string(&self.path).map_err(|source| DatasetError::Io {
            path: self.path.clone(),
            source,
        })?;
        let records = parse_csv(&text)?;
        debug!(path = %self.path.display(), rows = records.len(), "loaded dataset");
        Ok(records)
    }

    fn describe(&self) -> String {
        format!("csv:{}", self.path.display())
    }
}

/// Records held in memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryDataset {
    records: Vec<Record>,
}

impl InMemoryDataset {
    pub fn new(records: Vec<Record>) -> Self {
        Self { records }
    }
}

impl DatasetSource for InMemoryDataset {
    fn load(&self) -> Result<Vec<Record>, DatasetError> {
        Ok(self.records.clone())
    }

    fn describe(&self) -> String {
        format!("memory:{} rows", self.records.len())
    }
}

/// Write records as CSV with the standard header
pub fn write_csv(path: &Path, records: &[Record]) -> Result<(), DatasetError> {
    let io_err = |source| DatasetError::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut file = fs::File::create(path).map_err(io_err)?;
    writeln!(file, "{},{},{}", AGE_GROUP_COLUMN, DIAGNOSIS_CODE_COLUMN, OUTCOME_COLUMN).map_err(io_err)?;
    for r in records {
        writeln!(
            file,
            "{},{},{}",
            csv_field(&r.age_group),
            csv_field(&r.diagnosis_code),
            csv_field(&r.outcome)
        )
        .map_err(io_err)?;
    }
    Ok(())
}

/// Cut `records` into `n` contiguous, disjoint, near-equal partitions.
///
/// The first `len % n` partitions get one extra row. Partitions may be empty
/// when there are fewer rows than participants.
pub fn split_partitions(records: &[Record], n: usize) -> Vec<Vec<Record>> {
    if n == 0 {
        return Vec::new();
    }
    let base = records.len() / n;
    let extra = records.len() % n;

    let mut partitions = Vec::with_capacity(n);
    let mut start = 0;
    for i in 0..n {
        let len = base + usize::from(i < extra);
        partitions.push(records[start..start + len].to_vec());
        start += len;
    }
    partitions
}

/// Seeded random sample of `fraction` of the rows, at least one if any exist
pub fn holdout_sample(records: &[Record], fraction: f64, seed: u64) -> Vec<Record> {
    if records.is_empty() {
        return Vec::new();
    }
    let wanted = (records.len() as f64 * fraction.clamp(0.0, 1.0)).round() as usize;
    let count = wanted.clamp(1, records.len());

    let mut rng = StdRng::seed_from_u64(seed);
    rand::seq::index::sample(&mut rng, records.len(), count)
        .into_iter()
        .map(|i| records[i].clone())
        .collect()
}
