//! Criteo display-advertising data loader.
//!
//! Each line of the input is tab-separated with 40 columns and no header:
//! the click label, 13 integer features `I1..I13` and 26 categorical
//! features `C1..C26`. Missing values are empty fields.
//!
//! Preprocessing:
//!
//! - missing categorical values become `"-1"`, missing integers become `0`
//! - categorical columns are label-encoded over their sorted unique values
//! - integer columns are min-max scaled to `[0, 1]` (a constant column maps to 0)
//! - rows are shuffled with a seeded RNG and split into train and test

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use ctr_layers::{IndexTensor, Tensor};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::dataset::Dataset;
use crate::error::DataError;
use crate::feature_column::{DenseFeature, FeatureColumns, SparseFeature};

/// Number of integer columns.
pub const NUM_DENSE: usize = 13;
/// Number of categorical columns.
pub const NUM_SPARSE: usize = 26;
/// Total columns per line, including the label.
pub const NUM_COLUMNS: usize = 1 + NUM_DENSE + NUM_SPARSE;

const MISSING_SPARSE: &str = "-1";

/// Loader options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CriteoOptions {
    /// Embedding width assigned to every categorical column
    pub embed_dim: usize,
    /// Read only the first `sample_num` rows
    pub read_part: bool,
    /// Row limit when `read_part` is set
    pub sample_num: usize,
    /// Fraction of rows held out for testing
    pub test_size: f32,
    /// Seed for the train/test shuffle
    pub seed: u64,
}

impl Default for CriteoOptions {
    fn default() -> Self {
        Self {
            embed_dim: 8,
            read_part: true,
            sample_num: 100_000,
            test_size: 0.2,
            seed: 2020,
        }
    }
}

/// Preprocessed Criteo data.
#[derive(Debug, Clone)]
pub struct CriteoDataset {
    /// Column descriptions for model construction
    pub feature_columns: FeatureColumns,
    /// Training rows
    pub train: Dataset,
    /// Held-out rows
    pub test: Dataset,
}

/// Reads, preprocesses and splits a Criteo file.
///
/// # Errors
///
/// Returns [`DataError::Io`] if the file cannot be read, or any error from
/// [`parse_criteo`] and [`Dataset::train_test_split`].
pub fn create_criteo_dataset(
    path: impl AsRef<Path>,
    options: &CriteoOptions,
) -> Result<CriteoDataset, DataError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| DataError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let (feature_columns, dataset) = parse_criteo(BufReader::new(file), options)
        .map_err(|err| match err {
            DataError::Io { source, .. } => DataError::Io {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })?;

    let mut rng = StdRng::seed_from_u64(options.seed);
    let (train, test) = dataset.train_test_split(options.test_size, &mut rng)?;
    tracing::info!(
        path = %path.display(),
        train = train.len(),
        test = test.len(),
        positive_rate = dataset.positive_rate(),
        "Loaded Criteo dataset"
    );

    Ok(CriteoDataset {
        feature_columns,
        train,
        test,
    })
}

/// Parses and preprocesses Criteo rows without splitting them.
///
/// # Errors
///
/// Returns a [`DataError`] for a malformed row, an unreadable stream or an
/// input with no rows.
pub fn parse_criteo<R: BufRead>(
    reader: R,
    options: &CriteoOptions,
) -> Result<(FeatureColumns, Dataset), DataError> {
    if options.embed_dim == 0 {
        return Err(DataError::InvalidConfig(
            "embed_dim must be positive".to_string(),
        ));
    }
    let limit = if options.read_part {
        options.sample_num
    } else {
        usize::MAX
    };

    let mut labels = Vec::new();
    let mut dense_raw: Vec<[f64; NUM_DENSE]> = Vec::new();
    let mut sparse_raw: Vec<Vec<String>> = Vec::new();

    for (index, line) in reader.lines().enumerate() {
        if labels.len() >= limit {
            break;
        }
        let line = line.map_err(|source| DataError::Io {
            path: Default::default(),
            source,
        })?;
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            continue;
        }
        let line_no = index + 1;
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() != NUM_COLUMNS {
            return Err(DataError::ColumnCount {
                line: line_no,
                expected: NUM_COLUMNS,
                actual: fields.len(),
            });
        }

        labels.push(parse_label(fields[0], line_no)?);

        let mut dense = [0.0f64; NUM_DENSE];
        for (i, value) in dense.iter_mut().enumerate() {
            let raw = fields[1 + i].trim();
            if !raw.is_empty() {
                let invalid = || DataError::InvalidDense {
                    line: line_no,
                    column: dense_name(i),
                    value: raw.to_string(),
                };
                // `f64::from_str` accepts `nan`, `inf` and overflowing literals.
                let parsed: f64 = raw.parse().map_err(|_| invalid())?;
                if !parsed.is_finite() {
                    return Err(invalid());
                }
                *value = parsed;
            }
        }
        dense_raw.push(dense);

        sparse_raw.push(
            fields[1 + NUM_DENSE..]
                .iter()
                .map(|raw| {
                    let raw = raw.trim();
                    if raw.is_empty() {
                        MISSING_SPARSE.to_string()
                    } else {
                        raw.to_string()
                    }
                })
                .collect(),
        );
    }

    if labels.is_empty() {
        return Err(DataError::Empty);
    }
    let rows = labels.len();

    let dense = min_max_scale(&dense_raw);
    let (sparse_ids, feat_nums) = label_encode(&sparse_raw);

    let feature_columns = FeatureColumns::new(
        (0..NUM_DENSE).map(|i| DenseFeature::new(dense_name(i))).collect(),
        feat_nums
            .iter()
            .enumerate()
            .map(|(j, &n)| SparseFeature::new(sparse_name(j), n, options.embed_dim))
            .collect(),
    )?;
    tracing::debug!(rows, feat_nums = ?feat_nums, "Preprocessed Criteo rows");

    let dataset = Dataset::new(
        Tensor::from_data(&[rows, NUM_DENSE], dense),
        IndexTensor::new(rows, NUM_SPARSE, sparse_ids)?,
        labels,
    )?;
    Ok((feature_columns, dataset))
}

fn dense_name(i: usize) -> String {
    format!("I{}", i + 1)
}

fn sparse_name(j: usize) -> String {
    format!("C{}", j + 1)
}

fn parse_label(raw: &str, line: usize) -> Result<f32, DataError> {
    let invalid = || DataError::InvalidLabel {
        line,
        value: raw.to_string(),
    };
    let value: f32 = raw.trim().parse().map_err(|_| invalid())?;
    if value == 0.0 || value == 1.0 {
        Ok(value)
    } else {
        Err(invalid())
    }
}

/// Scales each column to `[0, 1]`; returns row-major `f32` data.
fn min_max_scale(rows: &[[f64; NUM_DENSE]]) -> Vec<f32> {
    let mut min = [f64::INFINITY; NUM_DENSE];
    let mut max = [f64::NEG_INFINITY; NUM_DENSE];
    for row in rows {
        for i in 0..NUM_DENSE {
            min[i] = min[i].min(row[i]);
            max[i] = max[i].max(row[i]);
        }
    }
    let mut out = Vec::with_capacity(rows.len() * NUM_DENSE);
    for row in rows {
        for i in 0..NUM_DENSE {
            let range = max[i] - min[i];
            let scaled = if range > 0.0 {
                (row[i] - min[i]) / range
            } else {
                0.0
            };
            out.push(scaled as f32);
        }
    }
    out
}

/// Maps each column's sorted unique values to `0..n`; returns row-major ids
/// and per-column cardinalities.
fn label_encode(rows: &[Vec<String>]) -> (Vec<usize>, Vec<usize>) {
    let mut vocabularies: Vec<BTreeMap<&str, usize>> = vec![BTreeMap::new(); NUM_SPARSE];
    for row in rows {
        for (vocab, value) in vocabularies.iter_mut().zip(row) {
            vocab.entry(value.as_str()).or_insert(0);
        }
    }
    for vocab in &mut vocabularies {
        for (id, slot) in vocab.values_mut().enumerate() {
            *slot = id;
        }
    }

    let mut ids = Vec::with_capacity(rows.len() * NUM_SPARSE);
    for row in rows {
        for (vocab, value) in vocabularies.iter().zip(row) {
            ids.push(vocab[value.as_str()]);
        }
    }
    let feat_nums = vocabularies.iter().map(BTreeMap::len).collect();
    (ids, feat_nums)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn line(label: &str, dense: &[&str], sparse: &[&str]) -> String {
        let mut fields = vec![label.to_string()];
        fields.extend((0..NUM_DENSE).map(|i| dense.get(i).unwrap_or(&"").to_string()));
        fields.extend((0..NUM_SPARSE).map(|j| sparse.get(j).unwrap_or(&"").to_string()));
        fields.join("\t")
    }

    #[test]
    fn test_label_encoding_sorts_values() {
        let text = [
            line("0", &["1"], &["b"]),
            line("1", &["3"], &["a"]),
            line("0", &["2"], &[""]),
        ]
        .join("\n");
        let (columns, dataset) = parse_criteo(Cursor::new(text), &CriteoOptions::default()).unwrap();

        // sorted vocabulary: "-1", "a", "b"
        assert_eq!(columns.sparse()[0].feat_num, 3);
        assert_eq!(dataset.sparse().column(0), vec![2, 1, 0]);
        // untouched columns hold only the missing marker
        assert_eq!(columns.sparse()[1].feat_num, 1);
        assert_eq!(dataset.sparse().column(1), vec![0, 0, 0]);
    }

    #[test]
    fn test_min_max_scaling() {
        let text = [
            line("0", &["10", "5"], &[]),
            line("1", &["20", "5"], &[]),
            line("1", &["", "5"], &[]),
        ]
        .join("\n");
        let (_, dataset) = parse_criteo(Cursor::new(text), &CriteoOptions::default()).unwrap();
        let dense = dataset.dense().data();
        // I1: values 10, 20, 0 (missing) -> 0.5, 1.0, 0.0
        assert!((dense[0] - 0.5).abs() < 1e-6);
        assert!((dense[NUM_DENSE] - 1.0).abs() < 1e-6);
        assert!(dense[2 * NUM_DENSE].abs() < 1e-6);
        // I2 is constant
        assert_eq!(dense[1], 0.0);
        assert_eq!(dense[NUM_DENSE + 1], 0.0);
    }

    #[test]
    fn test_read_part_limits_rows() {
        let text = (0..5)
            .map(|i| line(if i % 2 == 0 { "0" } else { "1" }, &[], &[]))
            .collect::<Vec<_>>()
            .join("\n");
        let options = CriteoOptions {
            sample_num: 3,
            ..CriteoOptions::default()
        };
        let (_, dataset) = parse_criteo(Cursor::new(text.clone()), &options).unwrap();
        assert_eq!(dataset.len(), 3);

        let options = CriteoOptions {
            read_part: false,
            sample_num: 3,
            ..CriteoOptions::default()
        };
        let (_, dataset) = parse_criteo(Cursor::new(text), &options).unwrap();
        assert_eq!(dataset.len(), 5);
    }

    #[test]
    fn test_malformed_rows() {
        let options = CriteoOptions::default();
        assert!(matches!(
            parse_criteo(Cursor::new("1\t2\t3"), &options),
            Err(DataError::ColumnCount { line: 1, .. })
        ));
        assert!(matches!(
            parse_criteo(Cursor::new(line("2", &[], &[])), &options),
            Err(DataError::InvalidLabel { .. })
        ));
        assert!(matches!(
            parse_criteo(Cursor::new(line("1", &["x"], &[])), &options),
            Err(DataError::InvalidDense { .. })
        ));
        assert!(matches!(
            parse_criteo(Cursor::new(""), &options),
            Err(DataError::Empty)
        ));
    }

    #[test]
    fn test_non_finite_dense_rejected() {
        let options = CriteoOptions::default();
        for raw in ["nan", "NaN", "inf", "-inf", "1e400"] {
            let text = [line("1", &["3"], &[]), line("0", &[raw], &[])].join("\n");
            match parse_criteo(Cursor::new(text), &options) {
                Err(DataError::InvalidDense { line, column, value }) => {
                    assert_eq!((line, column.as_str(), value.as_str()), (2, "I1", raw));
                }
                other => panic!("{raw}: expected InvalidDense, got {other:?}"),
            }
        }
    }
}
