//! In-memory tabular datasets and the deterministic train/test split.

use csv::{ReaderBuilder, Trim};
use ndarray::{Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::error::{Result, TrackingError};

const IRIS_CSV: &str = include_str!("../data/iris.csv");
const IRIS_TARGET_NAMES: [&str; 3] = ["setosa", "versicolor", "virginica"];

/// Feature matrix with one integer class label per row.
#[derive(Clone, Debug)]
pub struct Dataset {
    pub features: Array2<f64>,
    pub targets: Array1<i64>,
    pub feature_names: Vec<String>,
    pub target_names: Vec<String>,
}

fn csv_error(err: csv::Error) -> TrackingError {
    TrackingError::validation(format!("malformed dataset: {err}"))
}

/// The four partitions produced by [`Dataset::train_test_split`].
#[derive(Clone, Debug)]
pub struct Split {
    pub x_train: Array2<f64>,
    pub x_test: Array2<f64>,
    pub y_train: Array1<i64>,
    pub y_test: Array1<i64>,
}

impl Dataset {
    pub fn new(features: Array2<f64>, targets: Array1<i64>) -> Result<Self> {
        if features.nrows() != targets.len() {
            return Err(TrackingError::validation(format!(
                "{} feature rows but {} targets",
                features.nrows(),
                targets.len()
            )));
        }
        let feature_names = (0..features.ncols()).map(|i| format!("x{i}")).collect();
        Ok(Self {
            features,
            targets,
            feature_names,
            target_names: Vec::new(),
        })
    }

    /// Fisher's iris data: 150 rows, 4 features, 3 classes.
    pub fn iris() -> Result<Self> {
        let mut ds = Self::from_csv(IRIS_CSV)?;
        ds.target_names = IRIS_TARGET_NAMES.iter().map(|s| s.to_string()).collect();
        Ok(ds)
    }

    /// Parse a headed CSV whose last column is the integer class label.
    pub fn from_csv(text: &str) -> Result<Self> {
        let mut rdr = ReaderBuilder::new()
            .trim(Trim::All)
            .from_reader(text.as_bytes());
        let mut columns: Vec<String> = rdr
            .headers()
            .map_err(csv_error)?
            .iter()
            .map(str::to_string)
            .collect();
        if columns.len() < 2 {
            return Err(TrackingError::validation(
                "dataset needs at least one feature column and a target column",
            ));
        }
        columns.pop();
        let width = columns.len();

        let mut values = Vec::new();
        let mut targets = Vec::new();
        for (row, result) in rdr.records().enumerate() {
            let record = result.map_err(csv_error)?;
            for cell in record.iter().take(width) {
                let v: f64 = cell.parse().map_err(|_| {
                    TrackingError::validation(format!("row {}: '{cell}' is not a number", row + 1))
                })?;
                values.push(v);
            }
            let raw = &record[width];
            let label: i64 = raw.parse().map_err(|_| {
                TrackingError::validation(format!("row {}: '{raw}' is not a class label", row + 1))
            })?;
            targets.push(label);
        }

        let features = Array2::from_shape_vec((targets.len(), width), values)
            .map_err(|e| TrackingError::validation(e.to_string()))?;
        Ok(Self {
            features,
            targets: Array1::from(targets),
            feature_names: columns,
            target_names: Vec::new(),
        })
    }

    pub fn n_rows(&self) -> usize {
        self.features.nrows()
    }

    pub fn n_features(&self) -> usize {
        self.features.ncols()
    }

    /// Human readable name of a class label, if known.
    pub fn target_name(&self, label: i64) -> Option<&str> {
        usize::try_from(label)
            .ok()
            .and_then(|i| self.target_names.get(i))
            .map(String::as_str)
    }

    /// Shuffle rows with a seeded RNG and hold out `ceil(n * test_size)` of them.
    ///
    /// The same seed always produces the same partitions.
    pub fn train_test_split(&self, test_size: f64, seed: u64) -> Result<Split> {
        if !(test_size > 0.0 && test_size < 1.0) {
            return Err(TrackingError::validation(format!(
                "test_size must be in (0, 1), got {test_size}"
            )));
        }
        let n = self.n_rows();
        let n_test = (n as f64 * test_size).ceil() as usize;
        if n_test == 0 || n_test >= n {
            return Err(TrackingError::validation(format!(
                "cannot split {n} rows with test_size {test_size}"
            )));
        }

        let mut indices: Vec<usize> = (0..n).collect();
        let mut rng = StdRng::seed_from_u64(seed);
        indices.shuffle(&mut rng);
        let (test_idx, train_idx) = indices.split_at(n_test);

        Ok(Split {
            x_train: self.features.select(Axis(0), train_idx),
            x_test: self.features.select(Axis(0), test_idx),
            y_train: self.targets.select(Axis(0), train_idx),
            y_test: self.targets.select(Axis(0), test_idx),
        })
    }
}
