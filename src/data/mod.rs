use ndarray::{Array1, Array2};
use polars::prelude::*;
use rand::prelude::*;
use rand::rngs::StdRng;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DataError {
    #[error("Failed to read or parse CSV file: {0}")]
    CsvError(#[from] PolarsError),
    #[error("CSV file is missing required columns: '{0}'")]
    MissingColumns(String),
    #[error("Found {count} null values in critical columns")]
    NullDataError { count: usize },
    #[error("Invalid measurement at row {row}: {reason}")]
    ValidationError { row: usize, reason: String },
    #[error("Dataset is empty")]
    EmptyDataset,
    #[error("Not enough samples of grade '{grade}' for a stratified split (found {count})")]
    InsufficientClassSamples { grade: String, count: usize },
    #[error("Unknown grade label '{0}'")]
    UnknownLabel(String),
}

/// One measured egg, straight out of the CSV.
#[derive(Debug, Clone, PartialEq)]
pub struct EggRecord {
    pub height_mm: f64,
    pub width_mm: f64,
    pub weight_g: f64,
    pub grade: String,
}

impl EggRecord {
    /// Validates physical plausibility of the measurements.
    pub fn validate(&self) -> Result<(), String> {
        for (name, value) in [
            ("height", self.height_mm),
            ("width", self.width_mm),
            ("weight", self.weight_g),
        ] {
            if !value.is_finite() {
                return Err(format!("{} is not finite: {}", name, value));
            }
            if value <= 0.0 {
                return Err(format!("{} must be positive, got {}", name, value));
            }
        }
        if self.grade.trim().is_empty() {
            return Err("grade label is empty".to_string());
        }
        Ok(())
    }

    pub fn features(&self) -> [f64; 3] {
        [self.height_mm, self.width_mm, self.weight_g]
    }
}

/// Feature matrix plus integer-coded labels, the shape every downstream
/// consumer (network training, fitness evaluation) works with.
#[derive(Debug, Clone)]
pub struct DataSet {
    pub x: Array2<f64>,
    pub y: Vec<usize>,
}

impl DataSet {
    pub fn len(&self) -> usize {
        self.y.len()
    }

    pub fn is_empty(&self) -> bool {
        self.y.is_empty()
    }
}

/// Train/validation/test partition produced by [`stratified_split`].
#[derive(Debug, Clone)]
pub struct DataSplits {
    pub train: DataSet,
    pub validation: DataSet,
    pub test: DataSet,
}

/// Detects the measurement and grade columns, tolerating common spellings.
fn detect_columns(df: &DataFrame) -> Result<(String, String, String, String), DataError> {
    let columns: Vec<String> = df
        .get_column_names()
        .iter()
        .map(|s| s.to_string())
        .collect();

    let find = |candidates: &[&str], what: &str| -> Result<String, DataError> {
        candidates
            .iter()
            .find(|&&col| columns.iter().any(|c| c == col))
            .map(|s| s.to_string())
            .ok_or_else(|| DataError::MissingColumns(what.to_string()))
    };

    let height_col = find(
        &["Height(mm)", "Height", "height", "HEIGHT"],
        "Height column",
    )?;
    let width_col = find(&["Width(mm)", "Width", "width", "WIDTH"], "Width column")?;
    let weight_col = find(
        &["Weight(g)", "Weight", "weight", "WEIGHT"],
        "Weight column",
    )?;
    let grade_col = find(
        &["Grade", "grade", "GRADE", "Class", "class"],
        "Grade column",
    )?;

    Ok((height_col, width_col, weight_col, grade_col))
}

/// Loads egg measurements from a CSV file with header
/// `Height(mm), Width(mm), Weight(g), Grade`.
pub fn load_csv(file_path: &Path) -> Result<Vec<EggRecord>, DataError> {
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .try_into_reader_with_file_path(Some(file_path.into()))?
        .finish()?;

    let (height_col, width_col, weight_col, grade_col) = detect_columns(&df)?;

    let heights_binding = df.column(&height_col)?.cast(&DataType::Float64)?;
    let heights = heights_binding.f64()?;
    let widths_binding = df.column(&width_col)?.cast(&DataType::Float64)?;
    let widths = widths_binding.f64()?;
    let weights_binding = df.column(&weight_col)?.cast(&DataType::Float64)?;
    let weights = weights_binding.f64()?;
    let grades = df.column(&grade_col)?.str()?;

    let null_count = heights.null_count() + widths.null_count() + weights.null_count()
        + grades.null_count();
    if null_count > 0 {
        return Err(DataError::NullDataError { count: null_count });
    }

    let mut records = Vec::with_capacity(df.height());
    for i in 0..df.height() {
        let record = EggRecord {
            height_mm: heights.get(i).unwrap_or(f64::NAN),
            width_mm: widths.get(i).unwrap_or(f64::NAN),
            weight_g: weights.get(i).unwrap_or(f64::NAN),
            grade: grades.get(i).unwrap_or("").to_string(),
        };
        record
            .validate()
            .map_err(|reason| DataError::ValidationError { row: i, reason })?;
        records.push(record);
    }

    if records.is_empty() {
        return Err(DataError::EmptyDataset);
    }

    Ok(records)
}

/// Maps grade strings (e.g. "A", "B", "C") to stable integer class indices.
///
/// Classes are sorted lexicographically at fit time, so index 0 is grade "A"
/// for the standard A/B/C labeling regardless of row order in the CSV.
#[derive(Debug, Clone)]
pub struct LabelEncoder {
    classes: Vec<String>,
}

impl LabelEncoder {
    pub fn fit(records: &[EggRecord]) -> Self {
        let mut classes: Vec<String> = records.iter().map(|r| r.grade.clone()).collect();
        classes.sort();
        classes.dedup();
        Self { classes }
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn n_classes(&self) -> usize {
        self.classes.len()
    }

    pub fn transform(&self, grade: &str) -> Result<usize, DataError> {
        self.classes
            .iter()
            .position(|c| c == grade)
            .ok_or_else(|| DataError::UnknownLabel(grade.to_string()))
    }

    pub fn inverse_transform(&self, index: usize) -> Option<&str> {
        self.classes.get(index).map(|s| s.as_str())
    }
}

/// Per-feature standardization (zero mean, unit variance), fitted on the full
/// dataset before splitting, exactly as the original pipeline did.
#[derive(Debug, Clone)]
pub struct StandardScaler {
    means: Vec<f64>,
    stds: Vec<f64>,
}

impl StandardScaler {
    pub fn fit(x: &Array2<f64>) -> Self {
        let n = x.nrows().max(1) as f64;
        let n_features = x.ncols();
        let mut means = vec![0.0; n_features];
        let mut stds = vec![0.0; n_features];

        for j in 0..n_features {
            let col = x.column(j);
            let mean = col.sum() / n;
            let var = col.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
            means[j] = mean;
            // A constant feature carries no signal; unit std keeps the
            // transform finite instead of dividing by zero.
            stds[j] = if var.sqrt() > f64::EPSILON { var.sqrt() } else { 1.0 };
        }

        Self { means, stds }
    }

    pub fn transform(&self, x: &Array2<f64>) -> Array2<f64> {
        let mut out = x.clone();
        for j in 0..out.ncols() {
            let (mean, std) = (self.means[j], self.stds[j]);
            out.column_mut(j).mapv_inplace(|v| (v - mean) / std);
        }
        out
    }

    pub fn transform_sample(&self, sample: &[f64]) -> Array1<f64> {
        Array1::from_iter(
            sample
                .iter()
                .zip(self.means.iter().zip(self.stds.iter()))
                .map(|(v, (mean, std))| (v - mean) / std),
        )
    }

    pub fn inverse_transform_sample(&self, sample: &[f64]) -> Vec<f64> {
        sample
            .iter()
            .zip(self.means.iter().zip(self.stds.iter()))
            .map(|(v, (mean, std))| v * std + mean)
            .collect()
    }
}

/// Builds the raw (unscaled) feature matrix and encoded label vector.
pub fn to_matrix(
    records: &[EggRecord],
    encoder: &LabelEncoder,
) -> Result<(Array2<f64>, Vec<usize>), DataError> {
    let mut x = Array2::zeros((records.len(), 3));
    let mut y = Vec::with_capacity(records.len());
    for (i, record) in records.iter().enumerate() {
        for (j, value) in record.features().iter().enumerate() {
            x[[i, j]] = *value;
        }
        y.push(encoder.transform(&record.grade)?);
    }
    Ok((x, y))
}

/// Splits the scaled features into train/validation/test sets, stratified by
/// class so every split sees every grade. The split is driven by a seeded rng
/// and is therefore reproducible for a given seed.
pub fn stratified_split(
    x: &Array2<f64>,
    y: &[usize],
    n_classes: usize,
    validation_split: f64,
    test_split: f64,
    seed: u64,
) -> Result<DataSplits, DataError> {
    if y.is_empty() {
        return Err(DataError::EmptyDataset);
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut train_idx = Vec::new();
    let mut val_idx = Vec::new();
    let mut test_idx = Vec::new();

    for class in 0..n_classes {
        let mut indices: Vec<usize> = y
            .iter()
            .enumerate()
            .filter_map(|(i, &label)| (label == class).then_some(i))
            .collect();
        // Every split must see every grade, otherwise validation accuracy
        // is computed against a class the network never learned.
        if indices.len() < 3 {
            return Err(DataError::InsufficientClassSamples {
                grade: format!("class {}", class),
                count: indices.len(),
            });
        }
        indices.shuffle(&mut rng);

        let n = indices.len();
        let n_val = ((n as f64 * validation_split).round() as usize).max(1);
        let n_test = ((n as f64 * test_split).round() as usize).max(1);
        let n_train = n.saturating_sub(n_val + n_test);
        if n_train == 0 {
            return Err(DataError::InsufficientClassSamples {
                grade: format!("class {}", class),
                count: n,
            });
        }

        train_idx.extend_from_slice(&indices[..n_train]);
        val_idx.extend_from_slice(&indices[n_train..n_train + n_val]);
        test_idx.extend_from_slice(&indices[n_train + n_val..]);
    }

    let gather = |indices: &[usize]| -> DataSet {
        let mut subset = Array2::zeros((indices.len(), x.ncols()));
        let mut labels = Vec::with_capacity(indices.len());
        for (row, &i) in indices.iter().enumerate() {
            subset.row_mut(row).assign(&x.row(i));
            labels.push(y[i]);
        }
        DataSet { x: subset, y: labels }
    };

    Ok(DataSplits {
        train: gather(&train_idx),
        validation: gather(&val_idx),
        test: gather(&test_idx),
    })
}
