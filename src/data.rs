//! Dataset cleaning, categorical encoding and train/test splitting using Polars

use std::collections::{BTreeMap, BTreeSet};
use std::io::Cursor;

use ndarray::{Array1, Array2, Axis};
use polars::prelude::*;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::{debug, info, warn};

use crate::config::{
    AnalysisConfig, CATEGORICAL_COLUMNS, COLUMN_ALIASES, FEATURE_COLUMNS, IDENTIFIER_COLUMNS,
    NUMERIC_COLUMNS, TARGET_COLUMN,
};
use crate::error::AnalysisError;

/// Placeholder for categorical columns with no observed value
pub const UNKNOWN_CATEGORY: &str = "Unknown";

/// Tokens read as missing in label and categorical columns
const NULL_TOKENS: [&str; 19] = [
    "", "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

fn is_null_token(raw: &str) -> bool {
    NULL_TOKENS.contains(&raw.trim())
}

/// Row indices of the two partitions
#[derive(Debug, Clone, PartialEq)]
pub struct TrainTestSplit {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
    /// Whether label proportions were preserved per partition
    pub stratified: bool,
}

/// Cleaned customer dataset with its encoded feature matrix
#[derive(Debug)]
pub struct CustomerData {
    /// Cleaned frame, every column of the source kept
    pub frame: DataFrame,
    /// One-hot encoded feature matrix (n_customers, n_features)
    pub features: Array2<f64>,
    /// Feature names aligned with the matrix columns
    pub feature_names: Vec<String>,
    /// Churn label per customer (0 or 1)
    pub target: Array1<usize>,
    pub split: TrainTestSplit,
}

impl CustomerData {
    /// Clean a raw frame, encode its features and split it
    pub fn prepare(raw: DataFrame, config: &AnalysisConfig) -> Result<Self, AnalysisError> {
        info!(rows = raw.height(), columns = raw.width(), "Starting preprocessing");

        let frame = clean_frame(raw)?;
        let target = label_values(&frame)?;
        let (features, feature_names) = encode_features(&frame)?;
        let split = train_test_split(
            target.as_slice().unwrap_or(&[]),
            config.test_fraction,
            config.seed,
        );

        info!(
            rows = features.nrows(),
            features = features.ncols(),
            train = split.train.len(),
            test = split.test.len(),
            stratified = split.stratified,
            "Preprocessing complete"
        );

        Ok(Self {
            frame,
            features,
            feature_names,
            target,
            split,
        })
    }

    pub fn n_customers(&self) -> usize {
        self.target.len()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.frame.column(name).is_ok()
    }

    /// Values of a numeric column, `None` if the column is absent
    pub fn numeric_column(&self, name: &str) -> Option<Vec<f64>> {
        let column = self.frame.column(name).ok()?;
        let values = numeric_values(column).ok()?;
        Some(values.into_iter().flatten().collect())
    }

    /// Values of a categorical column, `None` if the column is absent
    pub fn categorical_column(&self, name: &str) -> Option<Vec<String>> {
        let column = self.frame.column(name).ok()?;
        let values = text_values(column).ok()?;
        Some(
            values
                .into_iter()
                .map(|v| v.unwrap_or_else(|| UNKNOWN_CATEGORY.to_string()))
                .collect(),
        )
    }

    /// Share of churned customers in [0, 1]
    pub fn churn_rate(&self) -> f64 {
        if self.target.is_empty() {
            return 0.0;
        }
        self.target.iter().filter(|&&y| y == 1).count() as f64 / self.target.len() as f64
    }

    /// Rows with no missing value in any column
    pub fn complete_rows(&self) -> Result<usize, AnalysisError> {
        let mut complete = vec![true; self.frame.height()];
        for column in self.frame.get_columns() {
            if column.null_count() == 0 {
                continue;
            }
            for (row, value) in text_values(column)?.iter().enumerate() {
                if value.is_none() {
                    complete[row] = false;
                }
            }
        }
        Ok(complete.into_iter().filter(|&ok| ok).count())
    }

    pub fn train_features(&self) -> Array2<f64> {
        self.features.select(Axis(0), &self.split.train)
    }

    pub fn train_target(&self) -> Array1<usize> {
        self.target.select(Axis(0), &self.split.train)
    }

    pub fn test_features(&self) -> Array2<f64> {
        self.features.select(Axis(0), &self.split.test)
    }

    pub fn test_target(&self) -> Array1<usize> {
        self.target.select(Axis(0), &self.split.test)
    }
}

/// Parse CSV text into a frame, every column read as text
pub fn parse_csv(text: &str) -> PolarsResult<DataFrame> {
    CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(0))
        .into_reader_with_file_handle(Cursor::new(text.as_bytes().to_vec()))
        .finish()
}

/// Trim, lowercase and replace spaces with underscores, then resolve English aliases
pub fn normalize_column_name(name: &str) -> String {
    let normalized = name.trim().to_lowercase().replace(' ', "_");
    COLUMN_ALIASES
        .iter()
        .find(|(alias, _)| *alias == normalized)
        .map(|(_, canonical)| canonical.to_string())
        .unwrap_or(normalized)
}

/// Normalize names, drop unlabeled rows and impute every expected column.
///
/// Columns outside the schema pass through untouched. Running this on an
/// already-cleaned frame returns an identical frame.
pub fn clean_frame(df: DataFrame) -> Result<DataFrame, AnalysisError> {
    let mut seen = BTreeSet::new();
    let mut renamed: Vec<Column> = Vec::with_capacity(df.width());
    for column in df.get_columns() {
        let name = normalize_column_name(column.name().as_str());
        if !seen.insert(name.clone()) {
            warn!(
                column = %column.name(),
                resolved = %name,
                "Column name already taken, dropping duplicate"
            );
            continue;
        }
        let mut column = column.clone();
        column.rename(name.into());
        renamed.push(column);
    }
    let mut df = DataFrame::new(renamed)?;

    let labels = text_values(
        df.column(TARGET_COLUMN)
            .map_err(|_| AnalysisError::MissingColumn(TARGET_COLUMN.to_string()))?,
    )?;
    let keep: Vec<bool> = labels
        .iter()
        .map(|v| v.as_deref().is_some_and(|raw| !is_null_token(raw)))
        .collect();
    let dropped = keep.iter().filter(|&&k| !k).count();
    if dropped > 0 {
        warn!(dropped, "Removed rows with a missing label");
        let mask = BooleanChunked::from_slice("keep".into(), &keep);
        df = df.filter(&mask)?;
    }

    for expected in NUMERIC_COLUMNS.iter().chain(CATEGORICAL_COLUMNS.iter()) {
        if df.column(expected).is_err() {
            warn!(column = %expected, "Expected column not found, skipping");
        }
    }

    let mut columns: Vec<Column> = Vec::with_capacity(df.width());
    for column in df.get_columns() {
        let name = column.name().as_str();
        let cleaned: Column = if name == TARGET_COLUMN {
            let labels: Vec<i32> = text_values(column)?
                .iter()
                .map(|v| v.as_deref().map(parse_label).unwrap_or(0))
                .collect();
            Series::new(name.into(), labels).into()
        } else if NUMERIC_COLUMNS.contains(&name) {
            let values = impute_numeric(&numeric_values(column)?);
            Series::new(name.into(), values).into()
        } else if CATEGORICAL_COLUMNS.contains(&name) {
            let values = impute_categorical(&text_values(column)?);
            Series::new(name.into(), values).into()
        } else {
            column.clone()
        };
        columns.push(cleaned);
    }

    Ok(DataFrame::new(columns)?)
}

/// One-hot encode the feature columns present in a cleaned frame.
///
/// Numeric features come first in configured order, followed by one indicator
/// per categorical level with the first (sorted) level dropped.
pub fn encode_features(frame: &DataFrame) -> Result<(Array2<f64>, Vec<String>), AnalysisError> {
    let present: Vec<&str> = FEATURE_COLUMNS
        .iter()
        .copied()
        .filter(|name| !IDENTIFIER_COLUMNS.contains(name))
        .filter(|name| frame.column(name).is_ok())
        .collect();

    let mut names = Vec::new();
    let mut columns: Vec<Vec<f64>> = Vec::new();

    for name in present.iter().filter(|n| NUMERIC_COLUMNS.contains(n)) {
        let values = numeric_values(frame.column(name)?)?;
        columns.push(values.into_iter().map(|v| finite_or_zero(v.unwrap_or(0.0))).collect());
        names.push(name.to_string());
    }

    for name in present.iter().filter(|n| CATEGORICAL_COLUMNS.contains(n)) {
        let values = text_values(frame.column(name)?)?;
        let levels: BTreeSet<&str> = values.iter().flatten().map(String::as_str).collect();
        for level in levels.iter().skip(1) {
            columns.push(
                values
                    .iter()
                    .map(|v| if v.as_deref() == Some(*level) { 1.0 } else { 0.0 })
                    .collect(),
            );
            names.push(format!("{}_{}", name, level));
        }
    }

    let n_rows = frame.height();
    if n_rows == 0 || columns.is_empty() {
        return Err(AnalysisError::InsufficientData(format!(
            "feature matrix is empty ({} rows, {} columns)",
            n_rows,
            columns.len()
        )));
    }

    let matrix = Array2::from_shape_fn((n_rows, columns.len()), |(r, c)| columns[c][r]);
    debug!(features = ?names, "Encoded feature matrix");
    Ok((matrix, names))
}

/// Split row indices into train/test partitions.
///
/// Stratifies on the label when it has at least two classes with two members
/// each; otherwise falls back to a plain shuffled split.
pub fn train_test_split(target: &[usize], test_fraction: f64, seed: u64) -> TrainTestSplit {
    let n = target.len();
    let n_test = ((n as f64 * test_fraction).ceil() as usize).min(n);
    let mut rng = StdRng::seed_from_u64(seed);

    let mut by_class: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (row, &label) in target.iter().enumerate() {
        by_class.entry(label).or_default().push(row);
    }

    let stratify = by_class.len() >= 2 && by_class.values().all(|rows| rows.len() >= 2);
    if !stratify {
        if n > 0 {
            warn!(classes = by_class.len(), "Label cannot be stratified, using a plain split");
        }
        let mut rows: Vec<usize> = (0..n).collect();
        rows.shuffle(&mut rng);
        let train = rows.split_off(n_test);
        return TrainTestSplit {
            train,
            test: rows,
            stratified: false,
        };
    }

    // Largest-remainder allocation of test rows across classes
    let mut allocation: Vec<(usize, usize, f64)> = by_class
        .iter()
        .map(|(&class, rows)| {
            let exact = n_test as f64 * rows.len() as f64 / n as f64;
            (class, exact.floor() as usize, exact - exact.floor())
        })
        .collect();
    let assigned: usize = allocation.iter().map(|(_, count, _)| count).sum();
    let mut by_remainder: Vec<usize> = (0..allocation.len()).collect();
    by_remainder.sort_by(|&a, &b| {
        allocation[b]
            .2
            .partial_cmp(&allocation[a].2)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.cmp(&b))
    });
    for &slot in by_remainder.iter().take(n_test.saturating_sub(assigned)) {
        allocation[slot].1 += 1;
    }

    let mut train = Vec::with_capacity(n - n_test);
    let mut test = Vec::with_capacity(n_test);
    for (class, count, _) in allocation {
        let mut rows = by_class.remove(&class).unwrap_or_default();
        rows.shuffle(&mut rng);
        // keep at least one member of each class for training
        let count = count.min(rows.len() - 1);
        let class_train = rows.split_off(count);
        test.extend(rows);
        train.extend(class_train);
    }
    train.shuffle(&mut rng);
    test.shuffle(&mut rng);

    TrainTestSplit {
        train,
        test,
        stratified: true,
    }
}

/// Column values as text, casting non-text columns
pub(crate) fn text_values(column: &Column) -> PolarsResult<Vec<Option<String>>> {
    let text = column.cast(&DataType::String)?;
    let values = text
        .str()?
        .into_iter()
        .map(|v| v.map(str::to_string))
        .collect();
    Ok(values)
}

/// Column values as numbers; unparsable text becomes missing
pub(crate) fn numeric_values(column: &Column) -> PolarsResult<Vec<Option<f64>>> {
    let values: Vec<Option<f64>> = if column.dtype() == &DataType::String {
        column
            .str()?
            .into_iter()
            .map(|v| v.and_then(parse_number))
            .collect()
    } else {
        let numeric = column.cast(&DataType::Float64)?;
        let values: Vec<Option<f64>> = numeric.f64()?.into_iter().collect();
        values
    };
    Ok(values)
}

fn parse_number(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| !v.is_nan())
}

/// Label text to {0, 1}; anything unparsable counts as 0
fn parse_label(raw: &str) -> i32 {
    let raw = raw.trim();
    if let Some(value) = parse_number(raw) {
        return i32::from(value.is_finite() && value.trunc() != 0.0);
    }
    match raw.to_ascii_lowercase().as_str() {
        "true" | "yes" | "sim" => 1,
        _ => 0,
    }
}

fn label_values(frame: &DataFrame) -> Result<Array1<usize>, AnalysisError> {
    let column = frame
        .column(TARGET_COLUMN)
        .map_err(|_| AnalysisError::MissingColumn(TARGET_COLUMN.to_string()))?;
    Ok(numeric_values(column)?
        .into_iter()
        .map(|v| usize::from(v.unwrap_or(0.0) != 0.0))
        .collect())
}

/// Replace missing and infinite values with the median of the finite ones
fn impute_numeric(values: &[Option<f64>]) -> Vec<f64> {
    let finite: Vec<f64> = values.iter().flatten().copied().filter(|v| v.is_finite()).collect();
    let fill = median(&finite).unwrap_or(0.0);
    values
        .iter()
        .map(|v| match v {
            Some(x) if x.is_finite() => *x,
            _ => fill,
        })
        .collect()
}

/// Trim values and fill missing ones with the column mode
fn impute_categorical(values: &[Option<String>]) -> Vec<String> {
    let trimmed: Vec<Option<String>> = values
        .iter()
        .map(|v| {
            v.as_deref()
                .map(str::trim)
                .filter(|t| !is_null_token(t))
                .map(str::to_string)
        })
        .collect();

    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for value in trimmed.iter().flatten() {
        *counts.entry(value.as_str()).or_default() += 1;
    }
    let mut mode: Option<(&str, usize)> = None;
    for (value, count) in counts {
        if mode.map_or(true, |(_, best)| count > best) {
            mode = Some((value, count));
        }
    }
    let fill = mode
        .map(|(value, _)| value.to_string())
        .unwrap_or_else(|| UNKNOWN_CATEGORY.to_string());

    trimmed
        .into_iter()
        .map(|v| v.unwrap_or_else(|| fill.clone()))
        .collect()
}

/// Median of a slice, `None` when empty
pub(crate) fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}
