//! Logistic regression churn model implementation

use std::collections::BTreeSet;

use linfa::prelude::*;
use linfa_logistic::{FittedLogisticRegression, LogisticRegression};
use ndarray::{Array1, Array2};
use tracing::{info, warn};

use crate::config::AnalysisConfig;
use crate::data::CustomerData;
use crate::error::AnalysisError;

/// Probability above which a customer is predicted to churn
pub const DECISION_THRESHOLD: f64 = 0.5;

/// Fitted binary classifier with the feature names it was trained on
#[derive(Debug)]
pub struct ChurnModel {
    /// Fitted logistic regression from linfa
    pub model: FittedLogisticRegression<f64, usize>,
    /// Feature names aligned with the training matrix columns
    pub feature_names: Vec<String>,
    /// Number of rows the model was trained on
    pub n_train: usize,
    /// Whether linfa's positive class is the churn label
    positive_is_churn: bool,
}

/// Whether linfa-logistic picks label 1 as its positive class.
///
/// linfa makes the more frequent label positive; on a tie the first label seen wins.
fn churn_is_positive(labels: &[usize]) -> bool {
    let churned = labels.iter().filter(|&&l| l == 1).count();
    let retained = labels.len() - churned;
    match churned.cmp(&retained) {
        std::cmp::Ordering::Greater => true,
        std::cmp::Ordering::Less => false,
        std::cmp::Ordering::Equal => labels.first() == Some(&1),
    }
}

impl ChurnModel {
    /// Fit on the training partition of a prepared dataset
    pub fn fit(data: &CustomerData, config: &AnalysisConfig) -> Result<Self, AnalysisError> {
        let x = data.train_features();
        let y = data.train_target();

        if y.iter().copied().collect::<BTreeSet<usize>>().len() < 2 {
            return Err(AnalysisError::SingleClass);
        }

        info!(
            rows = x.nrows(),
            features = x.ncols(),
            alpha = config.regularization,
            max_iterations = config.max_iterations,
            "Fitting logistic regression"
        );

        let n_train = x.nrows();
        let positive_is_churn = churn_is_positive(y.as_slice().unwrap_or(&[]));
        let dataset = Dataset::new(x, y);
        let model = LogisticRegression::default()
            .alpha(config.regularization)
            .max_iterations(config.max_iterations)
            .with_intercept(true)
            .fit(&dataset)
            .map_err(|e| AnalysisError::Fit(e.to_string()))?;

        let fitted = Self {
            model,
            feature_names: data.feature_names.clone(),
            n_train,
            positive_is_churn,
        };
        info!(intercept = fitted.intercept(), positive_is_churn, "Model fitted");
        Ok(fitted)
    }

    /// Coefficients on the churn log-odds; positive values raise churn risk
    pub fn coefficients(&self) -> Array1<f64> {
        if self.positive_is_churn {
            self.model.params().clone()
        } else {
            -self.model.params()
        }
    }

    pub fn intercept(&self) -> f64 {
        if self.positive_is_churn {
            self.model.intercept()
        } else {
            -self.model.intercept()
        }
    }

    /// Churn probability of every row of `features`
    pub fn predict_proba(&self, features: &Array2<f64>) -> Result<Array1<f64>, AnalysisError> {
        let n_params = self.model.params().len();
        if features.ncols() != n_params {
            return Err(AnalysisError::FeatureMismatch {
                coefficients: n_params,
                features: features.ncols(),
            });
        }
        let proba = self.model.predict_probabilities(features);
        Ok(if self.positive_is_churn {
            proba
        } else {
            proba.mapv(|p| 1.0 - p)
        })
    }

    /// Predicted class (0 or 1) of every row of `features`
    pub fn predict(&self, features: &Array2<f64>) -> Result<Array1<usize>, AnalysisError> {
        Ok(self
            .predict_proba(features)?
            .mapv(|p| usize::from(p > DECISION_THRESHOLD)))
    }

    /// Score the model on the held-out partition
    pub fn evaluate(&self, data: &CustomerData) -> Result<Evaluation, AnalysisError> {
        let x = data.test_features();
        let y = data.test_target();
        if y.is_empty() {
            return Err(AnalysisError::InsufficientData(
                "test partition is empty".to_string(),
            ));
        }

        let predicted = self.predict(&x)?;
        let confusion = ConfusionMatrix::from_labels(
            y.as_slice().unwrap_or(&[]),
            predicted.as_slice().unwrap_or(&[]),
        );
        let metrics = confusion.metrics();
        info!(
            accuracy = metrics.accuracy,
            precision = metrics.precision,
            recall = metrics.recall,
            f1 = metrics.f1,
            "Model evaluated"
        );

        Ok(Evaluation { metrics, confusion })
    }
}

/// Metrics and confusion matrix on the test partition
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub metrics: ClassificationMetrics,
    pub confusion: ConfusionMatrix,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassificationMetrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    /// Whether precision/recall/F1 are support-weighted averages
    pub weighted: bool,
}

/// 2x2 confusion matrix, rows are actual labels, columns predicted labels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConfusionMatrix {
    pub counts: [[usize; 2]; 2],
}

impl ConfusionMatrix {
    pub fn from_labels(actual: &[usize], predicted: &[usize]) -> Self {
        let mut counts = [[0usize; 2]; 2];
        for (&a, &p) in actual.iter().zip(predicted) {
            counts[a.min(1)][p.min(1)] += 1;
        }
        Self { counts }
    }

    pub fn total(&self) -> usize {
        self.counts.iter().flatten().sum()
    }

    /// Precision, recall and F1 of one class; undefined ratios are 0
    fn class_scores(&self, class: usize) -> (f64, f64, f64) {
        let tp = self.counts[class][class] as f64;
        let predicted = (self.counts[0][class] + self.counts[1][class]) as f64;
        let actual = self.counts[class].iter().sum::<usize>() as f64;

        let precision = if predicted > 0.0 { tp / predicted } else { 0.0 };
        let recall = if actual > 0.0 { tp / actual } else { 0.0 };
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };
        (precision, recall, f1)
    }

    /// Accuracy plus positive-class scores.
    ///
    /// Falls back to support-weighted averages when every positive-class score is zero.
    pub fn metrics(&self) -> ClassificationMetrics {
        let total = self.total();
        let accuracy = if total > 0 {
            (self.counts[0][0] + self.counts[1][1]) as f64 / total as f64
        } else {
            0.0
        };

        let (precision, recall, f1) = self.class_scores(1);
        if precision != 0.0 || recall != 0.0 || f1 != 0.0 || total == 0 {
            return ClassificationMetrics {
                accuracy,
                precision,
                recall,
                f1,
                weighted: false,
            };
        }

        warn!("Positive-class metrics are all zero, reporting weighted averages");
        let mut weighted = (0.0, 0.0, 0.0);
        for class in 0..2 {
            let support = self.counts[class].iter().sum::<usize>() as f64 / total as f64;
            let (p, r, f) = self.class_scores(class);
            weighted.0 += support * p;
            weighted.1 += support * r;
            weighted.2 += support * f;
        }
        ClassificationMetrics {
            accuracy,
            precision: weighted.0,
            recall: weighted.1,
            f1: weighted.2,
            weighted: true,
        }
    }
}
