//! Error types for data acquisition, analysis stages and request dispatch

use polars::prelude::PolarsError;
use thiserror::Error;

/// Failure to obtain the raw dataset
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("failed to fetch '{object}' from {source_name}: {reason}")]
    Fetch {
        source_name: String,
        object: String,
        reason: String,
    },

    #[error(
        "object storage fetch failed while credentials are configured \
         (check bucket, object name and permissions): {0}"
    )]
    Permission(String),

    #[error("failed to parse CSV: {0}")]
    Parse(#[from] PolarsError),

    #[error("failed to generate synthetic dataset: {0}")]
    Synthetic(String),
}

/// Failure inside one analysis stage; other stages keep running
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("column '{0}' not found")]
    MissingColumn(String),

    #[error("no numeric column found for distributions")]
    NoNumericColumns,

    #[error("training labels hold a single class; a classifier cannot be fit")]
    SingleClass,

    #[error("insufficient data: {0}")]
    InsufficientData(String),

    #[error("model could not be trained: {0}")]
    ModelUnavailable(String),

    #[error("{coefficients} coefficients do not match {features} feature names")]
    FeatureMismatch { coefficients: usize, features: usize },

    #[error("model fitting failed: {0}")]
    Fit(String),

    #[error("chart rendering failed: {0}")]
    Render(String),

    #[error("data processing error: {0}")]
    Data(#[from] PolarsError),
}

/// Top-level failure of a request
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("invalid step: {0}")]
    InvalidStep(String),

    #[error("critical error loading data: {0}")]
    DataLoad(#[from] LoadError),

    #[error("data preprocessing failed: {0}")]
    Preprocessing(AnalysisError),

    #[error("failed to serialize response: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    /// HTTP status code this error maps to
    pub fn status_code(&self) -> u16 {
        match self {
            ServiceError::InvalidStep(_) => 400,
            _ => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(ServiceError::InvalidStep("bogus".into()).status_code(), 400);
        assert_eq!(ServiceError::Internal("boom".into()).status_code(), 500);
        let load = ServiceError::from(LoadError::Permission("denied".into()));
        assert_eq!(load.status_code(), 500);
    }

    #[test]
    fn test_invalid_step_names_step() {
        let err = ServiceError::InvalidStep("bogus".into());
        assert!(err.to_string().contains("bogus"));
    }
}
