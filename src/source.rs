//! Raw dataset acquisition: object storage, local files and the synthetic fallback

use std::path::PathBuf;
use std::time::Duration;

use polars::prelude::DataFrame;
use tracing::{error, info, warn};

use crate::config::AnalysisConfig;
use crate::data::parse_csv;
use crate::error::LoadError;
use crate::synthetic::generate_customers;

/// Where the customer CSV comes from
pub trait DataSource: Send + Sync {
    /// Human-readable location, used in logs and errors
    fn describe(&self) -> String;

    /// Retrieve the raw CSV text
    fn fetch(&self) -> Result<String, LoadError>;
}

/// CSV blob stored in a Google Cloud Storage bucket
#[derive(Debug, Clone)]
pub struct ObjectStorageSource {
    pub bucket: String,
    pub object: String,
    pub access_token: Option<String>,
}

impl ObjectStorageSource {
    pub fn from_config(config: &AnalysisConfig) -> Self {
        Self {
            bucket: config.bucket.clone(),
            object: config.object.clone(),
            access_token: config.access_token.clone(),
        }
    }

    /// Media download URL of the object
    pub fn url(&self) -> String {
        format!(
            "https://storage.googleapis.com/storage/v1/b/{}/o/{}?alt=media",
            self.bucket,
            self.object.replace('/', "%2F")
        )
    }
}

impl DataSource for ObjectStorageSource {
    fn describe(&self) -> String {
        format!("gs://{}/{}", self.bucket, self.object)
    }

    fn fetch(&self) -> Result<String, LoadError> {
        let fail = |reason: String| LoadError::Fetch {
            source_name: self.describe(),
            object: self.object.clone(),
            reason,
        };

        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| fail(e.to_string()))?;

        let mut request = client.get(self.url());
        if let Some(token) = &self.access_token {
            request = request.bearer_auth(token);
        }

        request
            .send()
            .and_then(|response| response.error_for_status())
            .and_then(|response| response.text())
            .map_err(|e| fail(e.to_string()))
    }
}

/// CSV file on the local filesystem
#[derive(Debug, Clone)]
pub struct FileSource {
    pub path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl DataSource for FileSource {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn fetch(&self) -> Result<String, LoadError> {
        std::fs::read_to_string(&self.path).map_err(|e| LoadError::Fetch {
            source_name: self.describe(),
            object: self.path.display().to_string(),
            reason: e.to_string(),
        })
    }
}

/// Load the raw dataset, falling back to synthetic data when appropriate.
///
/// A failed fetch degrades to the seeded synthetic dataset only when no cloud
/// credentials are configured; with credentials present the failure is fatal.
pub fn acquire(source: &dyn DataSource, config: &AnalysisConfig) -> Result<DataFrame, LoadError> {
    info!(source = %source.describe(), "Loading dataset");

    match source.fetch() {
        Ok(text) => {
            let df = parse_csv(&text)?;
            info!(
                rows = df.height(),
                columns = df.width(),
                source = %source.describe(),
                "Dataset loaded"
            );
            Ok(df)
        }
        Err(e) if !config.credentials_present => {
            warn!(
                error = %e,
                rows = config.synthetic_rows,
                "Dataset unavailable and no cloud credentials configured, generating synthetic data"
            );
            generate_customers(config.synthetic_rows, config.seed)
        }
        Err(e) => {
            error!(error = %e, "Dataset unavailable although cloud credentials are configured");
            Err(LoadError::Permission(e.to_string()))
        }
    }
}
