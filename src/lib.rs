//! churnlens: customer churn analytics behind a single HTTP endpoint
//!
//! Loads a customer dataset from object storage (or synthesizes one), cleans
//! and encodes it with Polars, computes descriptive statistics and chi-squared
//! associations, fits a logistic regression with linfa, and renders charts
//! as base64 PNG images.

pub mod cli;
pub mod config;
pub mod data;
pub mod dispatch;
pub mod error;
pub mod insights;
pub mod model;
pub mod report;
pub mod server;
pub mod session;
pub mod source;
pub mod stats;
pub mod synthetic;
pub mod viz;

// Re-export public items for easier access
pub use cli::Args;
pub use config::AnalysisConfig;
pub use data::CustomerData;
pub use dispatch::{dispatch, AnalysisRequest};
pub use error::{AnalysisError, LoadError, ServiceError};
pub use model::ChurnModel;
pub use report::{ApiResponse, FullReport};
pub use server::{create_router, run_server, ServerConfig};
pub use session::AnalysisSession;
pub use source::{DataSource, FileSource, ObjectStorageSource};

/// Common result type used throughout the application
pub type Result<T> = anyhow::Result<T>;
