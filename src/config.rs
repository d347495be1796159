//! Pipeline configuration and the dataset schema

use std::env;

/// Label column: 1 when the customer cancelled
pub const TARGET_COLUMN: &str = "cancelou";

/// Call-center contact count, used by the call-center impact stage
pub const CALLS_COLUMN: &str = "ligacoes_callcenter";

pub const NUMERIC_COLUMNS: [&str; 5] = [
    "idade",
    "frequencia_uso",
    "total_gasto",
    "ligacoes_callcenter",
    "meses_ultima_interacao",
];

pub const CATEGORICAL_COLUMNS: [&str; 3] = ["sexo", "assinatura", "duracao_contrato"];

/// Columns fed to the classifier, in encoding order
pub const FEATURE_COLUMNS: [&str; 8] = [
    "idade",
    "frequencia_uso",
    "total_gasto",
    "ligacoes_callcenter",
    "meses_ultima_interacao",
    "sexo",
    "assinatura",
    "duracao_contrato",
];

/// Columns that identify a customer and must never become features
pub const IDENTIFIER_COLUMNS: [&str; 1] = ["customerid"];

/// English headers accepted as aliases of the stored column names
pub const COLUMN_ALIASES: [(&str, &str); 9] = [
    ("age", "idade"),
    ("sex", "sexo"),
    ("usage_frequency", "frequencia_uso"),
    ("total_spend", "total_gasto"),
    ("callcenter_calls", "ligacoes_callcenter"),
    ("months_since_last_interaction", "meses_ultima_interacao"),
    ("subscription_tier", "assinatura"),
    ("contract_duration", "duracao_contrato"),
    ("churned", "cancelou"),
];

pub const DEFAULT_BUCKET: &str = "seu-bucket-generico-de-dados";
pub const DEFAULT_OBJECT: &str = "cancelamentos.csv";

/// Environment variables whose presence means object storage is expected to work
pub const CREDENTIAL_VARS: [&str; 2] = ["GOOGLE_APPLICATION_CREDENTIALS", "GOOGLE_CLOUD_PROJECT"];

/// Settings for data acquisition, preprocessing and model fitting
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    /// Object-storage bucket holding the dataset
    pub bucket: String,
    /// Object name of the CSV blob
    pub object: String,
    /// Optional bearer token for object-storage requests
    pub access_token: Option<String>,
    /// Whether cloud credentials are configured in the environment
    pub credentials_present: bool,
    /// Rows generated by the synthetic fallback
    pub synthetic_rows: usize,
    /// Seed shared by the synthetic generator and the train/test split
    pub seed: u64,
    /// Share of rows held out for evaluation
    pub test_fraction: f64,
    /// L2 penalty of the logistic regression (inverse of C = 0.1)
    pub regularization: f64,
    /// Iteration cap of the logistic regression solver
    pub max_iterations: u64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            bucket: env::var("GCS_BUCKET").unwrap_or_else(|_| DEFAULT_BUCKET.to_string()),
            object: env::var("DATA_OBJECT").unwrap_or_else(|_| DEFAULT_OBJECT.to_string()),
            access_token: env::var("GCS_ACCESS_TOKEN").ok().filter(|t| !t.is_empty()),
            credentials_present: credentials_in_env(),
            synthetic_rows: 10_000,
            seed: 42,
            test_fraction: 0.25,
            regularization: 10.0,
            max_iterations: 2000,
        }
    }
}

/// True when any cloud credential variable is set and non-empty
pub fn credentials_in_env() -> bool {
    CREDENTIAL_VARS
        .iter()
        .any(|var| env::var(var).map(|v| !v.is_empty()).unwrap_or(false))
}
