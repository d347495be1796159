//! Command-line interface definitions and argument parsing

use std::path::PathBuf;

use clap::Parser;

use crate::config::{AnalysisConfig, DEFAULT_BUCKET, DEFAULT_OBJECT};
use crate::server::ServerConfig;
use crate::source::{DataSource, FileSource, ObjectStorageSource};

/// Customer churn analytics: statistics, logistic regression and charts over HTTP
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Address to bind the HTTP server to
    #[arg(long, env = "API_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value = "8080")]
    pub port: u16,

    /// Object-storage bucket holding the dataset
    #[arg(long, env = "GCS_BUCKET", default_value = DEFAULT_BUCKET)]
    pub bucket: String,

    /// Object name of the dataset inside the bucket
    #[arg(long, env = "DATA_OBJECT", default_value = DEFAULT_OBJECT)]
    pub object: String,

    /// Read the dataset from a local CSV file instead of object storage
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Run the full analysis once, write the JSON response here and exit
    #[arg(short, long)]
    pub report: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    pub fn analysis_config(&self) -> AnalysisConfig {
        AnalysisConfig {
            bucket: self.bucket.clone(),
            object: self.object.clone(),
            ..AnalysisConfig::default()
        }
    }

    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            host: self.host.clone(),
            port: self.port,
        }
    }

    /// Local file when `--input` is given, object storage otherwise
    pub fn data_source(&self, config: &AnalysisConfig) -> Box<dyn DataSource> {
        match &self.input {
            Some(path) => Box::new(FileSource::new(path)),
            None => Box::new(ObjectStorageSource::from_config(config)),
        }
    }

    /// Default tracing filter when `RUST_LOG` is unset
    pub fn log_filter(&self) -> &'static str {
        if self.verbose {
            "churnlens=debug,tower_http=debug"
        } else {
            "churnlens=info,tower_http=info"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_args() {
        let args = Args::try_parse_from([
            "churnlens",
            "--host",
            "127.0.0.1",
            "--port",
            "9000",
            "--bucket",
            "dados",
            "--input",
            "clientes.csv",
            "--verbose",
        ])
        .unwrap();

        assert_eq!(args.server_config().host, "127.0.0.1");
        assert_eq!(args.server_config().port, 9000);
        assert_eq!(args.analysis_config().bucket, "dados");
        assert!(args.report.is_none());
        assert!(args.log_filter().contains("debug"));

        let config = args.analysis_config();
        assert_eq!(args.data_source(&config).describe(), "clientes.csv");
    }

    #[test]
    fn test_object_storage_source_by_default() {
        let args = Args::try_parse_from(["churnlens", "--bucket", "dados", "--object", "raw.csv"]).unwrap();
        let config = args.analysis_config();
        assert_eq!(args.data_source(&config).describe(), "gs://dados/raw.csv");
        assert_eq!(args.log_filter(), "churnlens=info,tower_http=info");
    }

    #[test]
    fn test_invalid_port_is_rejected() {
        assert!(Args::try_parse_from(["churnlens", "--port", "not-a-port"]).is_err());
    }
}
