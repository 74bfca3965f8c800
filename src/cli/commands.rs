//! Export and reimport commands

use clap::{Args, Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

use super::progress::BarProgress;
use super::CliError;
use crate::api::config::DEFAULT_BASE_URL;
use crate::api::{ClientConfig, CodaClient};
use crate::concurrency::config::{backoff_interval_from_secs, DEFAULT_FILE_CONCURRENCY};
use crate::concurrency::RetryMode;
use crate::pipeline::{ExportOptions, Exporter, ReimportOptions, Reimporter};
use crate::shutdown::SharedShutdown;

/// Maximum allowed remote concurrency
const MAX_CONCURRENCY: usize = 64;

/// Parse and validate concurrency value
fn parse_concurrency(s: &str) -> Result<usize, String> {
    let value: usize = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid number"))?;

    if value == 0 {
        return Err("concurrency must be at least 1".to_string());
    }
    if value > MAX_CONCURRENCY {
        return Err(format!(
            "concurrency {value} exceeds maximum of {MAX_CONCURRENCY}"
        ));
    }
    Ok(value)
}

/// Maximum allowed number of files written at once
const MAX_FILE_CONCURRENCY: usize = 4096;

fn parse_file_concurrency(s: &str) -> Result<usize, String> {
    let value: usize = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid number"))?;

    if !(1..=MAX_FILE_CONCURRENCY).contains(&value) {
        return Err(format!(
            "file concurrency must be between 1 and {MAX_FILE_CONCURRENCY}"
        ));
    }
    Ok(value)
}

/// Coda exporter CLI
#[derive(Parser, Debug)]
#[command(name = "coda-exporter")]
#[command(about = "Export coda.io documents and reimport table snapshots", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Maximum number of retries for failed requests (range: 0-20)
    #[arg(
        long,
        global = true,
        default_value = "5",
        value_parser = clap::value_parser!(u32).range(0..=20)
    )]
    pub max_retries: u32,

    /// Number of remote requests in flight (max: 64)
    ///
    /// A request keeps its slot while it waits out retries and rate-limit backoff,
    /// so very low values can stall behind a long backoff window.
    #[arg(long, global = true, default_value = "16", value_parser = parse_concurrency)]
    pub concurrency: usize,

    /// Seconds to back off after the service reports a rate limit (0 = default of 10)
    #[arg(long, global = true, default_value = "10")]
    pub backoff_secs: u64,

    /// Which failures to retry: all (everything but fatal) or transient
    #[arg(long, global = true, default_value = "all")]
    pub retry_mode: RetryMode,

    /// API root
    #[arg(long, global = true, default_value = DEFAULT_BASE_URL)]
    pub api_base_url: String,

    /// Serve Prometheus metrics on this address (e.g. 127.0.0.1:9000)
    #[arg(long, global = true)]
    pub metrics_addr: Option<SocketAddr>,

    /// Hide progress bars
    #[arg(long, global = true, default_value_t = false)]
    pub no_progress: bool,
}

impl Cli {
    /// Client settings for `api_token` from the global flags
    pub fn client_config(&self, api_token: &str) -> ClientConfig {
        ClientConfig::new(api_token)
            .with_base_url(&self.api_base_url)
            .with_max_retries(self.max_retries)
            .with_retry_mode(self.retry_mode)
            .with_concurrency(self.concurrency)
            .with_backoff_interval(backoff_interval_from_secs(self.backoff_secs))
    }

    fn progress(&self) -> Arc<BarProgress> {
        if self.no_progress {
            Arc::new(BarProgress::hidden())
        } else {
            Arc::new(BarProgress::new())
        }
    }
}

/// CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Export every document (or one) to a local directory
    Export(ExportArgs),

    /// Replace the rows of a document's tables with an exported snapshot
    Reimport(ReimportArgs),
}

/// API credentials
#[derive(Args, Debug)]
pub struct Credentials {
    /// coda.io API token
    #[arg(long)]
    pub api_token: String,
}

/// Export command arguments
#[derive(Args, Debug)]
pub struct ExportArgs {
    /// API credentials
    #[command(flatten)]
    pub credentials: Credentials,

    /// Directory receiving the export
    #[arg(long)]
    pub dest_dir: PathBuf,

    /// Export only this document
    #[arg(long)]
    pub src_doc_id: Option<String>,

    /// Number of files written at once (max: 4096)
    #[arg(long, default_value_t = DEFAULT_FILE_CONCURRENCY, value_parser = parse_file_concurrency)]
    pub file_concurrency: usize,
}

/// Reimport command arguments
#[derive(Args, Debug)]
pub struct ReimportArgs {
    /// API credentials
    #[command(flatten)]
    pub credentials: Credentials,

    /// Exported document directory to read snapshots from
    #[arg(long)]
    pub src_dir: PathBuf,

    /// Document receiving the rows
    #[arg(long)]
    pub dest_doc_id: String,
}

impl ExportArgs {
    /// Execute the export
    pub async fn execute(&self, cli: &Cli, shutdown: SharedShutdown) -> Result<(), CliError> {
        if self.dest_dir.exists() && !self.dest_dir.is_dir() {
            return Err(CliError::InvalidArgument(format!(
                "destination {} is not a directory",
                self.dest_dir.display()
            )));
        }

        let client = CodaClient::new(&cli.client_config(&self.credentials.api_token))?;
        let mut options =
            ExportOptions::new(&self.dest_dir).with_file_concurrency(self.file_concurrency);
        if let Some(doc_id) = &self.src_doc_id {
            options = options.with_doc_id(doc_id);
        }

        let progress = cli.progress();
        let result = Exporter::new(Arc::new(client), options)
            .export(&shutdown.token(), progress.clone())
            .await;
        progress.finish();

        match result {
            Ok(summary) => {
                println!("\nExport completed successfully!");
                println!("Output: {}", self.dest_dir.display());
                println!("Documents: {}", summary.docs);
                println!("Tables: {}", summary.tables);
                println!("Rows: {}", summary.rows);
                Ok(())
            }
            Err(e) => {
                eprintln!("\nExport failed!");
                eprintln!("Error: {e}");
                error!("Export failed: {}", e);
                info!("Partial output is left in {}", self.dest_dir.display());
                Err(e.into())
            }
        }
    }
}

impl ReimportArgs {
    /// Execute the reimport
    pub async fn execute(&self, cli: &Cli, shutdown: SharedShutdown) -> Result<(), CliError> {
        let client = CodaClient::new(&cli.client_config(&self.credentials.api_token))?;
        let options = ReimportOptions::new(&self.src_dir, &self.dest_doc_id);

        let progress = cli.progress();
        let result = Reimporter::new(Arc::new(client), options)
            .reimport(&shutdown.token(), progress.clone())
            .await;
        progress.finish();

        match result {
            Ok(summary) => {
                println!("\nReimport completed successfully!");
                println!("Document: {}", self.dest_doc_id);
                println!("Tables: {}", summary.tables);
                println!("Rows deleted: {}", summary.rows_deleted);
                println!("Rows inserted: {}", summary.rows_inserted);
                Ok(())
            }
            Err(e) => {
                eprintln!("\nReimport failed!");
                eprintln!("Error: {e}");
                error!("Reimport failed: {}", e);
                Err(e.into())
            }
        }
    }
}
