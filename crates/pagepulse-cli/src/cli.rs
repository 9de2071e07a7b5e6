use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use pagepulse_core::ApiConfig;
use pagepulse_fetch::RetryPolicy;
use pagepulse_store::{METRICS_TABLE, WORKLIST_TABLE};

#[derive(Parser, Debug)]
#[command(
    name = "pagepulse",
    version,
    about = "Collect PageSpeed Insights and CrUX metrics into a tabular store"
)]
pub struct Cli {
    /// DuckDB database file holding the worklist and metrics tables.
    #[arg(long, env = "PAGEPULSE_DB", default_value = "pagepulse.duckdb", global = true)]
    pub db: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Load a worklist CSV/Parquet file (Tipo, URL, Marca, Strategy).
    Import(ImportArgs),
    /// Analyse every worklist entry and store one row per (site, strategy).
    Run(RunArgs),
    /// Analyse a single URL and print the resulting record.
    Probe(ProbeArgs),
    /// Query the CrUX API for a site and print the raw record.
    Crux(CruxArgs),
    /// Print the latest stored rows.
    Show(ShowArgs),
    /// Export a table to CSV or Parquet.
    Export(ExportArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ApiArgs {
    /// PageSpeed Insights API key.
    #[arg(long, env = "PAGEPULSE_PSI_KEY", hide_env_values = true)]
    pub psi_key: String,

    /// CrUX API key; defaults to the PSI key.
    #[arg(long, env = "PAGEPULSE_CRUX_KEY", hide_env_values = true)]
    pub crux_key: Option<String>,

    /// Total attempts per request when the server fails with 5xx.
    #[arg(long, default_value_t = 3)]
    pub max_attempts: u32,

    /// Delay between attempts, in milliseconds.
    #[arg(long, default_value_t = 1000)]
    pub backoff_ms: u64,
}

impl ApiArgs {
    pub fn api_config(&self) -> ApiConfig {
        let crux_key = self.crux_key.as_deref().unwrap_or(&self.psi_key);
        ApiConfig::new(self.psi_key.as_str(), crux_key)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            backoff: Duration::from_millis(self.backoff_ms),
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct ImportArgs {
    pub path: PathBuf,

    #[arg(long, default_value = WORKLIST_TABLE)]
    pub table: String,
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    #[command(flatten)]
    pub api: ApiArgs,

    #[arg(long, default_value = WORKLIST_TABLE)]
    pub worklist_table: String,

    #[arg(long, default_value = METRICS_TABLE)]
    pub output_table: String,

    /// Replace the output table instead of appending to it.
    #[arg(long, default_value_t = false)]
    pub overwrite: bool,

    /// Requests in flight at once.
    #[arg(long, default_value_t = 4)]
    pub concurrency: usize,

    #[arg(long, default_value = "pt-BR")]
    pub locale: String,
}

#[derive(Args, Debug, Clone)]
pub struct ProbeArgs {
    #[command(flatten)]
    pub api: ApiArgs,

    pub url: String,

    /// desktop or mobile.
    #[arg(long, default_value = "desktop")]
    pub strategy: String,

    /// performance, seo, best_practices or accessibility.
    #[arg(long, default_value = "performance")]
    pub category: String,

    /// origin or url.
    #[arg(long, default_value = "url")]
    pub query_type: String,

    #[arg(long, default_value = "pt-BR")]
    pub locale: String,

    /// Brand label for the `Marca` column.
    #[arg(long, default_value = "")]
    pub label: String,

    /// Print the raw JSON response instead of the record.
    #[arg(long, default_value_t = false)]
    pub raw: bool,
}

#[derive(Args, Debug, Clone)]
pub struct CruxArgs {
    #[command(flatten)]
    pub api: ApiArgs,

    pub site: String,

    /// origin or url.
    #[arg(long, default_value = "origin")]
    pub query_type: String,

    /// DESKTOP, PHONE or TABLET; all devices when omitted.
    #[arg(long)]
    pub form_factor: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct ShowArgs {
    #[arg(long, default_value = METRICS_TABLE)]
    pub table: String,

    #[arg(long, default_value_t = 20)]
    pub limit: usize,
}

#[derive(Args, Debug, Clone)]
pub struct ExportArgs {
    /// Destination file; the extension picks CSV or Parquet.
    pub path: PathBuf,

    #[arg(long, default_value = METRICS_TABLE)]
    pub table: String,
}
