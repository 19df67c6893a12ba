//! Extract command implementation

use chrono::NaiveDate;
use chrono_tz::Tz;
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::Write;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{error, info};

use super::cards::CardsArgs;
use super::CliError;
use crate::extract::config::{DEFAULT_PAGE_SIZE, MAX_RETRIES};
use crate::extract::window::{parse_date, parse_timezone};
use crate::extract::{ExtractExecutor, ExtractJob, ExtractSummary, FetchMode};
use crate::fetcher::ads_config::{DEFAULT_API_VERSION, DEFAULT_BASE_URL};
use crate::fetcher::{AdsApiConfig, AdsHttpClient, BearerAuthorizer, ReqwestTransport};
use crate::output::{CsvRowSink, JsonLinesSink, RowSink};
use crate::schema::{parse_columns, ColumnSpec};
use crate::{EntityType, Granularity, MetricGroup, Placement};

/// Twitter Ads analytics extractor
#[derive(Parser, Debug)]
#[command(name = "twitter-ads-analytics")]
#[command(about = "Extract Twitter/X Ads API analytics into tabular rows", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Output format for the run summary: human or json
    #[arg(long, global = true, default_value = "human")]
    pub output_format: OutputFormat,

    /// Ads API host
    #[arg(long, global = true, env = "TWITTER_ADS_API_BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub api_base_url: String,

    /// Ads API version
    #[arg(long, global = true, env = "TWITTER_ADS_API_VERSION", default_value = DEFAULT_API_VERSION)]
    pub api_version: String,

    /// Bearer token used to authorize Ads API requests
    #[arg(long, global = true, env = "TWITTER_ADS_BEARER_TOKEN", hide_env_values = true)]
    pub bearer_token: Option<String>,

    /// Maximum retries for rate-limited and 5xx responses (1-20)
    #[arg(long, global = true, default_value_t = MAX_RETRIES, value_parser = clap::value_parser!(u32).range(1..=20))]
    pub max_retries: u32,

    /// Address for the Prometheus scrape endpoint (e.g. 127.0.0.1:9000)
    #[arg(long, global = true)]
    pub metrics_addr: Option<SocketAddr>,
}

impl Cli {
    /// API configuration from the global flags
    pub fn api_config(&self) -> AdsApiConfig {
        AdsApiConfig::new(&self.api_base_url, &self.api_version)
    }

    /// Retrying client authorized with the bearer token
    pub fn http_client(&self) -> Result<Arc<AdsHttpClient>, CliError> {
        let token = self
            .bearer_token
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| {
                CliError::ConfigurationError(
                    "a bearer token is required (--bearer-token or TWITTER_ADS_BEARER_TOKEN)"
                        .to_string(),
                )
            })?;

        let transport = ReqwestTransport::shared(Arc::new(BearerAuthorizer::new(token)));
        Ok(Arc::new(
            AdsHttpClient::new(Arc::new(transport)).with_max_retries(self.max_retries),
        ))
    }
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Extract per-day stats for every entity of an account
    Extract(ExtractArgs),
    /// List an account's cards
    Cards(CardsArgs),
}

/// Summary output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// JSON output
    Json,
    /// Human-readable output
    Human,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "human" => Ok(OutputFormat::Human),
            _ => Err(format!("Invalid output format: {s}")),
        }
    }
}

/// Row file format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkFormat {
    /// Comma-separated values with a header row
    Csv,
    /// One JSON object per line
    Jsonl,
}

impl FromStr for SinkFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "csv" => Ok(SinkFormat::Csv),
            "jsonl" | "ndjson" => Ok(SinkFormat::Jsonl),
            _ => Err(format!("Invalid row format: {s}. Valid options: csv, jsonl")),
        }
    }
}

/// Open the row sink; no path means stdout
pub fn open_sink(
    output: Option<&PathBuf>,
    format: SinkFormat,
    columns: Vec<ColumnSpec>,
) -> Result<Box<dyn RowSink>, CliError> {
    let sink: Box<dyn RowSink> = match (output, format) {
        (Some(path), SinkFormat::Csv) => Box::new(CsvRowSink::create(path, columns)?),
        (Some(path), SinkFormat::Jsonl) => Box::new(JsonLinesSink::create(path, columns)?),
        (None, SinkFormat::Csv) => Box::new(CsvRowSink::new(stdout_writer(), columns)),
        (None, SinkFormat::Jsonl) => Box::new(JsonLinesSink::new(stdout_writer(), columns)),
    };
    Ok(sink)
}

fn stdout_writer() -> Box<dyn Write> {
    Box::new(std::io::stdout())
}

/// Arguments for `extract`
#[derive(Args, Debug)]
pub struct ExtractArgs {
    /// Ads account id
    #[arg(long)]
    pub account_id: String,

    /// Entity type (ACCOUNT, CAMPAIGN, LINE_ITEM, PROMOTED_TWEET, MEDIA_CREATIVE, FUNDING_INSTRUMENT)
    #[arg(long)]
    pub entity: EntityType,

    /// Comma-separated metric groups (e.g. ENGAGEMENT,BILLING)
    #[arg(long, value_delimiter = ',', required = true)]
    pub metric_groups: Vec<MetricGroup>,

    /// Granularity (DAY, HOUR, TOTAL)
    #[arg(long, default_value = "DAY")]
    pub granularity: Granularity,

    /// Placement (ALL_ON_TWITTER, PUBLISHER_NETWORK, SPOTLIGHT, TREND)
    #[arg(long, default_value = "ALL_ON_TWITTER")]
    pub placement: Placement,

    /// First day (YYYY-MM-DD, inclusive)
    #[arg(long, value_parser = parse_date)]
    pub start_date: NaiveDate,

    /// Last day (YYYY-MM-DD, inclusive)
    #[arg(long, value_parser = parse_date)]
    pub end_date: NaiveDate,

    /// IANA timezone days are interpreted in
    #[arg(long, default_value = "UTC", value_parser = parse_timezone)]
    pub timezone: Tz,

    /// Use async stats jobs instead of synchronous requests
    #[arg(long = "async", default_value_t = false)]
    pub async_mode: bool,

    /// Output column as name:type[:format]; repeat in output order
    #[arg(long = "column", required = true)]
    pub columns: Vec<String>,

    /// Entity listing page size
    #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
    pub page_size: usize,

    /// Entities per stats request (1-20)
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Row output file; stdout when omitted
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Row format: csv or jsonl
    #[arg(long, default_value = "csv")]
    pub format: SinkFormat,
}

impl ExtractArgs {
    /// Build the extraction job
    pub fn to_job(&self) -> Result<ExtractJob, CliError> {
        let columns = parse_columns(&self.columns)?;
        let mode = if self.async_mode {
            FetchMode::Async
        } else {
            FetchMode::Sync
        };

        let mut job = ExtractJob::new(
            self.account_id.clone(),
            self.entity,
            self.metric_groups.clone(),
            self.granularity,
            self.placement,
            self.start_date,
            self.end_date,
            self.timezone,
            columns,
            mode,
        )
        .with_page_size(self.page_size);
        if let Some(batch_size) = self.batch_size {
            job = job.with_batch_size(batch_size);
        }

        job.validate()?;
        Ok(job)
    }

    /// Execute the extract command
    pub async fn execute(&self, cli: &Cli) -> Result<(), CliError> {
        let job = self.to_job()?;
        let http = cli.http_client()?;
        let executor =
            ExtractExecutor::new(http, cli.api_config()).with_progress_bar(create_progress_bar(&job));

        let mut sink = open_sink(self.output.as_ref(), self.format, job.columns.clone())?;

        info!(
            "Starting {} extract: account {} {} from {} to {}",
            job.mode, job.account_id, job.entity_type, job.start_date, job.end_date
        );
        let result = executor.execute(&job, sink.as_mut()).await;

        match cli.output_format {
            OutputFormat::Json => output_json(&job, self.output.as_ref(), &result),
            OutputFormat::Human => output_human(&job, self.output.as_ref(), &result),
        }

        result.map(|_| ()).map_err(CliError::from)
    }
}

fn output_json(
    job: &ExtractJob,
    output: Option<&PathBuf>,
    result: &Result<ExtractSummary, crate::extract::ExtractError>,
) {
    let (summary, err) = match result {
        Ok(summary) => (Some(summary), None),
        Err(e) => (None, Some(e.to_string())),
    };

    let report = serde_json::json!({
        "success": err.is_none(),
        "account_id": job.account_id,
        "entity": job.entity_type.api_name(),
        "mode": job.mode,
        "start_date": job.start_date.to_string(),
        "end_date": job.end_date.to_string(),
        "timezone": job.timezone.name(),
        "output": output.map(|p| p.display().to_string()),
        "summary": summary,
        "error": err,
    });
    print_report(output.is_some(), &report.to_string());
}

fn output_human(
    job: &ExtractJob,
    output: Option<&PathBuf>,
    result: &Result<ExtractSummary, crate::extract::ExtractError>,
) {
    match result {
        Ok(summary) => {
            let lines = [
                "\nExtract completed successfully!".to_string(),
                format!("Account: {} ({})", job.account_id, job.entity_type),
                format!("Range: {} to {} ({})", job.start_date, job.end_date, job.timezone),
                format!(
                    "Output: {}",
                    output.map_or("stdout".to_string(), |p| p.display().to_string())
                ),
                format!("Mode: {}", summary.mode),
                format!("Entities: {}", summary.entities),
                format!("Chunks: {}", summary.chunks),
                format!("Records: {}", summary.records),
                format!("Rows emitted: {}", summary.rows_emitted),
            ];
            print_report(output.is_some(), &lines.join("\n"));
        }
        Err(e) => {
            eprintln!("\nExtract failed!");
            eprintln!("Error: {e}");
            error!("Extract failed: {}", e);
        }
    }
}

/// Reports go to stdout unless rows already do
pub(crate) fn print_report(rows_to_file: bool, report: &str) {
    if rows_to_file {
        println!("{report}");
    } else {
        eprintln!("{report}");
    }
}

/// Create progress bar with style
fn create_progress_bar(job: &ExtractJob) -> ProgressBar {
    let pb = ProgressBar::new(0);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} chunks {msg}")
    {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb.set_message(format!("Extracting {} {}", job.account_id, job.entity_type));
    pb
}
