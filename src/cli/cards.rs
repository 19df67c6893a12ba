//! Cards command implementation

use clap::Args;
use std::path::PathBuf;
use tracing::{error, info};

use super::extract::{open_sink, print_report, Cli, OutputFormat, SinkFormat};
use super::CliError;
use crate::fetcher::cards::default_card_columns;
use crate::fetcher::CardFetcher;
use crate::schema::{parse_columns, ColumnSpec};

/// Arguments for `cards`
#[derive(Args, Debug)]
pub struct CardsArgs {
    /// Ads account id
    #[arg(long)]
    pub account_id: String,

    /// Keep cards created on or after this day (YYYY-MM-DD)
    #[arg(long)]
    pub entity_start_date: Option<String>,

    /// Keep cards created on or before this day (YYYY-MM-DD)
    #[arg(long)]
    pub entity_end_date: Option<String>,

    /// Timezone for the date filter; without it no filtering happens
    #[arg(long)]
    pub entity_timezone: Option<String>,

    /// Output column as name:type[:format]; defaults to the standard card columns
    #[arg(long = "column")]
    pub columns: Vec<String>,

    /// Row output file; stdout when omitted
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Row format: csv or jsonl
    #[arg(long, default_value = "csv")]
    pub format: SinkFormat,
}

impl CardsArgs {
    /// Declared columns, or the default card columns
    pub fn columns(&self) -> Result<Vec<ColumnSpec>, CliError> {
        if self.columns.is_empty() {
            return Ok(default_card_columns());
        }
        Ok(parse_columns(&self.columns)?)
    }

    /// Execute the cards command
    pub async fn execute(&self, cli: &Cli) -> Result<(), CliError> {
        let columns = self.columns()?;
        let fetcher = CardFetcher::new(cli.http_client()?, cli.api_config());

        info!("Fetching cards for account {}", self.account_id);
        let rows = fetcher
            .fetch_pages(
                &self.account_id,
                self.entity_start_date.as_deref(),
                self.entity_end_date.as_deref(),
                self.entity_timezone.as_deref(),
                &columns,
            )
            .await;

        let rows = match rows {
            Ok(rows) => rows,
            Err(e) => {
                eprintln!("\nCards fetch failed!");
                eprintln!("Error: {e}");
                error!("Cards fetch failed: {}", e);
                return Err(e.into());
            }
        };

        let mut sink = open_sink(self.output.as_ref(), self.format, columns)?;
        let count = rows.len();
        for row in rows {
            sink.add(row)?;
        }
        sink.finish()?;

        let report = match cli.output_format {
            OutputFormat::Json => serde_json::json!({
                "success": true,
                "account_id": self.account_id,
                "output": self.output.as_ref().map(|p| p.display().to_string()),
                "cards": count,
            })
            .to_string(),
            OutputFormat::Human => format!(
                "\nCards fetched successfully!\nAccount: {}\nCards: {}",
                self.account_id, count
            ),
        };
        print_report(self.output.is_some(), &report);
        Ok(())
    }
}
