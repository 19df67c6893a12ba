//! Card listing
//!
//! Cards are paginated like other entities, optionally filtered by their
//! `created_at` against an inclusive date range in a given timezone, and
//! projected onto the declared columns in declaration order.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

use crate::extract::window::{midnight, parse_timezone};
use crate::fetcher::ads_config::AdsApiConfig;
use crate::fetcher::ads_http::AdsHttpClient;
use crate::fetcher::pagination::paginate;
use crate::fetcher::{FetcherError, FetcherResult};
use crate::output::value::{coerce, parse_timestamp};
use crate::schema::{ColumnSpec, ColumnType, ColumnValue, Row};

/// Columns emitted when none are declared
pub fn default_card_columns() -> Vec<ColumnSpec> {
    [
        ("name", ColumnType::String),
        ("components", ColumnType::Json),
        ("id", ColumnType::String),
        ("created_at", ColumnType::String),
        ("card_uri", ColumnType::String),
        ("updated_at", ColumnType::String),
        ("deleted", ColumnType::Boolean),
        ("card_type", ColumnType::String),
    ]
    .into_iter()
    .enumerate()
    .map(|(index, (name, column_type))| ColumnSpec::new(index, name, column_type))
    .collect()
}

/// Inclusive `created_at` bounds
#[derive(Debug, Clone, PartialEq)]
pub struct CreatedAtFilter {
    start: Option<DateTime<Tz>>,
    end: Option<DateTime<Tz>>,
}

impl CreatedAtFilter {
    /// Build a filter from raw boundary strings
    ///
    /// Without a timezone no filtering happens and `None` is returned.
    /// Boundaries are `YYYY-MM-DD` (midnight of that day) or a local
    /// `YYYY-MM-DDTHH:MM[:SS]` datetime, both interpreted in the timezone.
    ///
    /// # Errors
    /// `InvalidArgument` for an unknown timezone or an unparsable boundary.
    pub fn parse(
        start: Option<&str>,
        end: Option<&str>,
        timezone: Option<&str>,
    ) -> FetcherResult<Option<Self>> {
        let Some(timezone) = timezone else {
            return Ok(None);
        };
        let tz = parse_timezone(timezone).map_err(FetcherError::InvalidArgument)?;

        let start = start
            .map(|s| parse_boundary(s, tz).map_err(|e| invalid("entity start date", s, e)))
            .transpose()?;
        let end = end
            .map(|s| parse_boundary(s, tz).map_err(|e| invalid("entity end date", s, e)))
            .transpose()?;

        Ok(Some(Self { start, end }))
    }

    /// Whether a card created at `created_at` is kept
    pub fn contains(&self, created_at: &DateTime<Utc>) -> bool {
        self.start.map_or(true, |start| start <= *created_at)
            && self.end.map_or(true, |end| *created_at <= end)
    }

    /// Keep the cards whose `created_at` lies within the bounds
    ///
    /// Cards without a readable `created_at` are dropped.
    pub fn apply(&self, cards: Vec<Value>) -> Vec<Value> {
        cards
            .into_iter()
            .filter(|card| {
                let raw = card.get("created_at").and_then(Value::as_str);
                match raw.and_then(|s| parse_timestamp(s, None)) {
                    Some(created_at) => self.contains(&created_at),
                    None => {
                        warn!(card = %card, "Card has no readable created_at, skipping");
                        false
                    }
                }
            })
            .collect()
    }
}

fn invalid(what: &str, input: &str, reason: String) -> FetcherError {
    FetcherError::InvalidArgument(format!("invalid {what} '{input}': {reason}"))
}

fn parse_boundary(input: &str, tz: Tz) -> Result<DateTime<Tz>, String> {
    let input = input.trim();
    if let Ok(date) = NaiveDate::parse_from_str(input, "%Y-%m-%d") {
        return midnight(date, tz).map_err(|e| e.to_string());
    }

    let local = ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(input, fmt).ok())
        .ok_or_else(|| "expected YYYY-MM-DD or a local datetime".to_string())?;

    tz.from_local_datetime(&local)
        .earliest()
        .ok_or_else(|| format!("{local} does not exist in {tz}"))
}

/// Project card objects onto columns, in column order
pub fn project(cards: &[Value], columns: &[ColumnSpec]) -> Vec<Row> {
    cards
        .iter()
        .map(|card| {
            columns
                .iter()
                .map(|column| match card.get(&column.name) {
                    Some(value) => coerce(value, column),
                    None => ColumnValue::Null,
                })
                .collect()
        })
        .collect()
}

/// Fetches, filters and projects an account's cards
pub struct CardFetcher {
    http: Arc<AdsHttpClient>,
    config: AdsApiConfig,
}

impl CardFetcher {
    /// Card fetcher over a shared client
    pub fn new(http: Arc<AdsHttpClient>, config: AdsApiConfig) -> Self {
        Self { http, config }
    }

    /// Fetch every card of `account_id` as rows
    ///
    /// The filter is validated before any request is made.
    ///
    /// # Errors
    /// `InvalidArgument` for a bad timezone or boundary, otherwise any client
    /// or protocol error from pagination.
    pub async fn fetch_pages(
        &self,
        account_id: &str,
        entity_start_date: Option<&str>,
        entity_end_date: Option<&str>,
        entity_timezone: Option<&str>,
        columns: &[ColumnSpec],
    ) -> FetcherResult<Vec<Row>> {
        let filter = CreatedAtFilter::parse(entity_start_date, entity_end_date, entity_timezone)?;

        let url = self.config.cards_url(account_id);
        let params = [("include_legacy_cards".to_string(), "true".to_string())];
        let cards = paginate(&self.http, &url, &params).await?;
        let fetched = cards.len();

        let cards = match &filter {
            Some(filter) => filter.apply(cards),
            None => cards,
        };

        info!(
            account_id = %account_id,
            fetched = fetched,
            kept = cards.len(),
            "Fetched cards"
        );
        Ok(project(&cards, columns))
    }
}
