//! # Twitter Ads Analytics Library
//!
//! Extracts advertising performance data from the Twitter/X Ads API and turns it
//! into tabular rows for downstream ingestion.
//!
//! ## Features
//!
//! - **Resilient HTTP**: error classification, rate-limit aware retries driven by
//!   the `x-account-rate-limit-reset` / `x-rate-limit-reset` headers
//! - **Cursor pagination**: full entity listings and card listings
//! - **Sync and async stats**: direct stats requests or the submit/poll/download
//!   job workflow with gzip result payloads
//! - **Row assembly**: per-day metric series projected onto a caller-supplied
//!   column schema, with entity-name lookups and JSON pass-through columns
//!
//! ## Quick Start
//!
//! ```no_run
//! use twitter_ads_analytics::extract::{ExtractExecutor, ExtractJob, FetchMode};
//! use twitter_ads_analytics::output::MemorySink;
//! use twitter_ads_analytics::schema::parse_columns;
//! use twitter_ads_analytics::{EntityType, Granularity, MetricGroup, Placement};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let columns = parse_columns(&["date:string", "id:string", "impressions:long"])?;
//! let job = ExtractJob::new(
//!     "18ce54d4x5t",
//!     EntityType::Campaign,
//!     vec![MetricGroup::Engagement],
//!     Granularity::Day,
//!     Placement::AllOnTwitter,
//!     "2024-01-01".parse()?,
//!     "2024-01-31".parse()?,
//!     chrono_tz::UTC,
//!     columns,
//!     FetchMode::Sync,
//! );
//!
//! let executor = ExtractExecutor::from_bearer_token("token");
//! let mut sink = MemorySink::new();
//! let summary = executor.execute(&job, &mut sink).await?;
//! println!("{} rows", summary.rows_emitted);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`fetcher`] - HTTP transport, retrying client, pagination, stats strategies, cards
//! - [`extract`] - Job configuration, time chunking and the extraction pipeline
//! - [`output`] - Row assembly, value coercion and row sinks
//! - [`schema`] - Column specifications and typed column values

#![warn(missing_docs)]
#![warn(clippy::all)]

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::str::FromStr;

/// CLI command implementations
pub mod cli;

/// Extraction pipeline
pub mod extract;

/// Ads API fetchers
pub mod fetcher;

/// Observability metrics
pub mod metrics;

/// Row assembly and sinks
pub mod output;

/// Column schema parsing and typed values
pub mod schema;

pub use schema::{ColumnSpec, ColumnType, ColumnValue, Row};

/// Kind of entity an analytics extraction is keyed by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityType {
    /// The ads account itself
    Account,
    /// Campaign
    Campaign,
    /// Line item (ad group), child of a campaign
    LineItem,
    /// Promoted tweet, child of a line item
    PromotedTweet,
    /// Media creative, child of a line item
    MediaCreative,
    /// Funding instrument
    FundingInstrument,
}

impl EntityType {
    /// All entity types in API order
    pub const ALL: [EntityType; 6] = [
        EntityType::Account,
        EntityType::Campaign,
        EntityType::LineItem,
        EntityType::PromotedTweet,
        EntityType::MediaCreative,
        EntityType::FundingInstrument,
    ];

    /// Value sent as the `entity` query parameter
    pub fn api_name(&self) -> &'static str {
        match self {
            EntityType::Account => "ACCOUNT",
            EntityType::Campaign => "CAMPAIGN",
            EntityType::LineItem => "LINE_ITEM",
            EntityType::PromotedTweet => "PROMOTED_TWEET",
            EntityType::MediaCreative => "MEDIA_CREATIVE",
            EntityType::FundingInstrument => "FUNDING_INSTRUMENT",
        }
    }

    /// Path segment of the listing endpoint
    pub fn plural_path(&self) -> &'static str {
        match self {
            EntityType::Account => "accounts",
            EntityType::Campaign => "campaigns",
            EntityType::LineItem => "line_items",
            EntityType::PromotedTweet => "promoted_tweets",
            EntityType::MediaCreative => "media_creatives",
            EntityType::FundingInstrument => "funding_instruments",
        }
    }

    /// Parent entity whose id is denormalized onto stats records
    pub fn parent(&self) -> Option<EntityType> {
        match self {
            EntityType::LineItem => Some(EntityType::Campaign),
            EntityType::PromotedTweet | EntityType::MediaCreative => Some(EntityType::LineItem),
            EntityType::Account | EntityType::Campaign | EntityType::FundingInstrument => None,
        }
    }

    /// Identifier column naming this entity in an output schema
    pub fn id_column(&self) -> &'static str {
        match self {
            EntityType::Account => "account_id",
            EntityType::Campaign => "campaign_id",
            EntityType::LineItem => "line_item_id",
            EntityType::PromotedTweet => "promoted_tweet_id",
            EntityType::MediaCreative => "media_creative_id",
            EntityType::FundingInstrument => "funding_instrument_id",
        }
    }

    /// Name column for entities that carry a display name
    pub fn name_column(&self) -> Option<&'static str> {
        match self {
            EntityType::Account => Some("account_name"),
            EntityType::Campaign => Some("campaign_name"),
            EntityType::LineItem => Some("line_item_name"),
            EntityType::PromotedTweet | EntityType::MediaCreative | EntityType::FundingInstrument => {
                None
            }
        }
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.api_name())
    }
}

impl FromStr for EntityType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_uppercase();
        EntityType::ALL
            .into_iter()
            .find(|entity| entity.api_name() == upper)
            .ok_or_else(|| format!("Invalid entity: {s}"))
    }
}

/// Metric group requested from the stats endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MetricGroup {
    /// Engagement metrics (impressions, clicks, likes...)
    Engagement,
    /// Billing metrics
    Billing,
    /// Video metrics
    Video,
    /// Media metrics
    Media,
    /// Web conversion metrics
    WebConversion,
    /// Mobile conversion metrics
    MobileConversion,
    /// Lifetime value mobile conversion metrics
    LifeTimeValueMobileConversion,
}

impl MetricGroup {
    /// Value sent in the `metric_groups` query parameter
    pub fn api_name(&self) -> &'static str {
        match self {
            MetricGroup::Engagement => "ENGAGEMENT",
            MetricGroup::Billing => "BILLING",
            MetricGroup::Video => "VIDEO",
            MetricGroup::Media => "MEDIA",
            MetricGroup::WebConversion => "WEB_CONVERSION",
            MetricGroup::MobileConversion => "MOBILE_CONVERSION",
            MetricGroup::LifeTimeValueMobileConversion => "LIFE_TIME_VALUE_MOBILE_CONVERSION",
        }
    }
}

impl std::fmt::Display for MetricGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.api_name())
    }
}

impl FromStr for MetricGroup {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "ENGAGEMENT" => Ok(MetricGroup::Engagement),
            "BILLING" => Ok(MetricGroup::Billing),
            "VIDEO" => Ok(MetricGroup::Video),
            "MEDIA" => Ok(MetricGroup::Media),
            "WEB_CONVERSION" => Ok(MetricGroup::WebConversion),
            "MOBILE_CONVERSION" => Ok(MetricGroup::MobileConversion),
            "LIFE_TIME_VALUE_MOBILE_CONVERSION" => Ok(MetricGroup::LifeTimeValueMobileConversion),
            _ => Err(format!("Invalid metric group: {s}")),
        }
    }
}

/// Time granularity of returned metric series
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Granularity {
    /// One value per day
    Day,
    /// One value per hour
    Hour,
    /// A single total over the window
    Total,
}

impl std::fmt::Display for Granularity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Granularity::Day => "DAY",
            Granularity::Hour => "HOUR",
            Granularity::Total => "TOTAL",
        };
        write!(f, "{s}")
    }
}

impl FromStr for Granularity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "DAY" => Ok(Granularity::Day),
            "HOUR" => Ok(Granularity::Hour),
            "TOTAL" => Ok(Granularity::Total),
            _ => Err(format!("Invalid granularity: {s}")),
        }
    }
}

/// Ad placement filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Placement {
    /// Twitter/X owned surfaces
    AllOnTwitter,
    /// Publisher network
    PublisherNetwork,
    /// Spotlight
    Spotlight,
    /// Trend takeover
    Trend,
}

impl std::fmt::Display for Placement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Placement::AllOnTwitter => "ALL_ON_TWITTER",
            Placement::PublisherNetwork => "PUBLISHER_NETWORK",
            Placement::Spotlight => "SPOTLIGHT",
            Placement::Trend => "TREND",
        };
        write!(f, "{s}")
    }
}

impl FromStr for Placement {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "ALL_ON_TWITTER" => Ok(Placement::AllOnTwitter),
            "PUBLISHER_NETWORK" => Ok(Placement::PublisherNetwork),
            "SPOTLIGHT" => Ok(Placement::Spotlight),
            "TREND" => Ok(Placement::Trend),
            _ => Err(format!("Invalid placement: {s}")),
        }
    }
}

/// An ads entity as returned by a listing endpoint
///
/// Only the fields the pipeline reads are kept; everything else in the API
/// payload is ignored during deserialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Entity id
    pub id: String,
    /// Display name
    #[serde(default)]
    pub name: Option<String>,
    /// Description (funding instruments)
    #[serde(default)]
    pub description: Option<String>,
    /// Parent campaign (line items)
    #[serde(default)]
    pub campaign_id: Option<String>,
    /// Parent line item (promoted tweets, media creatives)
    #[serde(default)]
    pub line_item_id: Option<String>,
}

impl Entity {
    /// Entity with only an id
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            description: None,
            campaign_id: None,
            line_item_id: None,
        }
    }

    /// Set the display name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the parent campaign id
    pub fn with_campaign_id(mut self, campaign_id: impl Into<String>) -> Self {
        self.campaign_id = Some(campaign_id.into());
        self
    }

    /// Set the parent line item id
    pub fn with_line_item_id(mut self, line_item_id: impl Into<String>) -> Self {
        self.line_item_id = Some(line_item_id.into());
        self
    }
}

/// Value of one metric in a stats record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    /// Ordered series, one element per granularity step
    Series(Vec<Value>),
    /// Structured value (conversion-style metrics)
    Blob(Value),
}

impl MetricValue {
    /// Classify a raw metric payload; `null` means the metric is absent
    pub fn from_json(value: Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Array(items) => Some(MetricValue::Series(items)),
            other => Some(MetricValue::Blob(other)),
        }
    }

    /// Element at a day index; blobs have no per-day elements
    pub fn at(&self, index: usize) -> Option<&Value> {
        match self {
            MetricValue::Series(items) => items.get(index),
            MetricValue::Blob(_) => None,
        }
    }

    /// The whole metric as JSON
    pub fn to_json(&self) -> Value {
        match self {
            MetricValue::Series(items) => Value::Array(items.clone()),
            MetricValue::Blob(value) => value.clone(),
        }
    }
}

/// Metrics for one entity over one time window
#[derive(Debug, Clone, PartialEq)]
pub struct StatsRecord {
    /// Entity the metrics belong to
    pub entity_id: String,
    /// First day covered (inclusive)
    pub start_date: NaiveDate,
    /// Last day covered (inclusive)
    pub end_date: NaiveDate,
    /// Metric name to value; absent metrics are missing keys
    pub metrics: HashMap<String, MetricValue>,
    /// Denormalized parent campaign (line items)
    pub campaign_id: Option<String>,
    /// Denormalized parent line item (promoted tweets, media creatives)
    pub line_item_id: Option<String>,
}

impl StatsRecord {
    /// Record with no metrics and no parent ids
    pub fn new(entity_id: impl Into<String>, start_date: NaiveDate, end_date: NaiveDate) -> Self {
        Self {
            entity_id: entity_id.into(),
            start_date,
            end_date,
            metrics: HashMap::new(),
            campaign_id: None,
            line_item_id: None,
        }
    }

    /// Add a metric value
    pub fn with_metric(mut self, name: impl Into<String>, value: MetricValue) -> Self {
        self.metrics.insert(name.into(), value);
        self
    }

    /// Calendar days covered by this record, in order
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        let end = self.end_date;
        self.start_date.iter_days().take_while(move |day| *day <= end)
    }
}
