//! Extraction job description

use chrono::NaiveDate;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::config::{DEFAULT_PAGE_SIZE, MAX_ENTITY_IDS_PER_REQUEST};
use super::{ExtractError, ExtractResult};
use crate::fetcher::StatsQuery;
use crate::schema::ColumnSpec;
use crate::{EntityType, Granularity, MetricGroup, Placement};

/// Which stats strategy a job uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchMode {
    /// One stats request per chunk
    #[default]
    Sync,
    /// Submit, poll and download a job per chunk
    Async,
}

impl fmt::Display for FetchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchMode::Sync => write!(f, "sync"),
            FetchMode::Async => write!(f, "async"),
        }
    }
}

impl FromStr for FetchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sync" => Ok(FetchMode::Sync),
            "async" => Ok(FetchMode::Async),
            other => Err(format!("unknown fetch mode: {other}")),
        }
    }
}

/// A resolved extraction request
#[derive(Debug, Clone)]
pub struct ExtractJob {
    /// Ads account id
    pub account_id: String,
    /// Entity kind to extract
    pub entity_type: EntityType,
    /// Metric groups to request
    pub metric_groups: Vec<MetricGroup>,
    /// Series granularity
    pub granularity: Granularity,
    /// Placement filter
    pub placement: Placement,
    /// First day (inclusive)
    pub start_date: NaiveDate,
    /// Last day (inclusive)
    pub end_date: NaiveDate,
    /// Timezone days are interpreted in
    pub timezone: Tz,
    /// Output columns, in order
    pub columns: Vec<ColumnSpec>,
    /// Stats strategy
    pub mode: FetchMode,
    /// Entity listing page size
    pub page_size: usize,
    /// Entities per stats request; `None` uses the strategy default
    pub batch_size: Option<usize>,
}

impl ExtractJob {
    /// Create a job with default page and batch sizes
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        account_id: impl Into<String>,
        entity_type: EntityType,
        metric_groups: Vec<MetricGroup>,
        granularity: Granularity,
        placement: Placement,
        start_date: NaiveDate,
        end_date: NaiveDate,
        timezone: Tz,
        columns: Vec<ColumnSpec>,
        mode: FetchMode,
    ) -> Self {
        Self {
            account_id: account_id.into(),
            entity_type,
            metric_groups,
            granularity,
            placement,
            start_date,
            end_date,
            timezone,
            columns,
            mode,
            page_size: DEFAULT_PAGE_SIZE,
            batch_size: None,
        }
    }

    /// Set the entity listing page size
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Set the entities per stats request
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = Some(batch_size);
        self
    }

    /// Stats query shared by every chunk of this job
    pub fn stats_query(&self) -> StatsQuery {
        StatsQuery {
            account_id: self.account_id.clone(),
            entity_type: self.entity_type,
            metric_groups: self.metric_groups.clone(),
            granularity: self.granularity,
            placement: self.placement,
        }
    }

    /// Validate job parameters
    pub fn validate(&self) -> ExtractResult<()> {
        if self.account_id.trim().is_empty() {
            return Err(ExtractError::Validation("account id cannot be empty".to_string()));
        }

        if self.metric_groups.is_empty() {
            return Err(ExtractError::Validation(
                "at least one metric group is required".to_string(),
            ));
        }

        if self.end_date < self.start_date {
            return Err(ExtractError::Validation(format!(
                "end date ({}) must not be before start date ({})",
                self.end_date, self.start_date
            )));
        }

        if self.columns.is_empty() {
            return Err(ExtractError::Validation("column schema is empty".to_string()));
        }

        if let Some(batch_size) = self.batch_size {
            if batch_size == 0 || batch_size > MAX_ENTITY_IDS_PER_REQUEST {
                return Err(ExtractError::Validation(format!(
                    "batch size must be between 1 and {MAX_ENTITY_IDS_PER_REQUEST}, got {batch_size}"
                )));
            }
        }

        Ok(())
    }
}
