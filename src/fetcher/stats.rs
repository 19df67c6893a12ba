//! Synchronous stats fetching
//!
//! One GET per (entity batch, time window) against the stats endpoint. The
//! query parameters built here are shared with the async job strategy.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use crate::extract::config::{MAX_ENTITY_IDS_PER_REQUEST, SYNC_BATCH_SIZE, SYNC_MAX_WINDOW_DAYS};
use crate::extract::window::TimeWindow;
use crate::fetcher::ads_config::AdsApiConfig;
use crate::fetcher::ads_http::AdsHttpClient;
use crate::fetcher::ads_parser::AdsParser;
use crate::fetcher::{FetcherError, FetcherResult, StatsFetcher};
use crate::{Entity, EntityType, Granularity, MetricGroup, Placement, StatsRecord};

/// Everything about a stats request except the entity ids and the window
#[derive(Debug, Clone, PartialEq)]
pub struct StatsQuery {
    /// Ads account id
    pub account_id: String,
    /// Entity kind the stats are keyed by
    pub entity_type: EntityType,
    /// Metric groups to request
    pub metric_groups: Vec<MetricGroup>,
    /// Series granularity
    pub granularity: Granularity,
    /// Placement filter
    pub placement: Placement,
}

impl StatsQuery {
    /// Query parameters for one batch and window
    pub fn params(&self, entity_ids: &[&str], window: &TimeWindow) -> Vec<(String, String)> {
        let metric_groups = self
            .metric_groups
            .iter()
            .map(MetricGroup::api_name)
            .collect::<Vec<_>>()
            .join(",");

        vec![
            ("entity".to_string(), self.entity_type.api_name().to_string()),
            ("entity_ids".to_string(), entity_ids.join(",")),
            ("metric_groups".to_string(), metric_groups),
            ("start_time".to_string(), window.api_start_time()),
            ("end_time".to_string(), window.api_end_time()),
            ("placement".to_string(), self.placement.to_string()),
            ("granularity".to_string(), self.granularity.to_string()),
        ]
    }
}

/// Copy parent ids from the batch onto records
///
/// Line items get their campaign id; promoted tweets and media creatives get
/// their line item id. Other entity types are left untouched.
pub fn attach_parent_ids(records: &mut [StatsRecord], batch: &[Entity], entity_type: EntityType) {
    for record in records.iter_mut() {
        let Some(entity) = batch.iter().find(|e| e.id == record.entity_id) else {
            continue;
        };
        match entity_type.parent() {
            Some(EntityType::Campaign) => record.campaign_id = entity.campaign_id.clone(),
            Some(EntityType::LineItem) => record.line_item_id = entity.line_item_id.clone(),
            _ => {}
        }
    }
}

/// Reject batches and windows the API would refuse
pub(crate) fn check_chunk(
    batch: &[Entity],
    window: &TimeWindow,
    max_window_days: u32,
) -> FetcherResult<()> {
    if batch.is_empty() {
        return Err(FetcherError::InvalidArgument("empty entity batch".to_string()));
    }
    if batch.len() > MAX_ENTITY_IDS_PER_REQUEST {
        return Err(FetcherError::InvalidArgument(format!(
            "{} entities exceed the per-request ceiling of {MAX_ENTITY_IDS_PER_REQUEST}",
            batch.len()
        )));
    }
    if window.days() > u64::from(max_window_days) {
        return Err(FetcherError::InvalidArgument(format!(
            "window {}..{} spans {} days, more than {max_window_days}",
            window.start_date,
            window.end_date,
            window.days()
        )));
    }
    Ok(())
}

/// Stats strategy issuing one synchronous request per chunk
pub struct SyncStatsFetcher {
    http: Arc<AdsHttpClient>,
    config: AdsApiConfig,
    batch_size: usize,
}

impl SyncStatsFetcher {
    /// Fetcher with the default batch size of 10
    pub fn new(http: Arc<AdsHttpClient>, config: AdsApiConfig) -> Self {
        Self {
            http,
            config,
            batch_size: SYNC_BATCH_SIZE,
        }
    }

    /// Override the batch size, clamped to `1..=20`
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.clamp(1, MAX_ENTITY_IDS_PER_REQUEST);
        self
    }
}

#[async_trait]
impl StatsFetcher for SyncStatsFetcher {
    fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn max_window_days(&self) -> u32 {
        SYNC_MAX_WINDOW_DAYS
    }

    async fn fetch_chunk(
        &self,
        query: &StatsQuery,
        batch: &[Entity],
        window: &TimeWindow,
    ) -> FetcherResult<Vec<StatsRecord>> {
        check_chunk(batch, window, self.max_window_days())?;

        let ids: Vec<&str> = batch.iter().map(|e| e.id.as_str()).collect();
        let url = self.config.stats_url(&query.account_id);
        debug!(
            entities = ids.len(),
            start_date = %window.start_date,
            end_date = %window.end_date,
            "Requesting synchronous stats"
        );

        let body = self.http.get_json(&url, &query.params(&ids, window)).await?;
        let data = match body.get("data") {
            Some(Value::Array(items)) => items.as_slice(),
            _ => {
                return Err(FetcherError::Protocol(format!(
                    "stats response has no data array: {body}"
                )))
            }
        };

        let mut records = AdsParser::parse_stats(data, window)?;
        attach_parent_ids(&mut records, batch, query.entity_type);
        Ok(records)
    }
}
