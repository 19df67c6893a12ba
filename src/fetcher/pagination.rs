//! Cursor pagination for Ads API listings
//!
//! Listings return `{"data": [...], "next_cursor": ...}`; the next page is
//! requested with `cursor=<next_cursor>` until the cursor is null. Every page
//! goes through the retrying client.

use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

use crate::extract::config::DEFAULT_PAGE_SIZE;
use crate::fetcher::ads_config::AdsApiConfig;
use crate::fetcher::ads_http::AdsHttpClient;
use crate::fetcher::ads_parser::AdsParser;
use crate::fetcher::{FetcherError, FetcherResult};
use crate::{Entity, EntityType};

/// Maximum number of pages to prevent infinite loops
const MAX_ITERATIONS: usize = 10_000;

/// Follow `next_cursor` from `url` and collect every page's `data`, in order
///
/// # Errors
/// Propagates client errors, and returns `Protocol` if a page is malformed or
/// the page count exceeds the safety ceiling.
pub async fn paginate(
    http: &AdsHttpClient,
    url: &str,
    base_params: &[(String, String)],
) -> FetcherResult<Vec<Value>> {
    let mut items = Vec::new();
    let mut cursor: Option<String> = None;
    let mut iteration = 0;

    loop {
        if iteration >= MAX_ITERATIONS {
            return Err(FetcherError::Protocol(format!(
                "Max iterations ({MAX_ITERATIONS}) exceeded for {url} - possible cursor loop. Last cursor: {cursor:?}"
            )));
        }

        let mut params = base_params.to_vec();
        if let Some(cursor) = &cursor {
            params.push(("cursor".to_string(), cursor.clone()));
        }

        debug!("Fetching page {} of {} cursor={:?}", iteration + 1, url, cursor);

        let body = http.get_json(url, &params).await?;
        let page = AdsParser::parse_page(body)?;

        debug!("Received {} items in page {}", page.data.len(), iteration + 1);
        items.extend(page.data);
        iteration += 1;

        match page.next_cursor {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }

    debug!(
        "Pagination completed after {} pages. Total items: {}",
        iteration,
        items.len()
    );
    Ok(items)
}

/// Retrieves the full entity set for an account
pub struct EntityPager {
    http: Arc<AdsHttpClient>,
    config: AdsApiConfig,
}

impl EntityPager {
    /// Pager over a shared client
    pub fn new(http: Arc<AdsHttpClient>, config: AdsApiConfig) -> Self {
        Self { http, config }
    }

    /// Fetch every entity of `entity_type` under `account_id`, in API order
    ///
    /// `ACCOUNT` is the account resource itself, returned as a single entity.
    /// A `page_size` of zero falls back to the default page size.
    pub async fn fetch_all(
        &self,
        entity_type: EntityType,
        account_id: &str,
        page_size: usize,
    ) -> FetcherResult<Vec<Entity>> {
        let url = self.config.entities_url(account_id, entity_type);

        let items = match entity_type {
            EntityType::Account => {
                let body = self.http.get_json(&url, &[]).await?;
                AdsParser::parse_page(body)?.data
            }
            _ => {
                let page_size = if page_size == 0 { DEFAULT_PAGE_SIZE } else { page_size };
                let params = [("count".to_string(), page_size.to_string())];
                paginate(&self.http, &url, &params).await?
            }
        };

        let entities = AdsParser::parse_entities(items)?;
        info!(
            entity = %entity_type,
            account_id = %account_id,
            count = entities.len(),
            "Fetched entities"
        );
        Ok(entities)
    }
}
