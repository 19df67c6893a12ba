//! Ads API response parser
//!
//! Stateless functions turning decoded JSON bodies into pages, entities,
//! stats records and async job descriptors. Every shape violation is a
//! `Protocol` error carrying the offending payload.

use serde_json::Value;
use tracing::error;

use crate::extract::window::TimeWindow;
use crate::fetcher::async_job::JobState;
use crate::fetcher::{FetcherError, FetcherResult};
use crate::{Entity, MetricValue, StatsRecord};

/// One page of a cursor-paginated listing
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    /// Items on this page
    pub data: Vec<Value>,
    /// Cursor for the next page; `None` on the last page
    pub next_cursor: Option<String>,
}

/// Status of one async job as reported by the poll endpoint
#[derive(Debug, Clone, PartialEq)]
pub struct JobStatusReport {
    /// Job state
    pub state: JobState,
    /// Result location, present once the job succeeded
    pub url: Option<String>,
}

/// Stateless parser for Ads API responses
pub struct AdsParser;

impl AdsParser {
    /// Parse a listing body into a page
    ///
    /// A `data` object (single-resource endpoints) becomes a one-element page.
    pub fn parse_page(body: Value) -> FetcherResult<Page> {
        let next_cursor = match body.get("next_cursor") {
            None | Some(Value::Null) => None,
            Some(Value::String(cursor)) => Some(cursor.clone()),
            Some(other) => Some(other.to_string()),
        };

        let data = match body.get("data") {
            Some(Value::Array(items)) => items.clone(),
            Some(object @ Value::Object(_)) => vec![object.clone()],
            _ => return Err(protocol("response has no data", &body)),
        };

        Ok(Page { data, next_cursor })
    }

    /// Parse listing items into entities
    pub fn parse_entities(items: Vec<Value>) -> FetcherResult<Vec<Entity>> {
        items
            .into_iter()
            .map(|item| {
                let item = normalize_id(item);
                serde_json::from_value::<Entity>(item.clone())
                    .map_err(|e| protocol(&format!("invalid entity: {e}"), &item))
            })
            .collect()
    }

    /// Parse the `data` array of a stats response, tagging records with the window
    ///
    /// Each item has the shape `{"id": .., "id_data": [{"metrics": {..}}]}`.
    /// Metrics whose value is `null` are left out of the record. Every
    /// requested entity yields an item, so an empty `data` is a protocol error.
    pub fn parse_stats(data: &[Value], window: &TimeWindow) -> FetcherResult<Vec<StatsRecord>> {
        if data.is_empty() {
            return Err(protocol(
                &format!(
                    "stats response for {}..{} carried no records",
                    window.start_date, window.end_date
                ),
                &Value::Array(Vec::new()),
            ));
        }

        data.iter()
            .map(|item| {
                let entity_id = id_string(item.get("id"))
                    .ok_or_else(|| protocol("stats item has no id", item))?;

                let metrics = item
                    .get("id_data")
                    .and_then(Value::as_array)
                    .and_then(|segments| segments.first())
                    .and_then(|segment| segment.get("metrics"))
                    .and_then(Value::as_object)
                    .ok_or_else(|| protocol("stats item has no id_data metrics", item))?;

                let mut record = StatsRecord::new(entity_id, window.start_date, window.end_date);
                for (name, value) in metrics {
                    if let Some(metric) = MetricValue::from_json(value.clone()) {
                        record.metrics.insert(name.clone(), metric);
                    }
                }
                Ok(record)
            })
            .collect()
    }

    /// Extract the id of a freshly created async job
    pub fn parse_job_id(body: &Value) -> FetcherResult<String> {
        let data = body.get("data").unwrap_or(body);
        id_string(data.get("id_str"))
            .or_else(|| id_string(data.get("id")))
            .ok_or_else(|| protocol("job creation response has no job id", body))
    }

    /// Extract the status of `job_id` from a poll response
    pub fn parse_job_status(body: &Value, job_id: &str) -> FetcherResult<JobStatusReport> {
        let jobs: Vec<&Value> = match body.get("data") {
            Some(Value::Array(items)) => items.iter().collect(),
            Some(object @ Value::Object(_)) => vec![object],
            _ => return Err(protocol("job status response has no data", body)),
        };

        let job = jobs
            .iter()
            .find(|job| {
                id_string(job.get("id_str")).as_deref() == Some(job_id)
                    || id_string(job.get("id")).as_deref() == Some(job_id)
            })
            .or_else(|| if jobs.len() == 1 { jobs.first() } else { None })
            .ok_or_else(|| protocol(&format!("job {job_id} missing from status response"), body))?;

        let status = job
            .get("status")
            .and_then(Value::as_str)
            .ok_or_else(|| protocol("job has no status", job))?;
        let state = JobState::from_api(status)
            .ok_or_else(|| protocol(&format!("unknown job status '{status}'"), job))?;
        let url = job
            .get("url")
            .and_then(Value::as_str)
            .filter(|url| !url.is_empty())
            .map(str::to_string);

        Ok(JobStatusReport { state, url })
    }
}

/// Ids arrive as strings, occasionally as numbers
fn id_string(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn normalize_id(mut item: Value) -> Value {
    if let Some(id) = id_string(item.get("id")) {
        item["id"] = Value::String(id);
    }
    item
}

fn protocol(message: &str, payload: &Value) -> FetcherError {
    error!(payload = %payload, "{}", message);
    FetcherError::Protocol(format!("{message}: {payload}"))
}
