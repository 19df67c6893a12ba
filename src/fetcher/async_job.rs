//! Async stats job orchestration
//!
//! `Submitted -> {Queued, Processing} -> Success | Failed`. A job is created
//! with a POST, polled every 10 seconds for at most 60 polls, and on success
//! its gzip result is downloaded outside the retrying client.

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

use crate::extract::config::{ASYNC_BATCH_SIZE, ASYNC_MAX_WINDOW_DAYS, MAX_POLL_ATTEMPTS, POLL_INTERVAL};
use crate::extract::window::TimeWindow;
use crate::fetcher::ads_config::AdsApiConfig;
use crate::fetcher::ads_http::AdsHttpClient;
use crate::fetcher::ads_parser::AdsParser;
use crate::fetcher::job_result::JobResultDownloader;
use crate::fetcher::stats::{attach_parent_ids, check_chunk, StatsQuery};
use crate::fetcher::{FetcherError, FetcherResult, StatsFetcher};
use crate::metrics::record_job_poll;
use crate::{Entity, StatsRecord};

/// Async job state as reported by the API
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    /// Accepted, not started
    Queued,
    /// Running
    Processing,
    /// Result available
    Success,
    /// Terminal failure
    Failed,
}

impl JobState {
    /// Map an API status string; unknown statuses yield `None`
    pub fn from_api(status: &str) -> Option<Self> {
        match status.trim().to_ascii_uppercase().as_str() {
            "QUEUED" => Some(JobState::Queued),
            "PROCESSING" => Some(JobState::Processing),
            "SUCCESS" => Some(JobState::Success),
            "FAILED" => Some(JobState::Failed),
            _ => None,
        }
    }

    /// Success and Failed are terminal
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Success | JobState::Failed)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobState::Queued => "QUEUED",
            JobState::Processing => "PROCESSING",
            JobState::Success => "SUCCESS",
            JobState::Failed => "FAILED",
        };
        write!(f, "{s}")
    }
}

/// A submitted job and what polling has learned about it
#[derive(Debug, Clone, PartialEq)]
pub struct AsyncJob {
    /// Job id
    pub id: String,
    /// Last observed state
    pub state: JobState,
    /// Result location, set once the job succeeded
    pub result_url: Option<String>,
    /// Number of status polls performed
    pub status_poll_count: u32,
}

impl AsyncJob {
    fn submitted(id: String) -> Self {
        Self {
            id,
            state: JobState::Queued,
            result_url: None,
            status_poll_count: 0,
        }
    }
}

/// Stats strategy driving the async job workflow per chunk
pub struct AsyncJobOrchestrator {
    http: Arc<AdsHttpClient>,
    config: AdsApiConfig,
    downloader: JobResultDownloader,
    poll_interval: Duration,
    max_polls: u32,
    batch_size: usize,
}

impl AsyncJobOrchestrator {
    /// Orchestrator sharing the client's clock for polls and download retries
    pub fn new(http: Arc<AdsHttpClient>, config: AdsApiConfig) -> Self {
        let downloader = JobResultDownloader::new(http.clock());
        Self::with_downloader(http, config, downloader)
    }

    /// Orchestrator with an explicit result downloader
    pub fn with_downloader(
        http: Arc<AdsHttpClient>,
        config: AdsApiConfig,
        downloader: JobResultDownloader,
    ) -> Self {
        Self {
            http,
            config,
            downloader,
            poll_interval: POLL_INTERVAL,
            max_polls: MAX_POLL_ATTEMPTS,
            batch_size: ASYNC_BATCH_SIZE,
        }
    }

    /// Override the batch size, clamped to `1..=20`
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.clamp(1, crate::extract::config::MAX_ENTITY_IDS_PER_REQUEST);
        self
    }

    /// Create a job for one batch and window
    ///
    /// # Errors
    /// `Protocol` if the response carries no job id.
    pub async fn submit(
        &self,
        query: &StatsQuery,
        batch: &[Entity],
        window: &TimeWindow,
    ) -> FetcherResult<AsyncJob> {
        let ids: Vec<&str> = batch.iter().map(|e| e.id.as_str()).collect();
        let url = self.config.stats_jobs_url(&query.account_id);
        let body = self.http.post_json(&url, &query.params(&ids, window)).await?;
        let job_id = AdsParser::parse_job_id(&body)?;

        info!(
            job_id = %job_id,
            entities = ids.len(),
            start_date = %window.start_date,
            end_date = %window.end_date,
            "Submitted async stats job"
        );
        Ok(AsyncJob::submitted(job_id))
    }

    /// Poll until the job succeeds
    ///
    /// The first poll is immediate; each non-terminal status is followed by
    /// one poll interval of sleep.
    ///
    /// # Errors
    /// `JobFailed` on a FAILED status, `Timeout` once the poll ceiling is
    /// reached while the job is still pending, `Protocol` on an unknown status
    /// or a successful job without a result URL.
    pub async fn wait(&self, account_id: &str, job: &mut AsyncJob) -> FetcherResult<String> {
        let url = self.config.stats_jobs_url(account_id);
        let params = [("job_ids".to_string(), job.id.clone())];
        let clock = self.http.clock();

        loop {
            let body = self.http.get_json(&url, &params).await?;
            let report = AdsParser::parse_job_status(&body, &job.id)?;
            job.status_poll_count += 1;
            job.state = report.state;
            record_job_poll(&report.state.to_string());
            debug!(
                job_id = %job.id,
                state = %report.state,
                poll = job.status_poll_count,
                "Polled async job"
            );

            match report.state {
                JobState::Success => {
                    let result_url = report.url.ok_or_else(|| {
                        FetcherError::Protocol(format!("job {} succeeded without a result url", job.id))
                    })?;
                    job.result_url = Some(result_url.clone());
                    return Ok(result_url);
                }
                JobState::Failed => {
                    error!(job_id = %job.id, "Async stats job failed");
                    return Err(FetcherError::JobFailed {
                        job_id: job.id.clone(),
                    });
                }
                JobState::Queued | JobState::Processing => {
                    if job.status_poll_count >= self.max_polls {
                        error!(
                            job_id = %job.id,
                            polls = job.status_poll_count,
                            "Async stats job did not finish in time"
                        );
                        return Err(FetcherError::Timeout(format!(
                            "job {} still {} after {} polls",
                            job.id, report.state, job.status_poll_count
                        )));
                    }
                    clock.sleep(self.poll_interval).await;
                }
            }
        }
    }
}

#[async_trait]
impl StatsFetcher for AsyncJobOrchestrator {
    fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn max_window_days(&self) -> u32 {
        ASYNC_MAX_WINDOW_DAYS
    }

    async fn fetch_chunk(
        &self,
        query: &StatsQuery,
        batch: &[Entity],
        window: &TimeWindow,
    ) -> FetcherResult<Vec<StatsRecord>> {
        check_chunk(batch, window, self.max_window_days())?;

        let mut job = self.submit(query, batch, window).await?;
        let result_url = self.wait(&query.account_id, &mut job).await?;
        let data = self.downloader.download(&result_url).await?;

        let mut records = AdsParser::parse_stats(&data, window)?;
        attach_parent_ids(&mut records, batch, query.entity_type);
        info!(
            job_id = %job.id,
            polls = job.status_poll_count,
            records = records.len(),
            "Async stats job completed"
        );
        Ok(records)
    }
}
