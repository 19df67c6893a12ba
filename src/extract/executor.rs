//! Extraction executor

use indicatif::ProgressBar;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::config::{ASYNC_BATCH_SIZE, SYNC_BATCH_SIZE};
use super::job::{ExtractJob, FetchMode};
use super::window::split;
use super::{ExtractError, ExtractResult};
use crate::fetcher::{
    for_each_chunk, AdsApiConfig, AdsHttpClient, AdsTransport, AsyncJobOrchestrator,
    BearerAuthorizer, CardFetcher, Clock, EntityPager, ReqwestTransport, StatsFetcher,
    SyncStatsFetcher, SystemClock,
};
use crate::metrics::ExtractMetrics;
use crate::output::{RowAssembler, RowSink};

/// What a finished run produced
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractSummary {
    /// Entities listed for the account
    pub entities: usize,
    /// (batch, window) chunks fetched
    pub chunks: usize,
    /// Stats records received
    pub records: usize,
    /// Rows handed to the sink
    pub rows_emitted: u64,
    /// Strategy used
    pub mode: FetchMode,
}

/// Runs extraction jobs against one Ads API client
pub struct ExtractExecutor {
    http: Arc<AdsHttpClient>,
    config: AdsApiConfig,
    progress: Option<ProgressBar>,
}

impl ExtractExecutor {
    /// Executor over an existing client
    pub fn new(http: Arc<AdsHttpClient>, config: AdsApiConfig) -> Self {
        Self {
            http,
            config,
            progress: None,
        }
    }

    /// Executor over the shared reqwest client with bearer-token auth
    pub fn from_bearer_token(token: impl Into<String>) -> Self {
        let transport = ReqwestTransport::shared(Arc::new(BearerAuthorizer::new(token)));
        Self::with_transport(Arc::new(transport), Arc::new(SystemClock), AdsApiConfig::default())
    }

    /// Executor over an explicit transport and clock
    pub fn with_transport(
        transport: Arc<dyn AdsTransport>,
        clock: Arc<dyn Clock>,
        config: AdsApiConfig,
    ) -> Self {
        Self::new(Arc::new(AdsHttpClient::with_clock(transport, clock)), config)
    }

    /// Tick a progress bar once per fetched chunk
    pub fn with_progress_bar(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    /// API configuration in use
    pub fn config(&self) -> &AdsApiConfig {
        &self.config
    }

    /// Card fetcher sharing this executor's client
    pub fn card_fetcher(&self) -> CardFetcher {
        CardFetcher::new(self.http.clone(), self.config.clone())
    }

    fn stats_fetcher(&self, job: &ExtractJob) -> Box<dyn StatsFetcher> {
        match job.mode {
            FetchMode::Sync => Box::new(
                SyncStatsFetcher::new(self.http.clone(), self.config.clone())
                    .with_batch_size(job.batch_size.unwrap_or(SYNC_BATCH_SIZE)),
            ),
            FetchMode::Async => Box::new(
                AsyncJobOrchestrator::new(self.http.clone(), self.config.clone())
                    .with_batch_size(job.batch_size.unwrap_or(ASYNC_BATCH_SIZE)),
            ),
        }
    }

    /// Run a job, handing rows to `sink` as each chunk arrives
    ///
    /// `sink.finish()` is called only when every chunk succeeded.
    ///
    /// # Errors
    /// Validation, argument, fetcher and sink errors abort the run.
    pub async fn execute(
        &self,
        job: &ExtractJob,
        sink: &mut dyn RowSink,
    ) -> ExtractResult<ExtractSummary> {
        let metrics = ExtractMetrics::start(job.entity_type.api_name(), job.mode.to_string());

        match self.run(job, sink, &metrics).await {
            Ok(summary) => {
                metrics.record_success(summary.rows_emitted);
                Ok(summary)
            }
            Err(e) => {
                metrics.record_failure(&e.to_string());
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        job: &ExtractJob,
        sink: &mut dyn RowSink,
        metrics: &ExtractMetrics,
    ) -> ExtractResult<ExtractSummary> {
        job.validate()?;

        let pager = EntityPager::new(self.http.clone(), self.config.clone());
        let entities = pager
            .fetch_all(job.entity_type, &job.account_id, job.page_size)
            .await?;

        let fetcher = self.stats_fetcher(job);
        let windows = split(
            job.start_date,
            job.end_date,
            fetcher.max_window_days(),
            job.timezone,
        )?;
        let batch_size = fetcher.batch_size().max(1);
        let total_chunks = entities.len().div_ceil(batch_size) * windows.len();

        info!(
            account_id = %job.account_id,
            entity = %job.entity_type,
            mode = %job.mode,
            entities = entities.len(),
            windows = windows.len(),
            chunks = total_chunks,
            "Planned extraction"
        );
        if entities.is_empty() {
            warn!(account_id = %job.account_id, entity = %job.entity_type, "No entities to extract");
        }
        if let Some(pb) = &self.progress {
            pb.set_length(total_chunks as u64);
        }

        let query = job.stats_query();
        let assembler = RowAssembler::new(job.entity_type, &entities, &job.columns, job.timezone);
        let mut summary = ExtractSummary {
            entities: entities.len(),
            chunks: 0,
            records: 0,
            rows_emitted: 0,
            mode: job.mode,
        };

        for_each_chunk(&*fetcher, &query, &entities, &windows, |records| {
            let mut rows = 0u64;
            for row in assembler.expand(&records) {
                sink.add(row)?;
                rows += 1;
            }
            metrics.record_rows(rows);

            summary.chunks += 1;
            summary.records += records.len();
            summary.rows_emitted += rows;
            debug!(
                chunk = summary.chunks,
                of = total_chunks,
                records = records.len(),
                rows = rows,
                "Chunk emitted"
            );
            if let Some(pb) = &self.progress {
                pb.inc(1);
            }
            Ok::<_, ExtractError>(())
        })
        .await?;

        sink.finish()?;
        if let Some(pb) = &self.progress {
            pb.finish_and_clear();
        }
        Ok(summary)
    }
}
