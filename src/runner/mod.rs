pub mod cache;

use backoff::ExponentialBackoffBuilder;
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::RunnerConfig;
use crate::executors::base::{QueryService, ServiceError};
use crate::metrics::Metrics;
use crate::models::{ExecutionState, ExecutionStatus, QueryRequest, ResultPage, ResultTable};

pub use cache::{CacheStatus, ResultCache};

/// Largest page the service hands out per results request.
pub const MAX_PAGE_SIZE: i32 = 1000;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RunError {
    #[error("Failed to submit query: {0}")]
    Submit(ServiceError),
    #[error("Failed to read execution status: {0}")]
    Status(ServiceError),
    #[error("Query {state}: {}", .reason.as_deref().unwrap_or("no reason given"))]
    ExecutionFailed {
        state: ExecutionState,
        reason: Option<String>,
    },
    #[error("Failed to fetch results: {0}")]
    Fetch(ServiceError),
    #[error("Query did not finish within {0:?}")]
    TimedOut(Duration),
    #[error("Query was cancelled")]
    Cancelled,
    #[error("Query run was interrupted: {0}")]
    Interrupted(String),
}

impl RunError {
    /// Label used for the executions metric
    pub fn outcome(&self) -> &'static str {
        match self {
            RunError::Submit(_) => "submit_error",
            RunError::Status(_) | RunError::Fetch(_) | RunError::Interrupted(_) => "error",
            RunError::ExecutionFailed {
                state: ExecutionState::Cancelled,
                ..
            } => "cancelled",
            RunError::ExecutionFailed { .. } => "failed",
            RunError::TimedOut(_) => "timed_out",
            RunError::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunnerOptions {
    pub poll_interval: Duration,
    /// Deadline for polling and fetching. Submission has its own retry window.
    pub timeout: Option<Duration>,
    pub page_size: i32,
    pub submit_retry_window: Duration,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        RunnerOptions::from(&RunnerConfig::default())
    }
}

impl From<&RunnerConfig> for RunnerOptions {
    fn from(config: &RunnerConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            timeout: config.timeout(),
            page_size: config.page_size,
            submit_retry_window: config.submit_retry_window(),
        }
    }
}

/// Submits queries, waits for them to finish and shapes the results into
/// [`ResultTable`]s.
#[derive(Clone)]
pub struct QueryRunner {
    service: Arc<dyn QueryService>,
    options: RunnerOptions,
    metrics: Option<Arc<Metrics>>,
}

impl QueryRunner {
    pub fn new(service: Arc<dyn QueryService>, options: RunnerOptions) -> Self {
        Self {
            service,
            options,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn options(&self) -> &RunnerOptions {
        &self.options
    }

    /// Run a query and never fail: every error degrades to an empty table.
    pub async fn execute(&self, query: &str, database: &str, output_location: &str) -> ResultTable {
        let request = QueryRequest::new(query, database, output_location);
        match self.run(&request, &CancellationToken::new()).await {
            Ok(table) => table,
            Err(e) => {
                warn!("Returning empty result: {}", e);
                ResultTable::empty()
            }
        }
    }

    /// Run a query to completion, reporting why it produced no table.
    pub async fn run(
        &self,
        request: &QueryRequest,
        cancel: &CancellationToken,
    ) -> Result<ResultTable, RunError> {
        let started = Instant::now();
        let result = self.run_to_completion(request, cancel).await;

        if let Some(metrics) = &self.metrics {
            let elapsed = started.elapsed().as_secs_f64();
            match &result {
                Ok(table) => {
                    metrics.record_execution("succeeded", elapsed);
                    metrics.record_rows(table.len());
                }
                Err(e) => metrics.record_execution(e.outcome(), elapsed),
            }
        }

        result
    }

    async fn run_to_completion(
        &self,
        request: &QueryRequest,
        cancel: &CancellationToken,
    ) -> Result<ResultTable, RunError> {
        let execution_id = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RunError::Cancelled),
            submitted = self.submit(request) => submitted?,
        };
        info!("Submitted query execution {}", execution_id);

        let finished = match self.options.timeout {
            Some(limit) => {
                match tokio::time::timeout(limit, self.complete(&execution_id, cancel)).await {
                    Ok(result) => result,
                    Err(_) => Err(RunError::TimedOut(limit)),
                }
            }
            None => self.complete(&execution_id, cancel).await,
        };

        if let Err(RunError::TimedOut(_) | RunError::Cancelled) = &finished {
            self.stop_quietly(&execution_id).await;
        }

        finished
    }

    /// Submit with exponential backoff on throttling and transport errors
    async fn submit(&self, request: &QueryRequest) -> Result<String, RunError> {
        let client_token = Uuid::new_v4().to_string();
        debug!("Submitting query (token {}): {}", client_token, request.query);

        let policy = ExponentialBackoffBuilder::new()
            .with_initial_interval(self.options.poll_interval)
            .with_max_interval(self.options.poll_interval * 10)
            .with_max_elapsed_time(Some(self.options.submit_retry_window))
            .build();

        let client_token = client_token.as_str();
        backoff::future::retry(policy, || async move {
            self.service.start_query(request, client_token).await.map_err(|e| {
                if e.is_transient() {
                    warn!("Retrying query submission: {}", e);
                    backoff::Error::transient(e)
                } else {
                    backoff::Error::permanent(e)
                }
            })
        })
        .await
        .map_err(RunError::Submit)
    }

    async fn complete(
        &self,
        execution_id: &str,
        cancel: &CancellationToken,
    ) -> Result<ResultTable, RunError> {
        let status = self.wait_for_terminal(execution_id, cancel).await?;

        if status.state != ExecutionState::Succeeded {
            warn!(
                "Query execution {} finished as {}: {}",
                execution_id,
                status.state,
                status.reason.as_deref().unwrap_or("no reason given")
            );
            return Err(RunError::ExecutionFailed {
                state: status.state,
                reason: status.reason,
            });
        }

        self.fetch_table(execution_id, cancel).await
    }

    async fn wait_for_terminal(
        &self,
        execution_id: &str,
        cancel: &CancellationToken,
    ) -> Result<ExecutionStatus, RunError> {
        loop {
            match self.service.query_status(execution_id).await {
                Ok(status) if status.state.is_terminal() => return Ok(status),
                Ok(status) => debug!("Execution {} is {}", execution_id, status.state),
                Err(e) if e.is_transient() => {
                    warn!("Transient error polling execution {}: {}", execution_id, e)
                }
                Err(e) => return Err(RunError::Status(e)),
            }

            tokio::select! {
                _ = cancel.cancelled() => return Err(RunError::Cancelled),
                _ = tokio::time::sleep(self.options.poll_interval) => {}
            }
        }
    }

    /// Read every page, dropping the header row the service repeats at the
    /// top of each one.
    async fn fetch_table(
        &self,
        execution_id: &str,
        cancel: &CancellationToken,
    ) -> Result<ResultTable, RunError> {
        let page_size = self.options.page_size.clamp(1, MAX_PAGE_SIZE);
        let mut columns: Vec<String> = Vec::new();
        let mut rows: Vec<Vec<Option<String>>> = Vec::new();
        let mut next_token: Option<String> = None;
        let mut pages = 0usize;

        loop {
            if cancel.is_cancelled() {
                return Err(RunError::Cancelled);
            }

            let ResultPage {
                columns: page_columns,
                rows: page_rows,
                next_token: token,
            } = self
                .service
                .fetch_page(execution_id, next_token.as_deref(), page_size)
                .await
                .map_err(RunError::Fetch)?;

            let mut page_rows = page_rows.into_iter();
            let header = page_rows.next();

            if pages == 0 {
                columns = if page_columns.is_empty() {
                    header
                        .map(|cells| cells.into_iter().map(Option::unwrap_or_default).collect())
                        .unwrap_or_default()
                } else {
                    page_columns
                };
            }

            rows.extend(page_rows);
            pages += 1;

            match token {
                Some(token) if !token.is_empty() => next_token = Some(token),
                _ => break,
            }
        }

        let table = ResultTable::from_raw(columns, rows);
        debug!(
            "Execution {} returned {} rows over {} pages",
            execution_id,
            table.len(),
            pages
        );

        if log::log_enabled!(log::Level::Trace) {
            log::trace!("Execution {} table: {:?}", execution_id, &table);
        }

        Ok(table)
    }

    async fn stop_quietly(&self, execution_id: &str) {
        if let Err(e) = self.service.stop_query(execution_id).await {
            warn!("Failed to stop query execution {}: {}", execution_id, e);
        }
    }
}
