#![allow(dead_code)]

use async_trait::async_trait;
use flowdash::executors::base::{QueryService, ServiceError};
use flowdash::models::{ExecutionState, ExecutionStatus, QueryRequest, ResultPage};
use flowdash::runner::RunnerOptions;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub const TEST_DATABASE: &str = "default";
pub const TEST_OUTPUT: &str = "s3://flow-results/";
pub const TEST_EXECUTION_ID: &str = "exec-1";

/// A query service that plays back scripted responses and counts calls.
pub struct ScriptedService {
    submit_errors: Mutex<VecDeque<ServiceError>>,
    statuses: Mutex<VecDeque<Result<ExecutionStatus, ServiceError>>>,
    pages: Vec<ResultPage>,
    fetch_error: Option<ServiceError>,
    pub starts: AtomicUsize,
    pub status_calls: AtomicUsize,
    pub fetches: AtomicUsize,
    pub stops: AtomicUsize,
    pub last_page_size: AtomicI32,
    pub submitted: Mutex<Vec<QueryRequest>>,
    pub client_tokens: Mutex<Vec<String>>,
}

impl ScriptedService {
    /// Succeeds on the first poll and serves `pages` in order
    pub fn succeeding(pages: Vec<ResultPage>) -> Self {
        Self {
            submit_errors: Mutex::new(VecDeque::new()),
            statuses: Mutex::new(VecDeque::from(vec![Ok(ExecutionStatus::new(
                ExecutionState::Succeeded,
            ))])),
            pages,
            fetch_error: None,
            starts: AtomicUsize::new(0),
            status_calls: AtomicUsize::new(0),
            fetches: AtomicUsize::new(0),
            stops: AtomicUsize::new(0),
            last_page_size: AtomicI32::new(0),
            submitted: Mutex::new(Vec::new()),
            client_tokens: Mutex::new(Vec::new()),
        }
    }

    /// Never leaves the running state
    pub fn stuck() -> Self {
        Self::succeeding(Vec::new()).with_statuses(vec![Ok(ExecutionStatus::new(
            ExecutionState::Running,
        ))])
    }

    /// Statuses are returned in order; the last one repeats forever
    pub fn with_statuses(self, statuses: Vec<Result<ExecutionStatus, ServiceError>>) -> Self {
        *self.statuses.lock().unwrap() = statuses.into();
        self
    }

    /// Errors returned by the first submissions before one succeeds
    pub fn with_submit_errors(self, errors: Vec<ServiceError>) -> Self {
        *self.submit_errors.lock().unwrap() = errors.into();
        self
    }

    pub fn with_fetch_error(mut self, error: ServiceError) -> Self {
        self.fetch_error = Some(error);
        self
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn client_tokens(&self) -> Vec<String> {
        self.client_tokens.lock().unwrap().clone()
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QueryService for ScriptedService {
    async fn start_query(
        &self,
        request: &QueryRequest,
        client_token: &str,
    ) -> Result<String, ServiceError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        self.submitted.lock().unwrap().push(request.clone());
        self.client_tokens.lock().unwrap().push(client_token.to_string());
        match self.submit_errors.lock().unwrap().pop_front() {
            Some(e) => Err(e),
            None => Ok(TEST_EXECUTION_ID.to_string()),
        }
    }

    async fn query_status(&self, _execution_id: &str) -> Result<ExecutionStatus, ServiceError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        let mut statuses = self.statuses.lock().unwrap();
        if statuses.len() > 1 {
            statuses.pop_front().unwrap()
        } else {
            statuses.front().cloned().unwrap()
        }
    }

    async fn fetch_page(
        &self,
        _execution_id: &str,
        next_token: Option<&str>,
        page_size: i32,
    ) -> Result<ResultPage, ServiceError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.last_page_size.store(page_size, Ordering::SeqCst);
        if let Some(e) = &self.fetch_error {
            return Err(e.clone());
        }

        let index: usize = next_token.map(|t| t.parse().unwrap()).unwrap_or(0);
        let mut page = self.pages.get(index).cloned().unwrap_or_default();
        page.next_token = if index + 1 < self.pages.len() {
            Some((index + 1).to_string())
        } else {
            None
        };
        Ok(page)
    }

    async fn stop_query(&self, _execution_id: &str) -> Result<(), ServiceError> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// A page with metadata columns and a leading header row, as the service
/// sends it
pub fn page(columns: &[&str], rows: Vec<Vec<Option<&str>>>) -> ResultPage {
    let header: Vec<Option<String>> = columns.iter().map(|c| Some(c.to_string())).collect();
    let mut all_rows = vec![header];
    all_rows.extend(
        rows.into_iter()
            .map(|row| row.into_iter().map(|c| c.map(str::to_string)).collect()),
    );

    ResultPage {
        columns: columns.iter().map(|c| c.to_string()).collect(),
        rows: all_rows,
        next_token: None,
    }
}

pub fn fast_options() -> RunnerOptions {
    RunnerOptions {
        poll_interval: Duration::from_millis(1),
        timeout: None,
        page_size: 1000,
        submit_retry_window: Duration::from_secs(2),
    }
}

pub fn auth_error() -> ServiceError {
    ServiceError::Rejected {
        code: "UnrecognizedClientException".to_string(),
        message: "The security token included in the request is invalid.".to_string(),
    }
}
