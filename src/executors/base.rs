use async_trait::async_trait;
use thiserror::Error;

use crate::models::{ExecutionStatus, QueryRequest, ResultPage};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ServiceError {
    #[error("Request throttled: {0}")]
    Throttled(String),
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Request rejected ({code}): {message}")]
    Rejected { code: String, message: String },
    #[error("Malformed response: {0}")]
    MalformedResponse(String),
}

impl ServiceError {
    /// Whether the same call may succeed if simply retried later.
    pub fn is_transient(&self) -> bool {
        matches!(self, ServiceError::Throttled(_) | ServiceError::Transport(_))
    }
}

/// Remote analytical query service. An execution is owned by the service;
/// callers only hold its opaque id.
#[async_trait]
pub trait QueryService: Send + Sync {
    /// Start an execution. Calls that repeat `client_token` refer to the same
    /// submission, so a retry never starts a second execution.
    async fn start_query(
        &self,
        request: &QueryRequest,
        client_token: &str,
    ) -> Result<String, ServiceError>;
    async fn query_status(&self, execution_id: &str) -> Result<ExecutionStatus, ServiceError>;
    async fn fetch_page(
        &self,
        execution_id: &str,
        next_token: Option<&str>,
        page_size: i32,
    ) -> Result<ResultPage, ServiceError>;
    async fn stop_query(&self, execution_id: &str) -> Result<(), ServiceError>;
}
