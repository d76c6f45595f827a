use super::base::{QueryService, ServiceError};
use crate::config::AthenaConfig;
use crate::models::{ExecutionState, ExecutionStatus, QueryRequest, ResultPage};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_athena::config::Region;
use aws_sdk_athena::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_athena::types::{QueryExecutionContext, QueryExecutionState, ResultConfiguration};
use aws_sdk_athena::Client;

/// Amazon Athena implementation of [`QueryService`]
pub struct AthenaService {
    client: Client,
    workgroup: Option<String>,
}

impl AthenaService {
    /// Wrap an already configured Athena client
    pub fn new(client: Client, workgroup: Option<String>) -> Self {
        Self { client, workgroup }
    }

    /// Build a client for the configured region using the default AWS
    /// credential provider chain
    pub async fn from_config(config: &AthenaConfig) -> Self {
        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .load()
            .await;

        log::info!("Athena client configured for region {}", config.region);
        Self::new(Client::new(&sdk_config), config.workgroup.clone())
    }
}

/// Map an SDK error onto the service error taxonomy by its AWS error code
fn classify<E, R>(operation: &str, err: SdkError<E, R>) -> ServiceError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug + Send + Sync + 'static,
{
    let message = format!("{} failed: {}", operation, DisplayErrorContext(&err));

    match &err {
        SdkError::DispatchFailure(_) | SdkError::TimeoutError(_) | SdkError::ResponseError(_) => {
            return ServiceError::Transport(message);
        }
        _ => {}
    }

    match err.code() {
        Some("TooManyRequestsException") | Some("ThrottlingException") => {
            ServiceError::Throttled(message)
        }
        Some(code) => ServiceError::Rejected {
            code: code.to_string(),
            message: err.message().map(str::to_string).unwrap_or(message),
        },
        None => ServiceError::Rejected {
            code: "Unknown".to_string(),
            message,
        },
    }
}

fn map_state(state: Option<&QueryExecutionState>) -> ExecutionState {
    match state {
        Some(QueryExecutionState::Succeeded) => ExecutionState::Succeeded,
        Some(QueryExecutionState::Failed) => ExecutionState::Failed,
        Some(QueryExecutionState::Cancelled) => ExecutionState::Cancelled,
        _ => ExecutionState::Running,
    }
}

#[async_trait]
impl QueryService for AthenaService {
    async fn start_query(
        &self,
        request: &QueryRequest,
        client_token: &str,
    ) -> Result<String, ServiceError> {
        log::debug!(
            "Starting query on database {}: {}",
            request.database,
            request.query
        );

        let output = self
            .client
            .start_query_execution()
            .query_string(&request.query)
            .query_execution_context(
                QueryExecutionContext::builder()
                    .database(&request.database)
                    .build(),
            )
            .result_configuration(
                ResultConfiguration::builder()
                    .output_location(&request.output_location)
                    .build(),
            )
            .set_work_group(self.workgroup.clone())
            .client_request_token(client_token)
            .send()
            .await
            .map_err(|e| classify("StartQueryExecution", e))?;

        output
            .query_execution_id()
            .map(str::to_string)
            .ok_or_else(|| {
                ServiceError::MalformedResponse(
                    "StartQueryExecution returned no execution id".to_string(),
                )
            })
    }

    async fn query_status(&self, execution_id: &str) -> Result<ExecutionStatus, ServiceError> {
        let output = self
            .client
            .get_query_execution()
            .query_execution_id(execution_id)
            .send()
            .await
            .map_err(|e| classify("GetQueryExecution", e))?;

        let status = output
            .query_execution()
            .and_then(|execution| execution.status())
            .ok_or_else(|| {
                ServiceError::MalformedResponse(format!(
                    "GetQueryExecution returned no status for {}",
                    execution_id
                ))
            })?;

        Ok(ExecutionStatus {
            state: map_state(status.state()),
            reason: status.state_change_reason().map(str::to_string),
        })
    }

    async fn fetch_page(
        &self,
        execution_id: &str,
        next_token: Option<&str>,
        page_size: i32,
    ) -> Result<ResultPage, ServiceError> {
        let output = self
            .client
            .get_query_results()
            .query_execution_id(execution_id)
            .max_results(page_size)
            .set_next_token(next_token.map(str::to_string))
            .send()
            .await
            .map_err(|e| classify("GetQueryResults", e))?;

        let Some(result_set) = output.result_set() else {
            return Ok(ResultPage {
                next_token: output.next_token().map(str::to_string),
                ..ResultPage::default()
            });
        };

        let columns = result_set
            .result_set_metadata()
            .map(|metadata| {
                metadata
                    .column_info()
                    .iter()
                    .map(|column| column.name().to_string())
                    .collect()
            })
            .unwrap_or_default();

        // Only the string payload of a datum is kept; anything else is null
        let rows = result_set
            .rows()
            .iter()
            .map(|row| {
                row.data()
                    .iter()
                    .map(|datum| datum.var_char_value().map(str::to_string))
                    .collect()
            })
            .collect();

        Ok(ResultPage {
            columns,
            rows,
            next_token: output.next_token().map(str::to_string),
        })
    }

    async fn stop_query(&self, execution_id: &str) -> Result<(), ServiceError> {
        self.client
            .stop_query_execution()
            .query_execution_id(execution_id)
            .send()
            .await
            .map_err(|e| classify("StopQueryExecution", e))?;

        log::info!("Stopped query execution {}", execution_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_state() {
        assert_eq!(
            map_state(Some(&QueryExecutionState::Succeeded)),
            ExecutionState::Succeeded
        );
        assert_eq!(
            map_state(Some(&QueryExecutionState::Failed)),
            ExecutionState::Failed
        );
        assert_eq!(
            map_state(Some(&QueryExecutionState::Cancelled)),
            ExecutionState::Cancelled
        );
        assert_eq!(
            map_state(Some(&QueryExecutionState::Queued)),
            ExecutionState::Running
        );
        assert_eq!(map_state(None), ExecutionState::Running);
    }
}
