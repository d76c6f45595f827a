pub mod athena_source;
pub mod base;
use crate::config::AthenaConfig;
use crate::executors::{athena_source::AthenaService, base::QueryService};
use std::sync::Arc;

/// Create the query service used by the runner
pub async fn create_service(config: &AthenaConfig) -> Arc<dyn QueryService> {
    Arc::new(AthenaService::from_config(config).await)
}
